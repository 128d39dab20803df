//! Sensor report payload
//!
//! # Payload Format
//!
//! Comma separated `key:value` pairs, ASCII only:
//!
//! ```text
//! nm:hall,t:215,p:1013,h:45.2,l:120,v:3300,r:-70
//! ```
//!
//! | Key  | Value                                   |
//! |------|-----------------------------------------|
//! | `nm` | node name                               |
//! | `t`  | temperature in 0.1 degC (integer)       |
//! | `p`  | pressure in hPa                         |
//! | `h`  | relative humidity in %, one decimal     |
//! | `l`  | illuminance in lux                      |
//! | `v`  | battery voltage in mV                   |
//! | `r`  | RSSI of the last frame the node heard   |
//!
//! Fields of unavailable sensors are left out. A field that would push the
//! payload past 61 bytes is dropped whole.

use crate::config::protocol::MAX_PAYLOAD;
use crate::sensors::{Sensor, SensorSample};
use core::fmt::{self, Write};
use heapless::String;
use log::{debug, warn};

/// Encoded report
pub type ReportPayload = String<MAX_PAYLOAD>;

/// Longest single `key:value` field
const MAX_FIELD_LEN: usize = 24;

/// Readings gathered during one transmit cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report<'a> {
    name: Option<&'a str>,
    climate: Option<(i16, u16, u16)>,
    lux: Option<u32>,
    millivolts: Option<u16>,
    rssi: Option<i16>,
}

impl<'a> Report<'a> {
    pub fn new(name: Option<&'a str>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Read every sensor. Failed sensors are logged and skipped.
    pub fn collect(name: Option<&'a str>, sensors: &mut [&mut dyn Sensor]) -> Self {
        let mut report = Self::new(name);
        for (index, sensor) in sensors.iter_mut().enumerate() {
            match sensor.read() {
                Ok(sample) => report.record(sample),
                Err(e) => warn!("Report: sensor {}: {}", index, e),
            }
        }
        report
    }

    pub fn record(&mut self, sample: SensorSample) {
        match sample {
            SensorSample::Climate {
                temperature_deci_c,
                pressure_hpa,
                humidity_deci_pct,
            } => self.climate = Some((temperature_deci_c, pressure_hpa, humidity_deci_pct)),
            SensorSample::Light { lux } => self.lux = Some(lux),
            SensorSample::Battery { millivolts } => self.millivolts = Some(millivolts),
        }
    }

    pub fn set_rssi(&mut self, rssi: Option<i16>) {
        self.rssi = rssi;
    }

    pub fn encode(&self) -> ReportPayload {
        let mut out = ReportPayload::new();

        if let Some(name) = self.name {
            push_field(&mut out, format_args!("nm:{}", name));
        }
        if let Some((t, p, h)) = self.climate {
            push_field(&mut out, format_args!("t:{}", t));
            push_field(&mut out, format_args!("p:{}", p));
            push_field(&mut out, format_args!("h:{}.{}", h / 10, h % 10));
        }
        if let Some(lux) = self.lux {
            push_field(&mut out, format_args!("l:{}", lux));
        }
        if let Some(mv) = self.millivolts {
            push_field(&mut out, format_args!("v:{}", mv));
        }
        if let Some(rssi) = self.rssi {
            push_field(&mut out, format_args!("r:{}", rssi));
        }

        out
    }
}

fn push_field(out: &mut ReportPayload, args: fmt::Arguments) {
    let mut field: String<MAX_FIELD_LEN> = String::new();
    if field.write_fmt(args).is_err() {
        return;
    }

    let separator = usize::from(!out.is_empty());
    if out.len() + separator + field.len() > out.capacity() {
        debug!("Report: no room for '{}'", field.as_str());
        return;
    }
    if separator == 1 {
        let _ = out.push(',');
    }
    let _ = out.push_str(&field);
}
