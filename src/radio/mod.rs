pub mod link;
pub mod traits;

pub use link::{Delivered, Link, LinkError};
pub use traits::{RadioError, RxPacket, Transceiver};
