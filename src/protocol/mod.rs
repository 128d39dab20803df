pub mod cipher;
pub mod frame;

pub use cipher::FrameCipher;
pub use frame::{FrameBuf, FrameCodec, FrameError, Packet, Payload};
