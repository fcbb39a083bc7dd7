mod frame;

pub mod encoding;
pub mod types;

pub use frame::{checksum, Frame, FrameError, FRAME_LENGTH};
pub use types::*;
