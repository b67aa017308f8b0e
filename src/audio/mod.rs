pub mod convert;
pub mod frame;

pub use convert::{to_wire_pcm, TARGET_SAMPLE_RATE};
pub use frame::{AudioFrame, FrameFormat, FrameSource, WavFileSource};
