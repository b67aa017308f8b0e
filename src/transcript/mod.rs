mod assembler;

pub use assembler::{TranscriptAssembler, TurnRecord};
