//! Question detection and answer streaming
//!
//! Finalized turns are scanned for questions; each unique question starts an
//! independent streamed answer call that runs alongside the live session.

mod streamer;
mod trigger;

pub use streamer::AnswerClient;
pub use trigger::{extract_question, QuestionTrigger};
