pub mod answer;
pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod transcript;

pub use answer::{AnswerClient, QuestionTrigger};
pub use audio::{AudioFrame, FrameFormat, FrameSource, WavFileSource};
pub use config::Config;
pub use error::SessionError;
pub use live::{
    Connector, LiveSession, MessageSink, MessageStream, ServerEvent, SessionConfig, SessionEvent,
    SessionState, SessionStats, WireMessage, WsConnector,
};
pub use transcript::{TranscriptAssembler, TurnRecord};
