//! Live streaming session to the provider
//!
//! This module contains the protocol core:
//! - `transport`: the persistent full-duplex channel and its seam traits
//! - `codec`: pure translation between wire messages and semantic events
//! - `session`: the state machine driving connect, setup, streaming,
//!   reconnection with backoff, and teardown

pub mod codec;
pub mod session;
pub mod transport;

pub use codec::ServerEvent;
pub use session::{LiveSession, SessionConfig, SessionEvent, SessionState, SessionStats};
pub use transport::{Connector, MessageSink, MessageStream, WireMessage, WsConnector};
