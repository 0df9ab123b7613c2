//! Generation session adapter and per-session registry
//!
//! The backend itself is out of scope; it is reached through
//! `SessionConnector` / `GenerationSession`. Audio, faults and closes flow
//! back as `BackendEvent`s.

pub mod events;
pub mod hub;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::playback::WireChunk;

pub use events::{EventReceiver, EventSender, Phase, SessionEvent};
pub use hub::{ComposerFactory, SessionHub, SessionId};
pub use mock::{ConnectParams, MockAudio, MockConnector, MockSession, PushedDirective};

/// A live streaming generation session on the backend
#[async_trait]
pub trait GenerationSession: Send + Sync {
    /// Replace the steady musical directive
    async fn push_steady_directive(&self, text: &str) -> Result<()>;

    /// Ask the backend to morph toward the next section
    async fn push_transition_directive(&self, text: &str) -> Result<()>;

    /// Terminate the backend session; idempotent
    async fn close(&self) -> Result<()>;
}

/// Asynchronous notifications from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// One encoded PCM chunk, in generation order
    Chunk(WireChunk),
    /// Fatal stream fault
    Error(String),
    /// Backend ended the session
    Closed,
}

/// A connected session plus its event stream
pub struct SessionLink {
    pub session: Arc<dyn GenerationSession>,
    pub events: mpsc::Receiver<BackendEvent>,
}

/// Opens backend sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect and send the initial steady directive and generation parameters
    async fn connect(&self, config: &SessionConfig) -> Result<SessionLink>;
}
