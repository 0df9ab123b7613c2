//! Events surfaced to the transport layer
//!
//! Serialized as internally tagged JSON so the transport can forward
//! them without reshaping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::playback::WireChunk;

/// Conductor phase within the active section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Steady,
    Transitioning,
}

/// Everything the core reports upward for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        at: DateTime<Utc>,
    },
    SectionChanged {
        id: String,
        directive_text: String,
    },
    Progress {
        section_id: String,
        fraction: f64,
        phase: Phase,
    },
    AudioChunk {
        data: WireChunk,
    },
    SessionStopped {
        at: DateTime<Utc>,
    },
    SessionErrored {
        message: String,
    },
}

impl SessionEvent {
    pub fn started() -> Self {
        SessionEvent::SessionStarted { at: Utc::now() }
    }

    pub fn stopped() -> Self {
        SessionEvent::SessionStopped { at: Utc::now() }
    }

    /// True for the events after which nothing else is emitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::SessionStopped { .. } | SessionEvent::SessionErrored { .. }
        )
    }
}

/// Sending half of a session's event stream
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half of a session's event stream
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Emit an event, ignoring a dropped receiver
pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::debug!("event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_wire_shape() {
        let event = SessionEvent::Progress {
            section_id: "Intro".to_string(),
            fraction: 0.5,
            phase: Phase::Transitioning,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["section_id"], "Intro");
        assert_eq!(json["phase"], "transitioning");
    }

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::stopped().is_terminal());
        assert!(SessionEvent::SessionErrored {
            message: "boom".to_string()
        }
        .is_terminal());
        assert!(!SessionEvent::started().is_terminal());
    }
}
