//! Queue entries and their lifecycle
//!
//! `Pending -> Loading -> Ready | Error`. Ready entries are played once and
//! released; Error entries are skipped.

use std::time::Duration;

use crate::playback::format::WireChunk;
use crate::playback::output::SoundHandle;

/// Lifecycle state of a queued chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting in the ingestion queue
    Pending,
    /// Decode in flight
    Loading,
    /// Decoded and playable
    Ready,
    /// Decode failed; will be skipped
    Error,
}

/// Output resources for a Ready entry
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedClip {
    pub handle: SoundHandle,
    pub duration: Duration,
    pub duration_ms: f64,
}

/// One chunk moving through the engine
#[derive(Debug)]
pub struct QueueEntry {
    /// Arrival sequence number, unique per engine
    pub id: u64,
    pub state: EntryState,
    chunk: Option<WireChunk>,
    clip: Option<PreparedClip>,
}

impl QueueEntry {
    pub fn pending(id: u64, chunk: WireChunk) -> Self {
        Self {
            id,
            state: EntryState::Pending,
            chunk: Some(chunk),
            clip: None,
        }
    }

    /// Move to Loading, handing the payload to the decoder
    pub fn begin_loading(&mut self) -> Option<WireChunk> {
        self.state = EntryState::Loading;
        self.chunk.take()
    }

    pub fn mark_ready(&mut self, clip: PreparedClip) {
        self.state = EntryState::Ready;
        self.clip = Some(clip);
    }

    pub fn mark_error(&mut self) {
        self.state = EntryState::Error;
        self.clip = None;
    }

    pub fn clip(&self) -> Option<&PreparedClip> {
        self.clip.as_ref()
    }

    pub fn take_clip(&mut self) -> Option<PreparedClip> {
        self.clip.take()
    }

    pub fn is_ready(&self) -> bool {
        self.state == EntryState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_lifecycle() {
        let mut entry = QueueEntry::pending(3, WireChunk::new("AAAA"));
        assert_eq!(entry.state, EntryState::Pending);

        let payload = entry.begin_loading();
        assert_eq!(payload, Some(WireChunk::new("AAAA")));
        assert_eq!(entry.state, EntryState::Loading);
        assert!(entry.begin_loading().is_none());

        entry.mark_ready(PreparedClip {
            handle: SoundHandle::new(1),
            duration: Duration::from_millis(500),
            duration_ms: 500.0,
        });
        assert!(entry.is_ready());
        assert!(entry.take_clip().is_some());
        assert!(entry.clip().is_none());
    }

    #[test]
    fn test_error_drops_clip() {
        let mut entry = QueueEntry::pending(0, WireChunk::new("AAAA"));
        entry.begin_loading();
        entry.mark_error();
        assert_eq!(entry.state, EntryState::Error);
        assert!(entry.clip().is_none());
    }
}
