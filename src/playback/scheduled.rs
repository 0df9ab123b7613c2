//! Clock-scheduled playback
//!
//! For outputs that expose a sample-accurate clock and accept sounds
//! scheduled at an absolute time. Each chunk starts at
//! `max(now, end of previous chunk)`, so no handoff loop is needed.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::playback::engine::ChunkPlayer;
use crate::playback::format::{PcmChunk, PcmFormat, WireChunk};

/// Output with its own playback clock
pub trait ScheduledOutput: Send + Sync {
    /// Current output clock, in seconds
    fn current_time(&self) -> f64;

    /// Queue `pcm` to begin exactly at `at` seconds on the output clock
    fn schedule(&self, pcm: PcmChunk, at: f64) -> crate::Result<()>;

    /// Stop and forget every scheduled sound
    fn cancel_all(&self);
}

/// Player that lays chunks end to end on an output clock
pub struct ClockScheduledPlayer<O: ScheduledOutput> {
    output: O,
    format: PcmFormat,
    cursor: Mutex<f64>,
}

impl<O: ScheduledOutput> ClockScheduledPlayer<O> {
    pub fn new(output: O, format: PcmFormat) -> Self {
        Self {
            output,
            format,
            cursor: Mutex::new(0.0),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Output time at which the last scheduled chunk ends
    pub fn cursor(&self) -> f64 {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<O: ScheduledOutput> ChunkPlayer for ClockScheduledPlayer<O> {
    fn enqueue(&self, chunk: WireChunk) {
        let pcm = match chunk.decode(self.format) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!("dropping undecodable chunk: {}", e);
                return;
            }
        };

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let start = self.output.current_time().max(*cursor);
        let length = pcm.duration.as_secs_f64();
        match self.output.schedule(pcm, start) {
            Ok(()) => {
                *cursor = start + length;
                debug!("scheduled chunk at {:.3}s, cursor {:.3}s", start, *cursor);
            }
            Err(e) => warn!("failed to schedule chunk at {:.3}s: {}", start, e),
        }
    }

    fn clear(&self) {
        self.output.cancel_all();
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = 0.0;
    }
}
