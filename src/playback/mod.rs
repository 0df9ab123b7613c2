//! Client-side gapless playback

pub mod clock;
pub mod engine;
pub mod format;
pub mod output;
pub mod queue;
pub mod scheduled;

pub use clock::{swap_delay, PlaybackClock};
pub use engine::{ChunkPlayer, EngineSnapshot, GaplessEngine};
pub use format::{synth_tone, PcmChunk, PcmFormat, WireChunk};
pub use output::{AudioOutput, MemoryOutput, OutputCall, SoundHandle, WavScratchOutput};
pub use queue::{EntryState, PreparedClip, QueueEntry};
pub use scheduled::{ClockScheduledPlayer, ScheduledOutput};
