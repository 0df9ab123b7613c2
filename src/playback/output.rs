//! Platform audio output seam
//!
//! The engine never touches a sound device directly. It prepares, starts
//! and releases sounds through `AudioOutput`.
//!
//! - `WavScratchOutput` writes each prepared chunk as a WAV file in a
//!   scratch directory (what file-based players load from).
//! - `MemoryOutput` keeps everything in memory and records every call.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::time::Instant;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{OstinatoError, Result};
use crate::playback::format::PcmChunk;

/// Reference to a prepared, playable sound
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    pub id: u64,
    /// Scratch file backing the sound, if any
    pub storage: Option<PathBuf>,
}

impl SoundHandle {
    pub fn new(id: u64) -> Self {
        Self { id, storage: None }
    }

    pub fn with_storage(id: u64, path: PathBuf) -> Self {
        Self {
            id,
            storage: Some(path),
        }
    }
}

/// Platform sound operations the gapless engine drives
#[async_trait]
pub trait AudioOutput: Send + Sync + 'static {
    /// Turn decoded PCM into a playable sound
    async fn prepare(&self, pcm: &PcmChunk) -> Result<SoundHandle>;

    /// Begin producing sound; resolves once the start is confirmed
    async fn start(&self, handle: &SoundHandle) -> Result<()>;

    /// Free the sound's resources
    async fn release(&self, handle: &SoundHandle) -> Result<()>;

    /// Sweep any transient storage left behind
    async fn reclaim(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// WAV scratch output
// ============================================================================

/// Output that materializes every prepared chunk as a 16-bit WAV file
///
/// A directory created by `in_temp_dir` is removed when the output drops;
/// one passed to `new` is left in place.
pub struct WavScratchOutput {
    dir: PathBuf,
    next_id: AtomicU64,
    owns_dir: bool,
}

impl WavScratchOutput {
    /// Use `dir` as scratch storage, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next_id: AtomicU64::new(0),
            owns_dir: false,
        })
    }

    /// Scratch directory under the system temp dir, unique per instance
    pub fn in_temp_dir() -> Result<Self> {
        let mut output =
            Self::new(std::env::temp_dir().join(format!("ostinato-{}", uuid::Uuid::new_v4())))?;
        output.owns_dir = true;
        Ok(output)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of scratch files currently on disk
    pub fn scratch_files(&self) -> usize {
        scratch_wavs(&self.dir).len()
    }
}

impl Drop for WavScratchOutput {
    fn drop(&mut self) {
        if !self.owns_dir {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("removed scratch dir {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove scratch dir {}: {}", self.dir.display(), e),
        }
    }
}

fn scratch_wavs(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "wav"))
        .collect()
}

fn write_wav(path: &Path, pcm: &PcmChunk) -> Result<()> {
    let spec = WavSpec {
        channels: pcm.format.channels,
        sample_rate: pcm.format.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let wav_err = |e: hound::Error| OstinatoError::decode("failed to write WAV scratch file", e);

    let mut writer = WavWriter::create(path, spec).map_err(wav_err)?;
    for sample in pcm.samples() {
        writer.write_sample(sample).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;
    Ok(())
}

#[async_trait]
impl AudioOutput for WavScratchOutput {
    async fn prepare(&self, pcm: &PcmChunk) -> Result<SoundHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("chunk_{:08}.wav", id));

        let pcm = pcm.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_wav(&target, &pcm))
            .await
            .map_err(|e| OstinatoError::decode("WAV writer task failed", e))??;

        Ok(SoundHandle::with_storage(id, path))
    }

    async fn start(&self, handle: &SoundHandle) -> Result<()> {
        match &handle.storage {
            Some(path) if path.exists() => {
                debug!("starting sound {} from {}", handle.id, path.display());
                Ok(())
            }
            _ => Err(OstinatoError::PlaybackStart {
                reason: format!("sound {} has no scratch file", handle.id),
            }),
        }
    }

    async fn release(&self, handle: &SoundHandle) -> Result<()> {
        let Some(path) = &handle.storage else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OstinatoError::ResourceRelease {
                reason: format!("{}: {}", path.display(), e),
            }),
        }
    }

    async fn reclaim(&self) -> Result<()> {
        let dir = self.dir.clone();
        let leftovers = tokio::task::spawn_blocking(move || scratch_wavs(&dir))
            .await
            .map_err(|e| OstinatoError::ResourceRelease {
                reason: e.to_string(),
            })?;

        for path in leftovers {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not reclaim {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// In-memory output
// ============================================================================

/// Call recorded by `MemoryOutput`
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Prepared { id: u64, tag: i16 },
    Started { id: u64, tag: i16, at: Instant },
    StartFailed { id: u64, tag: i16 },
    Released { id: u64 },
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<OutputCall>,
    tags: Vec<(u64, i16)>,
    live: HashSet<u64>,
    failing_tags: HashSet<i16>,
    prepare_delay: Duration,
    next_id: u64,
}

/// Output that keeps sounds in memory and records every call
///
/// Each sound is tagged with the first sample of its chunk, which lets
/// callers tell chunks apart without comparing whole payloads.
#[derive(Default)]
pub struct MemoryOutput {
    state: Mutex<MemoryState>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay every `prepare` call by `delay`
    pub fn set_prepare_delay(&self, delay: Duration) {
        self.lock().prepare_delay = delay;
    }

    /// Make `start` fail for chunks whose first sample is `tag`
    pub fn fail_start_for(&self, tag: i16) {
        self.lock().failing_tags.insert(tag);
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.lock().calls.clone()
    }

    /// Tags of successfully started sounds, in start order
    pub fn started_tags(&self) -> Vec<i16> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                OutputCall::Started { tag, .. } => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Start instants of successfully started sounds, in start order
    pub fn start_times(&self) -> Vec<Instant> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                OutputCall::Started { at, .. } => Some(*at),
                _ => None,
            })
            .collect()
    }

    /// Sounds prepared and not yet released
    pub fn live_sounds(&self) -> usize {
        self.lock().live.len()
    }

    fn tag_of(state: &MemoryState, id: u64) -> i16 {
        state
            .tags
            .iter()
            .find(|(sound, _)| *sound == id)
            .map_or(0, |(_, tag)| *tag)
    }
}

#[async_trait]
impl AudioOutput for MemoryOutput {
    async fn prepare(&self, pcm: &PcmChunk) -> Result<SoundHandle> {
        let delay = self.lock().prepare_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let tag = pcm.samples().next().unwrap_or(0);
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tags.push((id, tag));
        state.live.insert(id);
        state.calls.push(OutputCall::Prepared { id, tag });
        Ok(SoundHandle::new(id))
    }

    async fn start(&self, handle: &SoundHandle) -> Result<()> {
        let mut state = self.lock();
        let tag = Self::tag_of(&state, handle.id);
        if state.failing_tags.contains(&tag) {
            state.calls.push(OutputCall::StartFailed { id: handle.id, tag });
            return Err(OstinatoError::PlaybackStart {
                reason: format!("sound {} refused to start", handle.id),
            });
        }
        state.calls.push(OutputCall::Started {
            id: handle.id,
            tag,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn release(&self, handle: &SoundHandle) -> Result<()> {
        let mut state = self.lock();
        state.live.remove(&handle.id);
        state.calls.push(OutputCall::Released { id: handle.id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::format::{PcmFormat, WireChunk};

    fn pcm(samples: &[i16]) -> PcmChunk {
        WireChunk::from_samples(samples)
            .decode(PcmFormat::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_wav_scratch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let output = WavScratchOutput::new(dir.path()).unwrap();

        let handle = output.prepare(&pcm(&[100, -100, 200, -200])).await.unwrap();
        let path = handle.storage.clone().unwrap();
        assert!(path.exists());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 200, -200]);

        output.start(&handle).await.unwrap();
        output.release(&handle).await.unwrap();
        assert!(!path.exists());
        // Releasing twice is harmless
        output.release(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_wav_scratch_reclaim_sweeps_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let output = WavScratchOutput::new(dir.path()).unwrap();
        for _ in 0..3 {
            output.prepare(&pcm(&[1, 1])).await.unwrap();
        }
        assert_eq!(output.scratch_files(), 3);

        output.reclaim().await.unwrap();
        assert_eq!(output.scratch_files(), 0);
    }

    #[tokio::test]
    async fn test_start_without_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = WavScratchOutput::new(dir.path()).unwrap();
        let err = output.start(&SoundHandle::new(9)).await.unwrap_err();
        assert_eq!(err.error_code(), "PLAYBACK_START");
    }

    #[tokio::test]
    async fn test_temp_scratch_dir_removed_on_drop() {
        let output = WavScratchOutput::in_temp_dir().unwrap();
        let dir = output.dir().to_path_buf();
        output.prepare(&pcm(&[1, 1])).await.unwrap();
        assert!(dir.is_dir());

        drop(output);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_caller_scratch_dir_kept_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        drop(WavScratchOutput::new(dir.path()).unwrap());
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn test_memory_output_records_tags() {
        let output = MemoryOutput::new();
        output.fail_start_for(7);

        let good = output.prepare(&pcm(&[5, 5])).await.unwrap();
        let bad = output.prepare(&pcm(&[7, 7])).await.unwrap();
        output.start(&good).await.unwrap();
        assert!(output.start(&bad).await.is_err());
        assert_eq!(output.started_tags(), vec![5]);
        assert_eq!(output.live_sounds(), 2);

        output.release(&good).await.unwrap();
        assert_eq!(output.live_sounds(), 1);
    }
}
