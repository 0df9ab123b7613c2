//! Gapless playback engine
//!
//! Turns a jittered stream of PCM chunks into back-to-back sound.
//!
//! - `enqueue` appends to the ingestion queue and keeps the preload queue
//!   filled to `preload_depth` entries, each decoding on its own task.
//! - Playback starts once `min_buffered` chunks are held.
//! - After each start is confirmed the engine waits `duration - lead`
//!   and hands off to the next Ready entry. The finished entry is
//!   released `release_delay` later so its tail is not cut.
//! - `clear` bumps the generation; decodes from an older generation are
//!   released on completion instead of touching the queues.
//!
//! Queue state lives behind one mutex that is never held across an await.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::playback::clock::PlaybackClock;
use crate::playback::format::{PcmFormat, WireChunk};
use crate::playback::output::{AudioOutput, SoundHandle};
use crate::playback::queue::{EntryState, PreparedClip, QueueEntry};

/// Playback surface consumed by the transport layer
pub trait ChunkPlayer: Send + Sync {
    /// Accept the next chunk in arrival order
    fn enqueue(&self, chunk: WireChunk);

    /// Drop everything queued or playing and re-arm for a new session
    fn clear(&self);
}

/// Point-in-time view of the engine's queues
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub ingest_len: usize,
    pub preload: Vec<EntryState>,
    pub active: Option<u64>,
    pub running: bool,
    pub draining: bool,
    pub generation: u64,
}

struct EngineState {
    ingest: VecDeque<QueueEntry>,
    preload: VecDeque<QueueEntry>,
    active: Option<QueueEntry>,
    running: bool,
    draining: bool,
    generation: u64,
    next_entry_id: u64,
    playback_task: Option<JoinHandle<()>>,
    clock: PlaybackClock,
}

impl EngineState {
    fn new() -> Self {
        Self {
            ingest: VecDeque::new(),
            preload: VecDeque::new(),
            active: None,
            running: false,
            draining: false,
            generation: 0,
            next_entry_id: 0,
            playback_task: None,
            clock: PlaybackClock::new(),
        }
    }

    fn buffered(&self) -> usize {
        self.ingest.len() + self.preload.len()
    }
}

struct Inner<O: AudioOutput> {
    output: O,
    config: PlaybackConfig,
    format: PcmFormat,
    state: Mutex<EngineState>,
    decoded: Notify,
}

impl<O: AudioOutput> Inner<O> {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Handoff {
    Play {
        id: u64,
        clip: PreparedClip,
        previous: Option<QueueEntry>,
    },
    Idle {
        previous: Option<QueueEntry>,
    },
    Cancelled,
}

/// Scheduler that plays chunks back to back through an `AudioOutput`
///
/// Cloning yields another handle to the same engine. All methods must be
/// called from within a tokio runtime.
pub struct GaplessEngine<O: AudioOutput> {
    inner: Arc<Inner<O>>,
}

impl<O: AudioOutput> Clone for GaplessEngine<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: AudioOutput> GaplessEngine<O> {
    pub fn new(output: O, config: PlaybackConfig) -> Self {
        let format = PcmFormat::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                output,
                config,
                format,
                state: Mutex::new(EngineState::new()),
                decoded: Notify::new(),
            }),
        }
    }

    pub fn output(&self) -> &O {
        &self.inner.output
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    /// True while an entry is producing sound or about to
    pub fn is_playing(&self) -> bool {
        let st = self.inner.lock();
        st.running || st.active.is_some()
    }

    /// When the next entry is scheduled to begin, if playing
    pub fn next_scheduled_start(&self) -> Option<Instant> {
        self.inner.lock().clock.next_start()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let st = self.inner.lock();
        EngineSnapshot {
            ingest_len: st.ingest.len(),
            preload: st.preload.iter().map(|e| e.state).collect(),
            active: st.active.as_ref().map(|e| e.id),
            running: st.running,
            draining: st.draining,
            generation: st.generation,
        }
    }

    /// Append a chunk and start playback once enough is buffered
    pub fn enqueue(&self, chunk: WireChunk) {
        let mut st = self.inner.lock();
        if st.draining {
            debug!("engine draining, dropping chunk");
            return;
        }

        let id = st.next_entry_id;
        st.next_entry_id += 1;
        st.ingest.push_back(QueueEntry::pending(id, chunk));
        fill_preload(&self.inner, &mut st);

        if !st.running && st.active.is_none() && st.buffered() >= self.inner.config.min_buffered {
            info!("{} chunks buffered, starting playback", st.buffered());
            st.running = true;
            let generation = st.generation;
            st.playback_task = Some(tokio::spawn(run_playback(
                Arc::clone(&self.inner),
                generation,
            )));
        }
    }

    /// Stop playback, release everything and re-arm after a cool-down
    ///
    /// Safe to call repeatedly or with nothing queued. Releasing happens on
    /// the returned task; it finishes once the engine is re-armed.
    pub fn clear(&self) -> JoinHandle<()> {
        let (doomed, generation) = {
            let mut st = self.inner.lock();
            st.draining = true;
            st.running = false;
            st.generation += 1;
            if let Some(task) = st.playback_task.take() {
                task.abort();
            }

            let mut doomed = Vec::new();
            if let Some(active) = st.active.take() {
                doomed.push(active);
            }
            doomed.extend(st.preload.drain(..).filter(|e| e.is_ready()));
            st.ingest.clear();
            st.clock.reset();
            (doomed, st.generation)
        };
        self.inner.decoded.notify_waiters();
        debug!(
            "engine cleared, releasing {} entries (generation {})",
            doomed.len(),
            generation
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for entry in doomed {
                release_entry(&inner, entry).await;
            }
            if let Err(e) = inner.output.reclaim().await {
                warn!("scratch reclaim failed: {}", e);
            }

            tokio::time::sleep(inner.config.clear_cooldown()).await;
            let mut st = inner.lock();
            if st.generation == generation {
                st.draining = false;
                debug!("engine re-armed");
            }
        })
    }

    /// `clear`, then wait until every held sound is released and scratch
    /// storage is swept
    ///
    /// Decodes still in flight release their own sounds when they land.
    pub async fn clear_and_wait(&self) {
        if let Err(e) = self.clear().await {
            warn!("engine clear task failed: {}", e);
        }
    }
}

impl<O: AudioOutput> ChunkPlayer for GaplessEngine<O> {
    fn enqueue(&self, chunk: WireChunk) {
        GaplessEngine::enqueue(self, chunk)
    }

    fn clear(&self) {
        GaplessEngine::clear(self);
    }
}

/// Move pending chunks into free preload slots and start their decodes
fn fill_preload<O: AudioOutput>(inner: &Arc<Inner<O>>, st: &mut EngineState) {
    while st.preload.len() < inner.config.preload_depth {
        let Some(mut entry) = st.ingest.pop_front() else {
            break;
        };
        let id = entry.id;
        let chunk = entry.begin_loading();
        st.preload.push_back(entry);

        if let Some(chunk) = chunk {
            tokio::spawn(prepare_entry(Arc::clone(inner), id, st.generation, chunk));
        }
    }
}

async fn prepare_entry<O: AudioOutput>(
    inner: Arc<Inner<O>>,
    id: u64,
    generation: u64,
    chunk: WireChunk,
) {
    let prepared = match chunk.decode(inner.format) {
        Ok(pcm) => inner
            .output
            .prepare(&pcm)
            .await
            .map(|handle| PreparedClip {
                handle,
                duration: pcm.duration,
                duration_ms: pcm.duration_ms,
            }),
        Err(e) => Err(e),
    };

    let stale = {
        let mut st = inner.lock();
        let slot = if st.generation == generation {
            st.preload.iter_mut().find(|e| e.id == id)
        } else {
            None
        };

        match (slot, prepared) {
            (Some(entry), Ok(clip)) => {
                debug!("entry {} ready ({:.1}ms)", id, clip.duration_ms);
                entry.mark_ready(clip);
                None
            }
            (Some(entry), Err(e)) => {
                warn!("entry {} failed to decode, skipping: {}", id, e);
                entry.mark_error();
                None
            }
            (None, Ok(clip)) => Some(clip.handle),
            (None, Err(_)) => None,
        }
    };

    match stale {
        Some(handle) => {
            debug!("discarding entry {} decoded after clear", id);
            release_handle(&inner, &handle).await;
        }
        None => inner.decoded.notify_waiters(),
    }
}

/// Promote the next Ready entry to active
///
/// Waits while the head is still Loading, skips Error entries, and goes
/// idle when nothing is queued.
async fn handoff<O: AudioOutput>(inner: &Arc<Inner<O>>, generation: u64) -> Handoff {
    loop {
        let mut notified = pin!(inner.decoded.notified());
        notified.as_mut().enable();

        {
            let mut st = inner.lock();
            if st.generation != generation {
                return Handoff::Cancelled;
            }

            match st.preload.front().map(|e| e.state) {
                None => {
                    st.running = false;
                    let previous = st.active.take();
                    return Handoff::Idle { previous };
                }
                Some(EntryState::Ready) => {
                    let Some(mut next) = st.preload.pop_front() else {
                        continue;
                    };
                    let id = next.id;
                    let Some(clip) = next.clip().cloned() else {
                        next.mark_error();
                        continue;
                    };
                    let previous = st.active.replace(next);
                    fill_preload(inner, &mut st);
                    return Handoff::Play { id, clip, previous };
                }
                Some(EntryState::Error) => {
                    if let Some(failed) = st.preload.pop_front() {
                        debug!("skipping failed entry {}", failed.id);
                    }
                    fill_preload(inner, &mut st);
                    continue;
                }
                Some(EntryState::Loading) | Some(EntryState::Pending) => {}
            }
        }

        // Head still decoding: wait for a completion, bounded by the poll interval
        let _ = tokio::time::timeout(inner.config.stall_poll(), notified).await;
    }
}

async fn run_playback<O: AudioOutput>(inner: Arc<Inner<O>>, generation: u64) {
    loop {
        let (id, clip) = match handoff(&inner, generation).await {
            Handoff::Cancelled => return,
            Handoff::Idle { previous } => {
                if let Some(previous) = previous {
                    schedule_release(&inner, previous);
                }
                debug!("queue ran dry, waiting for more chunks");
                return;
            }
            Handoff::Play { id, clip, previous } => {
                if let Some(previous) = previous {
                    schedule_release(&inner, previous);
                }
                (id, clip)
            }
        };

        if let Err(e) = inner.output.start(&clip.handle).await {
            warn!("entry {} failed to start, advancing: {}", id, e);
            let failed = {
                let mut st = inner.lock();
                if st.generation != generation {
                    return;
                }
                match st.active.as_ref() {
                    Some(active) if active.id == id => st.active.take(),
                    _ => None,
                }
            };
            if let Some(failed) = failed {
                release_entry(&inner, failed).await;
            }
            continue;
        }

        let delay = {
            let mut st = inner.lock();
            if st.generation != generation {
                return;
            }
            st.clock
                .record_start(Instant::now(), clip.duration, inner.config.lead_time())
        };
        debug!("entry {} playing, handoff in {:?}", id, delay);
        tokio::time::sleep(delay).await;
    }
}

fn schedule_release<O: AudioOutput>(inner: &Arc<Inner<O>>, entry: QueueEntry) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(inner.config.release_delay()).await;
        release_entry(&inner, entry).await;
    });
}

async fn release_entry<O: AudioOutput>(inner: &Inner<O>, mut entry: QueueEntry) {
    if let Some(clip) = entry.take_clip() {
        release_handle(inner, &clip.handle).await;
    }
}

async fn release_handle<O: AudioOutput>(inner: &Inner<O>, handle: &SoundHandle) {
    if let Err(e) = inner.output.release(handle).await {
        warn!("failed to release sound {}: {}", handle.id, e);
    }
}
