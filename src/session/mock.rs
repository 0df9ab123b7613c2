//! In-process stand-in for the generation backend
//!
//! `MockSession` records every directive it receives and can be told to
//! fail or stall pushes. `MockConnector` hands out mock sessions and can
//! stream synthetic tone chunks so the whole pipeline runs offline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::conductor::section_conductor::DirectiveKind;
use crate::config::SessionConfig;
use crate::error::{OstinatoError, Result};
use crate::playback::format::{synth_tone, PcmFormat, WireChunk};
use crate::session::{BackendEvent, GenerationSession, SessionConnector, SessionLink};

/// Backend event channel capacity for mock sessions
const EVENT_BUFFER: usize = 64;

/// A directive as received by the mock backend
#[derive(Debug, Clone, PartialEq)]
pub struct PushedDirective {
    pub kind: DirectiveKind,
    pub text: String,
    pub at: Instant,
}

/// Parameters the session was opened with
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub initial_directive: String,
    pub bpm: u32,
    pub temperature: f32,
}

#[derive(Default)]
struct MockState {
    directives: Vec<PushedDirective>,
    push_delay: Duration,
    connect_params: Option<ConnectParams>,
}

/// Recording generation session
#[derive(Default)]
pub struct MockSession {
    state: Mutex<MockState>,
    fail_pushes: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    events: Option<mpsc::Sender<BackendEvent>>,
}

impl MockSession {
    /// Session with no backend event stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that can inject events into `events`
    pub fn with_events(events: mpsc::Sender<BackendEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every directive pushed so far, in push order
    pub fn directives(&self) -> Vec<PushedDirective> {
        self.lock().directives.clone()
    }

    pub fn connect_params(&self) -> Option<ConnectParams> {
        self.lock().connect_params.clone()
    }

    /// Make subsequent pushes fail with a transient error
    pub fn set_push_failure(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Hold every push for `delay` before completing it
    pub fn set_push_delay(&self, delay: Duration) {
        self.lock().push_delay = delay;
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Deliver a backend event as if the backend had sent it
    ///
    /// Returns false if the session has no event stream or it is closed.
    pub async fn inject(&self, event: BackendEvent) -> bool {
        match &self.events {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    async fn record(&self, kind: DirectiveKind, text: &str) -> Result<()> {
        let delay = self.lock().push_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(OstinatoError::DirectivePush {
                reason: "mock backend rejected the directive".to_string(),
            });
        }

        self.lock().directives.push(PushedDirective {
            kind,
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl GenerationSession for MockSession {
    async fn push_steady_directive(&self, text: &str) -> Result<()> {
        self.record(DirectiveKind::Steady, text).await
    }

    async fn push_transition_directive(&self, text: &str) -> Result<()> {
        self.record(DirectiveKind::Transition, text).await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("mock session closed");
        }
        Ok(())
    }
}

/// Synthetic audio settings for `MockConnector`
#[derive(Debug, Clone, Copy)]
pub struct MockAudio {
    pub format: PcmFormat,
    pub chunk_ms: u64,
    pub frequency: f32,
}

/// Connector producing `MockSession`s
#[derive(Default)]
pub struct MockConnector {
    audio: Option<MockAudio>,
    fail_connect: AtomicBool,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockConnector {
    /// Connector whose sessions produce no audio
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose sessions stream a tone in `chunk_ms` chunks, one per `chunk_ms`
    pub fn with_audio(format: PcmFormat, chunk_ms: u64) -> Self {
        Self {
            audio: Some(MockAudio {
                format,
                chunk_ms,
                frequency: 220.0,
            }),
            ..Self::default()
        }
    }

    /// Make subsequent connects fail
    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Sessions opened so far, oldest first
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions().pop()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<SessionLink> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(OstinatoError::BackendConnect {
                reason: "mock backend unavailable".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = Arc::new(MockSession::with_events(tx.clone()));
        session.lock().connect_params = Some(ConnectParams {
            initial_directive: config.initial_directive.clone(),
            bpm: config.bpm,
            temperature: config.temperature,
        });

        if let Some(audio) = self.audio {
            tokio::spawn(stream_tone(Arc::clone(&session), tx, audio));
        }

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&session));
        Ok(SessionLink {
            session,
            events: rx,
        })
    }
}

async fn stream_tone(session: Arc<MockSession>, tx: mpsc::Sender<BackendEvent>, audio: MockAudio) {
    let samples = synth_tone(audio.format, audio.frequency, audio.chunk_ms, 0.3);
    let chunk = WireChunk::from_samples(&samples);
    let mut clock = tokio::time::interval(Duration::from_millis(audio.chunk_ms.max(1)));

    loop {
        clock.tick().await;
        if session.is_closed() {
            break;
        }
        if tx.send(BackendEvent::Chunk(chunk.clone())).await.is_err() {
            break;
        }
    }
    debug!("mock audio stream finished");
}
