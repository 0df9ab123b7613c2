//! Registry of live sessions
//!
//! Each session id owns exactly one conductor driver and one relay task.
//! The relay forwards backend audio upward in arrival order and tears the
//! session down when the backend faults or closes. Whoever removes the
//! registry entry first emits the terminal event, so a session reports
//! exactly one of `SessionStopped` / `SessionErrored`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conductor::composer::{SongComposer, StyleContext, TimelineComposer};
use crate::conductor::driver::ConductorDriver;
use crate::conductor::section_conductor::SectionConductor;
use crate::config::{Config, SessionConfig};
use crate::error::{OstinatoError, Result};
use crate::session::events::{emit, EventSender, SessionEvent};
use crate::session::{BackendEvent, SessionConnector};

/// Identity of one listener session
pub type SessionId = Uuid;

/// Builds a fresh composer for each new session
pub type ComposerFactory = Arc<dyn Fn() -> Box<dyn TimelineComposer> + Send + Sync>;

struct LiveSession {
    driver: ConductorDriver,
    relay: JoinHandle<()>,
    events: EventSender,
}

enum SessionSlot {
    /// Connecting; style updates are held until the conductor exists
    Starting {
        attempt: Uuid,
        events: EventSender,
        pending_style: Option<StyleContext>,
    },
    Live(LiveSession),
}

type Registry = Arc<Mutex<HashMap<SessionId, SessionSlot>>>;

/// Starts, updates and stops sessions by id
#[derive(Clone)]
pub struct SessionHub {
    connector: Arc<dyn SessionConnector>,
    composers: ComposerFactory,
    config: Arc<Config>,
    sessions: Registry,
}

impl SessionHub {
    pub fn new(connector: Arc<dyn SessionConnector>, composers: ComposerFactory, config: Config) -> Self {
        Self {
            connector,
            composers,
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Hub whose sessions use the song template with fresh entropy
    pub fn with_song_composer(connector: Arc<dyn SessionConnector>, config: Config) -> Self {
        Self::new(
            connector,
            Arc::new(|| Box::new(SongComposer::from_entropy()) as Box<dyn TimelineComposer>),
            config,
        )
    }

    pub async fn is_active(&self, id: SessionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    pub async fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions.lock().await.keys().copied().collect()
    }

    /// Connect a backend session and start conducting it
    ///
    /// # Errors
    /// * `SessionAlreadyActive` - `id` is already starting or live
    /// * any connect or composition failure, after `SessionErrored` is emitted
    pub async fn start_session(
        &self,
        id: SessionId,
        style: StyleContext,
        events: EventSender,
    ) -> Result<()> {
        let attempt = Uuid::new_v4();
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&id) {
                debug!("session {} already active, ignoring start", id);
                return Err(OstinatoError::SessionAlreadyActive { id: id.to_string() });
            }
            sessions.insert(
                id,
                SessionSlot::Starting {
                    attempt,
                    events: events.clone(),
                    pending_style: None,
                },
            );
        }

        let link = match self.connector.connect(&self.config.session).await {
            Ok(link) => link,
            Err(e) => {
                error!("session {} failed to connect: {}", id, e);
                self.abandon(id, attempt, &events, &e).await;
                return Err(e);
            }
        };

        let conductor = match SectionConductor::new((self.composers)(), style, events.clone()) {
            Ok(conductor) => conductor,
            Err(e) => {
                error!("session {} could not compose a timeline: {}", id, e);
                if let Err(close_err) = link.session.close().await {
                    warn!("session {} close failed: {}", id, close_err);
                }
                self.abandon(id, attempt, &events, &e).await;
                return Err(e);
            }
        };

        // A stop that landed while connecting already sent the terminal
        // event, so nothing may be emitted or spawned unless the slot is ours.
        let mut sessions = self.sessions.lock().await;
        let pending_style = match claim_attempt(&mut sessions, id, attempt) {
            Some(pending_style) => pending_style,
            None => {
                drop(sessions);
                if let Err(e) = link.session.close().await {
                    warn!("session {} close failed: {}", id, e);
                }
                debug!("session {} ended before going live", id);
                return Ok(());
            }
        };

        emit(&events, SessionEvent::started());
        let driver = ConductorDriver::spawn(conductor, Arc::clone(&link.session), &self.config.conductor);
        let relay = tokio::spawn(relay_backend(
            id,
            link.events,
            events.clone(),
            Arc::clone(&self.sessions),
            self.config.session.clone(),
        ));
        if let Some(style) = pending_style {
            if let Err(e) = driver.update_specification(style) {
                warn!("session {} dropped a style update: {}", id, e);
            }
        }
        sessions.insert(
            id,
            SessionSlot::Live(LiveSession {
                driver,
                relay,
                events,
            }),
        );
        info!("session {} live", id);
        Ok(())
    }

    /// Forward new style signals to a session's conductor
    pub async fn update_session(&self, id: SessionId, style: StyleContext) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(SessionSlot::Live(live)) => live.driver.update_specification(style),
            Some(SessionSlot::Starting { pending_style, .. }) => {
                *pending_style = Some(style);
                Ok(())
            }
            None => Err(OstinatoError::SessionNotFound { id: id.to_string() }),
        }
    }

    /// Stop a session and emit `SessionStopped`
    ///
    /// Unknown or already stopped ids are a no-op.
    pub async fn stop_session(&self, id: SessionId) -> Result<()> {
        let slot = self.sessions.lock().await.remove(&id);
        match slot {
            None => {
                debug!("stop for unknown session {}", id);
            }
            Some(SessionSlot::Starting { events, .. }) => {
                info!("session {} stopped while connecting", id);
                emit(&events, SessionEvent::stopped());
            }
            Some(SessionSlot::Live(mut live)) => {
                live.relay.abort();
                live.driver.stop().await;
                info!("session {} stopped", id);
                emit(&live.events, SessionEvent::stopped());
            }
        }
        Ok(())
    }

    /// Stop every session
    pub async fn stop_all(&self) {
        for id in self.active_sessions().await {
            if let Err(e) = self.stop_session(id).await {
                warn!("failed to stop session {}: {}", id, e);
            }
        }
    }

    async fn abandon(
        &self,
        id: SessionId,
        attempt: Uuid,
        events: &EventSender,
        cause: &OstinatoError,
    ) {
        let claimed = claim_attempt(&mut *self.sessions.lock().await, id, attempt);
        if claimed.is_some() {
            emit(
                events,
                SessionEvent::SessionErrored {
                    message: cause.to_string(),
                },
            );
        }
    }
}

/// Remove a slot still held by connect `attempt`, returning its held style update
///
/// A slot replaced by a later start of the same id is left alone.
fn claim_attempt(
    sessions: &mut HashMap<SessionId, SessionSlot>,
    id: SessionId,
    attempt: Uuid,
) -> Option<Option<StyleContext>> {
    match sessions.get(&id) {
        Some(SessionSlot::Starting { attempt: held, .. }) if *held == attempt => {}
        _ => return None,
    }
    match sessions.remove(&id) {
        Some(SessionSlot::Starting { pending_style, .. }) => Some(pending_style),
        _ => None,
    }
}

/// Remove the session and emit `terminal` if no one else got there first
async fn teardown(id: SessionId, sessions: &Registry, events: &EventSender, terminal: SessionEvent) {
    let slot = sessions.lock().await.remove(&id);
    match slot {
        Some(SessionSlot::Live(mut live)) => {
            live.driver.stop().await;
            emit(events, terminal);
        }
        Some(SessionSlot::Starting { .. }) => emit(events, terminal),
        None => debug!("session {} already torn down", id),
    }
}

async fn relay_backend(
    id: SessionId,
    mut backend: mpsc::Receiver<BackendEvent>,
    events: EventSender,
    sessions: Registry,
    config: SessionConfig,
) {
    let stall_after = Duration::from_millis(config.stall_warn_after_ms);
    let mut stall_watch = interval(Duration::from_millis(config.stall_check_interval_ms.max(1)));
    stall_watch.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_chunk: Option<Instant> = None;

    loop {
        tokio::select! {
            event = backend.recv() => match event {
                Some(BackendEvent::Chunk(data)) => {
                    last_chunk = Some(Instant::now());
                    emit(&events, SessionEvent::AudioChunk { data });
                }
                Some(BackendEvent::Error(message)) => {
                    error!("session {} backend fault: {}", id, message);
                    let fault = OstinatoError::BackendFault { message };
                    let terminal = SessionEvent::SessionErrored {
                        message: fault.to_string(),
                    };
                    teardown(id, &sessions, &events, terminal).await;
                    return;
                }
                Some(BackendEvent::Closed) | None => {
                    info!("session {} closed by backend", id);
                    teardown(id, &sessions, &events, SessionEvent::stopped()).await;
                    return;
                }
            },
            _ = stall_watch.tick() => {
                if let Some(last) = last_chunk {
                    let silent = last.elapsed();
                    if silent > stall_after {
                        warn!("session {}: no audio from backend for {:.1}s", id, silent.as_secs_f64());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockConnector;

    fn hub(connector: Arc<MockConnector>) -> SessionHub {
        SessionHub::new(
            connector,
            Arc::new(|| Box::new(SongComposer::seeded(11)) as Box<dyn TimelineComposer>),
            Config::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop() {
        let connector = Arc::new(MockConnector::new());
        let hub = hub(connector.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        hub.start_session(id, StyleContext::default(), tx).await.unwrap();
        assert!(hub.is_active(id).await);
        assert!(matches!(rx.recv().await, Some(SessionEvent::SessionStarted { .. })));

        hub.stop_session(id).await.unwrap();
        assert!(!hub.is_active(id).await);
        assert!(connector.last_session().unwrap().is_closed());

        let mut terminal = 0;
        while let Ok(event) = rx.try_recv() {
            if event.is_terminal() {
                terminal += 1;
            }
        }
        assert_eq!(terminal, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_is_noop() {
        let hub = hub(Arc::new(MockConnector::new()));
        hub.stop_session(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_unknown_session() {
        let hub = hub(Arc::new(MockConnector::new()));
        let err = hub
            .update_session(Uuid::new_v4(), StyleContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");
    }
}
