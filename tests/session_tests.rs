//! Session Tests
//!
//! Hub lifecycle against the mock backend: start, relay, update, stop and
//! backend-initiated teardown, all in virtual time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

use ostinato::conductor::{DirectiveKind, SongComposer, StyleContext, TimelineComposer};
use ostinato::config::{Config, SessionConfig};
use ostinato::playback::{PcmFormat, WireChunk};
use ostinato::session::{
    BackendEvent, EventReceiver, MockConnector, Phase, SessionConnector, SessionEvent, SessionHub,
    SessionLink,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn hub(connector: Arc<MockConnector>) -> SessionHub {
    SessionHub::new(
        connector,
        Arc::new(|| Box::new(SongComposer::seeded(21)) as Box<dyn TimelineComposer>),
        Config::default(),
    )
}

/// Connector that takes `delay` to open each mock session
struct SlowConnector {
    inner: Arc<MockConnector>,
    delay: Duration,
}

#[async_trait]
impl SessionConnector for SlowConnector {
    async fn connect(&self, config: &SessionConfig) -> ostinato::Result<SessionLink> {
        sleep(self.delay).await;
        self.inner.connect(config).await
    }
}

fn slow_hub(inner: Arc<MockConnector>, delay: Duration) -> SessionHub {
    SessionHub::new(
        Arc::new(SlowConnector { inner, delay }),
        Arc::new(|| Box::new(SongComposer::seeded(21)) as Box<dyn TimelineComposer>),
        Config::default(),
    )
}

fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn terminal_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

// === Lifecycle ===

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle_with_audio() {
    let connector = Arc::new(MockConnector::with_audio(PcmFormat::default(), 500));
    let hub = hub(connector.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    sleep(ms(3_000)).await;
    hub.stop_session(id).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(events[0], SessionEvent::SessionStarted { .. }));
    let first_change = events
        .iter()
        .find(|e| matches!(e, SessionEvent::SectionChanged { .. }));
    assert!(matches!(
        first_change,
        Some(SessionEvent::SectionChanged { id, .. }) if id == "Intro"
    ));
    let chunks = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::AudioChunk { .. }))
        .count();
    assert!(chunks >= 5, "only {} chunks relayed", chunks);
    assert!(matches!(events.last(), Some(SessionEvent::SessionStopped { .. })));
    assert_eq!(terminal_count(&events), 1);

    let session = connector.last_session().unwrap();
    assert!(session.is_closed());
    assert_eq!(session.directives()[0].kind, DirectiveKind::Steady);

    sleep(ms(2_000)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_is_rejected() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx, _rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx.clone())
        .await
        .unwrap();
    let err = hub
        .start_session(id, StyleContext::default(), tx)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "SESSION_ALREADY_ACTIVE");
    assert_eq!(connector.sessions().len(), 1);

    hub.stop_session(id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_emits_one_stopped() {
    let hub = hub(Arc::new(MockConnector::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    hub.stop_session(id).await.unwrap();
    hub.stop_session(id).await.unwrap();

    assert_eq!(terminal_count(&drain(&mut rx)), 1);
    assert!(hub.active_sessions().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_reports_error() {
    let connector = Arc::new(MockConnector::new());
    connector.set_connect_failure(true);
    let hub = hub(connector);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    let err = hub
        .start_session(id, StyleContext::default(), tx)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!hub.is_active(id).await);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::SessionErrored { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting_emits_only_stopped() {
    let connector = Arc::new(MockConnector::new());
    let hub = slow_hub(connector.clone(), ms(100));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    let starting = tokio::spawn({
        let hub = hub.clone();
        async move { hub.start_session(id, StyleContext::default(), tx).await }
    });
    sleep(ms(10)).await;
    assert!(hub.is_active(id).await);
    hub.stop_session(id).await.unwrap();

    starting.await.unwrap().unwrap();
    sleep(ms(2_000)).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1, "unexpected events {:?}", events);
    assert!(matches!(events[0], SessionEvent::SessionStopped { .. }));
    assert!(!hub.is_active(id).await);

    let session = connector.last_session().unwrap();
    assert!(session.is_closed());
    assert!(session.directives().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_during_stale_connect_keeps_new_session() {
    let connector = Arc::new(MockConnector::new());
    let hub = slow_hub(connector.clone(), ms(100));
    let (tx_old, mut rx_old) = mpsc::unbounded_channel();
    let (tx_new, mut rx_new) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    let first = tokio::spawn({
        let hub = hub.clone();
        async move { hub.start_session(id, StyleContext::default(), tx_old).await }
    });
    sleep(ms(10)).await;
    hub.stop_session(id).await.unwrap();
    let second = tokio::spawn({
        let hub = hub.clone();
        async move { hub.start_session(id, StyleContext::default(), tx_new).await }
    });

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    sleep(ms(100)).await;

    // The first connect finished while the second attempt held the slot
    assert!(hub.is_active(id).await);
    let sessions = connector.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_closed());
    assert!(sessions[0].directives().is_empty());
    assert!(!sessions[1].is_closed());

    let old = drain(&mut rx_old);
    assert_eq!(old.len(), 1);
    assert!(matches!(old[0], SessionEvent::SessionStopped { .. }));
    let new = drain(&mut rx_new);
    assert!(matches!(new[0], SessionEvent::SessionStarted { .. }));
    assert_eq!(terminal_count(&new), 0);

    hub.stop_session(id).await.unwrap();
    assert_eq!(terminal_count(&drain(&mut rx_new)), 1);
}

// === Backend Teardown ===

#[tokio::test(start_paused = true)]
async fn test_backend_fault_emits_single_error() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    sleep(ms(1_000)).await;

    let session = connector.last_session().unwrap();
    assert!(session.inject(BackendEvent::Error("model crashed".into())).await);
    sleep(ms(100)).await;

    assert!(!hub.is_active(id).await);
    assert!(session.is_closed());

    hub.stop_session(id).await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(terminal_count(&events), 1);
    match events.last() {
        Some(SessionEvent::SessionErrored { message }) => assert!(message.contains("model crashed")),
        other => panic!("expected an error event, got {:?}", other),
    }

    // The clock is disarmed: no more pushes
    let pushes = session.directives().len();
    sleep(ms(20_000)).await;
    assert_eq!(session.directives().len(), pushes);
}

#[tokio::test(start_paused = true)]
async fn test_backend_close_stops_session() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    let session = connector.last_session().unwrap();
    session.inject(BackendEvent::Closed).await;
    sleep(ms(100)).await;

    assert!(!hub.is_active(id).await);
    let events = drain(&mut rx);
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last(), Some(SessionEvent::SessionStopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_chunks_relayed_in_arrival_order() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    let session = connector.last_session().unwrap();
    let sent: Vec<WireChunk> = (1..=5i16).map(|t| WireChunk::from_samples(&[t, t])).collect();
    for chunk in &sent {
        session.inject(BackendEvent::Chunk(chunk.clone())).await;
    }
    sleep(ms(10)).await;

    let relayed: Vec<WireChunk> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::AudioChunk { data } => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(relayed, sent);

    hub.stop_session(id).await.unwrap();
}

// === Updates and Isolation ===

#[tokio::test(start_paused = true)]
async fn test_update_reaches_next_transition() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx, _rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();

    hub.start_session(id, StyleContext::default(), tx).await.unwrap();
    sleep(ms(1_000)).await;
    hub.update_session(
        id,
        StyleContext {
            genres: vec!["Bossa Nova".to_string()],
            ..StyleContext::default()
        },
    )
    .await
    .unwrap();

    // Intro is 15s with a 5s window: the transition goes out at 10s
    sleep(ms(10_000)).await;
    let pushed = connector.last_session().unwrap().directives();
    assert_eq!(pushed.len(), 2);
    assert!(!pushed[0].text.contains("Bossa Nova"));
    assert_eq!(pushed[1].kind, DirectiveKind::Transition);
    assert!(pushed[1].text.starts_with("Genre: Bossa Nova."));

    hub.stop_session(id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let connector = Arc::new(MockConnector::new());
    let hub = hub(connector.clone());
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    hub.start_session(a, StyleContext::default(), tx_a).await.unwrap();
    hub.start_session(b, StyleContext::default(), tx_b).await.unwrap();
    hub.stop_session(a).await.unwrap();
    sleep(ms(16_000)).await;

    assert!(!hub.is_active(a).await);
    assert!(hub.is_active(b).await);
    let sessions = connector.sessions();
    assert!(sessions[0].is_closed());
    assert!(!sessions[1].is_closed());
    // Session b kept conducting: intro steady, transition, verse steady
    assert_eq!(sessions[1].directives().len(), 3);

    assert_eq!(terminal_count(&drain(&mut rx_a)), 1);
    assert_eq!(terminal_count(&drain(&mut rx_b)), 0);
    hub.stop_all().await;
    assert!(hub.active_sessions().await.is_empty());
}

// === Event Wire Shape ===

#[test]
fn test_event_json_shape() {
    let changed = SessionEvent::SectionChanged {
        id: "Verse 1".to_string(),
        directive_text: "steady groove".to_string(),
    };
    assert_eq!(
        serde_json::to_value(&changed).unwrap(),
        json!({"type": "section_changed", "id": "Verse 1", "directive_text": "steady groove"})
    );

    let progress = SessionEvent::Progress {
        section_id: "Intro".to_string(),
        fraction: 0.5,
        phase: Phase::Transitioning,
    };
    assert_eq!(
        serde_json::to_value(&progress).unwrap(),
        json!({"type": "progress", "section_id": "Intro", "fraction": 0.5, "phase": "transitioning"})
    );

    let chunk = SessionEvent::AudioChunk {
        data: WireChunk::new("AAAA"),
    };
    assert_eq!(
        serde_json::to_value(&chunk).unwrap(),
        json!({"type": "audio_chunk", "data": "AAAA"})
    );

    let parsed: SessionEvent =
        serde_json::from_value(json!({"type": "session_errored", "message": "boom"})).unwrap();
    assert!(parsed.is_terminal());
}
