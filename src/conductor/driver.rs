//! Clock and push serialization for one conductor
//!
//! The driver owns the conductor on a single task. Every tick interval it
//! asks the conductor what to push and hands the directive to the session
//! on a separate task, so a slow push never delays the clock. While a push
//! is outstanding, ticks are skipped rather than queued, though progress is
//! still reported. A push that outlives the push timeout is abandoned and
//! logged like any other transient failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::conductor::composer::StyleContext;
use crate::conductor::section_conductor::{Directive, DirectiveKind, SectionConductor};
use crate::config::ConductorConfig;
use crate::error::{OstinatoError, Result};
use crate::session::GenerationSession;

#[derive(Debug)]
enum DriverCommand {
    Update(StyleContext),
    Stop,
}

/// Handle to a running conductor task
pub struct ConductorDriver {
    commands: mpsc::UnboundedSender<DriverCommand>,
    task: Option<JoinHandle<SectionConductor>>,
}

impl ConductorDriver {
    /// Start `conductor` and arm its clock
    ///
    /// The first steady directive is pushed immediately.
    pub fn spawn(
        conductor: SectionConductor,
        session: Arc<dyn GenerationSession>,
        config: &ConductorConfig,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            conductor,
            session,
            config.tick_interval(),
            config.push_timeout(),
            rx,
        ));
        Self {
            commands,
            task: Some(task),
        }
    }

    /// Forward new style signals to the conductor
    pub fn update_specification(&self, style: StyleContext) -> Result<()> {
        self.commands
            .send(DriverCommand::Update(style))
            .map_err(|_| OstinatoError::DirectivePush {
                reason: "conductor is no longer running".to_string(),
            })
    }

    /// Disarm the clock, close the session and hand back the conductor
    ///
    /// Returns `None` if already stopped.
    pub async fn stop(&mut self) -> Option<SectionConductor> {
        let task = self.task.take()?;
        let _ = self.commands.send(DriverCommand::Stop);
        match task.await {
            Ok(conductor) => Some(conductor),
            Err(e) => {
                warn!("conductor task ended abnormally: {}", e);
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for ConductorDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn spawn_push(
    session: Arc<dyn GenerationSession>,
    directive: Directive,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let push = async {
            match directive.kind {
                DirectiveKind::Steady => session.push_steady_directive(&directive.text).await,
                DirectiveKind::Transition => {
                    session.push_transition_directive(&directive.text).await
                }
            }
        };
        match tokio::time::timeout(timeout, push).await {
            Ok(Ok(())) => debug!("pushed {:?} directive for '{}'", directive.kind, directive.section_id),
            Ok(Err(e)) => warn!(
                "{:?} directive push for '{}' failed: {}",
                directive.kind, directive.section_id, e
            ),
            Err(_) => warn!(
                "{:?} directive push for '{}' timed out after {:?}",
                directive.kind, directive.section_id, timeout
            ),
        }
    })
}

async fn drive(
    mut conductor: SectionConductor,
    session: Arc<dyn GenerationSession>,
    tick_interval: Duration,
    push_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
) -> SectionConductor {
    let mut in_flight = conductor
        .start(Instant::now())
        .map(|directive| spawn_push(Arc::clone(&session), directive, push_timeout));

    let mut clock = interval_at(Instant::now() + tick_interval, tick_interval);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = clock.tick() => {
                let busy = in_flight.as_ref().map_or(false, |push| !push.is_finished());
                if busy {
                    debug!("push still in flight, skipping tick");
                    conductor.report_progress(Instant::now());
                } else if let Some(directive) = conductor.tick(Instant::now()) {
                    in_flight = Some(spawn_push(Arc::clone(&session), directive, push_timeout));
                }
            }
            command = commands.recv() => match command {
                Some(DriverCommand::Update(style)) => {
                    if let Err(e) = conductor.update_specification(style) {
                        warn!("style update rejected, keeping current timeline: {}", e);
                    }
                }
                Some(DriverCommand::Stop) | None => break,
            },
        }
    }

    if let Some(push) = in_flight.take() {
        push.abort();
    }
    conductor.stop();
    if let Err(e) = session.close().await {
        warn!("session close failed: {}", e);
    }
    conductor
}
