//! Section conductor state machine
//!
//! `SectionConductor` holds the timeline position and decides, per tick,
//! which directive (if any) the generation backend should receive. It does
//! no I/O of its own: `ConductorDriver` owns the clock and performs pushes.
//!
//! ```text
//! Idle -> Running.Steady(i) <-> Running.Transitioning(i) -> Running.Steady(i+1) ...
//!                 \________________________________________/
//!                                    |
//!                                 Stopped
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::conductor::composer::{StyleContext, TimelineComposer};
use crate::conductor::section::{Section, Timeline};
use crate::error::Result;
use crate::session::events::{emit, EventSender, Phase, SessionEvent};

/// Observable conductor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConductorStatus {
    /// Created, never started
    Idle,
    /// Running on section `index`
    Running { index: usize, phase: Phase },
    /// Terminal
    Stopped,
}

impl fmt::Display for ConductorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConductorStatus::Idle => write!(f, "Idle"),
            ConductorStatus::Running {
                index,
                phase: Phase::Steady,
            } => write!(f, "Running.Steady({})", index),
            ConductorStatus::Running {
                index,
                phase: Phase::Transitioning,
            } => write!(f, "Running.Transitioning({})", index),
            ConductorStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Which backend operation a directive goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Steady,
    Transition,
}

/// A directive the driver must push to the generation session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub section_id: String,
    pub text: String,
}

/// Position within the held timeline
#[derive(Debug, Clone)]
pub struct ConductorState {
    pub timeline: Arc<Timeline>,
    pub current_index: usize,
    pub section_start: Instant,
    pub is_transitioning: bool,
    pub is_running: bool,
    stopped: bool,
}

/// Decides what the backend should be playing, one tick at a time
pub struct SectionConductor {
    state: ConductorState,
    composer: Box<dyn TimelineComposer>,
    style: StyleContext,
    events: EventSender,
}

impl SectionConductor {
    /// Create an idle conductor holding a freshly composed timeline
    pub fn new(
        mut composer: Box<dyn TimelineComposer>,
        style: StyleContext,
        events: EventSender,
    ) -> Result<Self> {
        let timeline = Arc::new(composer.compose(&style)?);
        Ok(Self {
            state: ConductorState {
                timeline,
                current_index: 0,
                section_start: Instant::now(),
                is_transitioning: false,
                is_running: false,
                stopped: false,
            },
            composer,
            style,
            events,
        })
    }

    pub fn state(&self) -> &ConductorState {
        &self.state
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.state.timeline
    }

    pub fn current_section(&self) -> &Section {
        // current_index is kept valid for the held timeline
        &self.state.timeline.sections()[self.state.current_index]
    }

    pub fn status(&self) -> ConductorStatus {
        if self.state.stopped {
            ConductorStatus::Stopped
        } else if !self.state.is_running {
            ConductorStatus::Idle
        } else {
            ConductorStatus::Running {
                index: self.state.current_index,
                phase: self.phase(),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    fn phase(&self) -> Phase {
        if self.state.is_transitioning {
            Phase::Transitioning
        } else {
            Phase::Steady
        }
    }

    /// Enter Steady on section 0
    ///
    /// Returns the first steady directive, or `None` if the conductor is
    /// already running or has been stopped.
    pub fn start(&mut self, now: Instant) -> Option<Directive> {
        if self.state.is_running || self.state.stopped {
            debug!("conductor start ignored ({})", self.status());
            return None;
        }

        self.state.is_running = true;
        self.state.current_index = 0;
        self.state.section_start = now;
        self.state.is_transitioning = false;

        info!(
            "conductor starting at '{}' (context: {})",
            self.current_section().id,
            self.state.timeline.global_context
        );
        Some(self.enter_section())
    }

    /// Move to the terminal state
    ///
    /// Returns false if the conductor was not running.
    pub fn stop(&mut self) -> bool {
        if self.state.stopped {
            return false;
        }
        let was_running = self.state.is_running;
        self.state.is_running = false;
        self.state.stopped = true;
        if was_running {
            info!("conductor stopped");
        }
        was_running
    }

    /// Evaluate the clock and return the directive to push, if any
    pub fn tick(&mut self, now: Instant) -> Option<Directive> {
        if !self.state.is_running {
            return None;
        }

        let elapsed_ms = now
            .saturating_duration_since(self.state.section_start)
            .as_millis() as u64;
        let (duration_ms, has_transition, window_ms) = {
            let section = self.current_section();
            (
                section.duration_ms,
                section.has_transition(),
                section.transition_window_ms,
            )
        };

        if elapsed_ms >= duration_ms {
            return Some(self.advance(now));
        }

        let remaining_ms = duration_ms - elapsed_ms;
        let directive = if !self.state.is_transitioning && has_transition && remaining_ms <= window_ms
        {
            self.begin_transition()
        } else {
            None
        };

        self.report_progress(now);
        directive
    }

    /// Emit a progress event for the active section without moving the clock
    ///
    /// The fraction is capped at 1.0 for a section that has overrun while
    /// no tick could advance it.
    pub fn report_progress(&self, now: Instant) {
        if !self.state.is_running {
            return;
        }
        let section = self.current_section();
        let elapsed_ms = now
            .saturating_duration_since(self.state.section_start)
            .as_millis() as u64;
        emit(
            &self.events,
            SessionEvent::Progress {
                section_id: section.id.clone(),
                fraction: (elapsed_ms as f64 / section.duration_ms as f64).min(1.0),
                phase: self.phase(),
            },
        );
    }

    /// Swap in a timeline composed from new style signals
    ///
    /// The active section keeps its index and elapsed time; nothing is
    /// pushed until the next transition or boundary.
    pub fn update_specification(&mut self, style: StyleContext) -> Result<()> {
        let timeline = Arc::new(self.composer.compose(&style)?);
        self.style = style;

        if self.state.current_index > timeline.last_index() {
            warn!(
                "new timeline has {} sections, clamping index {}",
                timeline.len(),
                self.state.current_index
            );
            self.state.current_index = timeline.last_index();
        }
        self.state.timeline = timeline;
        debug!(
            "timeline updated to revision {}",
            self.state.timeline.revision
        );
        Ok(())
    }

    fn advance(&mut self, now: Instant) -> Directive {
        let mut next = self.state.current_index + 1;

        if next >= self.state.timeline.len() {
            info!("timeline finished, composing a new one and looping");
            match self.composer.compose(&self.style) {
                Ok(timeline) => self.state.timeline = Arc::new(timeline),
                Err(e) => warn!("timeline regeneration failed, replaying current: {}", e),
            }
            next = 0;
        }

        self.state.current_index = next;
        self.state.section_start = now;
        self.state.is_transitioning = false;

        info!("advancing to '{}'", self.current_section().id);
        self.enter_section()
    }

    fn enter_section(&self) -> Directive {
        let timeline = &self.state.timeline;
        let section = self.current_section();

        emit(
            &self.events,
            SessionEvent::SectionChanged {
                id: section.id.clone(),
                directive_text: section.directive_text.clone(),
            },
        );

        Directive {
            kind: DirectiveKind::Steady,
            section_id: section.id.clone(),
            text: timeline.steady_directive(section),
        }
    }

    fn begin_transition(&mut self) -> Option<Directive> {
        let section = self.current_section();
        let text = self.state.timeline.transition_directive(section)?;
        let section_id = section.id.clone();

        self.state.is_transitioning = true;
        info!("morphing out of '{}'", section_id);

        Some(Directive {
            kind: DirectiveKind::Transition,
            section_id,
            text,
        })
    }
}
