//! CLI Command Implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conductor::{SongComposer, StyleContext, TimelineComposer};
use crate::config::Config;
use crate::error::Result;
use crate::playback::{GaplessEngine, PcmFormat, WavScratchOutput};
use crate::session::{ComposerFactory, MockConnector, SessionEvent, SessionHub};

fn composer_factory(seed: Option<u64>) -> ComposerFactory {
    match seed {
        Some(seed) => {
            Arc::new(move || Box::new(SongComposer::seeded(seed)) as Box<dyn TimelineComposer>)
        }
        None => Arc::new(|| Box::new(SongComposer::from_entropy()) as Box<dyn TimelineComposer>),
    }
}

/// Compose one timeline and print it as pretty JSON
pub fn print_timeline(seed: Option<u64>, style: &StyleContext) -> Result<()> {
    let mut composer = composer_factory(seed)();
    let timeline = composer.compose(style)?;
    println!("{}", serde_json::to_string_pretty(&timeline)?);
    Ok(())
}

/// Counters collected during a simulated session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    pub chunks: usize,
    pub sections: Vec<String>,
    pub errored: bool,
}

/// Options for `simulate`
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub duration: Duration,
    pub seed: Option<u64>,
    pub chunk_ms: u64,
    pub scratch_dir: Option<PathBuf>,
    pub style: StyleContext,
}

/// Run one session against the mock backend, playing into scratch files
pub async fn simulate(config: Config, options: SimulateOptions) -> Result<SimulationReport> {
    let format = PcmFormat::from_config(&config.playback);
    let connector = Arc::new(MockConnector::with_audio(format, options.chunk_ms));
    let output = match &options.scratch_dir {
        Some(dir) => WavScratchOutput::new(dir)?,
        None => WavScratchOutput::in_temp_dir()?,
    };
    info!("scratch files in {}", output.dir().display());

    let engine = GaplessEngine::new(output, config.playback.clone());
    let hub = SessionHub::new(connector, composer_factory(options.seed), config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    hub.start_session(id, options.style.clone(), tx).await?;

    let mut report = SimulationReport::default();
    let deadline = Instant::now() + options.duration;
    loop {
        let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => break,
        };
        let terminal = event.is_terminal();
        record_event(&engine, &mut report, event);
        if terminal {
            break;
        }
    }

    hub.stop_session(id).await?;
    while let Ok(event) = rx.try_recv() {
        record_event(&engine, &mut report, event);
    }
    engine.clear_and_wait().await;

    println!(
        "Simulated {:.1}s: {} chunks, {} sections ({})",
        options.duration.as_secs_f64(),
        report.chunks,
        report.sections.len(),
        report.sections.join(" -> ")
    );
    Ok(report)
}

fn record_event(engine: &GaplessEngine<WavScratchOutput>, report: &mut SimulationReport, event: SessionEvent) {
    match event {
        SessionEvent::AudioChunk { data } => {
            report.chunks += 1;
            engine.enqueue(data);
        }
        SessionEvent::SectionChanged { id, directive_text } => {
            info!("section '{}': {}", id, directive_text);
            report.sections.push(id);
        }
        SessionEvent::Progress {
            section_id,
            fraction,
            phase,
        } => {
            debug!("{} {:.0}% ({:?})", section_id, fraction * 100.0, phase);
        }
        SessionEvent::SessionErrored { message } => {
            warn!("session errored: {}", message);
            report.errored = true;
        }
        SessionEvent::SessionStarted { .. } => info!("session started"),
        SessionEvent::SessionStopped { .. } => info!("session stopped"),
    }
}
