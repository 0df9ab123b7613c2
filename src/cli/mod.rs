//! CLI Module
//!
//! Development harness for composing timelines and running offline sessions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::conductor::{Intensity, StyleContext};

/// Ostinato - conducted, gapless generative music sessions
#[derive(Parser, Debug)]
#[command(name = "ostinato")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compose a timeline and print it as JSON
    #[command(name = "timeline")]
    Timeline {
        /// Seed for reproducible composition
        #[arg(short, long)]
        seed: Option<u64>,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// Run a session against the mock backend into a scratch-file player
    #[command(name = "simulate")]
    Simulate {
        /// How long to run, in seconds
        #[arg(long, default_value_t = 20)]
        seconds: u64,

        /// Seed for reproducible composition
        #[arg(short, long)]
        seed: Option<u64>,

        /// Length of each synthetic chunk, in milliseconds
        #[arg(long, default_value_t = 500)]
        chunk_ms: u64,

        /// Scratch directory for prepared WAV chunks
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        #[command(flatten)]
        style: StyleArgs,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum IntensityArg {
    Low,
    #[default]
    Medium,
    High,
}

/// Listener style selections
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StyleArgs {
    /// Instrument to feature (repeatable)
    #[arg(long = "instrument")]
    pub instruments: Vec<String>,

    /// Genre (repeatable; the first one is used)
    #[arg(long = "genre")]
    pub genres: Vec<String>,

    /// Mood (repeatable)
    #[arg(long = "mood")]
    pub moods: Vec<String>,

    #[arg(long, value_enum, default_value_t = IntensityArg::Medium)]
    pub intensity: IntensityArg,
}

impl StyleArgs {
    pub fn to_style(&self) -> StyleContext {
        StyleContext {
            instruments: self.instruments.clone(),
            genres: self.genres.clone(),
            moods: self.moods.clone(),
            intensity: match self.intensity {
                IntensityArg::Low => Intensity::Low,
                IntensityArg::Medium => Intensity::Medium,
                IntensityArg::High => Intensity::High,
            },
        }
    }
}
