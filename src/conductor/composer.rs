//! Timeline composition
//!
//! The conductor never builds timelines itself; it asks a
//! `TimelineComposer` whenever it loops or the listener's style changes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::conductor::palette::{self, SONG_TEMPLATE};
use crate::conductor::section::{Section, Timeline};
use crate::error::Result;

/// Energy level used to pick palettes and tempo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    #[default]
    Medium,
    High,
}

impl Intensity {
    fn instruments(self) -> &'static [&'static str] {
        match self {
            Intensity::Low => palette::LOW_INSTRUMENTS,
            Intensity::Medium => palette::MEDIUM_INSTRUMENTS,
            Intensity::High => palette::HIGH_INSTRUMENTS,
        }
    }

    fn genres(self) -> &'static [&'static str] {
        match self {
            Intensity::Low => palette::LOW_GENRES,
            Intensity::Medium => palette::MEDIUM_GENRES,
            Intensity::High => palette::HIGH_GENRES,
        }
    }

    fn moods(self) -> &'static [&'static str] {
        match self {
            Intensity::Low => palette::LOW_MOODS,
            Intensity::Medium => palette::MEDIUM_MOODS,
            Intensity::High => palette::HIGH_MOODS,
        }
    }

    fn bpm_range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            Intensity::Low => 70..=95,
            Intensity::Medium => 100..=124,
            Intensity::High => 126..=174,
        }
    }
}

/// Listener-facing style signals the composer shapes timelines around
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleContext {
    pub instruments: Vec<String>,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
    pub intensity: Intensity,
}

/// Source of fresh timelines
pub trait TimelineComposer: Send {
    fn compose(&mut self, style: &StyleContext) -> Result<Timeline>;
}

/// Composer built on the nine-section song template
///
/// Explicit selections in the style context are used as-is; anything left
/// open is drawn from the palette matching the requested intensity.
pub struct SongComposer<R: RngCore = StdRng> {
    rng: R,
    revision: u64,
}

impl SongComposer<StdRng> {
    /// Composer seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible composer
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> SongComposer<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, revision: 0 }
    }

    fn pick(&mut self, options: &'static [&'static str]) -> String {
        options
            .choose(&mut self.rng)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn pick_many(&mut self, options: &'static [&'static str], count: usize) -> Vec<String> {
        options
            .choose_multiple(&mut self.rng, count)
            .map(|s| s.to_string())
            .collect()
    }

    fn global_context(&mut self, style: &StyleContext) -> String {
        let intensity = style.intensity;

        let genre = match style.genres.first() {
            Some(g) => g.clone(),
            None => self.pick(intensity.genres()),
        };
        let key = if self.rng.gen_bool(0.5) {
            self.pick(palette::MAJOR_KEYS)
        } else {
            self.pick(palette::MINOR_KEYS)
        };
        let bpm = self.rng.gen_range(intensity.bpm_range());
        let instruments = if style.instruments.is_empty() {
            self.pick_many(intensity.instruments(), 3)
        } else {
            style.instruments.clone()
        };
        let moods = if style.moods.is_empty() {
            self.pick_many(intensity.moods(), 1)
        } else {
            style.moods.clone()
        };

        format!(
            "Genre: {}. Key: {}. BPM: {}. Instruments: {}. Mood: {}. High fidelity, studio master.",
            genre,
            key,
            bpm,
            instruments.join(", "),
            moods.join(", ")
        )
    }
}

impl<R: RngCore + Send> TimelineComposer for SongComposer<R> {
    fn compose(&mut self, style: &StyleContext) -> Result<Timeline> {
        self.revision += 1;
        let context = self.global_context(style);

        let sections = SONG_TEMPLATE
            .iter()
            .map(|&(id, directive, duration, window, transition)| {
                let section = Section::new(id, directive, duration);
                match transition {
                    Some(t) => section.with_transition(window, t),
                    None => section,
                }
            })
            .collect();

        Timeline::new(self.revision, context, sections)
    }
}
