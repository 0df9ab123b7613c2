//! Sections and timelines
//!
//! A `Timeline` is immutable once composed. The conductor swaps whole
//! timelines (behind an `Arc`) rather than editing one in place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OstinatoError, Result};

/// A timed segment of the generated piece
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Display identity ("Intro", "Verse 1", ...)
    pub id: String,
    /// Steady-state description of the section's sound
    pub directive_text: String,
    pub duration_ms: u64,
    /// Window before the section's end in which the transition fires
    pub transition_window_ms: u64,
    /// One-shot morph instruction issued near the end, if any
    pub transition_directive: Option<String>,
}

impl Section {
    pub fn new(id: impl Into<String>, directive_text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            directive_text: directive_text.into(),
            duration_ms,
            transition_window_ms: 0,
            transition_directive: None,
        }
    }

    /// Attach a transition instruction fired `window_ms` before the end
    pub fn with_transition(mut self, window_ms: u64, instruction: impl Into<String>) -> Self {
        self.transition_window_ms = window_ms;
        self.transition_directive = Some(instruction.into());
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn has_transition(&self) -> bool {
        self.transition_directive
            .as_deref()
            .map_or(false, |t| !t.trim().is_empty())
    }
}

/// Ordered, loopable sequence of sections plus shared context text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Bumped by the composer for every timeline it produces
    pub revision: u64,
    /// Prefixed to every directive pushed for this timeline
    pub global_context: String,
    sections: Vec<Section>,
}

impl Timeline {
    /// Build a timeline, rejecting empty or zero-length section lists
    pub fn new(revision: u64, global_context: impl Into<String>, sections: Vec<Section>) -> Result<Self> {
        if sections.is_empty() {
            return Err(OstinatoError::InvalidTimeline {
                reason: "timeline has no sections".to_string(),
            });
        }
        if let Some(s) = sections.iter().find(|s| s.duration_ms == 0) {
            return Err(OstinatoError::InvalidTimeline {
                reason: format!("section '{}' has zero duration", s.id),
            });
        }

        Ok(Self {
            revision,
            global_context: global_context.into(),
            sections,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.sections.len() - 1
    }

    /// Sum of every section's duration
    pub fn total_duration_ms(&self) -> u64 {
        self.sections.iter().map(|s| s.duration_ms).sum()
    }

    /// Steady directive: `"{context} {section}"`
    pub fn steady_directive(&self, section: &Section) -> String {
        format!("{} {}", self.global_context.trim_end(), section.directive_text)
    }

    /// Transition directive: "currently X, but now moving toward Y"
    ///
    /// Returns `None` for sections without a transition instruction.
    pub fn transition_directive(&self, section: &Section) -> Option<String> {
        let instruction = section.transition_directive.as_deref()?;
        Some(format!(
            "{} Currently {} BUT NOW {}",
            self.global_context.trim_end(),
            section.directive_text,
            instruction
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Timeline {
        Timeline::new(
            1,
            "Genre: Deep House. ",
            vec![
                Section::new("Intro", "Atmospheric pads.", 15_000)
                    .with_transition(5_000, "Introducing hi-hats."),
                Section::new("Outro", "Fading into reverb.", 10_000),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_total_duration_is_sum_of_sections() {
        assert_eq!(sample().total_duration_ms(), 25_000);
    }

    #[test]
    fn test_empty_timeline_rejected() {
        let err = Timeline::new(0, "ctx", vec![]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TIMELINE");
    }

    #[test]
    fn test_zero_duration_section_rejected() {
        let err = Timeline::new(0, "ctx", vec![Section::new("A", "x", 0)]).unwrap_err();
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn test_directive_shapes() {
        let timeline = sample();
        let intro = timeline.section(0).unwrap();
        assert_eq!(
            timeline.steady_directive(intro),
            "Genre: Deep House. Atmospheric pads."
        );
        assert_eq!(
            timeline.transition_directive(intro).unwrap(),
            "Genre: Deep House. Currently Atmospheric pads. BUT NOW Introducing hi-hats."
        );

        let outro = timeline.section(1).unwrap();
        assert!(!outro.has_transition());
        assert!(timeline.transition_directive(outro).is_none());
    }
}
