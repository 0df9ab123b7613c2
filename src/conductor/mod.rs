//! Server-side section conductor
//!
//! Walks a timeline of musical sections and tells the generation backend
//! what to play: one steady directive per section, plus one transition
//! directive shortly before each boundary.

pub mod composer;
pub mod driver;
pub mod palette;
pub mod section;
pub mod section_conductor;

pub use composer::{Intensity, SongComposer, StyleContext, TimelineComposer};
pub use driver::ConductorDriver;
pub use section::{Section, Timeline};
pub use section_conductor::{
    ConductorState, ConductorStatus, Directive, DirectiveKind, SectionConductor,
};
