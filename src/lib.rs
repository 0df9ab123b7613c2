//! Ostinato - conducted generative music sessions with gapless playback
//!
//! Two independent halves:
//! - `conductor` walks a timeline of musical sections and pushes steady and
//!   transition directives to a streaming generation backend on a fixed clock.
//! - `playback` turns the resulting stream of PCM chunks into uninterrupted
//!   sound by preloading ahead and handing off just before each chunk ends.
//!
//! `session` ties a conductor to a backend session per listener and relays
//! audio and lifecycle events upward.

pub mod cli;
pub mod conductor;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod telemetry;

pub use config::Config;
pub use error::{OstinatoError, Result};
