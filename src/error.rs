//! Error handling for Ostinato
//!
//! Errors are grouped by how the pipeline reacts to them: transient faults are
//! logged and absorbed, fatal faults end the session.

use thiserror::Error;

/// Result type alias for Ostinato operations
pub type Result<T> = std::result::Result<T, OstinatoError>;

/// Main error type for Ostinato operations
#[derive(Error, Debug)]
pub enum OstinatoError {
    // Conductor Errors
    #[error("Directive push failed: {reason}")]
    DirectivePush { reason: String },

    #[error("Invalid timeline: {reason}")]
    InvalidTimeline { reason: String },

    // Backend Errors
    #[error("Backend stream fault: {message}")]
    BackendFault { message: String },

    #[error("Backend connection failed: {reason}")]
    BackendConnect { reason: String },

    // Chunk Errors
    #[error("Chunk decode failed: {reason}")]
    ChunkDecode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Chunk of {len} bytes is not aligned to {frame_bytes}-byte frames")]
    MisalignedChunk { len: usize, frame_bytes: usize },

    #[error("Chunk contains no samples")]
    EmptyChunk,

    // Playback Errors
    #[error("Playback start failed: {reason}")]
    PlaybackStart { reason: String },

    #[error("Resource release failed: {reason}")]
    ResourceRelease { reason: String },

    // Session Errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session already active: {id}")]
    SessionAlreadyActive { id: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OstinatoError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            OstinatoError::DirectivePush { .. } => "DIRECTIVE_PUSH",
            OstinatoError::InvalidTimeline { .. } => "INVALID_TIMELINE",
            OstinatoError::BackendFault { .. } => "BACKEND_FAULT",
            OstinatoError::BackendConnect { .. } => "BACKEND_CONNECT",
            OstinatoError::ChunkDecode { .. } => "CHUNK_DECODE",
            OstinatoError::MisalignedChunk { .. } => "MISALIGNED_CHUNK",
            OstinatoError::EmptyChunk => "EMPTY_CHUNK",
            OstinatoError::PlaybackStart { .. } => "PLAYBACK_START",
            OstinatoError::ResourceRelease { .. } => "RESOURCE_RELEASE",
            OstinatoError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            OstinatoError::SessionAlreadyActive { .. } => "SESSION_ALREADY_ACTIVE",
            OstinatoError::InvalidConfig { .. } => "INVALID_CONFIG",
            OstinatoError::Io(_) => "IO_ERROR",
            OstinatoError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error ends the session it occurred in
    ///
    /// Only backend faults are fatal. Everything the conductor or the
    /// playback pipeline hits mid-stream is absorbed and logged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OstinatoError::BackendFault { .. } | OstinatoError::BackendConnect { .. }
        )
    }

    /// Check if the pipeline keeps running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            OstinatoError::DirectivePush { .. } => true,
            OstinatoError::ChunkDecode { .. } => true,
            OstinatoError::MisalignedChunk { .. } => true,
            OstinatoError::EmptyChunk => true,
            OstinatoError::PlaybackStart { .. } => true,
            OstinatoError::ResourceRelease { .. } => true,
            _ => false,
        }
    }

    /// Build a decode error from any source error
    pub fn decode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OstinatoError::ChunkDecode {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}
