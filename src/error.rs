//! Error handling for the tuning server
//!
//! This module defines the error taxonomy shared by the protocol codec, the
//! parameter registry, the probe pool and the network front ends, plus a
//! Result alias for use throughout the crate.

use thiserror::Error;

/// Main error type for tuning server operations
#[derive(Error, Debug)]
pub enum TuningError {
    /// Malformed or truncated command header
    #[error("Format error: {0}")]
    Format(String),

    /// Connection closed before a complete payload arrived
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// Command id outside every known namespace
    #[error("Unknown command id {0}")]
    UnknownCommand(u32),

    /// ISP parameter id with no registered descriptor
    #[error("Unknown module id {0}")]
    UnknownModule(u32),

    /// All probe tokens are in flight
    #[error("Probe pool exhausted")]
    PoolExhausted,

    /// Pipeline did not answer a probe in time
    #[error("Probe for module {module_id} timed out after {waited_ms} ms")]
    ProbeTimeout { module_id: u32, waited_ms: u64 },

    /// Socket level failures
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// The camera pipeline cannot answer yet (not started, no frames)
    #[error("Pipeline unavailable: {0}")]
    PipelineUnavailable(String),

    /// The camera pipeline rejected a request
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Errors related to configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// The OS refused to start a thread
    #[error("Failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Shutdown was requested while an operation was in progress
    #[error("Shutdown in progress")]
    Shutdown,

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TuningError>,
    },
}

impl TuningError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TuningError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error ends the session that hit it.
    ///
    /// Everything else is answered with an empty response and the
    /// connection stays open.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            TuningError::Format(_)
            | TuningError::ShortRead { .. }
            | TuningError::Socket(_)
            | TuningError::Shutdown => true,
            TuningError::WithContext { source, .. } => source.is_session_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for tuning server operations
pub type Result<T> = std::result::Result<T, TuningError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TuningError::Socket(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TuningError::Socket(e).with_context(f()))
    }
}
