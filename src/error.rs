/// Unified error handling for wita
///
/// Every failure the daemon can run into is classified here. Most of them are
/// absorbed where they happen (a failed probe only marks a server down, a bad
/// query only gets a `FAIL` line); the variants that reach `main` terminate
/// the process with exit code 1.

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for wita operations
#[derive(Debug, Error)]
pub enum WitaError {
    /// Roster or settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The health check engine lost track of a server
    #[error("Health check error: {0}")]
    Probe(#[from] ProbeError),

    /// The resolver side of the pipe misbehaved or went away
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Signal handlers could not be installed
    #[error("Signal setup failed: {0}")]
    Signal(io::Error),

    /// Runtime or event source setup failed
    #[error("Startup error: {message}")]
    Startup { message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Parse error: {0}")]
    TomlError(String),

    #[error("Cannot resolve {host}: {message}")]
    ResolveError { host: String, message: String },

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Health check engine errors
///
/// Ordinary probe failures are not errors at all, they only mark a server
/// down. What remains is the case where a server would silently stop being
/// probed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{server}: cannot set timer for next check: {reason}")]
    LostServer { server: String, reason: String },
}

/// Front-end pipe errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("read more than {capacity} bytes from the resolver without a newline")]
    Overflow { capacity: usize },

    #[error("read from the resolver failed: {0}")]
    Read(io::Error),

    #[error("write to the resolver failed: {0}")]
    Write(io::Error),
}

/// Result type alias for wita operations
pub type WitaResult<T> = Result<T, WitaError>;

impl WitaError {
    /// Create a startup error
    pub fn startup<S: Into<String>>(message: S) -> Self {
        WitaError::Startup {
            message: message.into(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WitaError::Probe(_) => ErrorSeverity::Critical,
            WitaError::Protocol(ProtocolError::Overflow { .. }) => ErrorSeverity::Critical,
            WitaError::Protocol(_) => ErrorSeverity::Error,
            WitaError::Config(_) => ErrorSeverity::Error,
            WitaError::Signal(_) | WitaError::Startup { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether the message should be prefixed with the lost-server notice
    pub fn is_state_inconsistency(&self) -> bool {
        matches!(self, WitaError::Probe(ProbeError::LostServer { .. }))
    }
}

impl ProbeError {
    pub fn lost_server<S: Into<String>, R: fmt::Display>(server: S, reason: R) -> Self {
        ProbeError::LostServer {
            server: server.into(),
            reason: reason.to_string(),
        }
    }
}

impl ConfigError {
    pub fn parse<S: Into<String>>(line: usize, message: S) -> Self {
        ConfigError::ParseError {
            line,
            message: message.into(),
        }
    }

    pub fn resolve<S: Into<String>, M: fmt::Display>(host: S, message: M) -> Self {
        ConfigError::ResolveError {
            host: host.into(),
            message: message.to_string(),
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The process cannot continue
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
        }
    }
}
