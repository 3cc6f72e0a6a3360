use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

/// Error severity for UI display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // informational
    Warning,  // recoverable, user may retry
    Error,    // operation failed
    Critical, // requires user action (e.g. fix settings)
}

/// Failures surfaced by the node bridge.
///
/// Every bridge call reports exactly one of these to its caller; nothing is
/// retried or swallowed inside the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Interpreter could not be located or launched.
    #[error("Could not launch interpreter '{}': {message}", interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        message: String,
    },

    /// Interpreter ran past the configured bound and was killed.
    #[error("Interpreter did not finish within {}ms and was terminated", timeout.as_millis())]
    Timeout { timeout: Duration },

    /// The generated script raised inside the interpreter.
    #[error("Interpreter exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Output markers were missing and strict output checking is enabled.
    #[error("Interpreter output for {operation} is missing marker '{marker}'")]
    MalformedOutput {
        operation: &'static str,
        marker: &'static str,
    },

    /// The caller cancelled the call.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The transient script file could not be written.
    #[error("Failed to prepare script file: {0}")]
    ScriptFile(#[source] std::io::Error),

    /// The worker lane went away before replying.
    #[error("Bridge worker stopped before replying")]
    Disconnected,

    /// A transport answered with a response of the wrong kind.
    #[error("Transport returned an unexpected response for {operation}")]
    UnexpectedResponse { operation: &'static str },
}

impl BridgeError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Spawn { .. } => ErrorSeverity::Critical,
            Self::Timeout { .. } => ErrorSeverity::Error,
            Self::NonZeroExit { .. } => ErrorSeverity::Error,
            Self::MalformedOutput { .. } => ErrorSeverity::Warning,
            Self::Cancelled => ErrorSeverity::Info,
            Self::ScriptFile(_) => ErrorSeverity::Error,
            Self::Disconnected => ErrorSeverity::Error,
            Self::UnexpectedResponse { .. } => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Spawn { interpreter, .. } => format!(
                "Could not start Houdini at {}. Check the Houdini path in Settings.",
                interpreter.display()
            ),
            Self::Timeout { timeout } => format!(
                "Houdini took longer than {} seconds and was stopped.",
                timeout.as_secs()
            ),
            Self::NonZeroExit { stderr, .. } => {
                format!("Houdini execution failed:\n{}", stderr)
            }
            Self::MalformedOutput { operation, .. } => {
                format!("Houdini returned no usable result for {}.", operation)
            }
            Self::Cancelled => "Operation cancelled.".to_string(),
            Self::ScriptFile(e) => format!("Could not write temporary script: {}", e),
            Self::Disconnected => "The Houdini worker stopped unexpectedly.".to_string(),
            Self::UnexpectedResponse { operation } => {
                format!("Houdini returned an unexpected reply for {}.", operation)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use vfx_launcher::error::ResultExt;
///
/// // Log and continue if the registry file can't be written
/// registry.persist().log_err();
///
/// // Log as warning for expected failures
/// let previous = read_previous_pids().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
