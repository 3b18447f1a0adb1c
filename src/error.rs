//! Unified error handling for rolecall.
//!
//! Command-level failures carry enough context to render a message for the
//! invoking operator, plus a static code for metric labeling. Platform
//! failures are wrapped rather than flattened so callers can still ask
//! whether a remote call was a permission denial.

use crate::platform::PlatformError;
use thiserror::Error;

/// Errors raised by operator-facing flows (registration, verification
/// setup, the verify grant).
#[derive(Debug, Error)]
pub enum CommandError {
    /// Preflight capability check failed; nothing was posted or persisted.
    #[error("missing permissions: {}", .0.join(", "))]
    InsufficientPermissions(Vec<&'static str>),

    /// A pairs entry violated the `EMOJI=ROLE` syntax.
    #[error("malformed pair: '{0}' (expected EMOJI=ROLE)")]
    MalformedPair(String),

    /// A referenced role could not be resolved in the guild.
    #[error("unknown role: '{0}'")]
    UnknownRole(String),

    /// A remote call failed after validation passed.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Store write failures and other local surprises.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Static error code for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientPermissions(_) => "insufficient_permissions",
            Self::MalformedPair(_) => "malformed_pair",
            Self::UnknownRole(_) => "unknown_role",
            Self::Platform(e) => e.error_code(),
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message for the ephemeral reply to the invoking operator.
    ///
    /// Validation failures name the offending input; remote failures stay
    /// generic so API internals never leak into chat.
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientPermissions(missing) => {
                format!("I'm missing permissions here: {}", missing.join(", "))
            }
            Self::MalformedPair(entry) => {
                format!("Couldn't read `{entry}`: each entry must look like `EMOJI=ROLE`.")
            }
            Self::UnknownRole(name) => {
                format!("No role called `{name}` exists in this server.")
            }
            Self::Platform(e) if e.is_denied() => {
                "Discord rejected that: my role is probably below the one I'm managing.".to_string()
            }
            Self::Platform(_) => "Discord rejected that request. Try again in a moment.".to_string(),
            Self::Internal(_) => "Something went wrong on my side.".to_string(),
        }
    }
}

/// Result type for operator-facing flows.
pub type CommandResult<T> = Result<T, CommandError>;
