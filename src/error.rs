use crate::command::ExitCode;
use thiserror::Error;

/// User-level failures reported by the session loop.
///
/// Every variant renders with its own context (the command or built-in that
/// failed), so the loop only has to prepend `<program>: <line>: `.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No built-in and no executable matched the command name.
    #[error("{0}: not found")]
    NotFound(String),

    /// The executable was found but the kernel refused to run it.
    #[error("{command}: {reason}")]
    CannotExecute { command: String, reason: String },

    /// `exit` got an argument that is not a non-negative integer.
    #[error("exit: Illegal number: {0}")]
    IllegalNumber(String),

    /// `cd` could not switch to the requested directory.
    #[error("cd: can't cd to {0}")]
    CantCd(String),

    /// A built-in rejected its argument list.
    #[error("{command}: {message}")]
    Usage { command: String, message: String },

    /// A built-in ran but could not do what was asked.
    #[error("{command}: {message}")]
    Builtin { command: String, message: String },
}

impl ShellError {
    /// Status stored in `$?` after this error.
    pub fn status(&self) -> ExitCode {
        match self {
            ShellError::NotFound(_) => 127,
            ShellError::CannotExecute { .. } => 126,
            ShellError::IllegalNumber(_) | ShellError::CantCd(_) | ShellError::Usage { .. } => 2,
            ShellError::Builtin { .. } => 1,
        }
    }

    pub(crate) fn builtin(command: &str, message: impl Into<String>) -> Self {
        ShellError::Builtin {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

/// Status for an arbitrary error coming out of a command.
///
/// Errors that are not a [`ShellError`] (I/O failures while writing output and
/// the like) count as a generic failure.
pub fn status_of(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<ShellError>()
        .map(ShellError::status)
        .unwrap_or(1)
}
