//! Error types used by the deskvisor runtime, its listeners and callbacks.
//!
//! - [`RuntimeError`]: errors returned by the runtime loop itself ([`Runtime::run`](crate::Runtime::run)).
//! - [`TaskError`]: errors returned by any tracked unit of work: listener start-up,
//!   composed callbacks and supervisor hooks. Only [`TaskError::Fatal`] brings the
//!   runtime down; everything else is logged and the loop keeps going.
//! - [`RegistryError`]: object registry lookups and registrations.
//! - [`ProcessError`]: launching supervised or one-shot child processes.
//! - [`KeyError`]: building a listener key from typed attributes.
//!
//! All types provide `as_label` for stable, snake_case log fields.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the runtime loop.
///
/// Every variant is process-fatal: the entry point maps them to a non-zero exit status.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An explicitly requested settings file does not exist.
    #[error("config file not found at '{}'", path.display())]
    ConfigNotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// The settings file exists but could not be read or parsed.
    #[error("invalid config file '{}': {error}", path.display())]
    ConfigInvalid {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser or I/O message.
        error: String,
    },

    /// A plugin failed while declaring its listeners and callbacks.
    #[error("plugin '{plugin}' failed to register: {error}")]
    Declaration {
        /// Plugin name.
        plugin: String,
        /// Underlying error message.
        error: String,
    },

    /// Termination signal handlers could not be installed.
    #[error("failed to install signal handlers: {error}")]
    Signal {
        /// Underlying I/O message.
        error: String,
    },

    /// A tracked task escalated a fatal error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The escalated error message.
        error: String,
    },

    /// Tracked tasks did not finish within the shutdown grace period.
    #[error("shutdown timeout {grace:?} exceeded; {pending} task(s) still pending")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Number of tasks still tracked when the grace period ran out.
        pending: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use deskvisor::RuntimeError;
    ///
    /// let err = RuntimeError::Fatal { error: "boom".into() };
    /// assert_eq!(err.as_label(), "runtime_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::ConfigNotFound { .. } => "runtime_config_not_found",
            RuntimeError::ConfigInvalid { .. } => "runtime_config_invalid",
            RuntimeError::Declaration { .. } => "runtime_declaration",
            RuntimeError::Signal { .. } => "runtime_signal",
            RuntimeError::Fatal { .. } => "runtime_fatal",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns the underlying message without the variant prefix.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::ConfigNotFound { path } => path.display().to_string(),
            RuntimeError::ConfigInvalid { error, .. }
            | RuntimeError::Declaration { error, .. }
            | RuntimeError::Signal { error }
            | RuntimeError::Fatal { error } => error.clone(),
            RuntimeError::GraceExceeded { pending, .. } => format!("{pending} task(s) pending"),
        }
    }
}

/// # Errors produced by tracked work.
///
/// `Fail` is the recoverable class: the runtime logs it and keeps dispatching.
/// `Fatal` is the fatal class: the runtime stops every task and exits non-zero.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Recoverable failure.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure; shuts the whole runtime down.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Work was cancelled because the runtime is stopping.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for a recoverable failure.
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for a fatal failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        TaskError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use deskvisor::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns the bare error message without the variant prefix.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } | TaskError::Fatal { error } => error.clone(),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Whether this error must bring the runtime down.
    ///
    /// ```
    /// use deskvisor::TaskError;
    ///
    /// assert!(TaskError::fatal("no helper").is_fatal());
    /// assert!(!TaskError::fail("transient").is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. })
    }

    /// Promotes any non-cancellation error into the fatal class, prefixing `context`.
    pub fn into_fatal(self, context: &str) -> Self {
        match self {
            TaskError::Canceled => TaskError::Canceled,
            other => TaskError::Fatal {
                error: format!("{context}: {}", other.as_message()),
            },
        }
    }
}

/// # Errors produced by the object registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An already-built value was registered without a name.
    #[error("a name is required to register a value of type {type_name}")]
    Unnamed {
        /// Rust type name of the value.
        type_name: &'static str,
    },

    /// No object is registered under that name and none can be built.
    #[error("object named {name} was not found in the registry")]
    NotFound {
        /// Looked-up name.
        name: String,
    },

    /// The stored object is not of the requested type.
    #[error("object named {name} is not a {expected}")]
    TypeMismatch {
        /// Looked-up name.
        name: String,
        /// Requested Rust type name.
        expected: &'static str,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Unnamed { .. } => "registry_unnamed",
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::TypeMismatch { .. } => "registry_type_mismatch",
        }
    }
}

impl From<RegistryError> for TaskError {
    fn from(err: RegistryError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

/// # Errors produced when launching child processes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// No program was given.
    #[error("empty command line")]
    EmptyCommand,

    /// The launcher could not spawn the child.
    #[error("failed to spawn {program}: {error}")]
    Spawn {
        /// Program (first exec argument).
        program: String,
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::EmptyCommand => "process_empty_command",
            ProcessError::Spawn { .. } => "process_spawn",
        }
    }
}

impl From<ProcessError> for TaskError {
    fn from(err: ProcessError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

/// Attribute overrides could not be serialized into a listener identity.
#[derive(Error, Debug)]
#[error("cannot serialize attributes for listener {kind}: {error}")]
pub struct KeyError {
    /// Listener type name.
    pub kind: &'static str,
    /// Serializer message.
    pub error: String,
}

impl From<KeyError> for TaskError {
    fn from(err: KeyError) -> Self {
        TaskError::Fail {
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_fatal_keeps_cancellation() {
        assert_eq!(TaskError::Canceled.into_fatal("listener"), TaskError::Canceled);

        let fatal = TaskError::fail("socket missing").into_fatal("listener power");
        assert!(fatal.is_fatal());
        assert_eq!(fatal.as_message(), "listener power: socket missing");
    }

    #[test]
    fn registry_errors_are_recoverable() {
        let err: TaskError = RegistryError::NotFound { name: "Notify".into() }.into();
        assert!(!err.is_fatal());
        assert_eq!(err.as_label(), "task_failed");
    }
}
