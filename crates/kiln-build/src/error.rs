//! Scheduler-level errors.
//!
//! Only failures of the orchestration itself live here. Converter failures
//! are logged and counted by [`crate::Task::resilient`] and never surface as
//! a `BuildError`.

use std::path::Path;

/// Errors that abort a build invocation.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to clear output directory {path}: {source}")]
    Clean {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write include index {path}: {source}")]
    Index {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Task '{task}' did not complete: {message}")]
    Task { task: String, message: String },
}

impl BuildError {
    pub(crate) fn clean(path: &Path, source: std::io::Error) -> Self {
        Self::Clean {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn index(path: &Path, source: std::io::Error) -> Self {
        Self::Index {
            path: path.display().to_string(),
            source,
        }
    }
}
