//! Trait definitions for source converters.

use std::path::{Path, PathBuf};

/// A single unit of conversion work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertInput {
    /// Source file to read
    pub source: PathBuf,

    /// Primary output path in the output tree.
    ///
    /// Converters that emit several files (e.g. expanded and minified CSS)
    /// derive the extra paths from this one.
    pub destination: PathBuf,
}

impl ConvertInput {
    /// Create a new conversion input.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Errors that can occur during conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error in {path}: {message}")]
    TemplateError { path: String, message: String },

    #[error("Style error in {path}: {message}")]
    StyleError { path: String, message: String },

    #[error("Script error in {path}: {message}")]
    ScriptError { path: String, message: String },

    #[error("Image error in {path}: {message}")]
    ImageError { path: String, message: String },
}

impl ConvertError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Trait for source converters.
///
/// Implementations must be safe to re-run on unchanged input: running a
/// conversion twice produces the same output files.
pub trait Converter: Send + Sync {
    /// Converter identifier used in logs (e.g. "templates", "styles")
    fn name(&self) -> &'static str;

    /// Convert one source file.
    ///
    /// Returns every output path written, in the order they were written.
    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError>;
}
