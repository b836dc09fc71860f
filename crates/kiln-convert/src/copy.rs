//! Verbatim copying of static assets.

use std::fs;
use std::path::PathBuf;

use crate::output::write_output;
use crate::traits::{ConvertError, ConvertInput, Converter};

/// Copies a file into the output tree unchanged.
#[derive(Debug, Clone, Default)]
pub struct CopyConverter;

impl CopyConverter {
    /// Create a new copy converter.
    pub fn new() -> Self {
        Self
    }
}

impl Converter for CopyConverter {
    fn name(&self) -> &'static str {
        "assets"
    }

    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError> {
        let bytes = fs::read(&input.source).map_err(|e| ConvertError::read(&input.source, e))?;
        write_output(&input.destination, bytes)?;
        Ok(vec![input.destination.clone()])
    }
}
