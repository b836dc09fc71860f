//! Stylesheet compilation using lightningcss.
//!
//! The entry stylesheet is bundled (its `@import`s inlined), lowered and
//! vendor-prefixed for the configured browser targets, then written twice:
//! once readable and once minified.

use std::path::{Path, PathBuf};

use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Targets};

use crate::output::write_output;
use crate::traits::{ConvertError, ConvertInput, Converter};

/// Minimum browser versions to generate prefixes and fallbacks for.
///
/// Versions are major numbers; they are encoded the way lightningcss expects
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTargets {
    pub chrome: u32,
    pub firefox: u32,
    pub safari: u32,
    pub edge: u32,
}

impl Default for StyleTargets {
    fn default() -> Self {
        Self {
            chrome: 100,
            firefox: 100,
            safari: 13,
            edge: 100,
        }
    }
}

impl StyleTargets {
    fn to_targets(self) -> Targets {
        Targets::from(Browsers {
            chrome: Some(self.chrome << 16),
            firefox: Some(self.firefox << 16),
            safari: Some(self.safari << 16),
            ios_saf: Some(self.safari << 16),
            edge: Some(self.edge << 16),
            ..Browsers::default()
        })
    }
}

/// Compiles the entry stylesheet into `<name>.css` and `<name>.min.css`.
#[derive(Debug, Clone, Default)]
pub struct StyleConverter {
    targets: StyleTargets,
}

impl StyleConverter {
    /// Create a converter for the given browser targets.
    pub fn new(targets: StyleTargets) -> Self {
        Self { targets }
    }

    /// Compile `entry` and return `(expanded, minified)` CSS.
    pub fn compile(&self, entry: &Path) -> Result<(String, String), ConvertError> {
        let targets = self.targets.to_targets();

        let fs = FileProvider::new();
        let mut bundler = Bundler::new(&fs, None, ParserOptions::default());
        let mut stylesheet = bundler
            .bundle(entry)
            .map_err(|e| style_error(entry, e.to_string()))?;

        stylesheet
            .minify(MinifyOptions {
                targets,
                ..Default::default()
            })
            .map_err(|e| style_error(entry, e.to_string()))?;

        let expanded = stylesheet
            .to_css(PrinterOptions {
                minify: false,
                targets,
                ..Default::default()
            })
            .map_err(|e| style_error(entry, e.to_string()))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                targets,
                ..Default::default()
            })
            .map_err(|e| style_error(entry, e.to_string()))?;

        Ok((expanded.code, minified.code))
    }
}

impl Converter for StyleConverter {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError> {
        let (expanded, minified) = self.compile(&input.source)?;

        let min_path = minified_path(&input.destination);
        write_output(&input.destination, expanded)?;
        write_output(&min_path, minified)?;

        Ok(vec![input.destination.clone(), min_path])
    }
}

/// `css/style.css` -> `css/style.min.css`
pub fn minified_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("style");
    path.with_file_name(format!("{}.min.css", stem))
}

fn style_error(path: &Path, message: String) -> ConvertError {
    ConvertError::StyleError {
        path: path.display().to_string(),
        message,
    }
}
