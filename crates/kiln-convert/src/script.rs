//! Script minification using oxc.

use std::fs;
use std::path::{Path, PathBuf};

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use crate::output::write_output;
use crate::traits::{ConvertError, ConvertInput, Converter};

/// Minifies a classic browser script, keeping its file name.
#[derive(Debug, Clone, Default)]
pub struct ScriptConverter;

impl ScriptConverter {
    /// Create a new script converter.
    pub fn new() -> Self {
        Self
    }

    /// Minify JavaScript source code.
    ///
    /// Scripts are parsed as classic scripts rather than modules, so
    /// top-level names that other scripts on the page rely on are not
    /// mangled.
    pub fn minify(&self, path: &Path, source: &str) -> Result<String, ConvertError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();

        if !ret.errors.is_empty() {
            let message = ret
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConvertError::ScriptError {
                path: path.display().to_string(),
                message,
            });
        }

        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::smallest()),
        };
        let ret = Minifier::new(options).minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program)
            .code;

        Ok(code)
    }
}

impl Converter for ScriptConverter {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError> {
        let source =
            fs::read_to_string(&input.source).map_err(|e| ConvertError::read(&input.source, e))?;
        let code = self.minify(&input.source, &source)?;

        write_output(&input.destination, code)?;
        Ok(vec![input.destination.clone()])
    }
}
