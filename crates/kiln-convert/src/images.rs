//! Lossless image optimization.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use regex::Regex;

use crate::output::write_output;
use crate::traits::{ConvertError, ConvertInput, Converter};

static SVG_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid SVG comment regex"));
// Only line-breaking gaps are formatting; inline spaces may be text content.
static SVG_GAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">[ \t\r]*\n\s*<").expect("Invalid SVG whitespace regex"));

/// Optimizes images without changing their names or visible content.
///
/// PNG files are recompressed and SVG files have comments and formatting
/// whitespace removed. Anything else is copied through unchanged.
#[derive(Debug, Clone, Default)]
pub struct ImageConverter;

impl ImageConverter {
    /// File extensions this converter is responsible for.
    pub const EXTENSIONS: &'static [&'static str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

    /// Create a new image converter.
    pub fn new() -> Self {
        Self
    }

    /// Optimize raw image bytes according to the file extension.
    pub fn optimize(&self, path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" => recompress_png(path, bytes),
            "svg" => Ok(minify_svg(path, bytes)),
            _ => Ok(bytes),
        }
    }
}

impl Converter for ImageConverter {
    fn name(&self) -> &'static str {
        "images"
    }

    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError> {
        let bytes = fs::read(&input.source).map_err(|e| ConvertError::read(&input.source, e))?;
        let optimized = self.optimize(&input.source, bytes)?;

        write_output(&input.destination, optimized)?;
        Ok(vec![input.destination.clone()])
    }
}

/// Re-encode a PNG at maximum compression, keeping whichever is smaller.
fn recompress_png(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| image_error(path, e))?;

    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| image_error(path, e))?;

    if out.len() < bytes.len() {
        tracing::debug!(
            "Recompressed {}: {} -> {} bytes",
            path.display(),
            bytes.len(),
            out.len()
        );
        Ok(out)
    } else {
        Ok(bytes)
    }
}

/// Strip comments and indentation from SVG markup.
///
/// Non UTF-8 input is passed through untouched.
fn minify_svg(path: &Path, bytes: Vec<u8>) -> Vec<u8> {
    match String::from_utf8(bytes) {
        Ok(text) => {
            let text = SVG_COMMENT_RE.replace_all(&text, "");
            let text = SVG_GAP_RE.replace_all(&text, "><");
            text.trim().as_bytes().to_vec()
        }
        Err(e) => {
            tracing::debug!("Leaving non UTF-8 SVG as is: {}", path.display());
            e.into_bytes()
        }
    }
}

fn image_error(path: &Path, err: image::ImageError) -> ConvertError {
    ConvertError::ImageError {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn strips_svg_comments_and_whitespace() {
        let svg = "<!-- exported -->\n<svg viewBox=\"0 0 10 10\">\n  <rect width=\"10\" height=\"10\"/>\n</svg>\n";

        let out = ImageConverter::new()
            .optimize(Path::new("icon.svg"), svg.as_bytes().to_vec())
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<svg viewBox=\"0 0 10 10\"><rect width=\"10\" height=\"10\"/></svg>"
        );
    }

    #[test]
    fn keeps_inline_text_spacing() {
        let svg = "<svg>\n  <text><tspan>Hello</tspan> <tspan>world</tspan></text>\n</svg>";

        let out = ImageConverter::new()
            .optimize(Path::new("label.svg"), svg.as_bytes().to_vec())
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<svg><text><tspan>Hello</tspan> <tspan>world</tspan></text></svg>"
        );
    }

    #[test]
    fn passes_jpeg_through() {
        let bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        let out = ImageConverter::new()
            .optimize(Path::new("photo.JPG"), bytes.clone())
            .unwrap();

        assert_eq!(out, bytes);
    }

    #[test]
    fn png_stays_decodable_and_not_larger() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("dot.png");
        ImageBuffer::from_pixel(32, 32, Rgba([10u8, 20, 30, 255]))
            .save(&src)
            .unwrap();
        let original = fs::metadata(&src).unwrap().len();

        let out = temp.path().join("build/img/dot.png");
        ImageConverter::new()
            .convert(&ConvertInput::new(&src, &out))
            .unwrap();

        assert!(fs::metadata(&out).unwrap().len() <= original);
        let decoded = image::open(&out).unwrap();
        assert_eq!(decoded.width(), 32);
    }

    #[test]
    fn rejects_corrupt_png() {
        let err = ImageConverter::new()
            .optimize(Path::new("broken.png"), b"not a png".to_vec())
            .unwrap_err();

        assert!(matches!(err, ConvertError::ImageError { .. }));
    }
}
