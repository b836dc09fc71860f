//! Generated include index for partial templates.
//!
//! The index is a template that includes every partial, so pages (usually
//! through the layout) can pull in the whole partial set with one include.
//! It is derived purely from the set of partial files on disk.
//!
//! An include renders the partial's body in place; it does not export the
//! partial's macros. Partials meant for the index should therefore be
//! markup that belongs on every page (icon sprites, shared dialogs). A
//! partial holding only `{% macro %}` definitions renders to nothing there,
//! and pages reach its macros with `{% import %}` or `{% from ... import %}`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::discover::discover;
use crate::error::BuildError;

/// Warning block at the top of every generated index.
pub const GENERATED_HEADER: &str = "\
{#-
  GENERATED FILE - DO NOT EDIT.
  kiln rewrites this file whenever a partial is added or removed;
  any manual change will be lost on the next build.
-#}
";

/// Outcome of regenerating the include index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// Index file path
    pub path: PathBuf,

    /// Number of include directives written
    pub includes: usize,

    /// Whether the file on disk changed
    pub written: bool,
}

/// Render the include index for the partials under `partials_dir`.
///
/// One `{% include %}` line per discovered `.{extension}` file, in discovery
/// order, skipping anything listed in `excluded`. Paths are relative to
/// `partials_dir` and always use `/`.
pub fn render_index(partials_dir: &Path, extension: &str, excluded: &[PathBuf]) -> (String, usize) {
    let partials: Vec<PathBuf> = discover(partials_dir, extension)
        .into_iter()
        .filter(|p| !excluded.contains(p))
        .collect();

    let mut content = String::from(GENERATED_HEADER);
    for partial in &partials {
        let relative = partial.strip_prefix(partials_dir).unwrap_or(partial);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        content.push_str(&format!("{{% include \"{}\" %}}\n", name));
    }

    (content, partials.len())
}

/// Regenerate `index_file` from the partials under `partials_dir`.
///
/// The write is skipped when the content is already up to date, so an
/// unchanged partial set leaves the file (and its mtime) alone. A missing
/// partials directory yields a header-only index. Failing to write the index
/// is fatal to the build.
pub fn regenerate_index(
    partials_dir: &Path,
    index_file: &Path,
    extension: &str,
    excluded: &[PathBuf],
) -> Result<IndexReport, BuildError> {
    let (content, includes) = render_index(partials_dir, extension, excluded);

    let current = match fs::read_to_string(index_file) {
        Ok(current) => Some(current),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(BuildError::index(index_file, e)),
    };

    let written = current.as_deref() != Some(content.as_str());
    if written {
        write_atomic(index_file, &content).map_err(|e| BuildError::index(index_file, e))?;
        tracing::info!(
            "Regenerated {} ({} includes)",
            index_file.display(),
            includes
        );
    } else {
        tracing::debug!("Include index unchanged: {}", index_file.display());
    }

    Ok(IndexReport {
        path: index_file.to_path_buf(),
        includes,
        written,
    })
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}
