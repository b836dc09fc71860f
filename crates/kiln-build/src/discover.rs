//! Recursive source file discovery.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Find every file under `root` whose name ends with `extension`.
///
/// The leading dot is optional (`"tpl"` and `".tpl"` are equivalent). The
/// match is a suffix match on the file name, so `card.tplx` does not match
/// `tpl`. Directories are walked depth-first in file-name order and every
/// match is returned once, prefixed by `root`.
///
/// A missing `root` yields an empty list.
pub fn discover(root: &Path, extension: &str) -> Vec<PathBuf> {
    discover_matching(root, |path| has_extension(path, extension))
}

/// Find every file under `root` accepted by `predicate`.
///
/// Hidden files and editor temporaries are never returned.
pub fn discover_matching<F>(root: &Path, predicate: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    if !root.is_dir() {
        tracing::warn!("Source directory not found: {}", root.display());
        return Vec::new();
    }

    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || is_temp_file(path) || !predicate(path) {
            continue;
        }

        tracing::trace!("Found {}", path.display());
        found.push(path.to_path_buf());
    }

    found
}

/// Whether the file name of `path` ends with `.extension`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return false;
    }

    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            name.len() > extension.len() + 1
                && name
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", extension.to_ascii_lowercase()))
        })
        .unwrap_or(false)
}

/// Editor swap/backup files and our own in-flight output files.
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
