//! Writing converter output into the output tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::traits::ConvertError;

/// Write `contents` to `path`, creating parent directories as needed.
///
/// The bytes go to a `.tmp` sibling first and are renamed into place, so a
/// reader (or the dev server) never observes a half-written file.
pub fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConvertError::write(parent, e))?;
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, contents).map_err(|e| ConvertError::write(&tmp, e))?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(ConvertError::write(path, e));
    }

    Ok(())
}

/// Temporary path next to `path`, unique per process.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_parent_directories() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("a/b/c.txt");

        write_output(&target, "hello").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("page.html");

        write_output(&target, "one").unwrap();
        write_output(&target, "two").unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(names, vec![std::ffi::OsString::from("page.html")]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }
}
