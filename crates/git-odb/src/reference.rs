//! Alternates: other object databases linked in via `info/alternates`,
//! one absolute or root-relative path per line.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{CompoundStore, OdbError};

/// Reads `<root>/info/alternates` and builds a [`CompoundStore`] for each
/// surviving line.
pub struct ReferenceStore {
    alternates_path: PathBuf,
    root: PathBuf,
}

impl ReferenceStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            alternates_path: root.join("info").join("alternates"),
            root,
        }
    }

    /// Parse the alternates file and open a compound store rooted at each
    /// entry. Missing file, blank lines, and `#`-prefixed comments are all
    /// skipped silently; an entry naming a directory that doesn't exist is
    /// also skipped, since a stale alternate shouldn't make the whole
    /// database unusable.
    pub fn load(&self) -> Result<Vec<CompoundStore>, OdbError> {
        let contents = match fs::read_to_string(&self.alternates_path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stores = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let candidate = Path::new(line);
            let resolved = if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                self.root.join(candidate)
            };
            if !resolved.is_dir() {
                continue;
            }
            if let Ok(store) = CompoundStore::git_layout(&resolved) {
                stores.push(store);
            }
        }
        Ok(stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_alternates_file_yields_no_stores() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ReferenceStore::new(dir.path());
        assert!(reference.load().unwrap().is_empty());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("info")).unwrap();
        fs::write(
            dir.path().join("info").join("alternates"),
            "\n# a comment\n\n",
        )
        .unwrap();
        let reference = ReferenceStore::new(dir.path());
        assert!(reference.load().unwrap().is_empty());
    }

    #[test]
    fn nonexistent_target_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("info")).unwrap();
        fs::write(
            dir.path().join("info").join("alternates"),
            "../does-not-exist\n",
        )
        .unwrap();
        let reference = ReferenceStore::new(dir.path());
        assert!(reference.load().unwrap().is_empty());
    }

    #[test]
    fn relative_path_resolves_against_the_objects_root() {
        let dir = tempfile::tempdir().unwrap();
        let alt_root = dir.path().join("other-objects");
        fs::create_dir_all(&alt_root).unwrap();
        fs::create_dir_all(dir.path().join("info")).unwrap();
        fs::write(
            dir.path().join("info").join("alternates"),
            "other-objects\n",
        )
        .unwrap();

        let reference = ReferenceStore::new(dir.path());
        let stores = reference.load().unwrap();
        assert_eq!(stores.len(), 1);
    }
}
