//! Local directory tree as an object store. Object keys are the
//! `/`-joined file paths relative to the base directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tally_recon::{ObjectStore, StoreError};

pub struct FsStore {
    name: String,
    base: PathBuf,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base = base.into();
        if !base.is_dir() {
            return Err(StoreError::Io(format!("{} is not a directory", base.display())));
        }
        Ok(Self {
            name: format!("file://{}", base.display()),
            base,
        })
    }

    /// Split a key prefix into its directory part (`a/b/`) and the
    /// partial name that follows it (`c`).
    fn split(prefix: &str) -> (&str, &str) {
        match prefix.rfind('/') {
            Some(idx) => prefix.split_at(idx + 1),
            None => ("", prefix),
        }
    }

    /// Entries of `dir_key` whose file name starts with `name_prefix`.
    /// A missing directory has no entries.
    fn matching_entries(&self, dir_key: &str, name_prefix: &str) -> Result<Vec<fs::DirEntry>, StoreError> {
        let dir = self.base.join(dir_key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir, e)),
        };
        let mut matching = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            if entry.file_name().to_string_lossy().starts_with(name_prefix) {
                matching.push(entry);
            }
        }
        Ok(matching)
    }
}

impl ObjectStore for FsStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        let (dir_key, name_prefix) = Self::split(prefix);
        let mut total = 0;
        for entry in self.matching_entries(dir_key, name_prefix)? {
            let path = entry.path();
            if path.is_dir() {
                total += count_files(&path)?;
            } else {
                total += 1;
            }
        }
        Ok(total)
    }

    fn list_prefixes(&self, root: &str, delimiter: char) -> Result<Vec<String>, StoreError> {
        if delimiter != '/' {
            return Err(StoreError::Malformed(format!(
                "{}: only '/' is supported as a delimiter",
                self.name
            )));
        }
        let (dir_key, name_prefix) = Self::split(root);
        let mut prefixes = Vec::new();
        for entry in self.matching_entries(dir_key, name_prefix)? {
            let path = entry.path();
            // Object stores have no empty "directories".
            if path.is_dir() && count_files(&path)? > 0 {
                prefixes.push(format!("{dir_key}{}/", entry.file_name().to_string_lossy()));
            }
        }
        prefixes.sort();
        Ok(prefixes)
    }
}

fn count_files(dir: &Path) -> Result<u64, StoreError> {
    let mut total = 0;
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if path.is_dir() {
            total += count_files(&path)?;
        } else {
            total += 1;
        }
    }
    Ok(total)
}

fn io_err(path: &Path, e: io::Error) -> StoreError {
    StoreError::Io(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for f in files {
            let path = dir.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"x").unwrap();
        }
        dir
    }

    #[test]
    fn counts_recursively_under_prefix() {
        let dir = tree(&[
            "v2/abc/seg-1.ts",
            "v2/abc/seg-2.ts",
            "v2/abc/nested/seg-3.ts",
            "v2/abcd/seg-1.ts",
            "v2/other/seg-1.ts",
        ]);
        let store = FsStore::new(dir.path()).unwrap();
        assert_eq!(store.count("v2/abc/").unwrap(), 3);
        assert_eq!(store.count("v2/abcd/").unwrap(), 1);
        // Without the trailing slash, siblings sharing the prefix count too.
        assert_eq!(store.count("v2/abc").unwrap(), 4);
        assert_eq!(store.count("v2/").unwrap(), 5);
    }

    #[test]
    fn missing_prefix_counts_zero() {
        let dir = tree(&["v2/abc/seg-1.ts"]);
        let store = FsStore::new(dir.path()).unwrap();
        assert_eq!(store.count("v4/abc/").unwrap(), 0);
        assert_eq!(store.count("v2/zzz/").unwrap(), 0);
    }

    #[test]
    fn suffix_prefix_matches_files_and_dirs() {
        let dir = tree(&[
            "rec/id-1/compositeRecording/a.mp4",
            "rec/id-1/compositeRecording.json",
            "rec/id-1/raw/b.ts",
        ]);
        let store = FsStore::new(dir.path()).unwrap();
        assert_eq!(store.count("rec/id-1/compositeRecording").unwrap(), 2);
    }

    #[test]
    fn lists_non_empty_directories_sorted() {
        let dir = tree(&[
            "v4/fc8a9074/seg-1.ts",
            "v4/0b25f5a4/nested/seg.ts",
            "v4/loose.txt",
        ]);
        fs::create_dir_all(dir.path().join("v4/empty")).unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        let prefixes = store.list_prefixes("v4/", '/').unwrap();
        assert_eq!(prefixes, vec!["v4/0b25f5a4/", "v4/fc8a9074/"]);
    }

    #[test]
    fn list_missing_root_is_empty() {
        let dir = tree(&[]);
        let store = FsStore::new(dir.path()).unwrap();
        assert!(store.list_prefixes("nope/", '/').unwrap().is_empty());
    }

    #[test]
    fn other_delimiters_rejected() {
        let dir = tree(&[]);
        let store = FsStore::new(dir.path()).unwrap();
        assert!(matches!(store.list_prefixes("", ':'), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn base_must_be_a_directory() {
        let dir = tree(&["file.txt"]);
        assert!(FsStore::new(dir.path().join("file.txt")).is_err());
        assert!(FsStore::new(dir.path().join("missing")).is_err());
    }
}
