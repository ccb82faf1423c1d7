//! # catalog
//!
//! why: map segment versions to file names and recover them from a directory listing
//! relations: used by segmented.rs at open and on every rotation
//! what: FileNameCatalog, the raft.log.<version> naming scheme

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::fs::FileSystem;

const BASE_NAME: &str = "raft.log.";

/// Bijection between segment versions and paths inside one directory
#[derive(Debug, Clone)]
pub struct FileNameCatalog {
    base_dir: PathBuf,
}

impl FileNameCatalog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the segment with `version`; never touches the file system.
    pub fn path_for(&self, version: u64) -> PathBuf {
        self.base_dir.join(format!("{BASE_NAME}{version}"))
    }

    /// Every well-named segment in the directory, by ascending version.
    ///
    /// Other files are skipped with a warning; listing failures propagate.
    pub fn scan_existing(&self, fs: &dyn FileSystem) -> io::Result<BTreeMap<u64, PathBuf>> {
        let mut versions = BTreeMap::new();
        for path in fs.list_files(&self.base_dir)? {
            match path.file_name().and_then(|n| n.to_str()).and_then(parse_version) {
                Some(version) => {
                    versions.insert(version, path);
                }
                None => warn!(path = %path.display(), "ignoring file with unexpected name in raft log directory"),
            }
        }
        Ok(versions)
    }
}

/// Accepts `raft.log.(0|[1-9][0-9]*)` within u64 range
fn parse_version(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(BASE_NAME)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::EphemeralFileSystem;

    #[test]
    fn path_for_appends_version() {
        let catalog = FileNameCatalog::new("/data/raft");
        assert_eq!(catalog.path_for(0), PathBuf::from("/data/raft/raft.log.0"));
        assert_eq!(catalog.path_for(17), PathBuf::from("/data/raft/raft.log.17"));
    }

    #[test]
    fn parse_version_accepts_only_canonical_numbers() {
        assert_eq!(parse_version("raft.log.0"), Some(0));
        assert_eq!(parse_version("raft.log.42"), Some(42));
        assert_eq!(parse_version("raft.log.042"), None);
        assert_eq!(parse_version("raft.log."), None);
        assert_eq!(parse_version("raft.log.-1"), None);
        assert_eq!(parse_version("raft.log.1a"), None);
        assert_eq!(parse_version("raft.log.99999999999999999999999"), None);
        assert_eq!(parse_version("other.log.1"), None);
    }

    #[test]
    fn scan_skips_malformed_names() {
        let fs = EphemeralFileSystem::new();
        let catalog = FileNameCatalog::new("/raft");
        fs.write_file(catalog.path_for(3), b"");
        fs.write_file(catalog.path_for(1), b"");
        fs.write_file("/raft/raft.log.007", b"");
        fs.write_file("/raft/notes.txt", b"");

        let versions = catalog.scan_existing(&fs).unwrap();
        assert_eq!(versions.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(versions[&3], catalog.path_for(3));
    }
}
