//! # fs
//!
//! why: keep segment i/o behind a small file system contract so tests can run in memory
//! relations: consumed by catalog.rs and segmented.rs
//! what: FileSystem and StoreChannel traits, DefaultFileSystem (std::fs), EphemeralFileSystem

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// An append-only handle on one file
pub trait StoreChannel: Write + Send {
    /// Make everything written so far durable
    fn force(&mut self) -> io::Result<()>;
}

/// The only file system behaviour the log relies on
pub trait FileSystem: Send + Sync {
    fn mkdirs(&self, dir: &Path) -> io::Result<()>;

    /// Every file directly inside `dir`
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Open `path` for appending, creating it when missing
    fn create_or_open(&self, path: &Path) -> io::Result<Box<dyn StoreChannel>>;

    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn delete(&self, path: &Path) -> io::Result<()>;
}

// -- std::fs implementation --

/// file system backed by std::fs
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFileSystem;

struct FileChannel {
    file: File,
}

impl Write for FileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl StoreChannel for FileChannel {
    fn force(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

impl FileSystem for DefaultFileSystem {
    fn mkdirs(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    fn create_or_open(&self, path: &Path) -> io::Result<Box<dyn StoreChannel>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(FileChannel { file }))
    }

    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

// -- in-memory implementation --

type SharedBytes = Arc<Mutex<Vec<u8>>>;

/// in-memory file system for testing
///
/// files live as long as the EphemeralFileSystem (or a clone of it) does,
/// so a log can be reopened over the same instance to simulate a restart
#[derive(Debug, Default, Clone)]
pub struct EphemeralFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, SharedBytes>>>,
}

impl EphemeralFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file with the given content
    pub fn write_file(&self, path: impl Into<PathBuf>, content: &[u8]) {
        self.files
            .lock()
            .insert(path.into(), Arc::new(Mutex::new(content.to_vec())));
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", path.display()))
    }
}

struct EphemeralChannel {
    bytes: SharedBytes,
}

impl Write for EphemeralChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StoreChannel for EphemeralChannel {
    fn force(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileSystem for EphemeralFileSystem {
    fn mkdirs(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn create_or_open(&self, path: &Path) -> io::Result<Box<dyn StoreChannel>> {
        let bytes = Arc::clone(self.files.lock().entry(path.to_path_buf()).or_default());
        Ok(Box::new(EphemeralChannel { bytes }))
    }

    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.lock();
        let bytes = files.get(path).ok_or_else(|| Self::not_found(path))?;
        let content = bytes.lock().clone();
        Ok(content)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ephemeral_channel_appends() {
        let fs = EphemeralFileSystem::new();
        let path = Path::new("/log/a");
        fs.create_or_open(path).unwrap().write_all(b"one").unwrap();
        fs.create_or_open(path).unwrap().write_all(b"two").unwrap();
        assert_eq!(fs.read_all(path).unwrap(), b"onetwo".to_vec());
    }

    #[test]
    fn ephemeral_lists_only_direct_children() {
        let fs = EphemeralFileSystem::new();
        fs.write_file("/log/a", b"");
        fs.write_file("/log/nested/b", b"");
        fs.write_file("/other/c", b"");
        assert_eq!(fs.list_files(Path::new("/log")).unwrap(), vec![PathBuf::from("/log/a")]);
    }

    #[test]
    fn default_fs_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let fs = DefaultFileSystem;
        let path = dir.path().join("raft.log.0");

        let mut channel = fs.create_or_open(&path).unwrap();
        channel.write_all(b"hello").unwrap();
        channel.force().unwrap();

        assert_eq!(fs.read_all(&path).unwrap(), b"hello".to_vec());
        assert_eq!(fs.list_files(dir.path()).unwrap(), vec![path.clone()]);
        fs.delete(&path).unwrap();
        assert!(fs.list_files(dir.path()).unwrap().is_empty());
    }
}
