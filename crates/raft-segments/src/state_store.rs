//! # state_store
//!
//! why: the term and vote must survive a restart before any outcome is acted on
//! relations: implements raft_log::StateStore, sits next to the segment files of a member
//! what: FileStateStore, a json file replaced atomically on every save

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use raft_log::{MemberId, StateStore, Term};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// file-based term and vote store
///
/// keeps a single meta.json in its directory; every save writes a temp file,
/// syncs it and renames it over the old one
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

/// on-disk shape of meta.json
#[derive(Serialize, Deserialize, Default)]
struct TermAndVote {
    term: Term,
    voted_for: Option<MemberId>,
}

impl FileStateStore {
    /// create the store, creating the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }
}

fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

impl StateStore for FileStateStore {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&TermAndVote { term, voted_for }).map_err(invalid_data)?;

        let temp_path = self.dir.join("meta.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, self.meta_path())?;

        debug!(term, ?voted_for, "persisted term and vote");
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)> {
        let bytes = match fs::read(self.meta_path()) {
            Ok(bytes) => bytes,
            // a member that never saved starts at term 0 without a vote
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok((0, None)),
            Err(err) => return Err(err),
        };
        let meta: TermAndVote = serde_json::from_slice(&bytes).map_err(invalid_data)?;
        Ok((meta.term, meta.voted_for))
    }
}
