//! # cached
//!
//! why: serve reads of the recent log suffix from memory while the full log stays canonical
//! relations: decorates any RaftLog (usually raft-segments' SegmentedRaftLog) with in_memory.rs
//! what: CachedSuffixRaftLog

use tracing::{debug, error, warn};

use crate::error::{RaftLogError, Result};
use crate::in_memory::InMemoryRaftLog;
use crate::log::{EntryCursor, LogEntry, LogIndex, RaftLog, Term};

/// Mirrors every write into a bounded in-memory suffix of the full log.
///
/// Reads of indices above the cache's prev index are answered by the cache,
/// everything older goes to the full log. Writes go to the cache first; when the
/// full log then fails, the cache is rebuilt to sit after the full log's end.
#[derive(Debug)]
pub struct CachedSuffixRaftLog<F> {
    full: F,
    cache: InMemoryRaftLog,
    capacity: usize,
}

impl<F: RaftLog> CachedSuffixRaftLog<F> {
    /// Wrap `full`, caching at most `capacity` of the most recent entries.
    pub fn new(full: F, capacity: usize) -> Result<Self> {
        let append_index = full.append_index();
        let term = full.read_entry_term(append_index)?.unwrap_or(0);
        let cache = InMemoryRaftLog::starting_after(append_index, term, full.commit_index());
        Ok(Self {
            full,
            cache,
            capacity,
        })
    }

    pub fn full_log(&self) -> &F {
        &self.full
    }

    pub fn into_inner(self) -> F {
        self.full
    }

    /// Index of the oldest entry the cache can answer for
    pub fn cached_from(&self) -> LogIndex {
        self.cache.prev_index() + 1
    }

    fn check_same_index(&self, cache: LogIndex, full: LogIndex) -> Result<LogIndex> {
        if cache != full {
            error!(cache, full, "suffix cache and full log diverged");
            return Err(RaftLogError::AppendIndexMismatch { cache, full });
        }
        Ok(full)
    }

    fn shrink_cache(&mut self) -> Result<()> {
        let held = (self.cache.append_index() - self.cache.prev_index()) as usize;
        if held > self.capacity {
            let excess = (held - self.capacity) as LogIndex;
            self.cache.prune(self.cache.prev_index() + excess)?;
        }
        Ok(())
    }

    fn in_cache(&self, index: LogIndex) -> bool {
        index > self.cache.prev_index()
    }

    /// Drop the cached suffix and sit right after the full log's last entry.
    fn resync(&mut self) {
        let append_index = self.full.append_index();
        let term = match self.full.read_entry_term(append_index) {
            Ok(term) => term.unwrap_or(0),
            Err(err) => {
                warn!(append_index, %err, "could not read last term while resetting cache");
                0
            }
        };
        debug!(append_index, "resetting suffix cache from the full log");
        self.cache.reset(append_index, term);
    }

    fn resync_after(&mut self, err: RaftLogError) -> RaftLogError {
        self.resync();
        err
    }

    /// The full log's truncation checks, run before the cache is touched.
    fn check_truncatable(&self, from_index: LogIndex) -> Result<()> {
        let append_index = self.full.append_index();
        let commit_index = self.full.commit_index();
        let prev_index = self.full.prev_index();
        if from_index > append_index {
            return Err(RaftLogError::TruncateOutOfRange {
                from_index,
                append_index,
            });
        }
        if from_index <= commit_index {
            return Err(RaftLogError::TruncateCommitted {
                from_index,
                commit_index,
            });
        }
        if from_index <= prev_index {
            return Err(RaftLogError::TruncatePruned { from_index, prev_index });
        }
        Ok(())
    }
}

impl<F: RaftLog> RaftLog for CachedSuffixRaftLog<F> {
    fn append(&mut self, entries: &[LogEntry]) -> Result<LogIndex> {
        let cache_index = self.cache.append(entries)?;
        let full_index = self.full.append(entries).map_err(|err| self.resync_after(err))?;
        let index = self.check_same_index(cache_index, full_index)?;
        self.shrink_cache()?;
        Ok(index)
    }

    fn truncate(&mut self, from_index: LogIndex) -> Result<()> {
        self.check_truncatable(from_index)?;
        if self.in_cache(from_index) {
            self.cache.truncate(from_index)?;
        } else {
            let term = self.full.read_entry_term(from_index - 1)?.unwrap_or(0);
            debug!(from_index, "truncation reaches below the cached suffix, resetting cache");
            self.cache.reset(from_index - 1, term);
        }
        self.full.truncate(from_index).map_err(|err| self.resync_after(err))
    }

    fn prune(&mut self, safe_index: LogIndex) -> Result<LogIndex> {
        self.cache.prune(safe_index)?;
        self.full.prune(safe_index).map_err(|err| self.resync_after(err))
    }

    fn skip(&mut self, index: LogIndex, term: Term) -> Result<LogIndex> {
        let cache_index = self.cache.skip(index, term)?;
        let full_index = self.full.skip(index, term).map_err(|err| self.resync_after(err))?;
        self.check_same_index(cache_index, full_index)
    }

    fn commit(&mut self, commit_index: LogIndex) -> Result<()> {
        // the cache's watermark never runs ahead, it cannot be moved back
        self.full.commit(commit_index)?;
        self.cache.commit(commit_index)
    }

    fn append_index(&self) -> LogIndex {
        self.full.append_index()
    }

    fn prev_index(&self) -> LogIndex {
        self.full.prev_index()
    }

    fn commit_index(&self) -> LogIndex {
        self.full.commit_index()
    }

    fn read_entry_term(&self, index: LogIndex) -> Result<Option<Term>> {
        if self.in_cache(index) {
            self.cache.read_entry_term(index)
        } else {
            self.full.read_entry_term(index)
        }
    }

    fn get_entry_cursor(&self, from_index: LogIndex) -> Result<EntryCursor> {
        if self.in_cache(from_index) {
            self.cache.get_entry_cursor(from_index)
        } else {
            self.full.get_entry_cursor(from_index)
        }
    }
}
