//! # log
//!
//! why: define the append/truncate/prune/read contract every raft log honours
//! relations: implemented by in_memory.rs, cached.rs and raft-segments; driven by command.rs
//! what: LogEntry, RaftLog trait, EntryCursor, read_log_entry helper

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Position in the replicated log; `-1` sits before the first entry
pub type LogIndex = i64;

/// Leadership epoch
pub type Term = u64;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: Term,
    /// Opaque payload owned by the replicated state machine
    pub content: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: Term, content: impl Into<Vec<u8>>) -> Self {
        Self {
            term,
            content: content.into(),
        }
    }
}

/// The durable or cached representation of a replicated log.
///
/// Writes come from a single thread that applies outcomes in order, so mutating
/// operations take `&mut self`. Implementations must keep these relations:
/// `prev_index <= commit_index <= append_index` once anything is committed, and
/// every index in `(prev_index, append_index]` is readable.
pub trait RaftLog: Send {
    /// Append entries after the current append index, returning the new append index.
    fn append(&mut self, entries: &[LogEntry]) -> Result<LogIndex>;

    /// Discard every entry from `from_index` onwards.
    fn truncate(&mut self, from_index: LogIndex) -> Result<()>;

    /// Drop entries up to `safe_index` where possible, returning the new prev index.
    fn prune(&mut self, safe_index: LogIndex) -> Result<LogIndex>;

    /// Move the log past `(index, term)` when it is behind, discarding what it holds.
    fn skip(&mut self, index: LogIndex, term: Term) -> Result<LogIndex>;

    /// Advance the commit watermark; it never moves backwards.
    fn commit(&mut self, commit_index: LogIndex) -> Result<()>;

    fn append_index(&self) -> LogIndex;

    fn prev_index(&self) -> LogIndex;

    fn commit_index(&self) -> LogIndex;

    /// Term of the entry at `index`, `None` when the log cannot answer.
    fn read_entry_term(&self, index: LogIndex) -> Result<Option<Term>>;

    /// Entries from `from_index` up to the append index.
    fn get_entry_cursor(&self, from_index: LogIndex) -> Result<EntryCursor>;
}

/// Forward cursor over consecutive log entries
#[derive(Debug)]
pub struct EntryCursor {
    next_index: LogIndex,
    entries: std::vec::IntoIter<LogEntry>,
}

impl EntryCursor {
    /// A cursor whose first entry sits at `first_index`
    pub fn new(first_index: LogIndex, entries: Vec<LogEntry>) -> Self {
        Self {
            next_index: first_index,
            entries: entries.into_iter(),
        }
    }

    pub fn empty(from_index: LogIndex) -> Self {
        Self::new(from_index, Vec::new())
    }

    /// Index of the entry most recently returned by `next`
    pub fn index(&self) -> LogIndex {
        self.next_index - 1
    }
}

impl Iterator for EntryCursor {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        let entry = self.entries.next()?;
        self.next_index += 1;
        Some(entry)
    }
}

/// Read a single entry, `None` when the index is pruned or not yet appended.
pub fn read_log_entry<L: RaftLog + ?Sized>(log: &L, index: LogIndex) -> Result<Option<LogEntry>> {
    if index <= log.prev_index() || index > log.append_index() {
        return Ok(None);
    }
    let mut cursor = log.get_entry_cursor(index)?;
    Ok(cursor.next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_tracks_index_of_last_entry() {
        let mut cursor = EntryCursor::new(4, vec![LogEntry::new(1, b"a".to_vec()), LogEntry::new(1, b"b".to_vec())]);
        assert_eq!(cursor.index(), 3);
        assert_eq!(cursor.next(), Some(LogEntry::new(1, b"a".to_vec())));
        assert_eq!(cursor.index(), 4);
        assert_eq!(cursor.next(), Some(LogEntry::new(1, b"b".to_vec())));
        assert_eq!(cursor.index(), 5);
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.index(), 5);
    }
}
