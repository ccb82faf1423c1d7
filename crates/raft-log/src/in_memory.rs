//! # in_memory
//!
//! why: a RaftLog that lives entirely in memory, used as the suffix cache and in tests
//! relations: wrapped by cached.rs, owned by safety.rs member states
//! what: InMemoryRaftLog over a VecDeque of entries

use std::collections::VecDeque;

use crate::error::{RaftLogError, Result};
use crate::log::{EntryCursor, LogEntry, LogIndex, RaftLog, Term};

/// Entries `(prev_index, append_index]` held in a deque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryRaftLog {
    entries: VecDeque<LogEntry>,
    prev_index: LogIndex,
    prev_term: Term,
    append_index: LogIndex,
    commit_index: LogIndex,
    term: Term,
}

impl Default for InMemoryRaftLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRaftLog {
    /// An empty log whose first entry will land at index 0
    pub fn new() -> Self {
        Self::starting_after(-1, 0, -1)
    }

    /// An empty log positioned after `(prev_index, prev_term)`.
    pub fn starting_after(prev_index: LogIndex, prev_term: Term, commit_index: LogIndex) -> Self {
        Self {
            entries: VecDeque::new(),
            prev_index,
            prev_term,
            append_index: prev_index,
            commit_index,
            term: prev_term,
        }
    }

    /// Drop every entry and sit after `(prev_index, prev_term)`, keeping the commit watermark.
    pub(crate) fn reset(&mut self, prev_index: LogIndex, prev_term: Term) {
        self.entries.clear();
        self.prev_index = prev_index;
        self.prev_term = prev_term;
        self.append_index = prev_index;
        self.term = prev_term;
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn offset_of(&self, index: LogIndex) -> usize {
        (index - self.prev_index - 1) as usize
    }
}

impl RaftLog for InMemoryRaftLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<LogIndex> {
        let mut last_term = self.term;
        for entry in entries {
            if entry.term < last_term {
                return Err(RaftLogError::NonMonotonicTerm {
                    term: entry.term,
                    last_term,
                });
            }
            last_term = entry.term;
        }

        self.entries.extend(entries.iter().cloned());
        self.append_index += entries.len() as LogIndex;
        self.term = last_term;
        Ok(self.append_index)
    }

    fn truncate(&mut self, from_index: LogIndex) -> Result<()> {
        if from_index > self.append_index {
            return Err(RaftLogError::TruncateOutOfRange {
                from_index,
                append_index: self.append_index,
            });
        }
        if from_index <= self.commit_index {
            return Err(RaftLogError::TruncateCommitted {
                from_index,
                commit_index: self.commit_index,
            });
        }
        if from_index <= self.prev_index {
            return Err(RaftLogError::TruncatePruned {
                from_index,
                prev_index: self.prev_index,
            });
        }

        let keep = self.offset_of(from_index);
        self.entries.truncate(keep);
        self.append_index = from_index - 1;
        self.term = self.entries.back().map_or(self.prev_term, |e| e.term);
        Ok(())
    }

    fn prune(&mut self, safe_index: LogIndex) -> Result<LogIndex> {
        let safe_index = safe_index.min(self.append_index);
        if safe_index <= self.prev_index {
            return Ok(self.prev_index);
        }

        let count = self.offset_of(safe_index) + 1;
        self.prev_term = self.entries[count - 1].term;
        self.entries.drain(..count);
        self.prev_index = safe_index;
        Ok(self.prev_index)
    }

    fn skip(&mut self, index: LogIndex, term: Term) -> Result<LogIndex> {
        if index > self.append_index {
            self.reset(index, term);
        }
        Ok(self.append_index)
    }

    fn commit(&mut self, commit_index: LogIndex) -> Result<()> {
        if commit_index < self.commit_index {
            return Err(RaftLogError::CommitRegression {
                current: self.commit_index,
                requested: commit_index,
            });
        }
        self.commit_index = commit_index.min(self.append_index);
        Ok(())
    }

    fn append_index(&self) -> LogIndex {
        self.append_index
    }

    fn prev_index(&self) -> LogIndex {
        self.prev_index
    }

    fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    fn read_entry_term(&self, index: LogIndex) -> Result<Option<Term>> {
        if index == self.prev_index {
            return Ok(Some(self.prev_term));
        }
        if index < self.prev_index || index > self.append_index {
            return Ok(None);
        }
        Ok(Some(self.entries[self.offset_of(index)].term))
    }

    fn get_entry_cursor(&self, from_index: LogIndex) -> Result<EntryCursor> {
        if from_index <= self.prev_index || from_index > self.append_index {
            return Ok(EntryCursor::empty(from_index));
        }
        let entries = self
            .entries
            .iter()
            .skip(self.offset_of(from_index))
            .cloned()
            .collect();
        Ok(EntryCursor::new(from_index, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: Term) -> LogEntry {
        LogEntry::new(term, format!("t{term}").into_bytes())
    }

    #[test]
    fn new_log_is_empty() {
        let log = InMemoryRaftLog::new();
        assert_eq!(log.append_index(), -1);
        assert_eq!(log.prev_index(), -1);
        assert_eq!(log.commit_index(), -1);
        assert_eq!(log.read_entry_term(-1).unwrap(), Some(0));
        assert_eq!(log.read_entry_term(0).unwrap(), None);
    }

    #[test]
    fn append_returns_last_index() {
        let mut log = InMemoryRaftLog::new();
        assert_eq!(log.append(&[entry(1), entry(1)]).unwrap(), 1);
        assert_eq!(log.append(&[entry(2)]).unwrap(), 2);
        assert_eq!(log.read_entry_term(2).unwrap(), Some(2));
    }

    #[test]
    fn append_rejects_lower_term() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(3)]).unwrap();
        let err = log.append(&[entry(3), entry(2)]).unwrap_err();
        assert!(matches!(err, RaftLogError::NonMonotonicTerm { term: 2, last_term: 3 }));
        assert_eq!(log.append_index(), 0);
    }

    #[test]
    fn truncate_restores_previous_term() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(2), entry(3)]).unwrap();
        log.truncate(1).unwrap();
        assert_eq!(log.append_index(), 0);
        // a term-1 entry is valid again once the later terms are gone
        assert_eq!(log.append(&[entry(1)]).unwrap(), 1);
    }

    #[test]
    fn truncate_refuses_committed_entries() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(1), entry(1)]).unwrap();
        log.commit(1).unwrap();
        assert!(matches!(log.truncate(1), Err(RaftLogError::TruncateCommitted { .. })));
        assert!(matches!(log.truncate(5), Err(RaftLogError::TruncateOutOfRange { .. })));
        log.truncate(2).unwrap();
    }

    #[test]
    fn prune_moves_prev_index() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(2), entry(3), entry(4)]).unwrap();
        assert_eq!(log.prune(1).unwrap(), 1);
        assert_eq!(log.prev_index(), 1);
        assert_eq!(log.read_entry_term(1).unwrap(), Some(2));
        assert_eq!(log.read_entry_term(0).unwrap(), None);
        assert_eq!(log.get_entry_cursor(2).unwrap().collect::<Vec<_>>(), vec![entry(3), entry(4)]);
        // pruning backwards is a no-op
        assert_eq!(log.prune(0).unwrap(), 1);
    }

    #[test]
    fn prune_is_bounded_by_append_index() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(1)]).unwrap();
        assert_eq!(log.prune(10).unwrap(), 1);
        assert!(log.is_empty());
        assert_eq!(log.append(&[entry(1)]).unwrap(), 2);
    }

    #[test]
    fn skip_only_moves_forward() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(1)]).unwrap();
        assert_eq!(log.skip(0, 1).unwrap(), 1);
        assert_eq!(log.skip(10, 4).unwrap(), 10);
        assert_eq!(log.prev_index(), 10);
        assert_eq!(log.read_entry_term(10).unwrap(), Some(4));
        assert_eq!(log.append(&[entry(4)]).unwrap(), 11);
    }

    #[test]
    fn commit_never_decreases() {
        let mut log = InMemoryRaftLog::new();
        log.append(&[entry(1), entry(1), entry(1)]).unwrap();
        log.commit(1).unwrap();
        assert!(matches!(
            log.commit(0),
            Err(RaftLogError::CommitRegression { current: 1, requested: 0 })
        ));
        log.commit(9).unwrap();
        assert_eq!(log.commit_index(), 2);
    }
}
