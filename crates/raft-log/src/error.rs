//! # error
//!
//! why: one error vocabulary for every log mutation and lookup
//! relations: returned by log.rs implementors, command.rs, state.rs and raft-segments
//! what: RaftLogError, fatal vs recoverable classification, Result alias

use std::io;

use crate::log::{LogIndex, Term};

/// Errors raised while mutating or reading the replicated log
#[derive(Debug, thiserror::Error)]
pub enum RaftLogError {
    /// I/O failure in the underlying file system
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment or state file could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A segment file is structurally broken beyond a torn tail
    #[error("corrupt segment {path}: {reason}")]
    CorruptSegment { path: String, reason: String },

    /// The suffix cache and the full log disagreed on an append index
    #[error("cache log returned append index {cache} but full log returned {full}")]
    AppendIndexMismatch { cache: LogIndex, full: LogIndex },

    /// An append targeted an index that already holds an entry
    #[error("attempted to append over an existing entry at index {index} (append index {append_index})")]
    EntryAlreadyExists {
        index: LogIndex,
        append_index: LogIndex,
    },

    /// An append would leave a hole in the log
    #[error("append at index {index} leaves a gap after append index {append_index}")]
    NonContiguousAppend {
        index: LogIndex,
        append_index: LogIndex,
    },

    /// Entry terms must never decrease along the log
    #[error("non-monotonic term {term} after last term {last_term}")]
    NonMonotonicTerm { term: Term, last_term: Term },

    #[error("commit index cannot move from {current} back to {requested}")]
    CommitRegression {
        current: LogIndex,
        requested: LogIndex,
    },

    #[error("term cannot move from {current} back to {requested}")]
    TermRegression { current: Term, requested: Term },

    /// A second, different vote in the same term
    #[error("already voted for {existing:?} in term {term}, refusing {requested:?}")]
    VoteConflict {
        term: Term,
        existing: Option<u64>,
        requested: Option<u64>,
    },

    #[error("cannot truncate at index {from_index} when append index is {append_index}")]
    TruncateOutOfRange {
        from_index: LogIndex,
        append_index: LogIndex,
    },

    #[error("cannot truncate at index {from_index}, entries up to {prev_index} are pruned")]
    TruncatePruned {
        from_index: LogIndex,
        prev_index: LogIndex,
    },

    #[error("cannot truncate at index {from_index}, entries up to {commit_index} are committed")]
    TruncateCommitted {
        from_index: LogIndex,
        commit_index: LogIndex,
    },

    /// In-flight entries are registered exactly once
    #[error("key {key} is already registered in the in-flight map")]
    AlreadyRegistered { key: String },
}

impl RaftLogError {
    /// Whether the error signals a consistency violation rather than a transient failure.
    ///
    /// Fatal errors must stop the replica's log processing; I/O errors are left to
    /// outer layers to retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RaftLogError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, RaftLogError>;
