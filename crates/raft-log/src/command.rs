//! # command
//!
//! why: turn an outcome's log decisions into mutations of the log and in-flight cache
//! relations: carried by outcome.rs, applied by state.rs and safety.rs
//! what: LogCommand enum and its application to a RaftLog and an InFlightCache

use tracing::{debug, error};

use crate::error::{RaftLogError, Result};
use crate::in_flight::InFlightCache;
use crate::log::{LogEntry, LogIndex, RaftLog, Term};

/// A single log mutation decided while handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCommand {
    /// Append one entry at `index`
    Append { index: LogIndex, entry: LogEntry },
    /// Append `entries[offset..]`, the first of them landing at `base_index + offset`
    BatchAppend {
        base_index: LogIndex,
        offset: usize,
        entries: Vec<LogEntry>,
    },
    /// Discard everything from `from_index` onwards
    Truncate { from_index: LogIndex },
    /// Drop entries up to `prune_index`
    Prune { prune_index: LogIndex },
    /// Advance the commit watermark
    Commit { commit_index: LogIndex },
    /// Jump past a snapshot boundary
    Skip { index: LogIndex, term: Term },
}

impl LogCommand {
    /// Apply the command to the log, then to the in-flight cache.
    pub fn apply<L: RaftLog + ?Sized>(&self, log: &mut L, cache: &InFlightCache) -> Result<()> {
        self.apply_to_log(log)?;
        self.apply_to_cache(cache, log.prev_index())
    }

    pub fn apply_to_log<L: RaftLog + ?Sized>(&self, log: &mut L) -> Result<()> {
        match self {
            LogCommand::Append { index, entry } => {
                check_appendable(log, *index)?;
                log.append(std::slice::from_ref(entry))?;
            }
            LogCommand::BatchAppend {
                base_index,
                offset,
                entries,
            } => {
                if *offset >= entries.len() {
                    return Ok(());
                }
                check_appendable(log, base_index + *offset as LogIndex)?;
                log.append(&entries[*offset..])?;
            }
            LogCommand::Truncate { from_index } => log.truncate(*from_index)?,
            LogCommand::Prune { prune_index } => {
                log.prune(*prune_index)?;
            }
            LogCommand::Commit { commit_index } => log.commit(*commit_index)?,
            LogCommand::Skip { index, term } => {
                log.skip(*index, *term)?;
            }
        }
        Ok(())
    }

    /// Mirror the command into the cache; `prev_index` is the log's prev index after `apply_to_log`.
    pub fn apply_to_cache(&self, cache: &InFlightCache, prev_index: LogIndex) -> Result<()> {
        match self {
            LogCommand::Append { index, entry } => cache.register(*index, entry.clone())?,
            LogCommand::BatchAppend {
                base_index,
                offset,
                entries,
            } => {
                for (i, entry) in entries.iter().enumerate().skip(*offset) {
                    cache.register(base_index + i as LogIndex, entry.clone())?;
                }
            }
            LogCommand::Truncate { from_index } => {
                let mut index = *from_index;
                while cache.unregister(&index) {
                    index += 1;
                }
                debug!(from_index, evicted = index - from_index, "evicted truncated in-flight entries");
            }
            // prev_index only moves when the log really dropped entries
            LogCommand::Prune { .. } | LogCommand::Skip { .. } => cache.retain(|index, _| *index > prev_index),
            LogCommand::Commit { .. } => {}
        }
        Ok(())
    }
}

fn check_appendable<L: RaftLog + ?Sized>(log: &L, index: LogIndex) -> Result<()> {
    let append_index = log.append_index();
    if index <= append_index {
        error!(index, append_index, "refusing to overwrite log history");
        return Err(RaftLogError::EntryAlreadyExists {
            index,
            append_index,
        });
    }
    if index != append_index + 1 {
        return Err(RaftLogError::NonContiguousAppend {
            index,
            append_index,
        });
    }
    Ok(())
}
