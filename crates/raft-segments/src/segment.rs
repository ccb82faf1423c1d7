//! # segment
//!
//! why: define what one segment file holds and how it is written and recovered
//! relations: produced and read by segmented.rs, summarized for pruning.rs
//! what: SegmentHeader, SegmentInfo, json-lines encoding with torn-tail tolerance and line offsets

use std::path::Path;

use raft_log::{LogEntry, LogIndex, RaftLogError, Result, Term};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// First line of every segment file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub version: u64,
    /// Index of the entry just before the first one in this segment
    pub prev_index: LogIndex,
    pub prev_term: Term,
}

/// What pruning strategies get to see about a live segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub version: u64,
    pub prev_index: LogIndex,
    pub prev_term: Term,
    /// Live entries, not counting any shadowed by a later truncation
    pub entry_count: u64,
    /// Bytes on disk
    pub size: u64,
}

impl SegmentInfo {
    pub fn last_index(&self) -> LogIndex {
        self.prev_index + self.entry_count as LogIndex
    }
}

/// Decoded segment file
#[derive(Debug)]
pub(crate) struct SegmentContent {
    pub header: SegmentHeader,
    pub entries: Vec<LogEntry>,
    /// Byte offset of every entry line, then the end of the last complete line
    pub offsets: Vec<u64>,
    /// A partially written last line was dropped
    pub torn: bool,
}

pub(crate) fn serialization_error(err: serde_json::Error) -> RaftLogError {
    RaftLogError::Serialization(err.to_string())
}

fn corrupt(path: &Path, reason: impl Into<String>) -> RaftLogError {
    RaftLogError::CorruptSegment {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value).map_err(serialization_error)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode a whole segment file.
///
/// `Ok(None)` means the header line itself never fully reached the disk: the
/// file is empty or its first line has no terminating newline. Anything
/// unreadable after a complete line is corruption, except a torn last line.
pub(crate) fn decode(path: &Path, bytes: &[u8]) -> Result<Option<SegmentContent>> {
    let mut lines = bytes.split_inclusive(|b| *b == b'\n');

    let Some(header_line) = lines.next().filter(|line| line.ends_with(b"\n")) else {
        return Ok(None);
    };
    let header: SegmentHeader = serde_json::from_slice(header_line).map_err(|e| corrupt(path, e.to_string()))?;

    let mut entries = Vec::new();
    let mut offsets = vec![header_line.len() as u64];
    let mut torn = false;
    let mut end = header_line.len() as u64;
    for line in lines {
        if !line.ends_with(b"\n") {
            warn!(path = %path.display(), bytes = line.len(), "discarding torn entry at end of segment");
            torn = true;
            break;
        }
        let entry: LogEntry = serde_json::from_slice(line)
            .map_err(|e| corrupt(path, format!("entry {}: {e}", entries.len())))?;
        entries.push(entry);
        end += line.len() as u64;
        offsets.push(end);
    }

    Ok(Some(SegmentContent {
        header,
        entries,
        offsets,
        torn,
    }))
}

/// Decode the complete entry lines in `bytes`, a slice cut on line offsets.
pub(crate) fn decode_entries(path: &Path, bytes: &[u8]) -> Result<Vec<LogEntry>> {
    bytes
        .split_inclusive(|b| *b == b'\n')
        .map(|line| serde_json::from_slice(line).map_err(|e| corrupt(path, e.to_string())))
        .collect()
}
