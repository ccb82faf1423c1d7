//! # segmented
//!
//! why: the canonical, crash-recoverable raft log split across versioned segment files
//! relations: names files through catalog.rs, encodes with segment.rs, summarized for pruning.rs
//! what: SegmentedRaftLog implementing raft_log::RaftLog

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use raft_log::{EntryCursor, LogEntry, LogIndex, OpenEndRangeMap, RaftLog, RaftLogError, Result, Term};
use tracing::{debug, info, warn};

use crate::catalog::FileNameCatalog;
use crate::config::SegmentedLogConfig;
use crate::fs::{FileSystem, StoreChannel};
use crate::segment::{self, SegmentHeader, SegmentInfo};

#[derive(Debug)]
struct Segment {
    header: SegmentHeader,
    path: PathBuf,
    /// Term of every entry physically present, including any shadowed by a truncation
    terms: Vec<Term>,
    /// Byte offset of every entry line, then the end of the last complete line
    offsets: Vec<u64>,
    size: u64,
}

impl Segment {
    fn first_index(&self) -> LogIndex {
        self.header.prev_index + 1
    }

    fn entry_count(&self) -> u64 {
        self.terms.len() as u64
    }

    fn term_at(&self, index: LogIndex) -> Option<Term> {
        self.terms.get((index - self.first_index()) as usize).copied()
    }
}

/// Durable raft log made of `raft.log.<version>` files.
///
/// Truncation and skip never rewrite a file: they start a new segment whose
/// header records where it continues from, and the range map sends reads of
/// every index to the newest segment covering it.
pub struct SegmentedRaftLog {
    fs: Arc<dyn FileSystem>,
    catalog: FileNameCatalog,
    rotate_at_size: u64,
    segments: BTreeMap<u64, Segment>,
    ranges: OpenEndRangeMap<LogIndex, u64>,
    writer: Box<dyn StoreChannel>,
    current: u64,
    next_version: u64,
    /// A write failed part way; the next append starts a fresh segment
    dirty: bool,
    prev_index: LogIndex,
    prev_term: Term,
    append_index: LogIndex,
    commit_index: LogIndex,
    term: Term,
}

impl fmt::Debug for SegmentedRaftLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedRaftLog")
            .field("directory", &self.catalog.base_dir())
            .field("segments", &self.segments.len())
            .field("current", &self.current)
            .field("prev_index", &self.prev_index)
            .field("append_index", &self.append_index)
            .field("commit_index", &self.commit_index)
            .finish()
    }
}

fn start_segment(
    fs: &dyn FileSystem,
    catalog: &FileNameCatalog,
    header: SegmentHeader,
) -> Result<(Segment, Box<dyn StoreChannel>)> {
    let path = catalog.path_for(header.version);
    let mut channel = fs.create_or_open(&path)?;
    let line = segment::encode_line(&header)?;
    channel.write_all(&line)?;
    channel.force()?;
    let segment = Segment {
        header,
        path,
        terms: Vec::new(),
        offsets: vec![line.len() as u64],
        size: line.len() as u64,
    };
    Ok((segment, channel))
}

impl SegmentedRaftLog {
    /// Open the log in `config.directory`, recovering whatever segments exist.
    pub fn open(fs: Arc<dyn FileSystem>, config: &SegmentedLogConfig) -> Result<Self> {
        fs.mkdirs(&config.directory)?;
        let catalog = FileNameCatalog::new(&config.directory);
        let files = catalog.scan_existing(fs.as_ref())?;
        let last_version = files.keys().next_back().copied();

        let mut segments: BTreeMap<u64, Segment> = BTreeMap::new();
        let mut ranges: OpenEndRangeMap<LogIndex, u64> = OpenEndRangeMap::new();
        let mut prev_index: LogIndex = -1;
        let mut prev_term: Term = 0;
        let mut append_index: LogIndex = -1;
        let mut term: Term = 0;
        let mut torn_tail = false;

        for (version, path) in files {
            let bytes = fs.read_all(&path)?;
            let content = match segment::decode(&path, &bytes)? {
                Some(content) => content,
                None if Some(version) == last_version => {
                    warn!(path = %path.display(), "removing last segment whose header never reached the disk");
                    fs.delete(&path)?;
                    continue;
                }
                None => {
                    return Err(RaftLogError::CorruptSegment {
                        path: path.display().to_string(),
                        reason: "missing header".to_string(),
                    })
                }
            };

            let header = content.header;
            if header.version != version {
                return Err(RaftLogError::CorruptSegment {
                    path: path.display().to_string(),
                    reason: format!("header claims version {}", header.version),
                });
            }

            if segments.is_empty() || header.prev_index > append_index {
                prev_index = header.prev_index;
                prev_term = header.prev_term;
            } else if header.prev_index < append_index {
                debug!(version, from = header.prev_index + 1, "segment truncates earlier entries");
            }

            for shadowed in ranges.replace_from(header.prev_index + 1, version) {
                if let Some(old) = segments.remove(&shadowed) {
                    info!(version = shadowed, "removing segment shadowed by a truncation");
                    fs.delete(&old.path)?;
                }
            }

            append_index = header.prev_index + content.entries.len() as LogIndex;
            term = content.entries.last().map_or(header.prev_term, |e| e.term);
            torn_tail = content.torn;
            segments.insert(
                version,
                Segment {
                    header,
                    path,
                    terms: content.entries.iter().map(|e| e.term).collect(),
                    offsets: content.offsets,
                    size: bytes.len() as u64,
                },
            );
        }

        let next_version = segments.keys().next_back().map_or(0, |v| v + 1);
        let last = segments.keys().next_back().copied();
        let mut log = match last {
            Some(current) => {
                let path = segments[&current].path.clone();
                let writer = fs.create_or_open(&path)?;
                Self {
                    fs,
                    catalog,
                    rotate_at_size: config.rotate_at_size,
                    segments,
                    ranges,
                    writer,
                    current,
                    next_version,
                    dirty: torn_tail,
                    prev_index,
                    prev_term,
                    append_index,
                    commit_index: prev_index,
                    term,
                }
            }
            None => {
                let header = SegmentHeader {
                    version: 0,
                    prev_index: -1,
                    prev_term: 0,
                };
                let (segment, writer) = start_segment(fs.as_ref(), &catalog, header)?;
                segments.insert(0, segment);
                ranges.replace_from(0, 0);
                Self {
                    fs,
                    catalog,
                    rotate_at_size: config.rotate_at_size,
                    segments,
                    ranges,
                    writer,
                    current: 0,
                    next_version: 1,
                    dirty: false,
                    prev_index: -1,
                    prev_term: 0,
                    append_index: -1,
                    commit_index: -1,
                    term: 0,
                }
            }
        };

        if log.dirty {
            log.rotate_to(log.append_index, log.term)?;
        }
        info!(
            directory = %log.catalog.base_dir().display(),
            segments = log.segments.len(),
            prev_index = log.prev_index,
            append_index = log.append_index,
            "opened segmented raft log"
        );
        Ok(log)
    }

    /// Start a new segment continuing after `(prev_index, prev_term)`.
    ///
    /// Segments starting after `prev_index` are shadowed entirely and deleted
    /// once the new header is durable.
    fn rotate_to(&mut self, prev_index: LogIndex, prev_term: Term) -> Result<()> {
        let header = SegmentHeader {
            version: self.next_version,
            prev_index,
            prev_term,
        };
        let (segment, writer) = start_segment(self.fs.as_ref(), &self.catalog, header)?;
        debug!(version = header.version, prev_index, "started new segment");

        self.segments.insert(header.version, segment);
        self.writer = writer;
        self.current = header.version;
        self.next_version += 1;
        self.dirty = false;

        for shadowed in self.ranges.replace_from(prev_index + 1, header.version) {
            if let Some(old) = self.segments.remove(&shadowed) {
                info!(version = shadowed, "removing segment shadowed by a truncation");
                self.fs.delete(&old.path)?;
            }
        }
        Ok(())
    }

    fn corrupt(&self, version: u64, reason: impl Into<String>) -> RaftLogError {
        RaftLogError::CorruptSegment {
            path: self.catalog.path_for(version).display().to_string(),
            reason: reason.into(),
        }
    }

    /// Read entries `from..=to` of one segment, decoding only their lines.
    fn load_entries(&self, version: u64, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>> {
        let segment = self
            .segments
            .get(&version)
            .ok_or_else(|| self.corrupt(version, "segment is not tracked"))?;
        let first = (from - segment.first_index()) as usize;
        let last = (to - segment.first_index()) as usize;
        let (Some(start), Some(end)) = (segment.offsets.get(first), segment.offsets.get(last + 1)) else {
            return Err(self.corrupt(version, format!("missing entries up to {to}")));
        };

        let bytes = self.fs.read_all(&segment.path)?;
        let lines = bytes
            .get(*start as usize..*end as usize)
            .ok_or_else(|| self.corrupt(version, format!("file ends before offset {end}")))?;
        let entries = segment::decode_entries(&segment.path, lines)?;
        if entries.len() != last - first + 1 {
            return Err(self.corrupt(version, format!("expected {} entries from {from}", last - first + 1)));
        }
        Ok(entries)
    }

    /// Live segments in index order, as seen by pruning strategies
    pub fn segment_infos(&self) -> Vec<SegmentInfo> {
        let ranges: Vec<(LogIndex, u64)> = self.ranges.entries().map(|(start, v)| (*start, *v)).collect();
        ranges
            .iter()
            .enumerate()
            .filter_map(|(i, (start, version))| {
                let segment = self.segments.get(version)?;
                let live = match ranges.get(i + 1) {
                    Some((next_start, _)) => segment.entry_count().min((next_start - start) as u64),
                    None => segment.entry_count(),
                };
                Some(SegmentInfo {
                    version: *version,
                    prev_index: segment.header.prev_index,
                    prev_term: segment.header.prev_term,
                    entry_count: live,
                    size: segment.size,
                })
            })
            .collect()
    }

    /// Version of the segment currently appended to
    pub fn current_version(&self) -> u64 {
        self.current
    }
}

impl RaftLog for SegmentedRaftLog {
    fn append(&mut self, entries: &[LogEntry]) -> Result<LogIndex> {
        if entries.is_empty() {
            return Ok(self.append_index);
        }

        let mut last_term = self.term;
        let mut buffer = Vec::new();
        let mut line_ends = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.term < last_term {
                return Err(RaftLogError::NonMonotonicTerm {
                    term: entry.term,
                    last_term,
                });
            }
            last_term = entry.term;
            buffer.extend(segment::encode_line(entry)?);
            line_ends.push(buffer.len() as u64);
        }

        if self.dirty {
            self.rotate_to(self.append_index, self.term)?;
        }
        if let Err(err) = self.writer.write_all(&buffer).and_then(|_| self.writer.force()) {
            self.dirty = true;
            return Err(err.into());
        }

        if let Some(segment) = self.segments.get_mut(&self.current) {
            let base = segment.offsets.last().copied().unwrap_or(segment.size);
            segment.offsets.extend(line_ends.iter().map(|end| base + end));
            segment.terms.extend(entries.iter().map(|e| e.term));
            segment.size += buffer.len() as u64;
        }
        self.append_index += entries.len() as LogIndex;
        self.term = last_term;

        let size = self.segments.get(&self.current).map_or(0, |s| s.size);
        if size >= self.rotate_at_size {
            debug!(version = self.current, size, "segment reached rotation size");
            self.rotate_to(self.append_index, self.term)?;
        }
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

        let term = self
            .read_entry_term(from_index - 1)?
            .ok_or_else(|| self.corrupt(self.current, format!("no entry at {}", from_index - 1)))?;
        info!(from_index, append_index = self.append_index, "truncating raft log");
        self.rotate_to(from_index - 1, term)?;
        self.append_index = from_index - 1;
        self.term = term;
        Ok(())
    }

    fn prune(&mut self, safe_index: LogIndex) -> Result<LogIndex> {
        if safe_index <= self.prev_index {
            return Ok(self.prev_index);
        }

        for version in self.ranges.remove(&(safe_index + 1)) {
            if let Some(segment) = self.segments.remove(&version) {
                debug!(version, "pruning segment");
                self.fs.delete(&segment.path)?;
            }
        }

        let oldest = self
            .ranges
            .entries()
            .next()
            .and_then(|(_, version)| self.segments.get(version))
            .map(|s| s.header);
        if let Some(header) = oldest {
            if header.prev_index > self.prev_index {
                self.prev_index = header.prev_index;
                self.prev_term = header.prev_term;
                info!(prev_index = self.prev_index, "pruned raft log");
            }
        }
        Ok(self.prev_index)
    }

    fn skip(&mut self, index: LogIndex, term: Term) -> Result<LogIndex> {
        if index > self.append_index {
            info!(index, term, append_index = self.append_index, "skipping raft log ahead");
            self.rotate_to(index, term)?;
            self.prev_index = index;
            self.prev_term = term;
            self.append_index = index;
            self.term = term;
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
        let term = self
            .ranges
            .lookup(&index)
            .value
            .and_then(|version| self.segments.get(&version))
            .and_then(|segment| segment.term_at(index));
        Ok(term)
    }

    fn get_entry_cursor(&self, from_index: LogIndex) -> Result<EntryCursor> {
        if from_index <= self.prev_index || from_index > self.append_index {
            return Ok(EntryCursor::empty(from_index));
        }

        let mut collected = Vec::new();
        let mut index = from_index;
        while index <= self.append_index {
            let range = self.ranges.lookup(&index);
            let version = range
                .value
                .ok_or_else(|| self.corrupt(self.current, format!("no segment covers index {index}")))?;
            let end = range.limit.map_or(self.append_index, |limit| (limit - 1).min(self.append_index));
            collected.extend(self.load_entries(version, index, end)?);
            index = end + 1;
        }
        Ok(EntryCursor::new(from_index, collected))
    }
}
