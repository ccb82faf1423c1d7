//! # pruning
//!
//! why: decide how much old log can go without ever passing what the caller says is safe
//! relations: reads SegmentInfo from segmented.rs, policy text from config.rs
//! what: PruningStrategy trait and strategies, policy parsing, SegmentedRaftLogPruner, prune_once

use std::fmt::Debug;

use parking_lot::Mutex;
use raft_log::{CachedSuffixRaftLog, LogIndex, RaftLog};
use tracing::{debug, error, warn};

use crate::segment::SegmentInfo;
use crate::segmented::SegmentedRaftLog;

/// Decides the highest index that may be discarded, given the live segments
pub trait PruningStrategy: Debug + Send + Sync {
    /// Everything up to and including the returned index may be pruned; `-1` keeps all.
    fn index_to_keep(&self, segments: &[SegmentInfo]) -> LogIndex;
}

/// Keep everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruning;

impl PruningStrategy for NoPruning {
    fn index_to_keep(&self, _segments: &[SegmentInfo]) -> LogIndex {
        -1
    }
}

/// Keep the newest segments until at least `bytes_to_keep` bytes are retained
#[derive(Debug, Clone, Copy)]
pub struct SizeBasedPruning {
    bytes_to_keep: u64,
}

impl SizeBasedPruning {
    pub fn new(bytes_to_keep: u64) -> Self {
        Self { bytes_to_keep }
    }
}

impl PruningStrategy for SizeBasedPruning {
    fn index_to_keep(&self, segments: &[SegmentInfo]) -> LogIndex {
        let mut accumulated = 0;
        let mut keep_after = -1;
        for segment in segments.iter().rev() {
            accumulated += segment.size;
            keep_after = segment.prev_index;
            if accumulated >= self.bytes_to_keep {
                break;
            }
        }
        keep_after
    }
}

/// Keep the newest segments until at least `entries_to_keep` entries are retained
#[derive(Debug, Clone, Copy)]
pub struct EntryBasedPruning {
    entries_to_keep: u64,
}

impl EntryBasedPruning {
    pub fn new(entries_to_keep: u64) -> Self {
        Self { entries_to_keep }
    }
}

impl PruningStrategy for EntryBasedPruning {
    fn index_to_keep(&self, segments: &[SegmentInfo]) -> LogIndex {
        let Some(last_index) = segments.last().map(SegmentInfo::last_index) else {
            return -1;
        };
        let mut keep_after = -1;
        for segment in segments.iter().rev() {
            keep_after = segment.prev_index;
            if (last_index - keep_after) as u64 >= self.entries_to_keep {
                break;
            }
        }
        keep_after
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PruningConfigError {
    #[error("invalid pruning policy {0:?}: expected \"false\" or \"<number><unit>\"")]
    Malformed(String),

    #[error("invalid pruning policy {policy:?}: unknown unit {unit:?}")]
    UnknownUnit { policy: String, unit: String },

    #[error("invalid pruning policy {0:?}: threshold must be positive")]
    NonPositive(String),
}

/// Parse `false` or `<number>[k|m|g]<unit>` into a strategy.
///
/// Units: `size` (bytes), `txs`/`entries` (entry count), `hours`/`days` (accepted,
/// but pruning by age is not supported and keeps everything).
pub fn parse_strategy(policy: &str) -> Result<Box<dyn PruningStrategy>, PruningConfigError> {
    let text = policy.trim();
    if text == "false" {
        return Ok(Box::new(NoPruning));
    }

    let digits_end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    if digits_end == 0 {
        return Err(PruningConfigError::Malformed(policy.to_string()));
    }
    let number: u64 = text[..digits_end]
        .parse()
        .map_err(|_| PruningConfigError::Malformed(policy.to_string()))?;

    let mut rest = text[digits_end..].trim_start();
    let mut multiplier = 1u64;
    if let Some(first) = rest.chars().next() {
        let scale = match first.to_ascii_lowercase() {
            'k' => Some(1024),
            'm' => Some(1024 * 1024),
            'g' => Some(1024 * 1024 * 1024),
            _ => None,
        };
        if let Some(scale) = scale {
            multiplier = scale;
            rest = rest[1..].trim_start();
        }
    }

    let threshold = number
        .checked_mul(multiplier)
        .ok_or_else(|| PruningConfigError::Malformed(policy.to_string()))?;
    if threshold == 0 {
        return Err(PruningConfigError::NonPositive(policy.to_string()));
    }

    match rest {
        "size" => Ok(Box::new(SizeBasedPruning::new(threshold))),
        "txs" | "entries" => Ok(Box::new(EntryBasedPruning::new(threshold))),
        "hours" | "days" => {
            warn!(policy, "time based raft log pruning is not supported, keeping all entries");
            Ok(Box::new(NoPruning))
        }
        unit => Err(PruningConfigError::UnknownUnit {
            policy: policy.to_string(),
            unit: unit.to_string(),
        }),
    }
}

/// Something that can describe its live segments to a pruning strategy
pub trait SegmentView {
    fn segment_infos(&self) -> Vec<SegmentInfo>;
}

impl SegmentView for SegmentedRaftLog {
    fn segment_infos(&self) -> Vec<SegmentInfo> {
        SegmentedRaftLog::segment_infos(self)
    }
}

impl SegmentView for CachedSuffixRaftLog<SegmentedRaftLog> {
    fn segment_infos(&self) -> Vec<SegmentInfo> {
        self.full_log().segment_infos()
    }
}

/// Bounds a configured strategy by the caller's safe index
#[derive(Debug)]
pub struct SegmentedRaftLogPruner {
    strategy: Box<dyn PruningStrategy>,
}

impl SegmentedRaftLogPruner {
    pub fn new(strategy: Box<dyn PruningStrategy>) -> Self {
        Self { strategy }
    }

    /// Fails fast on a malformed policy
    pub fn from_config(policy: &str) -> Result<Self, PruningConfigError> {
        Ok(Self::new(parse_strategy(policy)?))
    }

    /// Never above `safe_index`, whatever the strategy would allow
    pub fn index_to_prune_from(&self, safe_index: LogIndex, segments: &[SegmentInfo]) -> LogIndex {
        safe_index.min(self.strategy.index_to_keep(segments))
    }
}

/// One scheduled pruning pass.
///
/// `safe_index` is taken as a snapshot. Failures are logged and reported as
/// `None` so the caller's schedule keeps running and log writes are unaffected.
pub fn prune_once<L>(log: &Mutex<L>, pruner: &SegmentedRaftLogPruner, safe_index: LogIndex) -> Option<LogIndex>
where
    L: RaftLog + SegmentView,
{
    let mut log = log.lock();
    let target = pruner.index_to_prune_from(safe_index, &log.segment_infos());
    match log.prune(target) {
        Ok(prev_index) => {
            debug!(safe_index, target, prev_index, "raft log pruning pass finished");
            Some(prev_index)
        }
        Err(err) => {
            error!(%err, safe_index, target, "raft log pruning failed");
            None
        }
    }
}
