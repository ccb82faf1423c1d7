//! # raft-segments
//!
//! why: give the raft log a durable home that survives crashes and can be pruned
//! relations: implements raft_log::RaftLog and raft_log::StateStore on top of the file system
//! what: segment files, FileNameCatalog, SegmentedRaftLog, pruning strategies, FileStateStore

pub mod catalog;
pub mod config;
pub mod fs;
pub mod pruning;
pub mod segment;
pub mod segmented;
pub mod state_store;

pub use catalog::FileNameCatalog;
pub use config::SegmentedLogConfig;
pub use fs::{DefaultFileSystem, EphemeralFileSystem, FileSystem, StoreChannel};
pub use pruning::{
    parse_strategy, prune_once, EntryBasedPruning, NoPruning, PruningConfigError, PruningStrategy,
    SegmentView, SegmentedRaftLogPruner, SizeBasedPruning,
};
pub use segment::{SegmentHeader, SegmentInfo};
pub use segmented::SegmentedRaftLog;
pub use state_store::FileStateStore;
