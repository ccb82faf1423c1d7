//! # raft-log
//!
//! why: keep the replicated raft log consistent while outcomes mutate it
//! relations: raft-segments supplies the durable log and file system; role handlers produce outcomes
//! what: log contract, in-memory and cached logs, range map, in-flight cache, outcome pipeline, safety oracle

pub mod cached;
pub mod command;
pub mod error;
pub mod in_flight;
pub mod in_memory;
pub mod log;
pub mod message;
pub mod outcome;
pub mod range_map;
pub mod safety;
pub mod state;

pub use cached::CachedSuffixRaftLog;
pub use command::LogCommand;
pub use error::{RaftLogError, Result};
pub use in_flight::{InFlightCache, InFlightMap};
pub use in_memory::InMemoryRaftLog;
pub use log::{read_log_entry, EntryCursor, LogEntry, LogIndex, RaftLog, Term};
pub use message::{Directed, MemberId, RaftMessage};
pub use outcome::{FollowerState, FollowerStates, Outcome, ShipCommand};
pub use range_map::{OpenEndRangeMap, ValueRange};
pub use safety::{ClusterState, ComparableRaftState, Violation};
pub use state::{InMemoryStateStore, RaftState, Role, StateStore};
