//! # message
//!
//! why: name the raft messages an outcome may ask to send
//! relations: carried by outcome.rs as outgoing messages; transport lives elsewhere
//! what: MemberId, RaftMessage, Directed

use serde::{Deserialize, Serialize};

use crate::log::{LogEntry, LogIndex, Term};

/// Cluster member identifier
pub type MemberId = u64;

/// All Raft messages a role may emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    /// Request a vote during leader election
    VoteRequest {
        from: MemberId,
        term: Term,
        candidate: MemberId,
        last_log_index: LogIndex,
        last_log_term: Term,
    },
    /// Response to a vote request
    VoteResponse {
        from: MemberId,
        term: Term,
        vote_granted: bool,
    },
    /// Replicate log entries
    AppendEntriesRequest {
        from: MemberId,
        leader_term: Term,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    },
    /// Response to AppendEntries
    AppendEntriesResponse {
        from: MemberId,
        term: Term,
        success: bool,
        match_index: LogIndex,
        append_index: LogIndex,
    },
    /// Leader liveness plus commit information, no entries
    Heartbeat {
        from: MemberId,
        leader_term: Term,
        commit_index: LogIndex,
        commit_index_term: Term,
    },
    HeartbeatResponse { from: MemberId },
    /// Tells followers how far the leader has pruned its log
    LogCompactionInfo {
        from: MemberId,
        leader_term: Term,
        prev_index: LogIndex,
    },
}

impl RaftMessage {
    pub fn from(&self) -> MemberId {
        match self {
            RaftMessage::VoteRequest { from, .. }
            | RaftMessage::VoteResponse { from, .. }
            | RaftMessage::AppendEntriesRequest { from, .. }
            | RaftMessage::AppendEntriesResponse { from, .. }
            | RaftMessage::Heartbeat { from, .. }
            | RaftMessage::HeartbeatResponse { from }
            | RaftMessage::LogCompactionInfo { from, .. } => *from,
        }
    }
}

/// A message addressed to one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directed {
    pub to: MemberId,
    pub message: RaftMessage,
}

impl Directed {
    pub fn new(to: MemberId, message: RaftMessage) -> Self {
        Self { to, message }
    }
}
