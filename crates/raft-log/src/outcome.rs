//! # outcome
//!
//! why: capture everything that changes when a role handles one message
//! relations: produced by role handlers, consumed once by state.rs or safety.rs; holds command.rs values
//! what: Outcome, FollowerState, FollowerStates, ShipCommand

use std::collections::{BTreeMap, BTreeSet};

use crate::command::LogCommand;
use crate::error::Result;
use crate::in_flight::InFlightCache;
use crate::log::{LogEntry, LogIndex, RaftLog, Term};
use crate::message::{Directed, MemberId};
use crate::state::{RaftState, Role, StateStore};

/// Leader's view of one follower's replication progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerState {
    pub match_index: LogIndex,
}

impl Default for FollowerState {
    fn default() -> Self {
        Self { match_index: -1 }
    }
}

impl FollowerState {
    /// The match index only ever moves forward
    pub fn on_success_response(self, new_match_index: LogIndex) -> Self {
        Self {
            match_index: self.match_index.max(new_match_index),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowerStates {
    states: BTreeMap<MemberId, FollowerState>,
}

impl FollowerStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, member: MemberId) -> FollowerState {
        self.states.get(&member).copied().unwrap_or_default()
    }

    pub fn on_success_response(mut self, member: MemberId, new_match_index: LogIndex) -> Self {
        let state = self.get(member).on_success_response(new_match_index);
        self.states.insert(member, state);
        self
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &FollowerState)> {
        self.states.iter()
    }
}

/// Instructions for the leader's log shipping, one per follower interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipCommand {
    Mismatch {
        last_remote_append_index: LogIndex,
        target: MemberId,
    },
    Match {
        new_match_index: LogIndex,
        target: MemberId,
    },
    NewEntries {
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
    },
    CommitUpdate,
}

/// The state delta produced by one role handling one message.
///
/// Built once with struct update syntax on top of [`Outcome::carrying`] and
/// consumed by [`RaftState::update`]; nothing mutates it after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub role: Role,
    pub term: Term,
    pub leader: Option<MemberId>,
    pub leader_commit: LogIndex,
    pub commit_index: LogIndex,
    pub voted_for: Option<MemberId>,
    pub votes_for_me: BTreeSet<MemberId>,
    pub last_log_index_before_we_became_follower: LogIndex,
    pub follower_states: FollowerStates,
    pub log_commands: Vec<LogCommand>,
    pub outgoing_messages: Vec<Directed>,
    pub ship_commands: Vec<ShipCommand>,
    pub elected_leader: bool,
    pub stepping_down_in_term: Option<Term>,
    pub heartbeat_responses: BTreeSet<MemberId>,
    pub renew_election_timeout: bool,
    pub needs_fresh_snapshot: bool,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            role: Role::Follower,
            term: 0,
            leader: None,
            leader_commit: -1,
            commit_index: -1,
            voted_for: None,
            votes_for_me: BTreeSet::new(),
            last_log_index_before_we_became_follower: -1,
            follower_states: FollowerStates::new(),
            log_commands: Vec::new(),
            outgoing_messages: Vec::new(),
            ship_commands: Vec::new(),
            elected_leader: false,
            stepping_down_in_term: None,
            heartbeat_responses: BTreeSet::new(),
            renew_election_timeout: false,
            needs_fresh_snapshot: false,
        }
    }
}

impl Outcome {
    /// An outcome that changes nothing: every field carried over from `state`.
    pub fn carrying<L: RaftLog, S: StateStore>(state: &RaftState<L, S>) -> Self {
        Self {
            role: state.role(),
            term: state.term(),
            leader: state.leader(),
            leader_commit: state.leader_commit(),
            commit_index: state.commit_index(),
            voted_for: state.voted_for(),
            votes_for_me: state.votes_for_me().clone(),
            last_log_index_before_we_became_follower: state.last_log_index_before_we_became_follower(),
            follower_states: state.follower_states().clone(),
            ..Self::default()
        }
    }

    pub fn with_log_command(mut self, command: LogCommand) -> Self {
        self.log_commands.push(command);
        self
    }

    pub fn with_outgoing_message(mut self, message: Directed) -> Self {
        self.outgoing_messages.push(message);
        self
    }

    pub fn with_ship_command(mut self, command: ShipCommand) -> Self {
        self.ship_commands.push(command);
        self
    }

    /// Apply every log command in order, each to the log first and then to the cache.
    pub fn apply_log_commands<L: RaftLog + ?Sized>(&self, log: &mut L, cache: &InFlightCache) -> Result<()> {
        for command in &self.log_commands {
            command.apply(log, cache)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_match_index_never_regresses() {
        let states = FollowerStates::new()
            .on_success_response(2, 5)
            .on_success_response(2, 3);
        assert_eq!(states.get(2).match_index, 5);
        assert_eq!(states.get(3).match_index, -1);
    }

    #[test]
    fn commands_apply_in_list_order() {
        let mut log = crate::in_memory::InMemoryRaftLog::new();
        let cache = InFlightCache::new();
        let outcome = Outcome::default()
            .with_log_command(LogCommand::BatchAppend {
                base_index: 0,
                offset: 0,
                entries: vec![LogEntry::new(1, vec![0]), LogEntry::new(1, vec![1])],
            })
            .with_log_command(LogCommand::Truncate { from_index: 1 })
            .with_log_command(LogCommand::Append {
                index: 1,
                entry: LogEntry::new(2, vec![2]),
            });

        outcome.apply_log_commands(&mut log, &cache).unwrap();

        assert_eq!(log.append_index(), 1);
        assert_eq!(log.read_entry_term(1).unwrap(), Some(2));
        assert_eq!(cache.retrieve(&1), Some(LogEntry::new(2, vec![2])));
    }
}
