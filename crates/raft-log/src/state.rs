//! # state
//!
//! why: hold one member's raft state and fold outcomes into it atomically
//! relations: consumes outcome.rs, drives command.rs against a RaftLog, persists through StateStore
//! what: Role enum, StateStore trait, InMemoryStateStore, RaftState

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RaftLogError, Result};
use crate::in_flight::InFlightCache;
use crate::log::{LogIndex, RaftLog, Term};
use crate::message::MemberId;
use crate::outcome::{FollowerStates, Outcome};

/// The three possible roles a Raft member can be in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Passive state - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

/// trait for durable storage of the term and vote
///
/// this abstraction allows the same state to be kept on:
/// - real filesystem (raft-segments' FileStateStore)
/// - in-memory (testing)
pub trait StateStore: Send {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()>;

    /// load the persisted term and voted_for
    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)>;
}

/// in-memory store for testing
///
/// keeps the term and vote in memory, no persistence across restarts
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    term: Term,
    voted_for: Option<MemberId>,
    saves: usize,
}

impl InMemoryStateStore {
    /// create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// number of times state was written
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl StateStore for InMemoryStateStore {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        self.saves += 1;
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)> {
        Ok((self.term, self.voted_for))
    }
}

/// Reject outcomes that would move the term back or vote twice in one term.
pub(crate) fn check_term_and_vote(
    current_term: Term,
    current_vote: Option<MemberId>,
    outcome: &Outcome,
) -> Result<()> {
    if outcome.term < current_term {
        return Err(RaftLogError::TermRegression {
            current: current_term,
            requested: outcome.term,
        });
    }
    if outcome.term == current_term && current_vote.is_some() && current_vote != outcome.voted_for {
        return Err(RaftLogError::VoteConflict {
            term: current_term,
            existing: current_vote,
            requested: outcome.voted_for,
        });
    }
    Ok(())
}

/// One member's raft state: role, term, vote, commit progress and its log
pub struct RaftState<L, S> {
    member: MemberId,
    role: Role,
    term: Term,
    voted_for: Option<MemberId>,
    leader: Option<MemberId>,
    leader_commit: LogIndex,
    commit_index: LogIndex,
    votes_for_me: BTreeSet<MemberId>,
    last_log_index_before_we_became_follower: LogIndex,
    follower_states: FollowerStates,
    log: L,
    in_flight: Arc<InFlightCache>,
    store: S,
}

impl<L: RaftLog, S: StateStore> RaftState<L, S> {
    /// Restore a member from its log and persisted term/vote
    pub fn new(member: MemberId, log: L, store: S) -> Result<Self> {
        let (term, voted_for) = store.load_term_and_vote()?;
        let commit_index = log.commit_index();
        Ok(Self {
            member,
            role: Role::Follower,
            term,
            voted_for,
            leader: None,
            leader_commit: -1,
            commit_index,
            votes_for_me: BTreeSet::new(),
            last_log_index_before_we_became_follower: -1,
            follower_states: FollowerStates::new(),
            log,
            in_flight: Arc::new(InFlightCache::new()),
            store,
        })
    }

    /// Fold one outcome into the state.
    ///
    /// Term, vote and commit monotonicity are checked before anything changes.
    /// The term and vote are persisted first and always mirror the store; role,
    /// leader, follower progress and commit index move only once every log
    /// command has succeeded. A fatal log error still leaves the log itself
    /// part way through the outcome, and the member must be stopped.
    pub fn update(&mut self, outcome: Outcome) -> Result<()> {
        check_term_and_vote(self.term, self.voted_for, &outcome)?;
        if outcome.commit_index < self.commit_index {
            return Err(RaftLogError::CommitRegression {
                current: self.commit_index,
                requested: outcome.commit_index,
            });
        }

        if outcome.term != self.term || outcome.voted_for != self.voted_for {
            self.store.save_term_and_vote(outcome.term, outcome.voted_for)?;
            self.term = outcome.term;
            self.voted_for = outcome.voted_for;
        }

        outcome.apply_log_commands(&mut self.log, &self.in_flight)?;

        if outcome.leader != self.leader {
            info!(
                member = self.member,
                term = outcome.term,
                leader = ?outcome.leader,
                "leader changed"
            );
        }
        self.role = outcome.role;
        self.leader = outcome.leader;
        self.leader_commit = outcome.leader_commit;
        self.votes_for_me = outcome.votes_for_me;
        self.last_log_index_before_we_became_follower = outcome.last_log_index_before_we_became_follower;
        self.follower_states = outcome.follower_states;
        self.commit_index = outcome.commit_index;
        Ok(())
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn voted_for(&self) -> Option<MemberId> {
        self.voted_for
    }

    pub fn leader(&self) -> Option<MemberId> {
        self.leader
    }

    pub fn leader_commit(&self) -> LogIndex {
        self.leader_commit
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn votes_for_me(&self) -> &BTreeSet<MemberId> {
        &self.votes_for_me
    }

    pub fn last_log_index_before_we_became_follower(&self) -> LogIndex {
        self.last_log_index_before_we_became_follower
    }

    pub fn follower_states(&self) -> &FollowerStates {
        &self.follower_states
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Shared handle for log-shipping readers
    pub fn in_flight(&self) -> Arc<InFlightCache> {
        Arc::clone(&self.in_flight)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LogCommand;
    use crate::in_memory::InMemoryRaftLog;
    use crate::log::LogEntry;

    fn state() -> RaftState<InMemoryRaftLog, InMemoryStateStore> {
        RaftState::new(1, InMemoryRaftLog::new(), InMemoryStateStore::new()).unwrap()
    }

    #[test]
    fn new_state_starts_as_follower() {
        let state = state();
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.term(), 0);
        assert_eq!(state.voted_for(), None);
        assert_eq!(state.commit_index(), -1);
    }

    #[test]
    fn unchanged_outcome_does_not_persist() {
        let mut state = state();
        let outcome = Outcome::carrying(&state);
        state.update(outcome).unwrap();
        assert_eq!(state.store().saves(), 0);
    }

    #[test]
    fn term_and_vote_are_persisted() {
        let mut state = state();
        let outcome = Outcome {
            term: 3,
            voted_for: Some(2),
            ..Outcome::carrying(&state)
        };
        state.update(outcome).unwrap();

        assert_eq!(state.store().load_term_and_vote().unwrap(), (3, Some(2)));
        assert_eq!(state.store().saves(), 1);
    }

    #[test]
    fn lower_term_is_rejected() {
        let mut state = state();
        state
            .update(Outcome {
                term: 5,
                ..Outcome::carrying(&state)
            })
            .unwrap();

        let err = state
            .update(Outcome {
                term: 4,
                ..Outcome::carrying(&state)
            })
            .unwrap_err();
        assert!(matches!(err, RaftLogError::TermRegression { current: 5, requested: 4 }));
    }

    #[test]
    fn second_vote_in_same_term_is_rejected() {
        let mut state = state();
        state
            .update(Outcome {
                term: 1,
                voted_for: Some(2),
                ..Outcome::carrying(&state)
            })
            .unwrap();

        let err = state
            .update(Outcome {
                voted_for: Some(3),
                ..Outcome::carrying(&state)
            })
            .unwrap_err();
        assert!(matches!(err, RaftLogError::VoteConflict { term: 1, .. }));
        assert_eq!(state.voted_for(), Some(2));
    }

    #[test]
    fn log_commands_reach_log_and_cache() {
        let mut state = state();
        let entries = vec![LogEntry::new(1, b"a".to_vec()), LogEntry::new(1, b"b".to_vec())];
        let outcome = Outcome {
            term: 1,
            commit_index: 0,
            ..Outcome::carrying(&state)
        }
        .with_log_command(LogCommand::BatchAppend {
            base_index: 0,
            offset: 0,
            entries: entries.clone(),
        })
        .with_log_command(LogCommand::Commit { commit_index: 0 });

        state.update(outcome).unwrap();

        assert_eq!(state.log().append_index(), 1);
        assert_eq!(state.log().commit_index(), 0);
        assert_eq!(state.commit_index(), 0);
        assert_eq!(state.in_flight().retrieve(&1), Some(entries[1].clone()));
    }

    #[test]
    fn failed_log_command_leaves_role_and_commit_untouched() {
        let mut state = state();
        state
            .update(Outcome::carrying(&state).with_log_command(LogCommand::Append {
                index: 0,
                entry: LogEntry::new(0, b"a".to_vec()),
            }))
            .unwrap();

        let outcome = Outcome {
            role: Role::Leader,
            term: 2,
            voted_for: Some(1),
            leader: Some(1),
            commit_index: 0,
            ..Outcome::carrying(&state)
        }
        .with_log_command(LogCommand::Append {
            index: 0,
            entry: LogEntry::new(2, b"b".to_vec()),
        });
        let err = state.update(outcome).unwrap_err();
        assert!(matches!(err, RaftLogError::EntryAlreadyExists { index: 0, .. }));

        // term and vote match what reached the store
        assert_eq!(state.term(), 2);
        assert_eq!(state.voted_for(), Some(1));
        assert_eq!(state.store().load_term_and_vote().unwrap(), (2, Some(1)));

        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.leader(), None);
        assert_eq!(state.commit_index(), -1);
        assert_eq!(state.log().append_index(), 0);
    }
}
