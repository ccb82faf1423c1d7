//! # safety
//!
//! why: replay outcomes across a simulated cluster and detect raft safety violations
//! relations: mirrors state.rs without storage; applies command.rs to in_memory.rs logs
//! what: ComparableRaftState, ClusterState, Violation, violation detectors

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{RaftLogError, Result};
use crate::in_memory::InMemoryRaftLog;
use crate::log::{read_log_entry, LogIndex, RaftLog, Term};
use crate::message::MemberId;
use crate::outcome::{FollowerStates, Outcome};
use crate::state::{check_term_and_vote, Role};

/// Pure in-memory member state, comparable field by field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparableRaftState {
    pub member: MemberId,
    pub role: Role,
    pub term: Term,
    pub voted_for: Option<MemberId>,
    pub leader: Option<MemberId>,
    pub leader_commit: LogIndex,
    pub commit_index: LogIndex,
    pub votes_for_me: BTreeSet<MemberId>,
    pub last_log_index_before_we_became_follower: LogIndex,
    pub follower_states: FollowerStates,
    pub entry_log: InMemoryRaftLog,
}

impl ComparableRaftState {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            role: Role::Follower,
            term: 0,
            voted_for: None,
            leader: None,
            leader_commit: -1,
            commit_index: -1,
            votes_for_me: BTreeSet::new(),
            last_log_index_before_we_became_follower: -1,
            follower_states: FollowerStates::new(),
            entry_log: InMemoryRaftLog::new(),
        }
    }

    /// Same folding rules as the durable state, minus persistence and cache
    pub fn update(&mut self, outcome: &Outcome) -> Result<()> {
        check_term_and_vote(self.term, self.voted_for, outcome)?;
        if outcome.commit_index < self.commit_index {
            return Err(RaftLogError::CommitRegression {
                current: self.commit_index,
                requested: outcome.commit_index,
            });
        }

        self.role = outcome.role;
        self.term = outcome.term;
        self.voted_for = outcome.voted_for;
        self.leader = outcome.leader;
        self.leader_commit = outcome.leader_commit;
        self.votes_for_me = outcome.votes_for_me.clone();
        self.last_log_index_before_we_became_follower = outcome.last_log_index_before_we_became_follower;
        self.follower_states = outcome.follower_states.clone();

        for command in &outcome.log_commands {
            command.apply_to_log(&mut self.entry_log)?;
        }
        self.commit_index = outcome.commit_index;
        Ok(())
    }
}

/// Every member of a simulated cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterState {
    states: BTreeMap<MemberId, ComparableRaftState>,
}

impl ClusterState {
    pub fn new(members: impl IntoIterator<Item = MemberId>) -> Self {
        Self {
            states: members
                .into_iter()
                .map(|m| (m, ComparableRaftState::new(m)))
                .collect(),
        }
    }

    /// Fold an outcome into one member, adding the member if it is new
    pub fn apply(&mut self, member: MemberId, outcome: &Outcome) -> Result<()> {
        self.states
            .entry(member)
            .or_insert_with(|| ComparableRaftState::new(member))
            .update(outcome)
    }

    pub fn get(&self, member: MemberId) -> Option<&ComparableRaftState> {
        self.states.get(&member)
    }

    pub fn states(&self) -> impl Iterator<Item = &ComparableRaftState> {
        self.states.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    MultipleLeaders,
    DivergedLog,
}

pub fn violations(cluster: &ClusterState) -> Result<Vec<Violation>> {
    let mut found = Vec::new();
    if multiple_leaders_in_same_term(cluster) {
        found.push(Violation::MultipleLeaders);
    }
    if inconsistent_committed_log_entries(cluster)? {
        found.push(Violation::DivergedLog);
    }
    Ok(found)
}

/// Two members disagree on an entry both consider committed.
///
/// Members that no longer hold an index (pruned or skipped) are left out of the
/// comparison at that index.
pub fn inconsistent_committed_log_entries(cluster: &ClusterState) -> Result<bool> {
    let highest_commit = cluster.states().map(|s| s.commit_index).max().unwrap_or(-1);

    for index in 0..=highest_commit {
        let mut agreed = None;
        for state in cluster.states().filter(|s| index <= s.commit_index) {
            let Some(entry) = read_log_entry(&state.entry_log, index)? else {
                continue;
            };
            match &agreed {
                None => agreed = Some(entry),
                Some(existing) if *existing != entry => return Ok(true),
                Some(_) => {}
            }
        }
    }
    Ok(false)
}

pub fn multiple_leaders_in_same_term(cluster: &ClusterState) -> bool {
    let mut terms_with_leader = HashSet::new();
    cluster
        .states()
        .filter(|s| s.role == Role::Leader)
        .any(|s| !terms_with_leader.insert(s.term))
}
