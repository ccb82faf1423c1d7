//! # in_flight
//!
//! why: let log shipping read freshly appended entries without touching disk
//! relations: filled and drained by command.rs, shared with readers through an Arc
//! what: InFlightMap over a DashMap, InFlightCache alias

use std::fmt::Debug;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{RaftLogError, Result};
use crate::log::{LogEntry, LogIndex};

/// In-flight log entries keyed by index
pub type InFlightCache = InFlightMap<LogIndex, LogEntry>;

/// Concurrent registry of entries that are appended but not yet superseded.
///
/// Each key is registered at most once; a second registration is rejected and
/// leaves the first value in place.
#[derive(Debug)]
pub struct InFlightMap<K: Eq + Hash, V> {
    map: DashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for InFlightMap<K, V> {
    fn default() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<K, V> InFlightMap<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: K, value: V) -> Result<()> {
        match self.map.entry(key) {
            Entry::Occupied(occupied) => Err(RaftLogError::AlreadyRegistered {
                key: format!("{:?}", occupied.key()),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                Ok(())
            }
        }
    }

    pub fn retrieve(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|v| v.value().clone())
    }

    /// Returns whether the key was present
    pub fn unregister(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    /// Keep only the entries matching `keep`
    pub fn retain(&self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.map.retain(keep);
    }

    pub fn clear(&self) {
        debug!(entries = self.map.len(), "clearing in-flight map");
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
