//! Property-based tests for segmented log recovery and pruning
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use std::path::Path;
use std::sync::Arc;

use raft_log::{InMemoryRaftLog, LogEntry, LogIndex, RaftLog, Term};
use raft_segments::{EphemeralFileSystem, SegmentInfo, SegmentedLogConfig, SegmentedRaftLog, SegmentedRaftLogPruner};

// ============================================================================
// Test Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Append { count: u8, bump_term: bool },
    Truncate(u8),
    Prune(u8),
    Skip(u8),
    Reopen,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (1u8..4, any::<bool>()).prop_map(|(count, bump_term)| Op::Append { count, bump_term }),
        2 => any::<u8>().prop_map(Op::Truncate),
        1 => any::<u8>().prop_map(Op::Prune),
        1 => (0u8..4).prop_map(Op::Skip),
        1 => Just(Op::Reopen),
    ]
}

fn segments_strategy() -> impl Strategy<Value = Vec<SegmentInfo>> {
    prop::collection::vec((1u64..20, 1u64..500), 1..12).prop_map(|shape| {
        let mut prev_index = -1;
        shape
            .into_iter()
            .enumerate()
            .map(|(version, (entry_count, size))| {
                let info = SegmentInfo {
                    version: version as u64,
                    prev_index,
                    prev_term: 1,
                    entry_count,
                    size,
                };
                prev_index += entry_count as LogIndex;
                info
            })
            .collect()
    })
}

fn open(fs: &EphemeralFileSystem, rotate_at_size: u64) -> SegmentedRaftLog {
    let config = SegmentedLogConfig {
        rotate_at_size,
        ..SegmentedLogConfig::with_directory(Path::new("/raft"))
    };
    SegmentedRaftLog::open(Arc::new(fs.clone()), &config).unwrap()
}

// ============================================================================
// Recovery Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The segmented log answers like an in-memory log, before and after every restart
    #[test]
    fn prop_segmented_log_matches_model(
        ops in prop::collection::vec(op_strategy(), 1..40),
        rotate_at_size in 64u64..400
    ) {
        let fs = EphemeralFileSystem::new();
        let mut log = open(&fs, rotate_at_size);
        let mut model = InMemoryRaftLog::new();
        let mut term: Term = 1;

        for op in &ops {
            match *op {
                Op::Append { count, bump_term } => {
                    if bump_term {
                        term += 1;
                    }
                    let entries: Vec<_> = (0..count).map(|n| LogEntry::new(term, vec![n])).collect();
                    prop_assert_eq!(log.append(&entries).unwrap(), model.append(&entries).unwrap());
                }
                Op::Truncate(pick) => {
                    let low = log.prev_index().max(log.commit_index()) + 1;
                    let high = log.append_index();
                    if low <= high {
                        let from = low + pick as LogIndex % (high - low + 1);
                        log.truncate(from).unwrap();
                        model.truncate(from).unwrap();
                    }
                }
                Op::Prune(pick) => {
                    let before = log.prev_index();
                    let safe = pick as LogIndex % 64 - 1;
                    let after = log.prune(safe).unwrap();
                    prop_assert!(after <= before.max(safe), "pruned to {} past {}", after, safe);
                }
                Op::Skip(step) => {
                    let index = log.append_index() + 1 + step as LogIndex;
                    log.skip(index, term).unwrap();
                    model.skip(index, term).unwrap();
                }
                Op::Reopen => {
                    drop(log);
                    log = open(&fs, rotate_at_size);
                }
            }

            prop_assert_eq!(log.append_index(), model.append_index());
            prop_assert!(log.prev_index() >= model.prev_index());
            for index in log.prev_index()..=log.append_index() {
                prop_assert_eq!(
                    log.read_entry_term(index).unwrap(),
                    model.read_entry_term(index).unwrap(),
                    "term at {} after {:?}", index, op
                );
            }
            let from = log.prev_index() + 1;
            let stored: Vec<_> = log.get_entry_cursor(from).unwrap().collect();
            let expected: Vec<_> = model.get_entry_cursor(from).unwrap().collect();
            prop_assert_eq!(stored, expected);
        }
    }
}

// ============================================================================
// Pruning Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// No strategy ever reaches past the safe index
    #[test]
    fn prop_pruner_respects_safe_index(
        segments in segments_strategy(),
        safe_index in -1i64..300,
        threshold in 1u64..2000,
        unit in prop::sample::select(vec!["size", "entries", "txs", "days"])
    ) {
        let pruner = SegmentedRaftLogPruner::from_config(&format!("{threshold} {unit}")).unwrap();
        let index = pruner.index_to_prune_from(safe_index, &segments);
        prop_assert!(index <= safe_index);

        // whatever is pruned ends on a segment boundary
        prop_assert!(index == safe_index || segments.iter().any(|s| s.prev_index == index));
    }
}
