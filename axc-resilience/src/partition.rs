//! Partition detection and auto-synchronization (C15), grounded on
//! `original_source/src/consensus/resilient_consensus.py`'s partition
//! detector and recovery merge (10% unreachable-ratio threshold,
//! majority-or-tallest-chain reference selection).

use std::collections::HashSet;

pub const UNREACHABLE_RATIO_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Normal,
    Partitioned,
    Recovering,
    UnderAttack,
}

#[derive(Debug, Clone)]
pub struct NetworkPartition {
    pub nodes: HashSet<String>,
    pub is_majority: bool,
    pub block_height: u64,
}

/// Declares a partition when the unreachable fraction of the known node
/// set exceeds 10%. `is_majority` reflects whether `reachable` nodes make
/// up more than half of `all`.
pub fn detect_partition(reachable: &HashSet<String>, all: &HashSet<String>, block_height: u64) -> Option<NetworkPartition> {
    if all.is_empty() {
        return None;
    }
    let unreachable_ratio = 1.0 - (reachable.len() as f64 / all.len() as f64);
    if unreachable_ratio < UNREACHABLE_RATIO_THRESHOLD {
        return None;
    }
    Some(NetworkPartition {
        nodes: reachable.clone(),
        is_majority: reachable.len() as f64 / all.len() as f64 > 0.5,
        block_height,
    })
}

/// Merges multiple observed partitions into one node set and selects a
/// reference partition to resynchronize against: the majority partition
/// if one exists, otherwise the partition with the tallest chain.
pub fn merge_and_select_reference(partitions: &[NetworkPartition]) -> Option<&NetworkPartition> {
    if partitions.is_empty() {
        return None;
    }
    partitions
        .iter()
        .find(|p| p.is_majority)
        .or_else(|| partitions.iter().max_by_key(|p| p.block_height))
}

pub fn merged_node_set(partitions: &[NetworkPartition]) -> HashSet<String> {
    partitions.iter().flat_map(|p| p.nodes.iter().cloned()).collect()
}

/// Per-node resync progress, reported as a fraction in `[0, 1]`.
pub fn sync_progress(synced_blocks: u64, target_height: u64) -> f64 {
    if target_height == 0 {
        return 1.0;
    }
    (synced_blocks as f64 / target_height as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn small_unreachable_fraction_is_not_a_partition() {
        let all = set(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
        let reachable = set(&["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
        assert!(detect_partition(&reachable, &all, 100).is_none());
    }

    #[test]
    fn large_unreachable_fraction_declares_a_minority_partition() {
        let all = set(&["a", "b", "c", "d"]);
        let reachable = set(&["a"]);
        let partition = detect_partition(&reachable, &all, 100).unwrap();
        assert!(!partition.is_majority);
    }

    #[test]
    fn merge_prefers_majority_partition_as_reference() {
        let minority = NetworkPartition { nodes: set(&["a"]), is_majority: false, block_height: 500 };
        let majority = NetworkPartition { nodes: set(&["b", "c", "d"]), is_majority: true, block_height: 100 };
        let reference = merge_and_select_reference(&[minority, majority.clone()]).unwrap();
        assert_eq!(reference.block_height, majority.block_height);
    }

    #[test]
    fn merge_falls_back_to_tallest_chain_without_a_majority() {
        let a = NetworkPartition { nodes: set(&["a"]), is_majority: false, block_height: 50 };
        let b = NetworkPartition { nodes: set(&["b"]), is_majority: false, block_height: 200 };
        let reference = merge_and_select_reference(&[a, b]).unwrap();
        assert_eq!(reference.block_height, 200);
    }
}
