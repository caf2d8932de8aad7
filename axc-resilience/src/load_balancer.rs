//! Load balancer (C14): assigns work to the least-loaded active node,
//! queuing when none is available, grounded on
//! `original_source/src/consensus/fault_tolerance.py`'s `LoadBalancer`
//! (min-load assignment + round-robin redistribution on failure).

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

pub struct LoadBalancer {
    loads: RwLock<HashMap<String, u64>>,
    queue: RwLock<VecDeque<String>>,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer {
    pub fn new() -> Self {
        LoadBalancer { loads: RwLock::new(HashMap::new()), queue: RwLock::new(VecDeque::new()) }
    }

    pub fn register(&self, node_id: &str) {
        self.loads.write().entry(node_id.to_string()).or_insert(0);
    }

    /// Assigns one unit of work to the lowest-loaded node among
    /// `active_nodes`. Enqueues `task_id` instead if none are active.
    pub fn assign(&self, active_nodes: &[String], task_id: impl Into<String>) -> Option<String> {
        let mut loads = self.loads.write();
        let target = active_nodes
            .iter()
            .min_by_key(|id| *loads.get(*id).unwrap_or(&0))
            .cloned();
        match target {
            Some(node_id) => {
                *loads.entry(node_id.clone()).or_insert(0) += 1;
                Some(node_id)
            }
            None => {
                self.queue.write().push_back(task_id.into());
                None
            }
        }
    }

    pub fn load_of(&self, node_id: &str) -> u64 {
        *self.loads.read().get(node_id).unwrap_or(&0)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.read().len()
    }

    pub fn drain_queue(&self) -> Vec<String> {
        self.queue.write().drain(..).collect()
    }

    /// Takes `failed_id`'s counted load and hands it to the remaining
    /// active nodes round-robin, one unit at a time.
    pub fn redistribute_load(&self, failed_id: &str, remaining_active: &[String]) {
        if remaining_active.is_empty() {
            return;
        }
        let failed_load = {
            let mut loads = self.loads.write();
            loads.insert(failed_id.to_string(), 0).unwrap_or(0)
        };
        let mut loads = self.loads.write();
        for i in 0..failed_load {
            let target = &remaining_active[(i as usize) % remaining_active.len()];
            *loads.entry(target.clone()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_to_the_least_loaded_active_node() {
        let balancer = LoadBalancer::new();
        balancer.register("a");
        balancer.register("b");
        let nodes = vec!["a".to_string(), "b".to_string()];
        balancer.assign(&nodes, "task-1");
        let assigned = balancer.assign(&nodes, "task-2").unwrap();
        assert_eq!(assigned, "b");
    }

    #[test]
    fn queues_work_with_no_active_nodes() {
        let balancer = LoadBalancer::new();
        assert!(balancer.assign(&[], "task-1").is_none());
        assert_eq!(balancer.queue_len(), 1);
    }

    #[test]
    fn redistribute_spreads_failed_load_round_robin() {
        let balancer = LoadBalancer::new();
        let nodes = vec!["a".to_string()];
        for i in 0..3 {
            balancer.assign(&nodes, format!("t{i}"));
        }
        assert_eq!(balancer.load_of("a"), 3);
        balancer.redistribute_load("a", &["b".to_string(), "c".to_string()]);
        assert_eq!(balancer.load_of("a"), 0);
        assert_eq!(balancer.load_of("b") + balancer.load_of("c"), 3);
    }
}
