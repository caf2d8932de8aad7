pub mod attack;
pub mod health;
pub mod load_balancer;
pub mod partition;
pub mod recovery;

pub use attack::{
    anomaly_score, detect_consensus_manipulation, detect_flooding, detect_sybil, AttackDefense,
    AttackKind, AttackSuspicion, MitigationCallbacks, VoteRecord,
};
pub use health::{HealthMonitor, NodeStatus};
pub use load_balancer::LoadBalancer;
pub use partition::{detect_partition, merge_and_select_reference, merged_node_set, sync_progress, NetworkPartition, NetworkState};
pub use recovery::{run_recovery_cycle, status_after_cycle, RecoveryCallbacks};
