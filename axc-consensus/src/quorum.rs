//! Quorum calculator (C6): `required(total) = min(total, max(2, ceil(total
//! * 0.66)))`, grounded on
//! `original_source/src/consensus/quorum_manager.py`'s `QuorumManager`
//! (fixed 66% threshold, 2-node floor, insufficient-nodes special case).

use thiserror::Error;

pub const MIN_NODES: usize = 2;
pub const QUORUM_FRACTION: f64 = 0.66;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuorumError {
    #[error("at least {MIN_NODES} nodes are required, have {total}")]
    InsufficientNodes { total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumStatus {
    Achieved,
    NotAchieved,
}

/// Number of active nodes required for quorum out of `total`, or
/// `InsufficientNodes` if the network is below the 2-node floor.
pub fn required(total: usize) -> Result<usize, QuorumError> {
    if total < MIN_NODES {
        return Err(QuorumError::InsufficientNodes { total });
    }
    let fraction = (total as f64 * QUORUM_FRACTION).ceil() as usize;
    Ok(total.min(fraction.max(MIN_NODES)))
}

pub fn evaluate(active: usize, total: usize) -> Result<QuorumStatus, QuorumError> {
    let needed = required(total)?;
    Ok(if active >= needed { QuorumStatus::Achieved } else { QuorumStatus::NotAchieved })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_follows_66_percent_with_a_floor_of_two() {
        assert_eq!(required(2).unwrap(), 2);
        assert_eq!(required(3).unwrap(), 2);
        assert_eq!(required(4).unwrap(), 3);
        assert_eq!(required(10).unwrap(), 7);
        assert_eq!(required(100).unwrap(), 66);
    }

    #[test]
    fn fewer_than_two_nodes_is_an_error() {
        assert_eq!(required(0), Err(QuorumError::InsufficientNodes { total: 0 }));
        assert_eq!(required(1), Err(QuorumError::InsufficientNodes { total: 1 }));
    }

    #[test]
    fn evaluate_reports_achieved_at_the_threshold() {
        assert_eq!(evaluate(7, 10).unwrap(), QuorumStatus::Achieved);
        assert_eq!(evaluate(6, 10).unwrap(), QuorumStatus::NotAchieved);
    }
}
