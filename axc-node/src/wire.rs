//! Node-owned payload shapes carried inside envelopes (§4.6/§4.11):
//! `axc-network`'s `Envelope.payload` is an opaque JSON value precisely so
//! a downstream crate can define its own wire shapes without this crate
//! depending back on `axc-network`'s message catalogue.
//!
//! The cadence loop proposes and finalizes a block under
//! `MessageType::Block`; peers echo back a signed approve/reject `Vote`
//! directed to the proposer under `MessageType::Challenge` instead, since
//! a vote is cross-validation traffic rather than block traffic.

use axc_core::Block;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockWireMessage {
    Propose { block: Block },
    Vote { block_hash: String, approve: bool },
    Finalize { block: Block },
}
