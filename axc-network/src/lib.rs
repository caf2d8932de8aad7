//! P2P transport, discovery and propagation (C7/C8/C9): TLS-framed JSON
//! messaging between validator nodes, replacing the libp2p/gossipsub stack
//! this crate started from with the custom wire format §4.6 specifies.

pub mod discovery;
pub mod frame;
pub mod message;
pub mod propagation;
pub mod tls;
pub mod transport;

pub use discovery::{DiscoveredPeer, PeerDiscovery};
pub use message::{Envelope, Handshake, HeartbeatPayload, MessageType, PeerDiscoveryPayload};
pub use propagation::{PropagationStrategy, Propagator};
pub use transport::{NetworkConfig, PeerInfo, Transport, TransportStats};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("tls error: {0}")]
    Tls(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("peer disconnected")]
    Disconnected,
    #[error("message serialization failed")]
    Serialization,
}
