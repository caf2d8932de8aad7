//! Peer discovery (C8): a static bootstrap list plus local-network mDNS
//! announce/listen on UDP multicast, grounded on
//! `original_source/src/p2p/discovery.py`'s `PeerDiscovery` (bootstrap list
//! + LAN multicast beacon + peer-exchange gossip), reimplemented as an
//! async loop over `tokio::net::UdpSocket` instead of that reference's
//! raw-socket `select` loop.

use crate::message::PeerDiscoveryPayload;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Multicast group and port the teacher's mDNS-flavored announce idiom
/// targets (§4.7): not true mDNS/DNS-SD, a plain UDP multicast beacon.
const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MULTICAST_PORT: u16 = 5353;
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
const LISTEN_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub node_id: String,
    pub address: String,
    pub port: u16,
    pub network_id: String,
    pub is_ai_node: bool,
}

/// Accumulates peers learned from the bootstrap list, multicast beacons,
/// and peer-exchange gossip relayed through already-connected peers.
pub struct PeerDiscovery {
    node_id: String,
    network_id: String,
    listen_port: u16,
    is_ai_node: bool,
    known: RwLock<HashMap<String, DiscoveredPeer>>,
}

impl PeerDiscovery {
    pub fn new(node_id: impl Into<String>, network_id: impl Into<String>, listen_port: u16, is_ai_node: bool) -> Arc<Self> {
        Arc::new(PeerDiscovery {
            node_id: node_id.into(),
            network_id: network_id.into(),
            listen_port,
            is_ai_node,
            known: RwLock::new(HashMap::new()),
        })
    }

    pub fn seed_bootstrap(&self, addresses: &[String]) {
        let mut known = self.known.write();
        for addr in addresses {
            if let Some((host, port)) = addr.rsplit_once(':') {
                if let Ok(port) = port.parse::<u16>() {
                    let id = format!("bootstrap:{addr}");
                    known.entry(id.clone()).or_insert(DiscoveredPeer {
                        node_id: id,
                        address: host.to_string(),
                        port,
                        network_id: self.network_id.clone(),
                        is_ai_node: false,
                    });
                }
            }
        }
    }

    /// Spawns the announce and listen loops. Discovered peers merge into
    /// the shared table; the caller (the node container) pulls from
    /// `snapshot()` to decide who to dial via the transport.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let announce_self = self.clone();
        tokio::spawn(async move {
            if let Err(err) = announce_self.announce_loop().await {
                tracing::debug!(%err, "discovery announce loop exited");
            }
        });

        let listen_self = self.clone();
        tokio::spawn(async move {
            if let Err(err) = listen_self.listen_loop().await {
                tracing::debug!(%err, "discovery listen loop exited");
            }
        });

        Ok(())
    }

    async fn announce_loop(self: Arc<Self>) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let beacon = PeerDiscoveryPayload {
            node_id: self.node_id.clone(),
            address: "0.0.0.0".to_string(),
            port: self.listen_port,
            network_id: self.network_id.clone(),
            is_ai_node: self.is_ai_node,
            model_hash: None,
        };
        let body = serde_json::to_vec(&beacon)?;
        let target = (MULTICAST_ADDR, MULTICAST_PORT);
        loop {
            let _ = socket.send_to(&body, target).await;
            tokio::time::sleep(ANNOUNCE_INTERVAL).await;
        }
    }

    async fn listen_loop(self: Arc<Self>) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", MULTICAST_PORT)).await?;
        socket.join_multicast_v4(MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED)?;
        let mut buf = vec![0u8; 4096];
        loop {
            let recv = tokio::time::timeout(LISTEN_POLL_INTERVAL, socket.recv_from(&mut buf)).await;
            let Ok(Ok((len, _from))) = recv else { continue };
            if let Ok(payload) = serde_json::from_slice::<PeerDiscoveryPayload>(&buf[..len]) {
                self.observe(payload);
            }
        }
    }

    /// Merges a peer learned from a beacon, handshake, or peer-exchange
    /// gossip reply into the known-peer table. Ignores self and foreign
    /// network ids.
    pub fn observe(&self, payload: PeerDiscoveryPayload) {
        if payload.node_id == self.node_id || payload.network_id != self.network_id {
            return;
        }
        self.known.write().insert(
            payload.node_id.clone(),
            DiscoveredPeer {
                node_id: payload.node_id,
                address: payload.address,
                port: payload.port,
                network_id: payload.network_id,
                is_ai_node: payload.is_ai_node,
            },
        );
    }

    pub fn snapshot(&self) -> Vec<DiscoveredPeer> {
        self.known.read().values().cloned().collect()
    }

    pub fn remove(&self, node_id: &str) {
        self.known.write().remove(node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_bootstrap_addresses_populates_known_peers() {
        let discovery = PeerDiscovery::new("node-a", "playergold-testnet", 18333, false);
        discovery.seed_bootstrap(&["10.0.0.5:18333".to_string()]);
        assert_eq!(discovery.snapshot().len(), 1);
    }

    #[test]
    fn observe_ignores_self_and_foreign_networks() {
        let discovery = PeerDiscovery::new("node-a", "playergold-testnet", 18333, false);
        discovery.observe(PeerDiscoveryPayload {
            node_id: "node-a".to_string(),
            address: "1.2.3.4".to_string(),
            port: 1,
            network_id: "playergold-testnet".to_string(),
            is_ai_node: false,
            model_hash: None,
        });
        discovery.observe(PeerDiscoveryPayload {
            node_id: "node-b".to_string(),
            address: "1.2.3.4".to_string(),
            port: 1,
            network_id: "playergold-mainnet".to_string(),
            is_ai_node: false,
            model_hash: None,
        });
        assert!(discovery.snapshot().is_empty());

        discovery.observe(PeerDiscoveryPayload {
            node_id: "node-c".to_string(),
            address: "1.2.3.4".to_string(),
            port: 1,
            network_id: "playergold-testnet".to_string(),
            is_ai_node: true,
            model_hash: None,
        });
        assert_eq!(discovery.snapshot().len(), 1);
    }
}
