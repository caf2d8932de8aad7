//! Message propagation (C9): flood, gossip-fanout and directed-send
//! strategies over a hop-limited, deduplicated relay, grounded on
//! `original_source/src/p2p/propagation.py`'s `MessagePropagator` (seen-set
//! + fanout sampling + hop-count ceiling).

use crate::message::Envelope;
use crate::transport::Transport;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEDUP_CAPACITY: usize = 10_000;
const DEDUP_TTL: Duration = Duration::from_secs(300);
const MAX_HOPS: u8 = 7;
/// Fraction of peers a gossip round relays to, mirroring the reference's
/// sqrt-ish fanout without pulling in an extra dependency for it.
const GOSSIP_FANOUT_FRACTION: f64 = 0.5;
const GOSSIP_FANOUT_MIN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStrategy {
    Flood,
    Gossip,
    Directed,
}

struct SeenEntry {
    id: String,
    seen_at: Instant,
}

/// Bounded FIFO of recently seen `message_id`s with a TTL eviction pass
/// (§4.8): prevents the same envelope from being relayed twice, and caps
/// memory even under sustained traffic.
struct DedupCache {
    order: VecDeque<SeenEntry>,
    capacity: usize,
}

impl DedupCache {
    fn new(capacity: usize) -> Self {
        DedupCache { order: VecDeque::with_capacity(capacity), capacity }
    }

    /// Returns true if this is the first time `id` has been seen within
    /// the TTL window; records it either way.
    fn insert_if_new(&mut self, id: &str) -> bool {
        let now = Instant::now();
        while let Some(front) = self.order.front() {
            if now.duration_since(front.seen_at) > DEDUP_TTL {
                self.order.pop_front();
            } else {
                break;
            }
        }
        if self.order.iter().any(|e| e.id == id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            self.order.pop_front();
        }
        self.order.push_back(SeenEntry { id: id.to_string(), seen_at: now });
        true
    }
}

/// Hop count is carried as a private field here rather than on the wire
/// envelope, since the envelope shape is shared across all message types
/// (§4.6) and most never need hop tracking.
pub struct Propagator {
    transport: Arc<Transport>,
    dedup: Mutex<DedupCache>,
}

impl Propagator {
    pub fn new(transport: Arc<Transport>) -> Arc<Self> {
        Arc::new(Propagator { transport, dedup: Mutex::new(DedupCache::new(DEDUP_CAPACITY)) })
    }

    /// Relays `envelope` according to `strategy`, starting at hop 0.
    /// Returns `false` without sending if the message was already relayed.
    pub fn propagate(&self, envelope: Envelope, strategy: PropagationStrategy) -> bool {
        self.propagate_at_hop(envelope, strategy, 0)
    }

    /// Called for a freshly received message that may need relaying
    /// further. `hop` is incremented from the sender's hop count.
    pub fn relay(&self, envelope: Envelope, strategy: PropagationStrategy, incoming_hop: u8) -> bool {
        if incoming_hop >= MAX_HOPS {
            return false;
        }
        self.propagate_at_hop(envelope, strategy, incoming_hop + 1)
    }

    fn propagate_at_hop(&self, envelope: Envelope, strategy: PropagationStrategy, hop: u8) -> bool {
        if hop >= MAX_HOPS {
            return false;
        }
        let id = envelope.message_id();
        if !self.dedup.lock().insert_if_new(&id) {
            return false;
        }
        match strategy {
            PropagationStrategy::Flood => {
                self.transport.broadcast(envelope);
            }
            PropagationStrategy::Gossip => {
                let mut peers = self.transport.peer_ids();
                let mut rng = rand::thread_rng();
                peers.shuffle(&mut rng);
                let fanout = ((peers.len() as f64 * GOSSIP_FANOUT_FRACTION).ceil() as usize)
                    .max(GOSSIP_FANOUT_MIN)
                    .min(peers.len());
                peers.truncate(fanout);
                self.transport.broadcast_to(peers.iter().map(String::as_str), envelope);
            }
            PropagationStrategy::Directed => {
                if let Some(recipient) = envelope.recipient_id.clone() {
                    self.transport.send_to(&recipient, envelope);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_cache_rejects_repeat_ids_within_ttl() {
        let mut cache = DedupCache::new(10);
        assert!(cache.insert_if_new("a"));
        assert!(!cache.insert_if_new("a"));
        assert!(cache.insert_if_new("b"));
    }

    #[test]
    fn dedup_cache_evicts_oldest_beyond_capacity() {
        let mut cache = DedupCache::new(2);
        assert!(cache.insert_if_new("a"));
        assert!(cache.insert_if_new("b"));
        assert!(cache.insert_if_new("c"));
        assert!(cache.insert_if_new("a"));
    }
}
