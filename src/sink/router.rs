//! Consistent-hash routing of metric names across multiple sinks.
//!
//! FNV-1a is the fixed, documented hash (a name must always land on the
//! same sink across process restarts and across machines running this same
//! code, which rules out `std`'s randomized `SipHash`). `V` virtual nodes
//! per sink smooth the distribution; a `BTreeMap<u32, SinkId>` ring makes
//! the "first node at or after this hash" lookup a single `range` query.

use std::collections::BTreeMap;

/// Number of virtual nodes placed per sink on the ring.
const VIRTUAL_NODES_PER_SINK: u32 = 100;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over arbitrary bytes.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Identifies one configured sink. Opaque beyond equality/ordering; the
/// caller maps a `SinkId` back to an actual connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(pub u32);

/// A consistent-hash ring over a fixed set of sinks.
pub struct Router {
    ring: BTreeMap<u32, SinkId>,
}

impl Router {
    /// Builds a ring with `VIRTUAL_NODES_PER_SINK` virtual nodes per id in
    /// `sink_ids`. Virtual node `i` of sink `id` hashes `"<id>#<i>"`
    /// (spec.md §4.7's `H(sink_id + "#" + i)`).
    #[must_use]
    pub fn new(sink_ids: &[SinkId]) -> Self {
        let mut ring = BTreeMap::new();
        for &id in sink_ids {
            for vnode in 0..VIRTUAL_NODES_PER_SINK {
                let key = fnv1a(format!("{}#{vnode}", id.0).as_bytes());
                ring.insert(key, id);
            }
        }
        Self { ring }
    }

    /// Whether the ring has no sinks configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Routes `name` to the sink owning the first ring position at or after
    /// `hash(name)`, wrapping to the lowest position if `name` hashes past
    /// the last one.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<SinkId> {
        if self.ring.is_empty() {
            return None;
        }
        let h = fnv1a(name.as_bytes());
        self.ring
            .range(h..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, &id)| id)
    }
}
