//! The consistent-hash ring backing a single service type (spec.md §4.2).
use murmur3::murmur3_x64_128;
use std::io::Cursor;

use endpoint::Endpoint;

/// Default virtual-node replication factor per endpoint (spec.md §6).
pub const DEFAULT_VNODES_PER_ENDPOINT: u16 = 128;

/// Fixed build-time seed for the ring's hash function. The spec mandates a
/// 64-bit hash stable across versions (MurmurHash3 x64, spec.md §6); the
/// seed is part of that stability contract and must never change between
/// releases, or every ring in a mixed-version cluster disagrees.
const HASH_SEED: u32 = 0xd157_a7c3;

fn hash64(bytes: &[u8]) -> u64 {
    let mut cursor = Cursor::new(bytes);
    let h = murmur3_x64_128(&mut cursor, HASH_SEED).expect("hashing an in-memory buffer never fails");
    (h & 0xffff_ffff_ffff_ffff) as u64
}

#[derive(Debug, Clone)]
struct VNode {
    hash: u64,
    endpoint: Endpoint,
}

/// A virtual-node-augmented consistent-hash ring over a set of endpoints.
///
/// `find_one` is a pure function of `(ring membership, key)`: it returns the
/// endpoint owning the first vnode at or after the key's hash position,
/// wrapping around the ring. Hash collisions between vnodes of different
/// endpoints are broken by lexicographic order of the endpoints' canonical
/// byte serialization, so lookups stay deterministic even under ties.
#[derive(Debug, Clone)]
pub struct HashRing {
    vnodes_per_endpoint: u16,
    vnodes: Vec<VNode>,
    members: Vec<Endpoint>,
}
impl HashRing {
    /// Makes a new, empty ring with the given virtual-node replication
    /// factor.
    pub fn new(vnodes_per_endpoint: u16) -> Self {
        HashRing {
            vnodes_per_endpoint,
            vnodes: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Returns the number of distinct endpoints on the ring.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the ring has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if `endpoint` is a member of this ring.
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.members.contains(endpoint)
    }

    /// Adds `endpoint` to the ring. Idempotent: adding an existing member is
    /// a no-op.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        if self.contains(&endpoint) {
            return;
        }
        let canonical = endpoint.to_canonical_bytes();
        for i in 0..self.vnodes_per_endpoint {
            let mut key = canonical.clone();
            key.extend_from_slice(&i.to_be_bytes());
            self.vnodes.push(VNode {
                hash: hash64(&key),
                endpoint: endpoint.clone(),
            });
        }
        self.members.push(endpoint);
        self.resort();
    }

    /// Removes `endpoint` from the ring. A no-op if it is not present.
    pub fn remove_endpoint(&mut self, endpoint: &Endpoint) {
        if !self.contains(endpoint) {
            return;
        }
        self.vnodes.retain(|v| &v.endpoint != endpoint);
        self.members.retain(|e| e != endpoint);
    }

    fn resort(&mut self) {
        self.vnodes.sort_by(|a, b| {
            a.hash
                .cmp(&b.hash)
                .then_with(|| a.endpoint.to_canonical_bytes().cmp(&b.endpoint.to_canonical_bytes()))
        });
    }

    /// Returns the index of the first vnode at or after `hash`, wrapping to
    /// `0` if `hash` is past every vnode.
    fn position_of(&self, hash: u64) -> usize {
        match self.vnodes.binary_search_by(|v| v.hash.cmp(&hash)) {
            Ok(idx) => idx,
            Err(idx) if idx == self.vnodes.len() => 0,
            Err(idx) => idx,
        }
    }

    /// Resolves `key` to a single endpoint, or `None` if the ring is empty.
    pub fn find_one(&self, key: &[u8]) -> Option<Endpoint> {
        if self.vnodes.is_empty() {
            return None;
        }
        let idx = self.position_of(hash64(key));
        Some(self.vnodes[idx].endpoint.clone())
    }

    /// Resolves `key` to up to `count` distinct endpoints, walking the ring
    /// clockwise from the key's hash position. Returns fewer than `count`
    /// entries iff the ring has fewer than `count` distinct endpoints.
    pub fn find_many(&self, key: &[u8], count: usize) -> Vec<Endpoint> {
        if self.vnodes.is_empty() || count == 0 {
            return Vec::new();
        }
        let start = self.position_of(hash64(key));
        let mut out: Vec<Endpoint> = Vec::with_capacity(count.min(self.members.len()));
        let n = self.vnodes.len();
        for step in 0..n {
            let vnode = &self.vnodes[(start + step) % n];
            if !out.contains(&vnode.endpoint) {
                out.push(vnode.endpoint.clone());
                if out.len() == count {
                    break;
                }
            }
        }
        out
    }

    /// Returns every endpoint currently on the ring, in no particular order.
    pub fn get_all(&self) -> Vec<Endpoint> {
        self.members.clone()
    }
}
impl Default for HashRing {
    fn default() -> Self {
        HashRing::new(DEFAULT_VNODES_PER_ENDPOINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::{LocalHandle, NodeId};

    fn ep(node: &str, handle: u64) -> Endpoint {
        Endpoint::new(NodeId::new(node), LocalHandle::from(handle))
    }

    #[test]
    fn empty_ring_resolves_nothing() {
        let ring = HashRing::default();
        assert_eq!(ring.find_one(b"k"), None);
        assert!(ring.find_many(b"k", 3).is_empty());
    }

    #[test]
    fn single_member_always_wins() {
        let mut ring = HashRing::default();
        let e = ep("n1", 1);
        ring.add_endpoint(e.clone());
        for key in &["a", "b", "file.png", "any_key"] {
            assert_eq!(ring.find_one(key.as_bytes()), Some(e.clone()));
        }
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let mut ring = HashRing::default();
        ring.add_endpoint(ep("n1", 1));
        ring.add_endpoint(ep("n2", 2));
        ring.add_endpoint(ep("n3", 3));
        let first = ring.find_one(b"stable-key");
        for _ in 0..50 {
            assert_eq!(ring.find_one(b"stable-key"), first);
        }
    }

    #[test]
    fn find_many_returns_distinct_endpoints() {
        let mut ring = HashRing::default();
        ring.add_endpoint(ep("n1", 1));
        ring.add_endpoint(ep("n2", 2));
        ring.add_endpoint(ep("n3", 3));
        let picked = ring.find_many(b"k", 2);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert_eq!(ring.find_many(b"k", 2), picked);
    }

    #[test]
    fn find_many_caps_at_membership_size() {
        let mut ring = HashRing::default();
        ring.add_endpoint(ep("n1", 1));
        assert_eq!(ring.find_many(b"k", 5).len(), 1);
    }

    #[test]
    fn add_is_idempotent() {
        let mut ring = HashRing::default();
        let e = ep("n1", 1);
        ring.add_endpoint(e.clone());
        let before = ring.len();
        ring.add_endpoint(e);
        assert_eq!(ring.len(), before);
    }

    #[test]
    fn disruption_is_bounded_on_single_join() {
        let mut ring = HashRing::default();
        for i in 0..10u64 {
            ring.add_endpoint(ep("n", i));
        }
        let keys: Vec<Vec<u8>> = (0..10_000u32).map(|i| i.to_be_bytes().to_vec()).collect();
        let before: Vec<Option<Endpoint>> = keys.iter().map(|k| ring.find_one(k)).collect();
        ring.add_endpoint(ep("n", 10));
        let after: Vec<Option<Endpoint>> = keys.iter().map(|k| ring.find_one(k)).collect();
        let moved = before.iter().zip(after.iter()).filter(|(a, b)| a != b).count();
        let bound = keys.len() / 11 + keys.len() / 10; // |K|/(N+1) plus tolerance
        assert!(moved <= bound, "moved {} keys, bound {}", moved, bound);
    }
}
