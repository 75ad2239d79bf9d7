//! Heartbeat payloads and diff computation for the full-state gossip
//! protocol (spec.md §4.1, §9 "CRDT-style tracker can be replaced by
//! full-state heartbeat gossip").
use std::collections::HashMap;

use endpoint::{Endpoint, NodeId};
use presence::Meta;
use service_type::ServiceType;

/// A full enumeration of one node's locally-owned presence entries,
/// broadcast every `broadcast_period` on the presence topic. Heartbeats are
/// idempotent: receiving the same heartbeat twice produces an empty diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub(crate) node_id: NodeId,
    pub(crate) entries: Vec<(ServiceType, Endpoint, Meta)>,
}
impl Heartbeat {
    /// Makes a new `Heartbeat` carrying `entries` on behalf of `node_id`.
    pub fn new(node_id: NodeId, entries: Vec<(ServiceType, Endpoint, Meta)>) -> Self {
        Heartbeat { node_id, entries }
    }

    /// The sending node.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The sender's full locally-owned entry set at the time of sending.
    pub fn entries(&self) -> &[(ServiceType, Endpoint, Meta)] {
        &self.entries
    }

    pub(crate) fn into_map(self) -> HashMap<(ServiceType, Endpoint), Meta> {
        self.entries
            .into_iter()
            .map(|(t, e, m)| ((t, e), m))
            .collect()
    }
}

/// A `(joins, leaves)` pair for one service type, derived by comparing a
/// received replica snapshot against the prior one (spec.md GLOSSARY,
/// "Gossip diff").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDiff {
    pub joins: Vec<(Endpoint, Meta)>,
    pub leaves: Vec<(Endpoint, Meta)>,
}
impl TypeDiff {
    fn join(&mut self, endpoint: Endpoint, meta: Meta) {
        self.joins.push((endpoint, meta));
    }

    fn leave(&mut self, endpoint: Endpoint, meta: Meta) {
        self.leaves.push((endpoint, meta));
    }

    /// `true` if there is nothing to apply or publish.
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

/// Compares `previous` (the prior replica of a peer, or of this node's own
/// local state) against `current`, grouping the differences by service
/// type. An entry counts as a join if it is new or its `phx_ref` advanced
/// (replace-in-place); it counts as a leave if it is now absent, or
/// superseded by a new `phx_ref` (the old meta is still published as a
/// leave so watchers see the transition, per spec.md §4.1).
pub fn diff_by_type(
    previous: &HashMap<(ServiceType, Endpoint), Meta>,
    current: &HashMap<(ServiceType, Endpoint), Meta>,
) -> HashMap<ServiceType, TypeDiff> {
    let mut out: HashMap<ServiceType, TypeDiff> = HashMap::new();

    for (key, old_meta) in previous {
        match current.get(key) {
            None => {
                let (ty, endpoint) = key.clone();
                out.entry(ty).or_insert_with(TypeDiff::default).leave(endpoint, old_meta.clone());
            }
            Some(new_meta) if new_meta.phx_ref() != old_meta.phx_ref() => {
                let (ty, endpoint) = key.clone();
                out.entry(ty)
                    .or_insert_with(TypeDiff::default)
                    .leave(endpoint, old_meta.clone());
            }
            Some(_) => {}
        }
    }
    for (key, new_meta) in current {
        let is_join = match previous.get(key) {
            None => true,
            Some(old_meta) => old_meta.phx_ref() != new_meta.phx_ref(),
        };
        if is_join {
            let (ty, endpoint) = key.clone();
            out.entry(ty).or_insert_with(TypeDiff::default).join(endpoint, new_meta.clone());
        }
    }
    out.retain(|_, d| !d.is_empty());
    out
}

/// Synthesizes leave events for every entry of a peer whose heartbeats have
/// gone silent past the expiry horizon (spec.md §4.1).
pub fn expire_all(entries: &HashMap<(ServiceType, Endpoint), Meta>) -> HashMap<ServiceType, TypeDiff> {
    let mut out: HashMap<ServiceType, TypeDiff> = HashMap::new();
    for ((ty, endpoint), meta) in entries {
        out.entry(ty.clone())
            .or_insert_with(TypeDiff::default)
            .leave(endpoint.clone(), meta.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::LocalHandle;
    use presence::PresenceState;

    fn ep(n: &str) -> Endpoint {
        Endpoint::new(NodeId::new(n), LocalHandle::from("h"))
    }

    fn meta(n: &str, state: PresenceState, phx_ref: u64) -> Meta {
        Meta::new(NodeId::new(n), state, phx_ref)
    }

    #[test]
    fn new_entry_is_a_join() {
        let mut current = HashMap::new();
        current.insert(
            (ServiceType::new("t"), ep("n")),
            meta("n", PresenceState::Online, 1),
        );
        let diff = diff_by_type(&HashMap::new(), &current);
        let d = &diff[&ServiceType::new("t")];
        assert_eq!(d.joins.len(), 1);
        assert!(d.leaves.is_empty());
    }

    #[test]
    fn missing_entry_is_a_leave() {
        let mut previous = HashMap::new();
        previous.insert(
            (ServiceType::new("t"), ep("n")),
            meta("n", PresenceState::Online, 1),
        );
        let diff = diff_by_type(&previous, &HashMap::new());
        let d = &diff[&ServiceType::new("t")];
        assert!(d.joins.is_empty());
        assert_eq!(d.leaves.len(), 1);
    }

    #[test]
    fn advanced_phx_ref_is_leave_then_join() {
        let key = (ServiceType::new("t"), ep("n"));
        let mut previous = HashMap::new();
        previous.insert(key.clone(), meta("n", PresenceState::Online, 1));
        let mut current = HashMap::new();
        current.insert(key, meta("n", PresenceState::Offline, 2));
        let diff = diff_by_type(&previous, &current);
        let d = &diff[&ServiceType::new("t")];
        assert_eq!(d.leaves.len(), 1);
        assert_eq!(d.joins.len(), 1);
    }

    #[test]
    fn unchanged_entry_produces_no_diff() {
        let key = (ServiceType::new("t"), ep("n"));
        let mut previous = HashMap::new();
        previous.insert(key.clone(), meta("n", PresenceState::Online, 1));
        let current = previous.clone();
        let diff = diff_by_type(&previous, &current);
        assert!(diff.is_empty());
    }
}
