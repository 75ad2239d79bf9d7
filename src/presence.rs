//! Presence entries and their metadata (spec.md §3).
use NodeId;

/// Online/offline state of a presence entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceState {
    /// The endpoint is a ring member; lookups may return it.
    Online,
    /// The endpoint is registered but excluded from ring membership.
    Offline,
}
impl PresenceState {
    /// Returns `true` for `Online`.
    pub fn is_online(self) -> bool {
        self == PresenceState::Online
    }
}

/// Per-presence-entry metadata.
///
/// `phx_ref` is a monotonically increasing version token minted by the
/// owning node on every write to a `(type, endpoint)` coordinate; it
/// disambiguates a replace-in-place from a leave-then-rejoin when gossip
/// delivers a heartbeat out of order (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    node_id: NodeId,
    state: PresenceState,
    phx_ref: u64,
}
impl Meta {
    /// Makes a new `Meta`.
    pub fn new(node_id: NodeId, state: PresenceState, phx_ref: u64) -> Self {
        Meta {
            node_id,
            state,
            phx_ref,
        }
    }

    /// Returns the node that owns (minted) this metadata.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the presence state.
    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Returns the version token.
    pub fn phx_ref(&self) -> u64 {
        self.phx_ref
    }

    pub(crate) fn with_state(&self, state: PresenceState, phx_ref: u64) -> Self {
        Meta {
            node_id: self.node_id.clone(),
            state,
            phx_ref,
        }
    }
}
