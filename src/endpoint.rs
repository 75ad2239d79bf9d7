//! [`Endpoint`] identity and canonical wire addressing.
//!
//! [`Endpoint`]: ./struct.Endpoint.html
use std::fmt;

/// Identifier of a cluster member, unique across the whole cluster.
///
/// Canonically a short string (a hostname, a `node@host` pair, a UUID...);
/// the registry treats it as an opaque, hashable, equality-comparable tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);
impl NodeId {
    /// Makes a new `NodeId` from any string-like value.
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeId(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl<'a> From<&'a str> for NodeId {
    fn from(s: &'a str) -> Self {
        NodeId::new(s)
    }
}
impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::new(s)
    }
}

/// A node-local opaque identifier that the transport can use to deliver a
/// message to a specific addressable worker.
///
/// `LocalHandle` carries no meaning to the registry itself: it is bytes that
/// round-trip through gossip and come back out unchanged on `find_one`/
/// `find_many`/`get_all`, for the caller's transport to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalHandle(Vec<u8>);
impl LocalHandle {
    /// Makes a new `LocalHandle` wrapping the given opaque bytes.
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Self {
        LocalHandle(bytes.into())
    }

    /// Returns the opaque bytes of the handle.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
impl<'a> From<&'a str> for LocalHandle {
    fn from(s: &'a str) -> Self {
        LocalHandle::new(s.as_bytes().to_vec())
    }
}
impl From<u64> for LocalHandle {
    fn from(n: u64) -> Self {
        LocalHandle::new(n.to_be_bytes().to_vec())
    }
}

/// A cluster-addressable worker, identified by the pair `(node_id,
/// local_handle)`.
///
/// Endpoints are not owned by the registry; their lifecycle (creation,
/// liveness, teardown) is entirely external. The registry only ever stores
/// and compares this identity pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    node_id: NodeId,
    local_handle: LocalHandle,
}
impl Endpoint {
    /// Makes a new `Endpoint` identifying a worker on `node_id`.
    pub fn new(node_id: NodeId, local_handle: LocalHandle) -> Self {
        Endpoint {
            node_id,
            local_handle,
        }
    }

    /// Returns the owning node's identifier.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Returns the node-local opaque handle.
    pub fn local_handle(&self) -> &LocalHandle {
        &self.local_handle
    }

    /// Canonical byte serialization of this endpoint: length-prefixed
    /// `node_id` followed by length-prefixed `local_handle`.
    ///
    /// Used both as ring-key input (vnode tie-break, §4.2) and as the
    /// equality key carried in gossip payloads (§6).
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let node_id = self.node_id.as_str().as_bytes();
        let handle = self.local_handle.as_bytes();
        let mut out = Vec::with_capacity(8 + node_id.len() + handle.len());
        out.extend_from_slice(&(node_id.len() as u32).to_be_bytes());
        out.extend_from_slice(node_id);
        out.extend_from_slice(&(handle.len() as u32).to_be_bytes());
        out.extend_from_slice(handle);
        out
    }
}
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{:?}", self.node_id, self.local_handle.as_bytes())
    }
}
