//! The pub/sub transport contract (spec.md §6) and a local, in-process
//! implementation used by tests and single-process deployments.
//!
//! The transport is specified only as a collaborator: Dispatch is generic
//! over any topic-addressed broadcast bus that is safe for many concurrent
//! publishers and subscribers (spec.md §5). [`LocalBus`] is the reference
//! implementation this crate ships and tests against; a production
//! deployment plugs in whatever bus it already runs (e.g. a `fibers_rpc`
//! cast to every known peer, Kafka, NATS...).
use fibers::sync::mpsc;
use futures::{Poll, Stream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trackable::error::ErrorKindExt;

use endpoint::NodeId;
use {Error, ErrorKind, Result};

/// A broadcast topic: either the well-known presence-gossip topic or a
/// service type's event topic (spec.md §6 "Topic conventions").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);
impl Topic {
    /// Makes a new `Topic` with the given name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Topic(name.into())
    }

    /// Returns the topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl<'a> From<&'a str> for Topic {
    fn from(s: &'a str) -> Self {
        Topic::new(s)
    }
}

/// The well-known presence-gossip topic (spec.md §6).
pub fn presence_topic() -> Topic {
    Topic::new("dispatch:presence")
}

/// A subscription handle: a `Stream` of raw payloads delivered on the
/// subscribed topic.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
}
impl Stream for Subscription {
    type Item = Vec<u8>;
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        Ok(self.rx.poll().expect("Never fails"))
    }
}

/// The topic-addressed pub/sub bus Dispatch is built on (spec.md §6).
///
/// Implementations must tolerate many concurrent publishers and
/// subscribers; `broadcast` fans out to every node in the cluster,
/// `direct_broadcast` scopes delivery to one node (used to fan join/leave
/// events out to a Tracker's colocated subscribers without a cluster hop).
pub trait PubSub: Send + Sync {
    /// Begins delivering messages published on `topic` to the returned
    /// subscription.
    fn subscribe(&self, topic: &Topic) -> Subscription;

    /// Delivers `payload` to every subscriber of `topic` on every node.
    fn broadcast(&self, topic: &Topic, payload: Vec<u8>) -> Result<()>;

    /// Delivers `payload` to every subscriber of `topic` on `target` only.
    fn direct_broadcast(&self, target: &NodeId, topic: &Topic, payload: Vec<u8>) -> Result<()>;
}

type SubscriberMap = HashMap<Topic, Vec<mpsc::Sender<Vec<u8>>>>;

struct NodeBus {
    subscribers: Mutex<SubscriberMap>,
}
impl NodeBus {
    fn new() -> Self {
        NodeBus {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn subscribe(&self, topic: &Topic) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .expect("poisoned")
            .entry(topic.clone())
            .or_insert_with(Vec::new)
            .push(tx);
        Subscription { rx }
    }

    fn deliver(&self, topic: &Topic, payload: &[u8]) {
        let mut subs = self.subscribers.lock().expect("poisoned");
        if let Some(senders) = subs.get_mut(topic) {
            senders.retain(|tx| tx.send(payload.to_vec()).is_ok());
        }
    }
}

/// An in-process pub/sub bus simulating an arbitrary number of cluster
/// nodes within a single OS process.
///
/// Each [`NodeId`] registered with `node()` gets its own local subscriber
/// list (for `direct_broadcast` and catch-up fan-out); `broadcast` reaches
/// every node that has called `node()` on a bus sharing the same backing
/// `Arc`. This is the transport used by this crate's own test suite to
/// exercise multi-node convergence and peer-expiry scenarios (spec.md §8)
/// without opening real sockets.
///
/// [`NodeId`]: ../endpoint/struct.NodeId.html
#[derive(Clone)]
pub struct LocalBus {
    nodes: Arc<Mutex<HashMap<NodeId, Arc<NodeBus>>>>,
}
impl LocalBus {
    /// Makes a new, empty `LocalBus`.
    pub fn new() -> Self {
        LocalBus {
            nodes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a [`PubSub`] handle scoped to `node_id`, creating its local
    /// subscriber registry if this is the first time `node_id` is seen.
    ///
    /// [`PubSub`]: ./trait.PubSub.html
    pub fn node(&self, node_id: NodeId) -> LocalBusHandle {
        self.nodes
            .lock()
            .expect("poisoned")
            .entry(node_id.clone())
            .or_insert_with(|| Arc::new(NodeBus::new()));
        LocalBusHandle {
            bus: self.clone(),
            node_id,
        }
    }
}
impl Default for LocalBus {
    fn default() -> Self {
        LocalBus::new()
    }
}

/// A [`PubSub`] handle for one node of a [`LocalBus`].
///
/// [`PubSub`]: ./trait.PubSub.html
/// [`LocalBus`]: ./struct.LocalBus.html
#[derive(Clone)]
pub struct LocalBusHandle {
    bus: LocalBus,
    node_id: NodeId,
}
impl PubSub for LocalBusHandle {
    fn subscribe(&self, topic: &Topic) -> Subscription {
        let nodes = self.bus.nodes.lock().expect("poisoned");
        nodes
            .get(&self.node_id)
            .expect("node() always registers before handing out a handle")
            .subscribe(topic)
    }

    fn broadcast(&self, topic: &Topic, payload: Vec<u8>) -> Result<()> {
        let nodes = self.bus.nodes.lock().expect("poisoned");
        for node_bus in nodes.values() {
            node_bus.deliver(topic, &payload);
        }
        Ok(())
    }

    fn direct_broadcast(&self, target: &NodeId, topic: &Topic, payload: Vec<u8>) -> Result<()> {
        let nodes = self.bus.nodes.lock().expect("poisoned");
        match nodes.get(target) {
            Some(node_bus) => {
                node_bus.deliver(topic, &payload);
                Ok(())
            }
            None => track!(Err(ErrorKind::TransportError
                .cause(format!("unknown target node: {}", target))
                .into())),
        }
    }
}
