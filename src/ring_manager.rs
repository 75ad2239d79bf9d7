//! The Ring Manager (spec.md §4.2): one consistent-hash ring per service
//! type, kept in lockstep with the Tracker's view and read through a
//! lock-free copy-on-write snapshot.
use atomic_immut::AtomicImmut;
use fibers::sync::mpsc;
use futures::{Async, Future, Poll, Stream};
use prometrics::metrics::MetricBuilder;
use slog::Logger;
use std::collections::HashMap;
use std::sync::Arc;
use trackable::error::ErrorKindExt;

use codec::{read_u32_prefixed, write_u32_prefixed};
use endpoint::{Endpoint, NodeId};
use metrics::RingMetrics;
use presence::{Meta, PresenceState};
use ring::HashRing;
use service_type::ServiceType;
use transport::{PubSub, Topic};
use {Error, ErrorKind, Result};

type RingMap = HashMap<ServiceType, Arc<HashRing>>;

enum Command {
    ApplyDiff {
        service_type: ServiceType,
        joins: Vec<(Endpoint, Meta)>,
        leaves: Vec<(Endpoint, Meta)>,
    },
}

/// Which transition a published ring event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingEventKind {
    Join,
    Leave,
}
impl RingEventKind {
    fn tag(self) -> u8 {
        match self {
            RingEventKind::Join => 0,
            RingEventKind::Leave => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(RingEventKind::Join),
            1 => Ok(RingEventKind::Leave),
            other => track_panic!(ErrorKind::InvalidInput, "unknown ring event tag: {}", other),
        }
    }
}

/// A `{:join|:leave, endpoint, meta}` event published on a service type's
/// topic (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEvent {
    pub kind: RingEventKind,
    pub endpoint: Endpoint,
    pub meta: Meta,
}
impl RingEvent {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind.tag()];
        write_u32_prefixed(&mut out, self.endpoint.node_id().as_str().as_bytes());
        write_u32_prefixed(&mut out, self.endpoint.local_handle().as_bytes());
        write_u32_prefixed(&mut out, self.meta.node_id().as_str().as_bytes());
        out.push(match self.meta.state() {
            PresenceState::Online => 0,
            PresenceState::Offline => 1,
        });
        out.extend_from_slice(&self.meta.phx_ref().to_be_bytes());
        out
    }

    /// Parses an event produced by [`encode`](#method.encode).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0;
        track_assert!(!bytes.is_empty(), ErrorKind::InvalidInput, "empty ring event");
        let kind = track!(RingEventKind::from_tag(bytes[0]))?;
        pos += 1;
        let (node_id, p) = track!(read_u32_prefixed(bytes, pos))?;
        pos = p;
        let (handle, p) = track!(read_u32_prefixed(bytes, pos))?;
        pos = p;
        let (owner, p) = track!(read_u32_prefixed(bytes, pos))?;
        pos = p;
        track_assert!(
            bytes.len() >= pos + 9,
            ErrorKind::InvalidInput,
            "truncated ring event"
        );
        let state = match bytes[pos] {
            0 => PresenceState::Online,
            1 => PresenceState::Offline,
            other => track_panic!(ErrorKind::InvalidInput, "unknown presence state: {}", other),
        };
        pos += 1;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[pos..pos + 8]);
        let phx_ref = u64::from_be_bytes(buf);
        Ok(RingEvent {
            kind,
            endpoint: Endpoint::new(
                NodeId::new(String::from_utf8_lossy(node_id).into_owned()),
                ::endpoint::LocalHandle::new(handle.to_vec()),
            ),
            meta: Meta::new(
                NodeId::new(String::from_utf8_lossy(owner).into_owned()),
                state,
                phx_ref,
            ),
        })
    }
}

/// A cheap, cloneable handle to a running [`RingManager`].
///
/// Lookups (`find_one`/`find_many`/`get_all`) read a shared-immutable
/// snapshot and never block on the actor; `apply_diff` enqueues a command
/// for the single-writer actor to process (spec.md §5).
///
/// [`RingManager`]: ./struct.RingManager.html
#[derive(Clone)]
pub struct RingManagerHandle {
    rings: Arc<AtomicImmut<RingMap>>,
    command_tx: mpsc::Sender<Command>,
    metrics: RingMetrics,
}
impl RingManagerHandle {
    /// Resolves `key` to a single endpoint of `service_type`.
    pub fn find_one(&self, service_type: &ServiceType, key: &[u8]) -> Result<Endpoint> {
        self.metrics.lookups_total.increment();
        let rings = self.rings.load();
        let found = rings.get(service_type).and_then(|ring| ring.find_one(key));
        match found {
            Some(endpoint) => Ok(endpoint),
            None => {
                self.metrics.lookup_misses.increment();
                track!(Err(ErrorKind::NoServiceForKey
                    .cause(format!("no ring (or empty ring) for type {}", service_type))
                    .into()))
            }
        }
    }

    /// Resolves `key` to up to `count` distinct endpoints of `service_type`.
    pub fn find_many(&self, service_type: &ServiceType, key: &[u8], count: usize) -> Result<Vec<Endpoint>> {
        self.metrics.lookups_total.increment();
        let rings = self.rings.load();
        match rings.get(service_type) {
            Some(ring) if !ring.is_empty() => Ok(ring.find_many(key, count)),
            _ => {
                self.metrics.lookup_misses.increment();
                track!(Err(ErrorKind::NoServiceForKey
                    .cause(format!("no ring (or empty ring) for type {}", service_type))
                    .into()))
            }
        }
    }

    /// Returns every online endpoint of `service_type`, or an empty vector
    /// if the type has no ring yet.
    pub fn get_all(&self, service_type: &ServiceType) -> Vec<Endpoint> {
        self.rings
            .load()
            .get(service_type)
            .map(|ring| ring.get_all())
            .unwrap_or_default()
    }

    /// Enqueues a `(joins, leaves)` diff for `service_type` to be applied by
    /// the actor (spec.md §4.2 `apply_diff`).
    pub fn apply_diff(
        &self,
        service_type: ServiceType,
        joins: Vec<(Endpoint, Meta)>,
        leaves: Vec<(Endpoint, Meta)>,
    ) -> Result<()> {
        track!(self
            .command_tx
            .send(Command::ApplyDiff {
                service_type,
                joins,
                leaves,
            })
            .map_err(|e| ErrorKind::InconsistentState.cause(e.to_string())))?;
        Ok(())
    }
}

/// The Ring Manager actor (spec.md §4.2).
///
/// Drives ring mutation to completion as a `Future`; callers spawn it with
/// whatever `fibers::Spawn` the process already uses and interact with it
/// exclusively through a [`RingManagerHandle`].
///
/// [`RingManagerHandle`]: ./struct.RingManagerHandle.html
pub struct RingManager<T> {
    logger: Logger,
    node_id: NodeId,
    rings: Arc<AtomicImmut<RingMap>>,
    command_rx: mpsc::Receiver<Command>,
    transport: T,
    vnodes_per_endpoint: u16,
    metrics: RingMetrics,
}
impl<T: PubSub> RingManager<T> {
    /// Builds a new `RingManager` and a handle to it.
    pub fn new(
        logger: Logger,
        node_id: NodeId,
        transport: T,
        vnodes_per_endpoint: u16,
        metric_builder: &MetricBuilder,
    ) -> (Self, RingManagerHandle) {
        let rings = Arc::new(AtomicImmut::new(RingMap::new()));
        let (command_tx, command_rx) = mpsc::channel();
        let metrics = RingMetrics::new(metric_builder.clone());
        let handle = RingManagerHandle {
            rings: Arc::clone(&rings),
            command_tx,
            metrics: metrics.clone(),
        };
        let actor = RingManager {
            logger,
            node_id,
            rings,
            command_rx,
            transport,
            vnodes_per_endpoint,
            metrics,
        };
        (actor, handle)
    }

    fn handle_apply_diff(
        &mut self,
        service_type: ServiceType,
        joins: Vec<(Endpoint, Meta)>,
        leaves: Vec<(Endpoint, Meta)>,
    ) {
        let mut rings = (*self.rings.load()).clone();
        {
            let entry = rings.entry(service_type.clone()).or_insert_with(|| {
                self.metrics.rings_created.increment();
                Arc::new(HashRing::new(self.vnodes_per_endpoint))
            });
            let ring = Arc::make_mut(entry);

            // Leaves are applied first; a leave suppressed by a same-batch
            // online rejoin never touches the ring (spec.md §4.1
            // "replace-in-place detection"), but is still published below.
            for (endpoint, _) in &leaves {
                let rejoins_online = joins
                    .iter()
                    .any(|(e, m)| e == endpoint && m.state().is_online());
                if !rejoins_online {
                    ring.remove_endpoint(endpoint);
                    self.metrics.leaves_applied.increment();
                }
            }
            for (endpoint, meta) in &joins {
                if meta.state().is_online() {
                    ring.add_endpoint(endpoint.clone());
                    self.metrics.joins_applied.increment();
                } else {
                    ring.remove_endpoint(endpoint);
                }
            }
        }
        self.rings.store(rings);

        let topic = Topic::new(service_type.as_str());
        for (endpoint, meta) in leaves {
            self.publish(&topic, RingEventKind::Leave, endpoint, meta);
        }
        for (endpoint, meta) in joins {
            self.publish(&topic, RingEventKind::Join, endpoint, meta);
        }
    }

    fn publish(&mut self, topic: &Topic, kind: RingEventKind, endpoint: Endpoint, meta: Meta) {
        let event = RingEvent { kind, endpoint, meta };
        let payload = event.encode();
        if let Err(e) = self.transport.direct_broadcast(&self.node_id, topic, payload) {
            warn!(self.logger, "failed to publish ring event"; "topic" => topic.as_str(), "error" => %e);
        } else {
            self.metrics.events_published.increment();
        }
    }
}
impl<T: PubSub> Future for RingManager<T> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            match self.command_rx.poll().expect("Never fails") {
                Async::NotReady => return Ok(Async::NotReady),
                Async::Ready(None) => {
                    info!(self.logger, "ring manager command channel closed");
                    return Ok(Async::Ready(()));
                }
                Async::Ready(Some(Command::ApplyDiff {
                    service_type,
                    joins,
                    leaves,
                })) => {
                    self.handle_apply_diff(service_type, joins, leaves);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::LocalHandle;
    use slog::Discard;
    use transport::LocalBus;

    fn ep(node: &str) -> Endpoint {
        Endpoint::new(NodeId::new(node), LocalHandle::from("h"))
    }

    fn online(owner: &str, phx_ref: u64) -> Meta {
        Meta::new(NodeId::new(owner), PresenceState::Online, phx_ref)
    }

    fn offline(owner: &str, phx_ref: u64) -> Meta {
        Meta::new(NodeId::new(owner), PresenceState::Offline, phx_ref)
    }

    fn logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[test]
    fn join_then_lookup() {
        let bus = LocalBus::new();
        let (mut actor, handle) = RingManager::new(
            logger(),
            NodeId::new("n1"),
            bus.node(NodeId::new("n1")),
            8,
            &MetricBuilder::new(),
        );
        let service_type = ServiceType::new("uploader");
        handle
            .apply_diff(service_type.clone(), vec![(ep("n1"), online("n1", 1))], Vec::new())
            .unwrap();
        actor.poll().unwrap();
        assert_eq!(handle.find_one(&service_type, b"k").unwrap(), ep("n1"));
    }

    #[test]
    fn leave_removes_from_ring() {
        let bus = LocalBus::new();
        let (mut actor, handle) = RingManager::new(
            logger(),
            NodeId::new("n1"),
            bus.node(NodeId::new("n1")),
            8,
            &MetricBuilder::new(),
        );
        let service_type = ServiceType::new("uploader");
        handle
            .apply_diff(service_type.clone(), vec![(ep("n1"), online("n1", 1))], Vec::new())
            .unwrap();
        actor.poll().unwrap();
        handle
            .apply_diff(service_type.clone(), Vec::new(), vec![(ep("n1"), online("n1", 1))])
            .unwrap();
        actor.poll().unwrap();
        assert!(handle.find_one(&service_type, b"k").is_err());
    }

    #[test]
    fn offline_join_is_excluded_from_ring() {
        let bus = LocalBus::new();
        let (mut actor, handle) = RingManager::new(
            logger(),
            NodeId::new("n1"),
            bus.node(NodeId::new("n1")),
            8,
            &MetricBuilder::new(),
        );
        let service_type = ServiceType::new("uploader");
        handle
            .apply_diff(service_type.clone(), vec![(ep("n1"), offline("n1", 1))], Vec::new())
            .unwrap();
        actor.poll().unwrap();
        assert!(handle.find_one(&service_type, b"k").is_err());
    }

    #[test]
    fn suppressed_leave_keeps_endpoint_online() {
        let bus = LocalBus::new();
        let (mut actor, handle) = RingManager::new(
            logger(),
            NodeId::new("n1"),
            bus.node(NodeId::new("n1")),
            8,
            &MetricBuilder::new(),
        );
        let service_type = ServiceType::new("uploader");
        handle
            .apply_diff(
                service_type.clone(),
                vec![(ep("n1"), online("n1", 2))],
                vec![(ep("n1"), online("n1", 1))],
            )
            .unwrap();
        actor.poll().unwrap();
        assert_eq!(handle.find_one(&service_type, b"k").unwrap(), ep("n1"));
    }

    #[test]
    fn empty_lookup_errors() {
        let bus = LocalBus::new();
        let (_actor, handle) = RingManager::new(
            logger(),
            NodeId::new("n1"),
            bus.node(NodeId::new("n1")),
            8,
            &MetricBuilder::new(),
        );
        assert!(handle.find_one(&ServiceType::new("uploader"), b"file.png").is_err());
    }
}
