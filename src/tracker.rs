//! The Tracker Replica (spec.md §4.1): per-node presence view, heartbeat
//! gossip, and silent-peer expiry.
use fibers::sync::mpsc;
use futures::sync::oneshot;
use futures::{Async, Future, Poll, Stream};
use prometrics::metrics::MetricBuilder;
use slog::Logger;
use std::collections::HashMap;
use trackable::error::ErrorKindExt;

use clock::{Clock, Tick, Ticker};
use codec;
use endpoint::{Endpoint, NodeId};
use gossip::{self, Heartbeat};
use metrics::TrackerMetrics;
use presence::{Meta, PresenceState};
use ring_manager::RingManagerHandle;
use service_type::ServiceType;
use transport::{presence_topic, PubSub, Subscription, Topic};
use {Error, ErrorKind, Result};

type EntryMap = HashMap<(ServiceType, Endpoint), Meta>;

enum Command {
    Track {
        service_type: ServiceType,
        endpoint: Endpoint,
        state: PresenceState,
        reply: oneshot::Sender<Result<u64>>,
    },
    Update {
        service_type: ServiceType,
        endpoint: Endpoint,
        state: PresenceState,
        reply: oneshot::Sender<Result<()>>,
    },
    Untrack {
        service_type: ServiceType,
        endpoint: Endpoint,
        reply: oneshot::Sender<Result<()>>,
    },
    List {
        service_type: ServiceType,
        reply: oneshot::Sender<Vec<(Endpoint, Meta)>>,
    },
    Subscribe {
        service_type: ServiceType,
        reply: oneshot::Sender<(Vec<(Endpoint, Meta)>, Subscription)>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A pending reply from the Tracker actor.
///
/// Resolves once the actor has processed the corresponding command; the
/// actor serializes all owner operations, so replies observe the order in
/// which they were issued by a single caller (spec.md §5).
pub struct TrackerReply<V> {
    rx: oneshot::Receiver<V>,
}
impl<V> Future for TrackerReply<V> {
    type Item = V;
    type Error = Error;

    fn poll(&mut self) -> Poll<V, Error> {
        match track!(self
            .rx
            .poll()
            .map_err(|e| ErrorKind::InconsistentState.cause(e)))?
        {
            Async::Ready(v) => Ok(Async::Ready(v)),
            Async::NotReady => Ok(Async::NotReady),
        }
    }
}

fn reply<V>(rx: oneshot::Receiver<V>) -> TrackerReply<V> {
    TrackerReply { rx }
}

/// A cheap, cloneable handle to a running [`Tracker`].
///
/// [`Tracker`]: ./struct.Tracker.html
#[derive(Clone)]
pub struct TrackerHandle {
    command_tx: mpsc::Sender<Command>,
}
impl TrackerHandle {
    /// Registers (or replaces) a local entry, minting a fresh `phx_ref`.
    /// Fails with `InvalidInput` if `endpoint` does not belong to this node.
    pub fn track(
        &self,
        service_type: ServiceType,
        endpoint: Endpoint,
        state: PresenceState,
    ) -> TrackerReply<Result<u64>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::Track {
            service_type,
            endpoint,
            state,
            reply: tx,
        });
        reply(rx)
    }

    /// Changes the state of an existing local entry. Fails with
    /// `NotRegistered` if there is no prior `track`.
    pub fn update(
        &self,
        service_type: ServiceType,
        endpoint: Endpoint,
        state: PresenceState,
    ) -> TrackerReply<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::Update {
            service_type,
            endpoint,
            state,
            reply: tx,
        });
        reply(rx)
    }

    /// Removes a local entry. Idempotent: untracking an absent entry
    /// succeeds without emitting a second leave.
    pub fn untrack(&self, service_type: ServiceType, endpoint: Endpoint) -> TrackerReply<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::Untrack {
            service_type,
            endpoint,
            reply: tx,
        });
        reply(rx)
    }

    /// Snapshots the merged local+remote view for `service_type`.
    pub fn list(&self, service_type: ServiceType) -> TrackerReply<Vec<(Endpoint, Meta)>> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::List { service_type, reply: tx });
        reply(rx)
    }

    /// Begins receiving `{:join, endpoint, meta}` / `{:leave, endpoint,
    /// meta}` events for `service_type`'s topic. The current online set is
    /// replayed as catch-up joins before the live stream (spec.md §8
    /// round-trip property).
    pub fn subscribe(&self, service_type: ServiceType) -> TrackerReply<(Vec<(Endpoint, Meta)>, Subscription)> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::Subscribe { service_type, reply: tx });
        reply(rx)
    }

    /// Requests a graceful shutdown (spec.md §5): the actor stops accepting
    /// owner operations, emits a leave for every local entry, flushes one
    /// final heartbeat, then terminates. Resolves once that sequence
    /// completes.
    pub fn shutdown(&self) -> TrackerReply<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.command_tx.send(Command::Shutdown { reply: tx });
        reply(rx)
    }
}

/// The Tracker Replica actor (spec.md §4.1).
///
/// Drives the heartbeat/expiry tick, ingests gossip from peers, and serves
/// owner operations, forwarding every resulting `(joins, leaves)` diff to a
/// [`RingManagerHandle`] immediately (not just on the next heartbeat), so
/// that `subscribe`-then-`add_service` observes its own join without
/// waiting on a gossip round trip.
///
/// [`RingManagerHandle`]: ../ring_manager/struct.RingManagerHandle.html
pub struct Tracker<T, C> {
    logger: Logger,
    node_id: NodeId,
    local: EntryMap,
    remote: HashMap<NodeId, EntryMap>,
    last_heard: HashMap<NodeId, Tick>,
    next_phx_ref: u64,
    max_silent_periods: Tick,
    clock: Clock<C>,
    command_rx: mpsc::Receiver<Command>,
    gossip_rx: Subscription,
    transport: T,
    ring: RingManagerHandle,
    metrics: TrackerMetrics,
    terminated: bool,
}
impl<T: PubSub, C: Ticker> Tracker<T, C> {
    /// Builds a new `Tracker` and a handle to it.
    pub fn new(
        logger: Logger,
        node_id: NodeId,
        transport: T,
        clock: Clock<C>,
        ring: RingManagerHandle,
        max_silent_periods: Tick,
        metric_builder: &MetricBuilder,
    ) -> (Self, TrackerHandle) {
        let gossip_rx = transport.subscribe(&presence_topic());
        let (command_tx, command_rx) = mpsc::channel();
        let actor = Tracker {
            logger,
            node_id,
            local: EntryMap::new(),
            remote: HashMap::new(),
            last_heard: HashMap::new(),
            next_phx_ref: 0,
            max_silent_periods,
            clock,
            command_rx,
            gossip_rx,
            transport,
            ring,
            metrics: TrackerMetrics::new(metric_builder.clone()),
            terminated: false,
        };
        (actor, TrackerHandle { command_tx })
    }

    fn emit_diff(&mut self, service_type: ServiceType, joins: Vec<(Endpoint, Meta)>, leaves: Vec<(Endpoint, Meta)>) {
        if joins.is_empty() && leaves.is_empty() {
            return;
        }
        self.metrics.diffs_emitted.increment();
        if let Err(e) = self.ring.apply_diff(service_type, joins, leaves) {
            warn!(self.logger, "failed to forward diff to ring manager"; "error" => %e);
        }
    }

    fn handle_track(&mut self, service_type: ServiceType, endpoint: Endpoint, state: PresenceState) -> Result<u64> {
        track_assert_eq!(
            endpoint.node_id(),
            &self.node_id,
            ErrorKind::InvalidInput,
            "endpoint {} does not belong to this node ({})",
            endpoint,
            self.node_id
        );
        let phx_ref = self.next_phx_ref;
        self.next_phx_ref += 1;
        let meta = Meta::new(self.node_id.clone(), state, phx_ref);
        let key = (service_type.clone(), endpoint.clone());
        let previous = self.local.insert(key, meta.clone());
        self.metrics.local_entries_tracked.increment();
        let leaves = previous.into_iter().map(|m| (endpoint.clone(), m)).collect();
        self.emit_diff(service_type, vec![(endpoint, meta)], leaves);
        Ok(phx_ref)
    }

    fn handle_update(&mut self, service_type: ServiceType, endpoint: Endpoint, state: PresenceState) -> Result<()> {
        track_assert_eq!(
            endpoint.node_id(),
            &self.node_id,
            ErrorKind::InvalidInput,
            "endpoint {} does not belong to this node ({})",
            endpoint,
            self.node_id
        );
        let key = (service_type.clone(), endpoint.clone());
        let previous = match self.local.get(&key) {
            Some(meta) => meta.clone(),
            None => {
                self.metrics.not_registered_errors.increment();
                return track!(Err(ErrorKind::NotRegistered
                    .cause(format!("{} was never tracked for type {}", endpoint, service_type))
                    .into()));
            }
        };
        if previous.state() == state {
            return Ok(());
        }
        let phx_ref = self.next_phx_ref;
        self.next_phx_ref += 1;
        let updated = previous.with_state(state, phx_ref);
        self.local.insert(key, updated.clone());
        self.emit_diff(service_type, vec![(endpoint.clone(), updated)], vec![(endpoint, previous)]);
        Ok(())
    }

    fn handle_untrack(&mut self, service_type: ServiceType, endpoint: Endpoint) -> Result<()> {
        let key = (service_type.clone(), endpoint.clone());
        if let Some(meta) = self.local.remove(&key) {
            self.metrics.local_entries_untracked.increment();
            self.emit_diff(service_type, Vec::new(), vec![(endpoint, meta)]);
        }
        Ok(())
    }

    fn merged_view(&self, service_type: &ServiceType) -> Vec<(Endpoint, Meta)> {
        let mut out: Vec<(Endpoint, Meta)> = self
            .local
            .iter()
            .filter(|((ty, _), _)| ty == service_type)
            .map(|((_, endpoint), meta)| (endpoint.clone(), meta.clone()))
            .collect();
        for remote in self.remote.values() {
            out.extend(
                remote
                    .iter()
                    .filter(|((ty, _), _)| ty == service_type)
                    .map(|((_, endpoint), meta)| (endpoint.clone(), meta.clone())),
            );
        }
        out
    }

    fn handle_subscribe(&mut self, service_type: ServiceType) -> (Vec<(Endpoint, Meta)>, Subscription) {
        let catchup = self
            .merged_view(&service_type)
            .into_iter()
            .filter(|(_, meta)| meta.state().is_online())
            .collect();
        let subscription = self.transport.subscribe(&Topic::new(service_type.as_str()));
        (catchup, subscription)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Track {
                service_type,
                endpoint,
                state,
                reply,
            } => {
                let _ = reply.send(self.handle_track(service_type, endpoint, state));
            }
            Command::Update {
                service_type,
                endpoint,
                state,
                reply,
            } => {
                let _ = reply.send(self.handle_update(service_type, endpoint, state));
            }
            Command::Untrack {
                service_type,
                endpoint,
                reply,
            } => {
                let _ = reply.send(self.handle_untrack(service_type, endpoint));
            }
            Command::List { service_type, reply } => {
                let _ = reply.send(self.merged_view(&service_type));
            }
            Command::Subscribe { service_type, reply } => {
                let _ = reply.send(self.handle_subscribe(service_type));
            }
            Command::Shutdown { reply } => {
                self.handle_shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn handle_incoming_heartbeat(&mut self, bytes: Vec<u8>) {
        match codec::decode_heartbeat(&bytes) {
            Ok(heartbeat) => self.apply_heartbeat(heartbeat),
            Err(e) => {
                self.metrics.malformed_heartbeats_dropped.increment();
                warn!(self.logger, "dropped malformed heartbeat"; "error" => %e);
            }
        }
    }

    fn apply_heartbeat(&mut self, heartbeat: Heartbeat) {
        self.metrics.heartbeats_received.increment();
        let sender = heartbeat.node_id().clone();
        if sender == self.node_id {
            return;
        }
        self.last_heard.insert(sender.clone(), self.clock.ticks());
        let current = heartbeat.into_map();
        let previous = self.remote.remove(&sender).unwrap_or_default();
        let diffs = gossip::diff_by_type(&previous, &current);
        self.remote.insert(sender, current);
        for (service_type, diff) in diffs {
            self.emit_diff(service_type, diff.joins, diff.leaves);
        }
    }

    fn flush_heartbeat(&mut self) {
        let entries: Vec<_> = self
            .local
            .iter()
            .map(|((ty, endpoint), meta)| (ty.clone(), endpoint.clone(), meta.clone()))
            .collect();
        let heartbeat = Heartbeat::new(self.node_id.clone(), entries);
        let payload = codec::encode_heartbeat(&heartbeat);
        match self.transport.broadcast(&presence_topic(), payload) {
            Ok(()) => self.metrics.heartbeats_sent.increment(),
            Err(e) => warn!(self.logger, "heartbeat broadcast failed, retrying next tick"; "error" => %e),
        }
    }

    /// Graceful shutdown (spec.md §5): emits a leave for every local entry,
    /// flushes one final heartbeat reflecting the now-empty local set, then
    /// marks the actor terminated. Further owner operations already queued
    /// behind this command are never served.
    fn handle_shutdown(&mut self) {
        let local_keys: Vec<_> = self.local.keys().cloned().collect();
        for (service_type, endpoint) in local_keys {
            let _ = self.handle_untrack(service_type, endpoint);
        }
        self.flush_heartbeat();
        info!(self.logger, "tracker shut down"; "node_id" => %self.node_id);
        self.terminated = true;
    }

    fn handle_tick(&mut self) {
        let now = self.clock.ticks();
        self.flush_heartbeat();

        let horizon = self.max_silent_periods;
        let silent: Vec<NodeId> = self
            .last_heard
            .iter()
            .filter(|&(_, &last)| now.saturating_sub(last) > horizon)
            .map(|(node, _)| node.clone())
            .collect();
        for node in silent {
            self.last_heard.remove(&node);
            if let Some(entries) = self.remote.remove(&node) {
                self.metrics.peers_expired.increment();
                info!(self.logger, "peer expired"; "node_id" => %node);
                for (service_type, diff) in gossip::expire_all(&entries) {
                    self.emit_diff(service_type, diff.joins, diff.leaves);
                }
            }
        }
    }
}
impl<T: PubSub, C: Ticker> Future for Tracker<T, C> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            if self.terminated {
                return Ok(Async::Ready(()));
            }

            let mut progressed = false;

            match track!(self.clock.poll())? {
                Async::Ready(Some(_)) => {
                    self.handle_tick();
                    progressed = true;
                }
                Async::Ready(None) => return Ok(Async::Ready(())),
                Async::NotReady => {}
            }

            match track!(self.gossip_rx.poll())? {
                Async::Ready(Some(bytes)) => {
                    self.handle_incoming_heartbeat(bytes);
                    progressed = true;
                }
                Async::Ready(None) => return Ok(Async::Ready(())),
                Async::NotReady => {}
            }

            match self.command_rx.poll().expect("Never fails") {
                Async::Ready(Some(command)) => {
                    self.handle_command(command);
                    progressed = true;
                }
                Async::Ready(None) => {
                    info!(self.logger, "tracker command channel closed");
                    return Ok(Async::Ready(()));
                }
                Async::NotReady => {}
            }

            if !progressed {
                return Ok(Async::NotReady);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock::ManualTickHandle;
    use endpoint::LocalHandle;
    use ring_manager::RingManager;
    use slog::Discard;
    use transport::LocalBus;

    fn logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn setup(
        node: &str,
        bus: &LocalBus,
    ) -> (
        Tracker<::transport::LocalBusHandle, ::clock::ManualTicker>,
        TrackerHandle,
        RingManager<::transport::LocalBusHandle>,
        RingManagerHandle,
        ManualTickHandle,
    ) {
        let node_id = NodeId::new(node);
        let transport = bus.node(node_id.clone());
        let (ring_actor, ring_handle) = RingManager::new(
            logger(),
            node_id.clone(),
            transport.clone(),
            8,
            &MetricBuilder::new(),
        );
        let (tick_handle, ticker) = ManualTickHandle::new();
        let (tracker, handle) = Tracker::new(
            logger(),
            node_id,
            transport,
            Clock::new(ticker),
            ring_handle.clone(),
            4,
            &MetricBuilder::new(),
        );
        (tracker, handle, ring_actor, ring_handle, tick_handle)
    }

    #[test]
    fn track_emits_an_immediate_join() {
        let bus = LocalBus::new();
        let (mut tracker, handle, mut ring_actor, ring_handle, _ticks) = setup("n1", &bus);
        let endpoint = Endpoint::new(NodeId::new("n1"), LocalHandle::from("e1"));
        let mut reply = handle.track(ServiceType::new("uploader"), endpoint.clone(), PresenceState::Online);
        tracker.poll().unwrap();
        let phx_ref = reply.poll().unwrap();
        assert!(phx_ref.is_ready());
        ring_actor.poll().unwrap();
        assert_eq!(
            ring_handle.find_one(&ServiceType::new("uploader"), b"k").unwrap(),
            endpoint
        );
    }

    #[test]
    fn track_on_foreign_endpoint_fails() {
        let bus = LocalBus::new();
        let (mut tracker, handle, _ring_actor, _ring_handle, _ticks) = setup("n1", &bus);
        let endpoint = Endpoint::new(NodeId::new("other"), LocalHandle::from("e1"));
        let mut reply = handle.track(ServiceType::new("uploader"), endpoint, PresenceState::Online);
        tracker.poll().unwrap();
        match reply.poll().unwrap() {
            Async::Ready(Ok(_)) => panic!("expected failure"),
            Async::Ready(Err(_)) => {}
            Async::NotReady => panic!("reply never resolved"),
        }
    }

    #[test]
    fn untrack_is_idempotent() {
        let bus = LocalBus::new();
        let (mut tracker, handle, _ring_actor, _ring_handle, _ticks) = setup("n1", &bus);
        let endpoint = Endpoint::new(NodeId::new("n1"), LocalHandle::from("e1"));
        let ty = ServiceType::new("uploader");
        handle.untrack(ty.clone(), endpoint.clone());
        tracker.poll().unwrap();
        handle.untrack(ty, endpoint);
        tracker.poll().unwrap();
    }

    #[test]
    fn shutdown_emits_leaves_and_terminates_the_actor() {
        let bus = LocalBus::new();
        let (mut tracker, handle, mut ring_actor, ring_handle, _ticks) = setup("n1", &bus);
        let endpoint = Endpoint::new(NodeId::new("n1"), LocalHandle::from("e1"));
        let ty = ServiceType::new("uploader");
        handle.track(ty.clone(), endpoint.clone(), PresenceState::Online);
        tracker.poll().unwrap();
        ring_actor.poll().unwrap();
        assert!(ring_handle.find_one(&ty, b"k").is_ok());

        let mut shutdown = handle.shutdown();
        assert_eq!(tracker.poll().unwrap(), Async::Ready(()));
        assert_eq!(shutdown.poll().unwrap(), Async::Ready(()));
        ring_actor.poll().unwrap();
        assert!(ring_handle.find_one(&ty, b"k").is_err());
    }
}
