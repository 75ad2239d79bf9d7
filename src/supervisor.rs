//! Supervisor / Lifecycle (spec.md §4 module map, §5 "graceful shutdown"):
//! wires a `Tracker`, `RingManager` and `Registry` together over a shared
//! transport, spawns the two actors onto an injected executor, and exposes
//! a single `shutdown` that drives the documented stop sequence.
use fibers::Spawn;
use futures::Future;
use prometrics::metrics::MetricBuilder;
use slog::Logger;
use std::time::Duration;

use clock::{Clock, SystemTicker};
use endpoint::NodeId;
use registry::Registry;
use ring_manager::RingManager;
use spawn::ArcSpawn;
use tracker::{Tracker, TrackerHandle};
use transport::PubSub;
use Error;

/// Every tunable in spec.md §6's configuration table.
///
/// `hash_algorithm` is not represented here: it is fixed at build time
/// (MurmurHash3 x64, spec.md §6), not a runtime knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Heartbeat tick interval. Default 1.5s.
    pub broadcast_period: Duration,
    /// Peer expiry horizon, in ticks. Default 20.
    pub max_silent_periods: u64,
    /// Ring replication factor (virtual nodes per endpoint). Default 128.
    pub vnodes_per_endpoint: u16,
    /// `call`/`multi_call` deadline. Default 5s.
    pub default_timeout: Duration,
}
impl Default for Config {
    fn default() -> Self {
        Config {
            broadcast_period: Duration::from_millis(1500),
            max_silent_periods: 20,
            vnodes_per_endpoint: ::ring::DEFAULT_VNODES_PER_ENDPOINT,
            default_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the lifecycle of one node's `Tracker`/`RingManager` pair.
///
/// Construction spawns both actors; `Supervisor` itself is just a handle to
/// the running `Tracker`, kept around so callers can request the graceful
/// shutdown sequence (spec.md §5) without reaching into `Registry`.
pub struct Supervisor {
    logger: Logger,
    tracker: TrackerHandle,
}
impl Supervisor {
    /// Builds a `Tracker` and `RingManager` over `transport`, spawns both
    /// onto `spawn`, and returns a `Supervisor` handle alongside the
    /// `Registry` facade applications are built on.
    pub fn spawn<T>(
        config: Config,
        logger: Logger,
        node_id: NodeId,
        transport: T,
        spawn: ArcSpawn,
        metric_builder: &MetricBuilder,
    ) -> (Self, Registry)
    where
        T: PubSub + Clone + Send + Sync + 'static,
    {
        let (ring_actor, ring_handle) = RingManager::new(
            logger.clone(),
            node_id.clone(),
            transport.clone(),
            config.vnodes_per_endpoint,
            metric_builder,
        );
        let (tracker_actor, tracker_handle) = Tracker::new(
            logger.clone(),
            node_id,
            transport,
            Clock::new(SystemTicker::new(config.broadcast_period)),
            ring_handle.clone(),
            config.max_silent_periods,
            metric_builder,
        );

        let ring_logger = logger.clone();
        spawn.spawn(ring_actor.then(move |result| {
            if let Err(e) = result {
                warn!(ring_logger, "ring manager actor terminated with an error"; "error" => %e);
            }
            Ok(())
        }));
        let tracker_logger = logger.clone();
        spawn.spawn(tracker_actor.then(move |result| {
            if let Err(e) = result {
                warn!(tracker_logger, "tracker actor terminated with an error"; "error" => %e);
            }
            Ok(())
        }));

        let registry = Registry::new(
            logger.clone(),
            tracker_handle.clone(),
            ring_handle,
            spawn,
            metric_builder,
        );
        (Supervisor { logger, tracker: tracker_handle }, registry)
    }

    /// Drives the documented shutdown sequence (spec.md §5): the Tracker
    /// stops accepting owner operations, emits a leave for every local
    /// entry, flushes one final heartbeat, then terminates. Resolves once
    /// that sequence completes.
    pub fn shutdown(&self) -> Box<Future<Item = (), Error = Error> + Send> {
        let logger = self.logger.clone();
        Box::new(self.tracker.shutdown().map(move |()| {
            info!(logger, "supervisor shut down");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::{Endpoint, LocalHandle};
    use service_type::ServiceType;
    use slog::Discard;
    use std::sync::{Arc, Mutex};
    use transport::LocalBus;

    fn logger() -> Logger {
        Logger::root(Discard, o!())
    }

    /// Captures every future handed to `spawn_boxed` instead of driving it,
    /// so a test can poll the Supervisor's actors by hand.
    #[derive(Clone)]
    struct RecordingSpawn(Arc<Mutex<Vec<Box<Future<Item = (), Error = ()> + Send>>>>);
    impl RecordingSpawn {
        fn new() -> Self {
            RecordingSpawn(Arc::new(Mutex::new(Vec::new())))
        }

        fn poll_all(&self) {
            let mut futures = self.0.lock().unwrap();
            for fut in futures.iter_mut() {
                let _ = fut.poll();
            }
        }
    }
    impl Spawn for RecordingSpawn {
        fn spawn_boxed(&self, f: Box<Future<Item = (), Error = ()> + Send>) {
            self.0.lock().unwrap().push(f);
        }
    }

    #[test]
    fn spawn_wires_a_working_registry_and_shutdown_terminates_the_tracker() {
        let bus = LocalBus::new();
        let node_id = NodeId::new("n1");
        let transport = bus.node(node_id.clone());
        let recording = RecordingSpawn::new();
        let config = Config {
            vnodes_per_endpoint: 8,
            ..Config::default()
        };
        let (supervisor, registry) = Supervisor::spawn(
            config,
            logger(),
            node_id.clone(),
            transport,
            ArcSpawn::new(recording.clone()),
            &MetricBuilder::new(),
        );

        let ty = ServiceType::new("uploader");
        let endpoint = Endpoint::new(node_id, LocalHandle::from("e1"));
        let _ = registry.add_service(ty.clone(), endpoint.clone(), None::<::futures::future::Empty<(), ()>>);
        recording.poll_all();
        recording.poll_all();
        assert_eq!(registry.find_service(&ty, "k").unwrap(), endpoint);

        let mut shutdown = supervisor.shutdown();
        recording.poll_all();
        assert_eq!(shutdown.poll().unwrap(), ::futures::Async::Ready(()));
        recording.poll_all();
        assert!(registry.find_service(&ty, "k").is_err());
    }
}
