//! The Registry Facade (spec.md §4.3): the public surface applications
//! build on, and the only component that knows about a local endpoint's
//! liveness.
use fibers::Spawn;
use futures::Future;
use prometrics::metrics::MetricBuilder;
use slog::Logger;

use endpoint::Endpoint;
use keyable::Keyable;
use metrics::RegistryMetrics;
use presence::{Meta, PresenceState};
use ring_manager::RingManagerHandle;
use service_type::ServiceType;
use spawn::ArcSpawn;
use tracker::TrackerHandle;
use transport::Subscription;
use {Error, Result};

/// A boxed, `Send` future carrying a Registry Facade reply.
pub type Reply<V> = Box<Future<Item = V, Error = Error> + Send>;

/// The public API of a running Dispatch node (spec.md §4.3).
///
/// Cheap to clone: every field is itself a handle to a shared actor or
/// shared executor.
#[derive(Clone)]
pub struct Registry {
    logger: Logger,
    tracker: TrackerHandle,
    ring: RingManagerHandle,
    spawn: ArcSpawn,
    metrics: RegistryMetrics,
}
impl Registry {
    /// Builds a new facade over an already-running Tracker and Ring
    /// Manager. Constructed by [`Supervisor`](../supervisor/struct.Supervisor.html).
    pub fn new(
        logger: Logger,
        tracker: TrackerHandle,
        ring: RingManagerHandle,
        spawn: ArcSpawn,
        metric_builder: &MetricBuilder,
    ) -> Self {
        Registry {
            logger,
            tracker,
            ring,
            spawn,
            metrics: RegistryMetrics::new(metric_builder.clone()),
        }
    }

    /// Registers `endpoint` as online for `service_type`, minting a fresh
    /// `phx_ref`. If `termination` is given, it is spawned as a watcher
    /// fiber: when it resolves, `endpoint` is removed automatically
    /// (spec.md §9 "process monitors for endpoint liveness").
    pub fn add_service<F>(&self, service_type: ServiceType, endpoint: Endpoint, termination: Option<F>) -> Reply<u64>
    where
        F: Future<Item = (), Error = ()> + Send + 'static,
    {
        self.metrics.services_added.increment();
        let registry = self.clone();
        let watched_type = service_type.clone();
        let watched_endpoint = endpoint.clone();
        let fut = self
            .tracker
            .track(service_type, endpoint, PresenceState::Online)
            .and_then(|result| result)
            .map(move |phx_ref| {
                if let Some(termination) = termination {
                    let watcher = registry.clone();
                    registry.spawn.spawn(termination.then(move |_| {
                        watcher.metrics.endpoint_terminations_observed.increment();
                        info!(watcher.logger, "endpoint terminated, removing service";
                            "service_type" => %watched_type, "endpoint" => %watched_endpoint);
                        watcher
                            .remove_service(watched_type.clone(), watched_endpoint.clone())
                            .then(|_| Ok(()))
                    }));
                }
                phx_ref
            });
        Box::new(fut)
    }

    /// Flips `endpoint` to online. Fails with `NotRegistered` if there was
    /// no prior `add_service`.
    pub fn enable_service(&self, service_type: ServiceType, endpoint: Endpoint) -> Reply<()> {
        Box::new(
            self.tracker
                .update(service_type, endpoint, PresenceState::Online)
                .and_then(|result| result),
        )
    }

    /// Flips `endpoint` to offline. Fails with `NotRegistered` if there was
    /// no prior `add_service`.
    pub fn disable_service(&self, service_type: ServiceType, endpoint: Endpoint) -> Reply<()> {
        Box::new(
            self.tracker
                .update(service_type, endpoint, PresenceState::Offline)
                .and_then(|result| result),
        )
    }

    /// Removes `endpoint` from `service_type`. Idempotent.
    pub fn remove_service(&self, service_type: ServiceType, endpoint: Endpoint) -> Reply<()> {
        self.metrics.services_removed.increment();
        Box::new(self.tracker.untrack(service_type, endpoint).and_then(|result| result))
    }

    /// Returns every entry of `service_type`, online and offline.
    pub fn get_services(&self, service_type: ServiceType) -> Reply<Vec<(Endpoint, Meta)>> {
        Box::new(self.tracker.list(service_type))
    }

    /// Returns the online subset of `service_type`'s entries.
    pub fn get_online_services(&self, service_type: ServiceType) -> Reply<Vec<(Endpoint, Meta)>> {
        Box::new(self.tracker.list(service_type).map(|entries| {
            entries.into_iter().filter(|(_, meta)| meta.state().is_online()).collect()
        }))
    }

    /// Begins receiving join/leave events for `service_type`, replaying the
    /// current online set as catch-up (spec.md §8 round-trip property).
    pub fn subscribe(&self, service_type: ServiceType) -> Reply<(Vec<(Endpoint, Meta)>, Subscription)> {
        Box::new(self.tracker.subscribe(service_type))
    }

    /// Resolves `key` to a single online endpoint of `service_type`.
    pub fn find_service<K: Keyable + ?Sized>(&self, service_type: &ServiceType, key: &K) -> Result<Endpoint> {
        self.ring.find_one(service_type, &key.to_key_bytes())
    }

    /// Resolves `key` to up to `count` distinct online endpoints of
    /// `service_type`.
    pub fn find_multi_service<K: Keyable + ?Sized>(
        &self,
        count: usize,
        service_type: &ServiceType,
        key: &K,
    ) -> Result<Vec<Endpoint>> {
        self.ring.find_many(service_type, &key.to_key_bytes(), count)
    }

    /// Returns the facade's metrics.
    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }
}
