//! [Prometheus][prometheus] metrics.
//!
//! Note that a `transport::PubSub` backend built on `fibers_rpc` can expose
//! [fibers_rpc's own metrics] alongside the ones defined in this module.
//!
//! [prometheus]: https://prometheus.io/
//! [fibers_rpc's own metrics]: https://docs.rs/fibers_rpc/0.2/fibers_rpc/metrics/index.html
use prometrics::metrics::{Counter, MetricBuilder};

/// Metrics of a [`Tracker`].
///
/// [`Tracker`]: ../tracker/struct.Tracker.html
#[derive(Debug, Clone)]
pub struct TrackerMetrics {
    pub(crate) heartbeats_sent: Counter,
    pub(crate) heartbeats_received: Counter,
    pub(crate) malformed_heartbeats_dropped: Counter,
    pub(crate) peers_expired: Counter,
    pub(crate) local_entries_tracked: Counter,
    pub(crate) local_entries_untracked: Counter,
    pub(crate) not_registered_errors: Counter,
    pub(crate) diffs_emitted: Counter,
}
impl TrackerMetrics {
    /// Metric: `dispatch_tracker_heartbeats_sent_total <COUNTER>`
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.value() as u64
    }

    /// Metric: `dispatch_tracker_heartbeats_received_total <COUNTER>`
    pub fn heartbeats_received(&self) -> u64 {
        self.heartbeats_received.value() as u64
    }

    /// Metric: `dispatch_tracker_malformed_heartbeats_dropped_total <COUNTER>`
    pub fn malformed_heartbeats_dropped(&self) -> u64 {
        self.malformed_heartbeats_dropped.value() as u64
    }

    /// Metric: `dispatch_tracker_peers_expired_total <COUNTER>`
    pub fn peers_expired(&self) -> u64 {
        self.peers_expired.value() as u64
    }

    /// Metric: `dispatch_tracker_diffs_emitted_total <COUNTER>`
    pub fn diffs_emitted(&self) -> u64 {
        self.diffs_emitted.value() as u64
    }

    pub(crate) fn new(mut builder: MetricBuilder) -> Self {
        builder.namespace("dispatch").subsystem("tracker");
        TrackerMetrics {
            heartbeats_sent: builder
                .counter("heartbeats_sent_total")
                .help("Number of heartbeats broadcast by this node")
                .finish()
                .expect("Never fails"),
            heartbeats_received: builder
                .counter("heartbeats_received_total")
                .help("Number of heartbeats received from peers")
                .finish()
                .expect("Never fails"),
            malformed_heartbeats_dropped: builder
                .counter("malformed_heartbeats_dropped_total")
                .help("Number of heartbeat payloads dropped for being malformed")
                .finish()
                .expect("Never fails"),
            peers_expired: builder
                .counter("peers_expired_total")
                .help("Number of peer nodes forgotten due to silence")
                .finish()
                .expect("Never fails"),
            local_entries_tracked: builder
                .counter("local_entries_tracked_total")
                .help("Number of track() calls accepted")
                .finish()
                .expect("Never fails"),
            local_entries_untracked: builder
                .counter("local_entries_untracked_total")
                .help("Number of untrack() calls accepted")
                .finish()
                .expect("Never fails"),
            not_registered_errors: builder
                .counter("not_registered_errors_total")
                .help("Number of update()/enable/disable calls rejected as not_registered")
                .finish()
                .expect("Never fails"),
            diffs_emitted: builder
                .counter("diffs_emitted_total")
                .help("Number of (type, joins, leaves) diffs forwarded to the Ring Manager")
                .finish()
                .expect("Never fails"),
        }
    }
}

/// Metrics of a [`RingManager`].
///
/// [`RingManager`]: ../ring_manager/struct.RingManager.html
#[derive(Debug, Clone)]
pub struct RingMetrics {
    pub(crate) rings_created: Counter,
    pub(crate) joins_applied: Counter,
    pub(crate) leaves_applied: Counter,
    pub(crate) lookups_total: Counter,
    pub(crate) lookup_misses: Counter,
    pub(crate) events_published: Counter,
}
impl RingMetrics {
    /// Metric: `dispatch_ring_rings_created_total <COUNTER>`
    pub fn rings_created(&self) -> u64 {
        self.rings_created.value() as u64
    }

    /// Metric: `dispatch_ring_lookups_total <COUNTER>`
    pub fn lookups_total(&self) -> u64 {
        self.lookups_total.value() as u64
    }

    /// Metric: `dispatch_ring_lookup_misses_total <COUNTER>`
    pub fn lookup_misses(&self) -> u64 {
        self.lookup_misses.value() as u64
    }

    pub(crate) fn new(mut builder: MetricBuilder) -> Self {
        builder.namespace("dispatch").subsystem("ring");
        RingMetrics {
            rings_created: builder
                .counter("rings_created_total")
                .help("Number of per-type rings created")
                .finish()
                .expect("Never fails"),
            joins_applied: builder
                .counter("joins_applied_total")
                .help("Number of endpoint joins applied to a ring")
                .finish()
                .expect("Never fails"),
            leaves_applied: builder
                .counter("leaves_applied_total")
                .help("Number of endpoint leaves applied to a ring")
                .finish()
                .expect("Never fails"),
            lookups_total: builder
                .counter("lookups_total")
                .help("Number of find_one/find_many lookups served")
                .finish()
                .expect("Never fails"),
            lookup_misses: builder
                .counter("lookup_misses_total")
                .help("Number of lookups that returned no_service_for_key")
                .finish()
                .expect("Never fails"),
            events_published: builder
                .counter("events_published_total")
                .help("Number of join/leave events published to type-topic subscribers")
                .finish()
                .expect("Never fails"),
        }
    }
}

/// Metrics of the [`Registry`] facade.
///
/// [`Registry`]: ../registry/struct.Registry.html
#[derive(Debug, Clone)]
pub struct RegistryMetrics {
    pub(crate) services_added: Counter,
    pub(crate) services_removed: Counter,
    pub(crate) endpoint_terminations_observed: Counter,
}
impl RegistryMetrics {
    /// Metric: `dispatch_registry_services_added_total <COUNTER>`
    pub fn services_added(&self) -> u64 {
        self.services_added.value() as u64
    }

    /// Metric: `dispatch_registry_services_removed_total <COUNTER>`
    pub fn services_removed(&self) -> u64 {
        self.services_removed.value() as u64
    }

    pub(crate) fn new(mut builder: MetricBuilder) -> Self {
        builder.namespace("dispatch").subsystem("registry");
        RegistryMetrics {
            services_added: builder
                .counter("services_added_total")
                .help("Number of add_service() calls")
                .finish()
                .expect("Never fails"),
            services_removed: builder
                .counter("services_removed_total")
                .help("Number of remove_service() calls, including implicit ones from endpoint termination")
                .finish()
                .expect("Never fails"),
            endpoint_terminations_observed: builder
                .counter("endpoint_terminations_observed_total")
                .help("Number of monitored endpoints observed to terminate")
                .finish()
                .expect("Never fails"),
        }
    }
}
