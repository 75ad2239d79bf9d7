//! Dispatch: a distributed service registry.
//!
//! Nodes advertise named services as they come online; every node
//! eventually learns the full cluster-wide presence picture through
//! periodic full-state heartbeat gossip, and can resolve a service type
//! plus an arbitrary key to one or more owning endpoints via a
//! consistent-hash ring kept in lockstep with that presence picture.
//!
//! # Properties
//!
//! ## Pros
//!
//! - No coordinator: every node gossips its own local state and converges
//!   independently.
//! - Consistent-hash routing means adding or removing an endpoint only
//!   reshuffles a small fraction of keys.
//! - The read path (`find_one`/`find_many`/`get_all`) never blocks on the
//!   actor that owns the ring: it reads a lock-free, shared-immutable
//!   snapshot.
//!
//! ## Cons
//!
//! - Only eventual consistency across nodes: convergence is bounded by
//!   `max_silent_periods * broadcast_period`, not instantaneous.
//! - No linearizability, no durable storage, no authentication or
//!   encryption, no cross-cluster federation (see spec.md's Non-goals).
//!
//! If any of those guarantees are required, they must be provided by an
//! upper layer.
#![warn(missing_docs)]
extern crate atomic_immut;
#[macro_use]
extern crate bytecodec;
extern crate fibers;
extern crate fibers_rpc;
extern crate futures;
extern crate murmur3;
extern crate prometrics;
extern crate rand;
#[cfg(feature = "serialize")]
extern crate serde;
#[cfg(feature = "serialize")]
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate slog;
#[macro_use]
extern crate trackable;

pub use client::{Client, EndpointDispatcher};
pub use clock::{Clock, ManualTicker, ManualTickHandle, SystemTicker, Ticker, Tick};
pub use endpoint::{Endpoint, LocalHandle, NodeId};
pub use error::{Error, ErrorKind};
pub use keyable::Keyable;
pub use presence::{Meta, PresenceState};
pub use registry::{Registry, Reply};
pub use ring::HashRing;
pub use ring_manager::{RingEvent, RingEventKind, RingManager, RingManagerHandle};
pub use service_type::ServiceType;
pub use supervisor::{Config, Supervisor};
pub use tracker::{Tracker, TrackerHandle, TrackerReply};
pub use transport::{presence_topic, LocalBus, LocalBusHandle, PubSub, Subscription, Topic};

mod client;
mod clock;
mod codec;
mod endpoint;
mod error;
mod gossip;
mod keyable;
mod presence;
mod registry;
mod ring;
mod ring_manager;
mod service_type;
mod spawn;
mod supervisor;
mod tracker;
mod transport;

pub mod metrics;

pub use spawn::ArcSpawn;

/// This crate specific `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
