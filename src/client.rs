//! Client Sugar (spec.md §4.4): convenience calls that resolve a key
//! through the Registry Facade and then hand delivery off to an injected
//! dispatcher. Specified at the interface level only; this crate does not
//! ship a network transport for messages (that is the same external-
//! collaborator stance spec.md §6 takes for gossip).
use futures::future::{join_all, result};
use futures::Future;
use std::time::Duration;
use trackable::error::ErrorKindExt;

use endpoint::Endpoint;
use keyable::Keyable;
use registry::Registry;
use service_type::ServiceType;
use {Error, ErrorKind};

/// Wraps a `find_service`/`find_multi_service` failure as `service_unavailable`
/// (spec.md §4.3 "surfaced by the client sugar when `find_*` fails").
fn unavailable(e: Error) -> Error {
    ErrorKind::ServiceUnavailable.takes_over(e).into()
}

/// A message-delivery backend a [`Client`] dispatches resolved calls to.
///
/// [`Client`]: ./struct.Client.html
pub trait EndpointDispatcher: Send + Sync {
    /// The message type `cast`/`call` accept.
    type Message: Send + 'static;
    /// The reply type `call` resolves to.
    type Reply: Send + 'static;

    /// Fire-and-forget delivery to `endpoint`.
    fn cast(&self, endpoint: &Endpoint, msg: Self::Message) -> ::Result<()>;

    /// Request/response delivery to `endpoint`, bounded by `timeout`.
    fn call(
        &self,
        endpoint: &Endpoint,
        msg: Self::Message,
        timeout: Duration,
    ) -> Box<Future<Item = Self::Reply, Error = Error> + Send>;
}

/// Resolve-then-dispatch convenience wrapper over a [`Registry`] and an
/// [`EndpointDispatcher`] (spec.md §4.4).
///
/// [`Registry`]: ../registry/struct.Registry.html
/// [`EndpointDispatcher`]: ./trait.EndpointDispatcher.html
pub struct Client<D> {
    registry: Registry,
    dispatcher: D,
    default_timeout: Duration,
}
impl<D: EndpointDispatcher> Client<D> {
    /// Wraps `registry` and `dispatcher`; `default_timeout` is used by
    /// `call`/`multi_call` when no explicit timeout is given.
    pub fn new(registry: Registry, dispatcher: D, default_timeout: Duration) -> Self {
        Client {
            registry,
            dispatcher,
            default_timeout,
        }
    }

    /// Resolves `key` via `find_service` and delivers `msg` fire-and-forget.
    pub fn cast<K: Keyable + ?Sized>(&self, service_type: &ServiceType, key: &K, msg: D::Message) -> ::Result<()> {
        let endpoint = track!(self.registry.find_service(service_type, key).map_err(unavailable))?;
        track!(self.dispatcher.cast(&endpoint, msg))
    }

    /// Resolves `key` via `find_service` and issues a request/response call,
    /// failing with `service_unavailable` if no endpoint is found, or
    /// `timeout` if the dispatcher's reply does not arrive in time.
    pub fn call<K: Keyable + ?Sized>(
        &self,
        service_type: &ServiceType,
        key: &K,
        msg: D::Message,
        timeout: Option<Duration>,
    ) -> Box<Future<Item = D::Reply, Error = Error> + Send> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        match self.registry.find_service(service_type, key) {
            Ok(endpoint) => self.dispatcher.call(&endpoint, msg, timeout),
            Err(e) => Box::new(result(Err(unavailable(e)))),
        }
    }

    /// Resolves up to `count` endpoints via `find_multi_service` and fans
    /// `msg` out to each, fire-and-forget. Stops at the first delivery
    /// failure.
    pub fn multi_cast<K: Keyable + ?Sized>(
        &self,
        count: usize,
        service_type: &ServiceType,
        key: &K,
        msg: D::Message,
    ) -> ::Result<()>
    where
        D::Message: Clone,
    {
        let endpoints = track!(self
            .registry
            .find_multi_service(count, service_type, key)
            .map_err(unavailable))?;
        for endpoint in &endpoints {
            track!(self.dispatcher.cast(endpoint, msg.clone()))?;
        }
        Ok(())
    }

    /// Resolves up to `count` endpoints via `find_multi_service` and issues
    /// a parallel call to each, returning the full `(endpoint, result)` list
    /// once every call has completed or timed out (spec.md §4.4).
    pub fn multi_call<K: Keyable + ?Sized>(
        &self,
        count: usize,
        service_type: &ServiceType,
        key: &K,
        msg: D::Message,
        timeout: Option<Duration>,
    ) -> Box<Future<Item = Vec<(Endpoint, ::Result<D::Reply>)>, Error = Error> + Send>
    where
        D::Message: Clone,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let endpoints = match self.registry.find_multi_service(count, service_type, key) {
            Ok(endpoints) => endpoints,
            Err(e) => return Box::new(result(Err(unavailable(e)))),
        };
        // Each call is issued eagerly (mirroring `EndpointDispatcher::call`'s
        // own eager-send contract) while `self` is still borrowed; only the
        // already-owned replies are moved into the 'static join below.
        let calls: Vec<Box<Future<Item = (Endpoint, ::Result<D::Reply>), Error = Error> + Send>> = endpoints
            .into_iter()
            .map(|endpoint| {
                let reply = self.dispatcher.call(&endpoint, msg.clone(), timeout);
                let combined = reply.then(move |outcome| Ok::<_, Error>((endpoint, outcome)));
                Box::new(combined) as Box<Future<Item = (Endpoint, ::Result<D::Reply>), Error = Error> + Send>
            })
            .collect();
        Box::new(join_all(calls))
    }
}
