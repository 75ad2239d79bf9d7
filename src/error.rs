use fibers_rpc;
use std;
use trackable::error::{ErrorKind as TrackableErrorKind, ErrorKindExt, TrackableError};

/// This crate specific `Error` type.
#[derive(Debug, Clone)]
pub struct Error(TrackableError<ErrorKind>);
derive_traits_for_trackable_error_newtype!(Error, ErrorKind);
impl From<std::sync::mpsc::RecvError> for Error {
    fn from(f: std::sync::mpsc::RecvError) -> Self {
        ErrorKind::Other.cause(f).into()
    }
}
impl From<fibers_rpc::Error> for Error {
    fn from(f: fibers_rpc::Error) -> Self {
        ErrorKind::TransportError.takes_over(f).into()
    }
}

/// Possible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `enable_service`/`disable_service`/`update` on an endpoint this node
    /// does not own (no prior `add_service`), or conflicting ownership of a
    /// `(type, endpoint)` coordinate.
    NotRegistered,

    /// The Ring Manager could not resolve a key: the type's ring is absent
    /// or empty.
    NoServiceForKey,

    /// Client-sugar delivery gave up resolving an endpoint.
    ServiceUnavailable,

    /// A `call`/`multi_call` deadline elapsed before a reply arrived.
    Timeout,

    /// The pub/sub transport failed to accept a broadcast or direct
    /// broadcast. Never fatal: gossip is self-healing on the next tick.
    TransportError,

    /// Input is invalid (malformed heartbeat, empty key, endpoint not
    /// addressed to this node, ...).
    InvalidInput,

    /// The local replica observed state it should be impossible to reach,
    /// or a command was sent to an actor that has already shut down.
    InconsistentState,

    /// Other errors.
    Other,
}
impl TrackableErrorKind for ErrorKind {}
