//! [`ServiceType`], the opaque tag partitioning the registry into independent
//! rings.
//!
//! [`ServiceType`]: ./struct.ServiceType.html
use std::fmt;

/// An opaque, hashable, equality-comparable tag that partitions endpoints
/// into independent rings. Canonically a short string such as `"uploader"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceType(String);
impl ServiceType {
    /// Makes a new `ServiceType` from any string-like value.
    pub fn new<S: Into<String>>(name: S) -> Self {
        ServiceType(name.into())
    }

    /// Returns the type tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl<'a> From<&'a str> for ServiceType {
    fn from(s: &'a str) -> Self {
        ServiceType::new(s)
    }
}
impl From<String> for ServiceType {
    fn from(s: String) -> Self {
        ServiceType::new(s)
    }
}
