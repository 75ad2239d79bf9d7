//! The `keyable` capability (spec.md §9): user supplies either bytes or
//! something that canonically serializes to bytes. The Ring Manager only
//! ever sees bytes.
use std::borrow::Cow;

/// Anything that can be turned into the bytes a ring lookup hashes.
pub trait Keyable {
    /// Returns the canonical bytes of this key.
    fn to_key_bytes(&self) -> Cow<[u8]>;
}
impl Keyable for [u8] {
    fn to_key_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self)
    }
}
impl Keyable for Vec<u8> {
    fn to_key_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self.as_slice())
    }
}
impl Keyable for str {
    fn to_key_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}
impl Keyable for String {
    fn to_key_bytes(&self) -> Cow<[u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}
impl<'a, T: Keyable + ?Sized> Keyable for &'a T {
    fn to_key_bytes(&self) -> Cow<[u8]> {
        (*self).to_key_bytes()
    }
}
