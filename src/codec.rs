//! Wire encoding for [`Heartbeat`] payloads (spec.md §6), built on the same
//! `bytecodec` primitives the teacher's RPC layer frames its messages with.
//!
//! [`Heartbeat`]: ../gossip/struct.Heartbeat.html
use bytecodec::bytes::{BytesEncoder, RemainingBytesDecoder};
use bytecodec::{ByteCount, Decode, Encode, Eos, ErrorKind as BytecodecErrorKind, Result as BytecodecResult, SizedEncode};
use trackable::error::ErrorKindExt;

use endpoint::{Endpoint, LocalHandle, NodeId};
use gossip::Heartbeat;
use presence::{Meta, PresenceState};
use service_type::ServiceType;

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_be_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// Appends a length-prefixed byte field. Shared with [`ring_manager`]'s
/// small hand-rolled event codec, which does not need the full `bytecodec`
/// machinery [`Heartbeat`] framing does.
///
/// [`ring_manager`]: ../ring_manager/index.html
/// [`Heartbeat`]: ../gossip/struct.Heartbeat.html
pub(crate) fn write_u32_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    write_bytes(out, bytes)
}

/// Reads a length-prefixed byte field starting at `pos`, returning the
/// field and the position just past it.
pub(crate) fn read_u32_prefixed(bytes: &[u8], pos: usize) -> ::Result<(&[u8], usize)> {
    track_assert!(
        bytes.len() >= pos + 4,
        ::ErrorKind::InvalidInput,
        "truncated field: expected a u32 length prefix"
    );
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&bytes[pos..pos + 4]);
    let len = u32::from_be_bytes(len_buf) as usize;
    let start = pos + 4;
    track_assert!(
        bytes.len() >= start + len,
        ::ErrorKind::InvalidInput,
        "truncated field: declared length exceeds remaining bytes"
    );
    Ok((&bytes[start..start + len], start + len))
}

/// Serializes a [`Heartbeat`] to its canonical on-wire representation:
/// length-prefixed sender `node_id`, a `u32` entry count, then per entry a
/// length-prefixed `service_type`, length-prefixed endpoint `node_id` and
/// `local_handle`, a one-byte presence state (`0` online, `1` offline) and
/// an eight-byte big-endian `phx_ref`.
///
/// [`Heartbeat`]: ../gossip/struct.Heartbeat.html
pub fn encode_heartbeat(heartbeat: &Heartbeat) -> Vec<u8> {
    let mut out = Vec::new();
    write_bytes(&mut out, heartbeat.node_id().as_str().as_bytes());
    write_u32(&mut out, heartbeat.entries().len() as u32);
    for (ty, endpoint, meta) in heartbeat.entries() {
        write_bytes(&mut out, ty.as_str().as_bytes());
        write_bytes(&mut out, endpoint.node_id().as_str().as_bytes());
        write_bytes(&mut out, endpoint.local_handle().as_bytes());
        out.push(match meta.state() {
            PresenceState::Online => 0,
            PresenceState::Offline => 1,
        });
        out.extend_from_slice(&meta.phx_ref().to_be_bytes());
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}
impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn read_u32(&mut self) -> ::Result<u32> {
        track_assert!(
            self.bytes.len() >= self.pos + 4,
            ::ErrorKind::InvalidInput,
            "truncated heartbeat: expected a u32 length prefix"
        );
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> ::Result<u64> {
        track_assert!(
            self.bytes.len() >= self.pos + 8,
            ::ErrorKind::InvalidInput,
            "truncated heartbeat: expected a phx_ref"
        );
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_u8(&mut self) -> ::Result<u8> {
        track_assert!(
            self.bytes.len() > self.pos,
            ::ErrorKind::InvalidInput,
            "truncated heartbeat: expected a presence-state byte"
        );
        let b = self.bytes[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self) -> ::Result<&'a [u8]> {
        let len = track!(self.read_u32())? as usize;
        track_assert!(
            self.bytes.len() >= self.pos + len,
            ::ErrorKind::InvalidInput,
            "truncated heartbeat: declared length exceeds remaining bytes"
        );
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_string(&mut self) -> ::Result<String> {
        let bytes = track!(self.read_bytes())?;
        track!(::std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| ::ErrorKind::InvalidInput.cause(e).into()))
    }
}

/// Parses a [`Heartbeat`] out of bytes produced by [`encode_heartbeat`],
/// rejecting truncated or otherwise malformed input.
///
/// [`Heartbeat`]: ../gossip/struct.Heartbeat.html
pub fn decode_heartbeat(bytes: &[u8]) -> ::Result<Heartbeat> {
    let mut reader = Reader::new(bytes);
    let node_id = NodeId::new(track!(reader.read_string())?);
    let count = track!(reader.read_u32())? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let ty = ServiceType::new(track!(reader.read_string())?);
        let endpoint_node = NodeId::new(track!(reader.read_string())?);
        let handle = LocalHandle::new(track!(reader.read_bytes())?.to_vec());
        let state = match track!(reader.read_u8())? {
            0 => PresenceState::Online,
            1 => PresenceState::Offline,
            other => {
                track_panic!(
                    ::ErrorKind::InvalidInput,
                    "unknown presence state discriminant: {}",
                    other
                );
            }
        };
        let phx_ref = track!(reader.read_u64())?;
        entries.push((
            ty,
            Endpoint::new(endpoint_node, handle),
            Meta::new(node_id.clone(), state, phx_ref),
        ));
    }
    Ok(Heartbeat::new(node_id, entries))
}

/// A `bytecodec` encoder for [`Heartbeat`] frames.
///
/// [`Heartbeat`]: ../gossip/struct.Heartbeat.html
#[derive(Debug, Default)]
pub struct HeartbeatEncoder(BytesEncoder<Vec<u8>>);
impl Encode for HeartbeatEncoder {
    type Item = Heartbeat;

    fn encode(&mut self, buf: &mut [u8], eos: Eos) -> BytecodecResult<usize> {
        track!(self.0.encode(buf, eos))
    }

    fn start_encoding(&mut self, item: Self::Item) -> BytecodecResult<()> {
        track!(self.0.start_encoding(encode_heartbeat(&item)))
    }

    fn requiring_bytes(&self) -> ByteCount {
        self.0.requiring_bytes()
    }

    fn is_idle(&self) -> bool {
        self.0.is_idle()
    }
}
impl SizedEncode for HeartbeatEncoder {
    fn exact_requiring_bytes(&self) -> u64 {
        self.0.exact_requiring_bytes()
    }
}

/// A `bytecodec` decoder for [`Heartbeat`] frames.
///
/// [`Heartbeat`]: ../gossip/struct.Heartbeat.html
#[derive(Debug, Default)]
pub struct HeartbeatDecoder(RemainingBytesDecoder);
impl Decode for HeartbeatDecoder {
    type Item = Heartbeat;

    fn decode(&mut self, buf: &[u8], eos: Eos) -> BytecodecResult<usize> {
        track!(self.0.decode(buf, eos))
    }

    fn finish_decoding(&mut self) -> BytecodecResult<Self::Item> {
        let bytes = track!(self.0.finish_decoding())?;
        decode_heartbeat(&bytes).map_err(|e| BytecodecErrorKind::InvalidInput.cause(e).into())
    }

    fn requiring_bytes(&self) -> ByteCount {
        self.0.requiring_bytes()
    }

    fn is_idle(&self) -> bool {
        self.0.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endpoint::LocalHandle;

    #[test]
    fn round_trips_an_empty_heartbeat() {
        let hb = Heartbeat::new(NodeId::new("n1"), Vec::new());
        let bytes = encode_heartbeat(&hb);
        let decoded = decode_heartbeat(&bytes).expect("decodes");
        assert_eq!(decoded.node_id(), hb.node_id());
        assert!(decoded.entries().is_empty());
    }

    #[test]
    fn round_trips_entries() {
        let entry = (
            ServiceType::new("uploader"),
            Endpoint::new(NodeId::new("n2"), LocalHandle::from("worker-1")),
            Meta::new(NodeId::new("n1"), PresenceState::Online, 7),
        );
        let hb = Heartbeat::new(NodeId::new("n1"), vec![entry.clone()]);
        let decoded = decode_heartbeat(&encode_heartbeat(&hb)).expect("decodes");
        assert_eq!(decoded.entries(), &[entry]);
    }

    #[test]
    fn rejects_truncated_input() {
        let hb = Heartbeat::new(
            NodeId::new("n1"),
            vec![(
                ServiceType::new("t"),
                Endpoint::new(NodeId::new("n2"), LocalHandle::from("h")),
                Meta::new(NodeId::new("n1"), PresenceState::Online, 1),
            )],
        );
        let mut bytes = encode_heartbeat(&hb);
        bytes.truncate(bytes.len() - 1);
        assert!(decode_heartbeat(&bytes).is_err());
    }
}
