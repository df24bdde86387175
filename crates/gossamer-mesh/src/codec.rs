//! Binary codec for topology gossip.
//!
//! An update is a self-delimiting concatenation of peer blocks. Each block
//! is the peer's summary followed by a length-prefixed sequence of
//! connection summaries. All integers are big-endian. The stream may end at
//! any block boundary; ending inside a block is an error, and an erroneous
//! update is rejected as a whole.

use bytes::{Buf, BufMut, BytesMut};

use gossamer_core::{PeerName, PeerShortId, PeerUid, SHORT_ID_SPACE};

use crate::connection::{Connection, ConnectionSummary};
use crate::error::MeshError;
use crate::peer::{Peer, PeerSummary};
use crate::Result;

/// Encodes one peer block: summary, then connection count and entries.
pub fn encode_peer_summary(
    buf: &mut BytesMut,
    summary: &PeerSummary,
    connections: &[ConnectionSummary],
) {
    buf.put_slice(&summary.name.as_bytes());
    put_string(buf, &summary.nickname);
    buf.put_u64(summary.uid.get());
    buf.put_u64(summary.version);
    match summary.short_id {
        Some(short_id) => {
            buf.put_u8(1);
            buf.put_u16(short_id.get());
        }
        None => {
            buf.put_u8(0);
            buf.put_u16(0);
        }
    }

    buf.put_u32(connections.len() as u32);
    for conn in connections {
        buf.put_slice(&conn.name.as_bytes());
        put_string(buf, &conn.tcp_addr);
        buf.put_u8(u8::from(conn.outbound));
        buf.put_u8(u8::from(conn.established));
    }
}

/// Encodes a registry record, deriving the connection entries from the
/// record's connection map.
pub(crate) fn encode_peer(buf: &mut BytesMut, peer: &Peer) {
    let connections: Vec<ConnectionSummary> = peer
        .connections
        .values()
        .map(|conn| ConnectionSummary {
            name: conn.remote(),
            tcp_addr: conn.remote_tcp_addr().to_owned(),
            outbound: conn.outbound(),
            established: conn.established(),
        })
        .collect();
    encode_peer_summary(buf, &peer.summary(), &connections);
}

/// Decodes a full update into its peer blocks.
///
/// # Errors
///
/// Returns a [`MeshError`] on mid-block truncation, invalid UTF-8, a flag
/// byte other than 0 or 1, or an out-of-range short id. Nothing is decoded
/// partially; callers discard the whole update on error.
pub fn decode_update(update: &[u8]) -> Result<Vec<(PeerSummary, Vec<ConnectionSummary>)>> {
    let mut buf = update;
    let mut blocks = Vec::new();
    while buf.has_remaining() {
        blocks.push(decode_peer(&mut buf)?);
    }
    Ok(blocks)
}

fn decode_peer(buf: &mut &[u8]) -> Result<(PeerSummary, Vec<ConnectionSummary>)> {
    let name = get_name(buf, "peer name")?;
    let nickname = get_string(buf, "nickname")?;

    if buf.remaining() < 8 + 8 + 1 + 2 {
        return Err(MeshError::Truncated("peer summary"));
    }
    let uid = PeerUid::from_u64(buf.get_u64());
    let version = buf.get_u64();
    let has_short_id = get_flag(buf.get_u8(), "has short id")?;
    let raw_short_id = buf.get_u16();
    if has_short_id && raw_short_id >= SHORT_ID_SPACE {
        return Err(MeshError::ShortIdOutOfRange(raw_short_id));
    }
    let short_id = has_short_id.then(|| PeerShortId::new(raw_short_id));

    if buf.remaining() < 4 {
        return Err(MeshError::Truncated("connection count"));
    }
    let count = buf.get_u32() as usize;
    let mut connections = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let name = get_name(buf, "connection name")?;
        let tcp_addr = get_string(buf, "connection address")?;
        if buf.remaining() < 2 {
            return Err(MeshError::Truncated("connection flags"));
        }
        let outbound = get_flag(buf.get_u8(), "outbound")?;
        let established = get_flag(buf.get_u8(), "established")?;
        connections.push(ConnectionSummary {
            name,
            tcp_addr,
            outbound,
            established,
        });
    }

    Ok((
        PeerSummary {
            name,
            nickname,
            uid,
            version,
            short_id,
        },
        connections,
    ))
}

fn put_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn get_string(buf: &mut &[u8], field: &'static str) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(MeshError::Truncated(field));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MeshError::Truncated(field));
    }
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| MeshError::InvalidString(field))?
        .to_owned();
    buf.advance(len);
    Ok(s)
}

fn get_name(buf: &mut &[u8], field: &'static str) -> Result<PeerName> {
    if buf.remaining() < PeerName::LEN {
        return Err(MeshError::Truncated(field));
    }
    let name = PeerName::from_bytes(&buf[..PeerName::LEN])?;
    buf.advance(PeerName::LEN);
    Ok(name)
}

fn get_flag(value: u8, field: &'static str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(MeshError::InvalidFlag { field, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> PeerName {
        s.parse().unwrap()
    }

    fn sample_block() -> (PeerSummary, Vec<ConnectionSummary>) {
        (
            PeerSummary {
                name: name("aa:bb:cc:dd:ee:01"),
                nickname: "larch".into(),
                uid: PeerUid::from_u64(0xdead_beef),
                version: 9,
                short_id: Some(PeerShortId::new(4001)),
            },
            vec![
                ConnectionSummary {
                    name: name("aa:bb:cc:dd:ee:02"),
                    tcp_addr: "10.0.0.2:6783".into(),
                    outbound: true,
                    established: true,
                },
                ConnectionSummary {
                    name: name("aa:bb:cc:dd:ee:03"),
                    tcp_addr: "10.0.0.3:6783".into(),
                    outbound: false,
                    established: false,
                },
            ],
        )
    }

    fn encode_blocks(blocks: &[(PeerSummary, Vec<ConnectionSummary>)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (summary, conns) in blocks {
            encode_peer_summary(&mut buf, summary, conns);
        }
        buf.to_vec()
    }

    #[test]
    fn empty_update_decodes_to_nothing() {
        assert_eq!(decode_update(&[]).unwrap(), vec![]);
    }

    #[test]
    fn single_block_round_trip() {
        let block = sample_block();
        let encoded = encode_blocks(std::slice::from_ref(&block));
        let decoded = decode_update(&encoded).unwrap();
        assert_eq!(decoded, vec![block]);
    }

    #[test]
    fn multi_block_round_trip_preserves_order() {
        let block_a = sample_block();
        let mut block_b = sample_block();
        block_b.0.name = name("aa:bb:cc:dd:ee:99");
        block_b.0.short_id = None;
        block_b.1.clear();

        let encoded = encode_blocks(&[block_a.clone(), block_b.clone()]);
        let decoded = decode_update(&encoded).unwrap();
        assert_eq!(decoded, vec![block_a, block_b]);
    }

    #[test]
    fn absent_short_id_round_trips() {
        let (mut summary, _) = sample_block();
        summary.short_id = None;
        let encoded = encode_blocks(&[(summary.clone(), vec![])]);
        let decoded = decode_update(&encoded).unwrap();
        assert_eq!(decoded[0].0.short_id, None);
    }

    #[test]
    fn truncation_at_every_boundary_is_an_error() {
        let block = sample_block();
        let encoded = encode_blocks(std::slice::from_ref(&block));
        // Every strict prefix except the empty one must fail: the stream
        // may only end on a block boundary.
        for len in 1..encoded.len() {
            assert!(
                decode_update(&encoded[..len]).is_err(),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn trailing_block_boundary_is_clean() {
        let block = sample_block();
        let mut encoded = encode_blocks(std::slice::from_ref(&block));
        let one = encoded.len();
        encoded.extend(encode_blocks(std::slice::from_ref(&block)));
        assert_eq!(decode_update(&encoded[..one]).unwrap().len(), 1);
        assert_eq!(decode_update(&encoded).unwrap().len(), 2);
    }

    #[test]
    fn invalid_flag_byte_is_rejected() {
        let (summary, _) = sample_block();
        let mut encoded = encode_blocks(&[(summary, vec![])]);
        // The short-id presence flag sits right after name, nickname, uid
        // and version.
        let flag_offset = 6 + 2 + "larch".len() + 8 + 8;
        encoded[flag_offset] = 2;
        assert!(matches!(
            decode_update(&encoded),
            Err(MeshError::InvalidFlag {
                field: "has short id",
                value: 2
            })
        ));
    }

    #[test]
    fn out_of_range_short_id_is_rejected() {
        let (summary, _) = sample_block();
        let mut encoded = encode_blocks(&[(summary, vec![])]);
        let sid_offset = 6 + 2 + "larch".len() + 8 + 8 + 1;
        encoded[sid_offset] = 0xff;
        encoded[sid_offset + 1] = 0xff;
        assert!(matches!(
            decode_update(&encoded),
            Err(MeshError::ShortIdOutOfRange(0xffff))
        ));
    }

    #[test]
    fn invalid_utf8_nickname_is_rejected() {
        let (summary, _) = sample_block();
        let mut encoded = encode_blocks(&[(summary, vec![])]);
        encoded[6 + 2] = 0xff; // first nickname byte
        assert!(matches!(
            decode_update(&encoded),
            Err(MeshError::InvalidString("nickname"))
        ));
    }
}
