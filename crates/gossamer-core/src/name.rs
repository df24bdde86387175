//! Peer identity types.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of significant bits in a [`PeerShortId`].
pub const SHORT_ID_BITS: u32 = 12;

/// Size of the short id space (4096 slots).
pub const SHORT_ID_SPACE: u16 = 1 << SHORT_ID_BITS;

/// A 48-bit peer identifier, written like a MAC address.
///
/// Names are unique across a peer's lifetime of participation in the mesh
/// and totally ordered by their integer value; the ordering is used as the
/// deterministic tie-break when short ids collide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerName(u64);

impl PeerName {
    /// The length of a peer name in binary form.
    pub const LEN: usize = 6;

    /// Parses a peer name from its 6-byte big-endian binary form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNameBytes`] if `bytes` is not exactly six
    /// bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(Error::InvalidNameBytes { len: bytes.len() });
        }
        let mut value = 0u64;
        for &b in bytes {
            value = value << 8 | u64::from(b);
        }
        Ok(Self(value))
    }

    /// Returns the 6-byte big-endian binary form.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; Self::LEN] {
        let be = self.0.to_be_bytes();
        [be[2], be[3], be[4], be[5], be[6], be[7]]
    }
}

impl FromStr for PeerName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut value = 0u64;
        let mut count = 0usize;
        for part in s.split(':') {
            count += 1;
            if count > Self::LEN {
                return Err(Error::invalid_peer_name(s, "too many parts"));
            }
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::invalid_peer_name(
                    s,
                    "expected six colon-separated hex bytes",
                ));
            }
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::invalid_peer_name(s, "invalid hex byte"))?;
            value = value << 8 | u64::from(byte);
        }
        if count != Self::LEN {
            return Err(Error::invalid_peer_name(s, "too few parts"));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.as_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerName({self})")
    }
}

/// A 12-bit peer alias used in hot-path wire encodings.
///
/// Short ids are not globally unique; collisions are resolved locally by
/// the registry, with the lowest [`PeerName`] winning the slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerShortId(u16);

impl PeerShortId {
    /// The highest representable short id.
    pub const MAX: PeerShortId = PeerShortId(SHORT_ID_SPACE - 1);

    /// Creates a short id, masking the raw value down to 12 bits.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw & (SHORT_ID_SPACE - 1))
    }

    /// Draws a uniformly random short id.
    #[must_use]
    pub fn random() -> Self {
        Self::new(rand::thread_rng().gen_range(0..SHORT_ID_SPACE))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PeerShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerShortId({})", self.0)
    }
}

/// A 64-bit incarnation nonce.
///
/// A fresh uid is drawn every time a peer (re)starts, so two incarnations
/// of the same [`PeerName`] can be told apart. Zero is reserved for
/// placeholder records.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerUid(u64);

impl PeerUid {
    /// The placeholder uid.
    pub const ZERO: PeerUid = PeerUid(0);

    /// Creates a uid from a raw value.
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Draws a random non-zero uid.
    #[must_use]
    pub fn random() -> Self {
        loop {
            let uid = rand::thread_rng().next_u64();
            if uid != 0 {
                return Self(uid);
            }
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true if this is the placeholder uid.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PeerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerUid({:016x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_parses_canonical_form() {
        let name: PeerName = "de:ad:be:ef:00:01".parse().unwrap();
        assert_eq!(name.as_bytes(), [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
    }

    #[test]
    fn name_parse_is_case_insensitive() {
        let lower: PeerName = "de:ad:be:ef:00:01".parse().unwrap();
        let upper: PeerName = "DE:AD:BE:EF:00:01".parse().unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn name_displays_lowercase() {
        let name: PeerName = "DE:AD:BE:EF:00:01".parse().unwrap();
        assert_eq!(name.to_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn name_rejects_malformed_input() {
        for bad in [
            "",
            "de:ad:be:ef:00",
            "de:ad:be:ef:00:01:02",
            "de:ad:be:ef:00:0g",
            "dead:be:ef:00:01",
            "d:ad:be:ef:00:01",
            "de-ad-be-ef-00-01",
        ] {
            assert!(bad.parse::<PeerName>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn name_binary_round_trip() {
        let name: PeerName = "02:00:00:02:00:00".parse().unwrap();
        let recovered = PeerName::from_bytes(&name.as_bytes()).unwrap();
        assert_eq!(name, recovered);
    }

    #[test]
    fn name_rejects_wrong_byte_length() {
        assert_eq!(
            PeerName::from_bytes(&[1, 2, 3]),
            Err(crate::Error::InvalidNameBytes { len: 3 })
        );
    }

    #[test]
    fn name_ordering_matches_integer_value() {
        let low: PeerName = "00:00:00:00:00:01".parse().unwrap();
        let high: PeerName = "ff:00:00:00:00:00".parse().unwrap();
        assert!(low < high);
    }

    #[test]
    fn short_id_masks_to_twelve_bits() {
        assert_eq!(PeerShortId::new(0xffff).get(), 0x0fff);
        assert_eq!(PeerShortId::new(4096).get(), 0);
        assert_eq!(PeerShortId::new(7).get(), 7);
    }

    #[test]
    fn short_id_random_is_in_range() {
        for _ in 0..100 {
            assert!(PeerShortId::random().get() < SHORT_ID_SPACE);
        }
    }

    #[test]
    fn uid_random_is_nonzero() {
        for _ in 0..100 {
            assert!(!PeerUid::random().is_zero());
        }
    }

    #[test]
    fn uid_zero_is_placeholder() {
        assert!(PeerUid::ZERO.is_zero());
        assert!(!PeerUid::from_u64(42).is_zero());
    }
}
