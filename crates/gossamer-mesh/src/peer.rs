//! Peer records and summaries.

use std::collections::HashMap;

use gossamer_core::{PeerName, PeerShortId, PeerUid};
use serde::{Deserialize, Serialize};

use crate::connection::RemoteConnection;

/// The gossiped snapshot of a peer's identity.
///
/// `version` is a monotone counter the owning peer bumps whenever its own
/// summary or connections change; together with `uid` it drives the
/// dominance order used during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    /// The peer's name.
    pub name: PeerName,
    /// Human-readable nickname, chosen by the peer itself.
    pub nickname: String,
    /// Incarnation nonce.
    pub uid: PeerUid,
    /// Topology version of this peer's own state.
    pub version: u64,
    /// The short id the peer claims, if any.
    pub short_id: Option<PeerShortId>,
}

/// A peer as tracked by the registry.
///
/// Records are mutated in place by reconciliation and only by it; everything
/// else reads snapshots. `local_ref_count` pins the peer against garbage
/// collection on behalf of local callers that hold no connection to it.
#[derive(Debug, Clone)]
pub struct Peer {
    pub(crate) name: PeerName,
    pub(crate) nickname: String,
    pub(crate) uid: PeerUid,
    pub(crate) version: u64,
    pub(crate) short_id: Option<PeerShortId>,
    pub(crate) connections: HashMap<PeerName, RemoteConnection>,
    pub(crate) local_ref_count: u64,
}

impl Peer {
    /// Creates a peer record with no connections.
    #[must_use]
    pub fn new(
        name: PeerName,
        nickname: impl Into<String>,
        uid: PeerUid,
        version: u64,
        short_id: Option<PeerShortId>,
    ) -> Self {
        Self {
            name,
            nickname: nickname.into(),
            uid,
            version,
            short_id,
            connections: HashMap::new(),
            local_ref_count: 0,
        }
    }

    /// Builds a record from a decoded summary.
    #[must_use]
    pub fn from_summary(summary: PeerSummary) -> Self {
        Self {
            name: summary.name,
            nickname: summary.nickname,
            uid: summary.uid,
            version: summary.version,
            short_id: summary.short_id,
            connections: HashMap::new(),
            local_ref_count: 0,
        }
    }

    /// Builds a placeholder record for a name only known as a connection
    /// target.
    ///
    /// Placeholders carry zero version, zero uid and no short id; they are
    /// either upgraded by a later gossip or garbage-collected.
    #[must_use]
    pub fn placeholder(name: PeerName) -> Self {
        Self::new(name, "", PeerUid::ZERO, 0, None)
    }

    /// The peer's name.
    #[must_use]
    pub fn name(&self) -> PeerName {
        self.name
    }

    /// The peer's nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// The peer's incarnation nonce.
    #[must_use]
    pub fn uid(&self) -> PeerUid {
        self.uid
    }

    /// The peer's topology version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The short id the peer claims, if any.
    #[must_use]
    pub fn short_id(&self) -> Option<PeerShortId> {
        self.short_id
    }

    /// The peer's known connections, keyed by remote name.
    #[must_use]
    pub fn connections(&self) -> &HashMap<PeerName, RemoteConnection> {
        &self.connections
    }

    /// True if this record is still an unlearned placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.uid.is_zero() && self.version == 0
    }

    /// Projects the summary back out of the record.
    #[must_use]
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            name: self.name,
            nickname: self.nickname.clone(),
            uid: self.uid,
            version: self.version,
            short_id: self.short_id,
        }
    }

    /// Raises `version` strictly above `seen`, returning whether it changed.
    ///
    /// Used when an old incarnation of the local peer is found circulating:
    /// our next broadcast must supersede it everywhere.
    pub fn bump_version_beyond(&mut self, seen: u64) -> bool {
        if seen >= self.version {
            self.version = seen + 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> PeerName {
        s.parse().unwrap()
    }

    #[test]
    fn placeholder_is_zeroed() {
        let peer = Peer::placeholder(name("aa:bb:cc:dd:ee:ff"));
        assert!(peer.is_placeholder());
        assert_eq!(peer.uid(), PeerUid::ZERO);
        assert_eq!(peer.version(), 0);
        assert_eq!(peer.short_id(), None);
        assert!(peer.connections().is_empty());
    }

    #[test]
    fn summary_round_trips_through_record() {
        let summary = PeerSummary {
            name: name("aa:bb:cc:dd:ee:ff"),
            nickname: "larch".into(),
            uid: PeerUid::from_u64(77),
            version: 12,
            short_id: Some(PeerShortId::new(9)),
        };
        let peer = Peer::from_summary(summary.clone());
        assert_eq!(peer.summary(), summary);
    }

    #[test]
    fn bump_version_beyond_only_moves_forward() {
        let mut peer = Peer::new(
            name("aa:bb:cc:dd:ee:ff"),
            "larch",
            PeerUid::from_u64(1),
            10,
            None,
        );

        assert!(!peer.bump_version_beyond(5));
        assert_eq!(peer.version(), 10);

        assert!(peer.bump_version_beyond(10));
        assert_eq!(peer.version(), 11);

        assert!(peer.bump_version_beyond(42));
        assert_eq!(peer.version(), 43);
    }
}
