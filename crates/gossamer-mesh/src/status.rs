//! Read-only topology snapshots for status surfaces.
//!
//! Embedders (HTTP status pages, CLIs) want a stable, serializable view of
//! the topology without reaching into registry internals. These structs are
//! that view; they are gathered under the registry's read lock and sorted
//! so output is deterministic.

use gossamer_core::{PeerName, PeerShortId, PeerUid};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::peer::Peer;
use crate::peers::Peers;

/// Snapshot of one peer and its known connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// The peer's name.
    pub name: PeerName,
    /// The peer's nickname.
    pub nickname: String,
    /// Incarnation nonce.
    pub uid: PeerUid,
    /// Topology version.
    pub version: u64,
    /// The short id the peer claims, if any.
    pub short_id: Option<PeerShortId>,
    /// Connections, sorted by remote name.
    pub connections: Vec<ConnectionStatus>,
}

/// Snapshot of one connection edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Name of the remote peer.
    pub name: PeerName,
    /// The remote's TCP address.
    pub address: String,
    /// Whether the owning peer initiated the connection.
    pub outbound: bool,
    /// Whether the connection is established.
    pub established: bool,
}

impl PeerStatus {
    /// Gathers a snapshot of every known peer, sorted by name.
    pub fn gather(peers: &Peers) -> Vec<PeerStatus> {
        let mut statuses = Vec::new();
        peers.for_each(|peer| statuses.push(PeerStatus::from_peer(peer)));
        statuses.sort_by_key(|status| status.name);
        statuses
    }

    fn from_peer(peer: &Peer) -> PeerStatus {
        let mut connections: Vec<ConnectionStatus> = peer
            .connections()
            .values()
            .map(|conn| ConnectionStatus {
                name: conn.remote(),
                address: conn.remote_tcp_addr().to_owned(),
                outbound: conn.outbound(),
                established: conn.established(),
            })
            .collect();
        connections.sort_by_key(|conn| conn.name);

        PeerStatus {
            name: peer.name(),
            nickname: peer.nickname().to_owned(),
            uid: peer.uid(),
            version: peer.version(),
            short_id: peer.short_id(),
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalPeer;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn gather_reports_the_local_peer() {
        let local = Arc::new(LocalPeer::with_short_id(
            "aa:00:00:00:00:01".parse().unwrap(),
            "larch",
            PeerShortId::new(7),
        ));
        let peers = Peers::new(local.clone());

        let statuses = PeerStatus::gather(&peers);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, local.name());
        assert_eq!(statuses[0].nickname, "larch");
        assert_eq!(statuses[0].short_id, Some(PeerShortId::new(7)));
        assert_eq!(statuses[0].connections, vec![]);
    }

    #[test]
    fn statuses_serialize_to_json() {
        let local = Arc::new(LocalPeer::with_short_id(
            "aa:00:00:00:00:01".parse().unwrap(),
            "larch",
            PeerShortId::new(7),
        ));
        let peers = Peers::new(local);

        let statuses = PeerStatus::gather(&peers);
        let json = serde_json::to_string(&statuses).unwrap();
        let parsed: Vec<PeerStatus> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, statuses);
    }
}
