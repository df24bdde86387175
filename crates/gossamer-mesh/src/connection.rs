//! Connection descriptors exchanged through gossip.
//!
//! Connections carry peer *names*, never live peer references; anything that
//! needs the remote record resolves it through the registry. This keeps the
//! peer graph acyclic from an ownership point of view and lets connection
//! edges point at placeholders that have not been fully learned yet.

use gossamer_core::PeerName;
use serde::{Deserialize, Serialize};

/// The capability set the registry consumes from a transport connection.
pub trait Connection: Send + Sync {
    /// Name of the peer at the far end.
    fn remote(&self) -> PeerName;

    /// The remote's TCP address, as the transport dialed or accepted it.
    fn remote_tcp_addr(&self) -> &str;

    /// True if the local end initiated the connection.
    fn outbound(&self) -> bool;

    /// True if the connection has completed its handshake.
    fn established(&self) -> bool;
}

/// A connection re-materialized from gossip.
///
/// The registry stores one of these per connection edge it has learned
/// about. For edges of remote peers the data is second-hand: it describes a
/// connection some other node claims to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnection {
    local: PeerName,
    remote: PeerName,
    tcp_addr: String,
    outbound: bool,
    established: bool,
}

impl RemoteConnection {
    /// Creates a connection record between `local` and `remote`.
    #[must_use]
    pub fn new(
        local: PeerName,
        remote: PeerName,
        tcp_addr: impl Into<String>,
        outbound: bool,
        established: bool,
    ) -> Self {
        Self {
            local,
            remote,
            tcp_addr: tcp_addr.into(),
            outbound,
            established,
        }
    }

    /// Name of the peer at the near end.
    #[must_use]
    pub fn local(&self) -> PeerName {
        self.local
    }
}

impl Connection for RemoteConnection {
    fn remote(&self) -> PeerName {
        self.remote
    }

    fn remote_tcp_addr(&self) -> &str {
        &self.tcp_addr
    }

    fn outbound(&self) -> bool {
        self.outbound
    }

    fn established(&self) -> bool {
        self.established
    }
}

/// One decoded connection entry of a gossiped peer block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    /// Name of the remote peer.
    pub name: PeerName,
    /// The remote's TCP address.
    pub tcp_addr: String,
    /// Whether the owning peer initiated the connection.
    pub outbound: bool,
    /// Whether the connection is established.
    pub established: bool,
}
