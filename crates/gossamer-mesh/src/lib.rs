//! Peer topology registry for the gossamer mesh.
//!
//! This crate holds the authoritative in-process view of every peer the
//! local node knows about (including itself), the directed connections
//! between those peers, and the short-id table used for compact wire
//! encodings. Topology updates gossip between nodes as binary peer blocks;
//! [`Peers::apply_update`] merges them monotonically and reports which part
//! of the update actually improved local knowledge, so the gossip layer can
//! rebroadcast just that.

mod codec;
mod connection;
mod error;
mod local;
mod peer;
mod peers;
mod status;

pub use codec::{decode_update, encode_peer_summary};
pub use connection::{Connection, ConnectionSummary, RemoteConnection};
pub use error::MeshError;
pub use local::LocalPeer;
pub use peer::{Peer, PeerSummary};
pub use peers::{PeerNameSet, Peers};
pub use status::{ConnectionStatus, PeerStatus};

pub use gossamer_core::{PeerName, PeerShortId, PeerUid, SHORT_ID_BITS, SHORT_ID_SPACE};

/// A specialized Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
