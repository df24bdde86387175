//! # Gossamer Core
//!
//! Identity primitives for the gossamer mesh.
//!
//! Every participant in the mesh is identified by a [`PeerName`], a 48-bit
//! value written like a MAC address. A [`PeerUid`] distinguishes incarnations
//! of the same name across restarts, and a [`PeerShortId`] is the 12-bit
//! alias used in hot-path wire encodings.
//!
//! ## Example
//!
//! ```rust
//! use gossamer_core::PeerName;
//!
//! let name: PeerName = "de:ad:be:ef:00:01".parse().unwrap();
//! assert_eq!(name.to_string(), "de:ad:be:ef:00:01");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod name;

pub use error::{Error, Result};
pub use name::{PeerName, PeerShortId, PeerUid, SHORT_ID_BITS, SHORT_ID_SPACE};
