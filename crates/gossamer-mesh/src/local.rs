//! The local peer's identity and broadcast trigger.

use std::sync::Arc;

use gossamer_core::{PeerName, PeerShortId, PeerUid};
use parking_lot::RwLock;

use crate::peer::Peer;

type BroadcastFn = Arc<dyn Fn() + Send + Sync>;

/// The distinguished local peer.
///
/// Carries the identity the registry seeds itself with and the hook the
/// gossip layer installs to have local-peer changes rebroadcast. The live
/// record itself (current version, current short id, connections) is owned
/// by the registry like any other peer's.
pub struct LocalPeer {
    name: PeerName,
    uid: PeerUid,
    nickname: String,
    short_id: PeerShortId,
    on_broadcast: RwLock<Option<BroadcastFn>>,
}

impl LocalPeer {
    /// Creates a local peer with a fresh incarnation nonce and a random
    /// startup short id.
    #[must_use]
    pub fn new(name: PeerName, nickname: impl Into<String>) -> Self {
        Self::with_short_id(name, nickname, PeerShortId::random())
    }

    /// Creates a local peer claiming a specific startup short id.
    #[must_use]
    pub fn with_short_id(
        name: PeerName,
        nickname: impl Into<String>,
        short_id: PeerShortId,
    ) -> Self {
        Self {
            name,
            uid: PeerUid::random(),
            nickname: nickname.into(),
            short_id,
            on_broadcast: RwLock::new(None),
        }
    }

    /// The local peer's name.
    #[must_use]
    pub fn name(&self) -> PeerName {
        self.name
    }

    /// The local peer's incarnation nonce.
    #[must_use]
    pub fn uid(&self) -> PeerUid {
        self.uid
    }

    /// The local peer's nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Installs the broadcast trigger. Replaces any previous hook.
    pub fn on_broadcast(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_broadcast.write() = Some(Arc::new(hook));
    }

    /// Fires the broadcast trigger, if one is installed.
    ///
    /// Called by the registry after its lock is released, so the hook may
    /// call back into the registry.
    pub fn broadcast_peer_update(&self) {
        let hook = self.on_broadcast.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Builds the initial registry record for this peer.
    pub(crate) fn to_peer(&self) -> Peer {
        Peer::new(
            self.name,
            self.nickname.clone(),
            self.uid,
            0,
            Some(self.short_id),
        )
    }
}

impl std::fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPeer")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("nickname", &self.nickname)
            .field("short_id", &self.short_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn broadcast_without_hook_is_a_no_op() {
        let local = LocalPeer::new("aa:bb:cc:00:00:01".parse().unwrap(), "larch");
        local.broadcast_peer_update();
    }

    #[test]
    fn broadcast_fires_installed_hook() {
        let local = LocalPeer::new("aa:bb:cc:00:00:01".parse().unwrap(), "larch");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        local.on_broadcast(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        local.broadcast_peer_update();
        local.broadcast_peer_update();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
