//! The peer topology registry.
//!
//! A single reader/writer lock guards the whole registry: the name table,
//! the short-id table and the callback lists. Every mutation accumulates a
//! `PendingNotifications` while holding the write lock and fires callbacks
//! only after releasing it, so callbacks are free to call back in.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{RwLock, RwLockWriteGuard};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, error, warn};

use gossamer_core::{PeerName, PeerShortId, PeerUid, SHORT_ID_SPACE};

use crate::codec::{decode_update, encode_peer};
use crate::connection::{Connection, ConnectionSummary, RemoteConnection};
use crate::local::LocalPeer;
use crate::peer::{Peer, PeerSummary};
use crate::Result;

/// A set of peer names.
pub type PeerNameSet = HashSet<PeerName>;

type GcCallback = Arc<dyn Fn(&Peer) + Send + Sync>;
type InvalidateCallback = Arc<dyn Fn() + Send + Sync>;

/// All known peers in the mesh, including ourself.
pub struct Peers {
    ourself: Arc<LocalPeer>,
    inner: RwLock<PeersInner>,
}

struct PeersInner {
    local_name: PeerName,
    by_name: HashMap<PeerName, Peer>,
    by_short_id: HashMap<PeerShortId, ShortIdEntry>,
    on_gc: Vec<GcCallback>,
    on_invalidate_short_ids: Vec<InvalidateCallback>,
}

/// Occupancy of one short-id slot.
///
/// `principal` is the peer that owns the slot: the lowest name among the
/// peers currently claiming this short id. A freed entry keeps its slot in
/// the table with `principal: None` so that later reuse can be detected and
/// invalidated.
#[derive(Debug, Default, Clone)]
struct ShortIdEntry {
    principal: Option<PeerName>,
    others: Vec<PeerName>,
}

/// Work queued under the write lock, acted on after it is released.
#[derive(Default)]
struct PendingNotifications {
    /// Peers removed by garbage collection.
    removed: Vec<Peer>,
    /// The short id to principal mapping changed.
    invalidate_short_ids: bool,
    /// The local peer lost its slot and needs a new short id.
    reassign_local_short_id: bool,
    /// The local peer's own record changed and should be rebroadcast.
    local_peer_modified: bool,
}

impl Peers {
    /// Creates a registry seeded with the local peer.
    ///
    /// The local record is pinned with one reference and is never garbage
    /// collected.
    #[must_use]
    pub fn new(ourself: Arc<LocalPeer>) -> Self {
        let peers = Self {
            inner: RwLock::new(PeersInner {
                local_name: ourself.name(),
                by_name: HashMap::new(),
                by_short_id: HashMap::new(),
                on_gc: Vec::new(),
                on_invalidate_short_ids: Vec::new(),
            }),
            ourself: ourself.clone(),
        };
        peers.fetch_with_default(ourself.to_peer());
        peers
    }

    /// The local peer.
    #[must_use]
    pub fn ourself(&self) -> &Arc<LocalPeer> {
        &self.ourself
    }

    /// Registers a callback invoked with every garbage-collected peer.
    ///
    /// Callbacks are never removed and run outside the registry lock.
    pub fn on_gc(&self, callback: impl Fn(&Peer) + Send + Sync + 'static) {
        self.inner.write().on_gc.push(Arc::new(callback));
    }

    /// Registers a callback invoked whenever the short id to peer mapping
    /// changes.
    pub fn on_invalidate_short_ids(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner
            .write()
            .on_invalidate_short_ids
            .push(Arc::new(callback));
    }

    /// Returns the registered peer with this name, inserting the argument
    /// if there is none. Either way the returned peer's reference count is
    /// incremented; pair every call with one [`Peers::dereference`].
    pub fn fetch_with_default(&self, peer: Peer) -> Peer {
        let mut inner = self.inner.write();
        let mut pending = PendingNotifications::default();

        let name = peer.name();
        if !inner.by_name.contains_key(&name) {
            let short_id = peer.short_id();
            inner.by_name.insert(name, peer);
            inner.add_by_short_id(name, short_id, &mut pending);
        }
        let stored = inner
            .by_name
            .get_mut(&name)
            .expect("peer registered just above");
        stored.local_ref_count += 1;
        let snapshot = stored.clone();

        self.unlock_and_notify(inner, pending);
        snapshot
    }

    /// Returns the peer with this name without touching its reference
    /// count.
    #[must_use]
    pub fn fetch(&self, name: PeerName) -> Option<Peer> {
        self.inner.read().by_name.get(&name).cloned()
    }

    /// Returns the principal peer for this short id.
    #[must_use]
    pub fn fetch_by_short_id(&self, short_id: PeerShortId) -> Option<Peer> {
        let inner = self.inner.read();
        let name = inner.by_short_id.get(&short_id)?.principal?;
        inner.by_name.get(&name).cloned()
    }

    /// Returns the peer with this name and increments its reference count,
    /// or `None` if it is unknown. Pair with one [`Peers::dereference`].
    pub fn fetch_and_add_ref(&self, name: PeerName) -> Option<Peer> {
        let mut inner = self.inner.write();
        let peer = inner.by_name.get_mut(&name)?;
        peer.local_ref_count += 1;
        Some(peer.clone())
    }

    /// Releases one reference on the named peer.
    ///
    /// Never removes the peer; that is garbage collection's job. An
    /// underflow is an invariant violation: it panics in debug builds and
    /// is clamped and logged in release builds.
    pub fn dereference(&self, name: PeerName) {
        let mut inner = self.inner.write();
        match inner.by_name.get_mut(&name) {
            Some(peer) if peer.local_ref_count > 0 => peer.local_ref_count -= 1,
            Some(_) => {
                debug_assert!(false, "reference count underflow for {name}");
                error!(peer = %name, "dereference of peer with zero reference count");
            }
            None => {
                debug_assert!(false, "dereference of unknown peer {name}");
                error!(peer = %name, "dereference of unknown peer");
            }
        }
    }

    /// Applies `f` to every known peer under the read lock.
    ///
    /// `f` must not call back into the registry.
    pub fn for_each(&self, mut f: impl FnMut(&Peer)) {
        let inner = self.inner.read();
        for peer in inner.by_name.values() {
            f(peer);
        }
    }

    /// Returns the set of all known peer names.
    #[must_use]
    pub fn names(&self) -> PeerNameSet {
        self.inner.read().by_name.keys().copied().collect()
    }

    /// Encodes the known peers whose names appear in `names`.
    ///
    /// Unknown names are skipped. The order of blocks in the output is not
    /// externally guaranteed.
    #[must_use]
    pub fn encode_peers(&self, names: &PeerNameSet) -> Bytes {
        let inner = self.inner.read();
        let mut buf = BytesMut::new();
        for name in names {
            if let Some(peer) = inner.by_name.get(name) {
                encode_peer(&mut buf, peer);
            }
        }
        buf.freeze()
    }

    /// Merges an incoming update with the local topology.
    ///
    /// Unknown peers are added, known peers are advanced if the update
    /// dominates what we have, and names only mentioned as connection
    /// targets get placeholder records. Returns the set of names the update
    /// carried and the subset that actually improved local knowledge; the
    /// gossip layer rebroadcasts the latter.
    ///
    /// # Errors
    ///
    /// Returns the decode error unchanged if the update is malformed; the
    /// registry is untouched in that case.
    pub fn apply_update(&self, update: &[u8]) -> Result<(PeerNameSet, PeerNameSet)> {
        let decoded = decode_update(update)?;

        let mut inner = self.inner.write();
        let mut pending = PendingNotifications::default();

        // Insert peers hitherto unknown to us.
        let mut just_inserted = PeerNameSet::new();
        for (summary, _) in &decoded {
            if !inner.by_name.contains_key(&summary.name) {
                inner
                    .by_name
                    .insert(summary.name, Peer::from_summary(summary.clone()));
                inner.add_by_short_id(summary.name, summary.short_id, &mut pending);
                just_inserted.insert(summary.name);
            }
        }

        // Connection targets we know nothing about get placeholders, so
        // every edge has somewhere to point.
        for (_, connections) in &decoded {
            for conn in connections {
                if !inner.by_name.contains_key(&conn.name) {
                    debug!(peer = %conn.name, "inserting placeholder for unknown connection target");
                    inner.by_name.insert(conn.name, Peer::placeholder(conn.name));
                }
            }
        }

        let mut improved =
            inner.merge(&decoded, &mut just_inserted, self.ourself.uid(), &mut pending);

        inner.garbage_collect(&mut pending);
        for removed in &pending.removed {
            improved.remove(&removed.name());
        }

        let received: PeerNameSet = decoded.iter().map(|(summary, _)| summary.name).collect();

        self.unlock_and_notify(inner, pending);
        Ok((received, improved))
    }

    /// Records a connection from the local peer.
    ///
    /// Called by the transport once a connection to `conn.remote()` exists.
    /// Bumps the local version and triggers a rebroadcast, so the rest of
    /// the mesh learns the new edge.
    pub fn add_local_connection(&self, conn: RemoteConnection) {
        self.update_local_connections(|connections| {
            connections.insert(conn.remote(), conn);
        });
    }

    /// Marks the local connection to `remote` as established.
    pub fn set_local_connection_established(&self, remote: PeerName) {
        self.update_local_connections(|connections| {
            if let Some(conn) = connections.remove(&remote) {
                connections.insert(
                    remote,
                    RemoteConnection::new(
                        conn.local(),
                        remote,
                        conn.remote_tcp_addr().to_owned(),
                        conn.outbound(),
                        true,
                    ),
                );
            }
        });
    }

    /// Drops the local connection to `remote`, if any.
    ///
    /// The remote peer itself stays registered until garbage collection
    /// decides its fate.
    pub fn remove_local_connection(&self, remote: PeerName) {
        self.update_local_connections(|connections| {
            connections.remove(&remote);
        });
    }

    fn update_local_connections(
        &self,
        mutate: impl FnOnce(&mut HashMap<PeerName, RemoteConnection>),
    ) {
        let mut inner = self.inner.write();
        let mut pending = PendingNotifications::default();
        let local_name = inner.local_name;
        let local = inner
            .by_name
            .get_mut(&local_name)
            .expect("local peer is always registered");
        mutate(&mut local.connections);
        local.version += 1;
        pending.local_peer_modified = true;
        self.unlock_and_notify(inner, pending);
    }

    /// Removes every peer that is neither reachable from the local peer nor
    /// pinned by a reference, then fires the accumulated callbacks.
    pub fn garbage_collect(&self) {
        let mut inner = self.inner.write();
        let mut pending = PendingNotifications::default();
        inner.garbage_collect(&mut pending);
        self.unlock_and_notify(inner, pending);
    }

    /// Releases the write lock, then acts on the accumulated notifications.
    ///
    /// Short-id reassignment still happens under the lock; everything else
    /// (GC callbacks, invalidation callbacks, the local broadcast) runs
    /// after release so it may reenter the registry.
    fn unlock_and_notify(
        &self,
        mut inner: RwLockWriteGuard<'_, PeersInner>,
        mut pending: PendingNotifications,
    ) {
        let reassigned =
            pending.reassign_local_short_id && inner.reassign_local_short_id(&mut pending);
        let broadcast = reassigned || pending.local_peer_modified;
        let on_gc = inner.on_gc.clone();
        let on_invalidate = inner.on_invalidate_short_ids.clone();
        drop(inner);

        if !pending.removed.is_empty() {
            for callback in &on_gc {
                for peer in &pending.removed {
                    guard_callback("gc", || callback(peer));
                }
            }
        }

        if pending.invalidate_short_ids {
            for callback in &on_invalidate {
                guard_callback("invalidate short ids", || callback());
            }
        }

        if broadcast {
            self.ourself.broadcast_peer_update();
        }
    }
}

impl std::fmt::Debug for Peers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Peers")
            .field("ourself", &inner.local_name)
            .field("count", &inner.by_name.len())
            .finish()
    }
}

/// Runs a user callback, containing any panic to the callback itself.
/// The registry lock is already released by the time this runs.
fn guard_callback(which: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = which, "registry callback panicked");
    }
}

impl PeersInner {
    /// Merge pass of reconciliation: walk the decoded blocks in order and
    /// apply each one to the registered record.
    fn merge(
        &mut self,
        decoded: &[(PeerSummary, Vec<ConnectionSummary>)],
        just_inserted: &mut PeerNameSet,
        local_uid: PeerUid,
        pending: &mut PendingNotifications,
    ) -> PeerNameSet {
        let mut improved = PeerNameSet::new();

        for (summary, connections) in decoded {
            let name = summary.name;

            if name == self.local_name {
                // An old incarnation of ourselves is circulating. Outrun its
                // version so our next broadcast supersedes it everywhere.
                // Our connections are ours alone; the update cannot touch
                // them.
                if summary.uid != local_uid {
                    let local = self
                        .by_name
                        .get_mut(&name)
                        .expect("local peer is always registered");
                    pending.local_peer_modified |= local.bump_version_beyond(summary.version);
                }
                continue;
            }

            if just_inserted.remove(&name) {
                let connections = self.conns_map(name, connections);
                let peer = self
                    .by_name
                    .get_mut(&name)
                    .expect("peer inserted in the pre-pass");
                peer.connections = connections;
                improved.insert(name);
                continue;
            }

            // Known peer: accept the update only if it strictly dominates
            // what we have, lexicographically over (version, uid, has a
            // short id).
            let accept = {
                let current = self
                    .by_name
                    .get(&name)
                    .expect("every update name is registered by the pre-pass");
                match summary.version.cmp(&current.version()) {
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Equal => match summary.uid.cmp(&current.uid()) {
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => {
                            summary.short_id.is_some() && current.short_id().is_none()
                        }
                    },
                }
            };
            if !accept {
                continue;
            }

            let connections = self.conns_map(name, connections);
            let old_short_id = {
                let peer = self
                    .by_name
                    .get_mut(&name)
                    .expect("every update name is registered by the pre-pass");
                peer.version = summary.version;
                peer.uid = summary.uid;
                peer.nickname = summary.nickname.clone();
                peer.connections = connections;
                peer.short_id()
            };

            if old_short_id != summary.short_id {
                self.delete_by_short_id(name, old_short_id, pending);
                self.by_name
                    .get_mut(&name)
                    .expect("peer still registered")
                    .short_id = summary.short_id;
                self.add_by_short_id(name, summary.short_id, pending);
            }
            improved.insert(name);
        }

        improved
    }

    /// Materializes decoded connection summaries into the record's
    /// connection map. Remote names resolve through `by_name` on demand, so
    /// no references are kept here.
    fn conns_map(
        &self,
        owner: PeerName,
        connections: &[ConnectionSummary],
    ) -> HashMap<PeerName, RemoteConnection> {
        connections
            .iter()
            .map(|conn| {
                (
                    conn.name,
                    RemoteConnection::new(
                        owner,
                        conn.name,
                        conn.tcp_addr.clone(),
                        conn.outbound,
                        conn.established,
                    ),
                )
            })
            .collect()
    }

    /// Names reachable from the local peer along connection edges,
    /// regardless of connection establishment state.
    fn reachable_names(&self) -> PeerNameSet {
        let mut reached = PeerNameSet::new();
        let mut queue = VecDeque::new();
        reached.insert(self.local_name);
        queue.push_back(self.local_name);
        while let Some(name) = queue.pop_front() {
            if let Some(peer) = self.by_name.get(&name) {
                for remote in peer.connections.keys() {
                    if reached.insert(*remote) {
                        queue.push_back(*remote);
                    }
                }
            }
        }
        reached
    }

    fn garbage_collect(&mut self, pending: &mut PendingNotifications) {
        let reached = self.reachable_names();
        let victims: Vec<PeerName> = self
            .by_name
            .iter()
            .filter(|(name, peer)| !reached.contains(*name) && peer.local_ref_count == 0)
            .map(|(name, _)| *name)
            .collect();

        for name in victims {
            let peer = self.by_name.remove(&name).expect("victim is registered");
            debug!(peer = %name, "garbage collecting unreachable peer");
            self.delete_by_short_id(name, peer.short_id(), pending);
            pending.removed.push(peer);
        }

        if !pending.removed.is_empty() {
            // Collection may have freed a slot; if the local peer is not
            // the principal of its own short id, try again.
            let local_short_id = self
                .by_name
                .get(&self.local_name)
                .expect("local peer is always registered")
                .short_id();
            if let Some(short_id) = local_short_id {
                let owned = self
                    .by_short_id
                    .get(&short_id)
                    .and_then(|entry| entry.principal)
                    == Some(self.local_name);
                if !owned {
                    pending.reassign_local_short_id = true;
                }
            }
        }
    }

    fn add_by_short_id(
        &mut self,
        name: PeerName,
        short_id: Option<PeerShortId>,
        pending: &mut PendingNotifications,
    ) {
        let Some(short_id) = short_id else { return };

        match self.by_short_id.get_mut(&short_id) {
            None => {
                self.by_short_id.insert(
                    short_id,
                    ShortIdEntry {
                        principal: Some(name),
                        others: Vec::new(),
                    },
                );
            }
            Some(entry) => match entry.principal {
                None => {
                    // The slot is free but was used in the past. Reusing it
                    // changes the mapping, hence the invalidation.
                    entry.principal = Some(name);
                    pending.invalidate_short_ids = true;
                }
                Some(principal) if name < principal => {
                    // Collision won by the newcomer: the old principal is
                    // bumped into the others list.
                    if principal == self.local_name {
                        pending.reassign_local_short_id = true;
                    }
                    entry.others.push(principal);
                    entry.principal = Some(name);
                    pending.invalidate_short_ids = true;
                }
                Some(_) => entry.others.push(name),
            },
        }
    }

    fn delete_by_short_id(
        &mut self,
        name: PeerName,
        short_id: Option<PeerShortId>,
        pending: &mut PendingNotifications,
    ) {
        let Some(short_id) = short_id else { return };
        let Some(entry) = self.by_short_id.get_mut(&short_id) else {
            return;
        };

        if entry.principal != Some(name) {
            if let Some(index) = entry.others.iter().position(|other| *other == name) {
                entry.others.swap_remove(index);
            }
            return;
        }

        if entry.others.is_empty() {
            // Last holder. Clear the entry but keep it, so a later
            // reassignment of this slot is recognized as reuse.
            *entry = ShortIdEntry::default();
            return;
        }

        let (index, _) = entry
            .others
            .iter()
            .enumerate()
            .min_by_key(|(_, other)| **other)
            .expect("others is non-empty");
        let promoted = entry.others.swap_remove(index);
        entry.principal = Some(promoted);
        pending.invalidate_short_ids = true;
    }

    /// Tries to move the local peer onto a free short id. Returns whether
    /// it succeeded; on failure the local peer keeps its colliding id and
    /// the next garbage collection retries.
    fn reassign_local_short_id(&mut self, pending: &mut PendingNotifications) -> bool {
        match self.choose_short_id() {
            Some(short_id) => {
                self.set_local_short_id(short_id, pending);
                true
            }
            None => {
                warn!("short id space exhausted; local peer keeps its colliding id");
                false
            }
        }
    }

    fn set_local_short_id(&mut self, short_id: PeerShortId, pending: &mut PendingNotifications) {
        let old = self
            .by_name
            .get(&self.local_name)
            .expect("local peer is always registered")
            .short_id();
        self.delete_by_short_id(self.local_name, old, pending);
        {
            let local = self
                .by_name
                .get_mut(&self.local_name)
                .expect("local peer is always registered");
            local.short_id = Some(short_id);
            local.version += 1;
        }
        debug!(short_id = %short_id, "local peer moved to new short id");
        self.add_by_short_id(self.local_name, Some(short_id), pending);
    }

    /// Picks an available short id at random: ten blind draws first, then
    /// an exact enumeration of the free slots if the space looks crowded.
    fn choose_short_id(&self) -> Option<PeerShortId> {
        let mut rng = StdRng::seed_from_u64(rand::thread_rng().next_u64());

        for _ in 0..10 {
            let candidate = PeerShortId::new(rng.gen_range(0..SHORT_ID_SPACE));
            if self.short_id_is_free(candidate) {
                return Some(candidate);
            }
        }

        let used = self
            .by_short_id
            .values()
            .filter(|entry| entry.principal.is_some())
            .count();
        let available = usize::from(SHORT_ID_SPACE) - used;
        if available == 0 {
            return None;
        }

        let mut nth = rng.gen_range(0..available);
        for raw in 0..SHORT_ID_SPACE {
            let candidate = PeerShortId::new(raw);
            if self.short_id_is_free(candidate) {
                if nth == 0 {
                    return Some(candidate);
                }
                nth -= 1;
            }
        }

        debug_assert!(false, "free short id accounting is inconsistent");
        None
    }

    fn short_id_is_free(&self, short_id: PeerShortId) -> bool {
        self.by_short_id
            .get(&short_id)
            .map_or(true, |entry| entry.principal.is_none())
    }
}
