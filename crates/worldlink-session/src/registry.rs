//! The session registry: who is connected right now.
//!
//! # Concurrency note
//!
//! Unlike most state in the link, the registry is touched by many tasks
//! at once: the accept loop registers, every connection task unregisters
//! on close, and any task may fan a message out. It is backed by a
//! [`DashMap`] so none of those paths takes a global lock, and `count()`
//! is a snapshot that may lag a concurrent insert or removal.
//!
//! Never hold the closure passed to [`SessionRegistry::for_each_open`]
//! across an `.await`; it runs while a shard lock is held.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use worldlink_transport::ConnectionId;

use crate::{Session, SessionId};

/// Something the registry can hold to reach a peer.
///
/// The registry only needs to know whether the outbound side is still
/// alive; delivery is up to the caller.
pub trait PeerHandle: Send + Sync + 'static {
    fn is_open(&self) -> bool;
}

impl<T: Send + 'static> PeerHandle for mpsc::UnboundedSender<T> {
    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

impl<T: Send + 'static> PeerHandle for mpsc::Sender<T> {
    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

struct Entry<H> {
    session: Session,
    peer: H,
}

/// Tracks every live session and the handle used to write to it.
pub struct SessionRegistry<H> {
    entries: DashMap<ConnectionId, Entry<H>>,
    next_seq: AtomicU64,
}

impl<H: PeerHandle> SessionRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Registers a freshly accepted connection and returns its id.
    ///
    /// Ids are allocated from a monotonically increasing sequence, so two
    /// concurrent registrations never share one. Registering a connection
    /// that is already present replaces its entry under a new id.
    pub fn register(
        &self,
        conn: ConnectionId,
        remote_addr: Option<SocketAddr>,
        peer: H,
    ) -> SessionId {
        let id = SessionId(self.next_seq.fetch_add(1, Ordering::Relaxed));
        let session = Session {
            id,
            conn,
            remote_addr,
            connected_at: Instant::now(),
        };
        self.entries.insert(conn, Entry { session, peer });

        tracing::info!(session_id = %id, %conn, ?remote_addr, "session registered");
        id
    }

    /// Removes a session, returning it if it was still present.
    ///
    /// A second call for the same connection is a no-op and returns
    /// `None`, which callers use to emit the leave event exactly once.
    pub fn unregister(&self, conn: ConnectionId) -> Option<Session> {
        let (_, entry) = self.entries.remove(&conn)?;
        tracing::info!(
            session_id = %entry.session.id,
            %conn,
            connected_ms = entry.session.connected_for().as_millis() as u64,
            "session unregistered"
        );
        Some(entry.session)
    }

    /// Looks up the session for a connection.
    pub fn get(&self, conn: ConnectionId) -> Option<Session> {
        self.entries.get(&conn).map(|e| e.session.clone())
    }

    /// Number of registered sessions at the moment of the call.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Calls `f` for every session whose peer handle is still open.
    ///
    /// Peers whose outbound side has already gone away are skipped
    /// silently; their own connection task will unregister them.
    pub fn for_each_open(&self, mut f: impl FnMut(&Session, &H)) {
        for entry in self.entries.iter() {
            if entry.peer.is_open() {
                f(&entry.session, &entry.peer);
            }
        }
    }

    /// Snapshot of every registered session, ordered by id.
    pub fn sessions(&self) -> Vec<Session> {
        let mut all: Vec<Session> =
            self.entries.iter().map(|e| e.session.clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }
}

impl<H: PeerHandle> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;

    /// Peer double whose open flag the test controls.
    #[derive(Clone)]
    struct FakePeer(Arc<AtomicBool>);

    impl FakePeer {
        fn open() -> Self {
            Self(Arc::new(AtomicBool::new(true)))
        }

        fn close(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    impl PeerHandle for FakePeer {
        fn is_open(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_register_allocates_sequential_ids() {
        let reg = SessionRegistry::new();
        let a = reg.register(conn(10), None, FakePeer::open());
        let b = reg.register(conn(11), None, FakePeer::open());

        assert_eq!(a.to_string(), "Client-1");
        assert_eq!(b.to_string(), "Client-2");
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let reg = SessionRegistry::new();
        let id = reg.register(conn(1), None, FakePeer::open());

        let removed = reg.unregister(conn(1)).expect("first removal");
        assert_eq!(removed.id, id);
        assert!(reg.unregister(conn(1)).is_none());
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_unregister_unknown_connection_is_noop() {
        let reg: SessionRegistry<FakePeer> = SessionRegistry::new();
        assert!(reg.unregister(conn(99)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_after_unregister() {
        let reg = SessionRegistry::new();
        reg.register(conn(1), None, FakePeer::open());
        reg.unregister(conn(1));
        let next = reg.register(conn(2), None, FakePeer::open());
        assert_eq!(next, SessionId(2));
    }

    #[test]
    fn test_for_each_open_skips_closed_peers() {
        let reg = SessionRegistry::new();
        let closed = FakePeer::open();
        reg.register(conn(1), None, FakePeer::open());
        reg.register(conn(2), None, closed.clone());
        reg.register(conn(3), None, FakePeer::open());
        closed.close();

        let mut seen = Vec::new();
        reg.for_each_open(|s, _| seen.push(s.id));
        seen.sort();

        assert_eq!(seen, vec![SessionId(1), SessionId(3)]);
        // Closed peers are skipped, not removed.
        assert_eq!(reg.count(), 3);
    }

    #[test]
    fn test_get_returns_registered_session() {
        let reg = SessionRegistry::new();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let id = reg.register(conn(5), Some(addr), FakePeer::open());

        let session = reg.get(conn(5)).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.remote_addr, Some(addr));
        assert!(reg.get(conn(6)).is_none());
    }

    #[test]
    fn test_sessions_snapshot_is_sorted_by_id() {
        let reg = SessionRegistry::new();
        reg.register(conn(30), None, FakePeer::open());
        reg.register(conn(10), None, FakePeer::open());
        reg.register(conn(20), None, FakePeer::open());

        let ids: Vec<_> = reg.sessions().into_iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_unbounded_sender_reports_closed_after_receiver_drop() {
        let reg = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        reg.register(conn(1), None, tx);

        let mut open = 0;
        reg.for_each_open(|_, _| open += 1);
        assert_eq!(open, 1);

        drop(rx);
        let mut open = 0;
        reg.for_each_open(|_, _| open += 1);
        assert_eq!(open, 0);
    }

    #[test]
    fn test_concurrent_register_unregister_keeps_count_consistent() {
        let reg = Arc::new(SessionRegistry::new());
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        let c = conn(t * 1_000 + i);
                        reg.register(c, None, FakePeer::open());
                        if i % 2 == 0 {
                            assert!(reg.unregister(c).is_some());
                            assert!(reg.unregister(c).is_none());
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(reg.count(), 8 * 100);
        // Every id was handed out exactly once.
        let mut ids: Vec<_> = reg.sessions().into_iter().map(|s| s.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 800);
    }
}
