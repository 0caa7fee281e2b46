use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use mio::{Events, Poll, Registry, Token, Waker};
use tracing::{debug, info, trace, warn};

use crate::server::connection::Connection;
use crate::server::worker::Dispatcher;

const WAKE_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

/// A connection waiting for its poller thread to (re)register read interest.
#[derive(Debug)]
pub struct PendingRegistration(pub Arc<Connection>);

/// One readiness shard.
///
/// Registrations are always performed by the shard's own thread: other
/// threads enqueue a [`PendingRegistration`] and wake the multiplexer. The
/// `connections` map owns every live connection of the shard.
#[derive(Debug)]
pub struct Poller {
    index: usize,
    registry: Registry,
    waker: Waker,
    pending_tx: Sender<PendingRegistration>,
    pending_rx: Receiver<PendingRegistration>,
    connections: DashMap<Token, Arc<Connection>>,
    next_token: AtomicUsize,
    idle_deadline: Duration,
    running: Arc<AtomicBool>,
}

impl Poller {
    /// Creates the shard; the returned [`Poll`] must be moved into [`Poller::run`].
    pub fn new(
        index: usize,
        idle_deadline: Duration,
        running: Arc<AtomicBool>,
    ) -> io::Result<(Arc<Self>, Poll)> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;
        let (pending_tx, pending_rx) = unbounded();

        let poller = Arc::new(Self {
            index,
            registry,
            waker,
            pending_tx,
            pending_rx,
            connections: DashMap::new(),
            next_token: AtomicUsize::new(0),
            idle_deadline,
            running,
        });
        Ok((poller, poll))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, token: Token) -> Option<Arc<Connection>> {
        self.connections.get(&token).map(|c| Arc::clone(c.value()))
    }

    /// Adopts a freshly accepted stream: wraps it, stores it, and queues its
    /// first registration.
    pub fn register_new(&self, stream: TcpStream) -> io::Result<Token> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        let conn = Arc::new(Connection::new(stream, token, self.index)?);
        self.connections.insert(token, Arc::clone(&conn));
        trace!(poller = self.index, token = token.0, peer = %conn.peer(), "connection adopted");
        self.enqueue(conn);
        Ok(token)
    }

    /// Queues re-registration of a connection a worker has finished with.
    /// Returns `false` if the connection is no longer tracked (evicted).
    pub fn rearm(&self, token: Token) -> bool {
        let Some(conn) = self.connection(token) else {
            return false;
        };
        conn.touch();
        self.enqueue(conn);
        true
    }

    fn enqueue(&self, conn: Arc<Connection>) {
        // The receiver lives in `self`, so sending cannot fail.
        let _ = self.pending_tx.send(PendingRegistration(conn));
        if let Err(e) = self.waker.wake() {
            warn!(poller = self.index, error = %e, "failed to wake poller");
        }
    }

    /// Stops tracking the connection and closes it.
    pub fn close_connection(&self, conn: &Connection) {
        self.connections.remove(&conn.token());
        if conn.close(&self.registry) {
            debug!(poller = self.index, peer = %conn.peer(), "connection closed");
        }
    }

    /// Closes every connection that is closed, disconnected, or idle past the
    /// deadline. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_expired(now, self.idle_deadline))
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for token in expired {
            let removed = self
                .connections
                .remove_if(&token, |_, conn| conn.is_expired(now, self.idle_deadline));
            if let Some((_, conn)) = removed {
                conn.close(&self.registry);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(poller = self.index, evicted, "expired connections evicted");
        }
        evicted
    }

    /// Closes every tracked connection and wakes the shard so it notices the
    /// cleared run flag.
    pub fn shutdown(&self) {
        self.close_all();
        let _ = self.waker.wake();
    }

    /// Closes and forgets every tracked connection, including ones still
    /// waiting for their first registration.
    pub fn close_all(&self) {
        self.pending_rx.try_iter().for_each(drop);
        let tokens: Vec<Token> = self.connections.iter().map(|e| *e.key()).collect();
        for token in tokens {
            if let Some((_, conn)) = self.connections.remove(&token) {
                conn.close(&self.registry);
            }
        }
    }

    /// Event loop of the shard thread.
    pub fn run(self: Arc<Self>, mut poll: Poll, dispatcher: Dispatcher) {
        info!(poller = self.index, "poller started");
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while self.running.load(Ordering::Acquire) {
            self.drain_pending(&dispatcher);

            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() != io::ErrorKind::Interrupted {
                    warn!(poller = self.index, error = %e, "poll failed");
                }
                continue;
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                self.dispatch(event.token(), &dispatcher);
            }
        }

        self.close_all();
        info!(poller = self.index, "poller stopped");
    }

    fn drain_pending(&self, dispatcher: &Dispatcher) {
        for PendingRegistration(conn) in self.pending_rx.try_iter() {
            if conn.is_closed() {
                continue;
            }
            // Pipelined bytes are already buffered; no readiness will come
            // for them, so hand the connection straight back to a worker.
            if conn.has_buffered_input() {
                self.submit(conn, dispatcher);
                continue;
            }
            match conn.arm(&self.registry) {
                Ok(_) => {}
                Err(e) => {
                    warn!(poller = self.index, peer = %conn.peer(), error = %e, "register failed");
                    self.close_connection(&conn);
                }
            }
        }
    }

    fn dispatch(&self, token: Token, dispatcher: &Dispatcher) {
        let Some(conn) = self.connection(token) else {
            trace!(poller = self.index, token = token.0, "readiness for untracked token");
            return;
        };
        if !conn.disarm(&self.registry) {
            trace!(poller = self.index, token = token.0, "stale readiness");
            return;
        }
        conn.touch();
        self.submit(conn, dispatcher);
    }

    fn submit(&self, conn: Arc<Connection>, dispatcher: &Dispatcher) {
        if let Err(conn) = dispatcher.submit(conn) {
            debug!(poller = self.index, peer = %conn.peer(), "worker pool gone, closing");
            self.close_connection(&conn);
        }
    }
}
