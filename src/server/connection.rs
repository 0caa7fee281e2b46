use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use mio::{Interest, Registry, Token};
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

/// One accepted socket, shared between its poller's registry and at most one
/// worker task at a time.
///
/// The socket is held twice: a std handle the worker reads and writes, and a
/// duplicate mio handle used only for readiness registration. Both refer to
/// the same kernel socket; the descriptors close when the last reference to
/// the connection drops.
pub struct Connection {
    token: Token,
    poller: usize,
    peer: SocketAddr,
    stream: TcpStream,
    interest: Mutex<InterestState>,
    last_activity: Mutex<Instant>,
    inbound: Mutex<BytesMut>,
}

struct InterestState {
    source: mio::net::TcpStream,
    registered: bool,
    closed: bool,
}

impl Connection {
    /// Wraps an accepted, already non-blocking stream owned by shard `poller`.
    pub fn new(stream: TcpStream, token: Token, poller: usize) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let source = mio::net::TcpStream::from_std(stream.try_clone()?);

        Ok(Self {
            token,
            poller,
            peer,
            stream,
            interest: Mutex::new(InterestState {
                source,
                registered: false,
                closed: false,
            }),
            last_activity: Mutex::new(Instant::now()),
            inbound: Mutex::new(BytesMut::with_capacity(4096)),
        })
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Index of the owning poller shard.
    pub fn poller(&self) -> usize {
        self.poller
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Registers read interest. Returns `Ok(false)` if the connection was
    /// closed in the meantime; an already armed connection is left as is.
    pub fn arm(&self, registry: &Registry) -> io::Result<bool> {
        let mut state = self.interest.lock();
        if state.closed {
            return Ok(false);
        }
        if !state.registered {
            registry.register(&mut state.source, self.token, Interest::READABLE)?;
            state.registered = true;
        }
        Ok(true)
    }

    /// Cancels read interest. Only the caller that observes `true` may hand
    /// the connection to a worker.
    pub fn disarm(&self, registry: &Registry) -> bool {
        let mut state = self.interest.lock();
        if !state.registered {
            return false;
        }
        state.registered = false;
        if let Err(e) = registry.deregister(&mut state.source) {
            trace!(peer = %self.peer, error = %e, "deregister failed");
        }
        true
    }

    /// Cancels any registration and shuts the socket down. Returns `false` if
    /// it was already closed.
    pub fn close(&self, registry: &Registry) -> bool {
        let mut state = self.interest.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        if state.registered {
            state.registered = false;
            if let Err(e) = registry.deregister(&mut state.source) {
                trace!(peer = %self.peer, error = %e, "deregister on close failed");
            }
        }
        // Unblocks a worker parked in read; the descriptor closes on drop.
        let _ = self.stream.shutdown(Shutdown::Both);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.interest.lock().closed
    }

    pub fn is_registered(&self) -> bool {
        self.interest.lock().registered
    }

    /// Stamps the last-activity time.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    /// Closed, disconnected, or idle longer than `deadline`.
    pub fn is_expired(&self, now: Instant, deadline: Duration) -> bool {
        self.is_closed() || self.stream.peer_addr().is_err() || self.idle_for(now) > deadline
    }

    /// Switches between the blocking mode a worker reads in and the
    /// non-blocking mode used while armed.
    pub fn set_blocking(&self, blocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(!blocking)
    }

    /// Bytes read from the socket but not yet consumed by the parser.
    pub fn inbound(&self) -> MutexGuard<'_, BytesMut> {
        self.inbound.lock()
    }

    pub fn has_buffered_input(&self) -> bool {
        !self.inbound.lock().is_empty()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token.0)
            .field("poller", &self.poller)
            .field("peer", &self.peer)
            .finish()
    }
}
