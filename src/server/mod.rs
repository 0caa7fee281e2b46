//! Connection lifecycle: accept, shard, dispatch, reap.
//!
//! One acceptor thread hands sockets round-robin to `poller_threads` poller
//! shards. A poller cancels read interest before handing a ready connection
//! to the worker pool, so each connection is owned by at most one worker at a
//! time. Workers re-arm keep-alive connections on the same shard. Reapers
//! close idle connections and drop idle sessions.

pub mod connection;
pub mod listener;
pub mod poller;
pub mod reaper;
pub mod worker;

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::session::{MemorySessionStore, SessionStore};
use crate::handler::{Handler, StaticFiles};
use crate::http::mime::MimeTable;

use listener::Listener;
use poller::Poller;
use reaper::Reaper;
use worker::{RequestProcessor, WorkerPool};

/// Round-robin shard selector.
///
/// The counter is a wrapping `i32`; the index is taken from its absolute
/// value, so after the counter wraps the sequence restarts from the
/// magnitude of `i32::MIN` rather than from zero.
#[derive(Debug)]
pub struct RoundRobin {
    counter: AtomicI32,
    shards: usize,
}

impl RoundRobin {
    pub fn new(shards: usize) -> Self {
        Self::starting_at(0, shards)
    }

    pub fn starting_at(start: i32, shards: usize) -> Self {
        Self {
            counter: AtomicI32::new(start),
            shards: shards.max(1),
        }
    }

    pub fn next(&self) -> usize {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n.unsigned_abs() as usize % self.shards
    }
}

/// State shared by the acceptor and the [`Server`] handle.
#[derive(Debug)]
pub struct ServerCore {
    running: Arc<AtomicBool>,
    pollers: Arc<[Arc<Poller>]>,
    round_robin: RoundRobin,
}

impl ServerCore {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Hands an accepted, non-blocking stream to the next poller shard.
    pub fn distribute(&self, stream: TcpStream) -> usize {
        let index = self.round_robin.next();
        if let Err(e) = self.pollers[index].register_new(stream) {
            warn!(poller = index, error = %e, "failed to adopt connection");
        }
        index
    }
}

/// A running server. Dropping it stops it.
pub struct Server {
    core: Arc<ServerCore>,
    local_addr: SocketAddr,
    threads: Mutex<Vec<JoinHandle<()>>>,
    reapers: Mutex<Vec<Reaper>>,
    workers: Mutex<Option<WorkerPool>>,
}

impl Server {
    /// Starts with an in-memory session store.
    pub fn start(config: &Config, handler: Arc<dyn Handler>) -> Result<Self, ServerError> {
        let sessions = Arc::new(MemorySessionStore::new(config.session_idle()));
        Self::start_with_sessions(config, handler, sessions)
    }

    /// Binds, then brings up the acceptor, pollers, connection reaper and
    /// handler layer in that order. Any failure stops what was started.
    pub fn start_with_sessions(
        config: &Config,
        handler: Arc<dyn Handler>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = Listener::bind(&config.listen_addr())?;
        let local_addr = listener.local_addr();
        let running = Arc::new(AtomicBool::new(true));

        let mut shards = Vec::with_capacity(config.poller_threads);
        let mut polls = Vec::with_capacity(config.poller_threads);
        for i in 0..config.poller_threads {
            let (poller, poll) = Poller::new(i, config.connection_idle(), Arc::clone(&running))?;
            shards.push(poller);
            polls.push(poll);
        }
        let pollers: Arc<[Arc<Poller>]> = shards.into();

        let core = Arc::new(ServerCore {
            running,
            round_robin: RoundRobin::new(pollers.len()),
            pollers: Arc::clone(&pollers),
        });
        let server = Self {
            core: Arc::clone(&core),
            local_addr,
            threads: Mutex::new(Vec::new()),
            reapers: Mutex::new(Vec::new()),
            workers: Mutex::new(None),
        };

        let (dispatcher, queue) = worker::queue();

        let acceptor_core = Arc::clone(&core);
        server.spawn("acceptor".to_string(), move || listener.run(acceptor_core))?;

        for (poller, poll) in pollers.iter().zip(polls) {
            let poller = Arc::clone(poller);
            let dispatcher = dispatcher.clone();
            server.spawn(format!("poller-{}", poller.index()), move || {
                poller.run(poll, dispatcher)
            })?;
        }
        drop(dispatcher);

        let reaped = Arc::clone(&pollers);
        let connection_reaper = Reaper::start("connection-reaper", config.connection_eviction(), move || {
            for poller in reaped.iter() {
                poller.evict_expired();
            }
        })?;
        server.reapers.lock().push(connection_reaper);

        handler.init().map_err(ServerError::HandlerInit)?;

        let session_store = Arc::clone(&sessions);
        let session_reaper = Reaper::start("session-reaper", config.session_eviction(), move || {
            session_store.evict_expired();
        })?;
        server.reapers.lock().push(session_reaper);

        let static_files = StaticFiles::new(
            config.static_root.clone(),
            MimeTable::load(config.mime_table.as_deref()),
        );
        let processor = Arc::new(RequestProcessor::new(pollers, handler, sessions, static_files));
        *server.workers.lock() = Some(WorkerPool::start(config.worker_threads, queue, processor)?);

        info!(
            addr = %local_addr,
            pollers = config.poller_threads,
            workers = config.worker_threads,
            "server started"
        );
        Ok(server)
    }

    fn spawn<F>(&self, name: String, body: F) -> Result<(), ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| ServerError::Spawn { name, source })?;
        self.threads.lock().push(handle);
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub fn core(&self) -> &Arc<ServerCore> {
        &self.core
    }

    pub fn pollers(&self) -> &[Arc<Poller>] {
        &self.core.pollers
    }

    /// Total connections tracked across all shards.
    pub fn connection_count(&self) -> usize {
        self.core.pollers.iter().map(|p| p.connection_count()).sum()
    }

    /// Stops accepting, closes every connection, cancels the reapers and
    /// lets queued requests drain. Safe to call more than once.
    pub fn stop(&self) {
        if !self.core.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!(addr = %self.local_addr, "stopping server");

        listener::wake_acceptor(self.local_addr);
        for poller in self.core.pollers.iter() {
            poller.shutdown();
        }
        for mut reaper in self.reapers.lock().drain(..) {
            reaper.cancel();
        }
        for handle in self.threads.lock().drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "thread panicked");
            }
        }
        // The acceptor may have handed off a stream after the first sweep.
        for poller in self.core.pollers.iter() {
            poller.close_all();
        }
        // Pollers held the last dispatchers; the pool drains and exits.
        if let Some(pool) = self.workers.lock().take() {
            pool.join();
        }
        info!("server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}
