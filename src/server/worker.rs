use std::any::Any;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Buf;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::{ParseError, ServerError};
use crate::handler::session::{SessionStore, SESSION_COOKIE};
use crate::handler::{Handler, StaticFiles};
use crate::http::parser::parse_request;
use crate::http::request::{Method, Request};
use crate::http::response::{Cookie, Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::logging::ACCESS_TARGET;
use crate::server::connection::Connection;
use crate::server::poller::Poller;

const READ_CHUNK: usize = 4096;

/// Sending side of the worker queue, held by every poller.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: Sender<Arc<Connection>>,
}

impl Dispatcher {
    /// Queues a connection for one request cycle. Hands the connection back
    /// if the pool has shut down.
    pub fn submit(&self, conn: Arc<Connection>) -> Result<(), Arc<Connection>> {
        self.tx.send(conn).map_err(|e| e.into_inner())
    }
}

/// Creates the worker queue. The receiver is given to [`WorkerPool::start`].
pub fn queue() -> (Dispatcher, Receiver<Arc<Connection>>) {
    let (tx, rx) = unbounded();
    (Dispatcher { tx }, rx)
}

/// Fixed set of threads running request cycles.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        size: usize,
        queue: Receiver<Arc<Connection>>,
        processor: Arc<RequestProcessor>,
    ) -> Result<Self, ServerError> {
        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let queue = queue.clone();
            let processor = Arc::clone(&processor);
            let name = format!("worker-{i}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    for conn in queue.iter() {
                        processor.process(conn);
                    }
                })
                .map_err(|source| ServerError::Spawn { name, source })?;
            handles.push(handle);
        }
        info!(workers = size, "worker pool started");
        Ok(Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for queued tasks to finish. Workers exit once every
    /// [`Dispatcher`] has been dropped and the queue is empty.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
        info!("worker pool drained");
    }
}

enum ReadFailure {
    Parse(ParseError),
    Io(io::Error),
}

/// One request cycle on a connection: read, parse, dispatch, write, then
/// either re-arm or close.
pub struct RequestProcessor {
    pollers: Arc<[Arc<Poller>]>,
    handler: Arc<dyn Handler>,
    sessions: Arc<dyn SessionStore>,
    static_files: StaticFiles,
}

impl RequestProcessor {
    pub fn new(
        pollers: Arc<[Arc<Poller>]>,
        handler: Arc<dyn Handler>,
        sessions: Arc<dyn SessionStore>,
        static_files: StaticFiles,
    ) -> Self {
        Self {
            pollers,
            handler,
            sessions,
            static_files,
        }
    }

    pub fn process(&self, conn: Arc<Connection>) {
        if let Err(e) = conn.set_blocking(true) {
            debug!(peer = %conn.peer(), error = %e, "failed to switch to blocking mode");
            self.close(&conn);
            return;
        }

        let mut request = match read_request(&conn) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(peer = %conn.peer(), "peer closed connection");
                self.close(&conn);
                return;
            }
            Err(ReadFailure::Parse(e)) => {
                warn!(peer = %conn.peer(), error = %e, "bad request");
                let response = Response::error(e.status_code(), &e.to_string());
                if let Err(e) = ResponseWriter::new(response).write_to(&mut conn.stream()) {
                    debug!(peer = %conn.peer(), error = %e, "error response write failed");
                }
                self.close(&conn);
                return;
            }
            Err(ReadFailure::Io(e)) => {
                debug!(peer = %conn.peer(), error = %e, "read failed");
                self.close(&conn);
                return;
            }
        };

        request.set_remote_addr(conn.peer());
        let new_session = self.attach_session(&mut request);
        let mut response = self.respond(&mut request);
        if let Some(id) = &new_session {
            response.add_cookie(Cookie::new(SESSION_COOKIE, id.as_str()));
        }

        let status = response.status;
        let length = response.content_length();
        let mut writer = ResponseWriter::new(response);
        if *request.method() == Method::HEAD {
            writer = writer.without_body();
        }
        if let Err(e) = writer.write_to(&mut conn.stream()) {
            debug!(peer = %conn.peer(), error = %e, "write failed");
            self.close(&conn);
            return;
        }
        if let Some(session) = request.session() {
            session.touch();
        }

        info!(
            target: ACCESS_TARGET,
            peer = %conn.peer(),
            uri = request.uri(),
            status = status.as_u16(),
            length,
            "request served"
        );

        if !request.keep_alive() {
            self.close(&conn);
            return;
        }
        if let Err(e) = conn.set_blocking(false) {
            debug!(peer = %conn.peer(), error = %e, "failed to restore non-blocking mode");
            self.close(&conn);
            return;
        }
        if !self.poller(&conn).rearm(conn.token()) {
            debug!(peer = %conn.peer(), "connection evicted while in use");
        }
    }

    /// Resolves the session from the cookie, creating one when it is absent
    /// or expired. Returns the id of a newly created session.
    fn attach_session(&self, request: &mut Request) -> Option<String> {
        let existing = request
            .cookie(SESSION_COOKIE)
            .and_then(|id| self.sessions.get_session(id));

        let (session, created) = match existing {
            Some(session) => (session, None),
            None => {
                let session = self.sessions.create_session();
                let id = session.id().to_string();
                (session, Some(id))
            }
        };
        request.attach_session(session);
        created
    }

    fn respond(&self, request: &mut Request) -> Response {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(request)));

        match outcome {
            Ok(Ok(Some(response))) => response,
            Ok(Ok(None)) => self.static_files.serve(request.path()),
            Ok(Err(e)) => {
                let status = e.status_code();
                if status == StatusCode::InternalServerError {
                    warn!(uri = request.uri(), error = %e, "handler failed");
                }
                Response::error(status, &e.to_string())
            }
            Err(payload) => {
                let detail = panic_message(&*payload);
                error!(uri = request.uri(), panic = %detail, "handler panicked");
                Response::error(StatusCode::InternalServerError, &detail)
            }
        }
    }

    fn poller(&self, conn: &Connection) -> &Poller {
        &self.pollers[conn.poller()]
    }

    fn close(&self, conn: &Connection) {
        self.poller(conn).close_connection(conn);
    }
}

/// Reads until the buffer holds one complete request. `Ok(None)` means the
/// peer closed the stream.
fn read_request(conn: &Connection) -> Result<Option<Request>, ReadFailure> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        {
            let mut inbound = conn.inbound();
            match parse_request(&inbound) {
                Ok((request, consumed)) => {
                    inbound.advance(consumed);
                    return Ok(Some(request));
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(ReadFailure::Parse(e)),
            }
        }

        match conn.stream().read(&mut chunk) {
            Ok(0) => return Ok(None),
            Ok(n) => conn.inbound().extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ReadFailure::Io(e)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
