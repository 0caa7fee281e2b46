use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::server::ServerCore;

/// Blocking listening socket owned by the acceptor thread.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub fn bind(addr: &str) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };
        let inner = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts until the server stops, handing each stream to a poller.
    pub fn run(self, core: Arc<ServerCore>) {
        info!(addr = %self.local_addr, "listening");

        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    if !core.is_running() {
                        break;
                    }
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(%peer, error = %e, "failed to configure accepted socket");
                        continue;
                    }
                    debug!(%peer, "accepted connection");
                    core.distribute(stream);
                }
                Err(e) if !core.is_running() => {
                    debug!(error = %e, "accept interrupted by shutdown");
                    break;
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        info!(addr = %self.local_addr, "acceptor stopped");
    }
}

/// Unblocks an acceptor parked in `accept` by connecting to it.
pub(crate) fn wake_acceptor(addr: SocketAddr) {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    };
    if let Err(e) = TcpStream::connect(target) {
        debug!(%target, error = %e, "acceptor wake-up connect failed");
    }
}
