use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::server::{ServerListener, SocketInitializer};
use super::worker::ConnectionWorker;
use crate::protocol::{HttpConnection, ProtocolService};

/// Pause after a failed `accept()` so a persistent error (e.g. EMFILE) does
/// not spin the acceptor thread
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Bind a listening socket with `SO_REUSEADDR`
pub(crate) fn bind(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Everything one acceptor generation needs
pub(crate) struct Acceptor {
    pub(crate) addr: SocketAddr,
    pub(crate) backlog: i32,
    pub(crate) timeout: Duration,
    pub(crate) buffer_size: usize,
    pub(crate) service: Arc<dyn ProtocolService>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) listener: Arc<dyn ServerListener>,
    pub(crate) socket_initializer: Option<SocketInitializer>,
}

/// Runs the shutdown routine however the accept loop exits
struct ShutdownGuard {
    running: Arc<AtomicBool>,
    listener: Arc<dyn ServerListener>,
    done: mpsc::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        info!("Acceptor stopped");
        self.listener.on_stopped();
        // stop() may have given up waiting already
        if self.done.send(()).is_err() {
            debug!("No one waiting for acceptor shutdown");
        }
    }
}

impl Acceptor {
    /// Body of the acceptor thread.
    ///
    /// Reports the bind outcome through `bound` before entering the loop.
    /// A bind failure goes to `on_error` and ends the thread without
    /// starting the loop.
    pub(crate) fn run(
        self,
        bound: mpsc::Sender<io::Result<SocketAddr>>,
        done: mpsc::Sender<()>,
    ) {
        let bound_socket = match bind(self.addr, self.backlog).and_then(|l| {
            let local = l.local_addr()?;
            Ok((l, local))
        }) {
            Ok(bound_socket) => bound_socket,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "Failed to bind listening socket");
                self.listener.on_error(&e);
                if bound.send(Err(e)).is_err() {
                    debug!("start() no longer waiting for bind result");
                }
                return;
            }
        };

        self.running.store(true, Ordering::Release);
        let _guard = ShutdownGuard {
            running: Arc::clone(&self.running),
            listener: Arc::clone(&self.listener),
            done,
        };
        // bound after the guard so the socket is closed before on_stopped fires
        let (tcp_listener, local_addr) = bound_socket;

        info!(addr = %local_addr, backlog = self.backlog, "Acceptor listening");
        self.listener.on_started(local_addr);
        if bound.send(Ok(local_addr)).is_err() {
            debug!("start() no longer waiting for bind result");
        }

        let connection_ids = AtomicU64::new(0);
        while self.running.load(Ordering::Acquire) {
            match tcp_listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running.load(Ordering::Acquire) {
                        debug!(peer_addr = %peer, "Accept woken for shutdown");
                        break;
                    }
                    let id = connection_ids.fetch_add(1, Ordering::Relaxed);
                    self.spawn_worker(id, stream, peer);
                }
                Err(e) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    if e.kind() != io::ErrorKind::Interrupted {
                        warn!(error = %e, "Accept failed");
                        self.listener.on_error(&e);
                        thread::sleep(ACCEPT_BACKOFF);
                    }
                }
            }
        }
    }

    fn spawn_worker(&self, id: u64, stream: TcpStream, peer: SocketAddr) {
        if let Some(init) = &self.socket_initializer {
            if let Err(e) = init(&stream) {
                debug!(peer_addr = %peer, error = %e, "Socket initializer rejected connection");
                return;
            }
        }
        let conn = match HttpConnection::new(stream, self.timeout, self.buffer_size) {
            Ok(conn) => conn,
            Err(e) => {
                debug!(peer_addr = %peer, error = %e, "Failed to configure connection");
                return;
            }
        };
        let worker = ConnectionWorker::new(conn, Arc::clone(&self.service), Arc::clone(&self.running));
        let spawned = thread::Builder::new()
            .name(format!("portico-conn-{id}"))
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            warn!(peer_addr = %peer, error = %e, "Failed to spawn connection worker");
        }
    }
}
