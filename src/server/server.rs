//! Server lifecycle: build once, then `start()` / `stop()` any number of
//! times. Each `start()` spawns a fresh acceptor generation.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::Method;
use tracing::{debug, info, warn};

use super::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, DispatcherBuilder};
use crate::error::Result;
use crate::exception::ExceptionResolver;
use crate::handler::{Filter, HandlerAdapter, MappedHandler, RequestHandler};
use crate::interceptor::HandlerInterceptor;
use crate::protocol::{H1Config, H1Service, HttpHandler, ProtocolService};
use crate::registry::HandlerRegistry;
use crate::router::Mapping;
use crate::session::SessionManager;
use crate::website::Website;

/// How long `stop()` waits for the wake-up connection to be established
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Startup, shutdown and error notifications. Called on the acceptor
/// thread.
pub trait ServerListener: Send + Sync {
    fn on_started(&self, _addr: SocketAddr) {}
    fn on_stopped(&self) {}
    fn on_error(&self, _error: &io::Error) {}
}

/// Listener that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ServerListener for NoopListener {}

/// Lifecycle events as values, for [`ChannelListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Started(SocketAddr),
    Stopped,
    Error { kind: io::ErrorKind, message: String },
}

/// Forwards lifecycle events to a channel so another thread can react to
/// them without sharing state with the acceptor.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::Sender<ServerEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { sender }
    }

    /// Listener plus the receiving end
    pub fn channel() -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            debug!("Server event receiver dropped");
        }
    }
}

impl ServerListener for ChannelListener {
    fn on_started(&self, addr: SocketAddr) {
        self.send(ServerEvent::Started(addr));
    }

    fn on_stopped(&self) {
        self.send(ServerEvent::Stopped);
    }

    fn on_error(&self, error: &io::Error) {
        self.send(ServerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// Hook run on every accepted socket before a worker is spawned. An error
/// drops the connection.
pub type SocketInitializer = Arc<dyn Fn(&TcpStream) -> io::Result<()> + Send + Sync>;

struct RunningState {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// An embeddable HTTP server.
///
/// Immutable once built. Owns at most one live acceptor; every accepted
/// connection gets its own worker thread.
///
/// ```no_run
/// use portico::{handler_fn, Server};
///
/// let server = Server::builder()
///     .port(0)
///     .register("/hello", handler_fn(|_req, res, _ctx| {
///         res.set_body(portico::server::ResponseBody::text("hello"))
///     }))
///     .build();
/// let addr = server.start()?;
/// println!("listening on {addr}");
/// server.stop();
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Server {
    config: ServerConfig,
    timeout: Duration,
    dispatcher: Arc<Dispatcher>,
    service: Arc<dyn ProtocolService>,
    listener: Arc<dyn ServerListener>,
    socket_initializer: Option<SocketInitializer>,
    state: Mutex<Option<RunningState>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Bind and start accepting.
    ///
    /// Blocks until the listening socket is bound. A bind failure is
    /// reported to the listener's `on_error` and returned; nothing is
    /// left running. Calling `start()` on a running server returns the
    /// current address.
    pub fn start(&self) -> io::Result<SocketAddr> {
        let mut state = self.lock_state();
        if let Some(current) = state.as_ref() {
            if current.running.load(Ordering::Acquire) {
                debug!(addr = %current.local_addr, "Server already running");
                return Ok(current.local_addr);
            }
        }
        if let Some(stale) = state.take() {
            if stale.thread.join().is_err() {
                warn!("Previous acceptor thread panicked");
            }
        }

        let running = Arc::new(AtomicBool::new(false));
        let (bound_tx, bound_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let acceptor = Acceptor {
            addr: self.config.socket_addr(),
            backlog: self.config.backlog,
            timeout: self.timeout,
            buffer_size: self.config.buffer_size,
            service: Arc::clone(&self.service),
            running: Arc::clone(&running),
            listener: Arc::clone(&self.listener),
            socket_initializer: self.socket_initializer.clone(),
        };
        let thread = thread::Builder::new()
            .name("portico-acceptor".to_string())
            .spawn(move || acceptor.run(bound_tx, done_tx))?;

        let bound = bound_rx.recv().unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "acceptor exited before binding",
            ))
        });
        match bound {
            Ok(local_addr) => {
                info!(
                    addr = %local_addr,
                    handlers = self.dispatcher.registry().len(),
                    keep_alive = self.config.keep_alive,
                    "Server started"
                );
                *state = Some(RunningState {
                    local_addr,
                    running,
                    thread,
                    done: done_rx,
                });
                Ok(local_addr)
            }
            Err(e) => {
                if thread.join().is_err() {
                    warn!("Acceptor thread panicked during bind");
                }
                Err(e)
            }
        }
    }

    /// Stop accepting and close the listening socket.
    ///
    /// Waits up to `shutdown_grace_ms` for the acceptor to finish. Workers
    /// already serving a connection finish their current exchange and then
    /// exit.
    pub fn stop(&self) {
        let Some(state) = self.lock_state().take() else {
            return;
        };
        info!(addr = %state.local_addr, "Stopping server");
        state.running.store(false, Ordering::Release);
        wake_acceptor(state.local_addr);

        match state.done.recv_timeout(self.config.shutdown_grace()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if state.thread.join().is_err() {
                    warn!("Acceptor thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.config.shutdown_grace_ms,
                    "Acceptor did not stop within the grace period"
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_state()
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::Acquire))
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state().as_ref().map(|s| s.local_addr)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RunningState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
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
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .field("dispatcher", &self.dispatcher)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Unblock a pending `accept()` by connecting to it
fn wake_acceptor(addr: SocketAddr) {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    };
    if let Err(e) = TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
        debug!(addr = %target, error = %e, "Wake-up connection failed");
    }
}

/// Individual builder settings, applied over the base config at build time
#[derive(Debug, Default, Clone)]
struct ConfigOverrides {
    port: Option<u16>,
    bind_address: Option<IpAddr>,
    backlog: Option<i32>,
    keep_alive: Option<bool>,
    max_body_bytes: Option<usize>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(addr) = self.bind_address {
            config.bind_address = addr;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(keep_alive) = self.keep_alive {
            config.keep_alive = keep_alive;
        }
        if let Some(limit) = self.max_body_bytes {
            config.max_body_bytes = limit;
        }
    }
}

/// Builder for [`Server`].
///
/// Settings given here take priority over the [`ServerConfig`] passed to
/// [`config`](Self::config), whichever order the calls are made in.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    overrides: ConfigOverrides,
    timeout: Option<Duration>,
    dispatcher: DispatcherBuilder,
    listener: Option<Arc<dyn ServerListener>>,
    socket_initializer: Option<SocketInitializer>,
}

impl ServerBuilder {
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.overrides.port = Some(port);
        self
    }

    #[must_use]
    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.overrides.bind_address = Some(addr);
        self
    }

    /// Socket read/write timeout with sub-second precision
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.overrides.backlog = Some(backlog);
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.overrides.keep_alive = Some(keep_alive);
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.overrides.max_body_bytes = Some(limit);
        self
    }

    #[must_use]
    pub fn register<H: RequestHandler + 'static>(mut self, path: &str, handler: H) -> Self {
        self.dispatcher = self.dispatcher.register(path, handler);
        self
    }

    #[must_use]
    pub fn register_with_methods<H: RequestHandler + 'static>(
        mut self,
        path: &str,
        methods: &[Method],
        handler: H,
    ) -> Self {
        self.dispatcher = self.dispatcher.register_with_methods(path, methods, handler);
        self
    }

    #[must_use]
    pub fn register_mapping<H: RequestHandler + 'static>(
        mut self,
        mapping: Mapping,
        handler: H,
    ) -> Self {
        self.dispatcher.registry_mut().register_mapping(mapping, handler);
        self
    }

    pub fn register_mapped<H: MappedHandler + 'static>(mut self, handler: H) -> Result<Self> {
        self.dispatcher.registry_mut().register_mapped(handler)?;
        Ok(self)
    }

    pub fn register_adapter(mut self, adapter: &dyn HandlerAdapter) -> Result<Self> {
        self.dispatcher.registry_mut().register_adapter(adapter)?;
        Ok(self)
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        self.dispatcher.registry_mut()
    }

    #[must_use]
    pub fn website<W: Website + 'static>(mut self, website: W) -> Self {
        self.dispatcher = self.dispatcher.website(website);
        self
    }

    #[must_use]
    pub fn interceptor<I: HandlerInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.dispatcher = self.dispatcher.interceptor(interceptor);
        self
    }

    #[must_use]
    pub fn filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.dispatcher = self.dispatcher.filter(filter);
        self
    }

    #[must_use]
    pub fn exception_resolver<R: ExceptionResolver + 'static>(mut self, resolver: R) -> Self {
        self.dispatcher = self.dispatcher.exception_resolver(resolver);
        self
    }

    #[must_use]
    pub fn session_manager<S: SessionManager + 'static>(mut self, manager: S) -> Self {
        self.dispatcher = self.dispatcher.session_manager(manager);
        self
    }

    #[must_use]
    pub fn listener<L: ServerListener + 'static>(mut self, listener: L) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn socket_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&TcpStream) -> io::Result<()> + Send + Sync + 'static,
    {
        self.socket_initializer = Some(Arc::new(init));
        self
    }

    pub fn build(mut self) -> Server {
        self.overrides.apply(&mut self.config);
        let dispatcher = Arc::new(self.dispatcher.build());
        let handler: Arc<dyn HttpHandler> = Arc::clone(&dispatcher) as Arc<dyn HttpHandler>;
        let service: Arc<dyn ProtocolService> =
            Arc::new(H1Service::new(handler, H1Config::from(&self.config)));
        Server {
            timeout: self.timeout.unwrap_or_else(|| self.config.timeout()),
            config: self.config,
            dispatcher,
            service,
            listener: self.listener.unwrap_or_else(|| Arc::new(NoopListener)),
            socket_initializer: self.socket_initializer,
            state: Mutex::new(None),
        }
    }
}
