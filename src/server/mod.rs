//! # Server Module
//!
//! The host-facing half of the crate: the request/response abstraction
//! handed to handlers, and the blocking thread-per-connection engine that
//! feeds it.
//!
//! ## Threads
//!
//! - one acceptor thread per running [`Server`] (`portico-acceptor`), the
//!   exclusive owner of the listening socket;
//! - one worker thread per accepted connection (`portico-conn-N`), the
//!   exclusive owner of that socket, looping over
//!   [`ProtocolService::handle_request`](crate::protocol::ProtocolService::handle_request)
//!   until the connection closes or the server stops.
//!
//! The dispatcher, registry, interceptor and resolver are shared read-only
//! across workers.

mod acceptor;
mod context;
mod cookie;
mod request;
mod response;
#[allow(clippy::module_inception)]
mod server;
mod worker;

pub use context::{Context, RequestId};
pub use cookie::{parse_cookie_header, Cookie, SameSite};
pub use request::{attr, normalize_path, Attributes, QueryVec, Request, MAX_INLINE_QUERY};
pub(crate) use request::media_essence;
pub use response::{Response, ResponseBody};
pub use server::{
    ChannelListener, NoopListener, Server, ServerBuilder, ServerEvent, ServerListener,
    SocketInitializer,
};
