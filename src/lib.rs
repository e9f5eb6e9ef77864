//! # Portico
//!
//! **Portico** is an embeddable HTTP server: it runs inside a host
//! process, accepts TCP connections on a dedicated thread, serves each
//! connection on its own worker thread, and routes every request through
//! an interceptor-driven [`Dispatcher`] to registered handlers.
//!
//! ## Architecture
//!
//! - **[`server`]** - request/response types, the acceptor, connection
//!   workers and the [`Server`] lifecycle
//! - **[`protocol`]** - the blocking HTTP/1.1 engine (`httparse`) between a
//!   socket and the dispatcher
//! - **[`dispatcher`]** - the per-request decision chain
//! - **[`registry`]** / **[`router`]** - exact paths and mapping rules
//!   (path templates, methods, params, headers, media types)
//! - **[`interceptor`]**, **[`exception`]**, **[`website`]**,
//!   **[`session`]** - the pluggable collaborators
//! - **[`config`]** / **[`logging`]** - YAML plus environment configuration,
//!   `tracing` setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Acceptor as Acceptor<br/>(portico-acceptor)
//!     participant Worker as Worker<br/>(portico-conn-N)
//!     participant H1 as H1Service
//!     participant Dispatcher
//!     participant Interceptor
//!     participant Registry
//!     participant Handler
//!     participant Resolver as ExceptionResolver
//!
//!     Client->>Acceptor: connect
//!     Acceptor->>Worker: spawn with socket
//!     loop until closed or stopped
//!         Client->>Worker: HTTP request
//!         Worker->>H1: handle_request(conn)
//!         H1->>Dispatcher: dispatch(req, res, ctx)
//!         Dispatcher->>Interceptor: on_before_execute
//!         alt short-circuit
//!             Interceptor-->>Dispatcher: true
//!         else continue
//!             Dispatcher->>Registry: resolve(req)
//!             alt no handler
//!                 Dispatcher->>Resolver: NotFound
//!             else method not allowed
//!                 Dispatcher->>Resolver: MethodNotAllowed
//!             else matched
//!                 Dispatcher->>Handler: handle
//!                 alt Ok
//!                     Dispatcher->>Interceptor: on_after_execute
//!                 else Err or panic
//!                     Dispatcher->>Resolver: resolve_exception
//!                 end
//!             end
//!         end
//!         H1-->>Client: HTTP response
//!     end
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use http::Method;
//! use portico::{handler_fn, Server};
//!
//! let server = Server::builder()
//!     .port(8080)
//!     .register("/hello", handler_fn(|_req, res, _ctx| res.set_body("hello")))
//!     .register_with_methods(
//!         "/submit",
//!         &[Method::POST],
//!         handler_fn(|req, res, _ctx| res.set_body(format!("{} bytes", req.body().len()))),
//!     )
//!     .build();
//!
//! let addr = server.start()?;
//! println!("listening on {addr}");
//! # server.stop();
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! Handlers can also carry their own mapping with
//! [`request_mapping`](macro@request_mapping):
//!
//! ```rust,ignore
//! use portico::{request_mapping, server::{Context, Request, Response}};
//!
//! #[request_mapping(path = "/users/{id}", method = "GET", produces = "application/json")]
//! fn get_user(req: &mut Request, res: &mut Response, _ctx: &Context) -> portico::Result<()> {
//!     res.set_json(&serde_json::json!({ "id": req.path_param("id") }))
//! }
//!
//! let server = portico::Server::builder().register_mapped(GetUser)?.build();
//! ```

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exception;
pub mod handler;
pub mod interceptor;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod website;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{Error, ParamLocation, Result};
pub use exception::{DefaultExceptionResolver, ExceptionResolver, FallbackResolver};
pub use handler::{handler_fn, Filter, HandlerAdapter, MappedHandler, RequestHandler};
pub use interceptor::{CorsInterceptor, HandlerInterceptor, InterceptorChain};
pub use registry::HandlerRegistry;
pub use router::Mapping;
pub use server::{
    ChannelListener, Context, Request, Response, ResponseBody, Server, ServerBuilder, ServerEvent,
    ServerListener,
};
pub use session::{MemorySessionManager, Session, SessionManager};
pub use website::{StaticWebsite, Website};

pub use portico_macros::request_mapping;

#[doc(hidden)]
pub mod __private {
    pub use http::Method;
}
