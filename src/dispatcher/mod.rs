//! # Dispatcher Module
//!
//! The dispatcher is the heart of portico: every exchange a protocol service
//! parses is handed to [`Dispatcher::dispatch`] together with a fresh
//! [`Response`](crate::server::Response) and the connection's
//! [`Context`](crate::server::Context).
//!
//! ## Request Flow
//!
//! ```mermaid
//! flowchart TD
//!     A[exchange] --> B{interceptor before}
//!     B -- handled --> Z[response]
//!     B -- continue --> C{website intercepts?}
//!     C -- yes --> E[website handler]
//!     C -- no --> D{registry: exact, then mapping rules}
//!     D -- none --> NF[NotFound]
//!     D -- rejected --> RJ[405 / 400 / 415 / 406]
//!     D -- handler --> M{method allowed?}
//!     E --> M
//!     M -- no --> MNS[MethodNotSupported]
//!     M -- yes --> F[filter, then handler]
//!     F --> G[interceptor after]
//!     G --> Z
//!     NF & RJ & MNS & F -. error or panic .-> R[exception resolver]
//!     R -. fails .-> FB[fallback: bare 500]
//!     R --> Z
//!     FB --> Z
//! ```
//!
//! ## Error Handling
//!
//! - Handler, filter and interceptor errors go to the exception resolver
//! - Panics anywhere in those steps are caught and become
//!   [`Error::HandlerPanicked`](crate::Error::HandlerPanicked)
//! - If the resolver itself errors or panics the fixed fallback writes a
//!   `500` with an empty body
//! - `on_after_execute` only runs on the success path
//!
//! ## Sessions
//!
//! When a session manager is configured it is attached to every request; a
//! session created during a successful exchange is announced to the client
//! with a `Set-Cookie`.

mod core;

pub use core::{Dispatcher, DispatcherBuilder, REQUEST_ID_HEADER};
