//! # Router Module
//!
//! Structured mapping rules: the predicate half of the handler registry.
//!
//! ## Overview
//!
//! A [`Mapping`] combines
//! - one or more path templates ([`PathTemplate`]) with `{var}`, `*` and a
//!   trailing `**`,
//! - an allowed method set (empty = any, `HEAD` implied by `GET`),
//! - query/form parameter and header [`Condition`]s,
//! - consumable and producible media types ([`MediaRule`]).
//!
//! ## Architecture
//!
//! Templates are compiled once into anchored regexes at registration time.
//! Matching a request runs the checks in a fixed order (path, method,
//! params, headers, consumes, produces) so the registry can report the
//! rejection that got furthest when no rule fully matches.
//!
//! ## Example
//!
//! ```rust
//! use portico::router::PathTemplate;
//!
//! let t = PathTemplate::parse("/users/{id}/posts/*").unwrap();
//! let params = t.matches("/users/42/posts/latest").unwrap();
//! assert_eq!(params[0].1, "42");
//! assert!(t.matches("/users/42").is_none());
//! ```

use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

mod mapping;
mod template;
#[cfg(test)]
mod tests;

pub use mapping::{Condition, Mapping, MappingBuilder, MediaRule};
pub(crate) use mapping::{Evaluation, Stage};
pub use template::{PathTemplate, Specificity};

/// Maximum number of path parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated storage for captured path variables
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Whether `method` passes an allowed-method set.
///
/// An empty set allows everything; `HEAD` is allowed wherever `GET` is.
pub fn method_allowed(allowed: &[Method], method: &Method) -> bool {
    allowed.is_empty()
        || allowed.contains(method)
        || (*method == Method::HEAD && allowed.contains(&Method::GET))
}
