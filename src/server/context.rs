use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;

use serde::{Serialize, Serializer};

/// Per-exchange identifier backed by ULID.
///
/// Taken from a well-formed inbound `X-Request-Id` header when present so that
/// callers can correlate their own logs, otherwise generated fresh.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Parse a header value, falling back to a new id on absence or garbage.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.trim().parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(RequestId)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Platform context of one exchange.
///
/// Carries what the transport knows about the connection and the identity of
/// the exchange. Created by the protocol service, borrowed by the dispatcher and
/// every handler; never shared across threads.
#[derive(Debug, Clone)]
pub struct Context {
    request_id: RequestId,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    received_at: Instant,
}

impl Context {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        peer_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            request_id,
            peer_addr,
            local_addr,
            received_at: Instant::now(),
        }
    }

    /// Context with no connection information, used when dispatching
    /// in-process (tests, embedding without a socket).
    #[must_use]
    pub fn detached() -> Self {
        Self::new(RequestId::new(), None, None)
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Instant the exchange's request head was fully parsed
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }
}
