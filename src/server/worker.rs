use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::protocol::{HttpConnection, ProtocolService};

/// Serves one connection on its own thread until the peer goes away, the
/// protocol service closes it, or the server stops.
pub(crate) struct ConnectionWorker {
    conn: HttpConnection,
    service: Arc<dyn ProtocolService>,
    running: Arc<AtomicBool>,
}

impl ConnectionWorker {
    pub(crate) fn new(
        conn: HttpConnection,
        service: Arc<dyn ProtocolService>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            conn,
            service,
            running,
        }
    }

    pub(crate) fn run(mut self) {
        let peer = self.conn.peer_addr();
        debug!(peer_addr = ?peer, "Connection opened");

        let mut exchanges = 0u64;
        while self.running.load(Ordering::Acquire) && self.conn.is_open() {
            match self.service.handle_request(&mut self.conn) {
                Ok(()) => exchanges += 1,
                Err(e) => {
                    debug!(peer_addr = ?peer, error = %e, "Closing connection after protocol error");
                    break;
                }
            }
        }

        self.conn.shutdown();
        debug!(peer_addr = ?peer, exchanges, "Connection closed");
    }
}
