use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

/// One accepted TCP connection plus the bytes read from it but not yet
/// consumed by the protocol service.
///
/// Owned exclusively by its connection worker.
#[derive(Debug)]
pub struct HttpConnection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    buffer: Vec<u8>,
    read_chunk: usize,
    open: bool,
}

impl HttpConnection {
    /// Wrap an accepted stream, applying the socket timeout to reads and
    /// writes and disabling Nagle.
    ///
    /// A zero `timeout` means block indefinitely.
    pub fn new(stream: TcpStream, timeout: Duration, buffer_size: usize) -> io::Result<Self> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            peer_addr: stream.peer_addr().ok(),
            local_addr: stream.local_addr().ok(),
            stream,
            buffer: Vec::with_capacity(buffer_size),
            read_chunk: buffer_size.max(512),
            open: true,
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mark the connection as finished; the worker shuts it down afterwards
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop `n` bytes from the front of the buffer
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n);
    }

    /// Remove and return the first `n` buffered bytes
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n).collect()
    }

    /// Read once from the socket into the buffer. `Ok(0)` is end of stream.
    pub fn fill(&mut self) -> io::Result<usize> {
        let start = self.buffer.len();
        self.buffer.resize(start + self.read_chunk, 0);
        loop {
            match self.stream.read(&mut self.buffer[start..]) {
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e);
                }
            }
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Close both directions, ignoring errors from an already-dead socket
    pub fn shutdown(&mut self) {
        self.open = false;
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                debug!(peer_addr = ?self.peer_addr, error = %e, "Connection shutdown failed");
            }
        }
    }
}
