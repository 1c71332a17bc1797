//! Blocking socket transports with a buffered read interface.
//!
//! Both concrete transports (plain TCP and TLS) share the same surface: a
//! `connect` by URI, three read primitives that drain an internal buffer
//! before touching the wire, an all-or-nothing write, and byte-accurate
//! progress counters that can be observed from another thread.

pub mod tcp;
pub mod tls;

pub use tcp::TcpSocket;
pub use tls::TlsSocket;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::uri::Uri;
use crate::util;

pub const BUFFER_SIZE: usize = 4096;

/// Shared transfer counters. The socket that owns a handle updates it as
/// bytes move; any number of clones may snapshot it concurrently.
#[derive(Clone, Debug, Default)]
pub struct TransferProgress {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicBool,
    read: AtomicU64,
    expected: AtomicU64,
}

impl TransferProgress {
    /// `(bytes_read, bytes_expected)`, or `None` before the counters are
    /// armed by a successful connect.
    pub fn snapshot(&self) -> Option<(u64, u64)> {
        if !self.inner.active.load(Ordering::Relaxed) {
            return None;
        }
        Some((
            self.inner.read.load(Ordering::Relaxed),
            self.inner.expected.load(Ordering::Relaxed),
        ))
    }

    pub(crate) fn arm(&self) {
        self.inner.read.store(0, Ordering::Relaxed);
        self.inner.expected.store(0, Ordering::Relaxed);
        self.inner.active.store(true, Ordering::Relaxed);
    }

    pub(crate) fn add_read(&self, n: u64) {
        self.inner.read.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_expected(&self, n: u64) {
        self.inner.expected.fetch_add(n, Ordering::Relaxed);
    }
}

/// A blocking bidirectional byte transport.
pub trait Socket: Send {
    /// Resolve the URI's host, establish the transport and arm the progress
    /// counters. After a failed attempt the socket is disconnected.
    fn connect(&mut self, uri: &Uri) -> bool;

    /// Read until (and including) the first occurrence of `delimiter`.
    /// `None` on EOF or I/O error before the delimiter is seen. Bytes
    /// received past the delimiter stay buffered for later reads.
    fn read_until(&mut self, delimiter: &[u8]) -> Option<Vec<u8>>;

    /// Read exactly `count` bytes; `None` on failure or early close.
    fn read_count(&mut self, count: usize) -> Option<Vec<u8>>;

    /// Read everything until the peer closes the connection.
    fn read_to_end(&mut self) -> Option<Vec<u8>>;

    /// Write all bytes, retrying short writes; `false` on any I/O error.
    fn write_all(&mut self, bytes: &[u8]) -> bool;

    /// Current byte counters, or `None` when the transport cannot estimate.
    fn progress(&self) -> Option<(u64, u64)>;

    /// A cloneable handle onto the same counters, for observers on other
    /// threads. The default handle never reports progress.
    fn progress_handle(&self) -> TransferProgress {
        TransferProgress::default()
    }
}

/// Constructs a fresh socket for a URI; the pool calls this once per task.
pub type SocketFactory = dyn Fn(&Uri) -> Box<dyn Socket> + Send + Sync;

/// Scheme-dispatching factory: `https` gets TLS, everything else plain TCP.
pub fn default_factory() -> Arc<SocketFactory> {
    Arc::new(|uri: &Uri| match uri.scheme() {
        Some("https") => Box::new(TlsSocket::new()) as Box<dyn Socket>,
        _ => Box::new(TcpSocket::new()),
    })
}

/// Port for a connection attempt: the URI's explicit port when present,
/// else the scheme's well-known port, else the transport's default.
pub(crate) fn resolve_port(uri: &Uri, transport_default: u16) -> u16 {
    if let Some(port) = uri.explicit_port() {
        return port;
    }
    match uri.scheme() {
        Some("http") => 80,
        Some("https") => 443,
        _ => transport_default,
    }
}

/// Resolve every address for `host`, IPv4 candidates first.
pub(crate) fn resolve_candidates(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let mut addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    addrs.sort_by_key(|addr| !addr.is_ipv4());
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", host),
        ));
    }
    Ok(addrs)
}

/// Try each candidate address in order; first clean connect wins.
pub(crate) fn establish_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in resolve_candidates(host, port)? {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidate connected")))
}

/// The buffered half of a connected transport, generic over the underlying
/// stream so TCP and TLS share one implementation.
pub(crate) struct Connection<S> {
    stream: S,
    buf: [u8; BUFFER_SIZE],
    // End of valid buffered data; bytes before it have been received but
    // not yet handed to a caller.
    valid_end: usize,
    progress: TransferProgress,
}

impl<S: Read + Write> Connection<S> {
    pub(crate) fn new(stream: S, progress: TransferProgress) -> Self {
        Self {
            stream,
            buf: [0; BUFFER_SIZE],
            valid_end: 0,
            progress,
        }
    }

    pub(crate) fn read_until(&mut self, delimiter: &[u8]) -> io::Result<Vec<u8>> {
        if delimiter.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty delimiter"));
        }
        let mut out = Vec::new();
        loop {
            let mut taken = 0;
            while taken < self.valid_end {
                out.push(self.buf[taken]);
                taken += 1;
                if out.ends_with(delimiter) {
                    self.consume(taken);
                    self.count(taken);
                    return Ok(out);
                }
            }
            // The whole buffer was scanned without a match.
            self.count(self.valid_end);
            self.valid_end = 0;
            let received = self.refill()?;
            if received == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before delimiter",
                ));
            }
        }
    }

    pub(crate) fn read_count(&mut self, count: usize) -> io::Result<Vec<u8>> {
        self.progress.add_expected(count as u64);
        let mut out = Vec::with_capacity(count);
        loop {
            let take = self.valid_end.min(count - out.len());
            out.extend_from_slice(&self.buf[..take]);
            self.consume(take);
            self.progress.add_read(take as u64);
            if out.len() == count {
                return Ok(out);
            }
            let received = self.refill()?;
            if received == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before full count",
                ));
            }
        }
    }

    pub(crate) fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(BUFFER_SIZE * 4);
        out.extend_from_slice(&self.buf[..self.valid_end]);
        self.count(self.valid_end);
        self.valid_end = 0;
        loop {
            let received = self.refill()?;
            if received == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&self.buf[..received]);
            self.count(received);
            self.valid_end = 0;
        }
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Receive into the buffer, looping past interrupts. Leaves the received
    /// bytes as the valid region.
    fn refill(&mut self) -> io::Result<usize> {
        loop {
            match self.stream.read(&mut self.buf) {
                Ok(n) => {
                    self.valid_end = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop `n` consumed bytes and shift the unread remainder to the front
    /// so later reads observe it before any new receive.
    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.valid_end, 0);
        self.valid_end -= n;
    }

    fn count(&self, n: usize) {
        self.progress.add_read(n as u64);
        self.progress.add_expected(n as u64);
    }
}

pub(crate) fn log_io(operation: &str, error: &io::Error) {
    util::log_error(&format!("error while {}: {}", operation, error));
}
