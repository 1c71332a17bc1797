//! Plain TCP transport.

use std::net::TcpStream;

use crate::uri::Uri;
use crate::util;

use super::{establish_tcp, log_io, resolve_port, Connection, Socket, TransferProgress};

const DEFAULT_PORT: u16 = 80;

/// Blocking TCP socket with an internal read buffer. The OS descriptor is
/// closed when the socket drops or reconnects.
pub struct TcpSocket {
    progress: TransferProgress,
    conn: Option<Connection<TcpStream>>,
}

impl TcpSocket {
    pub fn new() -> Self {
        Self {
            progress: TransferProgress::default(),
            conn: None,
        }
    }

    fn connected(&mut self) -> Option<&mut Connection<TcpStream>> {
        if self.conn.is_none() {
            util::log_error("socket is not connected");
        }
        self.conn.as_mut()
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for TcpSocket {
    fn connect(&mut self, uri: &Uri) -> bool {
        self.conn = None;
        let Some(host) = uri.host() else {
            util::log_error(&format!("no host in URI: {}", uri));
            return false;
        };
        let port = resolve_port(uri, DEFAULT_PORT);
        match establish_tcp(host, port) {
            Ok(stream) => {
                self.progress.arm();
                self.conn = Some(Connection::new(stream, self.progress.clone()));
                true
            }
            Err(e) => {
                util::log_error(&format!("failed to connect to {}:{}: {}", host, port, e));
                false
            }
        }
    }

    fn read_until(&mut self, delimiter: &[u8]) -> Option<Vec<u8>> {
        self.connected()?
            .read_until(delimiter)
            .map_err(|e| log_io("receiving data", &e))
            .ok()
    }

    fn read_count(&mut self, count: usize) -> Option<Vec<u8>> {
        self.connected()?
            .read_count(count)
            .map_err(|e| log_io("receiving data", &e))
            .ok()
    }

    fn read_to_end(&mut self) -> Option<Vec<u8>> {
        self.connected()?
            .read_to_end()
            .map_err(|e| log_io("receiving data", &e))
            .ok()
    }

    fn write_all(&mut self, bytes: &[u8]) -> bool {
        let Some(conn) = self.connected() else {
            return false;
        };
        match conn.write_all(bytes) {
            Ok(()) => true,
            Err(e) => {
                log_io("sending data", &e);
                false
            }
        }
    }

    fn progress(&self) -> Option<(u64, u64)> {
        self.conn.as_ref()?;
        self.progress.snapshot()
    }

    fn progress_handle(&self) -> TransferProgress {
        self.progress.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Loopback server that writes `payload` to the first connection and
    /// closes. Returns the URI to reach it.
    fn serve(payload: &'static [u8]) -> Uri {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(payload);
            }
        });
        Uri::new(format!("http://127.0.0.1:{}", port))
    }

    #[test]
    fn test_connect_and_read_until() {
        let uri = serve(b"HTTP-ish header\r\n\r\ntrailing body");
        let mut socket = TcpSocket::new();
        assert!(socket.connect(&uri));
        assert_eq!(
            socket.read_until(b"\r\n\r\n").unwrap(),
            b"HTTP-ish header\r\n\r\n"
        );
        assert_eq!(socket.read_to_end().unwrap(), b"trailing body");
    }

    #[test]
    fn test_buffered_bytes_counted_once() {
        let uri = serve(b"line one\r\nline two\r\nrest of the stream");
        let mut socket = TcpSocket::new();
        assert!(socket.connect(&uri));
        socket.read_until(b"\r\n").unwrap();
        socket.read_until(b"\r\n").unwrap();
        let rest = socket.read_to_end().unwrap();
        let (read, _) = socket.progress().unwrap();
        assert_eq!(read, (b"line one\r\nline two\r\n".len() + rest.len()) as u64);
    }

    #[test]
    fn test_read_count_exact() {
        let uri = serve(b"0123456789");
        let mut socket = TcpSocket::new();
        assert!(socket.connect(&uri));
        assert_eq!(socket.read_count(5).unwrap(), b"01234");
        assert_eq!(socket.read_count(5).unwrap(), b"56789");
        // Peer is closed now, nothing more to read.
        assert!(socket.read_count(1).is_none());
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        // A port from the dynamic range with nothing bound to it.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let mut socket = TcpSocket::new();
        assert!(!socket.connect(&Uri::new(format!("http://127.0.0.1:{}", port))));
        assert!(socket.progress().is_none());
        assert!(socket.read_to_end().is_none());
        assert!(!socket.write_all(b"x"));
    }

    #[test]
    fn test_connect_without_host_fails() {
        let mut socket = TcpSocket::new();
        assert!(!socket.connect(&Uri::new("http://")));
    }

    #[test]
    fn test_progress_absent_before_connect() {
        assert!(TcpSocket::new().progress().is_none());
    }
}
