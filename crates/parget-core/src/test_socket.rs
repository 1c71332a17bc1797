//! In-memory scripted socket for unit tests: serves canned wire bytes and
//! only responds when the request line matches what the script expects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::socket::{Socket, SocketFactory};
use crate::uri::Uri;

#[derive(Clone)]
pub(crate) struct ScriptedSocket {
    wire: Vec<u8>,
    expected_host: String,
    expected_path: String,
    pos: usize,
    responding: bool,
}

impl ScriptedSocket {
    pub(crate) fn new(wire: impl Into<Vec<u8>>, host: &str, path: &str) -> Self {
        Self {
            wire: wire.into(),
            expected_host: host.to_string(),
            expected_path: path.to_string(),
            pos: 0,
            responding: false,
        }
    }
}

impl Socket for ScriptedSocket {
    fn connect(&mut self, _uri: &Uri) -> bool {
        self.pos = 0;
        self.responding = false;
        true
    }

    fn read_until(&mut self, delimiter: &[u8]) -> Option<Vec<u8>> {
        if !self.responding {
            return None;
        }
        let haystack = &self.wire[self.pos..];
        let at = haystack
            .windows(delimiter.len())
            .position(|w| w == delimiter)?;
        let end = at + delimiter.len();
        let out = haystack[..end].to_vec();
        self.pos += end;
        Some(out)
    }

    fn read_count(&mut self, count: usize) -> Option<Vec<u8>> {
        if !self.responding || self.pos + count > self.wire.len() {
            return None;
        }
        let out = self.wire[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Some(out)
    }

    fn read_to_end(&mut self) -> Option<Vec<u8>> {
        if !self.responding {
            return None;
        }
        let out = self.wire[self.pos..].to_vec();
        self.pos = self.wire.len();
        Some(out)
    }

    fn write_all(&mut self, bytes: &[u8]) -> bool {
        let request = String::from_utf8_lossy(bytes);
        self.responding = request
            .starts_with(&format!("GET {} HTTP/1.1\r\n", self.expected_path))
            && request.contains(&format!("Host: {}\r\n", self.expected_host));
        self.responding
    }

    fn progress(&self) -> Option<(u64, u64)> {
        None
    }
}

/// Factory that hands out a fresh copy of one scripted socket per call.
pub(crate) fn scripted_factory(socket: ScriptedSocket) -> Arc<SocketFactory> {
    Arc::new(move |_uri: &Uri| Box::new(socket.clone()) as Box<dyn Socket>)
}

/// Factory routing each URI to its own scripted socket, like a tiny network.
pub(crate) fn router_factory(table: HashMap<Uri, ScriptedSocket>) -> Arc<SocketFactory> {
    Arc::new(move |uri: &Uri| {
        let socket = table
            .get(uri)
            .cloned()
            .unwrap_or_else(|| ScriptedSocket::new("", "unrouted", "/unrouted"));
        Box::new(socket) as Box<dyn Socket>
    })
}
