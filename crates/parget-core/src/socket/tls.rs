//! TLS transport: a plaintext TCP connection wrapped in a rustls client
//! session. Certificate chain and hostname checks run during the handshake
//! against the system trust store.

use std::net::TcpStream;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::uri::Uri;
use crate::util;

use super::{establish_tcp, log_io, resolve_port, Connection, Socket, TransferProgress};

const DEFAULT_PORT: u16 = 443;

// Trust store loading happens exactly once per process; constructors must
// stay cheap because the pool creates one socket per task.
static TLS_CONFIG: OnceLock<Option<Arc<ClientConfig>>> = OnceLock::new();

fn client_config() -> Option<Arc<ClientConfig>> {
    TLS_CONFIG
        .get_or_init(|| {
            let certs = match rustls_native_certs::load_native_certs() {
                Ok(certs) => certs,
                Err(e) => {
                    util::log_error(&format!("failed to load system trust store: {}", e));
                    return None;
                }
            };
            let mut roots = RootCertStore::empty();
            for cert in certs {
                // The OS store can contain stale or malformed entries.
                if let Err(e) = roots.add(cert) {
                    util::log(&format!("skipping unusable root certificate: {}", e));
                }
            }
            if roots.is_empty() {
                util::log_error("no usable certificates in the system trust store");
                return None;
            }
            // rustls only speaks TLS 1.2 and newer.
            Some(Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            ))
        })
        .clone()
}

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// TLS socket with the same buffered read surface as [`TcpSocket`].
///
/// [`TcpSocket`]: super::TcpSocket
pub struct TlsSocket {
    progress: TransferProgress,
    conn: Option<Connection<TlsStream>>,
}

impl TlsSocket {
    pub fn new() -> Self {
        Self {
            progress: TransferProgress::default(),
            conn: None,
        }
    }

    fn connected(&mut self) -> Option<&mut Connection<TlsStream>> {
        if self.conn.is_none() {
            util::log_error("socket is not connected");
        }
        self.conn.as_mut()
    }

    fn handshake(uri: &Uri, host: &str) -> Result<TlsStream, String> {
        let config = client_config().ok_or("TLS configuration unavailable")?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| format!("invalid server name {}: {}", host, e))?;
        let mut session = ClientConnection::new(config, server_name)
            .map_err(|e| format!("failed to create TLS session: {}", e))?;

        let port = resolve_port(uri, DEFAULT_PORT);
        let mut stream =
            establish_tcp(host, port).map_err(|e| format!("failed to connect to {}:{}: {}", host, port, e))?;

        // Drive the handshake to completion; SNI carries `host`, and rustls
        // verifies the chain and hostname before this loop can finish.
        while session.is_handshaking() {
            session
                .complete_io(&mut stream)
                .map_err(|e| format!("TLS handshake with {} failed: {}", host, e))?;
        }
        if session
            .peer_certificates()
            .is_none_or(|certs| certs.is_empty())
        {
            return Err(format!("{} presented no certificate", host));
        }
        Ok(StreamOwned::new(session, stream))
    }
}

impl Default for TlsSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for TlsSocket {
    fn connect(&mut self, uri: &Uri) -> bool {
        self.conn = None;
        let Some(host) = uri.host() else {
            util::log_error(&format!("no host in URI: {}", uri));
            return false;
        };
        match Self::handshake(uri, host) {
            Ok(stream) => {
                self.progress.arm();
                self.conn = Some(Connection::new(stream, self.progress.clone()));
                true
            }
            Err(e) => {
                util::log_error(&e);
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
        // A clean close_notify surfaces as EOF; a peer that just drops the
        // TCP stream surfaces as an error and fails the read.
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
