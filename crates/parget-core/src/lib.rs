//! Core engine for parget: URI parsing, buffered TCP/TLS sockets, a
//! single-shot HTTP/1.1 fetcher and the bounded worker pool that drives
//! many fetchers at once. Used by the CLI binary; reusable by other tools.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod pool;
pub mod response;
pub mod socket;
pub mod uri;
pub mod util;

#[cfg(test)]
mod test_socket;

// Re-export the main API for the CLI.
pub use api::{write_into_files, write_into_stream, CompletionFn};
pub use downloader::HttpDownloader;
pub use error::DownloadError;
pub use pool::{DownloadCallback, DownloaderPool};
pub use response::{Headers, HttpResponse};
pub use socket::{default_factory, Socket, SocketFactory, TcpSocket, TlsSocket, TransferProgress};
pub use uri::Uri;
