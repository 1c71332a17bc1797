//! Single-URI HTTP fetcher: one GET round-trip per `download` call.

use std::sync::{Arc, Mutex};

use crate::error::DownloadError;
use crate::response::HttpResponse;
use crate::socket::{default_factory, Socket, SocketFactory, TransferProgress};
use crate::uri::Uri;
use crate::util;

/// Drives one HTTP GET at a time. A fresh socket is built from the factory
/// for every call and released when the call returns, on every exit path;
/// progress is observable from other threads only while that socket lives.
pub struct HttpDownloader {
    make_socket: Arc<SocketFactory>,
    progress: Mutex<Option<TransferProgress>>,
}

impl HttpDownloader {
    pub fn new(make_socket: Arc<SocketFactory>) -> Self {
        Self {
            make_socket,
            progress: Mutex::new(None),
        }
    }

    /// Downloader over the standard scheme-dispatching transports.
    pub fn with_default_transports() -> Self {
        Self::new(default_factory())
    }

    /// Fetch `uri`. Any failure (transport, parse, decompression) collapses
    /// into `None`; the specifics go to the error log.
    pub fn download(&self, uri: &Uri) -> Option<HttpResponse> {
        let mut socket = (self.make_socket)(uri);
        *self.progress.lock().unwrap() = Some(socket.progress_handle());
        let result = run_request(socket.as_mut(), uri);
        *self.progress.lock().unwrap() = None;
        drop(socket);
        match result {
            Ok(response) => Some(response),
            Err(e) => {
                util::log_error(&format!("download from {} failed: {}", uri, e));
                None
            }
        }
    }

    /// Byte counters of the transfer in flight, if any.
    pub fn progress(&self) -> Option<(u64, u64)> {
        self.progress
            .lock()
            .unwrap()
            .as_ref()
            .and_then(TransferProgress::snapshot)
    }
}

fn run_request(socket: &mut dyn Socket, uri: &Uri) -> Result<HttpResponse, DownloadError> {
    let host = uri
        .host()
        .ok_or_else(|| DownloadError::parse("uri", "missing host"))?
        .to_string();
    if !socket.connect(uri) {
        return Err(DownloadError::transport("connect", uri.full()));
    }
    let request = build_request(uri, &host);
    if !socket.write_all(request.as_bytes()) {
        return Err(DownloadError::transport("send request", uri.full()));
    }

    let header_bytes = socket
        .read_until(b"\r\n\r\n")
        .ok_or_else(|| DownloadError::transport("receive response headers", uri.full()))?;
    let mut response = HttpResponse::new();
    response.load_headers(&header_bytes)?;

    let body = read_body(socket, &response)?;
    response.load_body(body);

    if response
        .header("content-encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("zstd"))
    {
        response.decompress_body()?;
    }
    Ok(response)
}

/// `GET` request line plus the fixed header set. The request target keeps
/// the URI's query and fragment and falls back to `/` when there is no path.
fn build_request(uri: &Uri, host: &str) -> String {
    let mut target = uri.path().unwrap_or("/").to_string();
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    if let Some(fragment) = uri.fragment() {
        target.push('#');
        target.push_str(fragment);
    }
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: */*\r\nAccept-Encoding: identity, zstd\r\n\r\n",
        target, host
    )
}

/// Read the body with the framing the headers call for. Chunked wins over
/// Content-Length wins over read-to-close.
fn read_body(
    socket: &mut dyn Socket,
    response: &HttpResponse,
) -> Result<Vec<u8>, DownloadError> {
    if response
        .header("transfer-encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"))
    {
        return read_chunked(socket);
    }
    if let Some(value) = response.header("content-length") {
        let count = parse_content_length(value)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        return socket
            .read_count(count)
            .ok_or_else(|| DownloadError::transport("receive body", "connection closed early"));
    }
    socket
        .read_to_end()
        .ok_or_else(|| DownloadError::transport("receive body", "read failed"))
}

fn read_chunked(socket: &mut dyn Socket) -> Result<Vec<u8>, DownloadError> {
    let mut body = Vec::new();
    loop {
        let size_line = socket
            .read_until(b"\r\n")
            .ok_or_else(|| DownloadError::transport("receive chunk size", "connection closed"))?;
        let size = parse_chunk_size(&size_line)?;
        if size == 0 {
            return Ok(body);
        }
        // The chunk's own CRLF terminator rides along and is dropped here.
        let chunk = socket
            .read_count(size + 2)
            .ok_or_else(|| DownloadError::transport("receive chunk", "connection closed"))?;
        body.extend_from_slice(&chunk[..chunk.len() - 2]);
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, DownloadError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| DownloadError::parse("chunk size", "not valid UTF-8"))?;
    usize::from_str_radix(text.trim(), 16)
        .map_err(|_| DownloadError::parse("chunk size", format!("not hexadecimal: {:?}", text.trim())))
}

/// Content-Length must be digits through the very last character.
fn parse_content_length(value: &str) -> Result<usize, DownloadError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DownloadError::parse(
            "content length",
            format!("not a plain number: {:?}", value),
        ));
    }
    value
        .parse::<usize>()
        .map_err(|_| DownloadError::parse("content length", "value out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_socket::{scripted_factory, ScriptedSocket};

    fn downloader_for(wire: impl Into<Vec<u8>>, host: &str, path: &str) -> HttpDownloader {
        HttpDownloader::new(scripted_factory(ScriptedSocket::new(wire, host, path)))
    }

    #[test]
    fn test_content_length_happy_path() {
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nsome-header: value_of_header\r\nContent-Length: 10\r\n\r\n1234567890",
            "www.my.site.com",
            "/some/file.html",
        );
        let response = downloader
            .download(&Uri::new("http://www.my.site.com/some/file.html"))
            .unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.body(), b"1234567890");
        assert_eq!(response.header("content-length"), Some("10"));
        assert_eq!(response.header("some-header"), Some("value_of_header"));
    }

    #[test]
    fn test_chunked_happy_path() {
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nmore-random-header: value\r\nsome-header: value_of_header\r\n\
             Transfer-Encoding: chunked\r\n\r\nA\r\n1234567890\r\nC\r\n 12 14 18 15\r\n0\r\n",
            "ebay-bebay.com",
            "/",
        );
        let response = downloader
            .download(&Uri::new("some-proto://ebay-bebay.com"))
            .unwrap();
        assert_eq!(response.body(), b"1234567890 12 14 18 15");
        assert_eq!(response.body().len(), 22);
    }

    #[test]
    fn test_read_to_end_with_query_target() {
        let text = "a large enough text body, no framing headers at all. ".repeat(64);
        let wire = format!("HTTP/1.1 200 OK\r\nsome-header: v\r\n\r\n{}", text);
        let downloader = downloader_for(wire, "ebay-bebay.com", "/?q=cool+films");
        let response = downloader
            .download(&Uri::new("some-proto://ebay-bebay.com?q=cool+films"))
            .unwrap();
        assert_eq!(response.body(), text.as_bytes());
    }

    #[test]
    fn test_truncated_chunked_fails() {
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nA\r\n1234567890\r\nC\r\n 12 14",
            "ebay-bebay.com",
            "/",
        );
        assert!(downloader
            .download(&Uri::new("some-proto://ebay-bebay.com"))
            .is_none());
    }

    #[test]
    fn test_chunked_wins_over_content_length() {
        // Content-Length lies; the chunked framing is the one that parses.
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nContent-Length: 9999\r\nTransfer-Encoding: chunked\r\n\r\n\
             5\r\nhello\r\n0\r\n",
            "h",
            "/",
        );
        let response = downloader.download(&Uri::new("http://h")).unwrap();
        assert_eq!(response.body(), b"hello");
    }

    #[test]
    fn test_content_length_with_trailing_junk_fails() {
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nContent-Length: 10abc\r\n\r\n1234567890",
            "h",
            "/",
        );
        assert!(downloader.download(&Uri::new("http://h")).is_none());
    }

    #[test]
    fn test_content_length_zero_gives_empty_body() {
        let downloader = downloader_for("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n", "h", "/");
        let response = downloader.download(&Uri::new("http://h")).unwrap();
        assert!(response.body().is_empty());
        assert_eq!(response.status_code(), 204);
    }

    #[test]
    fn test_malformed_status_line_fails() {
        let downloader = downloader_for("HTTP/1.1 OK\r\n\r\n", "h", "/");
        assert!(downloader.download(&Uri::new("http://h")).is_none());
    }

    #[test]
    fn test_request_line_validated_by_peer() {
        // The scripted socket refuses to respond when the request line does
        // not match, which must surface as a failed download.
        let downloader = downloader_for("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n", "h", "/expected");
        assert!(downloader.download(&Uri::new("http://h/other")).is_none());
    }

    #[test]
    fn test_zstd_body_is_decompressed() {
        let plain = b"compressed on the wire, plain in the response".repeat(8);
        let compressed = zstd::bulk::compress(&plain, 3).unwrap();
        let mut wire = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: zstd\r\nContent-Length: {}\r\n\r\n",
            compressed.len()
        )
        .into_bytes();
        wire.extend_from_slice(&compressed);
        let downloader = downloader_for(wire, "h", "/");
        let response = downloader.download(&Uri::new("http://h")).unwrap();
        assert_eq!(response.body(), plain.as_slice());
    }

    #[test]
    fn test_corrupt_zstd_body_fails() {
        let downloader = downloader_for(
            "HTTP/1.1 200 OK\r\nContent-Encoding: zstd\r\nContent-Length: 7\r\n\r\nnotzstd",
            "h",
            "/",
        );
        assert!(downloader.download(&Uri::new("http://h")).is_none());
    }

    #[test]
    fn test_build_request_format() {
        let uri = Uri::new("http://example.com/a/b?x=1#frag");
        let request = build_request(&uri, "example.com");
        assert!(request.starts_with("GET /a/b?x=1#frag HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com\r\n"));
        assert!(request.contains("Accept: */*\r\n"));
        assert!(request.contains("Accept-Encoding: identity, zstd\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_request_default_path() {
        let request = build_request(&Uri::new("http://example.com"), "example.com");
        assert!(request.starts_with("GET / HTTP/1.1\r\n"));
    }

    #[test]
    fn test_progress_absent_outside_download() {
        let downloader = downloader_for("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n", "h", "/");
        assert!(downloader.progress().is_none());
        downloader.download(&Uri::new("http://h")).unwrap();
        assert!(downloader.progress().is_none());
    }
}
