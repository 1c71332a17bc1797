//! HTTP response container: status line and header parsing, body storage,
//! and ZSTD body decompression.

use std::collections::HashMap;
use std::io::Read;

use crate::error::DownloadError;

/// Header names are folded to lowercase; one value per name, last one wins.
pub type Headers = HashMap<String, String>;

#[derive(Debug, Default, Clone)]
pub struct HttpResponse {
    status_code: u16,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Header value by its lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Parse the status line and header block. Returns the index right after
    /// the terminating blank line, where the body starts.
    pub fn load_headers(&mut self, data: &[u8]) -> Result<usize, DownloadError> {
        let mut pos = 0;
        self.status_code = parse_status_line(data, &mut pos)?;
        self.headers.clear();
        loop {
            let (line, next) = next_line(data, pos).ok_or_else(|| {
                DownloadError::parse("headers", "missing terminating blank line")
            })?;
            pos = next;
            if line.is_empty() {
                return Ok(pos);
            }
            let text = std::str::from_utf8(line)
                .map_err(|_| DownloadError::parse("header line", "not valid UTF-8"))?;
            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| DownloadError::parse("header line", format!("no colon in {:?}", text)))?;
            let name = name.trim_start().to_ascii_lowercase();
            if name.is_empty() {
                return Err(DownloadError::parse("header line", "empty header name"));
            }
            self.headers.insert(name, value.trim_start().to_string());
        }
    }

    /// Take ownership of raw bytes as the body. No parsing.
    pub fn load_body(&mut self, data: Vec<u8>) {
        self.body = data;
    }

    /// Parse headers and treat the rest of the slice as the body.
    pub fn load_all(&mut self, data: &[u8]) -> Result<(), DownloadError> {
        let body_start = self.load_headers(data)?;
        self.body = data[body_start..].to_vec();
        Ok(())
    }

    /// Replace the body with its ZSTD-decompressed form. Frames that declare
    /// their content size decode in one shot; frames that do not are decoded
    /// through the streaming reader, which reports truncation as an error.
    pub fn decompress_body(&mut self) -> Result<(), DownloadError> {
        if self.body.is_empty() {
            return Err(DownloadError::decompress("body is empty"));
        }
        let content_size = zstd::zstd_safe::get_frame_content_size(&self.body)
            .map_err(|_| DownloadError::decompress("cannot determine decompressed size"))?;
        let decompressed = match content_size {
            Some(size) => zstd::bulk::decompress(&self.body, size as usize)
                .map_err(|e| DownloadError::decompress(e.to_string()))?,
            None => {
                let mut out = Vec::new();
                let mut decoder = zstd::stream::read::Decoder::new(&self.body[..])
                    .map_err(|e| DownloadError::decompress(e.to_string()))?;
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| DownloadError::decompress(e.to_string()))?;
                out
            }
        };
        self.body = decompressed;
        Ok(())
    }
}

/// Extract the decimal status code between the first and second space of the
/// status line. `pos` is left at the start of the first header line.
fn parse_status_line(data: &[u8], pos: &mut usize) -> Result<u16, DownloadError> {
    let (line, next) = next_line(data, *pos)
        .ok_or_else(|| DownloadError::parse("status line", "missing line terminator"))?;
    *pos = next;
    let text = std::str::from_utf8(line)
        .map_err(|_| DownloadError::parse("status line", "not valid UTF-8"))?;
    let mut parts = text.splitn(3, ' ');
    let _version = parts.next();
    let code = parts
        .next()
        .ok_or_else(|| DownloadError::parse("status line", format!("no status code in {:?}", text)))?;
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DownloadError::parse(
            "status line",
            format!("non-numeric status code {:?}", code),
        ));
    }
    let code: u16 = code
        .parse()
        .map_err(|_| DownloadError::parse("status line", "status code out of range"))?;
    if code < 100 {
        return Err(DownloadError::parse("status line", "status code below 100"));
    }
    Ok(code)
}

/// Next line starting at `start`, terminated by LF with an optional CR
/// before it. Returns the line without its terminator and the index past it,
/// or `None` when no terminator is found before the end of the data.
fn next_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    for i in start..data.len() {
        if data[i] == b'\n' {
            let end = if i > start && data[i - 1] == b'\r' { i - 1 } else { i };
            return Some((&data[start..end], i + 1));
        }
    }
    None
}
