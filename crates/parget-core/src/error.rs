//! Error types for the downloader engine.

use std::fmt;

/// Failure of a single download attempt.
///
/// The fetcher collapses all of these into an absent response before they
/// reach a pool callback; the variants exist so internal code can propagate
/// with `?` and so the error log stays specific.
#[derive(Debug, Clone)]
pub enum DownloadError {
    /// Malformed input: URI, status line, header block, chunk size or
    /// Content-Length value.
    Parse { what: String, detail: String },
    /// DNS, connect, read/write, TLS handshake or verification failure.
    Transport { operation: String, detail: String },
    /// ZSTD frame error or truncated compressed stream.
    Decompress { detail: String },
}

impl DownloadError {
    pub fn parse(what: &str, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.to_string(),
            detail: detail.into(),
        }
    }

    pub fn transport(operation: &str, detail: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            detail: detail.into(),
        }
    }

    pub fn decompress(detail: impl Into<String>) -> Self {
        Self::Decompress {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Parse { what, detail } => {
                write!(f, "failed to parse {}: {}", what, detail)
            }
            DownloadError::Transport { operation, detail } => {
                write!(f, "transport error during {}: {}", operation, detail)
            }
            DownloadError::Decompress { detail } => {
                write!(f, "failed to decompress body: {}", detail)
            }
        }
    }
}

impl std::error::Error for DownloadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = DownloadError::parse("status line", "non-numeric code");
        assert_eq!(
            err.to_string(),
            "failed to parse status line: non-numeric code"
        );

        let err = DownloadError::transport("connect", "connection refused");
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("connection refused"));
    }
}
