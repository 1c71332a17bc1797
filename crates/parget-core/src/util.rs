//! Log helpers and the small file utilities the facade needs.

use std::path::Path;

use chrono::Local;

use crate::config;
use crate::uri::Uri;

/// Informational log line, timestamped, to stderr. Stderr keeps diagnostics
/// out of piped body output. Suppressed by PARGET_QUIET.
pub fn log(message: &str) {
    if !config::quiet() {
        eprintln!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
    }
}

/// Error log line, timestamped, to stderr. Never suppressed.
pub fn log_error(message: &str) {
    eprintln!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}

/// Output file name for a URI: the final path segment when there is one,
/// otherwise the host. `None` when the URI has neither.
pub fn file_name_for(uri: &Uri) -> Option<String> {
    if let Some(path) = uri.path() {
        if let Some(name) = path.rsplit('/').next() {
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    uri.host().map(str::to_string)
}

pub fn file_exists(path: &Path) -> bool {
    path.exists()
}
