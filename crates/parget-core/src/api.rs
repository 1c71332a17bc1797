//! Facade over the engine: read URIs line by line and either fan them out
//! into per-URI files through a pool, or fetch them one by one into a sink.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use crate::downloader::HttpDownloader;
use crate::pool::DownloaderPool;
use crate::response::HttpResponse;
use crate::socket::{default_factory, SocketFactory};
use crate::uri::Uri;
use crate::util;

/// Runs after every download attempt with the URI and its outcome; the
/// return value asks the pool to retry that URI. The body is written to its
/// file only once the callback declines a retry.
pub type CompletionFn = dyn Fn(&Uri, Option<&HttpResponse>) -> bool + Send + Sync;

/// Download every URI in `input` concurrently, writing each body into a
/// file named after the URI (final path segment, else host) in the current
/// directory. Existing files are skipped unless `overwrite` is set.
///
/// Returns the pool so the caller can watch [`DownloaderPool::progress`]
/// and must eventually [`DownloaderPool::join`].
pub fn write_into_files<R: BufRead>(
    input: R,
    overwrite: bool,
    worker_count: usize,
    on_complete: impl Fn(&Uri, Option<&HttpResponse>) -> bool + Send + Sync + 'static,
) -> DownloaderPool {
    write_into_files_at(
        default_factory(),
        input,
        overwrite,
        worker_count,
        Path::new("."),
        Arc::new(on_complete),
    )
}

fn write_into_files_at<R: BufRead>(
    make_socket: Arc<SocketFactory>,
    input: R,
    overwrite: bool,
    worker_count: usize,
    out_dir: &Path,
    on_complete: Arc<CompletionFn>,
) -> DownloaderPool {
    let pool = DownloaderPool::new(make_socket, worker_count);
    for line in input.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let uri = Uri::new(line);
        let Some(file_name) = util::file_name_for(&uri) else {
            util::log_error(&format!("invalid URI: {}", line));
            continue;
        };
        let target = out_dir.join(&file_name);
        if !overwrite && util::file_exists(&target) {
            util::log_error(&format!("cannot overwrite: {}", target.display()));
            continue;
        }

        let on_complete = Arc::clone(&on_complete);
        let task_uri = uri.clone();
        pool.add(&uri, move |response| {
            if on_complete(&task_uri, response.as_ref()) {
                return true;
            }
            // Written whatever the status code is, so error pages stay
            // visible to the user.
            if let Some(response) = &response {
                if let Err(e) = fs::write(&target, response.body()) {
                    util::log_error(&format!("failed to write {}: {}", target.display(), e));
                }
            }
            false
        });
    }
    pool
}

/// Download every URI in `input` one at a time and append each body to
/// `output`. Failures are logged and skipped.
pub fn write_into_stream<R: BufRead, W: Write>(input: R, output: &mut W) {
    write_into_stream_with(default_factory(), input, output)
}

fn write_into_stream_with<R: BufRead, W: Write>(
    make_socket: Arc<SocketFactory>,
    input: R,
    output: &mut W,
) {
    let downloader = HttpDownloader::new(make_socket);
    for line in input.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let uri = Uri::new(line);
        if uri.host().is_none() {
            util::log_error(&format!("invalid URI: {}", line));
            continue;
        }
        match downloader.download(&uri) {
            Some(response) => {
                if let Err(e) = output.write_all(response.body()) {
                    util::log_error(&format!("failed to write body of {}: {}", line, e));
                    return;
                }
            }
            None => {
                util::log_error(&format!("failed to download from: {}", line));
            }
        }
    }
}
