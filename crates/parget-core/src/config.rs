//! Runtime tunables from the environment. CLI flags override these.

const DEFAULT_WORKER_FALLBACK: usize = 2;
const MAX_WORKERS_CAP: usize = 64;
const DEFAULT_RETRY_COUNT: usize = 0;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
pub const MAX_RETRY_BACKOFF_MS: u64 = 5_000;

/// Resolve the worker count for a pool. A request of 0 means "pick for me":
/// PARGET_THREADS if set, otherwise the machine's parallelism, falling back
/// to 2 when it cannot be determined.
pub fn worker_count(requested: usize) -> usize {
    if requested != 0 {
        return requested.clamp(1, MAX_WORKERS_CAP);
    }
    std::env::var("PARGET_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n != 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_WORKER_FALLBACK)
        })
        .clamp(1, MAX_WORKERS_CAP)
}

/// How many times a failed transfer may be retried (PARGET_HTTP_RETRIES).
pub fn retry_count() -> usize {
    std::env::var("PARGET_HTTP_RETRIES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RETRY_COUNT)
}

/// Initial backoff before a retry (PARGET_RETRY_BACKOFF_MS); callers double
/// it per attempt up to MAX_RETRY_BACKOFF_MS.
pub fn retry_backoff_ms() -> u64 {
    std::env::var("PARGET_RETRY_BACKOFF_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_BACKOFF_MS)
}

/// PARGET_QUIET=1 suppresses informational log lines (errors still print).
pub fn quiet() -> bool {
    std::env::var("PARGET_QUIET")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}
