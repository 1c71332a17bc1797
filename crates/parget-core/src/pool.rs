//! Bounded worker pool over a URI queue.
//!
//! Tasks enter a FIFO queue and are promoted into the running set while
//! there is worker capacity; each running task owns one thread pinned to one
//! fetcher. Workers and the pool handle share a single `PoolShared`, so
//! there are no back-references. Two locks protect the shared state and are
//! always taken queue first, then running set; the pool holds neither while
//! a user callback runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::config;
use crate::downloader::HttpDownloader;
use crate::response::HttpResponse;
use crate::socket::SocketFactory;
use crate::uri::Uri;
use crate::util;

/// Decides, after each completed attempt, whether the same URI should be
/// downloaded again. Runs on the worker thread that performed the fetch.
///
/// A callback must not call [`DownloaderPool::add`] or
/// [`DownloaderPool::join`], and must not drop the pool; any of those from a
/// worker thread deadlocks on the worker's own completion.
pub type DownloadCallback = Box<dyn FnMut(Option<HttpResponse>) -> bool + Send>;

struct QueuedTask {
    uri: Uri,
    callback: DownloadCallback,
}

struct RunningTask {
    uri: Uri,
    downloader: Arc<HttpDownloader>,
    thread: Option<JoinHandle<()>>,
}

struct PoolState {
    running: HashMap<u64, RunningTask>,
    // Threads that finished their task and are about to exit; join() and
    // drop reap these.
    finished: Vec<JoinHandle<()>>,
    idle: bool,
}

struct PoolShared {
    make_socket: Arc<SocketFactory>,
    max_workers: usize,
    accepting: AtomicBool,
    should_stop: AtomicBool,
    next_task_id: AtomicU64,
    // Lock order: `queue` before `state`, never the reverse.
    queue: Mutex<VecDeque<QueuedTask>>,
    state: Mutex<PoolState>,
    idle_signal: Condvar,
}

/// Concurrent downloader over a caller-chosen socket factory. At most
/// `max_workers` transfers run at once; completion callbacks decide about
/// retries; `join` waits until both the queue and the running set are empty.
pub struct DownloaderPool {
    shared: Arc<PoolShared>,
}

impl DownloaderPool {
    /// `max_workers == 0` picks the machine's parallelism, falling back to 2
    /// when it cannot be determined.
    pub fn new(make_socket: Arc<SocketFactory>, max_workers: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                make_socket,
                max_workers: config::worker_count(max_workers),
                accepting: AtomicBool::new(true),
                should_stop: AtomicBool::new(false),
                next_task_id: AtomicU64::new(0),
                queue: Mutex::new(VecDeque::new()),
                state: Mutex::new(PoolState {
                    running: HashMap::new(),
                    finished: Vec::new(),
                    idle: true,
                }),
                idle_signal: Condvar::new(),
            }),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// Queue a download. Dropped silently (with a log line) once the pool
    /// stopped accepting, so late adds never panic a shutdown path.
    pub fn add(
        &self,
        uri: &Uri,
        callback: impl FnMut(Option<HttpResponse>) -> bool + Send + 'static,
    ) {
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::SeqCst) || shared.should_stop.load(Ordering::SeqCst) {
            util::log(&format!("task refused, pool is closed: {}", uri));
            return;
        }
        {
            let mut queue = shared.queue.lock().unwrap();
            queue.push_back(QueuedTask {
                uri: uri.clone(),
                callback: Box::new(callback),
            });
            let mut state = shared.state.lock().unwrap();
            state.idle = false;
        }
        PoolShared::promote(shared);
    }

    /// True when the queue and the running set are both empty.
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().unwrap().idle
    }

    /// Snapshot of every running transfer's byte counters. The same URI can
    /// appear more than once when it was queued more than once; transfers
    /// that have not armed their counters yet are skipped.
    pub fn progress(&self) -> Vec<(Uri, (u64, u64))> {
        let state = self.shared.state.lock().unwrap();
        state
            .running
            .values()
            .filter_map(|task| Some((task.uri.clone(), task.downloader.progress()?)))
            .collect()
    }

    /// Stop accepting, wait for the pool to drain, then reap every worker
    /// thread. Returns once all callbacks have run.
    pub fn join(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        let mut state = self.shared.state.lock().unwrap();
        while !state.idle {
            state = self.shared.idle_signal.wait(state).unwrap();
        }
        let finished: Vec<JoinHandle<()>> = state.finished.drain(..).collect();
        drop(state);
        for handle in finished {
            let _ = handle.join();
        }
    }
}

impl Drop for DownloaderPool {
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.should_stop.store(true, Ordering::SeqCst);
        shared.accepting.store(false, Ordering::SeqCst);
        shared.queue.lock().unwrap().clear();

        let mut handles = Vec::new();
        {
            let mut state = shared.state.lock().unwrap();
            for task in state.running.values_mut() {
                if let Some(handle) = task.thread.take() {
                    handles.push(handle);
                }
            }
            handles.extend(state.finished.drain(..));
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl PoolShared {
    /// Move queued tasks into the running set while capacity allows, then
    /// settle the idle flag. Takes the queue lock, then the state lock.
    fn promote(shared: &Arc<PoolShared>) {
        let mut queue = shared.queue.lock().unwrap();
        let mut state = shared.state.lock().unwrap();
        while state.running.len() < shared.max_workers {
            let Some(task) = queue.pop_front() else {
                break;
            };
            let QueuedTask { uri, callback } = task;
            let id = shared.next_task_id.fetch_add(1, Ordering::Relaxed);
            let downloader = Arc::new(HttpDownloader::new(Arc::clone(&shared.make_socket)));
            let handle = thread::spawn({
                let shared = Arc::clone(shared);
                let uri = uri.clone();
                let downloader = Arc::clone(&downloader);
                move || run_worker(shared, id, uri, downloader, callback)
            });
            state.running.insert(
                id,
                RunningTask {
                    uri,
                    downloader,
                    thread: Some(handle),
                },
            );
        }
        if queue.is_empty() && state.running.is_empty() {
            state.idle = true;
            shared.idle_signal.notify_all();
        }
    }
}

fn run_worker(
    shared: Arc<PoolShared>,
    id: u64,
    uri: Uri,
    downloader: Arc<HttpDownloader>,
    mut callback: DownloadCallback,
) {
    loop {
        let response = downloader.download(&uri);
        let retry = callback(response);
        if !retry || shared.should_stop.load(Ordering::SeqCst) {
            break;
        }
    }

    // Leave the running set; the join handle moves to the reap list. During
    // forced shutdown the entry may already be gone, which is fine.
    {
        let mut state = shared.state.lock().unwrap();
        if let Some(task) = state.running.remove(&id) {
            if let Some(handle) = task.thread {
                state.finished.push(handle);
            }
        }
    }
    if !shared.should_stop.load(Ordering::SeqCst) {
        PoolShared::promote(&shared);
    }
}
