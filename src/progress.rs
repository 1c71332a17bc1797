//! Live progress table: one bar per running transfer, a printed line per
//! finished one. Fed from pool snapshots by the main thread while worker
//! threads report completions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use colored::Colorize;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};

use parget_core::{HttpResponse, Uri};

pub struct ProgressTable {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    style: ProgressStyle,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style: ProgressStyle::with_template("{msg:<44!} {bytes:>10} {wide_bar:.cyan/blue}")
                .expect("progress template is static"),
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Refresh the table from a pool progress snapshot.
    pub fn update(&self, snapshot: &[(Uri, (u64, u64))]) {
        let mut bars = self.bars.lock().unwrap();
        for (uri, (read, expected)) in snapshot {
            let bar = bars.entry(uri.full().to_string()).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(1));
                bar.set_style(self.style.clone());
                bar.set_message(uri.full().to_string());
                bar
            });
            // Servers without Content-Length only grow `expected` as bytes
            // arrive; keep the length at least at the position.
            bar.set_length((*expected).max(*read).max(1));
            bar.set_position(*read);
        }
    }

    /// Print the outcome of a finished transfer and retire its bar. Called
    /// from worker threads.
    pub fn complete(&self, uri: &Uri, response: Option<&HttpResponse>) {
        if let Some(bar) = self.bars.lock().unwrap().remove(uri.full()) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        let line = match response {
            Some(response) => {
                self.done.fetch_add(1, Ordering::Relaxed);
                format!(
                    "{} {} ({}, {})",
                    "done".green(),
                    uri,
                    response.status_code(),
                    HumanBytes(response.body().len() as u64),
                )
            }
            None => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                format!("{} {}", "failed".red(), uri)
            }
        };
        let _ = self.multi.println(line);
    }

    pub fn totals(&self) -> (usize, usize) {
        (
            self.done.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    pub fn clear(&self) {
        let _ = self.multi.clear();
    }
}
