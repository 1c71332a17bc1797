//! Thin CLI layer: pick the input and output streams, then either fan the
//! URIs into per-URI files with a live progress table, or fetch them one by
//! one and pipe the bodies to stdout.

mod progress;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, IsTerminal};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use colored::Colorize;

use parget_core::config;
use progress::ProgressTable;

// ---- UI helpers (no-op styling when stdout isn't a TTY) ----

fn use_color() -> bool {
    io::stdout().is_terminal() && std::env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let matches = Command::new("parget")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concurrent HTTP/1.1 downloader")
        .arg(
            Arg::new("url")
                .value_name("URL")
                .help("URI to download; ignored when URIs are piped on stdin"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help("Read URIs from a file, one per line"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Overwrite existing output files"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("0")
                .help("Worker threads; 0 picks the machine's parallelism"),
        )
        .arg(
            Arg::new("usage")
                .long("usage")
                .action(ArgAction::Help)
                .hide(true),
        )
        .get_matches();

    let threads = *matches.get_one::<usize>("threads").unwrap_or(&0);
    let force = matches.get_flag("force");

    // Piped stdin wins; otherwise a URI file; otherwise the positional URI.
    let input: Box<dyn BufRead> = if !io::stdin().is_terminal() {
        Box::new(BufReader::new(io::stdin()))
    } else if let Some(path) = matches.get_one::<String>("file") {
        match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                error(&format!("cannot open {}: {}", path, e));
                return 1;
            }
        }
    } else if let Some(url) = matches.get_one::<String>("url") {
        Box::new(Cursor::new(url.clone().into_bytes()))
    } else {
        error("no input: pass a URL, use --file, or pipe URIs on stdin");
        eprintln!("try: parget --help");
        return 1;
    };

    if io::stdout().is_terminal() {
        download_into_files(input, force, threads)
    } else {
        // Piped output: bodies go to stdout, sequentially, no table.
        parget_core::write_into_stream(input, &mut io::stdout().lock());
        0
    }
}

fn download_into_files(input: Box<dyn BufRead>, force: bool, threads: usize) -> i32 {
    let table = Arc::new(ProgressTable::new());
    let retries = config::retry_count();
    let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let table_in_callback = Arc::clone(&table);
    let pool = parget_core::write_into_files(input, force, threads, move |uri, response| {
        if response.is_none() && retries > 0 {
            let mut attempts = attempts.lock().unwrap();
            let n = attempts.entry(uri.full().to_string()).or_insert(0);
            if *n < retries {
                *n += 1;
                let backoff = config::retry_backoff_ms()
                    .saturating_mul(2u64.saturating_pow((*n - 1) as u32))
                    .min(config::MAX_RETRY_BACKOFF_MS);
                thread::sleep(Duration::from_millis(backoff));
                return true;
            }
        }
        table_in_callback.complete(uri, response);
        false
    });

    while !pool.is_idle() {
        table.update(&pool.progress());
        thread::sleep(Duration::from_millis(100));
    }
    pool.join();
    table.clear();

    let (done, failed) = table.totals();
    if failed > 0 {
        error(&format!("{} downloaded, {} failed", done, failed));
    } else {
        info(&format!("{} downloaded", done));
    }
    0
}
