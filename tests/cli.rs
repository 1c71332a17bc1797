//! Integration tests: run the parget binary against loopback HTTP servers
//! and check exit codes and piped output.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::thread;

fn parget() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_parget"));
    cmd.env("PARGET_QUIET", "1");
    cmd
}

/// Loopback server answering one connection: waits for the request headers,
/// writes `response`, closes. Returns the bound port.
fn serve_once(response: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut seen = Vec::new();
            let mut buf = [0u8; 2048];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        seen.extend_from_slice(&buf[..n]);
                        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                }
            }
            let _ = stream.write_all(response);
        }
    });
    port
}

/// Run the binary with `input` piped to stdin and stdout captured.
fn run_with_stdin(input: String) -> std::process::Output {
    let dir = tempfile::tempdir().unwrap();
    let mut child = parget()
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_help_succeeds() {
    let out = parget().arg("--help").stdin(Stdio::null()).output().unwrap();
    assert!(out.status.success(), "parget --help should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--file"));
    assert!(stdout.contains("--threads"));
    assert!(stdout.contains("--force"));
}

#[test]
fn test_usage_alias_succeeds() {
    let out = parget().arg("--usage").stdin(Stdio::null()).output().unwrap();
    assert!(out.status.success());
}

#[test]
fn test_empty_piped_input_is_a_noop() {
    let out = run_with_stdin(String::new());
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn test_content_length_body_reaches_stdout() {
    let port = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world");
    let out = run_with_stdin(format!("http://127.0.0.1:{}/greeting.txt\n", port));
    assert!(out.status.success());
    assert_eq!(out.stdout, b"hello world");
}

#[test]
fn test_chunked_body_reaches_stdout() {
    let port = serve_once(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nA\r\n1234567890\r\nC\r\n 12 14 18 15\r\n0\r\n",
    );
    let out = run_with_stdin(format!("http://127.0.0.1:{}\n", port));
    assert!(out.status.success());
    assert_eq!(out.stdout, b"1234567890 12 14 18 15");
}

#[test]
fn test_body_without_framing_read_to_close() {
    let port = serve_once(b"HTTP/1.1 200 OK\r\nx-header: 1\r\n\r\nuntil the very end");
    let out = run_with_stdin(format!("http://127.0.0.1:{}\n", port));
    assert!(out.status.success());
    assert_eq!(out.stdout, b"until the very end");
}

#[test]
fn test_failed_download_skipped_and_run_continues() {
    // Nothing listens on the first port; the second URI must still arrive.
    let dead = TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);
    let port = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nalive");
    let out = run_with_stdin(format!(
        "http://127.0.0.1:{}/missing\nhttp://127.0.0.1:{}/ok\n",
        dead_port, port
    ));
    assert!(out.status.success());
    assert_eq!(out.stdout, b"alive");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("failed to download from"));
}

#[test]
fn test_non_success_status_body_still_written() {
    let port = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found");
    let out = run_with_stdin(format!("http://127.0.0.1:{}/nope\n", port));
    assert!(out.status.success());
    assert_eq!(out.stdout, b"not found");
}
