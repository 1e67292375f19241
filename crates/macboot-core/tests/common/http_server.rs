//! Minimal HTTP/1.1 server for integration tests.
//!
//! Answers GET requests from a script of replies: the n-th request gets the
//! n-th reply, and the last reply repeats once the script runs out. Counts
//! requests so tests can assert how many attempts reached the network.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    /// Advertise this Content-Length, send `body`, then hold the connection
    /// open for the given time.
    pub stall: Option<(usize, Duration)>,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            stall: None,
        }
    }

    /// 200 with `declared_len` bytes promised but only `sent` delivered.
    pub fn stalled(sent: &[u8], declared_len: usize, hold: Duration) -> Self {
        Self {
            status: 200,
            body: sent.to_vec(),
            stall: Some((declared_len, hold)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            stall: None,
        }
    }
}

pub struct TestServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(script: Vec<Reply>) -> TestServer {
    assert!(!script.is_empty(), "script needs at least one reply");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let script = Arc::new(script);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let reply = script[n.min(script.len() - 1)].clone();
            thread::spawn(move || handle(stream, &reply));
        }
    });
    TestServer {
        url: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn handle(mut stream: std::net::TcpStream, reply: &Reply) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        reply.stall.map_or(reply.body.len(), |(len, _)| len)
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&reply.body);
    if let Some((_, hold)) = reply.stall {
        let _ = stream.flush();
        thread::sleep(hold);
    }
}
