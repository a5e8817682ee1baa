#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use butler::{Config, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const INDEX_HTML: &[u8] = include_bytes!("../testdata/index.html");

pub fn testdata_dir() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata").to_string()
}

pub fn testdata_path(name: &str) -> String {
    format!("{}/{}", testdata_dir(), name)
}

/// A server on an ephemeral plaintext port serving the shared testdata
/// directory.
pub fn doc_root_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        listen: 0,
        document_root: Some(testdata_dir()),
        ..Config::default()
    }
}

/// Spawn a server and wait until its plaintext listener is bound.
pub async fn start_server(config: Config) -> (Arc<Server>, SocketAddr) {
    let server = Arc::new(Server::new(&config).await.expect("server should construct"));
    let runner = server.clone();
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    let addr = server
        .http_addr()
        .await
        .expect("plaintext listener should bind");
    (server, addr)
}

/// Poll the live backend list until it has `count` entries.
pub async fn wait_for_backends(server: &Server, count: usize) {
    for _ in 0..250 {
        if server.backends().await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("backend list never reached {count} entries");
}

/// A response read off a raw socket.
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }
}

/// Write `payload` on a fresh connection and read back one framed response.
pub async fn roundtrip(addr: SocketAddr, payload: &str) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(payload.as_bytes()).await.expect("write");
    read_response(&mut stream).await
}

/// Read status line and headers (LF or CRLF framed), then exactly
/// `Content-Length` bytes of body.
pub async fn read_response(stream: &mut TcpStream) -> RawResponse {
    let mut response = read_response_head(stream).await;
    let length = response.content_length().unwrap_or(0);
    if length > 0 {
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.expect("read body");
        response.body = body;
    }
    response
}

/// Read up to and including the header terminator, leaving the body (if
/// any) unread on the stream.
pub async fn read_response_head(stream: &mut TcpStream) -> RawResponse {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("read header byte");
        assert!(n > 0, "connection closed before the header terminator");
        head.push(byte[0]);
        if head.ends_with(b"\n\n") || head.ends_with(b"\r\n\r\n") {
            break;
        }
    }

    let head = String::from_utf8_lossy(&head);
    let mut lines = head.split('\n').map(|l| l.trim_end_matches('\r'));

    let status_line = lines.next().expect("status line");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse()
        .expect("numeric status code");

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.to_string(), value.trim().to_string()));
        }
    }

    RawResponse {
        status,
        headers,
        body: Vec::new(),
    }
}
