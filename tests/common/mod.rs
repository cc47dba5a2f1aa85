//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Sink;
use http::Version;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use proxy_forward::config::ForwardConfig;
use proxy_forward::forward::{BoxError, ClientSink, InboundRequest};
use proxy_forward::http::Headers;
use proxy_forward::ForwardServer;

/// What a [`RecordingSink`] saw.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    /// Set once the head was committed (first write or close).
    pub status: Option<u16>,
    pub message: Option<String>,
    pub headers: Headers,
    pub chunked: bool,
    pub writes: Vec<Bytes>,
    pub ended: bool,
    pub reset: bool,
}

impl Recorded {
    pub fn body(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|chunk| chunk.iter().copied()).collect()
    }
}

/// Client sink recording everything into a shared [`Recorded`].
pub struct RecordingSink {
    status: u16,
    message: Option<String>,
    headers: Headers,
    chunked: bool,
    fail_writes: bool,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let sink = Self {
            status: 200,
            message: None,
            headers: Headers::new(),
            chunked: false,
            fail_writes: false,
            recorded: recorded.clone(),
        };
        (sink, recorded)
    }

    /// A sink whose every write fails, like a client that went away.
    pub fn failing() -> (Self, Arc<Mutex<Recorded>>) {
        let (mut sink, recorded) = Self::new();
        sink.fail_writes = true;
        (sink, recorded)
    }

    fn commit(&mut self) {
        let mut recorded = self.recorded.lock().unwrap();
        if recorded.status.is_none() {
            recorded.status = Some(self.status);
            recorded.message = self.message.clone();
            recorded.headers = self.headers.clone();
            recorded.chunked = self.chunked;
        }
    }
}

impl Sink<Bytes> for RecordingSink {
    type Error = BoxError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, chunk: Bytes) -> Result<(), BoxError> {
        let this = self.get_mut();
        if this.fail_writes {
            return Err("client went away".into());
        }
        this.commit();
        this.recorded.lock().unwrap().writes.push(chunk);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        let this = self.get_mut();
        this.commit();
        this.recorded.lock().unwrap().ended = true;
        Poll::Ready(Ok(()))
    }
}

impl ClientSink for RecordingSink {
    fn set_status_code(&mut self, code: u16) {
        self.status = code;
    }

    fn set_status_message(&mut self, message: &str) {
        self.message = Some(message.to_string());
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn set_chunked(&mut self, chunked: bool) {
        self.chunked = chunked;
    }

    fn reset(&mut self) {
        self.recorded.lock().unwrap().reset = true;
    }
}

/// Inbound request with a fixed version that counts resets.
pub struct MockRequest {
    version: Version,
    resets: Arc<AtomicUsize>,
}

impl MockRequest {
    pub fn new(version: Version) -> (Self, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        (
            Self {
                version,
                resets: resets.clone(),
            },
            resets,
        )
    }
}

impl InboundRequest for MockRequest {
    fn version(&self) -> Version {
        self.version
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start a mock backend on an ephemeral port that answers every request with
/// `head` followed by `body`, then closes the connection.
///
/// `head` is the full status line and header block without the terminating
/// blank line.
pub async fn start_raw_backend(head: String, body: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let head = head.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(b"\r\n\r\n").await;
                        let _ = socket.write_all(body).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Backend answering with a `Content-Length` body.
pub async fn start_fixed_backend(extra_headers: &str, body: &'static [u8]) -> SocketAddr {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close{}",
        body.len(),
        extra_headers
    );
    start_raw_backend(head, body).await
}

/// Backend answering with a close-delimited body of unknown length.
pub async fn start_unsized_backend(body: &'static [u8]) -> SocketAddr {
    start_raw_backend(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close".to_string(),
        body,
    )
    .await
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
}

/// Start a forwarding server for `upstream` on an ephemeral port.
pub async fn start_proxy(upstream: SocketAddr) -> SocketAddr {
    let mut config = ForwardConfig::default();
    config.upstream.address = upstream.to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ForwardServer::new(config).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    addr
}
