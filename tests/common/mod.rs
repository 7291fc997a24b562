//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;

use memo_relay::config::ProxyConfig;
use memo_relay::http::HttpServer;
use memo_relay::lifecycle::Shutdown;

/// Size of the body served by `/file/download`.
pub const DOWNLOAD_SIZE: usize = 4 * 1024 * 1024;

/// Rate at which `/memo/slow-insert` reads its request body.
pub const SLOW_READ_BYTES_PER_SEC: usize = 32 * 1024 * 1024;

/// Pieces of the body served by `/file/chunked`.
pub const CHUNKED_PARTS: [&str; 3] = ["first,", "second,", "third"];

/// A request as the mock backend received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Requests seen by the mock backend, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    pub fn all(&self) -> Vec<Recorded> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Recorded {
        self.all().pop().expect("backend saw no request")
    }
}

/// Start a mock backend API on an ephemeral port.
///
/// Routes:
/// - `/memo/list`: JSON with two `Set-Cookie` headers
/// - `/file/download`: `DOWNLOAD_SIZE` bytes of octet-stream
/// - `/file/chunked`: `CHUNKED_PARTS` with chunked framing, no length
/// - `/memo/slow-insert`: reads the body at `SLOW_READ_BYTES_PER_SEC`
/// - `/missing`: 404 with a JSON body
/// - `/empty-error`: 500 with no body
/// - `/generate`: a generative-API style answer
/// - anything else: `{"result":true}`
pub async fn start_mock_backend() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .fallback(mock_backend)
        .with_state(recorder.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, recorder)
}

async fn mock_backend(State(recorder): State<Recorder>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let uri = parts.uri.to_string();
    let path = parts.uri.path().to_string();
    let body = if path == "/memo/slow-insert" {
        read_throttled(body, SLOW_READ_BYTES_PER_SEC).await
    } else {
        axum::body::to_bytes(body, usize::MAX).await.unwrap()
    };
    recorder.0.lock().unwrap().push(Recorded {
        method: parts.method,
        uri,
        headers: parts.headers,
        body,
    });

    match path.as_str() {
        "/memo/list" => {
            let mut response = json_response(StatusCode::OK, r#"{"result":true,"list":[{"seq":1}]}"#);
            let headers = response.headers_mut();
            headers.append(header::SET_COOKIE, HeaderValue::from_static("sid=abc; HttpOnly"));
            headers.append(header::SET_COOKIE, HeaderValue::from_static("pref=dark"));
            response
        }
        "/file/download" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            vec![b'x'; DOWNLOAD_SIZE],
        )
            .into_response(),
        "/file/chunked" => {
            let parts = CHUNKED_PARTS.map(|part| Ok::<_, std::io::Error>(Bytes::from_static(part.as_bytes())));
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                Body::from_stream(stream::iter(parts)),
            )
                .into_response()
        }
        "/missing" => json_response(StatusCode::NOT_FOUND, r#"{"result":false,"message":"없음"}"#),
        "/empty-error" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "/generate" => json_response(
            StatusCode::OK,
            r#"{"candidates":[{"content":{"parts":[{"text":"요약"}]}}]}"#,
        ),
        _ => json_response(StatusCode::OK, r#"{"result":true}"#),
    }
}

/// Read `body` no faster than `bytes_per_sec`.
async fn read_throttled(body: Body, bytes_per_sec: usize) -> Bytes {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        buffer.extend_from_slice(&chunk);
        tokio::time::sleep(Duration::from_secs_f64(chunk.len() as f64 / bytes_per_sec as f64)).await;
    }
    buffer.freeze()
}

fn json_response(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Body::from(body)).into_response()
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Configuration pointing the relay at `backend`, staging into `upload_dir`.
pub fn relay_config(backend: SocketAddr, upload_dir: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.relay.backend_url = format!("http://{backend}");
    config.relay.upload_dir = upload_dir.to_path_buf();
    config
}

/// Start the relay; returns its address and the shutdown handle.
pub async fn start_relay(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Hand-built `multipart/form-data` body with one text field and one file.
pub fn multipart_body(
    boundary: &str,
    field: (&str, &str),
    file: (&str, &str, &[u8]),
) -> Vec<u8> {
    let (field_name, field_value) = field;
    let (file_field, filename, content) = file;
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"\r\n\r\n{field_value}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Wait until `dir` holds no files, up to `timeout`.
pub async fn wait_until_empty(dir: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let count = std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0);
        if count == 0 {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
