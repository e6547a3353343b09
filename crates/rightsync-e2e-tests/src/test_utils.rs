use eyre::Result;
use rightsync_lib::manifest::Manifest;
use rightsync_lib::verification::{ContentDigest, DigestAlgorithm};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An attachment served by the mock API.
pub struct TestAttachment {
    pub name: &'static str,
    pub body: Vec<u8>,
}

impl TestAttachment {
    pub fn new(name: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            body: body.into(),
        }
    }

    pub fn route(&self) -> String {
        format!("/api/right_scripts/1/attachments/{}", self.name)
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::of(DigestAlgorithm::Md5, &self.body)
    }
}

/// Starts a mock API serving every attachment with a 200.
pub async fn setup_attachment_server(attachments: &[TestAttachment]) -> MockServer {
    let server = MockServer::start().await;
    for attachment in attachments {
        Mock::given(method("GET"))
            .and(path(attachment.route()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(attachment.body.clone()))
            .mount(&server)
            .await;
    }
    server
}

pub fn attachment_url(server: &MockServer, attachment: &TestAttachment) -> Url {
    Url::parse(&format!("{}{}", server.uri(), attachment.route()))
        .unwrap_or_else(|e| panic!("invalid mock URL: {e}"))
}

/// A raw HTTP server that cuts the body of its first `truncated` responses short.
///
/// Every response advertises the full `Content-Length` and closes the connection, so
/// each attempt opens a new connection and `connections` counts attempts.
pub struct TruncatingServer {
    pub url: Url,
    connections: Arc<AtomicUsize>,
}

impl TruncatingServer {
    pub async fn start(body: Vec<u8>, truncated: usize) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("http://{}/attachments/1", listener.local_addr()?))?;
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        let body = Arc::new(body);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let cut = counter.fetch_add(1, Ordering::SeqCst) < truncated;
                let body = body.clone();
                tokio::spawn(async move {
                    if let Err(e) = respond(socket, &body, cut).await {
                        tracing::debug!("Truncating server connection failed: {}", e);
                    }
                });
            }
        });

        Ok(Self { url, connections })
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn respond(mut socket: TcpStream, body: &[u8], cut: bool) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.ends_with(b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    let sent = if cut { &body[..body.len().min(10)] } else { body };
    socket.write_all(sent).await?;
    socket.shutdown().await
}

/// Writes a manifest placing each attachment under `attachments/<name>`.
pub fn write_manifest(
    dir: &Path,
    server: &MockServer,
    attachments: &[TestAttachment],
) -> Result<PathBuf> {
    let mut manifest = Manifest::new();
    for attachment in attachments {
        manifest.add_attachment(
            attachment.name,
            &attachment_url(server, attachment),
            vec![PathBuf::from("attachments").join(attachment.name)],
            &attachment.digest(),
        );
    }

    let manifest_path = dir.join("attachments.json");
    manifest.save_to_file(&manifest_path)?;
    Ok(manifest_path)
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("rightsync_lib=debug,rightsync_e2e_tests=debug")
        .with_test_writer()
        .try_init()
        .ok();
}
