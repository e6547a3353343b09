use super::error::DownloadError;
use super::types::{DownloadItem, DownloadOptions};
use crate::verification::{ContentDigestHasher, hash_file};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// One attempt at resolving a single item.
///
/// On success the implementation must have resolved the item (see
/// [`DownloadItem::resolve`]); the manager reads the transferred size back from it.
pub trait Fetch {
    fn fetch(
        &self,
        item: &mut DownloadItem,
    ) -> impl Future<Output = Result<(), DownloadError>> + Send;
}

/// Where an item should go, as decided by the dedup scan.
#[derive(Debug, PartialEq, Eq)]
pub enum Target {
    /// A candidate already holds the expected content.
    Present(PathBuf),
    /// The first candidate that does not exist yet.
    Free(PathBuf),
}

/// Scans the candidates in order and picks the first one that already holds the
/// expected content or does not exist yet.
pub async fn select_target(item: &DownloadItem) -> Result<Target, DownloadError> {
    for location in &item.candidate_locations {
        let existing = hash_file(location, item.expected_digest.algorithm())
            .await
            .map_err(|source| DownloadError::LocalEnvironment {
                path: location.clone(),
                source,
            })?;

        match existing {
            Some(digest) if digest == item.expected_digest => {
                return Ok(Target::Present(location.clone()));
            }
            Some(digest) => {
                trace!(
                    location = %location.display(),
                    expected = %item.expected_digest,
                    actual = %digest,
                    "Candidate holds different content"
                );
            }
            None => return Ok(Target::Free(location.clone())),
        }
    }

    Err(DownloadError::Conflict {
        url: item.source_url.clone(),
        locations: item.candidate_locations.clone(),
    })
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => trace!(path = %path.display(), "Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial file: {}", e),
    }
}

/// Fetches items over HTTP(S) with a shared [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(options: &DownloadOptions) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(options.user_agent.clone());
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn transfer(&self, item: &DownloadItem, target: &Path) -> Result<u64, DownloadError> {
        let file = tokio::fs::File::create(target)
            .await
            .map_err(|source| DownloadError::LocalEnvironment {
                path: target.to_path_buf(),
                source,
            })?;

        // The file handle is consumed by `stream_to_file`, so it is closed before removal.
        match self.stream_to_file(item, file, target).await {
            Ok(written) => Ok(written),
            Err(err) => {
                remove_partial(target).await;
                Err(err)
            }
        }
    }

    async fn stream_to_file(
        &self,
        item: &DownloadItem,
        file: tokio::fs::File,
        target: &Path,
    ) -> Result<u64, DownloadError> {
        let url = &item.source_url;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| DownloadError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let transfer_error = |source: std::io::Error| DownloadError::Transfer {
            path: target.to_path_buf(),
            source,
        };

        let mut writer = tokio::io::BufWriter::new(file);
        let mut hasher = ContentDigestHasher::new(item.expected_digest.algorithm());
        let mut written = 0u64;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| transfer_error(std::io::Error::other(e)))?;
            hasher.update(&chunk);
            writer.write_all(&chunk).await.map_err(transfer_error)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(transfer_error)?;

        // The listing digest may lag behind the attachment; keep the file but say so.
        if let Err(e) = hasher.verify(&item.expected_digest) {
            warn!(
                url = %url,
                path = %target.display(),
                "Downloaded content differs from listing: {}",
                e
            );
        }

        Ok(written)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, item: &mut DownloadItem) -> Result<(), DownloadError> {
        let target = match select_target(item).await? {
            Target::Present(location) => {
                debug!(
                    url = %item.source_url,
                    location = %location.display(),
                    "File exists with matching digest, skipping download"
                );
                item.resolve(location, 0);
                return Ok(());
            }
            Target::Free(location) => location,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| {
                DownloadError::LocalEnvironment {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        debug!(url = %item.source_url, location = %target.display(), "Downloading");
        let written = self.transfer(item, &target).await?;
        debug!(
            url = %item.source_url,
            location = %target.display(),
            bytes = written,
            "Downloaded"
        );

        item.resolve(target, written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::{ContentDigest, DigestAlgorithm};
    use tokio::io::AsyncReadExt;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn md5(data: &[u8]) -> ContentDigest {
        ContentDigest::of(DigestAlgorithm::Md5, data)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&DownloadOptions::default()).unwrap()
    }

    async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) -> Url {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
        Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
    }

    /// Answers one request with a `Content-Length` of 1000 and closes after ten bytes.
    async fn truncating_server() -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[7u8; 10]).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{addr}/attachments/1")).unwrap()
    }

    #[tokio::test]
    async fn test_select_target_prefers_matching_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.sh");
        let second = dir.path().join("second.sh");
        std::fs::write(&first, b"other").unwrap();
        std::fs::write(&second, b"wanted").unwrap();

        let item = DownloadItem::new(
            Url::parse("https://example.com/a").unwrap(),
            vec![first, second.clone()],
            md5(b"wanted"),
        );
        assert_eq!(select_target(&item).await.unwrap(), Target::Present(second));
    }

    #[tokio::test]
    async fn test_select_target_is_first_fit() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sh");
        let matching = dir.path().join("matching.sh");
        std::fs::write(&matching, b"wanted").unwrap();

        // A free slot ends the scan even if a later candidate would match.
        let item = DownloadItem::new(
            Url::parse("https://example.com/a").unwrap(),
            vec![missing.clone(), matching],
            md5(b"wanted"),
        );
        assert_eq!(select_target(&item).await.unwrap(), Target::Free(missing));
    }

    #[tokio::test]
    async fn test_select_target_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let only = dir.path().join("only.sh");
        std::fs::write(&only, b"stale").unwrap();

        let item = DownloadItem::new(
            Url::parse("https://example.com/a").unwrap(),
            vec![only],
            md5(b"fresh"),
        );
        let err = select_target(&item).await.unwrap_err();
        assert!(matches!(err, DownloadError::Conflict { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_writes_body_and_resolves() {
        let server = MockServer::start().await;
        let body = vec![42u8; 1024];
        let url = serve(
            &server,
            "/attachments/1",
            ResponseTemplate::new(200).set_body_bytes(body.clone()),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/dir/script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(&body));

        fetcher().fetch(&mut item).await.unwrap();

        assert_eq!(item.resolved_location(), Some(target.as_path()));
        assert_eq!(item.transferred_bytes(), 1024);
        assert_eq!(std::fs::read(&target).unwrap(), body);
    }

    #[tokio::test]
    async fn test_fetch_skips_present_file_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        std::fs::write(&target, b"already here").unwrap();

        let url = Url::parse(&format!("{}/attachments/1", server.uri())).unwrap();
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(b"already here"));
        fetcher().fetch(&mut item).await.unwrap();

        assert_eq!(item.resolved_location(), Some(target.as_path()));
        assert_eq!(item.transferred_bytes(), 0);
        assert_eq!(std::fs::read(&target).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_retryable_and_cleans_up() {
        let server = MockServer::start().await;
        let url = serve(&server, "/attachments/1", ResponseTemplate::new(503)).await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(b"x"));

        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
        assert!(!target.exists());
        assert!(!item.is_resolved());
    }

    #[tokio::test]
    async fn test_fetch_client_error_is_permanent_and_cleans_up() {
        let server = MockServer::start().await;
        let url = serve(&server, "/attachments/1", ResponseTemplate::new(404)).await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(b"x"));

        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
        assert!(!err.is_retryable());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_permanent_and_cleans_up() {
        // Bind and drop a listener to get a port nothing is listening on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/attachments/1")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(b"x"));

        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(matches!(err, DownloadError::Transport { .. }));
        assert!(!err.is_retryable());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_retryable() {
        let server = MockServer::start().await;
        let url = serve(
            &server,
            "/attachments/slow",
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
        )
        .await;

        let options = DownloadOptions {
            request_timeout: Some(std::time::Duration::from_millis(100)),
            ..DownloadOptions::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(b"x"));

        let err = HttpFetcher::new(&options)
            .unwrap()
            .fetch(&mut item)
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "timeout should be retryable: {err}");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_is_retryable_and_cleans_up() {
        let url = truncating_server().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("script.sh");
        let mut item = DownloadItem::new(url, vec![target.clone()], md5(&[7u8; 1000]));

        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(
            matches!(err, DownloadError::Transfer { ref path, .. } if path == &target),
            "unexpected error: {err:?}"
        );
        assert!(err.is_retryable());
        assert!(!target.exists());
        assert!(!item.is_resolved());
    }

    #[tokio::test]
    async fn test_select_target_unreadable_candidate_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let candidate = blocker.join("script.sh");

        // Opening a path below a regular file fails with something other than NotFound.
        let mut item = DownloadItem::new(
            Url::parse("https://example.com/a").unwrap(),
            vec![candidate.clone()],
            md5(b"x"),
        );
        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(
            matches!(err, DownloadError::LocalEnvironment { ref path, .. } if path == &candidate),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_dangling_parent_symlink_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &link).unwrap();

        // The candidate itself reads as missing, so only directory creation can fail.
        let mut item = DownloadItem::new(
            Url::parse("https://example.com/a").unwrap(),
            vec![link.join("script.sh")],
            md5(b"x"),
        );
        let err = fetcher().fetch(&mut item).await.unwrap_err();
        assert!(
            matches!(err, DownloadError::LocalEnvironment { ref path, .. } if path == &link),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_retryable());
        assert!(!item.is_resolved());
    }
}
