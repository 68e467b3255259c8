use crate::error::{ErrorKind, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

/// Stalled servers must not hang an invocation forever.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub(crate) struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub(crate) fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dataql/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Download `url` into `target`, which must not exist yet.
    ///
    /// On any failure (including cancellation) the partial file is removed.
    #[instrument(skip(self, target, cancel), fields(url = %url, bytes))]
    pub(crate) async fn download(&self, url: &Url, target: &Path, cancel: &CancellationToken) -> Result<u64> {
        let result = self.fetch(url, target, cancel).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(target).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %target.display(), error = %e, "failed to remove partial download");
            }
        }
        result
    }

    async fn fetch(&self, url: &Url, target: &Path, cancel: &CancellationToken) -> Result<u64> {
        let request = self.client.get(url.clone()).send();
        let mut response = tokio::select! {
            () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            response = request => response.map_err(|e| network_error(url, &e))?,
        };
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }

        let mut file = File::create_new(target).await.map_err(|e| ErrorKind::from_io(e, target))?;
        let mut total: u64 = 0;
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                chunk = response.chunk() => chunk.map_err(|e| network_error(url, &e))?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
            total += chunk.len() as u64;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        tracing::Span::current().record("bytes", total);
        Ok(total)
    }
}

fn network_error(url: &Url, err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Network(format!("timed out fetching {url}"))
    } else {
        ErrorKind::Network(format!("{url}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on an ephemeral port.
    async fn serve_once(status: &'static str, body: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{addr}/exports/data.csv")).unwrap()
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let url = serve_once("200 OK", b"id,name\n1,alice\n").await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.csv");
        let downloader = HttpDownloader::new(Duration::from_secs(10)).unwrap();

        let bytes = downloader.download(&url, &target, &CancellationToken::new()).await.unwrap();
        assert_eq!(bytes, 16);
        assert_eq!(std::fs::read(&target).unwrap(), b"id,name\n1,alice\n");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fatal() {
        let url = serve_once("404 Not Found", b"nope").await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.csv");
        let downloader = HttpDownloader::new(Duration::from_secs(10)).unwrap();

        let err = downloader.download(&url, &target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::HttpStatus { status: 404, .. }));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/data.csv")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(Duration::from_secs(10)).unwrap();

        let err = downloader
            .download(&url, &dir.path().join("data.csv"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never answer.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let url = Url::parse(&format!("http://{addr}/data.csv")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.csv");
        let downloader = HttpDownloader::new(Duration::from_secs(60)).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = downloader.download(&url, &target, &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(!target.exists());
        server.abort();
    }
}
