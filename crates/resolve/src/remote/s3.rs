//! S3 object downloads.
//!
//! # Credentials
//!
//! Credentials, region and profile come from the ambient AWS configuration
//! chain (environment variables, `~/.aws/config`, SSO, instance metadata).
//! A region and endpoint may be forced through [`S3Settings`], which is how
//! S3-compatible services (MinIO, Backblaze, Tigris) are reached.

use crate::error::{ErrorKind, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::S3Settings;

/// Lazily configured S3 client.
///
/// Loading the AWS configuration chain is slow (it may query instance
/// metadata), so it only happens on the first S3 source of a run.
#[derive(Debug)]
pub(crate) struct S3Downloader {
    settings: S3Settings,
    client: OnceCell<Client>,
}

impl S3Downloader {
    pub(crate) fn new(settings: S3Settings) -> Self {
        Self { settings, client: OnceCell::new() }
    }

    async fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| build_client(&self.settings)).await
    }

    #[instrument(skip(self, target, cancel), fields(bytes))]
    pub(crate) async fn download(&self, bucket: &str, key: &str, target: &Path, cancel: &CancellationToken) -> Result<u64> {
        let result = self.fetch(bucket, key, target, cancel).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(target).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %target.display(), error = %e, "failed to remove partial download");
            }
        }
        result
    }

    async fn fetch(&self, bucket: &str, key: &str, target: &Path, cancel: &CancellationToken) -> Result<u64> {
        let client = self.client().await?;
        let request = client.get_object().bucket(bucket).key(key).send();
        let output = tokio::select! {
            () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            output = request => output.map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    ErrorKind::NotFound(PathBuf::from(format!("s3://{bucket}/{key}")))
                } else {
                    ErrorKind::Network(format!("s3://{bucket}/{key}: {}", DisplayErrorContext(&err)))
                }
            })?,
        };

        let mut body = output.body;
        let mut file = File::create_new(target).await.map_err(|e| ErrorKind::from_io(e, target))?;
        let mut total: u64 = 0;
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                chunk = body.try_next() => chunk.map_err(|e| ErrorKind::Network(format!("s3://{bucket}/{key}: {e}")))?,
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

async fn build_client(settings: &S3Settings) -> Result<Client> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;
    if shared.credentials_provider().is_none() {
        exn::bail!(ErrorKind::Credentials("no AWS credentials provider could be configured".to_string()));
    }
    if shared.region().is_none() {
        exn::bail!(ErrorKind::Credentials(
            "no AWS region configured (set AWS_REGION or remote.s3_region)".to_string()
        ));
    }
    Ok(Client::from_conf(client_config(&shared, settings)))
}

/// Downloads are attempted once; a failure surfaces to the caller, which
/// decides from `is_retryable` whether running again makes sense.
fn client_config(shared: &SdkConfig, settings: &S3Settings) -> aws_sdk_s3::Config {
    aws_sdk_s3::config::Builder::from(shared)
        .retry_config(RetryConfig::disabled())
        // Path-style addressing for S3-compatible services (MinIO, Backblaze)
        .force_path_style(settings.endpoint.is_some())
        .build()
}
