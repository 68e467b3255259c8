use crate::engine::{Engine, ImportSummary};
use crate::error::{ErrorKind, Result};
use dataql_cache::{CacheManager, CacheMetadata, Lookup, MissReason};
use dataql_config::Config;
use dataql_hint::Enhanced;
use dataql_queue::{Message, MessageQueueReader, QueueConfig, Registry, is_queue_url};
use dataql_resolve::{CompressionResolver, RemoteResolver, ResolvedFile, S3Settings, Source, SourceResolver};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How a set of sources was made queryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// A valid artifact already existed; nothing was imported.
    Cached { artifact: PathBuf, metadata: CacheMetadata },
    /// The engine imported the sources. `artifact` is `None` when caching is
    /// disabled or unavailable and the engine kept the data in memory.
    Imported { artifact: Option<PathBuf>, summary: ImportSummary },
}

impl Prepared {
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Self::Cached { artifact, .. } => Some(artifact),
            Self::Imported { artifact, .. } => artifact.as_deref(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }
}

/// Resolves sources, consults the cache, and drives the engine on a miss.
#[derive(Debug)]
pub struct Pipeline {
    cache: CacheManager,
    registry: Registry,
    http_timeout: Duration,
    s3: S3Settings,
    temp_root: Option<PathBuf>,
    max_messages: usize,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let dir = config.cache.dir().or_raise(|| ErrorKind::Config)?;
        let cache = CacheManager::new(dir, config.cache.enabled).with_lock_timeout(config.cache.lock_timeout());
        let s3 = S3Settings { region: config.remote.s3_region.clone(), endpoint: config.remote.s3_endpoint.clone() };
        Ok(Self::builder(cache)
            .http_timeout(config.remote.http_timeout())
            .s3(s3)
            .max_messages(config.queue.max_messages)
            .build())
    }

    pub fn builder(cache: CacheManager) -> PipelineBuilder {
        PipelineBuilder::new(cache)
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Make `sources` queryable, reusing a cached artifact when one is valid.
    ///
    /// Temporary files created while resolving are removed before this
    /// returns, whether it succeeds or not.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn prepare(&self, sources: &[Source], engine: &dyn Engine, cancel: &CancellationToken) -> Result<Prepared> {
        if let Some(queue) = sources.iter().find(|source| is_queue_url(source.as_str())) {
            exn::bail!(ErrorKind::QueueSource(queue.to_string()));
        }
        let resolver = self.resolver()?;
        let prepared = self.prepare_with(&resolver, sources, engine, cancel).await;
        for warning in resolver.cleanup() {
            tracing::warn!(%warning, "failed to clean up temporary file");
        }
        prepared
    }

    async fn prepare_with(
        &self,
        resolver: &SourceResolver,
        sources: &[Source],
        engine: &dyn Engine,
        cancel: &CancellationToken,
    ) -> Result<Prepared> {
        let files = resolver
            .resolve_all(sources, cancel)
            .await
            .or_raise(|| if cancel.is_cancelled() { ErrorKind::Cancelled } else { ErrorKind::Resolve })?;
        let paths: Vec<PathBuf> = files.iter().map(|file| file.path.clone()).collect();
        if files.iter().any(ResolvedFile::is_remote) {
            tracing::debug!("remote sources are not cached");
            return import_uncached(engine, &paths).await;
        }
        let identities: Vec<PathBuf> = files.iter().map(|file| file.cache_identity().to_path_buf()).collect();

        let cache = self.cache.clone();
        let ids = identities.clone();
        let key = match blocking(cancel, move || cache.lookup(&ids)).await? {
            Lookup::Hit { artifact, metadata, .. } => {
                tracing::info!(artifact = %artifact.display(), "using cached import");
                return Ok(Prepared::Cached { artifact, metadata });
            },
            Lookup::Miss { reason: MissReason::Disabled, .. } => return import_uncached(engine, &paths).await,
            Lookup::Miss { key, .. } => key,
        };

        let cache = self.cache.clone();
        let token = cancel.clone();
        let pending = match blocking(cancel, move || cache.begin_write(&key, &identities, &token)).await {
            Ok(pending) => pending,
            Err(e) if cancel.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "cache write-back unavailable; importing without caching");
                return import_uncached(engine, &paths).await;
            },
        };
        if let Some(metadata) = pending.existing_entry() {
            let artifact = self.cache.artifact_path(pending.key());
            tracing::info!(artifact = %artifact.display(), "another process cached these sources while waiting");
            return Ok(Prepared::Cached { artifact, metadata });
        }

        let summary = engine.import(&paths, Some(pending.staging_path())).await?;
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let (tables, total_rows) = (summary.tables.clone(), summary.total_rows);
        let metadata = blocking(cancel, move || pending.commit(tables, total_rows)).await?;
        Ok(Prepared::Imported { artifact: Some(metadata.cache_file), summary })
    }

    /// Open a reader for a queue connection URL. Queue sources bypass
    /// resolution and the cache entirely.
    pub async fn open_queue(&self, url: &str) -> Result<Box<dyn MessageQueueReader>> {
        let config = QueueConfig::from_url_with_max(url, self.max_messages).or_raise(|| ErrorKind::Queue)?;
        self.registry.new_reader(&config).await.or_raise(|| ErrorKind::Queue)
    }

    /// Peek at up to the configured number of messages, then close the reader.
    pub async fn peek_queue(&self, url: &str) -> Result<Vec<Message>> {
        let config = QueueConfig::from_url_with_max(url, self.max_messages).or_raise(|| ErrorKind::Queue)?;
        let reader = self.registry.new_reader(&config).await.or_raise(|| ErrorKind::Queue)?;
        let messages = reader.peek(config.max_messages).await;
        if let Err(e) = reader.close().await {
            tracing::warn!(error = %e, resource = reader.resource(), "failed to close queue reader");
        }
        messages.or_raise(|| ErrorKind::Queue)
    }

    /// Attach a hint to an engine error message when one applies.
    pub fn explain(&self, error: impl Into<String>) -> Enhanced {
        dataql_hint::enhance(error)
    }

    fn resolver(&self) -> Result<SourceResolver> {
        let mut remote = RemoteResolver::builder().http_timeout(self.http_timeout).s3(self.s3.clone());
        let compression = match &self.temp_root {
            Some(root) => {
                remote = remote.temp_root(root);
                CompressionResolver::in_dir(root)
            },
            None => CompressionResolver::new(),
        };
        let remote = remote.build().or_raise(|| ErrorKind::Resolve)?;
        Ok(SourceResolver::new(remote, compression))
    }
}

async fn import_uncached(engine: &dyn Engine, paths: &[PathBuf]) -> Result<Prepared> {
    let summary = engine.import(paths, None).await?;
    Ok(Prepared::Imported { artifact: None, summary })
}

/// Run a blocking cache operation off the async runtime.
async fn blocking<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dataql_cache::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .or_raise(|| ErrorKind::Cache)?
        .or_raise(|| if cancel.is_cancelled() { ErrorKind::Cancelled } else { ErrorKind::Cache })
}

#[derive(Debug)]
pub struct PipelineBuilder {
    cache: CacheManager,
    registry: Registry,
    http_timeout: Duration,
    s3: S3Settings,
    temp_root: Option<PathBuf>,
    max_messages: usize,
}

impl PipelineBuilder {
    fn new(cache: CacheManager) -> Self {
        Self {
            cache,
            registry: Registry::with_defaults(),
            http_timeout: dataql_resolve::DEFAULT_HTTP_TIMEOUT,
            s3: S3Settings::default(),
            temp_root: None,
            max_messages: dataql_queue::DEFAULT_MAX_MESSAGES,
        }
    }

    /// Replace the default registry (compiled-in backends only).
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn s3(mut self, settings: S3Settings) -> Self {
        self.s3 = settings;
        self
    }

    /// Create temporary files under `root` instead of the system temp directory.
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            cache: self.cache,
            registry: self.registry,
            http_timeout: self.http_timeout,
            s3: self.s3,
            temp_root: self.temp_root,
            max_messages: self.max_messages,
        }
    }
}
