//! Source resolution and caching pipeline for dataql.
//!
//! A query names one or more sources. The [`Pipeline`] turns them into local
//! files (downloading and decompressing as needed), fingerprints the files,
//! and either hands back a cached artifact or asks the [`Engine`] to import
//! them and caches the result. Message queue sources skip all of that and are
//! opened as non-destructive readers instead.
//!
//! ```no_run
//! # async fn run(engine: &dyn dataql::Engine) -> dataql::error::Result<()> {
//! use dataql::{Pipeline, Source, config::Config};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::load(None).map_err(|e| e.raise(dataql::error::ErrorKind::Config))?;
//! dataql::logging::init(&config.log.filter);
//! let pipeline = Pipeline::new(&config)?;
//! let sources: [Source; 2] = ["data/orders.csv.gz".into(), "https://example.com/customers.json".into()];
//! let prepared = pipeline.prepare(&sources, engine, &CancellationToken::new()).await?;
//! println!("{:?}", prepared.artifact());
//! # Ok(())
//! # }
//! ```

mod engine;
pub mod error;
pub mod logging;
mod pipeline;

pub use crate::engine::{Engine, ImportSummary};
pub use crate::pipeline::{Pipeline, PipelineBuilder, Prepared};
pub use dataql_cache as cache;
pub use dataql_compress as compress;
pub use dataql_config as config;
pub use dataql_hint as hint;
pub use dataql_queue as queue;
pub use dataql_resolve as resolve;
pub use dataql_resolve::Source;
