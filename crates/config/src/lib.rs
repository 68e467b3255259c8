//! Layered configuration.
//!
//! Values are merged from, in increasing order of precedence:
//! 1. built-in defaults,
//! 2. a configuration file (an explicit path, else `~/.dataql/config.toml` if
//!    it exists; `.yaml`/`.yml` and `.json` files are read in those formats),
//! 3. environment variables prefixed with `DATAQL_`, with nested keys
//!    separated by `__` (for example `DATAQL_CACHE__ENABLED=false`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = ".dataql";
const CONFIG_FILE: &str = "config.toml";
const CACHE_DIR: &str = "cache";
const ENV_PREFIX: &str = "DATAQL_";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub queue: QueueConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Defaults to `~/.dataql/cache`.
    pub dir: Option<PathBuf>,
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub http_timeout_secs: u64,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub s3_endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// A `tracing` filter directive such as `info` or `dataql_cache=debug`.
    pub filter: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, dir: None, lock_timeout_secs: 30 }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { http_timeout_secs: 300, s3_region: None, s3_endpoint: None }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_messages: 10 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl Config {
    /// Load from `file`, or from `~/.dataql/config.toml` when no file is given
    /// and that file exists.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        match file {
            Some(file) => Self::load_from(Some(file)),
            None => {
                let default = default_config_file().filter(|path| path.is_file());
                Self::load_from(default.as_deref())
            },
        }
    }

    /// Load from exactly the given file (or none), then the environment.
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        if let Some(file) = file
            && !file.is_file()
        {
            exn::bail!(ErrorKind::FileNotFound(file.to_path_buf()));
        }
        let config: Self = Self::figment(file).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(file = ?file, "loaded configuration");
        Ok(config)
    }

    /// The provider chain, exposed so callers can merge extra sources on top.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.lock_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid { field: "cache.lock_timeout_secs", reason: "must be greater than zero" });
        }
        if self.remote.http_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid { field: "remote.http_timeout_secs", reason: "must be greater than zero" });
        }
        if self.queue.max_messages == 0 {
            exn::bail!(ErrorKind::Invalid { field: "queue.max_messages", reason: "must be greater than zero" });
        }
        if self.cache.dir.as_ref().is_some_and(|dir| dir.as_os_str().is_empty()) {
            exn::bail!(ErrorKind::Invalid { field: "cache.dir", reason: "must not be empty" });
        }
        Ok(())
    }
}

impl CacheConfig {
    /// The configured directory, or `~/.dataql/cache`.
    pub fn dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl RemoteConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

pub fn default_cache_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_raise(|| ErrorKind::NoHomeDirectory)?;
    Ok(base.home_dir().join(APP_DIR).join(CACHE_DIR))
}

pub fn default_config_file() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.home_dir().join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let config = Config::load_from(None).unwrap();
            assert_eq!(config, Config::default());
            assert!(config.cache.enabled);
            assert_eq!(config.cache.dir, None);
            assert_eq!(config.cache.lock_timeout(), Duration::from_secs(30));
            assert_eq!(config.remote.http_timeout(), Duration::from_secs(300));
            assert_eq!(config.queue.max_messages, 10);
            assert_eq!(config.log.filter, "info");
            Ok(())
        });
    }

    #[test]
    fn test_file_then_environment() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "config.toml",
                r#"
                [cache]
                enabled = true
                dir = "/var/cache/dataql"

                [remote]
                http_timeout_secs = 60
                s3_region = "eu-west-1"
                "#,
            )?;
            jail.set_env("DATAQL_CACHE__ENABLED", "false");
            jail.set_env("DATAQL_QUEUE__MAX_MESSAGES", "25");

            let config = Config::load_from(Some(Path::new("config.toml"))).unwrap();
            assert!(!config.cache.enabled, "environment wins over the file");
            assert_eq!(config.cache.dir().unwrap(), PathBuf::from("/var/cache/dataql"));
            assert_eq!(config.remote.http_timeout_secs, 60);
            assert_eq!(config.remote.s3_region.as_deref(), Some("eu-west-1"));
            assert_eq!(config.remote.s3_endpoint, None);
            assert_eq!(config.queue.max_messages, 25);
            assert_eq!(config.cache.lock_timeout_secs, 30, "unset keys keep their defaults");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.yaml", "log:\n  filter: dataql=debug\n")?;
            let config = Config::load_from(Some(Path::new("config.yaml"))).unwrap();
            assert_eq!(config.log.filter, "dataql=debug");
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::FileNotFound(PathBuf::from("nope.toml")));
            Ok(())
        });
    }

    #[test]
    fn test_wrong_type_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file("config.toml", "[cache]\nenabled = \"sometimes\"\n")?;
            let err = Config::load_from(Some(Path::new("config.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
            Ok(())
        });
    }

    #[rstest]
    #[case("DATAQL_CACHE__LOCK_TIMEOUT_SECS", "cache.lock_timeout_secs")]
    #[case("DATAQL_REMOTE__HTTP_TIMEOUT_SECS", "remote.http_timeout_secs")]
    #[case("DATAQL_QUEUE__MAX_MESSAGES", "queue.max_messages")]
    fn test_zero_is_rejected(#[case] variable: &str, #[case] field: &str) {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env(variable, 0);
            let err = Config::load_from(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid { field: f, .. } if *f == field));
            Ok(())
        });
    }
}
