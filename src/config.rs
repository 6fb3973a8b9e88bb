use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use crate::db;
use crate::service::{ServiceConfig, StoreFailurePolicy, DEFAULT_BANNER_TIMEOUT};
use crate::store::{NameMatch, SortMode};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "addrbook";

const KNOWN_KEYS: [&str; 5] = [
    "db_path",
    "sort",
    "banner_timeout_ms",
    "duplicate_names",
    "on_store_error",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub sort: SortMode,
    pub banner_timeout: Duration,
    /// How duplicate contact names are detected.
    pub duplicate_names: NameMatch,
    pub on_store_error: StoreFailurePolicy,
}

impl Config {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            banner_timeout: self.banner_timeout,
            name_match: self.duplicate_names,
            on_store_error: self.on_store_error,
            initial_sort: self.sort,
        }
    }
}

// =============================================================================
// File Deserialization
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    db_path: Option<PathBuf>,
    sort: Option<String>,
    banner_timeout_ms: Option<u64>,
    duplicate_names: Option<String>,
    on_store_error: Option<String>,
}

impl ConfigFile {
    fn into_config(self, config_path: PathBuf) -> Result<Config> {
        let db_path = match self.db_path {
            Some(path) => expand_tilde(&path),
            None => db::default_db_path()?,
        };

        let sort = match self.sort.as_deref() {
            Some(value) => SortMode::from_str(value).with_context(|| {
                format!("invalid sort '{}', expected one of: name, email", value)
            })?,
            None => SortMode::default(),
        };

        let duplicate_names = match self.duplicate_names.as_deref() {
            Some(value) => NameMatch::from_str(value).with_context(|| {
                format!(
                    "invalid duplicate_names '{}', expected one of: exact, ignore_case",
                    value
                )
            })?,
            None => NameMatch::default(),
        };

        let on_store_error = match self.on_store_error.as_deref() {
            Some(value) => StoreFailurePolicy::from_str(value).with_context(|| {
                format!(
                    "invalid on_store_error '{}', expected one of: keep_draft, discard_draft",
                    value
                )
            })?,
            None => StoreFailurePolicy::default(),
        };

        let banner_timeout = self
            .banner_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BANNER_TIMEOUT);
        if banner_timeout.is_zero() {
            bail!("banner_timeout_ms must be greater than zero");
        }

        Ok(Config {
            config_path,
            db_path,
            sort,
            banner_timeout,
            duplicate_names,
            on_store_error,
        })
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from `path`, or from the default location when `None`.
///
/// A missing file is not an error; every setting has a default.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path()?,
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        return ConfigFile::default().into_config(path);
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    parse(&raw, path)
}

pub fn parse(raw: &str, path: PathBuf) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    cfg_file.into_config(path)
}

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known: HashSet<&str> = HashSet::from(KNOWN_KEYS);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            tracing::warn!("unknown configuration key `{}`", key);
        }
    }
}
