use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use url::Url;

use crate::client::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT};
use crate::page::DEFAULT_SETTLE_DELAY;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/";
const ENV_PREFIX: &str = "CELEBRATE_";

#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct ConfigFile {
    pub base_url: Option<Url>,
    pub request_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub webhook_url: Option<Url>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    base_url: Option<Url>,
    request_timeout_secs: Option<u64>,
    upload_timeout_secs: Option<u64>,
    settle_delay_ms: Option<u64>,
    webhook_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
    pub settle_delay: Duration,
    /// Where the keep-alive monitor posts critical alerts.
    pub webhook_url: Option<Url>,
}

fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Result<Config> {
    let base_url = match override_config.base_url.or(base.base_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_BASE_URL)?,
    };

    let request_timeout = override_config
        .request_timeout_secs
        .or(base.request_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    let upload_timeout = override_config
        .upload_timeout_secs
        .or(base.upload_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_UPLOAD_TIMEOUT);

    let settle_delay = override_config
        .settle_delay_ms
        .or(base.settle_delay_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SETTLE_DELAY);

    Ok(Config {
        base_url,
        request_timeout,
        upload_timeout,
        settle_delay,
        webhook_url: override_config.webhook_url.or(base.webhook_url),
    })
}

fn config_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "celebrate", "celebrate")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

pub fn read_config_file() -> Result<ConfigFile> {
    let config_file = config_path()?;
    match fs::read_to_string(&config_file) {
        Ok(config) => toml::from_str(&config)
            .with_context(|| format!("Invalid config file {}", config_file.display())),
        Err(_) => Ok(ConfigFile::default()),
    }
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::prefixed(ENV_PREFIX)
        .from_env::<ConfigEnv>()
        .unwrap_or_default();

    merge_config(read_config_file()?, env_config)
}

pub fn write_config(config: ConfigFile) -> Result<PathBuf> {
    let config_file = config_path()?;
    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    fs::write(&config_file, toml::to_string_pretty(&config)?)
        .context("Failed to write config file")?;
    Ok(config_file)
}
