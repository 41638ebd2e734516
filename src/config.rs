use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = ".lazytodo/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("missing {0}; set it in the config file or the environment")]
    Missing(&'static str),
    #[error("invalid backend url {url}: {source}")]
    InvalidUrl { url: String, source: url::ParseError },
}

#[derive(Debug, Parser)]
#[command(name = "lazytodo", about = "Todo list backed by a Supabase project")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Project URL, e.g. https://xyzcompany.supabase.co
    #[arg(long, env = "SUPABASE_URL")]
    pub url: Option<String>,

    /// Public anon key of the project
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,

    /// OAuth provider offered on the login view
    #[arg(long)]
    pub provider: Option<String>,

    /// Ignore toggle/delete on a row that already has a request in flight
    #[arg(long)]
    pub dedupe: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: String,
    pub anon_key: String,
    pub table: String,
    pub provider: String,
    pub redirect_to: String,
    pub session_file: PathBuf,
    pub log_file: PathBuf,
    pub dedupe_requests: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            anon_key: String::new(),
            table: "todos".into(),
            provider: "github".into(),
            redirect_to: "http://localhost:3000".into(),
            session_file: PathBuf::from(".lazytodo/session"),
            log_file: PathBuf::from(".lazytodo/lazytodo.log"),
            dedupe_requests: false,
        }
    }
}

impl Config {
    /// Reads the file if it exists, then lets the command line win.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&cli.config)?.unwrap_or_default();
        config.merge_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn merge_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.url {
            self.supabase_url = url.clone();
        }
        if let Some(key) = &cli.anon_key {
            self.anon_key = key.clone();
        }
        if let Some(provider) = &cli.provider {
            self.provider = provider.clone();
        }
        self.dedupe_requests |= cli.dedupe;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supabase_url.trim().is_empty() {
            return Err(ConfigError::Missing("supabase_url"));
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("anon_key"));
        }
        self.base_url().map(|_| ())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        // A trailing slash keeps `Url::join` from dropping the last path segment.
        let raw = format!("{}/", self.supabase_url.trim_end_matches('/'));
        Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            url: self.supabase_url.clone(),
            source,
        })
    }
}
