//! Parser and server configuration
//!
//! Plain structs with defaults matching a stock local CoreNLP setup. Values
//! can be overridden from the environment or a YAML file.

use crate::assets::{default_cache_root, AssetResult, ResourceBundle};
use crate::client::Pipeline;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Port the managed CoreNLP server listens on
pub const DEFAULT_PORT: u16 = 9000;

/// Server-side idle/request timeout passed to CoreNLP, in milliseconds
pub const DEFAULT_SERVER_TIMEOUT_MS: u64 = 150_000;

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// How to launch and health-check a local CoreNLP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Runtime executable
    pub program: String,
    /// Arguments before the entry point (memory flags, classpath)
    pub runtime_args: Vec<String>,
    /// Server entry point
    pub main_class: String,
    pub port: u16,
    /// Value for the server's `-timeout` flag
    pub server_timeout_ms: u64,
    /// Health-check attempts before giving up
    pub health_check_attempts: u32,
    /// Pause after each failed health check
    pub health_check_interval: Duration,
    /// Extra wait after the first successful health check
    pub startup_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            runtime_args: vec!["-mx4g".to_string(), "-cp".to_string(), "*".to_string()],
            main_class: "edu.stanford.nlp.pipeline.StanfordCoreNLPServer".to_string(),
            port: DEFAULT_PORT,
            server_timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
            health_check_attempts: 10,
            health_check_interval: Duration::from_secs(5),
            startup_grace: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Full argument list for the child process
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.runtime_args.clone();
        args.push(self.main_class.clone());
        args.extend([
            "-port".to_string(),
            self.port.to_string(),
            "-timeout".to_string(),
            self.server_timeout_ms.to_string(),
        ]);
        args
    }

    /// URL polled for liveness
    pub fn health_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_health_check(mut self, attempts: u32, interval: Duration) -> Self {
        self.health_check_attempts = attempts;
        self.health_check_interval = interval;
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }
}

/// Configuration for a parsing session
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Server to probe first; a local one is launched if it doesn't answer.
    /// Should point at `server.port` so the launched server is the one probed.
    pub corenlp_url: String,
    pub pipeline: Pipeline,
    /// Download the bundle when it's not in the cache. When false, a missing
    /// bundle is reported instead.
    pub download_if_missing: bool,
    /// Timeout for a single annotation request
    pub request_timeout: Duration,
    /// Overrides `~/.kindred`
    pub cache_root: Option<PathBuf>,
    pub bundle: ResourceBundle,
    pub server: ServerConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            corenlp_url: format!("http://localhost:{}", DEFAULT_PORT),
            pipeline: Pipeline::Dependency,
            download_if_missing: true,
            request_timeout: Duration::from_millis(DEFAULT_SERVER_TIMEOUT_MS),
            cache_root: None,
            bundle: ResourceBundle::corenlp(),
            server: ServerConfig::default(),
        }
    }
}

/// On-disk form of the configuration; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    corenlp_url: Option<String>,
    pipeline: Option<Pipeline>,
    download_if_missing: Option<bool>,
    request_timeout_secs: Option<u64>,
    cache_root: Option<PathBuf>,
    server: Option<ServerSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    program: Option<String>,
    runtime_args: Option<Vec<String>>,
    port: Option<u16>,
    timeout_ms: Option<u64>,
    health_check_attempts: Option<u32>,
    health_check_interval_secs: Option<u64>,
}

impl ParserConfig {
    /// Defaults overridden by `KINDRED_CORENLP_URL`, `KINDRED_HOME` and
    /// `KINDRED_PIPELINE` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = var("KINDRED_CORENLP_URL") {
            self.corenlp_url = url;
        }
        if let Some(home) = var("KINDRED_HOME") {
            self.cache_root = Some(PathBuf::from(home));
        }
        if let Some(pipeline) = var("KINDRED_PIPELINE") {
            self.pipeline = pipeline.parse().map_err(|reason| ConfigError::Invalid {
                key: "KINDRED_PIPELINE".to_string(),
                reason,
            })?;
        }
        Ok(self)
    }

    /// Defaults overridden by a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(url) = file.corenlp_url {
            config.corenlp_url = url;
        }
        if let Some(pipeline) = file.pipeline {
            config.pipeline = pipeline;
        }
        if let Some(download) = file.download_if_missing {
            config.download_if_missing = download;
        }
        if let Some(secs) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.cache_root = file.cache_root.or(config.cache_root);

        if let Some(server) = file.server {
            let s = &mut config.server;
            if let Some(program) = server.program {
                s.program = program;
            }
            if let Some(args) = server.runtime_args {
                s.runtime_args = args;
            }
            if let Some(port) = server.port {
                s.port = port;
            }
            if let Some(ms) = server.timeout_ms {
                s.server_timeout_ms = ms;
            }
            if let Some(attempts) = server.health_check_attempts {
                if attempts == 0 {
                    return Err(ConfigError::Invalid {
                        key: "server.health_check_attempts".to_string(),
                        reason: "must be at least 1".to_string(),
                    });
                }
                s.health_check_attempts = attempts;
            }
            if let Some(secs) = server.health_check_interval_secs {
                s.health_check_interval = Duration::from_secs(secs);
            }
        }

        Ok(config)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.corenlp_url = url.into();
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    pub fn with_download_if_missing(mut self, download: bool) -> Self {
        self.download_if_missing = download;
        self
    }

    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Cache root in effect: the override, else `~/.kindred`
    pub fn resolved_cache_root(&self) -> AssetResult<PathBuf> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(),
        }
    }
}
