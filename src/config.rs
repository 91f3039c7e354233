//! Configuration management for the genomic predictor service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "GENOMIC_PREDICTOR_CONFIG";

/// Secret shipped with the development configuration
pub const DEV_SECRET_KEY: &str = "supersecretkey";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub share: ShareConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Directory where uploads are staged while they are processed
    pub upload_dir: PathBuf,
    /// Sample CSV offered by `/download-sample`, relative to `static_dir`
    #[serde(default = "default_sample_file")]
    pub sample_file: String,
    /// Keep staged uploads on disk after processing
    #[serde(default)]
    pub keep_uploads: bool,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_sample_file() -> String {
    "uploads/sample_genomic_data_fixed.csv".to_string()
}

/// Classification model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// ONNX export of the trained classifier
    pub model_path: PathBuf,
    /// Class names in training index order (JSON array or one per line)
    pub classes_path: PathBuf,
    /// Number of intra-op threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Number of ranked labels kept per row
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_onnx_threads() -> usize {
    1
}

fn default_top_k() -> usize {
    3
}

/// Share-link signing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShareConfig {
    /// Server secret the signing key is derived from
    pub secret_key: String,
    /// Namespace mixed into the signing key
    #[serde(default = "default_share_salt")]
    pub salt: String,
    /// Reject share tokens older than this many seconds (unset = never expire)
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

fn default_share_salt() -> String {
    "share-result".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between periodic summaries (0 disables them)
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    300
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Absolute location of the downloadable sample file
    pub fn sample_path(&self) -> PathBuf {
        self.static_dir.join(&self.sample_file)
    }
}

impl ShareConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.secret_key == DEV_SECRET_KEY
    }
}

impl AppConfig {
    /// Load configuration from the default file, or the one named by
    /// `GENOMIC_PREDICTOR_CONFIG`
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `GENOMIC_PREDICTOR__*`
    /// environment overrides applied on top
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("GENOMIC_PREDICTOR").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                max_upload_bytes: default_max_upload_bytes(),
                static_dir: PathBuf::from("static"),
                upload_dir: PathBuf::from("var/uploads"),
                sample_file: default_sample_file(),
                keep_uploads: false,
            },
            model: ModelConfig {
                model_path: PathBuf::from("models/trained_model.onnx"),
                classes_path: PathBuf::from("models/classes.json"),
                onnx_threads: default_onnx_threads(),
                top_k: default_top_k(),
            },
            share: ShareConfig {
                secret_key: DEV_SECRET_KEY.to_string(),
                salt: default_share_salt(),
                max_age_secs: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.model.top_k, 3);
        assert_eq!(config.share.salt, "share-result");
        assert!(config.share.uses_dev_secret());
        assert!(config.share.max_age().is_none());
        assert_eq!(
            config.server.sample_path(),
            PathBuf::from("static/uploads/sample_genomic_data_fixed.csv")
        );
    }

    #[test]
    fn test_bind_addr() {
        let config = AppConfig::default();
        let addr = config.server.bind_addr().unwrap();
        assert_eq!(addr.port(), 5000);

        let mut bad = config.server.clone();
        bad.host = "not a host".to_string();
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 8080
static_dir = "static"
upload_dir = "/tmp/uploads"

[model]
model_path = "m.onnx"
classes_path = "classes.txt"

[share]
secret_key = "s3cret"
max_age_secs = 60

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.server.keep_uploads);
        assert_eq!(config.model.onnx_threads, 1);
        assert_eq!(config.model.top_k, 3);
        assert_eq!(config.share.max_age(), Some(Duration::from_secs(60)));
        assert!(!config.share.uses_dev_secret());
        assert_eq!(config.metrics.report_interval_secs, 300);
    }
}
