use std::{env, path::Path, path::PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to download {url}: HTTP {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub model_input_op: String,
    pub model_output_op: String,
    pub upload_dir: PathBuf,
    pub index_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 5000,
            body_limit_bytes: 16 * 1024 * 1024,
            model_path: PathBuf::from("./model/eye_disease_model.pb"),
            model_url: None,
            model_input_op: "x".into(),
            model_output_op: "Identity".into(),
            upload_dir: PathBuf::from("static"),
            index_path: PathBuf::from("templates/index.html"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = match lookup("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                expected: "a valid number between 0 and 65535",
                value,
            })?,
            None => defaults.port,
        };

        let body_limit_bytes = match lookup("BODY_LIMIT_MB") {
            Some(value) => {
                let invalid = |value| ConfigError::Invalid {
                    name: "BODY_LIMIT_MB",
                    expected: "a size in megabytes that fits in memory",
                    value,
                };
                value
                    .parse::<usize>()
                    .ok()
                    .and_then(|mb| mb.checked_mul(1024 * 1024))
                    .ok_or_else(|| invalid(value))?
            }
            None => defaults.body_limit_bytes,
        };

        Ok(Config {
            port,
            body_limit_bytes,
            model_path: lookup("MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
            model_url: lookup("MODEL_URL").filter(|url| !url.is_empty()),
            model_input_op: lookup("MODEL_INPUT_OP").unwrap_or(defaults.model_input_op),
            model_output_op: lookup("MODEL_OUTPUT_OP").unwrap_or(defaults.model_output_op),
            upload_dir: lookup("UPLOAD_DIR").map_or(defaults.upload_dir, PathBuf::from),
            index_path: lookup("INDEX_PATH").map_or(defaults.index_path, PathBuf::from),
        })
    }
}

async fn download_file(url: &str, path: &Path) -> Result<(), ConfigError> {
    info!(url, path = %path.display(), "Downloading model");

    let download_err = |source| ConfigError::Download {
        url: url.to_string(),
        source,
    };

    let response = reqwest::Client::new()
        .get(url)
        .header(reqwest::header::ACCEPT, "application/octet-stream")
        .send()
        .await
        .map_err(download_err)?;

    if !response.status().is_success() {
        return Err(ConfigError::DownloadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(download_err)?;

    let write_err = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(write_err)
}

/// Fetches the model artifact when it is missing locally and a URL is configured.
pub async fn ensure_model_exists(config: &Config) -> Result<(), ConfigError> {
    info!("Checking model...");
    match (&config.model_url, config.model_path.exists()) {
        (Some(url), false) => download_file(url, &config.model_path).await,
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.body_limit_bytes, 16 * 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("static"));
        assert_eq!(config.model_input_op, "x");
        assert!(config.model_url.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("BODY_LIMIT_MB", "2"),
            ("MODEL_PATH", "/models/fundus.pb"),
            ("MODEL_URL", "https://example.com/fundus.pb"),
            ("UPLOAD_DIR", "/tmp/uploads"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.body_limit_bytes, 2 * 1024 * 1024);
        assert_eq!(config.model_path, PathBuf::from("/models/fundus.pb"));
        assert_eq!(config.model_url.as_deref(), Some("https://example.com/fundus.pb"));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/uploads"));
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "99999")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = Config::from_lookup(lookup_from(&[("BODY_LIMIT_MB", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BODY_LIMIT_MB", .. }));
    }

    #[test]
    fn body_limit_that_overflows_is_an_error() {
        for value in ["18446744073709551615", "17592186044416"] {
            let err = Config::from_lookup(lookup_from(&[("BODY_LIMIT_MB", value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "BODY_LIMIT_MB", .. }));
        }
    }

    #[tokio::test]
    async fn existing_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.pb");
        std::fs::write(&model_path, b"graph").unwrap();

        let config = Config {
            model_path,
            // Unroutable; reaching the network would fail the test.
            model_url: Some("http://127.0.0.1:1/model.pb".into()),
            ..Config::default()
        };
        ensure_model_exists(&config).await.unwrap();
    }
}
