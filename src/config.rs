use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use serde_derive::Deserialize;

use crate::error::Error;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "labelgest.toml";
pub(crate) const TOKEN_ENV: &str = "TOLOKA_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub paths: PathsConfig,
    pub thumbnail: ThumbnailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_owned(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            paths: PathsConfig::default(),
            thumbnail: ThumbnailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ApiConfig {
    pub host: String,
    /// OAuth token. `TOLOKA_TOKEN` takes precedence.
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "https://toloka.yandex.com".to_owned(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Path-style endpoint for S3-compatible stores, e.g.
    /// `http://localhost:9000`. Unset means AWS virtual-hosted style.
    pub endpoint: Option<String>,
    /// Public URL of an uploaded object, with `{bucket}`, `{region}` and
    /// `{key}` placeholders.
    pub url_template: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            bucket: "toloka-kitchenware".to_owned(),
            region: "eu-west-1".to_owned(),
            endpoint: None,
            url_template: "https://{bucket}.s3.{region}.amazonaws.com/{key}".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct PathsConfig {
    pub images: PathBuf,
    pub thumbnails: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            images: PathBuf::from("images"),
            thumbnails: PathBuf::from("thumbnails"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ThumbnailConfig {
    pub max_size: u32,
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        ThumbnailConfig {
            max_size: 1000,
            quality: 95,
        }
    }
}

impl Config {
    /// Load from `path`, or from `labelgest.toml` in the working directory if
    /// no path is given and that file exists, or fall back to defaults. The
    /// environment is applied on top.
    pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub(crate) fn from_toml_str(content: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(content)
    }

    pub(crate) fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(token) = var(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.api.token = Some(token);
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.thumbnail.max_size == 0 {
            return Err(Error::config("thumbnail.max_size must be positive"));
        }
        if !(1..=100).contains(&self.thumbnail.quality) {
            return Err(Error::config(format!(
                "thumbnail.quality must be within 1..=100, got {}",
                self.thumbnail.quality
            )));
        }
        if self.storage.bucket.is_empty() {
            return Err(Error::config("storage.bucket must not be empty"));
        }
        if !self.storage.url_template.contains("{key}") {
            return Err(Error::config("storage.url_template must contain {key}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.api.host, "https://toloka.yandex.com");
        assert_eq!(config.storage.bucket, "toloka-kitchenware");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.paths.images, PathBuf::from("images"));
        assert_eq!(config.thumbnail.max_size, 1000);
        assert_eq!(config.thumbnail.quality, 95);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            log_level = "debug"

            [api]
            host = "https://sandbox.toloka.yandex.com"

            [thumbnail]
            quality = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api.host, "https://sandbox.toloka.yandex.com");
        assert_eq!(config.api.token, None);
        assert_eq!(config.thumbnail.quality, 80);
        assert_eq!(config.thumbnail.max_size, 1000);
    }

    #[test]
    fn env_token_overrides_file() {
        let mut config = Config::from_toml_str("[api]\ntoken = \"from-file\"").unwrap();
        config.apply_env(|name| match name {
            TOKEN_ENV => Some("from-env".to_owned()),
            _ => None,
        });
        assert_eq!(config.api.token.as_deref(), Some("from-env"));

        let mut config = Config::from_toml_str("[api]\ntoken = \"from-file\"").unwrap();
        config.apply_env(|_| Some(String::new()));
        assert_eq!(config.api.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = Config::from_toml_str("[thumbnail]\nquality = 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config::from_toml_str("[thumbnail]\nmax_size = 0").unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_toml_str("[storage]\nurl_template = \"https://cdn/\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[paths]\nimages = \"raw\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.paths.images, PathBuf::from("raw"));
        assert_eq!(config.paths.thumbnails, PathBuf::from("thumbnails"));

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
