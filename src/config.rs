use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub qa: QaConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_max_file_size_mb() -> u64 {
    10
}

impl StorageConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            language: default_language(),
        }
    }
}

fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}
fn default_language() -> String {
    "eng".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QaConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            chunk_max_chars: default_chunk_max_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chunk_max_chars() -> usize {
    3_000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate storage
    if config.storage.max_file_size_mb == 0 {
        anyhow::bail!("storage.max_file_size_mb must be > 0");
    }

    // Validate extraction
    if config.extraction.tesseract_cmd.trim().is_empty() {
        anyhow::bail!("extraction.tesseract_cmd must not be empty");
    }

    // Validate qa
    if config.qa.chunk_max_chars == 0 {
        anyhow::bail!("qa.chunk_max_chars must be > 0");
    }
    if config.qa.timeout_secs == 0 {
        anyhow::bail!("qa.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("dv.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[db]
path = "data/dv.sqlite"

[storage]
upload_dir = "uploads"

[server]
bind = "127.0.0.1:8085"
"#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.max_file_size_mb, 10);
        assert_eq!(config.storage.max_file_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(config.extraction.tesseract_cmd, "tesseract");
        assert_eq!(config.qa.chunk_max_chars, 3_000);
        assert_eq!(config.qa.timeout_secs, 60);
    }

    #[test]
    fn zero_size_limit_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[db]
path = "data/dv.sqlite"

[storage]
upload_dir = "uploads"
max_file_size_mb = 0

[server]
bind = "127.0.0.1:8085"
"#,
        );

        assert!(load_config(&path).is_err());
    }
}
