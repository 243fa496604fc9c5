use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Application configuration, loaded from a YAML file.
///
/// All keys are optional; a missing or empty file yields [`Config::default`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Directories the watcher scans and schedules for indexing.
    pub watch_paths: Vec<PathBuf>,
    /// Port the HTTP server binds on.
    pub http_port: u16,
    /// Root of all persistent state (blobs, graph, embedder, tracker).
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            watch_paths: Vec::new(),
            http_port: 9090,
            data_dir: home.join(".mnemo").join("data"),
        }
    }
}

impl Config {
    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// is absent.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)
        .map_err(|e| Error::input(format!("failed to parse config {}: {}", path.display(), e)))?;

    if config.http_port == 0 {
        return Err(Error::input("http_port must be > 0"));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/mnemo.yaml")).unwrap();
        assert_eq!(config.http_port, 9090);
        assert!(config.watch_paths.is_empty());
    }

    #[test]
    fn parses_all_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mnemo.yaml");
        std::fs::write(
            &path,
            "watch_paths:\n  - /tmp/notes\n  - /tmp/docs\nhttp_port: 8181\ndata_dir: /tmp/mnemo-data\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.watch_paths.len(), 2);
        assert_eq!(config.http_port, 8181);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/mnemo-data"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mnemo.yaml");
        std::fs::write(&path, "http_port: 7000\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.http_port, 7000);
        assert!(config.watch_paths.is_empty());
    }

    #[test]
    fn rejects_port_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mnemo.yaml");
        std::fs::write(&path, "http_port: 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
