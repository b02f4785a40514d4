use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the `<series>/<series> NNN/NNN.ext` tree.
    pub base_path: PathBuf,
    /// Directory holding one catalog cache file per plugin.
    pub cache_dir: PathBuf,
    /// Where CBZ files go. Defaults to the series directory.
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub max_attempts: u32,
    pub workers: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub comic_info: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,
    pub user_agent: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    /// Pixels cut from the bottom of every stored page (ad banners).
    #[serde(default)]
    pub trim_bottom_px: u32,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get_site_config(&self, site_name: &str) -> Option<&SiteConfig> {
        self.sites.get(&site_name.to_lowercase())
    }
}

impl DownloaderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".mangaloader"),
        None => PathBuf::from(".mangaloader"),
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./downloads"),
            cache_dir: default_cache_dir(),
            archive_dir: None,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            workers: 1,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0"
                .to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { comic_info: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut sites = HashMap::new();

        sites.insert(
            "mangafox".to_string(),
            SiteConfig {
                name: "MangaFox".to_string(),
                base_url: "http://mangafox.me/".to_string(),
                user_agent: None,
                headers: None,
                trim_bottom_px: 0,
            },
        );

        sites.insert(
            "mangapark".to_string(),
            SiteConfig {
                name: "MangaPark".to_string(),
                base_url: "http://mangapark.me/".to_string(),
                user_agent: None,
                headers: None,
                trim_bottom_px: 0,
            },
        );

        Config {
            storage: StorageConfig::default(),
            downloader: DownloaderConfig::default(),
            archive: ArchiveConfig::default(),
            sites,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential_with_five_attempts() {
        let config = Config::default();
        assert_eq!(config.downloader.max_attempts, 5);
        assert_eq!(config.downloader.workers, 1);
        assert!(config.get_site_config("MangaFox").is_some());
        assert!(config.get_site_config("mangapark").is_some());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            base_path = "/srv/manga"

            [downloader]
            workers = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.downloader.workers, 4);
        assert_eq!(config.downloader.max_attempts, 5);
        assert_eq!(config.downloader.read_timeout_secs, 10);
        assert_eq!(config.storage.base_path, PathBuf::from("/srv/manga"));
        assert!(config.storage.archive_dir.is_none());
        assert!(config.archive.comic_info);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.downloader.max_attempts, 5);
    }

    #[test]
    fn save_then_load_keeps_sites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sites.len(), 2);
        assert_eq!(loaded.get_site_config("mangafox").unwrap().name, "MangaFox");
    }
}
