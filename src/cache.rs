use crate::error::Result;
use crate::models::Series;
use crate::traits::SitePlugin;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const CACHE_FILE_PREFIX: &str = "Manga-";
const CACHE_FILE_SUFFIX: &str = ".json";

/// Snapshot of a plugin's full series list as written to disk.
#[derive(Debug, Serialize, Deserialize)]
struct Catalog {
    plugin: String,
    refreshed_at: DateTime<Utc>,
    series: Vec<Series>,
}

/// One catalog file per plugin, so switching sites never mixes lists.
pub struct CatalogCache {
    plugin: String,
    path: PathBuf,
}

impl CatalogCache {
    pub fn new(cache_dir: impl AsRef<Path>, plugin_name: &str) -> Self {
        let file_name = format!("{}{}{}", CACHE_FILE_PREFIX, plugin_name, CACHE_FILE_SUFFIX);
        Self {
            plugin: plugin_name.to_string(),
            path: cache_dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached catalog. Any problem reading or decoding the file is
    /// a cache miss.
    pub fn load(&self) -> Option<Vec<Series>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No catalog cache found at {:?}", self.path);
                return None;
            }
            Err(e) => {
                warn!("Could not open catalog cache {:?}: {}", self.path, e);
                return None;
            }
        };

        let catalog: Catalog = match serde_json::from_reader(BufReader::new(file)) {
            Ok(catalog) => catalog,
            Err(e) if e.is_eof() => {
                warn!("Catalog cache {:?} ended unexpectedly, ignoring it", self.path);
                return None;
            }
            Err(e) => {
                warn!("Catalog cache {:?} is unreadable ({}), ignoring it", self.path, e);
                return None;
            }
        };

        if catalog.plugin != self.plugin {
            warn!(
                "Catalog cache {:?} belongs to plugin '{}', expected '{}'",
                self.path, catalog.plugin, self.plugin
            );
            return None;
        }

        debug!(
            "Loaded {} series from cache (refreshed {})",
            catalog.series.len(),
            catalog.refreshed_at
        );
        Some(catalog.series)
    }

    /// Writes the catalog. If serialization fails halfway, the file is
    /// removed instead of being left truncated.
    pub fn save(&self, series: &[Series]) -> Result<()> {
        info!("Saving catalog of {} series to {:?}", series.len(), self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let catalog = Catalog {
            plugin: self.plugin.clone(),
            refreshed_at: Utc::now(),
            series: series.to_vec(),
        };

        let result = File::create(&self.path)
            .map_err(crate::error::LoaderError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer(&mut writer, &catalog)?;
                writer.flush()?;
                Ok(())
            });

        if let Err(e) = result {
            error!("Failed to save catalog cache {:?}: {}", self.path, e);
            if let Err(remove_err) = fs::remove_file(&self.path) {
                if remove_err.kind() != ErrorKind::NotFound {
                    warn!("Could not remove broken cache {:?}: {}", self.path, remove_err);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Always asks the plugin, then stores the result.
    pub async fn refresh(&self, plugin: &dyn SitePlugin) -> Result<Vec<Series>> {
        info!("Refreshing catalog from plugin '{}'", plugin.name());
        let series = plugin.list_series().await?;

        if let Err(e) = self.save(&series) {
            warn!("Continuing with an uncached catalog: {}", e);
        }

        Ok(series)
    }
}
