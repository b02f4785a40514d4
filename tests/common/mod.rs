#![allow(dead_code)]

use mangaloader::cache::CatalogCache;
use mangaloader::config::DownloaderConfig;
use mangaloader::downloader::ImageDownloader;
use mangaloader::error::{LoaderError, Result};
use mangaloader::storage::StorageManager;
use mangaloader::{Chapter, Image, Loader, LoaderOptions, Series, SitePlugin};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PLUGIN_NAME: &str = "scripted";

/// In-memory site: a fixed catalog and, per chapter number, the list of
/// image URLs it resolves to.
pub struct ScriptedPlugin {
    pub series: Vec<Series>,
    pub pages: HashMap<(String, u32), Vec<String>>,
    /// Image index at which resolution fails, per chapter.
    pub broken_at: HashMap<(String, u32), u32>,
    pub list_calls: AtomicUsize,
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self {
            series: Vec::new(),
            pages: HashMap::new(),
            broken_at: HashMap::new(),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Adds a series whose chapters `numbers` each have `page_count` pages
    /// served from `image_base/<series>/<chapter>/<page>.<ext>`.
    pub fn with_series(
        mut self,
        name: &str,
        numbers: impl IntoIterator<Item = u32>,
        page_count: usize,
        image_base: &str,
        ext: &str,
    ) -> Self {
        let mut series = Series::new(name, format!("{}/series/{}", image_base, name));
        for number in numbers {
            series.add_chapter(Chapter::new(
                name,
                number,
                format!("{}/series/{}/{}", image_base, name, number),
            ));
            let urls = (1..=page_count)
                .map(|page| format!("{}/img/{}/{}/{}.{}", image_base, name, number, page, ext))
                .collect();
            self.pages.insert((name.to_string(), number), urls);
        }
        self.series.push(series);
        self
    }

    /// Makes resolving image `index` of the chapter fail with a scraping error.
    pub fn failing_at(mut self, name: &str, number: u32, index: u32) -> Self {
        self.broken_at.insert((name.to_string(), number), index);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SitePlugin for ScriptedPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn list_series(&self) -> Result<Vec<Series>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .series
            .iter()
            .map(|s| Series {
                chapters: Vec::new(),
                ..s.clone()
            })
            .collect())
    }

    async fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        Ok(self
            .series
            .iter()
            .find(|s| s.name == series.name)
            .map(|s| s.chapters.clone())
            .unwrap_or_default())
    }

    async fn resolve_image_url(&self, chapter: &Chapter, image: &mut Image) -> Result<bool> {
        let key = (chapter.series.clone(), chapter.number);
        if self.broken_at.get(&key) == Some(&image.index) {
            return Err(LoaderError::scraping(format!("page {} has no image tag", image.index)));
        }
        let url = self
            .pages
            .get(&key)
            .and_then(|urls| urls.get(image.index as usize - 1));
        match url {
            Some(url) => {
                image.url = Some(url.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub fn test_downloader_config() -> DownloaderConfig {
    DownloaderConfig {
        connect_timeout_secs: 1,
        read_timeout_secs: 2,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        ..DownloaderConfig::default()
    }
}

pub fn test_loader(plugin: Arc<dyn SitePlugin>, root: &Path, workers: usize) -> Loader {
    let options = LoaderOptions {
        max_attempts: 2,
        workers,
        comic_info: true,
    };
    Loader::from_parts(
        plugin.clone(),
        StorageManager::with_base_path(root.join("downloads")),
        Some(CatalogCache::new(root.join("cache"), plugin.name())),
        ImageDownloader::new(&test_downloader_config()).unwrap(),
        options,
    )
}

/// Serves every `/img/...` request with a small body of the given type.
pub async fn image_server(content_type: &str) -> (mockito::ServerGuard, mockito::Mock) {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", mockito::Matcher::Regex(r"^/img/.*$".to_string()))
        .with_status(200)
        .with_header("content-type", content_type)
        .with_body(b"not really an image".as_slice())
        .create_async()
        .await;
    (server, mock)
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
