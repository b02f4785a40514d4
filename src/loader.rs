//! Drives a run: series lookup through the catalog cache, chapter listing,
//! page resolution and download, and optional archiving.
//!
//! Each chapter moves through `Pending -> Resolving -> Downloading -> Done`.
//! Resolution asks the plugin for image 1, 2, 3, ... and stops at the first
//! index it cannot resolve; downloads start only after that. Per-image and
//! per-chapter failures are collected into the returned reports instead of
//! aborting the run.

use crate::archive::{self, ComicMetadata};
use crate::cache::CatalogCache;
use crate::config::Config;
use crate::downloader::{FetchResult, ImageDownloader};
use crate::error::{LoaderError, Result};
use crate::models::{Chapter, ChapterKey, ChapterState, Image, Series};
use crate::observer::{LoadObserver, TracingObserver};
use crate::storage::{ensure_dir, StorageManager};
use crate::traits::SitePlugin;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Three-digit page names leave room for 999 pages.
pub const MAX_IMAGES_PER_CHAPTER: u32 = 999;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub max_attempts: u32,
    pub workers: usize,
    pub comic_info: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            workers: 1,
            comic_info: true,
        }
    }
}

impl LoaderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.downloader.max_attempts,
            workers: config.downloader.workers,
            comic_info: config.archive.comic_info,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChapterReport {
    pub chapter: ChapterKey,
    pub state: ChapterState,
    pub images_found: usize,
    pub images_stored: usize,
    pub images_failed: usize,
    /// (image index, error) for every page that could not be stored.
    pub failures: Vec<(u32, String)>,
    /// Set when the plugin failed while resolving; the chapter may be short.
    pub resolution_error: Option<String>,
}

impl ChapterReport {
    fn new(chapter: ChapterKey) -> Self {
        Self {
            chapter,
            state: ChapterState::Pending,
            images_found: 0,
            images_stored: 0,
            images_failed: 0,
            failures: Vec::new(),
            resolution_error: None,
        }
    }

    /// Resolution ran to the plugin's end of chapter, at least one image
    /// was found and every image got a download attempt.
    pub fn success(&self) -> bool {
        self.state == ChapterState::Done
            && self.resolution_error.is_none()
            && self.images_found > 0
            && self.images_stored + self.images_failed == self.images_found
    }
}

/// What a batch did, for printing at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub chapters_done: Vec<u32>,
    pub chapters_empty: Vec<u32>,
    pub chapters_missing: Vec<u32>,
    pub images_stored: usize,
    pub images_failed: usize,
    pub archives: Vec<PathBuf>,
    pub archive_failures: Vec<u32>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.chapters_empty.is_empty()
            && self.chapters_missing.is_empty()
            && self.images_failed == 0
            && self.archive_failures.is_empty()
            && self.errors.is_empty()
    }

    fn record(&mut self, report: &ChapterReport) {
        self.images_stored += report.images_stored;
        self.images_failed += report.images_failed;
        match report.state {
            ChapterState::Empty => self.chapters_empty.push(report.chapter.number),
            _ => self.chapters_done.push(report.chapter.number),
        }
        if let Some(err) = &report.resolution_error {
            self.errors.push(format!(
                "{} {} resolution stopped after {} images: {}",
                report.chapter.series, report.chapter.number, report.images_found, err
            ));
        }
        for (index, err) in &report.failures {
            self.errors.push(format!(
                "{} {} image {}: {}",
                report.chapter.series, report.chapter.number, index, err
            ));
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chapters loaded:   {}", self.chapters_done.len())?;
        writeln!(f, "Images stored:     {}", self.images_stored)?;
        writeln!(f, "Images failed:     {}", self.images_failed)?;
        if !self.archives.is_empty() {
            writeln!(f, "Archives written:  {}", self.archives.len())?;
        }
        if !self.chapters_empty.is_empty() {
            writeln!(f, "Chapters without images: {:?}", self.chapters_empty)?;
        }
        if !self.chapters_missing.is_empty() {
            writeln!(f, "Chapters not found: {:?}", self.chapters_missing)?;
        }
        if !self.archive_failures.is_empty() {
            writeln!(f, "Chapters not archived: {:?}", self.archive_failures)?;
        }
        for err in &self.errors {
            writeln!(f, "  - {}", err)?;
        }
        Ok(())
    }
}

pub struct Loader {
    plugin: Arc<dyn SitePlugin>,
    storage: StorageManager,
    cache: Option<CatalogCache>,
    downloader: ImageDownloader,
    observer: Arc<dyn LoadObserver>,
    options: LoaderOptions,
    series: Option<Vec<Series>>,
    series_fresh: bool,
}

impl Loader {
    pub fn new(plugin: Arc<dyn SitePlugin>, config: &Config) -> Result<Self> {
        let cache = CatalogCache::new(&config.storage.cache_dir, plugin.name());
        Ok(Self::from_parts(
            plugin,
            StorageManager::new(&config.storage),
            Some(cache),
            ImageDownloader::new(&config.downloader)?,
            LoaderOptions::from_config(config),
        ))
    }

    pub fn from_parts(
        plugin: Arc<dyn SitePlugin>,
        storage: StorageManager,
        cache: Option<CatalogCache>,
        downloader: ImageDownloader,
        options: LoaderOptions,
    ) -> Self {
        Self {
            plugin,
            storage,
            cache,
            downloader,
            observer: Arc::new(TracingObserver),
            options,
            series: None,
            series_fresh: false,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Creates the download root. Failing here is fatal for the run.
    pub async fn prepare(&self) -> Result<()> {
        ensure_dir(self.storage.base_path()).await
    }

    /// Catalog of the plugin's site. Served from memory, then from the
    /// cache file, and only then from the site. `update` forces the latter.
    pub async fn all_series(&mut self, update: bool) -> Result<&[Series]> {
        if update {
            self.refresh_series().await?;
        } else if self.series.is_none() {
            match self.cache.as_ref().and_then(|cache| cache.load()) {
                Some(list) => {
                    self.series = Some(list);
                    self.series_fresh = false;
                }
                None => self.refresh_series().await?,
            }
        }
        Ok(self.series.as_deref().unwrap_or_default())
    }

    async fn refresh_series(&mut self) -> Result<()> {
        let list = match &self.cache {
            Some(cache) => cache.refresh(self.plugin.as_ref()).await?,
            None => self.plugin.list_series().await?,
        };
        info!("{} series known to '{}'", list.len(), self.plugin.name());
        self.series = Some(list);
        self.series_fresh = true;
        Ok(())
    }

    /// Exact-name lookup. A name missing from a cached catalog triggers one
    /// refresh before giving up.
    pub async fn resolve_series(&mut self, name: &str) -> Result<Series> {
        debug!("Getting series for name: {}", name);
        let found = self.all_series(false).await?.iter().find(|s| s.name == name).cloned();
        if let Some(series) = found {
            return Ok(series);
        }

        if !self.series_fresh {
            info!("'{}' not in cached catalog, refreshing", name);
            let found = self.all_series(true).await?.iter().find(|s| s.name == name).cloned();
            if let Some(series) = found {
                return Ok(series);
            }
        }

        Err(LoaderError::series_not_found(name))
    }

    /// Asks the plugin for the chapter list and attaches it to `series`.
    pub async fn chapters<'a>(&self, series: &'a mut Series) -> Result<&'a [Chapter]> {
        let list = self.plugin.list_chapters(series).await?;
        debug!("{} chapters for {}", list.len(), series.name);
        series.chapters.clear();
        for chapter in list {
            series.add_chapter(chapter);
        }
        Ok(&series.chapters)
    }

    fn set_state(&self, report: &mut ChapterReport, state: ChapterState) {
        report.state = state;
        self.observer.state_changed(&report.chapter, state);
    }

    /// Fills `chapter.images` by asking for index 1, 2, ... until the plugin
    /// reports no image. On a plugin error the images resolved so far stay
    /// in `chapter.images` and the error is returned.
    pub async fn resolve_images(&self, chapter: &mut Chapter) -> Result<usize> {
        chapter.images.clear();
        for index in 1..=MAX_IMAGES_PER_CHAPTER {
            let mut image = chapter.image_at(index);
            match self.plugin.resolve_image_url(chapter, &mut image).await {
                Ok(true) => chapter.add_image(image),
                Ok(false) => break,
                Err(e) => {
                    warn!("Resolving {} stopped: {}", image, e);
                    return Err(e);
                }
            }
            if index == MAX_IMAGES_PER_CHAPTER {
                warn!("{} reached {} images, ignoring the rest", chapter, MAX_IMAGES_PER_CHAPTER);
            }
        }
        Ok(chapter.images.len())
    }

    async fn load_image(&self, image: &Image) -> FetchResult {
        let Some(url) = image.url.as_deref() else {
            return FetchResult {
                error: Some("no image URL resolved".to_string()),
                ..FetchResult::default()
            };
        };

        let destination = self.storage.image_base_path(image);
        let result = self
            .downloader
            .fetch(url, &destination, self.options.max_attempts)
            .await;

        if let Some(path) = result.final_path.as_deref() {
            if let Err(e) = self.plugin.postprocess(path).await {
                warn!("Post-processing {:?} failed: {}", path, e);
            }
        }

        self.observer.image_finished(image, &result);
        result
    }

    /// Downloads every resolved image with at most `workers` in flight.
    async fn download_images(&self, chapter: &mut Chapter, report: &mut ChapterReport) {
        let workers = self.options.workers.max(1);
        let images = chapter.images.clone();

        let results: Vec<(u32, FetchResult)> = stream::iter(images.iter())
            .map(|image| async move { (image.index, self.load_image(image).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        for (index, result) in results {
            if result.ok {
                report.images_stored += 1;
                if let Some(image) = chapter.images.iter_mut().find(|i| i.index == index) {
                    image.extension = result.extension;
                }
            } else {
                report.images_failed += 1;
                report.failures.push((
                    index,
                    result.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
        }
        report.failures.sort_by_key(|(index, _)| *index);
    }

    /// Resolves then downloads one chapter. Image failures are counted, not
    /// raised; see [`ChapterReport::success`].
    pub async fn handle_chapter(&self, chapter: &mut Chapter) -> ChapterReport {
        debug!("handle_chapter({})", chapter);
        let mut report = ChapterReport::new(chapter.key());
        self.set_state(&mut report, ChapterState::Pending);

        self.set_state(&mut report, ChapterState::Resolving);
        match self.resolve_images(chapter).await {
            Ok(found) => report.images_found = found,
            Err(e) => {
                report.images_found = chapter.images.len();
                report.resolution_error = Some(e.to_string());
            }
        }
        self.observer.images_resolved(&report.chapter, report.images_found);

        if report.images_found == 0 {
            warn!("No images found for {}", chapter);
            self.set_state(&mut report, ChapterState::Empty);
            self.observer.chapter_finished(&report);
            return report;
        }

        self.set_state(&mut report, ChapterState::Downloading);
        self.download_images(chapter, &mut report).await;

        self.set_state(&mut report, ChapterState::Done);
        self.observer.chapter_finished(&report);
        report
    }

    /// Packs an already downloaded chapter into a CBZ.
    pub fn archive_chapter(&self, chapter: &Chapter) -> Option<PathBuf> {
        let key = chapter.key();
        let chapter_dir = self.storage.chapter_dir(&key);
        let dest_dir = self.storage.archive_dir(&key.series);

        if self.options.comic_info {
            let page_count = if chapter.images.is_empty() {
                count_files(&chapter_dir)
            } else {
                chapter.images.len()
            };
            let metadata = ComicMetadata {
                series: key.series.clone(),
                number: key.number,
                title: Some(chapter.title.clone()),
                page_count,
            };
            archive::archive_with_metadata(&chapter_dir, &dest_dir, Some(&metadata))
        } else {
            archive::archive(&chapter_dir, &dest_dir)
        }
    }

    async fn ensure_chapters(&self, series: &mut Series, summary: &mut RunSummary) -> bool {
        if !series.chapters.is_empty() {
            return true;
        }
        match self.chapters(series).await {
            Ok(_) => true,
            Err(e) => {
                error!("Could not list chapters of {}: {}", series.name, e);
                summary.errors.push(format!("{}: {}", series.name, e));
                false
            }
        }
    }

    /// Loads each requested chapter of `series` in turn. Numbers that are
    /// not in the chapter list are reported and skipped.
    pub async fn handle(&self, series: &mut Series, numbers: &[u32], archive: bool) -> RunSummary {
        debug!("handle({}, {:?})", series.name, numbers);
        let mut summary = RunSummary::default();

        if !self.ensure_chapters(series, &mut summary).await {
            summary.chapters_missing.extend_from_slice(numbers);
            return summary;
        }

        let series_name = series.name.clone();
        for &number in numbers {
            let Some(chapter) = series.get_chapter_mut(number) else {
                let e = LoaderError::chapter_not_found(&series_name, number);
                error!("{}", e);
                summary.chapters_missing.push(number);
                summary.errors.push(e.to_string());
                continue;
            };

            let report = self.handle_chapter(chapter).await;
            summary.record(&report);

            if archive && report.success() {
                match self.archive_chapter(chapter) {
                    Some(path) => summary.archives.push(path),
                    None => summary.archive_failures.push(number),
                }
            }
        }

        summary
    }

    /// Archives chapters that were downloaded earlier, without touching
    /// the network beyond listing the chapters.
    pub async fn archive_range(&self, series: &mut Series, numbers: &[u32]) -> RunSummary {
        let mut summary = RunSummary::default();

        if !self.ensure_chapters(series, &mut summary).await {
            summary.chapters_missing.extend_from_slice(numbers);
            return summary;
        }

        for &number in numbers {
            let Some(chapter) = series.get_chapter(number) else {
                let e = LoaderError::chapter_not_found(&series.name, number);
                error!("{}", e);
                summary.chapters_missing.push(number);
                summary.errors.push(e.to_string());
                continue;
            };

            match self.archive_chapter(chapter) {
                Some(path) => summary.archives.push(path),
                None => summary.archive_failures.push(number),
            }
        }

        summary
    }
}

fn count_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|path| path.is_file())
                .filter(|path| path.extension().map_or(true, |ext| ext != "part"))
                .count()
        })
        .unwrap_or(0)
}
