use crate::downloader::FetchResult;
use crate::loader::ChapterReport;
use crate::models::{ChapterKey, ChapterState, Image};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Receives progress events from the loader. All methods default to no-ops.
pub trait LoadObserver: Send + Sync {
    fn state_changed(&self, _chapter: &ChapterKey, _state: ChapterState) {}

    fn images_resolved(&self, _chapter: &ChapterKey, _count: usize) {}

    fn image_finished(&self, _image: &Image, _result: &FetchResult) {}

    fn chapter_finished(&self, _report: &ChapterReport) {}
}

/// Reports every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn state_changed(&self, chapter: &ChapterKey, state: ChapterState) {
        debug!("{} {}: {:?}", chapter.series, chapter.number, state);
    }

    fn images_resolved(&self, chapter: &ChapterKey, count: usize) {
        info!("{} {}: {} images found", chapter.series, chapter.number, count);
    }

    fn image_finished(&self, image: &Image, result: &FetchResult) {
        if result.ok {
            info!("load: \"{}\"", image);
        } else {
            warn!(
                "failed: \"{}\" after {} tries: {}",
                image,
                result.attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    fn chapter_finished(&self, report: &ChapterReport) {
        info!(
            "{} {}: {} stored, {} failed",
            report.chapter.series, report.chapter.number, report.images_stored, report.images_failed
        );
    }
}

/// Draws one progress bar per chapter. Failures still go to the log.
pub struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadObserver for ProgressObserver {
    fn images_resolved(&self, chapter: &ChapterKey, count: usize) {
        let bar = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(format!("{} {:03}", chapter.series, chapter.number));

        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn image_finished(&self, image: &Image, result: &FetchResult) {
        if !result.ok {
            warn!(
                "failed: \"{}\": {}",
                image,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.with_bar(|bar| {
            bar.set_message(format!("page {}", image.index));
            bar.inc(1);
        });
    }

    fn chapter_finished(&self, report: &ChapterReport) {
        self.with_bar(|bar| {
            bar.finish_with_message(format!(
                "{} stored, {} failed",
                report.images_stored, report.images_failed
            ));
        });
        if let Ok(mut guard) = self.bar.lock() {
            *guard = None;
        }
    }
}
