//! On-disk layout of downloaded chapters.
//!
//! ```text
//! <base>/<series>/<series> <NNN>/<III>.<ext>
//! ```
//!
//! Every path is derived from (series name, chapter number, image index)
//! alone, so repeated runs land on the same files.

use crate::config::StorageConfig;
use crate::error::Result;
use crate::models::{ChapterKey, Image};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageManager {
    base_path: PathBuf,
    archive_path: Option<PathBuf>,
}

impl StorageManager {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            archive_path: config.archive_dir.clone(),
        }
    }

    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            archive_path: None,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn series_dir(&self, series_name: &str) -> PathBuf {
        self.base_path.join(sanitize_component(series_name))
    }

    /// `<series> NNN`, zero padded to three digits. Numbers from 1000 up
    /// simply get wider names; they are not truncated.
    pub fn chapter_dir_name(chapter: &ChapterKey) -> String {
        format!("{} {:03}", sanitize_component(&chapter.series), chapter.number)
    }

    pub fn chapter_dir(&self, chapter: &ChapterKey) -> PathBuf {
        self.series_dir(&chapter.series)
            .join(Self::chapter_dir_name(chapter))
    }

    /// Path of an image without any extension. The downloader appends the
    /// extension once the response tells it which one.
    pub fn image_base_path(&self, image: &Image) -> PathBuf {
        self.chapter_dir(&image.chapter)
            .join(format!("{:03}", image.index))
    }

    /// Path of an image. The extension is only added when asked for and
    /// already known on the image.
    pub fn image_path(&self, image: &Image, with_extension: bool) -> PathBuf {
        let base = self.image_base_path(image);
        match (&image.extension, with_extension) {
            (Some(ext), true) => append_extension(&base, ext),
            _ => base,
        }
    }

    /// Whether the image is on disk, using its extension if known and
    /// otherwise any file named after its index.
    pub fn image_exists(&self, image: &Image) -> bool {
        if image.extension.is_some() {
            return self.image_path(image, true).is_file();
        }
        !self.stored_variants(image).is_empty()
    }

    /// All files in the chapter directory whose stem is the image index.
    /// In-flight `.part` files are not counted.
    pub fn stored_variants(&self, image: &Image) -> Vec<PathBuf> {
        let stem = format!("{:03}", image.index);
        let dir = self.chapter_dir(&image.chapter);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().map_or(true, |ext| ext != "part"))
            .filter(|path| path.file_stem().map_or(false, |s| s == stem.as_str()))
            .collect();
        found.sort();
        found
    }

    /// Directory that receives the CBZ of a chapter.
    pub fn archive_dir(&self, series_name: &str) -> PathBuf {
        match &self.archive_path {
            Some(path) => path.clone(),
            None => self.series_dir(series_name),
        }
    }
}

/// Creates `path` and its parents. An existing directory is fine, also
/// when another worker created it a moment earlier.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Replaces characters that cannot appear in a single path component.
/// Everything else is kept as is so names match the site's catalog.
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(series: &str, number: u32) -> ChapterKey {
        ChapterKey {
            series: series.to_string(),
            number,
        }
    }

    #[test]
    fn chapter_dir_is_zero_padded() {
        let storage = StorageManager::with_base_path("/data");
        assert_eq!(
            storage.chapter_dir(&key("Claymore", 14)),
            PathBuf::from("/data/Claymore/Claymore 014")
        );
    }

    #[test]
    fn wide_chapter_numbers_are_not_truncated() {
        let storage = StorageManager::with_base_path("/data");
        assert_eq!(
            storage.chapter_dir(&key("One Piece", 1052)),
            PathBuf::from("/data/One Piece/One Piece 1052")
        );
    }

    #[test]
    fn paths_are_pure_functions_of_the_coordinates() {
        let storage = StorageManager::with_base_path("/data");
        let mut a = Image::new(key("Claymore", 14), 7);
        a.url = Some("http://a.example/x.png".to_string());
        let mut b = Image::new(key("Claymore", 14), 7);
        b.url = Some("http://b.example/y.jpg".to_string());

        assert_eq!(storage.image_path(&a, false), storage.image_path(&b, false));
        assert_eq!(
            storage.image_path(&a, false),
            PathBuf::from("/data/Claymore/Claymore 014/007")
        );
    }

    #[test]
    fn extension_only_when_known_and_requested() {
        let storage = StorageManager::with_base_path("/data");
        let mut image = Image::new(key("Claymore", 1), 1);
        assert_eq!(
            storage.image_path(&image, true),
            PathBuf::from("/data/Claymore/Claymore 001/001")
        );

        image.extension = Some("png".to_string());
        assert_eq!(
            storage.image_path(&image, true),
            PathBuf::from("/data/Claymore/Claymore 001/001.png")
        );
        assert_eq!(
            storage.image_path(&image, false),
            PathBuf::from("/data/Claymore/Claymore 001/001")
        );
    }

    #[test]
    fn separators_in_names_stay_inside_one_component() {
        let storage = StorageManager::with_base_path("/data");
        assert_eq!(
            storage.series_dir("Fate/Zero"),
            PathBuf::from("/data/Fate_Zero")
        );
    }

    #[test]
    fn archive_dir_defaults_to_series_dir() {
        let storage = StorageManager::with_base_path("/data");
        assert_eq!(storage.archive_dir("Claymore"), PathBuf::from("/data/Claymore"));

        let config = StorageConfig {
            base_path: PathBuf::from("/data"),
            cache_dir: PathBuf::from("/cache"),
            archive_dir: Some(PathBuf::from("/cbz")),
        };
        assert_eq!(
            StorageManager::new(&config).archive_dir("Claymore"),
            PathBuf::from("/cbz")
        );
    }

    #[tokio::test]
    async fn existence_probe_finds_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::with_base_path(dir.path());
        let mut image = Image::new(key("Claymore", 3), 2);
        assert!(!storage.image_exists(&image));

        let chapter_dir = storage.chapter_dir(&image.chapter);
        ensure_dir(&chapter_dir).await.unwrap();
        ensure_dir(&chapter_dir).await.unwrap();
        std::fs::write(chapter_dir.join("002.gif"), b"x").unwrap();
        std::fs::write(chapter_dir.join("002.gif.part"), b"x").unwrap();

        assert!(storage.image_exists(&image));
        assert_eq!(storage.stored_variants(&image).len(), 1);

        image.extension = Some("png".to_string());
        assert!(!storage.image_exists(&image));
    }
}
