use serde::{Deserialize, Serialize};
use std::fmt;

/// A named series as listed in a site's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub url: String,
    pub is_open: Option<bool>,
    pub cover_url: Option<String>,
    /// Discovery order, not numeric order.
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// Identifies a chapter without holding on to its series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChapterKey {
    pub series: String,
    pub number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// Name of the owning series. Used for path derivation only.
    pub series: String,
    pub number: u32,
    pub url: String,
    pub title: String,
    /// Raw link text as found on the site.
    pub text: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub chapter: ChapterKey,
    /// 1-based position inside the chapter.
    pub index: u32,
    /// Filled in by the plugin during resolution.
    pub url: Option<String>,
    /// Known only after a successful fetch, without the leading dot.
    pub extension: Option<String>,
}

/// Per-chapter progress through the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterState {
    Pending,
    Resolving,
    Downloading,
    Done,
    /// Resolution found no image at index 1.
    Empty,
}

impl Series {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            is_open: None,
            cover_url: None,
            chapters: Vec::new(),
        }
    }

    pub fn add_chapter(&mut self, mut chapter: Chapter) {
        chapter.series = self.name.clone();
        self.chapters.push(chapter);
    }

    pub fn get_chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn get_chapter_mut(&mut self, number: u32) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.number == number)
    }
}

impl Chapter {
    pub fn new(series: impl Into<String>, number: u32, url: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            number,
            url: url.into(),
            title: String::new(),
            text: String::new(),
            images: Vec::new(),
        }
    }

    pub fn key(&self) -> ChapterKey {
        ChapterKey {
            series: self.series.clone(),
            number: self.number,
        }
    }

    /// Placeholder for the image at `index`, to be resolved by a plugin.
    pub fn image_at(&self, index: u32) -> Image {
        Image::new(self.key(), index)
    }

    pub fn add_image(&mut self, mut image: Image) {
        image.chapter = self.key();
        self.images.push(image);
    }
}

impl Image {
    pub fn new(chapter: ChapterKey, index: u32) -> Self {
        Self {
            chapter,
            index,
            url: None,
            extension: None,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.series, self.number)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} - {}", self.chapter.series, self.chapter.number, self.index)
    }
}
