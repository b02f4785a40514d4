use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ZIP compression error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    #[error("Chapter {number} not found for series {series}")]
    ChapterNotFound { series: String, number: u32 },

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Invalid chapter range: {0}")]
    InvalidChapterRange(String),
}

impl LoaderError {
    pub fn scraping(msg: impl Into<String>) -> Self {
        Self::Scraping(msg.into())
    }

    pub fn series_not_found(name: impl Into<String>) -> Self {
        Self::SeriesNotFound(name.into())
    }

    pub fn chapter_not_found(series: impl Into<String>, number: u32) -> Self {
        Self::ChapterNotFound {
            series: series.into(),
            number,
        }
    }

    pub fn plugin_not_found(name: impl Into<String>) -> Self {
        Self::PluginNotFound(name.into())
    }

    /// Transport-level failures (timeouts, refused connections, broken
    /// bodies). HTTP error statuses are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
