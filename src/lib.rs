//! Downloads manga chapters from paginated web sources into a stable
//! on-disk layout and optionally packs each chapter into a CBZ archive.

pub mod archive;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod models;
pub mod observer;
pub mod plugins;
pub mod registry;
pub mod storage;
pub mod traits;
pub mod utils;

pub use config::Config;
pub use error::{LoaderError, Result};
pub use loader::{ChapterReport, Loader, LoaderOptions, RunSummary};
pub use models::{Chapter, ChapterKey, ChapterState, Image, Series};
pub use registry::PluginRegistry;
pub use traits::SitePlugin;
