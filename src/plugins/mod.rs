pub mod mangafox;
pub mod mangapark;

use crate::error::{LoaderError, Result};
use scraper::{ElementRef, Selector};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use mangafox::MangaFoxPlugin;
pub use mangapark::MangaParkPlugin;

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LoaderError::scraping(format!("bad selector '{}': {:?}", css, e)))
}

pub(crate) fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub(crate) fn join_url(base: &str, href: &str) -> Result<String> {
    Ok(url::Url::parse(base)?.join(href)?.to_string())
}

/// Cuts `pixels` rows off the bottom of the image at `path`, in place.
pub async fn trim_bottom(path: &Path, pixels: u32) -> Result<()> {
    if pixels == 0 {
        return Ok(());
    }

    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let img = image::open(&path)?;
        let (width, height) = (img.width(), img.height());
        if height <= pixels {
            debug!("{:?} is only {} px high, not trimming", path, height);
            return Ok(());
        }
        debug!("Cropping {} px of ads from {:?}", pixels, path);
        img.crop_imm(0, 0, width, height - pixels).save(&path)?;
        Ok(())
    })
    .await
    .map_err(|e| LoaderError::Io(std::io::Error::other(e)))?
}
