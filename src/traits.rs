use crate::models::{Chapter, Image, Series};
use crate::error::Result;
use std::path::Path;

/// Site-specific capability that turns a site's pages into
/// series, chapters and image locations.
#[async_trait::async_trait]
pub trait SitePlugin: Send + Sync {
    /// Stable name, also used to key the catalog cache file.
    fn name(&self) -> &str;

    /// Full catalog of the site.
    async fn list_series(&self) -> Result<Vec<Series>>;

    /// Chapters of `series`, in site order.
    async fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>>;

    /// Fills in `image.url`. `Ok(false)` means there is no image at this
    /// index, which ends the chapter. It is not an error.
    async fn resolve_image_url(&self, chapter: &Chapter, image: &mut Image) -> Result<bool>;

    /// Runs after a page was written to `path`.
    async fn postprocess(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
