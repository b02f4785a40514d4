use super::{join_url, selector, text_of, trim_bottom};
use crate::config::SiteConfig;
use crate::error::{LoaderError, Result};
use crate::models::{Chapter, Image, Series};
use crate::traits::SitePlugin;
use crate::utils::HttpClient;
use scraper::Html;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

pub const PLUGIN_NAME: &str = "mangafox";

pub struct MangaFoxPlugin {
    http_client: HttpClient,
    site: SiteConfig,
    /// Page numbers per chapter URL, so each chapter index is fetched once.
    pages: Mutex<HashMap<String, Vec<u32>>>,
}

impl MangaFoxPlugin {
    pub fn new(http_client: HttpClient, site: SiteConfig) -> Self {
        Self {
            http_client,
            site,
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn cached_pages(&self, chapter_url: &str) -> Option<Vec<u32>> {
        self.pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(chapter_url).cloned())
    }

    async fn page_numbers(&self, chapter: &Chapter) -> Result<Vec<u32>> {
        if let Some(pages) = self.cached_pages(&chapter.url) {
            return Ok(pages);
        }

        let html = self.http_client.get(&chapter.url, &self.site).await?;
        let pages = parse_page_numbers(&html)?;
        debug!("[MANGAFOX] {} has {} pages", chapter, pages.len());

        if let Ok(mut cache) = self.pages.lock() {
            cache.insert(chapter.url.clone(), pages.clone());
        }
        Ok(pages)
    }
}

#[async_trait::async_trait]
impl SitePlugin for MangaFoxPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn list_series(&self) -> Result<Vec<Series>> {
        let url = join_url(&self.site.base_url, "manga/")?;
        info!("[MANGAFOX] Loading series list from {}", url);
        let html = self.http_client.get(&url, &self.site).await?;
        parse_series_list(&html)
    }

    async fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        info!("[MANGAFOX] Loading chapters of {} from {}", series.name, series.url);
        let html = self.http_client.get(&series.url, &self.site).await?;
        parse_chapter_list(&series.name, &html)
    }

    async fn resolve_image_url(&self, chapter: &Chapter, image: &mut Image) -> Result<bool> {
        let pages = self.page_numbers(chapter).await?;
        if !pages.contains(&image.index) {
            return Ok(false);
        }

        let page_url = join_url(&chapter.url, &format!("{}.html", image.index))?;
        let html = self.http_client.get(&page_url, &self.site).await?;
        let src = parse_image_src(&html)?;
        image.url = Some(join_url(&page_url, &src)?);
        Ok(true)
    }

    async fn postprocess(&self, path: &Path) -> Result<()> {
        trim_bottom(path, self.site.trim_bottom_px).await
    }
}

pub fn parse_series_list(html: &str) -> Result<Vec<Series>> {
    let document = Html::parse_document(html);
    let link_selector = selector("div.manga_list li a")?;

    let mut list = Vec::new();
    for link in document.select(&link_selector) {
        let name = text_of(&link);
        let classes: Vec<&str> = link.value().classes().collect();
        if name.is_empty() || classes.contains(&"top") {
            continue;
        }
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let mut series = Series::new(name, href);
        series.is_open = Some(classes.contains(&"manga_open"));
        list.push(series);
    }

    info!("[MANGAFOX] series list parsed, items: {}", list.len());
    Ok(list)
}

/// Chapters whose link text does not end in a whole number ("half"
/// chapters such as 12.5) are skipped.
pub fn parse_chapter_list(series_name: &str, html: &str) -> Result<Vec<Chapter>> {
    let document = Html::parse_document(html);
    let item_selector = selector("div#chapters ul.chlist li")?;
    let link_selector = selector("div a.tips")?;
    let title_selector = selector("div span.title.nowrap")?;

    let mut chapters = Vec::new();
    for item in document.select(&item_selector) {
        let Some(link) = item.select(&link_selector).next() else {
            continue;
        };
        let text = text_of(&link);
        let Some(number) = text
            .split_whitespace()
            .last()
            .and_then(|word| word.parse::<u32>().ok())
        else {
            debug!("[MANGAFOX] skipping chapter link '{}'", text);
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let mut chapter = Chapter::new(series_name, number, href);
        chapter.text = text;
        if let Some(title) = item.select(&title_selector).next() {
            chapter.title = text_of(&title);
        }
        chapters.push(chapter);
    }

    Ok(chapters)
}

pub fn parse_page_numbers(html: &str) -> Result<Vec<u32>> {
    let document = Html::parse_document(html);
    let option_selector = selector("div.r.m select.m option")?;

    let mut pages: Vec<u32> = document
        .select(&option_selector)
        .filter_map(|option| option.value().attr("value"))
        .filter_map(|value| value.parse::<u32>().ok())
        .filter(|&page| page > 0)
        .collect();
    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

pub fn parse_image_src(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let image_selector = selector("div#viewer div.read_img img#image")?;

    document
        .select(&image_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
        .ok_or_else(|| LoaderError::scraping("no image on MangaFox page"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIES_LIST: &str = r##"
        <div class="manga_list"><ul>
          <li><a class="top" href="#top">Top</a></li>
          <li><a class="series_preview manga_open" href="http://mangafox.me/manga/claymore/">Claymore</a></li>
          <li><a class="series_preview manga_close" href="http://mangafox.me/manga/berserk/">Berserk</a></li>
          <li><a class="series_preview" href="http://mangafox.me/manga/empty/"></a></li>
        </ul></div>"##;

    const CHAPTER_LIST: &str = r#"
        <div id="chapters"><ul class="chlist">
          <li><div><a class="tips" href="http://mangafox.me/manga/claymore/c155/1.html">Claymore 155</a>
              <span class="title nowrap">Silver-eyed Witch</span></div></li>
          <li><div><a class="tips" href="http://mangafox.me/manga/claymore/c154.5/1.html">Claymore 154.5</a></div></li>
          <li><div><a class="tips" href="http://mangafox.me/manga/claymore/c014/1.html">Claymore 14</a></div></li>
        </ul></div>"#;

    const CHAPTER_PAGE: &str = r#"
        <div class="r m"><select class="m">
          <option value="1">1</option><option value="2">2</option>
          <option value="3">3</option><option value="0">Comments</option>
        </select></div>
        <div id="viewer"><div class="read_img"><img id="image" src="http://z.mfcdn.net/store/c014/001.jpg"/></div></div>"#;

    #[test]
    fn series_list_skips_top_link_and_empty_names() {
        let list = parse_series_list(SERIES_LIST).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Claymore");
        assert_eq!(list[0].is_open, Some(true));
        assert_eq!(list[1].is_open, Some(false));
    }

    #[test]
    fn chapter_list_ignores_half_chapters() {
        let chapters = parse_chapter_list("Claymore", CHAPTER_LIST).unwrap();
        let numbers: Vec<u32> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![155, 14]);
        assert_eq!(chapters[0].title, "Silver-eyed Witch");
        assert_eq!(chapters[0].text, "Claymore 155");
        assert_eq!(chapters[1].series, "Claymore");
    }

    #[test]
    fn page_numbers_drop_comment_option() {
        assert_eq!(parse_page_numbers(CHAPTER_PAGE).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn image_src_is_found() {
        assert_eq!(
            parse_image_src(CHAPTER_PAGE).unwrap(),
            "http://z.mfcdn.net/store/c014/001.jpg"
        );
        assert!(parse_image_src("<html></html>").is_err());
    }
}
