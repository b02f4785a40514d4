use super::{join_url, selector, text_of};
use crate::config::SiteConfig;
use crate::error::{LoaderError, Result};
use crate::models::{Chapter, Image, Series};
use crate::traits::SitePlugin;
use crate::utils::HttpClient;
use regex::Regex;
use scraper::Html;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub const PLUGIN_NAME: &str = "mangapark";

type PageLinks = BTreeMap<u32, String>;

pub struct MangaParkPlugin {
    http_client: HttpClient,
    site: SiteConfig,
    /// Page number to page URL, per chapter URL.
    pages: Mutex<HashMap<String, PageLinks>>,
}

impl MangaParkPlugin {
    pub fn new(http_client: HttpClient, site: SiteConfig) -> Self {
        Self {
            http_client,
            site,
            pages: Mutex::new(HashMap::new()),
        }
    }

    async fn page_links(&self, chapter: &Chapter) -> Result<PageLinks> {
        let cached = self
            .pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(&chapter.url).cloned());
        if let Some(links) = cached {
            return Ok(links);
        }

        let html = self.http_client.get(&chapter.url, &self.site).await?;
        let links = parse_page_links(&self.site.base_url, &html)?;
        debug!("[MANGAPARK] {} has {} pages", chapter, links.len());

        if let Ok(mut cache) = self.pages.lock() {
            cache.insert(chapter.url.clone(), links.clone());
        }
        Ok(links)
    }
}

#[async_trait::async_trait]
impl SitePlugin for MangaParkPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn list_series(&self) -> Result<Vec<Series>> {
        let url = join_url(&self.site.base_url, "genre/")?;
        info!("[MANGAPARK] Loading series list from {}", url);
        let html = self.http_client.get(&url, &self.site).await?;
        parse_series_list(&self.site.base_url, &html)
    }

    async fn list_chapters(&self, series: &Series) -> Result<Vec<Chapter>> {
        info!("[MANGAPARK] Loading chapters of {} from {}", series.name, series.url);
        let html = self.http_client.get(&series.url, &self.site).await?;
        parse_chapter_list(&self.site.base_url, &series.name, &html)
    }

    async fn resolve_image_url(&self, chapter: &Chapter, image: &mut Image) -> Result<bool> {
        let links = self.page_links(chapter).await?;
        let Some(page_url) = links.get(&image.index) else {
            return Ok(false);
        };

        let html = self.http_client.get(page_url, &self.site).await?;
        let src = parse_image_src(&html)?;
        image.url = Some(join_url(page_url, &src)?);
        Ok(true)
    }
}

pub fn parse_series_list(base_url: &str, html: &str) -> Result<Vec<Series>> {
    let document = Html::parse_document(html);
    let cover_selector = selector("div.item a.cover")?;
    let img_selector = selector("img")?;

    let mut list = Vec::new();
    for link in document.select(&cover_selector) {
        let (Some(title), Some(href)) = (link.value().attr("title"), link.value().attr("href")) else {
            continue;
        };
        let mut series = Series::new(title.trim(), join_url(base_url, href)?);
        series.cover_url = link
            .select(&img_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        list.push(series);
    }

    info!("[MANGAPARK] series list parsed, items: {}", list.len());
    Ok(list)
}

/// Link text looks like `Vol.3 ch.14`; the span text carries the title
/// after a colon.
pub fn parse_chapter_list(base_url: &str, series_name: &str, html: &str) -> Result<Vec<Chapter>> {
    let document = Html::parse_document(html);
    let span_selector = selector("div#list span")?;
    let link_selector = selector("a")?;
    let number_regex = Regex::new(r"ch\.(\d+)")
        .map_err(|e| LoaderError::scraping(format!("bad chapter pattern: {}", e)))?;

    let mut chapters = Vec::new();
    for span in document.select(&span_selector) {
        let Some(link) = span.select(&link_selector).next() else {
            continue;
        };
        let link_text = text_of(&link);
        let number = number_regex
            .captures(&link_text)
            .and_then(|captures| captures[1].parse::<u32>().ok());
        let Some(number) = number else {
            warn!("[MANGAPARK] could not read chapter number from '{}'", link_text);
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let span_text = span.text().collect::<String>();
        let mut chapter = Chapter::new(series_name, number, join_url(base_url, href)?);
        chapter.text = link_text;
        if let Some(pos) = span_text.find(':') {
            chapter.title = span_text[pos + 1..].trim().to_string();
        }
        chapters.push(chapter);
    }

    Ok(chapters)
}

pub fn parse_page_links(base_url: &str, html: &str) -> Result<PageLinks> {
    let document = Html::parse_document(html);
    let block_selector = selector("div.board div.info div")?;
    let label_selector = selector("p span")?;
    let link_selector = selector("p a")?;

    let mut links = PageLinks::new();
    for block in document.select(&block_selector) {
        let is_pages = block
            .select(&label_selector)
            .next()
            .map_or(false, |label| text_of(&label).contains("Pages:"));
        if !is_pages {
            continue;
        }
        for link in block.select(&link_selector) {
            let (Ok(number), Some(href)) = (text_of(&link).parse::<u32>(), link.value().attr("href")) else {
                continue;
            };
            links.insert(number, join_url(base_url, href)?);
        }
        break;
    }

    Ok(links)
}

pub fn parse_image_src(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let image_selector = selector("a.img-link img")?;

    document
        .select(&image_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
        .ok_or_else(|| LoaderError::scraping("no image on MangaPark page"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://mangapark.me/";

    #[test]
    fn series_list_reads_cover_links() {
        let html = r#"
            <div class="item"><a class="cover" title="Claymore" href="/manga/claymore">
              <img src="http://cdn.mangapark.me/claymore.jpg"/></a></div>
            <div class="item"><a class="cover" href="/manga/untitled"></a></div>"#;
        let list = parse_series_list(BASE, html).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].url, "http://mangapark.me/manga/claymore");
        assert_eq!(list[0].cover_url.as_deref(), Some("http://cdn.mangapark.me/claymore.jpg"));
    }

    #[test]
    fn chapter_list_reads_number_and_title() {
        let html = r#"
            <div id="list">
              <span><a href="/manga/claymore/v3/c14">Vol.3 ch.14</a>: The Witch's Maw</span>
              <span><a href="/manga/claymore/extra">Extra</a>: Omake</span>
              <span>no link</span>
            </div>"#;
        let chapters = parse_chapter_list(BASE, "Claymore", html).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, 14);
        assert_eq!(chapters[0].title, "The Witch's Maw");
        assert_eq!(chapters[0].url, "http://mangapark.me/manga/claymore/v3/c14");
    }

    #[test]
    fn page_links_come_from_pages_block() {
        let html = r#"
            <div class="board"><div class="info">
              <div><p><span>Rating:</span><a href="/x">5</a></p></div>
              <div><p><span>Pages:</span>
                <a href="/manga/claymore/v3/c14/1">1</a>
                <a href="/manga/claymore/v3/c14/2">2</a></p></div>
            </div></div>"#;
        let links = parse_page_links(BASE, html).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[&2], "http://mangapark.me/manga/claymore/v3/c14/2");
    }

    #[test]
    fn image_src_is_found() {
        let html = r##"<a class="img-link" href="#"><img src="http://i.mangapark.me/1.png"/></a>"##;
        assert_eq!(parse_image_src(html).unwrap(), "http://i.mangapark.me/1.png");
    }
}
