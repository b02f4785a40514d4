use crate::config::DownloaderConfig;
use crate::error::{LoaderError, Result};
use crate::storage::{append_extension, ensure_dir};
use crate::utils::HttpClient;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const DEFAULT_EXTENSION: &str = "jpeg";
const PARTIAL_SUFFIX: &str = "part";

/// Outcome of one image fetch. Failures are reported here rather than
/// returned as errors so callers can keep going.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub ok: bool,
    pub final_path: Option<PathBuf>,
    pub extension: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionGuess {
    pub extension: String,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ImageDownloader {
    http_client: HttpClient,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ImageDownloader {
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Downloads `url` to `destination` plus the extension derived from the
    /// response. Transport failures are retried up to `max_attempts` times
    /// in total; an HTTP error status is not retried.
    pub async fn fetch(&self, url: &str, destination: &Path, max_attempts: u32) -> FetchResult {
        let max_attempts = max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.try_fetch(url, destination).await {
                Ok((final_path, guess)) => {
                    return FetchResult {
                        ok: true,
                        final_path: Some(final_path),
                        extension: Some(guess.extension),
                        attempts,
                        error: None,
                        warnings: guess.warnings,
                    };
                }
                Err(e) if e.is_transient() => {
                    warn!("failed to load {} (try {}): {}", url, attempts, e);
                    if attempts >= max_attempts {
                        return FetchResult::failed(attempts, e);
                    }
                    if let Some(delay) = backoff.next_backoff() {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(e) => {
                    warn!("failed to load {}: {}", url, e);
                    return FetchResult::failed(attempts, e);
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str, destination: &Path) -> Result<(PathBuf, ExtensionGuess)> {
        let response = self.http_client.get_raw(url).await?;

        if response.status() != StatusCode::OK {
            return Err(LoaderError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let guess = guess_extension(content_type.as_deref(), url);
        for warning in &guess.warnings {
            warn!("{} ({})", warning, url);
        }

        let final_path = append_extension(destination, &guess.extension);
        if let Some(parent) = final_path.parent() {
            ensure_dir(parent).await?;
        }

        let part_path = append_extension(&final_path, PARTIAL_SUFFIX);
        if let Err(e) = write_body(response, &part_path).await {
            if let Err(remove_err) = tokio::fs::remove_file(&part_path).await {
                debug!("No partial file to clean up at {:?}: {}", part_path, remove_err);
            }
            return Err(e);
        }
        tokio::fs::rename(&part_path, &final_path).await?;

        remove_stale_variants(destination, &final_path).await?;

        debug!("stored {} as {:?}", url, final_path);
        Ok((final_path, guess))
    }
}

impl FetchResult {
    fn failed(attempts: u32, error: LoaderError) -> Self {
        Self {
            ok: false,
            attempts,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

async fn write_body(mut response: Response, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Removes files from an earlier run that share the image's stem but carry
/// a different extension, e.g. `003.png` after `003.jpeg` was written.
async fn remove_stale_variants(destination: &Path, keep: &Path) -> Result<()> {
    let (Some(dir), Some(stem)) = (destination.parent(), destination.file_name()) else {
        return Ok(());
    };

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == keep || !entry.file_type().await?.is_file() {
            continue;
        }
        if path.file_stem() == Some(stem) {
            debug!("removing stale file {:?}", path);
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// Canonical extension for a declared content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let ext = match mime.as_str() {
        "image/jpeg" | "image/pjpeg" => "jpeg",
        "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/avif" => "avif",
        "image/tiff" => "tiff",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => return None,
    };
    Some(ext)
}

/// Extension of the last path segment of `url`, lower case.
pub fn url_extension(url: &str) -> Option<String> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

fn same_format(a: &str, b: &str) -> bool {
    fn canonical(ext: &str) -> &str {
        match ext {
            "jpg" | "jpe" | "jpeg" => "jpeg",
            "tif" | "tiff" => "tiff",
            other => other,
        }
    }
    canonical(a) == canonical(b)
}

/// Picks the file extension for a response. The content type wins; a URL
/// that suggests another format only produces a warning.
pub fn guess_extension(content_type: Option<&str>, url: &str) -> ExtensionGuess {
    let from_header = content_type.and_then(extension_for_content_type);
    let from_url = url_extension(url);
    let mut warnings = Vec::new();

    let extension = match from_header {
        Some(ext) => {
            if let Some(url_ext) = &from_url {
                if !same_format(ext, url_ext) {
                    warnings.push(format!("File extension unclear: {} <-> {}", ext, url_ext));
                }
            }
            ext.to_string()
        }
        None => {
            warnings.push(format!(
                "Could not guess file extension from {:?}, using {}",
                content_type.unwrap_or(""),
                DEFAULT_EXTENSION
            ));
            DEFAULT_EXTENSION.to_string()
        }
    };

    ExtensionGuess { extension, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_wins_over_url() {
        let guess = guess_extension(Some("image/jpeg"), "http://cdn.example/p/001.png");
        assert_eq!(guess.extension, "jpeg");
        assert_eq!(guess.warnings.len(), 1);
        assert!(guess.warnings[0].contains("png"));
    }

    #[test]
    fn matching_signals_do_not_warn() {
        let guess = guess_extension(Some("image/png; charset=binary"), "http://x/001.PNG?token=1");
        assert_eq!(guess.extension, "png");
        assert!(guess.warnings.is_empty());

        let guess = guess_extension(Some("image/jpeg"), "http://x/001.jpg");
        assert_eq!(guess.extension, "jpeg");
        assert!(guess.warnings.is_empty());
    }

    #[test]
    fn unknown_content_type_defaults_to_jpeg() {
        let guess = guess_extension(Some("application/octet-stream"), "http://x/001.webp");
        assert_eq!(guess.extension, DEFAULT_EXTENSION);
        assert_eq!(guess.warnings.len(), 1);

        let guess = guess_extension(None, "http://x/page");
        assert_eq!(guess.extension, DEFAULT_EXTENSION);
    }

    #[test]
    fn url_without_extension_is_not_a_mismatch() {
        let guess = guess_extension(Some("image/webp"), "http://x/image?id=3");
        assert_eq!(guess.extension, "webp");
        assert!(guess.warnings.is_empty());
    }

    #[test]
    fn url_extension_ignores_query_and_host() {
        assert_eq!(url_extension("http://a.b.example/x/y/003.GIF?v=2#top"), Some("gif".to_string()));
        assert_eq!(url_extension("http://example.com/"), None);
        assert_eq!(url_extension("relative/004.png?x"), Some("png".to_string()));
    }
}
