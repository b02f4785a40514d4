use crate::config::{DownloaderConfig, SiteConfig};
use crate::error::{LoaderError, Result};
use reqwest::{Client, Response};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Fetches a page as text, applying the site's user agent and headers.
    pub async fn get(&self, url: &str, site: &SiteConfig) -> Result<String> {
        let mut request = self.client.get(url);

        if let Some(user_agent) = &site.user_agent {
            request = request.header("User-Agent", user_agent);
        }

        if let Some(headers) = &site.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(LoaderError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        Ok(text)
    }

    /// Starts a GET whose body is consumed by the caller. The status is not
    /// checked here.
    pub async fn get_raw(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        Ok(response)
    }
}
