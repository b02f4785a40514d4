use crate::config::{Config, SiteConfig};
use crate::error::{LoaderError, Result};
use crate::plugins::{mangafox, mangapark, MangaFoxPlugin, MangaParkPlugin};
use crate::traits::SitePlugin;
use crate::utils::HttpClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of site plugins, keyed by lowercase name.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn SitePlugin>>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Registers the built-in plugins, each with its `[sites.<name>]`
    /// section from the config.
    pub fn new(config: &Config) -> Result<Self> {
        let mut registry = Self::empty();
        let http_client = HttpClient::new(&config.downloader)?;

        let site = site_config(config, mangafox::PLUGIN_NAME, "http://mangafox.me/");
        registry.register(Arc::new(MangaFoxPlugin::new(http_client.clone(), site)));

        let site = site_config(config, mangapark::PLUGIN_NAME, "http://mangapark.me/");
        registry.register(Arc::new(MangaParkPlugin::new(http_client, site)));

        Ok(registry)
    }

    pub fn register(&mut self, plugin: Arc<dyn SitePlugin>) {
        debug!("Registering plugin '{}'", plugin.name());
        self.plugins.insert(plugin.name().to_lowercase(), plugin);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SitePlugin>> {
        self.plugins
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| LoaderError::plugin_not_found(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

fn site_config(config: &Config, name: &str, fallback_url: &str) -> SiteConfig {
    config.get_site_config(name).cloned().unwrap_or_else(|| SiteConfig {
        name: name.to_string(),
        base_url: fallback_url.to_string(),
        user_agent: None,
        headers: None,
        trim_bottom_px: 0,
    })
}
