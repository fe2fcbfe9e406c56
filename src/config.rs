//! Server configuration
//!
//! Values come from built-in defaults overlaid with environment variables
//! (unprefixed, e.g. `WEB_SERVER_PORT`). CLI flags are applied on top by the
//! binary.

use crate::error::Result;
use crate::i18n::Locale;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Upstream search endpoint used when `ICONFONT_API_BASE` is not set
pub const DEFAULT_ICONFONT_API_BASE: &str = "https://www.iconfont.cn/api/icon/search.json";

/// Runtime configuration for the icon server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// UI / message language (`en`, `zh-CN`, or any locale string)
    pub language: String,

    /// First port probed by the web server
    pub web_server_port: u16,

    /// Open the browser when the web server starts
    pub web_server_auto_open: bool,

    /// Start the web server together with the MCP server
    pub auto_start_web_server: bool,

    /// Cache TTL in milliseconds
    pub icon_cache_expiry: u64,

    /// Upstream request timeout in seconds
    pub icon_search_timeout: u64,

    /// Upstream search endpoint
    pub iconfont_api_base: String,

    /// Delay between a browser disconnect and marking the selection failed
    pub selection_grace_period_ms: u64,

    /// Re-read interval used while waiting for a selection
    pub selection_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            web_server_port: 3000,
            web_server_auto_open: false,
            auto_start_web_server: false,
            icon_cache_expiry: 1_800_000,
            icon_search_timeout: 30,
            iconfont_api_base: DEFAULT_ICONFONT_API_BASE.to_string(),
            selection_grace_period_ms: 2_000,
            selection_poll_interval_ms: 100,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment. Keys use the environment spelling.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Some(map))
    }

    fn load(source: Option<config::Map<String, String>>) -> Result<Self> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("language", defaults.language)?
            .set_default("web_server_port", i64::from(defaults.web_server_port))?
            .set_default("web_server_auto_open", defaults.web_server_auto_open)?
            .set_default("auto_start_web_server", defaults.auto_start_web_server)?
            .set_default("icon_cache_expiry", defaults.icon_cache_expiry as i64)?
            .set_default("icon_search_timeout", defaults.icon_search_timeout as i64)?
            .set_default("iconfont_api_base", defaults.iconfont_api_base)?
            .set_default(
                "selection_grace_period_ms",
                defaults.selection_grace_period_ms as i64,
            )?
            .set_default(
                "selection_poll_interval_ms",
                defaults.selection_poll_interval_ms as i64,
            )?
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .source(source),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Configured locale
    pub fn locale(&self) -> Locale {
        Locale::parse(&self.language)
    }

    /// Cache entry time-to-live
    pub fn cache_expiry(&self) -> Duration {
        Duration::from_millis(self.icon_cache_expiry)
    }

    /// Upstream request timeout
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.icon_search_timeout)
    }

    /// Disconnect grace period
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.selection_grace_period_ms)
    }

    /// Selection re-read interval (never zero)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.selection_poll_interval_ms.max(1))
    }
}
