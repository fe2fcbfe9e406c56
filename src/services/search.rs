//! Icon search against the iconfont.cn API
//!
//! [`IconProvider`] is the upstream seam; [`IconfontClient`] talks to the real
//! API. [`IconSearcher`] validates, memoises and registers each search so the
//! web page can paginate it later.

use crate::cache::CacheManager;
use crate::error::{IconMcpError, Result};
use crate::i18n::Translator;
use crate::types::{IconData, SearchId, SearchRecord, SearchResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Largest page the upstream API accepts
pub const MAX_PAGE_SIZE: i64 = 100;

/// Parameters of one upstream search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    /// `recommend` or `updated_at`
    pub sort_type: String,
    pub page: i64,
    pub page_size: i64,
    pub s_type: String,
    pub from_collection: i64,
    pub fills: String,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            sort_type: "recommend".to_string(),
            page: 1,
            page_size: MAX_PAGE_SIZE,
            s_type: String::new(),
            from_collection: -1,
            fills: String::new(),
        }
    }

    /// Reject bad arguments before any network or cache work
    pub fn validate(&self, translator: &Translator) -> Result<()> {
        if self.q.trim().is_empty() {
            return Err(IconMcpError::Validation(translator.t("search.emptyQuery")));
        }
        if self.page < 1 || u32::try_from(self.page).is_err() {
            return Err(IconMcpError::Validation(translator.t("search.invalidPage")));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(IconMcpError::Validation(translator.t("search.invalidPageSize")));
        }
        Ok(())
    }

    /// Key of the memoised result in the icon namespace
    pub fn cache_key(&self) -> String {
        format!(
            "search_{}_{}_{}_{}_{}_{}_{}",
            self.q, self.sort_type, self.page, self.page_size, self.s_type, self.from_collection, self.fills
        )
    }
}

/// One page of upstream results
#[derive(Debug, Clone, Default)]
pub struct UpstreamPage {
    pub icons: Vec<IconData>,
    pub total_count: u64,
}

/// Source of icon search results
#[async_trait]
pub trait IconProvider: Send + Sync {
    /// Run one search. Non-success answers are `Upstream`, deadlines `Timeout`.
    async fn search(&self, query: &SearchQuery) -> Result<UpstreamPage>;

    /// Release pooled connections
    async fn close(&self) {}
}

#[derive(Debug, Deserialize)]
struct IconfontResponse {
    code: Option<i64>,
    #[serde(default)]
    data: Option<IconfontData>,
}

#[derive(Debug, Default, Deserialize)]
struct IconfontData {
    #[serde(default)]
    icons: Vec<IconData>,
    #[serde(default)]
    count: u64,
}

/// HTTP client for iconfont.cn's search endpoint
pub struct IconfontClient {
    api_base: String,
    timeout: Duration,
    translator: Translator,
    client: Mutex<Option<reqwest::Client>>,
}

impl IconfontClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration, translator: Translator) -> Self {
        Self {
            api_base: api_base.into(),
            timeout,
            translator,
            client: Mutex::new(None),
        }
    }

    /// Shared client, built on first use and after `close`
    async fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.iconfont.cn/"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.iconfont.cn"));

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    fn classify(&self, err: reqwest::Error) -> IconMcpError {
        if err.is_timeout() {
            IconMcpError::Timeout(self.translator.t("error.timeout"))
        } else {
            IconMcpError::Upstream(format!("{}: {}", self.translator.t("search.searchFailed"), err))
        }
    }
}

#[async_trait]
impl IconProvider for IconfontClient {
    async fn search(&self, query: &SearchQuery) -> Result<UpstreamPage> {
        let client = self.client().await?;

        let form: Vec<(&str, String)> = vec![
            ("q", query.q.clone()),
            ("sortType", query.sort_type.clone()),
            ("page", query.page.to_string()),
            ("pageSize", query.page_size.to_string()),
            ("sType", query.s_type.clone()),
            ("fromCollection", query.from_collection.to_string()),
            ("fills", query.fills.clone()),
            ("t", Utc::now().timestamp_millis().to_string()),
            ("ctoken", "null".to_string()),
        ];

        debug!("Querying {} for '{}'", self.api_base, query.q);
        let response = client
            .post(&self.api_base)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(IconMcpError::Upstream(format!(
                "{}: HTTP status {}",
                self.translator.t("search.searchFailed"),
                response.status()
            )));
        }

        let body: IconfontResponse = response.json().await.map_err(|e| self.classify(e))?;

        if body.code != Some(200) {
            return Err(IconMcpError::Upstream(format!(
                "{}: API returned code {}",
                self.translator.t("search.searchFailed"),
                body.code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
            )));
        }

        let data = body.data.unwrap_or_default();
        Ok(UpstreamPage {
            icons: data.icons,
            total_count: data.count,
        })
    }

    async fn close(&self) {
        if self.client.lock().await.take().is_some() {
            debug!("Upstream HTTP client released");
        }
    }
}

/// Validates, memoises and registers searches
pub struct IconSearcher {
    provider: Arc<dyn IconProvider>,
    cache: Arc<CacheManager>,
    translator: Translator,
}

impl IconSearcher {
    pub fn new(provider: Arc<dyn IconProvider>, cache: Arc<CacheManager>, translator: Translator) -> Self {
        Self {
            provider,
            cache,
            translator,
        }
    }

    /// Search icons.
    ///
    /// Every call mints a new search ID, even when the upstream page is served
    /// from the icon cache.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResult> {
        query.validate(&self.translator)?;

        let key = query.cache_key();
        let page = match self.cache.get_icon(&key).await {
            Some(hit) => {
                debug!("Icon cache hit for {}", key);
                UpstreamPage {
                    icons: hit.items,
                    total_count: hit.total_count,
                }
            }
            None => self.provider.search(&query).await?,
        };

        let search_id = SearchId::generate();
        // validate() bounds both values to u32
        let page_number = query.page as u32;
        let page_size = query.page_size as u32;

        let result = SearchResult {
            search_id: search_id.clone(),
            query: query.q.clone(),
            count: page.icons.len(),
            total_count: page.total_count,
            page: page_number,
            page_size,
            items: page.icons,
            web_url: None,
            instructions: ["search.browseAndSelect", "search.clickSelect", "search.sendToClient", "search.autoReturn"]
                .iter()
                .enumerate()
                .map(|(i, key)| format!("{}. {}", i + 1, self.translator.t(key)))
                .collect(),
            waiting_message: None,
        };

        self.cache.set_icon(key, result.clone()).await;
        self.cache
            .set_search(
                search_id.as_str(),
                SearchRecord {
                    query: query.q,
                    page: page_number,
                    page_size,
                    icons: result.items.clone(),
                    total_count: result.total_count,
                    created_at: Utc::now(),
                },
            )
            .await;

        info!(
            "{}",
            self.translator
                .translate("search.foundIcons", &[("count", &result.count)])
        );
        Ok(result)
    }

    /// Release the upstream client
    pub async fn close(&self) {
        self.provider.close().await;
    }
}
