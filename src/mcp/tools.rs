//! MCP tool catalogue and dispatch
//!
//! Seven tools cover the whole handoff:
//! - search: `search_icons`
//! - session: `start_web_server`, `stop_web_server`, `check_selection_status`
//! - maintenance: `get_cache_stats`, `clear_cache`, `save_icons`

use crate::cache::CacheManager;
use crate::error::{IconMcpError, Result};
use crate::i18n::Translator;
use crate::selection::SelectionWaiter;
use crate::services::{IconSaver, IconSearcher, SearchQuery, DEFAULT_SAVE_PATH, MAX_PAGE_SIZE};
use crate::web::WebServer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default `maxWaitTime` of `check_selection_status`, in milliseconds
pub const DEFAULT_MAX_WAIT_MS: u64 = 180_000;

/// Tool schema as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,

    pub description: String,

    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Routes tool calls to the search, selection, cache, saver and web components
pub struct ToolHandler {
    cache: Arc<CacheManager>,
    searcher: Arc<IconSearcher>,
    waiter: Arc<SelectionWaiter>,
    saver: Arc<IconSaver>,
    web: Arc<WebServer>,
    translator: Translator,
}

impl ToolHandler {
    pub fn new(
        cache: Arc<CacheManager>,
        searcher: Arc<IconSearcher>,
        waiter: Arc<SelectionWaiter>,
        saver: Arc<IconSaver>,
        web: Arc<WebServer>,
        translator: Translator,
    ) -> Self {
        Self {
            cache,
            searcher,
            waiter,
            saver,
            web,
            translator,
        }
    }

    /// Get list of all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        let t = &self.translator;
        vec![
            Tool {
                name: "search_icons".to_string(),
                description: t.t("search.searchDescription"),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "q": {
                            "type": "string",
                            "description": "Search keyword"
                        },
                        "sortType": {
                            "type": "string",
                            "enum": ["recommend", "updated_at"],
                            "default": "recommend"
                        },
                        "page": {
                            "type": "integer",
                            "minimum": 1,
                            "default": 1
                        },
                        "pageSize": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PAGE_SIZE,
                            "default": MAX_PAGE_SIZE
                        }
                    },
                    "required": ["q"]
                }),
            },
            Tool {
                name: "start_web_server".to_string(),
                description: t.t("web.startServer"),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "port": {
                            "type": "integer",
                            "description": "Preferred port; the next free one is used if taken"
                        },
                        "autoOpen": {
                            "type": "boolean",
                            "default": true
                        }
                    }
                }),
            },
            Tool {
                name: "stop_web_server".to_string(),
                description: t.t("web.stopServer"),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Tool {
                name: "check_selection_status".to_string(),
                description: t.t("web.checkSelection"),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "searchId": {
                            "type": "string",
                            "description": "ID returned by search_icons"
                        },
                        "maxWaitTime": {
                            "type": "integer",
                            "description": "Maximum time to wait, in milliseconds",
                            "default": DEFAULT_MAX_WAIT_MS
                        }
                    },
                    "required": ["searchId"]
                }),
            },
            Tool {
                name: "get_cache_stats".to_string(),
                description: t.t("cache.statsDescription"),
                input_schema: json!({"type": "object", "properties": {}}),
            },
            Tool {
                name: "clear_cache".to_string(),
                description: t.t("cache.clearDescription"),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "expiredOnly": {
                            "type": "boolean",
                            "default": false
                        }
                    }
                }),
            },
            Tool {
                name: "save_icons".to_string(),
                description: t.t("download.saveDescription"),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "icons": {
                            "type": "array",
                            "items": {"type": "object"},
                            "description": "Icons with `name` and `svg` or `show_svg`"
                        },
                        "savePath": {
                            "type": "string",
                            "default": DEFAULT_SAVE_PATH
                        }
                    },
                    "required": ["icons"]
                }),
            },
        ]
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_name: &str, params: Value) -> Result<Value> {
        debug!("Executing tool: {}", tool_name);

        match tool_name {
            "search_icons" => self.search_icons(params).await,
            "start_web_server" => self.start_web_server(params).await,
            "stop_web_server" => self.stop_web_server().await,
            "check_selection_status" => self.check_selection_status(params).await,
            "get_cache_stats" => self.get_cache_stats().await,
            "clear_cache" => self.clear_cache(params).await,
            "save_icons" => self.save_icons(params).await,
            _ => {
                warn!("Unknown tool: {}", tool_name);
                Err(IconMcpError::Validation(
                    self.translator
                        .translate("error.methodNotFound", &[("method", &tool_name)]),
                ))
            }
        }
    }

    /// Stop the web server and release the upstream client, in that order
    pub async fn shutdown(&self) {
        self.web.stop().await;
        self.searcher.close().await;
    }

    async fn search_icons(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SearchParams {
            q: String,
            sort_type: Option<String>,
            page: Option<i64>,
            page_size: Option<i64>,
        }

        let params: SearchParams = parse_args(params)?;

        let mut query = SearchQuery::new(params.q);
        if let Some(sort_type) = params.sort_type {
            query.sort_type = sort_type;
        }
        query.page = params.page.unwrap_or(1);
        query.page_size = params.page_size.unwrap_or(MAX_PAGE_SIZE);

        let mut result = self.searcher.search(query).await?;

        if !self.web.is_running().await {
            if let Err(e) = self.web.start(None, Some(false)).await {
                warn!("Could not start web server for search results: {}", e);
            }
        }

        if let Some(url) = self.web.url().await {
            result.web_url = Some(format!("{}/?searchId={}", url, result.search_id));
            result.waiting_message = Some(self.translator.t("search.pleaseWaitForSelection"));
        }

        Ok(serde_json::to_value(result)?)
    }

    async fn start_web_server(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct StartParams {
            port: Option<u16>,
            auto_open: Option<bool>,
        }

        let params: StartParams = parse_args(params)?;
        let report = self
            .web
            .start(params.port, Some(params.auto_open.unwrap_or(true)))
            .await?;
        Ok(serde_json::to_value(report)?)
    }

    async fn stop_web_server(&self) -> Result<Value> {
        let message = self.web.stop().await;
        Ok(json!({ "message": message }))
    }

    async fn check_selection_status(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CheckParams {
            search_id: String,
            max_wait_time: Option<u64>,
        }

        let params: CheckParams = parse_args(params)?;
        let max_wait = Duration::from_millis(params.max_wait_time.unwrap_or(DEFAULT_MAX_WAIT_MS));

        let outcome = self
            .waiter
            .await_selection(&params.search_id, max_wait)
            .await?;
        Ok(serde_json::to_value(self.waiter.report(outcome))?)
    }

    async fn get_cache_stats(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.cache.stats().await)?)
    }

    async fn clear_cache(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ClearParams {
            #[serde(default)]
            expired_only: bool,
        }

        let params: ClearParams = parse_args(params)?;
        let report = self.cache.clear(params.expired_only).await;
        let message = if params.expired_only {
            self.translator.t("cache.expiredCleared")
        } else {
            self.translator.t("cache.cleared")
        };

        Ok(json!({
            "iconCleared": report.icon_cleared,
            "searchCleared": report.search_cleared,
            "message": message,
        }))
    }

    async fn save_icons(&self, params: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SaveParams {
            #[serde(default)]
            icons: Vec<Value>,
            save_path: Option<String>,
        }

        let params: SaveParams = parse_args(params)?;
        let path = params.save_path.unwrap_or_else(|| DEFAULT_SAVE_PATH.to_string());
        let report = self.saver.save_icons(&params.icons, path).await?;
        Ok(serde_json::to_value(report)?)
    }
}

/// Deserialize tool arguments; a missing argument object counts as empty
fn parse_args<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| IconMcpError::Validation(format!("Invalid arguments: {}", e)))
}
