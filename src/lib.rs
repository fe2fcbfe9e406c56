//! Icon MCP - icon search with a human in the loop
//!
//! An MCP server that searches iconfont.cn on behalf of an agent, shows the
//! results to a human on a local web page, and hands the human's pick back
//! to the agent.
//!
//! # Architecture
//!
//! - **Cache**: TTL-bounded icon and search namespaces, plus live selections
//! - **Selection**: the per-search state machine and the waiter agents block on
//! - **Web**: HTTP + WebSocket transport serving the picking page
//! - **Services**: upstream search and saving icons to disk
//! - **MCP**: JSON-RPC 2.0 tool surface over stdio
//!
//! # Example
//!
//! ```ignore
//! use icon_mcp_core::{CacheManager, SelectionBoard, SelectionWaiter, Translator};
//! use std::{sync::Arc, time::Duration};
//!
//! let cache = Arc::new(CacheManager::new(Duration::from_secs(1800)));
//! let board = Arc::new(SelectionBoard::new(cache.clone()));
//! let waiter = SelectionWaiter::new(cache, board, Translator::default(), Duration::from_millis(100));
//!
//! let outcome = waiter.await_selection("search_1700000000000_ab12cd34", Duration::from_secs(180)).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod i18n;
pub mod mcp;
pub mod selection;
pub mod services;
pub mod types;
pub mod web;

pub use cache::{CacheManager, CacheStats, ClearReport, ExpiringMap, NamespaceStats};
pub use config::ServerConfig;
pub use error::{IconMcpError, Result};
pub use i18n::{Locale, Translator};
pub use mcp::{McpServer, ToolHandler};
pub use selection::{SelectionBoard, SelectionOutcome, SelectionReport, SelectionWaiter, SubmitOutcome};
pub use services::{IconProvider, IconSaver, IconSearcher, IconfontClient, SearchQuery};
pub use types::{IconData, SearchId, SearchRecord, SearchResult, SelectionRecord, SelectionStatus};
pub use web::WebServer;
