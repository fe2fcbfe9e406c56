//! Icon MCP - icon search with a human picker
//!
//! Entry point for the MCP server. JSON-RPC runs over stdin/stdout, so all
//! logging goes to stderr.

use clap::Parser;
use icon_mcp_core::{
    error::Result, CacheManager, IconSaver, IconSearcher, IconfontClient, McpServer, SelectionBoard,
    SelectionWaiter, ServerConfig, ToolHandler, Translator, WebServer,
};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "icon-mcp")]
#[command(about = "MCP server that lets a human pick icons for an agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// First port probed by the web server (overrides WEB_SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Open the browser when the web server starts
    #[arg(long)]
    auto_open: bool,

    /// Start the web server immediately instead of on the first search
    #[arg(long)]
    auto_start_web: bool,

    /// UI language, e.g. `en` or `zh-CN` (overrides LANGUAGE)
    #[arg(long)]
    language: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let level = level.as_str().to_lowercase();

    let filter = EnvFilter::new(format!(
        "icon_mcp={level},icon_mcp_core={level},tower_http=warn,hyper=warn,reqwest=warn"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        ServerConfig::from_env().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    if let Some(port) = cli.port {
        config.web_server_port = port;
    }
    if cli.auto_open {
        config.web_server_auto_open = true;
    }
    if cli.auto_start_web {
        config.auto_start_web_server = true;
    }
    if let Some(language) = cli.language {
        config.language = language;
    }
    debug!("Icon MCP v{} starting with {:?}", env!("CARGO_PKG_VERSION"), config);

    let translator = Translator::new(config.locale());
    info!("{}", translator.t("server.starting"));

    let cache = Arc::new(CacheManager::new(config.cache_expiry()));
    let board = Arc::new(SelectionBoard::new(cache.clone()));
    let waiter = Arc::new(SelectionWaiter::new(
        cache.clone(),
        board.clone(),
        translator,
        config.poll_interval(),
    ));
    let provider = Arc::new(IconfontClient::new(
        config.iconfont_api_base.clone(),
        config.search_timeout(),
        translator,
    ));
    let searcher = Arc::new(IconSearcher::new(provider, cache.clone(), translator));
    let saver = Arc::new(IconSaver::new(translator));
    let web = Arc::new(WebServer::new(
        cache.clone(),
        board,
        translator,
        config.grace_period(),
        config.web_server_port,
        config.web_server_auto_open,
    ));

    if config.auto_start_web_server {
        if let Err(e) = web.start(None, None).await {
            warn!("Failed to auto-start web server: {}", e);
        }
    }

    let tool_handler = Arc::new(ToolHandler::new(cache, searcher, waiter, saver, web, translator));
    let server = McpServer::new(tool_handler.clone());
    info!("{}", translator.t("server.started"));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                warn!("MCP transport ended with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping gracefully...");
        }
    }

    info!("{}", translator.t("server.shutdown"));
    tool_handler.shutdown().await;
    Ok(())
}
