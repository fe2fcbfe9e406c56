//! HTTP + WebSocket transport for the picking page
//!
//! Serves the page, paginates cached search results, accepts the human's
//! submission and watches browser liveness. A closed socket fails its
//! selection only after the grace period, and only if no newer connection or
//! submission arrived in the meantime.

use super::messages::{ClientMessage, ServerMessage};
use super::page::PageRenderer;
use crate::cache::CacheManager;
use crate::error::{IconMcpError, Result};
use crate::i18n::Translator;
use crate::selection::{SelectionBoard, SubmitOutcome};
use crate::types::{IconData, SearchRecord};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ports tried sequentially from the requested one
const PORT_PROBE_RANGE: u16 = 100;

/// Fallback range when every probed port is taken
const FALLBACK_PORTS: std::ops::RangeInclusive<u16> = 20000..=30000;

/// How long `stop` waits for open sockets to wind down
const SOCKET_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_PAGE_SIZE: i64 = 15;

/// Reply of [`WebServer::start`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    pub message: String,
    pub port: u16,
    pub url: String,
    pub websocket: bool,
}

/// One page of a cached search, as served to the browser
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePage {
    pub icons: Vec<IconData>,
    pub count: usize,
    pub total_count: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Slice `page` (1-based) out of a cached search.
///
/// Pages past the end are empty, not errors.
pub fn paginate(record: &SearchRecord, page: usize, page_size: usize) -> CachePage {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = (page - 1).saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(record.icons.len());

    let icons = record
        .icons
        .get(start..end)
        .map(|slice| slice.to_vec())
        .unwrap_or_default();

    CachePage {
        count: icons.len(),
        icons,
        total_count: record.total_count,
        page,
        page_size,
        total_pages: record.icons.len().div_ceil(page_size).max(1),
    }
}

/// State shared by every route of one running instance
#[derive(Clone)]
struct AppState {
    cache: Arc<CacheManager>,
    board: Arc<SelectionBoard>,
    translator: Translator,
    page: PageRenderer,
    grace_period: Duration,
    /// Flipped to `true` when the server is stopping
    closing: watch::Receiver<bool>,
    /// Every upgraded socket handler runs inside this tracker
    sockets: TaskTracker,
}

/// Handles of a bound, serving instance
struct RunningServer {
    port: u16,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    closing_tx: watch::Sender<bool>,
    sockets: TaskTracker,
}

/// The picking page server
///
/// `start` and `stop` are idempotent; at most one instance serves at a time.
pub struct WebServer {
    cache: Arc<CacheManager>,
    board: Arc<SelectionBoard>,
    translator: Translator,
    grace_period: Duration,
    default_port: u16,
    default_auto_open: bool,
    running: Mutex<Option<RunningServer>>,
}

impl WebServer {
    pub fn new(
        cache: Arc<CacheManager>,
        board: Arc<SelectionBoard>,
        translator: Translator,
        grace_period: Duration,
        default_port: u16,
        default_auto_open: bool,
    ) -> Self {
        Self {
            cache,
            board,
            translator,
            grace_period,
            default_port,
            default_auto_open,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Port of the running instance
    pub async fn port(&self) -> Option<u16> {
        self.running.lock().await.as_ref().map(|r| r.port)
    }

    /// Base URL of the running instance
    pub async fn url(&self) -> Option<String> {
        self.port().await.map(base_url)
    }

    /// Start serving. A second call reports the existing binding.
    pub async fn start(&self, port: Option<u16>, auto_open: Option<bool>) -> Result<StartReport> {
        let mut running = self.running.lock().await;

        if let Some(existing) = running.as_ref() {
            return Ok(StartReport {
                message: self
                    .translator
                    .translate("server.webServerAlreadyRunning", &[("port", &existing.port)]),
                port: existing.port,
                url: base_url(existing.port),
                websocket: true,
            });
        }

        let listener = bind_available(port.unwrap_or(self.default_port)).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (closing_tx, closing_rx) = watch::channel(false);
        let sockets = TaskTracker::new();

        let state = AppState {
            cache: self.cache.clone(),
            board: self.board.clone(),
            translator: self.translator,
            page: PageRenderer::new(self.translator),
            grace_period: self.grace_period,
            closing: closing_rx,
            sockets: sockets.clone(),
        };
        let router = build_router(state);

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!("Web server error: {}", e);
            }
        });

        let message = self
            .translator
            .translate("server.webServerStarted", &[("port", &port)]);
        info!("{}", message);

        let url = base_url(port);
        if auto_open.unwrap_or(self.default_auto_open) {
            open_browser(&url);
        }

        *running = Some(RunningServer {
            port,
            shutdown_tx,
            handle,
            closing_tx,
            sockets,
        });

        Ok(StartReport {
            message,
            port,
            url,
            websocket: true,
        })
    }

    /// Close every live socket, then release the listener
    pub async fn stop(&self) -> String {
        let message = self.translator.t("server.webServerStopped");

        let Some(mut running) = self.running.lock().await.take() else {
            debug!("Web server not running");
            return message;
        };

        // Sockets first: each one sends its close frame and ends.
        let _ = running.closing_tx.send(true);
        running.sockets.close();
        if tokio::time::timeout(SOCKET_DRAIN_TIMEOUT, running.sockets.wait())
            .await
            .is_err()
        {
            warn!("Some WebSocket connections did not close in time");
        }

        // Then the listener.
        let _ = running.shutdown_tx.send(());
        if let Err(e) = (&mut running.handle).await {
            warn!("Web server task ended abnormally: {}", e);
        }

        info!("{}", message);
        message
    }
}

fn base_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// Bind the first free port at or after `start`, falling back to a random high port
async fn bind_available(start: u16) -> Result<TcpListener> {
    for offset in 0..PORT_PROBE_RANGE {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!("Port {} in use, trying next", port);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let port = rand::thread_rng().gen_range(FALLBACK_PORTS);
    debug!(
        "Ports {}..{} unavailable, falling back to {}",
        start,
        start.saturating_add(PORT_PROBE_RANGE),
        port
    );
    TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .await
        .map_err(|e| IconMcpError::Server(format!("Failed to bind port {}: {}", port, e)))
}

fn open_browser(url: &str) {
    let spawned = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("cmd").args(["/C", "start", "", url]).spawn()
    } else {
        std::process::Command::new("xdg-open").arg(url).spawn()
    };

    if let Err(e) = spawned {
        warn!("Failed to open browser: {}", e);
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/site.js", get(script_handler))
        .route("/api/cache", get(cache_handler))
        .route("/api/save", post(save_handler))
        .route("/api/search", post(search_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct SearchIdQuery {
    #[serde(rename = "searchId", default)]
    search_id: String,
}

async fn index_handler(State(state): State<AppState>, Query(query): Query<SearchIdQuery>) -> Html<String> {
    Html(state.page.html(&query.search_id))
}

async fn script_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        state.page.script(),
    )
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheQuery {
    #[serde(default)]
    search_id: String,
    page: Option<i64>,
    page_size: Option<i64>,
}

async fn cache_handler(State(state): State<AppState>, Query(query): Query<CacheQuery>) -> Response {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return json_error(StatusCode::BAD_REQUEST, state.translator.t("search.invalidPage"));
    }
    if page_size < 1 {
        return json_error(StatusCode::BAD_REQUEST, state.translator.t("search.invalidPageSize"));
    }

    let Some(record) = state.cache.get_search(&query.search_id).await else {
        return json_error(
            StatusCode::NOT_FOUND,
            state
                .translator
                .translate("selection.noSearchFound", &[("searchId", &query.search_id)]),
        );
    };

    let page = usize::try_from(page).unwrap_or(usize::MAX);
    let page_size = usize::try_from(page_size).unwrap_or(usize::MAX);
    Json(paginate(&record, page, page_size)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest {
    #[serde(default)]
    icons: Vec<Value>,
    #[serde(default)]
    search_id: String,
}

async fn save_handler(State(state): State<AppState>, Json(request): Json<SaveRequest>) -> Response {
    if request.icons.is_empty() || request.search_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Missing icons or searchId");
    }

    let count = request.icons.len();
    match state.board.submit(&request.search_id, request.icons).await {
        SubmitOutcome::Recorded => {
            info!(
                "{}",
                state
                    .translator
                    .translate("selection.userSelectedIcons", &[("count", &count)])
            );
            Json(json!({ "success": true, "count": count })).into_response()
        }
        SubmitOutcome::Ignored => json_error(StatusCode::CONFLICT, state.translator.t("selection.selectionFailed")),
    }
}

async fn search_handler() -> Response {
    json_error(StatusCode::NOT_IMPLEMENTED, "Use MCP tools for searching")
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SearchIdQuery>,
) -> impl IntoResponse {
    let sockets = state.sockets.clone();
    ws.on_upgrade(move |socket| sockets.track_future(handle_socket(socket, state, query.search_id)))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    socket.send(Message::Text(message.to_json())).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: AppState, search_id: String) {
    let connection = Uuid::new_v4().simple().to_string();
    let mut closing = state.closing.clone();

    if *closing.borrow() {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let mut events = state.board.subscribe();
    let session = if search_id.is_empty() {
        None
    } else {
        state.board.open_session(&search_id).await
    };
    debug!(
        "WebSocket {} connected for '{}' (session {:?})",
        connection, search_id, session
    );

    let welcome = ServerMessage::Welcome {
        search_id: search_id.clone(),
        message: state.translator.t("web.connected"),
    };
    if !send(&mut socket, &welcome).await {
        release(&state, &search_id, session);
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_text(&state, &search_id, &text).await;
                    if let Some(reply) = reply {
                        if !send(&mut socket, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket {} error: {}", connection, e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) if event.search_id == search_id => {
                    let update = ServerMessage::SelectionUpdate {
                        search_id: event.search_id,
                        status: event.status,
                    };
                    if !send(&mut socket, &update).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Socket missed {} selection events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = closing.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    debug!("WebSocket {} closed for '{}'", connection, search_id);
    release(&state, &search_id, session);
}

/// Start the grace period for a closed connection
fn release(state: &AppState, search_id: &str, session: Option<u64>) {
    let Some(session) = session else {
        return;
    };
    let board = state.board.clone();
    let search_id = search_id.to_string();
    let grace = state.grace_period;
    tokio::spawn(async move {
        board.abandon_after_grace(&search_id, session, grace).await;
    });
}

async fn handle_text(state: &AppState, search_id: &str, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("Invalid WebSocket message: {}", e);
            return Some(ServerMessage::Error {
                message: format!("Invalid message format: {}", e),
            });
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerMessage::Pong),
        ClientMessage::Select { items } => {
            if search_id.is_empty() {
                return Some(ServerMessage::Error {
                    message: "Missing searchId".to_string(),
                });
            }
            if items.is_empty() {
                return Some(ServerMessage::Error {
                    message: state.translator.t("web.noIconsSelected"),
                });
            }
            let count = items.len();
            match state.board.submit(search_id, items).await {
                // The broadcast delivers the selectionUpdate.
                SubmitOutcome::Recorded => {
                    info!(
                        "{}",
                        state
                            .translator
                            .translate("selection.userSelectedIcons", &[("count", &count)])
                    );
                    None
                }
                SubmitOutcome::Ignored => Some(ServerMessage::Error {
                    message: state.translator.t("selection.selectionFailed"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(n: usize) -> SearchRecord {
        SearchRecord {
            query: "home".to_string(),
            page: 1,
            page_size: 100,
            icons: (0..n)
                .map(|i| serde_json::from_value(json!({"id": i, "name": format!("icon-{}", i)})).unwrap())
                .collect(),
            total_count: n as u64,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_paginate_23_items() {
        let record = record(23);

        let first = paginate(&record, 1, 10);
        assert_eq!(first.count, 10);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.icons[0].name, "icon-0");

        let last = paginate(&record, 3, 10);
        assert_eq!(last.count, 3);
        assert_eq!(last.icons[2].name, "icon-22");

        let beyond = paginate(&record, 4, 10);
        assert_eq!(beyond.count, 0);
        assert_eq!(beyond.total_pages, 3);
    }

    #[test]
    fn test_paginate_empty_has_one_page() {
        let page = paginate(&record(0), 1, 15);
        assert_eq!(page.total_pages, 1);
        assert!(page.icons.is_empty());
    }

    #[test]
    fn test_paginate_huge_page_does_not_overflow() {
        let page = paginate(&record(5), usize::MAX, usize::MAX);
        assert!(page.icons.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    fn server() -> WebServer {
        let cache = Arc::new(CacheManager::new(Duration::from_secs(60)));
        let board = Arc::new(SelectionBoard::new(cache.clone()));
        WebServer::new(
            cache,
            board,
            Translator::default(),
            Duration::from_millis(50),
            0,
            false,
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let server = server();

        let first = server.start(Some(0), Some(false)).await.unwrap();
        let second = server.start(Some(0), Some(false)).await.unwrap();
        assert_eq!(first.port, second.port);
        assert!(second.message.contains("already running"));
        assert!(server.is_running().await);

        server.stop().await;
        assert!(!server.is_running().await);

        // Stopping twice is harmless.
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drains_sockets_before_releasing_listener() {
        let server = server();
        let report = server.start(Some(0), Some(false)).await.unwrap();
        let sockets = server.running.lock().await.as_ref().unwrap().sockets.clone();

        // Stands in for a socket handler still finishing its close handshake.
        let port = report.port;
        let handler = tokio::spawn(sockets.track_future(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            tokio::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_ok()
        }));

        server.stop().await;

        assert!(handler.await.unwrap(), "listener was released while a socket was open");
        assert!(tokio::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_err());
    }

    fn app() -> (Router, Arc<CacheManager>, Arc<SelectionBoard>) {
        let cache = Arc::new(CacheManager::new(Duration::from_secs(60)));
        let board = Arc::new(SelectionBoard::new(cache.clone()));
        let (_closing_tx, closing) = watch::channel(false);
        let translator = Translator::default();
        let state = AppState {
            cache: cache.clone(),
            board: board.clone(),
            translator,
            page: PageRenderer::new(translator),
            grace_period: Duration::from_millis(50),
            closing,
            sockets: TaskTracker::new(),
        };
        (build_router(state), cache, board)
    }

    async fn call(router: Router, request: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
        use tower::ServiceExt;
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::get(uri).body(axum::body::Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_route_pages_and_errors() {
        let (router, cache, _) = app();
        cache.set_search("s1", record(23)).await;

        let (status, body) = call(router.clone(), get_request("/api/cache?searchId=s1&page=3&pageSize=10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["totalPages"], 3);

        let (status, body) = call(router.clone(), get_request("/api/cache?searchId=missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let (status, _) = call(router, get_request("/api/cache?searchId=s1&page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_save_route_completes_selection() {
        let (router, _, board) = app();
        board.open_session("s1").await;

        let (status, _) = call(router.clone(), post_json("/api/save", json!({"searchId": "s1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            router,
            post_json("/api/save", json!({"searchId": "s1", "icons": [{"name": "home"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "count": 1}));
        assert_eq!(
            board.current("s1").await.unwrap().status,
            crate::types::SelectionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_search_route_is_reserved() {
        let (router, _, _) = app();
        let (status, _) = call(router, post_json("/api/search", json!({"q": "home"}))).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_probe_skips_taken_port() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_available(port).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }
}
