//! Common test utilities and helpers

#![allow(dead_code)]

use chrono::Utc;
use futures_util::StreamExt;
use icon_mcp_core::{
    CacheManager, IconData, SearchRecord, SelectionBoard, SelectionWaiter, Translator, WebServer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Cache, board, waiter and a running web server on an ephemeral port
pub struct Stack {
    pub cache: Arc<CacheManager>,
    pub board: Arc<SelectionBoard>,
    pub waiter: Arc<SelectionWaiter>,
    pub web: WebServer,
    pub port: u16,
}

impl Stack {
    pub async fn start(grace: Duration) -> Self {
        let cache = Arc::new(CacheManager::new(Duration::from_secs(60)));
        let board = Arc::new(SelectionBoard::new(cache.clone()));
        let waiter = Arc::new(SelectionWaiter::new(
            cache.clone(),
            board.clone(),
            Translator::default(),
            Duration::from_millis(100),
        ));
        let web = WebServer::new(cache.clone(), board.clone(), Translator::default(), grace, 0, false);
        let report = web
            .start(Some(0), Some(false))
            .await
            .expect("web server starts");

        Self {
            cache,
            board,
            waiter,
            web,
            port: report.port,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Register a search with `count` icons named `icon-0`, `icon-1`, ...
    pub async fn seed_search(&self, search_id: &str, count: usize) {
        self.cache
            .set_search(search_id, search_record(count))
            .await;
    }

    /// Open a socket for `search_id` and consume the welcome message
    pub async fn connect(&self, search_id: &str) -> Socket {
        let url = format!("ws://127.0.0.1:{}/ws?searchId={}", self.port, search_id);
        let (mut socket, _) = connect_async(url).await.expect("websocket connects");

        let welcome = next_json(&mut socket).await.expect("welcome message");
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["searchId"], search_id);
        assert_eq!(welcome["message"], Translator::default().t("web.connected"));
        socket
    }
}

pub fn search_record(count: usize) -> SearchRecord {
    let icons: Vec<IconData> = (0..count)
        .map(|i| {
            serde_json::from_value(json!({
                "id": i,
                "name": format!("icon-{}", i),
                "show_svg": format!("<svg id=\"{}\"/>", i)
            }))
            .expect("valid icon")
        })
        .collect();

    SearchRecord {
        query: "test".to_string(),
        page: 1,
        page_size: 100,
        total_count: count as u64,
        icons,
        created_at: Utc::now(),
    }
}

/// Next text frame parsed as JSON; `None` once the socket is closed
pub async fn next_json(socket: &mut Socket) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("socket message within 5s")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).expect("JSON frame")),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Skip frames until one with the given `type` (and `status`, if given) arrives
pub async fn wait_for(socket: &mut Socket, kind: &str, status: Option<&str>) -> Value {
    loop {
        let message = next_json(socket).await.expect("socket still open");
        if message["type"] == kind && status.map_or(true, |s| message["status"] == s) {
            return message;
        }
    }
}
