//! JSON-RPC over a line transport, driven through `McpServer::serve`

use async_trait::async_trait;
use icon_mcp_core::services::UpstreamPage;
use icon_mcp_core::{
    CacheManager, IconProvider, IconSaver, IconSearcher, McpServer, Result, SearchQuery, SelectionBoard,
    SelectionWaiter, ToolHandler, Translator, WebServer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

struct TwoIcons;

#[async_trait]
impl IconProvider for TwoIcons {
    async fn search(&self, _query: &SearchQuery) -> Result<UpstreamPage> {
        Ok(UpstreamPage {
            icons: vec![
                serde_json::from_value(json!({"id": 1, "name": "home", "show_svg": "<svg/>"})).unwrap(),
                serde_json::from_value(json!({"id": 2, "name": "user", "show_svg": "<svg/>"})).unwrap(),
            ],
            total_count: 2,
        })
    }
}

fn tool_handler() -> Arc<ToolHandler> {
    let translator = Translator::default();
    let cache = Arc::new(CacheManager::new(Duration::from_secs(60)));
    let board = Arc::new(SelectionBoard::new(cache.clone()));
    let waiter = Arc::new(SelectionWaiter::new(
        cache.clone(),
        board.clone(),
        translator,
        Duration::from_millis(20),
    ));
    let searcher = Arc::new(IconSearcher::new(Arc::new(TwoIcons), cache.clone(), translator));
    let web = Arc::new(WebServer::new(
        cache.clone(),
        board,
        translator,
        Duration::from_millis(50),
        0,
        false,
    ));
    Arc::new(ToolHandler::new(
        cache,
        searcher,
        waiter,
        Arc::new(IconSaver::new(translator)),
        web,
        translator,
    ))
}

struct Client {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        self.input
            .write_all(format!("{}\n", message).as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.output.next_line())
            .await
            .expect("response within 5s")
            .unwrap()
            .expect("server still writing");
        serde_json::from_str(&line).unwrap()
    }

    async fn call(&mut self, id: u64, name: &str, arguments: Value) -> (Value, bool) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }))
        .await;
        let response = self.recv().await;
        assert_eq!(response["id"], id);
        let result = &response["result"];
        let payload = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        (payload, result["isError"] == true)
    }
}

fn spawn_server(handler: Arc<ToolHandler>) -> (Client, tokio::task::JoinHandle<()>) {
    let (client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_out) = tokio::io::duplex(64 * 1024);

    let task = tokio::spawn(async move {
        McpServer::new(handler)
            .serve(BufReader::new(server_in), server_out)
            .await
            .unwrap();
    });

    (
        Client {
            input: client_in,
            output: BufReader::new(client_out).lines(),
        },
        task,
    )
}

#[tokio::test]
async fn test_handshake_and_tool_listing() {
    let (mut client, task) = spawn_server(tool_handler());

    client
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await;
    let init = client.recv().await;
    assert_eq!(init["result"]["serverInfo"]["name"], "icon-mcp-server");

    // Notifications get no reply; the next line must answer id 2.
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let list = client.recv().await;
    assert_eq!(list["id"], 2);
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));

    client
        .send(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}))
        .await;
    let unknown = client.recv().await;
    assert_eq!(unknown["error"]["code"], -32601);

    drop(client);
    task.await.unwrap();
}

#[tokio::test]
async fn test_tool_errors_are_structured() {
    let (mut client, _task) = spawn_server(tool_handler());

    let (payload, is_error) = client.call(1, "search_icons", json!({"q": "home", "page": 0})).await;
    assert!(is_error);
    assert_eq!(payload["kind"], "validation_error");
    assert!(payload["error"].as_str().unwrap().contains("Page"));

    let (payload, is_error) = client
        .call(2, "check_selection_status", json!({"searchId": "search_0_unknown"}))
        .await;
    assert!(is_error);
    assert_eq!(payload["kind"], "not_found_error");

    let (payload, is_error) = client.call(3, "no_such_tool", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["kind"], "validation_error");
}

#[tokio::test]
async fn test_wait_does_not_block_other_requests() {
    let handler = tool_handler();
    let (mut client, _task) = spawn_server(handler.clone());

    let (search, _) = client.call(1, "search_icons", json!({"q": "home"})).await;
    let search_id = search["searchId"].as_str().unwrap().to_string();
    assert_eq!(search["count"], 2);
    assert!(search["webUrl"].as_str().unwrap().contains(&search_id));

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "check_selection_status", "arguments": {"searchId": search_id, "maxWaitTime": 300}}
        }))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}))
        .await;

    // The ping overtakes the pending wait.
    let first = client.recv().await;
    assert_eq!(first["id"], 3);

    let second = client.recv().await;
    assert_eq!(second["id"], 2);
    let report: Value =
        serde_json::from_str(second["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(report["status"], "timeout");
    assert_eq!(report["success"], false);

    handler.shutdown().await;
}
