//! Model Context Protocol (MCP) server implementation
//!
//! JSON-RPC 2.0 over stdio exposing the icon search and selection tools.

pub mod protocol;
pub mod server;
pub mod tools;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SERVER_NAME};
pub use server::McpServer;
pub use tools::{Tool, ToolHandler};
