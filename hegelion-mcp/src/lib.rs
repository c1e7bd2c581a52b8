//! # Hegelion MCP
//!
//! Model Context Protocol server exposing the dialectic engine as a tool
//! over JSON-RPC 2.0.
//!
//! ```text
//! Client <-> Transport (stdio/channel) <-> McpServer <-> RequestHandler <-> DialecticEngine
//! ```

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod transport;

use error::ServerError;
use handlers::RequestHandler;
use hegelion_core::DialecticEngine;
use protocol::{IncomingMessage, JsonRpcResponse, RequestId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use transport::Transport;

/// The MCP server: reads messages off a transport, routes them, and writes
/// responses until EOF.
pub struct McpServer {
    handler: RequestHandler,
}

impl McpServer {
    /// Create a server around an engine.
    pub fn new(engine: Arc<DialecticEngine>) -> Self {
        Self {
            handler: RequestHandler::new(engine),
        }
    }

    /// Serve the given transport until EOF or a transport error.
    pub async fn run<T: Transport>(&mut self, transport: &mut T) -> Result<(), ServerError> {
        info!("MCP server starting");

        loop {
            let message = match transport.read_message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    info!("Transport closed (EOF), shutting down");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Transport read error");
                    break;
                }
            };

            if message.trim().is_empty() {
                continue;
            }

            match self.process_message(&message).await {
                Ok(Some(response)) => {
                    let response_json = serde_json::to_string(&response).map_err(|e| {
                        ServerError::InternalError {
                            message: format!("failed to serialize response: {e}"),
                        }
                    })?;
                    transport.write_message(&response_json).await?;
                }
                Ok(None) => {
                    // Notification, nothing to send back.
                }
                Err(e) => {
                    error!(error = %e, "Error processing message");
                    let error_response = JsonRpcResponse::from_server_error(RequestId::Null, e);
                    let error_json =
                        serde_json::to_string(&error_response).unwrap_or_else(|_| {
                            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#
                                .to_string()
                        });
                    transport.write_message(&error_json).await?;
                }
            }
        }

        transport.close().await?;
        info!("MCP server stopped");
        Ok(())
    }

    /// Process one message. `Some(response)` for requests, `None` for
    /// notifications.
    async fn process_message(&mut self, raw: &str) -> Result<Option<JsonRpcResponse>, ServerError> {
        let incoming: IncomingMessage =
            serde_json::from_str(raw).map_err(|e| ServerError::ParseError {
                message: format!("invalid JSON-RPC message: {e}"),
            })?;

        if incoming.jsonrpc != "2.0" {
            return Err(ServerError::InvalidRequest {
                message: format!("expected jsonrpc version 2.0, got: {}", incoming.jsonrpc),
            });
        }

        if incoming.is_notification() {
            debug!(method = incoming.method.as_str(), "Processing notification");
            if let Err(e) = self.handler.route(&incoming.method, incoming.params).await {
                warn!(method = incoming.method.as_str(), error = %e, "Notification handler error");
            }
            return Ok(None);
        }

        let id = incoming.id.unwrap_or(RequestId::Null);
        debug!(method = incoming.method.as_str(), "Processing request");
        match self.handler.route(&incoming.method, incoming.params).await {
            Ok(result) => Ok(Some(JsonRpcResponse::success(id, result))),
            Err(e) => Ok(Some(JsonRpcResponse::from_server_error(id, e))),
        }
    }

    /// Whether a client has completed initialization.
    pub fn is_initialized(&self) -> bool {
        self.handler.is_initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MCP_PROTOCOL_VERSION;
    use crate::transport::ChannelTransport;
    use hegelion_core::{HegelionConfig, MockBackend};
    use serde_json::json;

    fn setup_server(mock: &Arc<MockBackend>) -> McpServer {
        let engine = DialecticEngine::new(Arc::clone(mock) as Arc<_>, &HegelionConfig::default());
        McpServer::new(Arc::new(engine))
    }

    fn init_request(id: i64) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_process_initialize() {
        let mock = Arc::new(MockBackend::new());
        let mut server = setup_server(&mock);

        let resp = server.process_message(&init_request(1)).await.unwrap().unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "hegelion");
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let mock = Arc::new(MockBackend::new());
        let mut server = setup_server(&mock);
        server.process_message(&init_request(1)).await.unwrap();

        let resp = server
            .process_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let mock = Arc::new(MockBackend::new());
        let mut server = setup_server(&mock);
        let result = server.process_message("not json").await;
        assert!(matches!(result, Err(ServerError::ParseError { .. })));
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version_rejected() {
        let mock = Arc::new(MockBackend::new());
        let mut server = setup_server(&mock);
        let req = json!({"jsonrpc": "1.0", "id": 1, "method": "initialize", "params": {}});
        let result = server.process_message(&req.to_string()).await;
        assert!(matches!(result, Err(ServerError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_full_lifecycle_over_channel_transport() {
        let mock = Arc::new(MockBackend::new());
        mock.push_text("the thesis");
        mock.push_text("the antithesis");
        mock.push_text("the synthesis");
        let mut server = setup_server(&mock);

        let (mut client, mut server_transport) = ChannelTransport::pair(32);
        let server_handle =
            tokio::spawn(async move { server.run(&mut server_transport).await });

        // 1. Initialize.
        client.write_message(&init_request(1)).await.unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client.read_message().await.unwrap().unwrap()).unwrap();
        assert_eq!(
            resp.result.unwrap()["protocolVersion"],
            MCP_PROTOCOL_VERSION
        );

        // 2. Initialized notification (no response expected).
        client
            .write_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();

        // 3. List tools.
        client
            .write_message(
                &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}})
                    .to_string(),
            )
            .await
            .unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client.read_message().await.unwrap().unwrap()).unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "dialectic");

        // 4. Run the dialectic tool.
        client
            .write_message(
                &json!({
                    "jsonrpc": "2.0",
                    "id": 3,
                    "method": "tools/call",
                    "params": {"name": "dialectic", "arguments": {"query": "why?"}}
                })
                .to_string(),
            )
            .await
            .unwrap();
        let resp: JsonRpcResponse =
            serde_json::from_str(&client.read_message().await.unwrap().unwrap()).unwrap();
        let text = resp.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains("the synthesis"));

        // Close the client side to signal EOF.
        drop(client);
        assert!(server_handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_tools_list_before_initialize_is_error_response() {
        let mock = Arc::new(MockBackend::new());
        let mut server = setup_server(&mock);
        let req = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}});
        let resp = server
            .process_message(&req.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32003);
    }
}
