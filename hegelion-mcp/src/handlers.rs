//! Request routing: initialize, tools/list, tools/call.

use crate::error::ServerError;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsResult, McpTool,
    ServerCapabilities, ServerInfo, ToolsCapability, MCP_PROTOCOL_VERSION,
};
use hegelion_core::{DialecticEngine, Query, QueryOptions};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the single tool this server exposes.
pub const DIALECTIC_TOOL: &str = "dialectic";

/// Arguments accepted by the `dialectic` tool. The option fields all carry
/// serde defaults, so a bare `{"query": "..."}` is a valid call.
#[derive(Debug, Deserialize)]
struct DialecticArgs {
    query: String,
    #[serde(flatten)]
    options: QueryOptions,
}

/// Routes protocol requests to the engine.
pub struct RequestHandler {
    engine: Arc<DialecticEngine>,
    initialized: bool,
    server_info: ServerInfo,
}

impl RequestHandler {
    pub fn new(engine: Arc<DialecticEngine>) -> Self {
        Self {
            engine,
            initialized: false,
            server_info: ServerInfo {
                name: "hegelion".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Whether a client has completed the `initialize` handshake.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn handle_initialize(&mut self, params: InitializeParams) -> Result<Value, ServerError> {
        info!(
            client = params.client_info.name.as_str(),
            protocol_version = params.protocol_version.as_str(),
            "MCP client connecting"
        );
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: self.server_info.clone(),
        };
        serde_json::to_value(result).map_err(|e| ServerError::InternalError {
            message: format!("failed to serialize initialize result: {e}"),
        })
    }

    fn handle_tools_list(&self) -> Result<Value, ServerError> {
        if !self.initialized {
            return Err(ServerError::NotInitialized);
        }
        let result = ListToolsResult {
            tools: vec![dialectic_tool()],
        };
        debug!(count = result.tools.len(), "Listing tools");
        serde_json::to_value(result).map_err(|e| ServerError::InternalError {
            message: format!("failed to serialize tools list: {e}"),
        })
    }

    async fn handle_tools_call(&self, params: CallToolParams) -> Result<Value, ServerError> {
        if !self.initialized {
            return Err(ServerError::NotInitialized);
        }
        if params.name != DIALECTIC_TOOL {
            return Err(ServerError::UnknownTool { name: params.name });
        }

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let args: DialecticArgs =
            serde_json::from_value(arguments).map_err(|e| ServerError::InvalidParams {
                message: format!("invalid dialectic arguments: {e}"),
            })?;

        info!(query = args.query.as_str(), "Running dialectic via MCP");
        let iterations = args.options.iterations;
        let query = Query::new(args.query, args.options);

        // Engine failures are tool-level errors the client's model can read,
        // not protocol errors.
        let result = if iterations > 1 {
            match self.engine.run_iterations(query).await {
                Ok(results) => CallToolResult::text(pretty(&results)?),
                Err(e) => tool_failure(e),
            }
        } else {
            match self.engine.run(query).await {
                Ok(result) => CallToolResult::text(pretty(&result)?),
                Err(e) => tool_failure(e),
            }
        };

        serde_json::to_value(result).map_err(|e| ServerError::InternalError {
            message: format!("failed to serialize tool result: {e}"),
        })
    }

    /// Route a JSON-RPC method to its handler.
    pub async fn route(&mut self, method: &str, params: Value) -> Result<Value, ServerError> {
        match method {
            "initialize" => {
                let params: InitializeParams =
                    serde_json::from_value(params).map_err(|e| ServerError::InvalidParams {
                        message: format!("invalid initialize params: {e}"),
                    })?;
                self.handle_initialize(params)
            }
            "notifications/initialized" => {
                info!("MCP client initialized");
                Ok(Value::Null)
            }
            "tools/list" => self.handle_tools_list(),
            "tools/call" => {
                let params: CallToolParams =
                    serde_json::from_value(params).map_err(|e| ServerError::InvalidParams {
                        message: format!("invalid tools/call params: {e}"),
                    })?;
                self.handle_tools_call(params).await
            }
            _ => Err(ServerError::MethodNotFound {
                method: method.to_string(),
            }),
        }
    }
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, ServerError> {
    serde_json::to_string_pretty(value).map_err(|e| ServerError::InternalError {
        message: format!("failed to serialize result: {e}"),
    })
}

fn tool_failure(err: hegelion_core::HegelionError) -> CallToolResult {
    warn!(error = %err, "Dialectic run failed");
    let message = match err.failing_phase() {
        Some(phase) => format!("dialectic run failed during the {phase} phase: {err}"),
        None => format!("dialectic run failed: {err}"),
    };
    CallToolResult::error(message)
}

fn dialectic_tool() -> McpTool {
    McpTool {
        name: DIALECTIC_TOOL.to_string(),
        description: Some(
            "Run a full dialectical reasoning pass over a question: thesis, \
             antithesis (optionally a three-persona critic council), synthesis, \
             and an optional judge-gated retry. Returns the structured result \
             as JSON."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to reason about"
                },
                "use_council": {
                    "type": "boolean",
                    "description": "Replace the single antithesis with three concurrent critic personas",
                    "default": false
                },
                "use_judge": {
                    "type": "boolean",
                    "description": "Score the synthesis and retry once below threshold",
                    "default": false
                },
                "use_search": {
                    "type": "boolean",
                    "description": "Ask phases to ground claims in retrieved evidence",
                    "default": false
                },
                "response_style": {
                    "type": "string",
                    "enum": ["sections", "json", "synthesis_only", "conversational", "bullet_points"],
                    "default": "sections"
                },
                "max_tokens_per_phase": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1200
                },
                "iterations": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1,
                    "description": "Independent full-pipeline runs to return"
                }
            },
            "required": ["query"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientInfo;
    use hegelion_core::{HegelionConfig, MockBackend};

    fn handler_with(mock: &Arc<MockBackend>) -> RequestHandler {
        let engine = DialecticEngine::new(Arc::clone(mock) as Arc<_>, &HegelionConfig::default());
        RequestHandler::new(Arc::new(engine))
    }

    fn init_params() -> Value {
        serde_json::to_value(InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: ClientInfo {
                name: "test-client".to_string(),
                version: Some("1.0".to_string()),
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_advertises_tools() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        assert!(!handler.is_initialized());

        let result = handler.route("initialize", init_params()).await.unwrap();
        assert!(handler.is_initialized());
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "hegelion");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_requires_initialization() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        let err = handler.route("tools/list", Value::Null).await.unwrap_err();
        assert!(matches!(err, ServerError::NotInitialized));
    }

    #[tokio::test]
    async fn test_tools_list_exposes_dialectic() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let result = handler.route("tools/list", Value::Null).await.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], DIALECTIC_TOOL);
        assert_eq!(tools[0]["inputSchema"]["required"][0], "query");
    }

    #[tokio::test]
    async fn test_tools_call_runs_engine() {
        let mock = Arc::new(MockBackend::new());
        mock.push_text("the thesis");
        mock.push_text("CONTRADICTION: gap\nEVIDENCE: proof");
        mock.push_text("the synthesis");
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let result = handler
            .route(
                "tools/call",
                json!({ "name": DIALECTIC_TOOL, "arguments": { "query": "why?" } }),
            )
            .await
            .unwrap();

        assert!(result.get("isError").is_none());
        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["thesis"], "the thesis");
        assert_eq!(parsed["contradictions"][0]["description"], "gap");
        assert_eq!(mock.calls_started(), 3);
    }

    #[tokio::test]
    async fn test_tools_call_engine_failure_is_tool_error() {
        let mock = Arc::new(MockBackend::new());
        // Script is empty: the thesis call fails permanently.
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let result = handler
            .route(
                "tools/call",
                json!({ "name": DIALECTIC_TOOL, "arguments": { "query": "why?" } }),
            )
            .await
            .unwrap();

        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("thesis phase"));
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let err = handler
            .route("tools/call", json!({ "name": "nonexistent" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_tools_call_missing_query_rejected() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let err = handler
            .route(
                "tools/call",
                json!({ "name": DIALECTIC_TOOL, "arguments": { "use_judge": true } }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let mock = Arc::new(MockBackend::new());
        let mut handler = handler_with(&mock);
        let err = handler.route("resources/list", Value::Null).await.unwrap_err();
        assert!(matches!(err, ServerError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn test_iterations_returns_array() {
        let mock = Arc::new(MockBackend::with_fallback("text"));
        let mut handler = handler_with(&mock);
        handler.route("initialize", init_params()).await.unwrap();

        let result = handler
            .route(
                "tools/call",
                json!({
                    "name": DIALECTIC_TOOL,
                    "arguments": { "query": "why?", "iterations": 2 }
                }),
            )
            .await
            .unwrap();

        let text = result["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
