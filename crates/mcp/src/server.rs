//! Host side of the channel: answers `initialize`, `tools/list` and
//! `tools/call` from a shared [`ToolRegistry`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, Implementation, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ServerCapabilities, ToolsCapability, codes, methods,
};
use crate::registry::ToolRegistry;
use crate::tool::{FailureKind, ToolCallRequest};
use crate::transport::{MessageReader, MessageWriter};

/// Depth of the per-connection response queue feeding the single writer.
const OUTBOUND_QUEUE: usize = 64;

/// Pause before accepting again after a failed accept.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves one registry over any number of connections.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    info: Implementation,
}

/// Per-connection handshake state.
#[derive(Default)]
struct Connection {
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, info: Implementation) -> Self {
        Self { registry, info }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve a single session on the process's stdin/stdout.
    pub async fn serve_stdio(&self) -> Result<()> {
        info!(server = %self.info.name, "serving on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Accept TCP connections forever, one session per connection.
    pub async fn serve_tcp(&self, host: &str, port: u16) -> Result<()> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).await.map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!(server = %self.info.name, %addr, "listening");
        self.serve_listener(listener).await
    }

    /// Accept loop over an already-bound listener.
    ///
    /// Accept failures (for example running out of file descriptors) are
    /// logged and retried after [`ACCEPT_BACKOFF`].
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                info!(%peer, "connection opened");
                let (reader, writer) = stream.into_split();
                match server.serve(reader, writer).await {
                    Ok(()) => info!(%peer, "connection closed"),
                    Err(e) => warn!(%peer, error = %e, "connection failed"),
                }
            });
        }
    }

    /// Run one session until the peer closes its side.
    ///
    /// Requests are handled concurrently; responses funnel through a single
    /// writer task so frames never interleave.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut reader = MessageReader::new(reader);
        let mut writer = MessageWriter::new(writer);
        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(OUTBOUND_QUEUE);

        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                match writer.send(&response).await {
                    Err(Error::OutputTooLarge { max }) => {
                        warn!(id = ?response.id, max, "response too large, replying with an error");
                        writer.send(&oversized_response(response.id, max)).await?;
                    }
                    sent => sent?,
                }
            }
            Ok::<(), Error>(())
        });

        let connection = Arc::new(Connection::default());
        let outcome = loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(Error::OutputTooLarge { max }) => {
                    warn!(max, "discarded oversized message");
                    let response = JsonRpcResponse::failure(
                        None,
                        JsonRpcError::new(
                            codes::INVALID_REQUEST,
                            format!("message exceeds the {max}-byte limit"),
                        ),
                    );
                    if tx.send(response).await.is_err() {
                        break Ok(());
                    }
                    continue;
                }
                Err(e) => break Err(e),
            };
            debug!(message = %line, "received");
            let request = match parse_request(&line) {
                Ok(request) => request,
                Err(response) => {
                    if tx.send(*response).await.is_err() {
                        break Ok(());
                    }
                    continue;
                }
            };

            if request.is_notification() {
                self.handle_notification(&request, &connection);
                continue;
            }

            // Handshake is answered inline so later requests observe it.
            if request.method == methods::INITIALIZE {
                let response = self.handle_initialize(request, &connection);
                if tx.send(response).await.is_err() {
                    break Ok(());
                }
                continue;
            }

            let server = self.clone();
            let connection = Arc::clone(&connection);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = server.handle_request(request, &connection).await;
                let _ = tx.send(response).await;
            });
        };

        drop(tx);
        let written = match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        };
        outcome.and(written)
    }

    fn handle_notification(&self, request: &JsonRpcRequest, connection: &Connection) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                connection.initialized.store(true, Ordering::SeqCst);
                debug!("client confirmed initialization");
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest, connection: &Connection) -> JsonRpcResponse {
        let params = request.params.unwrap_or(Value::Null);
        let params: InitializeParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::failure(
                    request.id,
                    JsonRpcError::new(codes::INVALID_PARAMS, format!("invalid initialize params: {e}")),
                );
            }
        };
        info!(
            client = %params.client_info.name,
            version = params.client_info.version.as_deref().unwrap_or("unknown"),
            protocol = %params.protocol_version,
            "client initialized"
        );
        connection.initialized.store(true, Ordering::SeqCst);

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: self.info.clone(),
        };
        respond(request.id, &result)
    }

    async fn handle_request(&self, request: JsonRpcRequest, connection: &Connection) -> JsonRpcResponse {
        let id = request.id;
        match request.method.as_str() {
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST | methods::TOOLS_CALL
                if !connection.initialized.load(Ordering::SeqCst) =>
            {
                JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(codes::SERVER_NOT_INITIALIZED, "server not initialized"),
                )
            }
            methods::TOOLS_LIST => {
                let result = ListToolsResult {
                    tools: self.registry.list().iter().map(|d| d.to_wire()).collect(),
                };
                respond(id, &result)
            }
            methods::TOOLS_CALL => {
                let params = request.params.unwrap_or(Value::Null);
                let params: CallToolParams = match serde_json::from_value(params) {
                    Ok(params) => params,
                    Err(e) => {
                        return JsonRpcResponse::failure(
                            id,
                            JsonRpcError::new(codes::INVALID_PARAMS, format!("invalid tools/call params: {e}")),
                        );
                    }
                };
                debug!(tool = %params.name, "tool call");
                let call = ToolCallRequest::new(params.name, params.arguments.unwrap_or_default());
                match self.registry.invoke(call).await.into_wire() {
                    Ok(result) => respond(id, &result),
                    Err(error) => JsonRpcResponse::failure(id, error),
                }
            }
            other => JsonRpcResponse::failure(
                id,
                JsonRpcError::new(codes::METHOD_NOT_FOUND, format!("method not found: {other}")),
            ),
        }
    }
}

fn respond(id: Option<RequestId>, result: &impl serde::Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            id,
            JsonRpcError::new(codes::INTERNAL_ERROR, format!("failed to encode result: {e}")),
        ),
    }
}

/// Stands in for a response the peer could not read back.
///
/// Tagged as an execution failure so a `tools/call` caller sees a failed
/// tool rather than a broken exchange.
fn oversized_response(id: Option<RequestId>, max: usize) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        JsonRpcError::new(
            codes::INTERNAL_ERROR,
            format!("response exceeds the {max}-byte message limit"),
        )
        .with_data(json!({ "kind": FailureKind::ExecutionError })),
    )
}

/// Parse one frame, or build the error response owed to the peer.
fn parse_request(line: &str) -> std::result::Result<JsonRpcRequest, Box<JsonRpcResponse>> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        Box::new(JsonRpcResponse::failure(
            None,
            JsonRpcError::new(codes::PARSE_ERROR, format!("parse error: {e}")),
        ))
    })?;
    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
    serde_json::from_value(value).map_err(|e| {
        Box::new(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(codes::INVALID_REQUEST, format!("invalid request: {e}")),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::McpClient;
    use crate::protocol::CallToolResult;
    use crate::registry::{ExecutionError, ToolHandler};
    use crate::schema::{InputSchema, ParamType, integer_arg};
    use crate::tool::{ToolDescriptor, ToolOutput};
    use crate::transport::MAX_MESSAGE_SIZE;
    use async_trait::async_trait;
    use serde_json::Map;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Double;

    #[async_trait]
    impl ToolHandler for Double {
        async fn execute(&self, arguments: Map<String, Value>) -> std::result::Result<ToolOutput, ExecutionError> {
            Ok(ToolOutput::json(json!(integer_arg(&arguments, "n")? * 2)))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new(
                    "double",
                    "Double a number",
                    InputSchema::empty().required("n", ParamType::Integer, ""),
                ),
                Arc::new(Double),
            )
            .unwrap();
        McpServer::new(
            Arc::new(registry),
            Implementation {
                name: "test-host".into(),
                version: None,
            },
        )
    }

    struct Peer {
        lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Peer {
        fn start() -> Self {
            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            let (their_read, their_write) = tokio::io::split(theirs);
            tokio::spawn(async move { server().serve(their_read, their_write).await });
            let (read, writer) = tokio::io::split(ours);
            Self {
                lines: BufReader::new(read).lines(),
                writer,
            }
        }

        async fn send_raw(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn call(&mut self, request: Value) -> JsonRpcResponse {
            self.send_raw(&request.to_string()).await;
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn handshake(&mut self) {
            let response = self
                .call(json!({
                    "jsonrpc": "2.0", "id": 0, "method": "initialize",
                    "params": InitializeParams::default()
                }))
                .await;
            assert!(response.error.is_none());
            self.send_raw(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .await;
        }
    }

    #[tokio::test]
    async fn initialize_reports_tools_capability() {
        let mut peer = Peer::start();
        let response = peer
            .call(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": InitializeParams::default()
            }))
            .await;
        let result: InitializeResult = serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(result.server_info.name, "test-host");
        assert!(result.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn tools_are_refused_before_handshake() {
        let mut peer = Peer::start();
        let response = peer
            .call(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await;
        assert_eq!(response.error.unwrap().code, codes::SERVER_NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn lists_and_calls_tools() {
        let mut peer = Peer::start();
        peer.handshake().await;

        let response = peer
            .call(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await;
        assert_eq!(response.id, Some(RequestId::Number(2)));
        let list: ListToolsResult = serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(list.tools.len(), 1);
        assert_eq!(list.tools[0].input_schema["required"], json!(["n"]));

        let response = peer
            .call(json!({
                "jsonrpc": "2.0", "id": "call-1", "method": "tools/call",
                "params": {"name": "double", "arguments": {"n": 21}}
            }))
            .await;
        assert_eq!(response.id, Some(RequestId::from("call-1")));
        let result: CallToolResult = serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content[0].as_text(), Some("42"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tagged_error() {
        let mut peer = Peer::start();
        peer.handshake().await;
        let response = peer
            .call(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "missing"}
            }))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);
        assert_eq!(error.data.unwrap()["kind"], "unknown_tool");
    }

    #[tokio::test]
    async fn malformed_frames_get_error_replies() {
        let mut peer = Peer::start();
        peer.send_raw("{not json").await;
        let line = peer.lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, codes::PARSE_ERROR);

        let response = peer.call(json!({"jsonrpc": "2.0", "id": 9})).await;
        assert_eq!(response.id, Some(RequestId::Number(9)));
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn oversized_frames_get_error_replies() {
        let mut peer = Peer::start();
        let padding = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let response = peer
            .call(json!({
                "jsonrpc": "2.0", "id": 5, "method": "ping",
                "params": {"padding": padding}
            }))
            .await;
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);

        let response = peer
            .call(json!({"jsonrpc": "2.0", "id": 6, "method": "ping"}))
            .await;
        assert_eq!(response.id, Some(RequestId::Number(6)));
        assert!(response.error.is_none());
    }

    #[test]
    fn oversized_response_is_a_tool_failure() {
        let response = oversized_response(Some(RequestId::Number(3)), MAX_MESSAGE_SIZE);
        assert_eq!(response.id, Some(RequestId::Number(3)));
        let error = response.error.unwrap();
        assert_eq!(error.code, codes::INTERNAL_ERROR);
        assert_eq!(error.data.unwrap()["kind"], "execution_error");
    }

    #[tokio::test]
    async fn serves_sessions_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move { server().serve_listener(listener).await });

        let first = McpClient::connect_tcp("first", &addr).await.unwrap();
        let second = McpClient::connect_tcp("second", &addr).await.unwrap();
        first.initialize().await.unwrap();
        second.initialize().await.unwrap();

        let tools = first.tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "double");

        let (a, b) = tokio::join!(
            first.call_tool("double", json!({"n": 4}).as_object().cloned()),
            second.call_tool("double", json!({"n": 50}).as_object().cloned()),
        );
        assert_eq!(a.unwrap().text(), "8");
        assert_eq!(b.unwrap().text(), "100");

        first.shutdown().await.unwrap();
        assert_eq!(second.call_tool("double", json!({"n": 1}).as_object().cloned()).await.unwrap().text(), "2");
    }

    #[tokio::test]
    async fn tcp_bind_failure_names_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = server().serve_tcp("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, Error::Bind { ref addr, .. } if *addr == format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let mut peer = Peer::start();
        let response = peer
            .call(json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}))
            .await;
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }
}
