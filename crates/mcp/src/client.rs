//! Client side of the channel: spawn or dial a host, handshake, list and
//! call tools.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RequestId, Tool, methods,
};
use crate::tool::{ToolCallRequest, ToolCallResult};
use crate::transport::{MessageReader, MessageWriter};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for a host spawned as a child process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Handshake state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Channel open, `initialize` not yet completed.
    Disconnected,
    /// Handshake done; tool traffic allowed.
    Connected,
}

/// Never held across an await, so a blocking mutex is enough and lets
/// [`PendingGuard`] clean up from `Drop`.
type Pending = Arc<std::sync::Mutex<PendingCalls>>;

/// In-flight requests keyed by correlation id.
#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
    closed: bool,
}

fn lock(pending: &Pending) -> MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's waiter when its caller stops waiting, whether it
/// got a reply, timed out, or had its future dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiters.remove(&self.id);
    }
}

/// A connection to an MCP host.
pub struct McpClient {
    name: String,
    writer: Mutex<MessageWriter>,
    pending: Pending,
    next_id: AtomicI64,
    initialized: AtomicBool,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
    reader: JoinHandle<()>,
    process: Option<Mutex<Child>>,
    timeout: Duration,
}

impl McpClient {
    /// Spawn a host process and talk to it over its stdin/stdout.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        info!(server = %config.name, command = %config.command, "spawned host process");
        let mut client = Self::connect(config.name, stdout, stdin);
        client.process = Some(Mutex::new(process));
        Ok(client)
    }

    /// Dial a host listening on TCP.
    pub async fn connect_tcp(name: impl Into<String>, addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|source| Error::Connect {
            addr: addr.to_string(),
            source,
        })?;
        info!(%addr, "connected to host");
        let (reader, writer) = stream.into_split();
        Ok(Self::connect(name, reader, writer))
    }

    /// Wrap an already-open byte channel.
    pub fn connect<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::default();
        let reader = tokio::spawn(read_loop(MessageReader::new(reader), Arc::clone(&pending)));

        Self {
            name: name.into(),
            writer: Mutex::new(MessageWriter::new(writer)),
            pending,
            next_id: AtomicI64::new(1),
            initialized: AtomicBool::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
            reader,
            process: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        if self.initialized.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Perform the handshake (must be called before other operations).
    pub async fn initialize(&self) -> Result<&Self> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request(methods::INITIALIZE, Some(params)).await?;
        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "handshake complete"
        );

        self.notify(methods::INITIALIZED).await?;

        *self.server_info.lock().await = Some(result);
        self.initialized.store(true, Ordering::SeqCst);

        // Without a catalog the connection is not usable.
        if let Err(e) = self.refresh_tools().await {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(self)
    }

    /// Get server info (after initialization).
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// Re-fetch the catalog and cache it.
    pub async fn refresh_tools(&self) -> Result<()> {
        let tools = self.list_tools().await?;
        *self.tools.lock().await = tools;
        Ok(())
    }

    /// Catalog cached by the last refresh.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Fetch the catalog from the host.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_connected()?;
        let result: ListToolsResult = self.request(methods::TOOLS_LIST, None::<()>).await?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    ///
    /// Tool-level failures come back as `Ok(ToolCallResult::Failure)`;
    /// `Err` means the exchange itself failed.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolCallResult> {
        self.ensure_connected()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let response = self.exchange(methods::TOOLS_CALL, Some(params)).await?;
        match response.into_result() {
            Ok(value) => Ok(ToolCallResult::from_call_result(serde_json::from_value(value)?)),
            Err(error) => ToolCallResult::from_rpc_error(&error).ok_or(Error::JsonRpc(error)),
        }
    }

    pub async fn invoke(&self, request: ToolCallRequest) -> Result<ToolCallResult> {
        self.call_tool(&request.tool_name, Some(request.arguments)).await
    }

    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.request(methods::PING, None::<()>).await?;
        Ok(())
    }

    /// Check if the host process is still running.
    ///
    /// Always `true` for connections this client did not spawn.
    pub async fn is_running(&self) -> bool {
        match &self.process {
            Some(process) => matches!(process.lock().await.try_wait(), Ok(None)),
            None => !self.reader.is_finished(),
        }
    }

    /// Close the channel, fail in-flight calls and stop the host process.
    pub async fn shutdown(self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);
        let _ = self.writer.lock().await.close().await;
        self.reader.abort();
        close_pending(&self.pending);

        if let Some(process) = &self.process {
            let _ = process.lock().await.kill().await;
        }
        info!(server = %self.name, "disconnected");
        Ok(())
    }

    // --- Internal methods ---

    fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(Error::NotConnected),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let response = self.exchange(method, params).await?;
        let result_value = response.into_result()?;
        Ok(serde_json::from_value(result_value)?)
    }

    /// Send a request and wait for the response carrying its id.
    async fn exchange<P>(&self, method: &str, params: Option<P>) -> Result<JsonRpcResponse>
    where
        P: serde::Serialize,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(Error::TransportClosed {
                    method: method.to_string(),
                });
            }
            pending.waiters.insert(id.clone(), tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        self.writer.lock().await.send(&request).await?;
        debug!(%id, method, "sent request");

        match timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::TransportClosed {
                method: method.to_string(),
            }),
            Err(_) => Err(Error::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notification = JsonRpcRequest::notification(method);
        self.writer.lock().await.send(&notification).await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut reader: MessageReader, pending: Pending) {
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => dispatch(&line, &pending),
            Ok(None) => {
                debug!("host closed the channel");
                break;
            }
            // The reply is lost; its caller times out.
            Err(Error::OutputTooLarge { max }) => {
                warn!(max, "discarded oversized message from host");
            }
            Err(e) => {
                warn!(error = %e, "failed to read from host");
                break;
            }
        }
    }
    close_pending(&pending);
}

fn dispatch(line: &str, pending: &Pending) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "discarding unparseable message");
            return;
        }
    };
    if value.get("method").is_some() {
        debug!(message = %line, "ignoring host-initiated message");
        return;
    }

    let response: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "discarding malformed response");
            return;
        }
    };
    let Some(id) = response.id.clone() else {
        warn!(error = ?response.error, "host reported an uncorrelated error");
        return;
    };

    let waiter = lock(pending).waiters.remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => warn!(%id, "response for unknown request"),
    }
}

/// Drop every waiter so in-flight calls fail with `TransportClosed`.
fn close_pending(pending: &Pending) {
    let mut pending = lock(pending);
    pending.closed = true;
    pending.waiters.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        Implementation, JsonRpcError, PROTOCOL_VERSION, ServerCapabilities, codes,
    };
    use crate::registry::{ExecutionError, ToolHandler, ToolRegistry};
    use crate::schema::{InputSchema, ParamType, integer_arg};
    use crate::server::McpServer;
    use crate::tool::{FailureKind, ToolDescriptor, ToolOutput};
    use crate::transport::MAX_MESSAGE_SIZE;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct Add;

    #[async_trait]
    impl ToolHandler for Add {
        async fn execute(&self, arguments: Map<String, Value>) -> std::result::Result<ToolOutput, ExecutionError> {
            let a = integer_arg(&arguments, "a")?;
            let b = integer_arg(&arguments, "b")?;
            Ok(ToolOutput::json(json!(a + b)))
        }
    }

    fn connected_pair() -> McpClient {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new(
                    "add",
                    "Add two numbers together",
                    InputSchema::empty()
                        .required("a", ParamType::Integer, "")
                        .required("b", ParamType::Integer, ""),
                ),
                Arc::new(Add),
            )
            .unwrap();
        let server = McpServer::new(
            Arc::new(registry),
            Implementation {
                name: "test-host".into(),
                version: None,
            },
        );

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (their_read, their_write) = tokio::io::split(theirs);
        tokio::spawn(async move { server.serve(their_read, their_write).await });
        let (read, write) = tokio::io::split(ours);
        McpClient::connect("test", read, write)
    }

    fn args(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn server_config_creation() {
        let config = ServerConfig {
            name: "test".to_string(),
            command: "kb-host".to_string(),
            args: vec!["--transport".to_string(), "stdio".to_string()],
            env: HashMap::new(),
        };
        assert_eq!(config.name, "test");
    }

    #[tokio::test]
    async fn calls_before_handshake_are_rejected() {
        let client = connected_pair();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(client.list_tools().await, Err(Error::NotConnected)));
        assert!(matches!(
            client.call_tool("add", None).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn handshake_then_list_and_call() {
        let client = connected_pair();
        client.initialize().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);

        let tools = client.tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(client.list_tools().await.unwrap(), tools);

        let result = client
            .call_tool("add", args(json!({"a": 2, "b": 3})))
            .await
            .unwrap();
        assert_eq!(result.structured(), Some(&json!(5)));
    }

    #[tokio::test]
    async fn tool_failures_keep_their_kind() {
        let client = connected_pair();
        client.initialize().await.unwrap();

        let result = client.call_tool("nonexistent", None).await.unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::UnknownTool));

        let result = client
            .invoke(ToolCallRequest::new("add", args(json!({"a": "x", "b": 3})).unwrap()))
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidArguments));
        assert!(result.text().contains("`a`"));
    }

    #[tokio::test]
    async fn concurrent_calls_are_correlated() {
        let client = connected_pair();
        client.initialize().await.unwrap();

        let (x, y, z) = tokio::join!(
            client.call_tool("add", args(json!({"a": 1, "b": 1}))),
            client.call_tool("add", args(json!({"a": 10, "b": 10}))),
            client.call_tool("add", args(json!({"a": 100, "b": 100}))),
        );
        assert_eq!(x.unwrap().text(), "2");
        assert_eq!(y.unwrap().text(), "20");
        assert_eq!(z.unwrap().text(), "200");
    }

    /// A host that answers two pings in reverse order.
    #[tokio::test]
    async fn out_of_order_replies_reach_their_callers() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (their_read, mut their_write) = tokio::io::split(theirs);
        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            let mut ids = Vec::new();
            while ids.len() < 2 {
                let line = lines.next_line().await.unwrap().unwrap();
                let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
                ids.push(request.id.unwrap());
            }
            for id in ids.into_iter().rev() {
                let response = JsonRpcResponse::success(Some(id.clone()), json!({ "echo": id }));
                let line = serde_json::to_string(&response).unwrap();
                their_write.write_all(line.as_bytes()).await.unwrap();
                their_write.write_all(b"\n").await.unwrap();
            }
            // Keep the channel open until the test finishes.
            let _ = lines.next_line().await;
        });

        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("rev", read, write);
        let (first, second) = tokio::join!(
            client.exchange(methods::PING, None::<()>),
            client.exchange(methods::PING, None::<()>),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.result.unwrap()["echo"], json!(first.id.unwrap()));
        assert_eq!(second.result.unwrap()["echo"], json!(second.id.unwrap()));
    }

    #[tokio::test]
    async fn stalled_host_times_out() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("stalled", read, write).with_timeout(Duration::from_millis(50));

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { ref method, .. } if method == "ping"));
        drop(theirs);
    }

    #[tokio::test]
    async fn abandoned_calls_release_their_waiters() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("silent", read, write);

        for _ in 0..5 {
            let abandoned = tokio::time::timeout(Duration::from_millis(10), client.ping()).await;
            assert!(abandoned.is_err());
        }
        assert!(lock(&client.pending).waiters.is_empty());
        drop(theirs);
    }

    /// A host whose `initialize` succeeds but whose `tools/list` fails.
    #[tokio::test]
    async fn failed_catalog_fetch_leaves_client_disconnected() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (their_read, mut their_write) = tokio::io::split(theirs);
        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
                let Some(id) = request.id else { continue };
                let response = if request.method == methods::INITIALIZE {
                    let result = InitializeResult {
                        protocol_version: PROTOCOL_VERSION.to_string(),
                        capabilities: ServerCapabilities::default(),
                        server_info: Implementation {
                            name: "broken".into(),
                            version: None,
                        },
                    };
                    JsonRpcResponse::success(Some(id), serde_json::to_value(result).unwrap())
                } else {
                    JsonRpcResponse::failure(
                        Some(id),
                        JsonRpcError::new(codes::INTERNAL_ERROR, "catalog unavailable"),
                    )
                };
                let line = serde_json::to_string(&response).unwrap();
                their_write.write_all(line.as_bytes()).await.unwrap();
                their_write.write_all(b"\n").await.unwrap();
            }
        });

        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("broken", read, write);
        let err = client.initialize().await.err().unwrap();
        assert!(matches!(err, Error::JsonRpc(ref e) if e.code == codes::INTERNAL_ERROR));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(client.call_tool("add", None).await, Err(Error::NotConnected)));
    }

    /// A host that sends an unreadably long line before a normal reply.
    #[tokio::test]
    async fn oversized_frame_from_host_is_skipped() {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (their_read, mut their_write) = tokio::io::split(theirs);
        tokio::spawn(async move {
            let mut lines = BufReader::new(their_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();

            let junk = "z".repeat(MAX_MESSAGE_SIZE + 1);
            their_write.write_all(junk.as_bytes()).await.unwrap();
            their_write.write_all(b"\n").await.unwrap();

            let response = JsonRpcResponse::success(request.id, json!({}));
            let line = serde_json::to_string(&response).unwrap();
            their_write.write_all(line.as_bytes()).await.unwrap();
            their_write.write_all(b"\n").await.unwrap();
            let _ = lines.next_line().await;
        });

        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("noisy", read, write);
        client.ping().await.unwrap();
        assert!(client.is_running().await);
    }

    #[tokio::test]
    async fn closed_channel_fails_in_flight_calls() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(ours);
        let client = McpClient::connect("closing", read, write);

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(theirs);
        });
        let err = client.ping().await.unwrap_err();
        closer.await.unwrap();
        assert!(matches!(
            err,
            Error::TransportClosed { .. } | Error::Io(_)
        ));

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed { .. } | Error::Io(_)));
    }

    #[tokio::test]
    async fn host_protocol_errors_surface_as_json_rpc() {
        let client = connected_pair();
        let err = client
            .request::<(), Value>("resources/list", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JsonRpc(ref e) if e.code == codes::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn shutdown_disconnects() {
        let client = connected_pair();
        client.initialize().await.unwrap();
        client.shutdown().await.unwrap();
    }
}
