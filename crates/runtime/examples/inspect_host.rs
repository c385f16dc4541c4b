//! Connect to a tool host, print its translated catalog and run one call.
//!
//! Run with: cargo run --example inspect_host -- [path/to/kb-host]

use std::collections::HashMap;
use std::time::Duration;

use mcp::ServerConfig;
use runtime::{McpToolHost, ToolCall, ToolHost};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let command = std::env::args().nth(1).unwrap_or_else(|| "kb-host".to_string());
    let config = ServerConfig {
        name: "knowledge-base".to_string(),
        command,
        args: vec![],
        env: HashMap::new(),
    };

    println!("Spawning tool host: {}", config.command);
    let host = McpToolHost::spawn(config, Duration::from_secs(15)).await?;

    println!("\nDiscovered {} tools:", host.specs().len());
    for spec in host.specs() {
        println!("  - {}: {}", spec.name, spec.description);
        println!("    {}", spec.function_json());
    }

    let call = ToolCall {
        id: "call_1".to_string(),
        name: "add".to_string(),
        input: serde_json::json!({"a": 25, "b": 17}),
    };
    match host.execute(&call).await {
        Ok(output) => println!("\nadd(25, 17) = {output}"),
        Err(e) => println!("\nadd failed: {e}"),
    }

    host.shutdown().await;
    Ok(())
}
