//! Tool host trait.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// Something that can run the tools the model asks for.
///
/// The session only sees this seam; whether calls cross a process
/// boundary is up to the implementation.
pub trait ToolHost: Send + Sync {
    /// Catalog offered to the model, in host order.
    fn specs(&self) -> &[ToolSpec];

    /// Run one call. Tool-level failures are `Err`, never panics.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;

    /// Release the connection to the host.
    fn shutdown(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async {}
    }
}
