//! The tool trait agents execute on behalf of their reasoner.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;

use taskmesh_core::{TaskmeshResult, ToolSpec};

/// An executable capability owned by one agent service.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Description the reasoner sees.
    fn spec(&self) -> &ToolSpec;

    /// Runs the tool with JSON arguments.
    async fn invoke(&self, arguments: Value) -> TaskmeshResult<String>;
}

type ToolFn = Box<dyn Fn(Value) -> BoxFuture<'static, TaskmeshResult<String>> + Send + Sync>;

/// A [`Tool`] built from a spec and an async closure, for tools that
/// do not warrant their own type.
pub struct FnTool {
    spec: ToolSpec,
    handler: ToolFn,
}

impl FnTool {
    /// Wraps `handler` as a tool.
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskmeshResult<String>> + Send + 'static,
    {
        Self {
            spec,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, arguments: Value) -> TaskmeshResult<String> {
        (self.handler)(arguments).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fn_tool_invokes_closure() {
        let tool = FnTool::new(
            ToolSpec::new("echo", "Repeats its input."),
            |args: Value| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            },
        );

        assert_eq!(tool.spec().name, "echo");
        let out = tool.invoke(json!({"text": "hello"})).await.unwrap();
        assert_eq!(out, "hello");
    }
}
