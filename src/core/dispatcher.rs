//! Concurrent execution of one batch of model-requested tool calls.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use crate::core::aggregator::ToolCallRequest;
use crate::core::sink::OutputSink;
use crate::core::tool_result::ToolExecutionOutcome;
use crate::mcp::ToolService;

/// The normalized result of one call, tagged with the id it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub outcome: ToolExecutionOutcome,
    pub content: String,
}

impl ToolCallResult {
    fn new(call: &ToolCallRequest, outcome: ToolExecutionOutcome) -> Self {
        let content = outcome.normalize();
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome,
            content,
        }
    }
}

pub struct ToolDispatcher {
    service: Arc<dyn ToolService>,
    context_tools: Vec<String>,
    resource_argument: String,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        service: Arc<dyn ToolService>,
        context_tools: Vec<String>,
        resource_argument: String,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            context_tools,
            resource_argument,
            timeout,
        }
    }

    pub fn service(&self) -> &Arc<dyn ToolService> {
        &self.service
    }

    /// Runs every call at once and returns results in the order of `calls`.
    /// A failing call never affects its siblings.
    pub async fn dispatch(
        &self,
        calls: &[ToolCallRequest],
        selected_resource: Option<&str>,
        sink: &dyn OutputSink,
    ) -> Vec<ToolCallResult> {
        tracing::debug!(calls = calls.len(), "Dispatching tool calls");
        join_all(
            calls
                .iter()
                .map(|call| self.execute(call, selected_resource, sink)),
        )
        .await
    }

    async fn execute(
        &self,
        call: &ToolCallRequest,
        selected_resource: Option<&str>,
        sink: &dyn OutputSink,
    ) -> ToolCallResult {
        let mut arguments = match call.parse_arguments() {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err.detail, "Rejecting tool call arguments");
                return ToolCallResult::new(call, ToolExecutionOutcome::error(err.to_string()));
            }
        };
        self.inject_resource(&call.name, &mut arguments, selected_resource);

        let notice = format!(
            "🤖 Calling `{}` with {}",
            call.name,
            Value::Object(arguments.clone())
        );
        if let Err(err) = sink.send_text(&notice).await {
            tracing::warn!(tool = %call.name, error = %err, "Could not deliver tool progress notice");
        }

        let outcome =
            match tokio::time::timeout(self.timeout, self.service.call_tool(&call.name, arguments))
                .await
            {
                Ok(Ok(result)) => ToolExecutionOutcome::from_call_result(&result),
                Ok(Err(err)) => {
                    tracing::warn!(tool = %call.name, error = %err, "Tool call failed");
                    ToolExecutionOutcome::error(err)
                }
                Err(_) => {
                    tracing::warn!(tool = %call.name, timeout = ?self.timeout, "Tool call timed out");
                    ToolExecutionOutcome::error(format!(
                        "Tool `{}` timed out after {} seconds.",
                        call.name,
                        self.timeout.as_secs()
                    ))
                }
            };

        ToolCallResult::new(call, outcome)
    }

    fn inject_resource(
        &self,
        tool_name: &str,
        arguments: &mut Map<String, Value>,
        selected_resource: Option<&str>,
    ) {
        let Some(resource) = selected_resource.filter(|value| !value.is_empty()) else {
            return;
        };
        if self.context_tools.iter().any(|name| name == tool_name) {
            arguments.insert(
                self.resource_argument.clone(),
                Value::String(resource.to_string()),
            );
        }
    }
}
