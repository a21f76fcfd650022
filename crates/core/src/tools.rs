//! Auxiliary tool-servers the realtime model can call into.

use crate::{
    error::AgentError,
    generic_types::{ToolCall, ToolDeclaration, ToolResult},
};
use async_trait::async_trait;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{info, warn};

/// How long a single tool call may run before the model is told it failed.
pub const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// An external process exposing callable tools.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;
    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>, AgentError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError>;
}

/// The tools of a session, indexed by tool name.
pub struct ToolSet {
    declarations: Vec<ToolDeclaration>,
    routes: HashMap<String, Arc<dyn ToolServer>>,
    call_timeout: Duration,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            declarations: Vec::new(),
            routes: HashMap::new(),
            call_timeout: DEFAULT_TOOL_CALL_TIMEOUT,
        }
    }
}

impl ToolSet {
    /// Lists the tools of every server. A server that cannot list its tools
    /// is left out; the first server to declare a tool name owns it.
    pub async fn collect(servers: &[Arc<dyn ToolServer>]) -> Self {
        let mut set = Self::default();
        for server in servers {
            let tools = match server.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %server.name(), error = %e, "Skipping tool-server: listing tools failed");
                    continue;
                }
            };
            info!(server = %server.name(), count = tools.len(), "Registered tool-server tools");
            for tool in tools {
                if set.routes.contains_key(&tool.name) {
                    warn!(server = %server.name(), tool = %tool.name, "Duplicate tool name ignored");
                    continue;
                }
                set.routes.insert(tool.name.clone(), server.clone());
                set.declarations.push(tool);
            }
        }
        set
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Runs one call. Failures and timeouts are reported to the model in the
    /// result payload.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let output = match self.routes.get(&call.name) {
            None => json!({ "error": format!("Unknown tool '{}'", call.name) }),
            Some(server) => {
                info!(server = %server.name(), tool = %call.name, "Executing tool call");
                let pending = server.call_tool(&call.name, call.arguments);
                match tokio::time::timeout(self.call_timeout, pending).await {
                    Ok(Ok(text)) => json!({ "output": text }),
                    Ok(Err(e)) => {
                        warn!(tool = %call.name, error = %e, "Tool call failed");
                        json!({ "error": e.to_string() })
                    }
                    Err(_) => {
                        warn!(tool = %call.name, timeout = ?self.call_timeout, "Tool call timed out");
                        json!({
                            "error": format!(
                                "Tool '{}' timed out after {}ms",
                                call.name,
                                self.call_timeout.as_millis()
                            )
                        })
                    }
                }
            }
        };
        ToolResult {
            id: call.id,
            name: call.name,
            output,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A tool-server that echoes its arguments back.
    pub(crate) struct EchoServer {
        pub name: String,
        pub tools: Vec<&'static str>,
        pub fail_listing: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl EchoServer {
        pub(crate) fn new(name: &str, tools: Vec<&'static str>) -> Self {
            Self {
                name: name.to_string(),
                tools,
                fail_listing: false,
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ToolServer for EchoServer {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<ToolDeclaration>, AgentError> {
            if self.fail_listing {
                return Err(AgentError::ToolServer {
                    name: self.name.clone(),
                    message: "not running".into(),
                });
            }
            Ok(self
                .tools
                .iter()
                .map(|t| ToolDeclaration {
                    name: t.to_string(),
                    description: format!("{t} tool"),
                    parameters: json!({ "type": "object" }),
                })
                .collect())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<String, AgentError> {
            self.calls.lock().unwrap().push(name.to_string());
            if name == "hang" {
                std::future::pending::<()>().await;
            }
            if name == "explode" {
                return Err(AgentError::ToolServer {
                    name: self.name.clone(),
                    message: "boom".into(),
                });
            }
            Ok(arguments.to_string())
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call-1".into(),
            name: name.into(),
            arguments: json!({ "q": "rust" }),
        }
    }

    #[tokio::test]
    async fn test_collect_skips_failing_servers_and_duplicates() {
        let github: Arc<dyn ToolServer> =
            Arc::new(EchoServer::new("github", vec!["search_repositories", "get_issue"]));
        let mut broken = EchoServer::new("reddit", vec!["search_posts"]);
        broken.fail_listing = true;
        let shadow: Arc<dyn ToolServer> = Arc::new(EchoServer::new("other", vec!["get_issue"]));

        let set = ToolSet::collect(&[github, Arc::new(broken) as Arc<dyn ToolServer>, shadow]).await;
        let names: Vec<_> = set.declarations().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["search_repositories", "get_issue"]);
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_owner() {
        let github = Arc::new(EchoServer::new("github", vec!["search_repositories"]));
        let set = ToolSet::collect(&[github.clone() as Arc<dyn ToolServer>]).await;

        let result = set.dispatch(call("search_repositories")).await;
        assert_eq!(result.id, "call-1");
        assert_eq!(result.output, json!({ "output": "{\"q\":\"rust\"}" }));
        assert_eq!(*github.calls.lock().unwrap(), vec!["search_repositories"]);
    }

    #[tokio::test]
    async fn test_dispatch_reports_errors_in_payload() {
        let github = Arc::new(EchoServer::new("github", vec!["explode"]));
        let set = ToolSet::collect(&[github as Arc<dyn ToolServer>]).await;

        let unknown = set.dispatch(call("missing")).await;
        assert_eq!(unknown.output, json!({ "error": "Unknown tool 'missing'" }));

        let failed = set.dispatch(call("explode")).await;
        assert_eq!(
            failed.output,
            json!({ "error": "Tool-server 'github' failed: boom" })
        );
    }

    #[tokio::test]
    async fn test_dispatch_times_out_hung_calls() {
        let github = Arc::new(EchoServer::new("github", vec!["hang"]));
        let set = ToolSet::collect(&[github as Arc<dyn ToolServer>])
            .await
            .with_call_timeout(Duration::from_millis(50));

        let result = tokio::time::timeout(Duration::from_secs(2), set.dispatch(call("hang")))
            .await
            .expect("dispatch ignored its timeout");
        assert_eq!(result.id, "call-1");
        assert_eq!(
            result.output,
            json!({ "error": "Tool 'hang' timed out after 50ms" })
        );
    }

    #[tokio::test]
    async fn test_empty_set() {
        let set = ToolSet::collect(&[]).await;
        assert!(set.is_empty());
    }
}
