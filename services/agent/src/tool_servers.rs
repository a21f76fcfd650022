//! Tool-server descriptors built from configuration, and their launch as
//! MCP child processes.
//!
//! A tool-server whose credentials are absent is never described, and one
//! that fails to launch is left out of the session with a warning.

use crate::config::Config;
use agent_core::{
    AgentError,
    generic_types::ToolDeclaration,
    tools::ToolServer,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, RawContent},
    service::{RoleClient, RunningService},
    transport::child_process::TokioChildProcess,
};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::{process::Command, time::timeout};
use tracing::{info, warn};

/// Covers spawning the child and the MCP handshake; `npx` may download the
/// server package first.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
/// Covers one `tools/list` or `tools/call` round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The tool-servers this agent knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolServerKind {
    Github,
    Reddit,
}

impl ToolServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolServerKind::Github => "github",
            ToolServerKind::Reddit => "reddit",
        }
    }
}

impl FromStr for ToolServerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(ToolServerKind::Github),
            "reddit" => Ok(ToolServerKind::Reddit),
            other => Err(format!("unknown tool-server '{}'", other)),
        }
    }
}

/// How to start one tool-server process.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolServerDescriptor {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl fmt::Debug for ToolServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut env_keys: Vec<&str> = self.env.keys().map(String::as_str).collect();
        env_keys.sort_unstable();
        f.debug_struct("ToolServerDescriptor")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Describes every enabled tool-server whose credentials are configured.
pub fn descriptors(config: &Config) -> Vec<ToolServerDescriptor> {
    config
        .tool_servers
        .iter()
        .filter_map(|kind| {
            let descriptor = describe(*kind, config);
            if descriptor.is_none() {
                info!(
                    tool_server = kind.as_str(),
                    "Credentials not set; tool-server disabled"
                );
            }
            descriptor
        })
        .collect()
}

fn describe(kind: ToolServerKind, config: &Config) -> Option<ToolServerDescriptor> {
    match kind {
        ToolServerKind::Github => {
            let token = config.github_token.clone()?;
            Some(ToolServerDescriptor {
                name: kind.as_str().to_string(),
                command: "npx".to_string(),
                args: vec![
                    "-y".to_string(),
                    "@modelcontextprotocol/server-github".to_string(),
                ],
                env: HashMap::from([("GITHUB_PERSONAL_ACCESS_TOKEN".to_string(), token)]),
            })
        }
        ToolServerKind::Reddit => {
            let reddit = config.reddit.as_ref()?;
            Some(ToolServerDescriptor {
                name: kind.as_str().to_string(),
                command: "uv".to_string(),
                args: vec![
                    "--directory".to_string(),
                    reddit.server_dir.display().to_string(),
                    "run".to_string(),
                    "server.py".to_string(),
                ],
                env: HashMap::from([
                    ("REDDIT_CLIENT_ID".to_string(), reddit.client_id.clone()),
                    ("REDDIT_CLIENT_SECRET".to_string(), reddit.client_secret.clone()),
                    ("REDDIT_USERNAME".to_string(), reddit.username.clone()),
                    ("REDDIT_PASSWORD".to_string(), reddit.password.clone()),
                ]),
            })
        }
    }
}

/// Starts tool-servers from their descriptors.
#[async_trait]
pub trait ToolServerLauncher: Send + Sync {
    async fn launch(&self, descriptor: &ToolServerDescriptor) -> Result<Arc<dyn ToolServer>>;
}

/// Launches each descriptor as an MCP server over the child's stdio.
#[derive(Debug, Clone, Copy)]
pub struct McpLauncher {
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for McpLauncher {
    fn default() -> Self {
        Self {
            startup_timeout: STARTUP_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[async_trait]
impl ToolServerLauncher for McpLauncher {
    async fn launch(&self, descriptor: &ToolServerDescriptor) -> Result<Arc<dyn ToolServer>> {
        Ok(Arc::new(McpToolServer::spawn(descriptor, self).await?))
    }
}

/// Launches every descriptor, skipping the ones that fail.
pub async fn launch_all(
    launcher: &dyn ToolServerLauncher,
    descriptors: &[ToolServerDescriptor],
) -> Vec<Arc<dyn ToolServer>> {
    let mut servers = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        match launcher.launch(descriptor).await {
            Ok(server) => servers.push(server),
            Err(e) => warn!(
                tool_server = %descriptor.name,
                error = format!("{e:#}"),
                "Failed to launch tool-server; continuing without it"
            ),
        }
    }
    servers
}

/// A tool-server running as a child process, spoken to over MCP.
///
/// Dropping it shuts the transport down and kills the child.
pub struct McpToolServer {
    name: String,
    service: RunningService<RoleClient, ()>,
    request_timeout: Duration,
}

impl McpToolServer {
    /// Wraps an initialized MCP client session.
    pub fn from_service(
        name: impl Into<String>,
        service: RunningService<RoleClient, ()>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            service,
            request_timeout,
        }
    }

    /// Spawns the descriptor's command and completes the MCP handshake. A
    /// child that does not finish the handshake in time is killed.
    pub async fn spawn(descriptor: &ToolServerDescriptor, launcher: &McpLauncher) -> Result<Self> {
        info!(
            tool_server = %descriptor.name,
            command = %descriptor.command,
            args = ?descriptor.args,
            "Spawning MCP tool-server"
        );
        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args).envs(&descriptor.env);

        let transport = TokioChildProcess::new(cmd).with_context(|| {
            format!("Failed to spawn tool-server '{}'", descriptor.name)
        })?;
        let service = timeout(launcher.startup_timeout, ().serve(transport))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Tool-server '{}' did not finish the MCP handshake within {:?}",
                    descriptor.name,
                    launcher.startup_timeout
                )
            })?
            .with_context(|| {
                format!("Failed to initialize MCP session with '{}'", descriptor.name)
            })?;

        Ok(Self::from_service(
            descriptor.name.clone(),
            service,
            launcher.request_timeout,
        ))
    }

    fn error(&self, message: impl fmt::Display) -> AgentError {
        AgentError::ToolServer {
            name: self.name.clone(),
            message: message.to_string(),
        }
    }

    fn timed_out(&self, request: &str) -> AgentError {
        self.error(format!(
            "{request} timed out after {}ms",
            self.request_timeout.as_millis()
        ))
    }
}

#[async_trait]
impl ToolServer for McpToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>, AgentError> {
        let tools = timeout(self.request_timeout, self.service.list_all_tools())
            .await
            .map_err(|_| self.timed_out("tools/list"))?
            .map_err(|e| self.error(e))?;
        Ok(tools
            .into_iter()
            .map(|t| ToolDeclaration {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                parameters: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, AgentError> {
        let request = self.service.peer().call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: arguments.as_object().cloned(),
        });
        let result = timeout(self.request_timeout, request)
            .await
            .map_err(|_| self.timed_out(&format!("tools/call '{name}'")))?
            .map_err(|e| self.error(e))?;

        let text = result
            .content
            .unwrap_or_default()
            .into_iter()
            .filter_map(|content| match content.raw {
                RawContent::Text(text_content) => Some(text_content.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error == Some(true) {
            return Err(self.error(text));
        }
        Ok(text)
    }
}
