use std::fmt::Display;

/// Errors raised while connecting, assembling or running a session.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Session is missing a {0} component")]
    MissingComponent(&'static str),
    #[error("{component} component failed: {message}")]
    Component {
        component: &'static str,
        message: String,
    },
    #[error("Tool-server '{name}' failed: {message}")]
    ToolServer { name: String, message: String },
    #[error("Session task aborted: {0}")]
    Aborted(String),
    #[error("Session closed")]
    Closed,
}

impl AgentError {
    /// Wraps a vendor error as a failure of the named component.
    pub fn component(component: &'static str, err: impl Display) -> Self {
        Self::Component {
            component,
            message: err.to_string(),
        }
    }
}
