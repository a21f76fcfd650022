//! Conversational identities an agent session can be started with.

use crate::{error::AgentError, session::SessionHandle};
use async_trait::async_trait;

/// Fixed instructions plus one scripted opening action.
///
/// Implementations hold no state. `on_enter` runs exactly once, when the
/// session becomes active and before any user audio is processed.
#[async_trait]
pub trait Persona: Send + Sync {
    /// The system instructions for the language model.
    fn instructions(&self) -> &str;

    /// Steering for the opening greeting.
    fn greeting_instructions(&self) -> &str;

    /// Asks the model to greet the caller. Errors go to the caller unchanged.
    async fn on_enter(&self, session: &SessionHandle) -> Result<(), AgentError> {
        session.generate_reply(self.greeting_instructions()).await
    }
}
