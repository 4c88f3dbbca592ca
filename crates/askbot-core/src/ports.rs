use crate::{domain::UserId, Result};

/// Hexagonal port for the response-generation collaborator.
///
/// The tracker core never generates text itself; the host supplies an
/// implementation (an LLM backend, a canned responder, a test fake) and calls
/// it between the two phases of a submit.
#[async_trait::async_trait]
pub trait ResponderPort: Send + Sync {
    async fn respond(&self, user_id: UserId, prompt: &str) -> Result<String>;
}
