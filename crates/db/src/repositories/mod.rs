use async_trait::async_trait;
use thiserror::Error;

use scoop_core::domain::conversation::ConversationId;
use scoop_core::flows::DialogStack;

pub mod dialog_state;
pub mod memory;

pub use dialog_state::SqlDialogStateRepository;
pub use memory::InMemoryDialogStateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable home of each conversation's dialog stack.
#[async_trait]
pub trait DialogStateRepository: Send + Sync {
    /// Returns the stored stack, or an empty one for a conversation never seen before.
    async fn load(&self, id: &ConversationId) -> Result<DialogStack, RepositoryError>;
    async fn save(&self, id: &ConversationId, stack: &DialogStack) -> Result<(), RepositoryError>;
}
