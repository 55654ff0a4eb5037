use std::collections::HashMap;

use tokio::sync::RwLock;

use scoop_core::domain::conversation::ConversationId;
use scoop_core::flows::DialogStack;

use super::{DialogStateRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryDialogStateRepository {
    stacks: RwLock<HashMap<ConversationId, DialogStack>>,
}

impl InMemoryDialogStateRepository {
    pub async fn conversation_count(&self) -> usize {
        self.stacks.read().await.len()
    }
}

#[async_trait::async_trait]
impl DialogStateRepository for InMemoryDialogStateRepository {
    async fn load(&self, id: &ConversationId) -> Result<DialogStack, RepositoryError> {
        let stacks = self.stacks.read().await;
        Ok(stacks.get(id).cloned().unwrap_or_default())
    }

    async fn save(&self, id: &ConversationId, stack: &DialogStack) -> Result<(), RepositoryError> {
        let mut stacks = self.stacks.write().await;
        stacks.insert(id.clone(), stack.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scoop_core::domain::conversation::ConversationId;
    use scoop_core::domain::order::OrderRecord;
    use scoop_core::flows::{DialogStack, FlowId};

    use super::InMemoryDialogStateRepository;
    use crate::repositories::DialogStateRepository;

    #[tokio::test]
    async fn unknown_conversation_loads_an_empty_stack() {
        let repo = InMemoryDialogStateRepository::default();

        let stack = repo.load(&ConversationId::new("never-seen")).await.expect("load");

        assert!(stack.is_empty());
        assert_eq!(repo.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn saved_stack_is_returned_per_conversation() {
        let repo = InMemoryDialogStateRepository::default();
        let mut stack = DialogStack::new();
        stack.push(FlowId::Root, OrderRecord::default());

        repo.save(&ConversationId::new("a"), &stack).await.expect("save");

        assert_eq!(repo.load(&ConversationId::new("a")).await.expect("load a"), stack);
        assert!(repo.load(&ConversationId::new("b")).await.expect("load b").is_empty());
    }
}
