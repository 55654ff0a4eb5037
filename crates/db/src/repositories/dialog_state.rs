use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use scoop_core::domain::conversation::ConversationId;
use scoop_core::flows::DialogStack;

use super::{DialogStateRepository, RepositoryError};
use crate::DbPool;

/// One row per conversation; the stack is stored as JSON and replaced on every save.
pub struct SqlDialogStateRepository {
    pool: DbPool,
}

impl SqlDialogStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_stack(row: &sqlx::sqlite::SqliteRow) -> Result<DialogStack, RepositoryError> {
    let stack_json: String =
        row.try_get("stack_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&stack_json).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl DialogStateRepository for SqlDialogStateRepository {
    async fn load(&self, id: &ConversationId) -> Result<DialogStack, RepositoryError> {
        let row = sqlx::query("SELECT stack_json FROM dialog_state WHERE conversation_id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => decode_stack(r),
            None => Ok(DialogStack::new()),
        }
    }

    async fn save(&self, id: &ConversationId, stack: &DialogStack) -> Result<(), RepositoryError> {
        let stack_json =
            serde_json::to_string(stack).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let depth = i64::try_from(stack.depth())
            .map_err(|e| RepositoryError::Decode(format!("frame depth overflow: {e}")))?;

        sqlx::query(
            "INSERT INTO dialog_state
                 (conversation_id, stack_json, frame_depth, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 stack_json = excluded.stack_json,
                 frame_depth = excluded.frame_depth,
                 updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(&stack_json)
        .bind(depth)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            event_name = "db.dialog_state.saved",
            conversation_id = %id,
            frame_depth = depth,
            "dialog state persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use scoop_core::domain::conversation::ConversationId;
    use scoop_core::domain::order::{ItemKind, OrderRecord};
    use scoop_core::flows::{DialogManager, DialogStack, FlowId, TurnInput};

    use super::SqlDialogStateRepository;
    use crate::repositories::{DialogStateRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SqlDialogStateRepository) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (pool.clone(), SqlDialogStateRepository::new(pool))
    }

    #[tokio::test]
    async fn missing_row_loads_as_empty_stack() {
        let (_pool, repo) = setup().await;

        let stack = repo.load(&ConversationId::new("conv-new")).await.expect("load");

        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_returns_the_same_stack() {
        let (_pool, repo) = setup().await;
        let id = ConversationId::new("conv-1");
        let manager = DialogManager::default();
        let outcome = manager.process_turn(DialogStack::new(), &TurnInput::text("large cone"));

        repo.save(&id, &outcome.stack).await.expect("save");
        let loaded = repo.load(&id).await.expect("load");

        assert_eq!(loaded, outcome.stack);
        assert_eq!(loaded.suspended_frames(), 1);
    }

    #[tokio::test]
    async fn save_overwrites_previous_state_and_tracks_depth() {
        let (pool, repo) = setup().await;
        let id = ConversationId::new("conv-2");
        let mut stack = DialogStack::new();
        stack.push(FlowId::Root, OrderRecord::default());
        stack.push(
            FlowId::Order,
            OrderRecord { item_kind: Some(ItemKind::Cup), ..OrderRecord::default() },
        );
        repo.save(&id, &stack).await.expect("first save");

        repo.save(&id, &DialogStack::new()).await.expect("second save");

        assert!(repo.load(&id).await.expect("load").is_empty());
        let row = sqlx::query(
            "SELECT COUNT(*) AS count, MAX(frame_depth) AS depth FROM dialog_state
             WHERE conversation_id = ?",
        )
        .bind(id.as_str())
        .fetch_one(&pool)
        .await
        .expect("count rows");
        assert_eq!(row.get::<i64, _>("count"), 1);
        assert_eq!(row.get::<i64, _>("depth"), 0);
    }

    #[tokio::test]
    async fn corrupt_json_surfaces_as_decode_error() {
        let (pool, repo) = setup().await;
        sqlx::query(
            "INSERT INTO dialog_state
                 (conversation_id, stack_json, frame_depth, created_at, updated_at)
             VALUES ('conv-bad', '{not json', 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert corrupt row");

        let error = repo.load(&ConversationId::new("conv-bad")).await.expect_err("decode");

        assert!(matches!(error, RepositoryError::Decode(_)));
    }
}
