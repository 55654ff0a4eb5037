use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use scoop_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use scoop_core::domain::conversation::ConversationId;
use scoop_core::domain::order::RecognizedOrder;
use scoop_core::errors::{ApplicationError, InterfaceError};
use scoop_core::flows::{DialogManager, DialogStack, TurnInput, TurnOutcome, TurnStatus};
use scoop_core::pricing::PriceCalculator;
use scoop_db::{DialogStateRepository, RepositoryError};

use crate::recognizer::IntentRecognizer;

const RUNTIME_ACTOR: &str = "dialog-runtime";

/// What the caller renders after one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub correlation_id: String,
    pub messages: Vec<String>,
    pub status: TurnStatus,
}

/// A turn that could not be loaded or saved, with the id its log lines carry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("turn {correlation_id} failed: {error}")]
pub struct TurnFailure {
    pub correlation_id: String,
    pub error: ApplicationError,
}

impl TurnFailure {
    pub fn into_interface(self) -> InterfaceError {
        self.error.into_interface(self.correlation_id)
    }
}

/// Turn processor: serializes turns per conversation and does the load/process/save cycle
/// around the dialog manager.
pub struct AgentRuntime {
    repository: Arc<dyn DialogStateRepository>,
    recognizer: Arc<dyn IntentRecognizer>,
    audit: Arc<dyn AuditSink>,
    manager: DialogManager,
    pricing: PriceCalculator,
    conversation_locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl AgentRuntime {
    pub fn new(
        repository: Arc<dyn DialogStateRepository>,
        recognizer: Arc<dyn IntentRecognizer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let manager = DialogManager::new(recognizer.is_configured());
        Self {
            repository,
            recognizer,
            audit,
            manager,
            pricing: PriceCalculator,
            conversation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn recognizer_configured(&self) -> bool {
        self.recognizer.is_configured()
    }

    pub async fn handle_turn(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<TurnReply, TurnFailure> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(conversation_id.clone(), &correlation_id, RUNTIME_ACTOR);

        let lock = self.conversation_lock(conversation_id).await;
        let result = {
            let _turn_guard = lock.lock().await;
            self.process_locked(&audit, text).await
        };
        self.release_lock(conversation_id, &lock).await;

        match result {
            Ok((messages, status)) => Ok(TurnReply { correlation_id, messages, status }),
            Err(error) => {
                warn!(
                    event_name = "agent.turn.failed",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    error = %error,
                    "turn failed"
                );
                Err(TurnFailure { correlation_id, error })
            }
        }
    }

    /// Load, process, save. Runs with the conversation's lock held.
    async fn process_locked(
        &self,
        audit: &AuditContext,
        text: &str,
    ) -> Result<(Vec<String>, TurnStatus), ApplicationError> {
        let conversation_id = &audit.conversation_id;
        let stack = self.repository.load(conversation_id).await.map_err(persistence_error)?;
        let recognized = self.recognize_if_awaited(&stack, text, audit).await;
        let turn = TurnInput { text: text.to_string(), recognized };

        let TurnOutcome { messages, stack, status } = self.manager.process_turn(stack, &turn);

        self.repository.save(conversation_id, &stack).await.map_err(persistence_error)?;
        self.emit_turn_events(audit, &status, stack.depth());

        info!(
            event_name = "agent.turn.processed",
            correlation_id = %audit.correlation_id,
            conversation_id = %conversation_id,
            status = status.as_str(),
            frame_depth = stack.depth(),
            message_count = messages.len(),
            "turn processed"
        );

        Ok((messages, status))
    }

    async fn conversation_lock(&self, conversation_id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.conversation_locks.lock().await;
        locks.entry(conversation_id.clone()).or_default().clone()
    }

    /// Drops the lock entry unless another turn holds or waits on it. State lives in the
    /// repository, so a later turn simply creates a fresh entry.
    async fn release_lock(&self, conversation_id: &ConversationId, lock: &Arc<Mutex<()>>) {
        let mut locks = self.conversation_locks.lock().await;
        if Arc::strong_count(lock) <= 2 {
            locks.remove(conversation_id);
        }
    }

    async fn recognize_if_awaited(
        &self,
        stack: &DialogStack,
        text: &str,
        audit: &AuditContext,
    ) -> Option<RecognizedOrder> {
        if !self.recognizer.is_configured() || !self.manager.awaiting_utterance(stack, text) {
            return None;
        }

        match self.recognizer.recognize(text).await {
            Ok(recognized) => Some(recognized),
            Err(error) => {
                let error = ApplicationError::from(error);
                warn!(
                    event_name = "nlu.recognition_failed",
                    correlation_id = %audit.correlation_id,
                    conversation_id = %audit.conversation_id,
                    error = %error,
                    "intent recognition failed, continuing without pre-fill"
                );
                self.audit.emit(
                    audit
                        .event(
                            "nlu.recognition_failed",
                            AuditCategory::Recognition,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error", error.to_string()),
                );
                None
            }
        }
    }

    fn emit_turn_events(&self, audit: &AuditContext, status: &TurnStatus, depth: usize) {
        let outcome = match status {
            TurnStatus::Retried(_) => AuditOutcome::Rejected,
            TurnStatus::Reset => AuditOutcome::Failed,
            _ => AuditOutcome::Success,
        };
        self.audit.emit(
            audit
                .event("dialog.turn_processed", AuditCategory::Dialog, outcome)
                .with_metadata("status", status.as_str())
                .with_metadata("frame_depth", depth.to_string()),
        );

        match status {
            TurnStatus::Completed(Some(order)) => {
                let price = self.pricing.price(order);
                self.audit.emit(
                    audit
                        .event(
                            "dialog.order_confirmed",
                            AuditCategory::Dialog,
                            AuditOutcome::Success,
                        )
                        .with_metadata("item", order.description())
                        .with_metadata("quantity", order.quantity.to_string())
                        .with_metadata("total", price.display_total()),
                );
            }
            TurnStatus::Completed(None) | TurnStatus::Cancelled => {
                let reason = if matches!(status, TurnStatus::Cancelled) {
                    "cancel_command"
                } else {
                    "declined"
                };
                self.audit.emit(
                    audit
                        .event(
                            "dialog.order_cancelled",
                            AuditCategory::Dialog,
                            AuditOutcome::Success,
                        )
                        .with_metadata("reason", reason),
                );
            }
            TurnStatus::Reset => {
                self.audit.emit(audit.event(
                    "dialog.reset",
                    AuditCategory::System,
                    AuditOutcome::Failed,
                ));
            }
            TurnStatus::Waiting | TurnStatus::Retried(_) | TurnStatus::Helped => {}
        }
    }
}

fn persistence_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use scoop_core::audit::InMemoryAuditSink;
    use scoop_core::domain::conversation::ConversationId;
    use scoop_core::domain::order::{ItemKind, OrderRecord, RecognizedOrder, Size};
    use scoop_core::errors::{ApplicationError, InterfaceError};
    use scoop_core::flows::{DialogStack, FlowId, TurnStatus};
    use scoop_db::{DialogStateRepository, InMemoryDialogStateRepository, RepositoryError};

    use super::AgentRuntime;
    use crate::recognizer::{IntentRecognizer, NoopRecognizer, RecognizerError};

    struct FixedRecognizer {
        result: Option<RecognizedOrder>,
        calls: AtomicUsize,
    }

    impl FixedRecognizer {
        fn answering(result: RecognizedOrder) -> Self {
            Self { result: Some(result), calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { result: None, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl IntentRecognizer for FixedRecognizer {
        fn is_configured(&self) -> bool {
            true
        }

        async fn recognize(&self, _text: &str) -> Result<RecognizedOrder, RecognizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().ok_or(RecognizerError::Status(503))
        }
    }

    struct Fixture {
        runtime: AgentRuntime,
        repository: Arc<InMemoryDialogStateRepository>,
        audit: InMemoryAuditSink,
    }

    fn fixture(recognizer: Arc<dyn IntentRecognizer>) -> Fixture {
        let repository = Arc::new(InMemoryDialogStateRepository::default());
        let audit = InMemoryAuditSink::default();
        let runtime = AgentRuntime::new(repository.clone(), recognizer, Arc::new(audit.clone()));
        Fixture { runtime, repository, audit }
    }

    struct UnreadableRepository;

    #[async_trait]
    impl DialogStateRepository for UnreadableRepository {
        async fn load(&self, _id: &ConversationId) -> Result<DialogStack, RepositoryError> {
            Err(RepositoryError::Decode("truncated stack".to_string()))
        }

        async fn save(
            &self,
            _id: &ConversationId,
            _stack: &DialogStack,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    async fn lock_entries(runtime: &AgentRuntime) -> usize {
        runtime.conversation_locks.lock().await.len()
    }

    fn event_types(audit: &InMemoryAuditSink) -> Vec<String> {
        audit.events().into_iter().map(|event| event.event_type).collect()
    }

    #[tokio::test]
    async fn full_order_is_persisted_between_turns_and_audited() {
        let fx = fixture(Arc::new(NoopRecognizer));
        let id = ConversationId::new("conv-1");

        for text in ["cone", "large", "yes", "3"] {
            let reply = fx.runtime.handle_turn(&id, text).await.expect("turn");
            assert_eq!(reply.status, TurnStatus::Waiting);
            assert!(!fx.repository.load(&id).await.expect("load").is_empty());
        }
        let reply = fx.runtime.handle_turn(&id, "yes").await.expect("final turn");

        assert!(matches!(reply.status, TurnStatus::Completed(Some(_))));
        assert!(reply.messages[0].contains("3 Large Cone ice cream for $11.25"));
        assert!(fx.repository.load(&id).await.expect("load").is_empty());

        let confirmed = fx
            .audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "dialog.order_confirmed")
            .expect("confirmation event");
        assert_eq!(confirmed.metadata.get("total").map(String::as_str), Some("$11.25"));
        assert_eq!(confirmed.conversation_id, id);
    }

    #[tokio::test]
    async fn recognizer_is_consulted_only_for_utterance_turns() {
        let recognizer = Arc::new(FixedRecognizer::answering(RecognizedOrder {
            kind: Some(ItemKind::Cone),
            size: Some(Size::Regular),
        }));
        let fx = fixture(recognizer.clone());
        let id = ConversationId::new("conv-2");

        let reply = fx.runtime.handle_turn(&id, "I'd like some ice cream").await.expect("turn");
        assert_eq!(reply.messages, vec!["Would you like more than one ice cream? (yes or no)"]);

        fx.runtime.handle_turn(&id, "help").await.expect("help");
        fx.runtime.handle_turn(&id, "no").await.expect("quantity");

        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recognizer_failure_is_logged_and_the_flow_continues() {
        let fx = fixture(Arc::new(FixedRecognizer::failing()));
        let id = ConversationId::new("conv-3");

        let reply = fx.runtime.handle_turn(&id, "a cup please").await.expect("turn");

        assert_eq!(reply.status, TurnStatus::Waiting);
        assert_eq!(reply.messages, vec!["Would you like more than one ice cream? (yes or no)"]);
        let failed = fx
            .audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "nlu.recognition_failed")
            .expect("recognition failure event");
        assert_eq!(
            failed.metadata.get("error").map(String::as_str),
            Some("integration failure: prediction endpoint answered with status 503")
        );
    }

    #[tokio::test]
    async fn cancel_command_clears_persisted_state() {
        let fx = fixture(Arc::new(NoopRecognizer));
        let id = ConversationId::new("conv-4");
        fx.runtime.handle_turn(&id, "cone").await.expect("turn");

        let reply = fx.runtime.handle_turn(&id, "cancel").await.expect("cancel");

        assert_eq!(reply.status, TurnStatus::Cancelled);
        assert!(fx.repository.load(&id).await.expect("load").is_empty());
        let cancelled = fx
            .audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "dialog.order_cancelled")
            .expect("cancel event");
        assert_eq!(cancelled.metadata.get("reason").map(String::as_str), Some("cancel_command"));
    }

    #[tokio::test]
    async fn corrupted_state_is_reset_and_audited() {
        let fx = fixture(Arc::new(NoopRecognizer));
        let id = ConversationId::new("conv-5");
        let mut broken = DialogStack::new();
        broken.push(FlowId::Order, OrderRecord::default());
        fx.repository.save(&id, &broken).await.expect("seed");

        let reply = fx.runtime.handle_turn(&id, "yes").await.expect("turn");

        assert_eq!(reply.status, TurnStatus::Reset);
        assert!(fx.repository.load(&id).await.expect("load").is_empty());
        assert!(event_types(&fx.audit).contains(&"dialog.reset".to_string()));
    }

    #[tokio::test]
    async fn concurrent_conversations_keep_separate_stacks() {
        let fx = Arc::new(fixture(Arc::new(NoopRecognizer)));
        let mut handles = Vec::new();
        for index in 0..8 {
            let fx = fx.clone();
            handles.push(tokio::spawn(async move {
                let id = ConversationId::new(format!("conv-par-{index}"));
                fx.runtime.handle_turn(&id, "cup").await.expect("first");
                fx.runtime.handle_turn(&id, "no").await.expect("second")
            }));
        }

        for handle in handles {
            let reply = handle.await.expect("join");
            assert_eq!(reply.status, TurnStatus::Waiting);
            assert!(reply.messages[0].contains("You want a Cup ice cream."));
        }
        assert_eq!(fx.repository.conversation_count().await, 8);
    }

    #[tokio::test]
    async fn turns_for_one_conversation_are_serialized() {
        let fx = Arc::new(fixture(Arc::new(NoopRecognizer)));
        let id = ConversationId::new("conv-serial");
        fx.runtime.handle_turn(&id, "cup").await.expect("open");

        let first = {
            let fx = fx.clone();
            let id = id.clone();
            tokio::spawn(async move { fx.runtime.handle_turn(&id, "maybe").await })
        };
        let second = {
            let fx = fx.clone();
            let id = id.clone();
            tokio::spawn(async move { fx.runtime.handle_turn(&id, "perhaps").await })
        };
        let statuses = [
            first.await.expect("join").expect("turn").status,
            second.await.expect("join").expect("turn").status,
        ];

        assert!(statuses.iter().all(|status| matches!(status, TurnStatus::Retried(_))));
        let stack = fx.repository.load(&id).await.expect("load");
        assert_eq!(stack.suspended_frames(), 1);
        assert_eq!(stack.depth(), 2);
    }

    #[tokio::test]
    async fn lock_entries_do_not_outlive_unfinished_conversations() {
        let fx = fixture(Arc::new(NoopRecognizer));
        for index in 0..25 {
            let id = ConversationId::new(format!("conv-open-{index}"));
            let reply = fx.runtime.handle_turn(&id, "cone").await.expect("turn");
            assert_eq!(reply.status, TurnStatus::Waiting);
        }

        assert_eq!(lock_entries(&fx.runtime).await, 0);
        assert_eq!(fx.repository.conversation_count().await, 25);

        let id = ConversationId::new("conv-open-3");
        let reply = fx.runtime.handle_turn(&id, "large").await.expect("resumed turn");
        assert_eq!(reply.status, TurnStatus::Waiting);
        assert_eq!(lock_entries(&fx.runtime).await, 0);
    }

    #[tokio::test]
    async fn failed_turns_release_their_lock_and_keep_the_correlation_id() {
        let runtime = AgentRuntime::new(
            Arc::new(UnreadableRepository),
            Arc::new(NoopRecognizer),
            Arc::new(InMemoryAuditSink::default()),
        );
        let id = ConversationId::new("conv-broken");

        let failure = runtime.handle_turn(&id, "cone").await.expect_err("load fails");

        assert!(matches!(failure.error, ApplicationError::Persistence(_)));
        assert_eq!(lock_entries(&runtime).await, 0);

        let correlation_id = failure.correlation_id.clone();
        assert!(!correlation_id.is_empty());
        match failure.into_interface() {
            InterfaceError::ServiceUnavailable { correlation_id: stamped, .. } => {
                assert_eq!(stamped, correlation_id);
            }
            other => panic!("expected service unavailable, got {other:?}"),
        }
    }
}
