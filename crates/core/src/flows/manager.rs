use tracing::{debug, error};

use crate::domain::order::{CompleteOrder, OrderRecord};
use crate::errors::DomainError;
use crate::flows::engine::{DialogError, EngineStatus, FlowCatalog, FlowDefinition, WaterfallEngine};
use crate::flows::interrupt::{GlobalCommand, InterruptGate};
use crate::flows::order::OrderFlow;
use crate::flows::prompt::{FieldValidator, InputKind, ValidationFailure};
use crate::flows::root::RootFlow;
use crate::flows::states::{DialogStack, FlowId, StepValue, TurnInput};
use crate::pricing::PriceCalculator;

pub const RESET_MESSAGE: &str = "Sorry, something went wrong on my side. Let's start over.";

/// Processes one turn against a conversation's stack.
pub trait TurnHandler {
    fn handle(
        &self,
        stack: &mut DialogStack,
        turn: &TurnInput,
        messages: &mut Vec<String>,
    ) -> Result<TurnStatus, DialogError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    /// Some frame is suspended on a fresh prompt.
    Waiting,
    /// The reply did not validate; the same prompt is pending again.
    Retried(ValidationFailure),
    Helped,
    Cancelled,
    /// The root flow ended. `None` means the order was declined.
    Completed(Option<CompleteOrder>),
    /// An impossible state was hit and the conversation was reset.
    Reset,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Retried(_) => "retried",
            Self::Helped => "helped",
            Self::Cancelled => "cancelled",
            Self::Completed(Some(_)) => "confirmed",
            Self::Completed(None) => "declined",
            Self::Reset => "reset",
        }
    }

    /// True when the conversation's stack is empty after this turn.
    pub fn ends_conversation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed(_) | Self::Reset)
    }
}

/// The two flows this bot knows, resolved by id.
#[derive(Clone, Debug, Default)]
pub struct StandardFlows {
    root: RootFlow,
    order: OrderFlow,
}

impl StandardFlows {
    pub fn new(recognizer_enabled: bool, pricing: PriceCalculator) -> Self {
        Self { root: RootFlow::new(recognizer_enabled, pricing), order: OrderFlow::new(pricing) }
    }
}

impl FlowCatalog for StandardFlows {
    fn flow(&self, id: FlowId) -> &dyn FlowDefinition {
        match id {
            FlowId::Root => &self.root,
            FlowId::Order => &self.order,
        }
    }
}

/// Starts the root flow on an empty stack, otherwise resumes the active frame.
pub struct FlowDispatcher<C> {
    engine: WaterfallEngine<C>,
}

impl<C> FlowDispatcher<C>
where
    C: FlowCatalog,
{
    pub fn new(catalog: C) -> Self {
        Self { engine: WaterfallEngine::new(catalog) }
    }
}

impl<C> TurnHandler for FlowDispatcher<C>
where
    C: FlowCatalog,
{
    fn handle(
        &self,
        stack: &mut DialogStack,
        turn: &TurnInput,
        messages: &mut Vec<String>,
    ) -> Result<TurnStatus, DialogError> {
        let status = if stack.is_empty() {
            let opening = FieldValidator::Utterance.validate(turn).ok();
            let prefilled =
                matches!(&opening, Some(StepValue::Order(record)) if !record.is_empty());
            debug!(
                event_name = "dialog.conversation.started",
                prefilled,
                "opening turn starts the root flow"
            );
            self.engine.begin(stack, FlowId::Root, OrderRecord::default(), opening, messages)?
        } else {
            self.engine.advance(stack, turn, messages)?
        };

        Ok(match status {
            EngineStatus::Waiting => TurnStatus::Waiting,
            EngineStatus::Retried(failure) => TurnStatus::Retried(failure),
            EngineStatus::Finished(Some(StepValue::Order(record))) => {
                TurnStatus::Completed(record.complete().ok())
            }
            EngineStatus::Finished(_) => TurnStatus::Completed(None),
        })
    }
}

/// Everything a caller needs to persist and render after one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub messages: Vec<String>,
    pub stack: DialogStack,
    pub status: TurnStatus,
}

/// Entry point per turn: global commands first, then the flow stack.
pub struct DialogManager<C = StandardFlows> {
    handler: InterruptGate<FlowDispatcher<C>>,
}

impl DialogManager<StandardFlows> {
    pub fn new(recognizer_enabled: bool) -> Self {
        Self::with_catalog(StandardFlows::new(recognizer_enabled, PriceCalculator))
    }
}

impl Default for DialogManager<StandardFlows> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<C> DialogManager<C>
where
    C: FlowCatalog,
{
    pub fn with_catalog(catalog: C) -> Self {
        Self { handler: InterruptGate::new(FlowDispatcher::new(catalog)) }
    }

    /// Runs one turn to its next suspension point. Never fails: impossible states reset the
    /// conversation and surface a generic apology.
    pub fn process_turn(&self, mut stack: DialogStack, turn: &TurnInput) -> TurnOutcome {
        match self.try_process_turn(&mut stack, turn) {
            Ok((messages, status)) => TurnOutcome { messages, stack, status },
            Err(domain_error) => {
                error!(
                    event_name = "dialog.turn.reset",
                    error = %domain_error,
                    depth = stack.depth(),
                    "dialog reached an impossible state, resetting conversation"
                );
                TurnOutcome {
                    messages: vec![RESET_MESSAGE.to_string()],
                    stack: DialogStack::new(),
                    status: TurnStatus::Reset,
                }
            }
        }
    }

    /// Runs one turn in place. On error the stack may be half-updated and must be discarded.
    pub fn try_process_turn(
        &self,
        stack: &mut DialogStack,
        turn: &TurnInput,
    ) -> Result<(Vec<String>, TurnStatus), DomainError> {
        let mut messages = Vec::new();
        let status = self.handler.handle(stack, turn, &mut messages)?;
        Ok((messages, status))
    }

    /// Whether the next turn on this stack is read as a free-form order utterance.
    pub fn awaiting_utterance(&self, stack: &DialogStack, text: &str) -> bool {
        if GlobalCommand::parse(text).is_some() {
            return false;
        }
        stack.is_empty() || stack.awaiting_input_kind() == Some(InputKind::Utterance)
    }
}
