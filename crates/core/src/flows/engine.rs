use thiserror::Error;
use tracing::debug;

use crate::domain::order::OrderRecord;
use crate::flows::prompt::ValidationFailure;
use crate::flows::states::{DialogStack, FlowId, StepOutcome, StepValue, TurnInput, Unwound};

/// Mutable view a step gets of its frame for the duration of one call.
pub struct StepContext<'a> {
    pub options: &'a mut OrderRecord,
    result: Option<StepValue>,
    messages: &'a mut Vec<String>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        options: &'a mut OrderRecord,
        result: Option<StepValue>,
        messages: &'a mut Vec<String>,
    ) -> Self {
        Self { options, result, messages }
    }

    pub fn result(&self) -> Option<&StepValue> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<StepValue> {
        self.result.take()
    }

    pub fn say(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

pub trait FlowDefinition: Send + Sync {
    fn flow_id(&self) -> FlowId;
    fn step_count(&self) -> usize;
    fn run_step(
        &self,
        index: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepOutcome, DialogError>;
}

/// Resolves the flow definition behind a persisted frame.
pub trait FlowCatalog: Send + Sync {
    fn flow(&self, id: FlowId) -> &dyn FlowDefinition;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("dialog stack is empty")]
    EmptyStack,
    #[error("flow {flow} has no step at index {index}")]
    StepOutOfRange { flow: FlowId, index: usize },
    #[error("flow {flow} step {index} received an unexpected input")]
    UnexpectedInput { flow: FlowId, index: usize },
    #[error("active frame of flow {flow} is not waiting for input")]
    NotSuspended { flow: FlowId },
    #[error("order cannot be confirmed: {0}")]
    IncompleteOrder(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    /// A frame is suspended on a fresh prompt.
    Waiting,
    /// The reply was rejected; the same prompt stays pending.
    Retried(ValidationFailure),
    /// The outermost frame ended and the stack is empty.
    Finished(Option<StepValue>),
}

pub struct WaterfallEngine<C> {
    catalog: C,
}

impl<C> WaterfallEngine<C>
where
    C: FlowCatalog,
{
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Pushes a new frame and runs it until the turn reaches a prompt or the stack empties.
    pub fn begin(
        &self,
        stack: &mut DialogStack,
        flow: FlowId,
        options: OrderRecord,
        input: Option<StepValue>,
        messages: &mut Vec<String>,
    ) -> Result<EngineStatus, DialogError> {
        stack.push(flow, options);
        self.run(stack, input, messages)
    }

    /// Feeds one turn to the suspended frame on top of the stack.
    pub fn advance(
        &self,
        stack: &mut DialogStack,
        turn: &TurnInput,
        messages: &mut Vec<String>,
    ) -> Result<EngineStatus, DialogError> {
        let frame = stack.current_mut().ok_or(DialogError::EmptyStack)?;
        let Some(pending) = frame.pending.as_ref() else {
            return Err(DialogError::NotSuspended { flow: frame.flow });
        };

        match pending.accept(turn) {
            Ok(value) => {
                frame.pending = None;
                self.run(stack, Some(value), messages)
            }
            Err(failure) => {
                debug!(
                    event_name = "dialog.prompt.rejected",
                    flow = %frame.flow,
                    prompt_id = %pending.id,
                    reason = %failure,
                    "reply rejected, prompt stays pending"
                );
                messages.push(pending.render_retry());
                Ok(EngineStatus::Retried(failure))
            }
        }
    }

    fn run(
        &self,
        stack: &mut DialogStack,
        mut input: Option<StepValue>,
        messages: &mut Vec<String>,
    ) -> Result<EngineStatus, DialogError> {
        loop {
            let frame = stack.current_mut().ok_or(DialogError::EmptyStack)?;
            let flow = self.catalog.flow(frame.flow);
            let index = frame.next_step();
            if index >= flow.step_count() {
                return Err(DialogError::StepOutOfRange { flow: frame.flow, index });
            }
            frame.cursor = Some(index);

            let outcome = {
                let mut ctx = StepContext::new(&mut frame.options, input.take(), messages);
                flow.run_step(index, &mut ctx)?
            };
            debug!(
                event_name = "dialog.step.executed",
                flow = %frame.flow,
                step = index,
                "step ran"
            );

            match outcome {
                StepOutcome::Prompt(prompt) => {
                    messages.push(prompt.render());
                    frame.pending = Some(prompt);
                    return Ok(EngineStatus::Waiting);
                }
                StepOutcome::Continue(value) => input = value,
                StepOutcome::PushChild { flow, options } => {
                    stack.push(flow, options);
                    input = None;
                }
                StepOutcome::End(result) => match stack.pop(result) {
                    Unwound::Resume(value) => input = value,
                    Unwound::Emptied(value) => return Ok(EngineStatus::Finished(value)),
                    Unwound::Nothing => return Err(DialogError::EmptyStack),
                },
            }
        }
    }
}
