//! Order collection waterfall: kind, size (cones only), quantity, confirmation.
//!
//! Every step reads the answer to the previous prompt from the step context and
//! records it on the frame's `OrderRecord` before deciding what to ask next.
//! Fields that are already filled (for example from intent recognition) are
//! skipped with `StepOutcome::Continue`, so no turn is spent on them.

use crate::domain::order::{MAX_QUANTITY, MIN_QUANTITY};
use crate::flows::engine::{DialogError, FlowDefinition, StepContext};
use crate::flows::prompt::{FieldValidator, PromptSpec};
use crate::flows::states::{FlowId, StepOutcome, StepValue};
use crate::pricing::PriceCalculator;

pub const KIND_PROMPT: &str = "Which type of ice cream do you need? Cone or Cup";
pub const KIND_RETRY: &str = "Sorry, I only have Cup or Cone ice cream. Which one would you like?";
pub const SIZE_PROMPT: &str = "What size do you need? I have regular as well as large.";
pub const SIZE_RETRY: &str = "Please choose a size: regular or large.";
pub const MORE_THAN_ONE_PROMPT: &str = "Would you like more than one ice cream?";
pub const MORE_THAN_ONE_RETRY: &str = "Please answer yes or no. Would you like more than one?";
pub const QUANTITY_PROMPT: &str = "How many ice creams would you like? (1-20)";
pub const QUANTITY_RETRY: &str = "Please enter a whole number between 1 and 20.";
pub const CONFIRM_RETRY: &str = "Please answer yes or no. Shall I place this order?";

const KIND_STEP: usize = 0;
const SIZE_STEP: usize = 1;
const QUANTITY_ASK_STEP: usize = 2;
const QUANTITY_RESOLVE_STEP: usize = 3;
const CONFIRM_STEP: usize = 4;
const FINAL_STEP: usize = 5;

#[derive(Clone, Debug, Default)]
pub struct OrderFlow {
    pricing: PriceCalculator,
}

impl OrderFlow {
    pub fn new(pricing: PriceCalculator) -> Self {
        Self { pricing }
    }

    fn kind_step(&self, ctx: &mut StepContext<'_>) -> StepOutcome {
        match ctx.options.item_kind {
            Some(kind) => StepOutcome::Continue(Some(StepValue::Kind(kind))),
            None => StepOutcome::Prompt(
                PromptSpec::text("order.kind", KIND_PROMPT, FieldValidator::ItemKind)
                    .with_retry(KIND_RETRY),
            ),
        }
    }

    fn size_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        let Some(StepValue::Kind(kind)) = ctx.take_result() else {
            return Err(unexpected(SIZE_STEP));
        };
        ctx.options.set_item_kind(kind);

        if ctx.options.needs_size() {
            return Ok(StepOutcome::Prompt(
                PromptSpec::text("order.size", SIZE_PROMPT, FieldValidator::Size)
                    .with_retry(SIZE_RETRY),
            ));
        }
        Ok(StepOutcome::Continue(ctx.options.size.map(StepValue::Size)))
    }

    fn quantity_ask_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        match ctx.take_result() {
            Some(StepValue::Size(size)) => {
                if ctx.options.item_kind.is_some_and(|kind| kind.requires_size()) {
                    ctx.options.size = Some(size);
                }
            }
            None => {}
            Some(_) => return Err(unexpected(QUANTITY_ASK_STEP)),
        }

        match ctx.options.quantity {
            Some(quantity) => Ok(StepOutcome::Continue(Some(StepValue::Quantity(quantity)))),
            None => Ok(StepOutcome::Prompt(
                PromptSpec::yes_no("order.more_than_one", MORE_THAN_ONE_PROMPT)
                    .with_retry(MORE_THAN_ONE_RETRY),
            )),
        }
    }

    fn quantity_resolve_step(
        &self,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepOutcome, DialogError> {
        match ctx.take_result() {
            Some(StepValue::Confirm(false)) => {
                Ok(StepOutcome::Continue(Some(StepValue::Quantity(MIN_QUANTITY))))
            }
            Some(StepValue::Confirm(true)) => Ok(StepOutcome::Prompt(
                PromptSpec::bounded_integer(
                    "order.quantity",
                    QUANTITY_PROMPT,
                    MIN_QUANTITY,
                    MAX_QUANTITY,
                )
                .with_retry(QUANTITY_RETRY),
            )),
            Some(StepValue::Quantity(quantity)) => {
                Ok(StepOutcome::Continue(Some(StepValue::Quantity(quantity))))
            }
            _ => Err(unexpected(QUANTITY_RESOLVE_STEP)),
        }
    }

    fn confirm_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        let Some(StepValue::Quantity(quantity)) = ctx.take_result() else {
            return Err(unexpected(CONFIRM_STEP));
        };
        ctx.options.quantity = Some(quantity);

        let order = ctx
            .options
            .complete()
            .map_err(|error| DialogError::IncompleteOrder(error.to_string()))?;
        let price = self.pricing.price(&order);
        let summary = format!(
            "Please confirm,\nYou want {} {} ice cream.\nIt will cost you {}.",
            order.quantity_phrase(),
            order.description(),
            price.display_total()
        );

        Ok(StepOutcome::Prompt(
            PromptSpec::yes_no("order.confirm", summary).with_retry(CONFIRM_RETRY),
        ))
    }

    fn final_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        match ctx.take_result() {
            Some(StepValue::Confirm(true)) => {
                Ok(StepOutcome::End(Some(StepValue::Order(ctx.options.clone()))))
            }
            Some(StepValue::Confirm(false)) => Ok(StepOutcome::End(None)),
            _ => Err(unexpected(FINAL_STEP)),
        }
    }
}

impl FlowDefinition for OrderFlow {
    fn flow_id(&self) -> FlowId {
        FlowId::Order
    }

    fn step_count(&self) -> usize {
        FINAL_STEP + 1
    }

    fn run_step(
        &self,
        index: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepOutcome, DialogError> {
        match index {
            KIND_STEP => Ok(self.kind_step(ctx)),
            SIZE_STEP => self.size_step(ctx),
            QUANTITY_ASK_STEP => self.quantity_ask_step(ctx),
            QUANTITY_RESOLVE_STEP => self.quantity_resolve_step(ctx),
            CONFIRM_STEP => self.confirm_step(ctx),
            FINAL_STEP => self.final_step(ctx),
            _ => Err(DialogError::StepOutOfRange { flow: FlowId::Order, index }),
        }
    }
}

fn unexpected(index: usize) -> DialogError {
    DialogError::UnexpectedInput { flow: FlowId::Order, index }
}
