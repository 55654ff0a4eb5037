use crate::domain::order::OrderRecord;
use crate::flows::engine::{DialogError, FlowDefinition, StepContext};
use crate::flows::prompt::PromptSpec;
use crate::flows::states::{FlowId, StepOutcome, StepValue};
use crate::pricing::PriceCalculator;

pub const RECOGNIZER_MISSING_NOTE: &str = "NOTE: Order recognition is not configured. To enable \
all capabilities, set nlu.app_id, nlu.api_key and nlu.host_name.";
pub const INTENT_PROMPT: &str =
    "What can I help you with today?\nSay something like \"Get me a Regular Cone ice cream\"";
pub const DECLINED_MESSAGE: &str = "Ok, I have canceled your order. Thank you.";
const DELIVERY_SIGN_OFF: &str = "Enjoy your yummy ice cream.";

const INTRO_STEP: usize = 0;
const ACT_STEP: usize = 1;
const FINAL_STEP: usize = 2;

/// Outer flow: gathers a pre-filled order, runs the order flow, reports the outcome.
#[derive(Clone, Debug, Default)]
pub struct RootFlow {
    recognizer_enabled: bool,
    pricing: PriceCalculator,
}

impl RootFlow {
    pub fn new(recognizer_enabled: bool, pricing: PriceCalculator) -> Self {
        Self { recognizer_enabled, pricing }
    }

    pub fn recognizer_enabled(&self) -> bool {
        self.recognizer_enabled
    }

    fn intro_step(&self, ctx: &mut StepContext<'_>) -> StepOutcome {
        let prefill = match ctx.take_result() {
            Some(StepValue::Order(record)) => record,
            _ => OrderRecord::default(),
        };

        if !self.recognizer_enabled {
            ctx.say(RECOGNIZER_MISSING_NOTE);
            return StepOutcome::Continue(Some(StepValue::Order(prefill)));
        }
        if !prefill.is_empty() {
            return StepOutcome::Continue(Some(StepValue::Order(prefill)));
        }

        StepOutcome::Prompt(PromptSpec::utterance("root.intent", INTENT_PROMPT))
    }

    fn act_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        let options = match ctx.take_result() {
            Some(StepValue::Order(record)) => record,
            None => OrderRecord::default(),
            Some(_) => {
                return Err(DialogError::UnexpectedInput { flow: FlowId::Root, index: ACT_STEP })
            }
        };
        Ok(StepOutcome::PushChild { flow: FlowId::Order, options })
    }

    fn final_step(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, DialogError> {
        match ctx.take_result() {
            Some(StepValue::Order(record)) => {
                let order = record
                    .complete()
                    .map_err(|error| DialogError::IncompleteOrder(error.to_string()))?;
                let price = self.pricing.price(&order);
                ctx.say(format!(
                    "The humans will deliver you {} {} ice cream for {}.\n{DELIVERY_SIGN_OFF}",
                    order.quantity_phrase(),
                    order.description(),
                    price.display_total()
                ));
                Ok(StepOutcome::End(Some(StepValue::Order(record))))
            }
            None => {
                ctx.say(DECLINED_MESSAGE);
                Ok(StepOutcome::End(None))
            }
            Some(_) => Err(DialogError::UnexpectedInput { flow: FlowId::Root, index: FINAL_STEP }),
        }
    }
}

impl FlowDefinition for RootFlow {
    fn flow_id(&self) -> FlowId {
        FlowId::Root
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
            INTRO_STEP => Ok(self.intro_step(ctx)),
            ACT_STEP => self.act_step(ctx),
            FINAL_STEP => self.final_step(ctx),
            _ => Err(DialogError::StepOutOfRange { flow: FlowId::Root, index }),
        }
    }
}
