//! Stack-based dialog engine and the two flows of the ice cream bot.

pub mod engine;
pub mod interrupt;
pub mod manager;
pub mod order;
pub mod prompt;
pub mod root;
pub mod states;

pub use engine::{
    DialogError, EngineStatus, FlowCatalog, FlowDefinition, StepContext, WaterfallEngine,
};
pub use interrupt::{GlobalCommand, InterruptGate};
pub use manager::{DialogManager, StandardFlows, TurnHandler, TurnOutcome, TurnStatus};
pub use order::OrderFlow;
pub use prompt::{FieldValidator, InputKind, PromptSpec, ValidationFailure};
pub use root::RootFlow;
pub use states::{DialogFrame, DialogStack, FlowId, StepOutcome, StepValue, TurnInput};
