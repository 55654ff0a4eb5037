//! Domain and dialog engine for the ice cream ordering bot.
//!
//! A conversation is a [`flows::DialogStack`] of waterfall frames. Each turn runs
//! through [`flows::DialogManager::process_turn`], which answers global commands,
//! advances the active frame, and returns the stack to persist.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod pricing;

pub use domain::conversation::ConversationId;
pub use domain::order::{CompleteOrder, ItemKind, OrderRecord, RecognizedOrder, Size};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{DialogManager, DialogStack, TurnInput, TurnOutcome, TurnStatus};
pub use pricing::{Price, PriceCalculator};
