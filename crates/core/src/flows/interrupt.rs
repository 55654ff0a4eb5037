use tracing::info;

use crate::flows::engine::DialogError;
use crate::flows::manager::{TurnHandler, TurnStatus};
use crate::flows::states::{DialogStack, TurnInput};

pub const HELP_MESSAGE: &str = "I have three different ice cream types in stock for you: \
Cup (Regular) and Cone (Regular / Large).\nYou can say \"Get me a Regular Cone ice cream\". \
Say \"cancel\" at any time to start over.";
pub const CANCEL_MESSAGE: &str = "Cancelling.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalCommand {
    Help,
    Cancel,
}

impl GlobalCommand {
    /// Exact, case-insensitive match against the whole trimmed input.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "help" | "?" => Some(Self::Help),
            "cancel" | "quit" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Recognizes global commands ahead of whatever handler it wraps.
pub struct InterruptGate<H> {
    inner: H,
}

impl<H> InterruptGate<H>
where
    H: TurnHandler,
{
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H> TurnHandler for InterruptGate<H>
where
    H: TurnHandler,
{
    fn handle(
        &self,
        stack: &mut DialogStack,
        turn: &TurnInput,
        messages: &mut Vec<String>,
    ) -> Result<TurnStatus, DialogError> {
        match GlobalCommand::parse(&turn.text) {
            Some(GlobalCommand::Help) => {
                messages.push(HELP_MESSAGE.to_string());
                Ok(TurnStatus::Helped)
            }
            Some(GlobalCommand::Cancel) => {
                info!(
                    event_name = "dialog.interrupt.cancel",
                    discarded_frames = stack.depth(),
                    "global cancel unwound the dialog stack"
                );
                stack.clear();
                messages.push(CANCEL_MESSAGE.to_string());
                Ok(TurnStatus::Cancelled)
            }
            None => self.inner.handle(stack, turn, messages),
        }
    }
}
