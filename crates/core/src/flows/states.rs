use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::order::{ItemKind, OrderRecord, RecognizedOrder, Size};
use crate::flows::prompt::{InputKind, PromptSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowId {
    Root,
    Order,
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "root",
            Self::Order => "order",
        })
    }
}

/// One inbound user message plus any entities the NLU collaborator extracted from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub text: String,
    pub recognized: Option<RecognizedOrder>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), recognized: None }
    }

    pub fn recognized(text: impl Into<String>, recognized: RecognizedOrder) -> Self {
        Self { text: text.into(), recognized: Some(recognized) }
    }
}

/// Value handed from one step to the next, or from a finished child to its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepValue {
    Text(String),
    Kind(ItemKind),
    Size(Size),
    Confirm(bool),
    Quantity(u32),
    Order(OrderRecord),
}

/// What a step asks the engine to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Suspend the frame until the next turn answers this prompt.
    Prompt(PromptSpec),
    /// Run the next step immediately with this value.
    Continue(Option<StepValue>),
    /// Start a child flow on top of this frame.
    PushChild { flow: FlowId, options: OrderRecord },
    /// Pop this frame and hand the result to the parent. `None` signals cancellation.
    End(Option<StepValue>),
}

/// One live activation of a flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogFrame {
    pub flow: FlowId,
    /// Index of the last step that ran; `None` before the first step.
    pub cursor: Option<usize>,
    pub options: OrderRecord,
    pub pending: Option<PromptSpec>,
}

impl DialogFrame {
    pub fn new(flow: FlowId, options: OrderRecord) -> Self {
        Self { flow, cursor: None, options, pending: None }
    }

    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_step(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor + 1)
    }
}

/// Result of popping a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unwound {
    /// A parent frame is now active and should be re-advanced with the result.
    Resume(Option<StepValue>),
    /// The popped frame was the outermost one.
    Emptied(Option<StepValue>),
    /// Nothing to pop.
    Nothing,
}

/// Nested active flows for one conversation, outermost first.
///
/// This is the entire durable state of a conversation between turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogStack {
    frames: Vec<DialogFrame>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flow: FlowId, options: OrderRecord) {
        self.frames.push(DialogFrame::new(flow, options));
    }

    pub fn pop(&mut self, result: Option<StepValue>) -> Unwound {
        if self.frames.pop().is_none() {
            return Unwound::Nothing;
        }
        if self.frames.is_empty() {
            Unwound::Emptied(result)
        } else {
            Unwound::Resume(result)
        }
    }

    pub fn current(&self) -> Option<&DialogFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut DialogFrame> {
        self.frames.last_mut()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[DialogFrame] {
        &self.frames
    }

    pub fn suspended_frames(&self) -> usize {
        self.frames.iter().filter(|frame| frame.is_suspended()).count()
    }

    pub fn pending_prompt(&self) -> Option<&PromptSpec> {
        self.current().and_then(|frame| frame.pending.as_ref())
    }

    pub fn awaiting_input_kind(&self) -> Option<InputKind> {
        self.pending_prompt().map(|prompt| prompt.input)
    }
}
