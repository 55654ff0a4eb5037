use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{ItemKind, OrderRecord, RecognizedOrder, Size};
use crate::flows::states::{StepValue, TurnInput};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    FreeText,
    YesNo,
    BoundedInteger { min: u32, max: u32 },
    /// Free text that is forwarded to intent recognition before it reaches the flow.
    Utterance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldValidator {
    NonEmptyText,
    ItemKind,
    Size,
    YesNo,
    IntegerInRange { min: u32, max: u32 },
    Utterance,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("reply is empty")]
    Empty,
    #[error("`{0}` is not one of the offered choices")]
    UnknownChoice(String),
    #[error("`{0}` is not a yes or no answer")]
    NotYesNo(String),
    #[error("`{0}` is not a whole number")]
    NotANumber(String),
    #[error("{value} is outside {min}..={max}")]
    OutOfRange { value: i64, min: u32, max: u32 },
}

impl FieldValidator {
    pub fn validate(&self, input: &TurnInput) -> Result<StepValue, ValidationFailure> {
        let text = input.text.trim();
        match self {
            Self::Utterance => {
                let recognized =
                    RecognizedOrder::from_keywords(text).merged_with(input.recognized.as_ref());
                Ok(StepValue::Order(OrderRecord::prefilled(&recognized)))
            }
            _ if text.is_empty() => Err(ValidationFailure::Empty),
            Self::NonEmptyText => Ok(StepValue::Text(text.to_string())),
            Self::ItemKind => text
                .parse::<ItemKind>()
                .map(StepValue::Kind)
                .map_err(|_| ValidationFailure::UnknownChoice(text.to_string())),
            Self::Size => text
                .parse::<Size>()
                .map(StepValue::Size)
                .map_err(|_| ValidationFailure::UnknownChoice(text.to_string())),
            Self::YesNo => parse_yes_no(text)
                .map(StepValue::Confirm)
                .ok_or_else(|| ValidationFailure::NotYesNo(text.to_string())),
            Self::IntegerInRange { min, max } => {
                parse_bounded_integer(text, *min, *max).map(StepValue::Quantity)
            }
        }
    }
}

pub fn parse_yes_no(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "yeah" | "yep" | "sure" | "ok" | "okay" | "true" => Some(true),
        "no" | "n" | "nope" | "nah" | "false" => Some(false),
        _ => None,
    }
}

pub fn parse_bounded_integer(text: &str, min: u32, max: u32) -> Result<u32, ValidationFailure> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let value = digits
        .parse::<i64>()
        .map_err(|_| ValidationFailure::NotANumber(trimmed.to_string()))?;

    if value < i64::from(min) || value > i64::from(max) {
        return Err(ValidationFailure::OutOfRange { value, min, max });
    }

    u32::try_from(value).map_err(|_| ValidationFailure::OutOfRange { value, min, max })
}

/// Declarative "ask the user for field X" step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub id: String,
    pub text: String,
    pub retry_text: Option<String>,
    pub input: InputKind,
    pub validator: FieldValidator,
}

impl PromptSpec {
    pub fn text(id: impl Into<String>, text: impl Into<String>, validator: FieldValidator) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            retry_text: None,
            input: InputKind::FreeText,
            validator,
        }
    }

    pub fn yes_no(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            retry_text: None,
            input: InputKind::YesNo,
            validator: FieldValidator::YesNo,
        }
    }

    pub fn bounded_integer(
        id: impl Into<String>,
        text: impl Into<String>,
        min: u32,
        max: u32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            retry_text: None,
            input: InputKind::BoundedInteger { min, max },
            validator: FieldValidator::IntegerInRange { min, max },
        }
    }

    pub fn utterance(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            retry_text: None,
            input: InputKind::Utterance,
            validator: FieldValidator::Utterance,
        }
    }

    pub fn with_retry(mut self, retry_text: impl Into<String>) -> Self {
        self.retry_text = Some(retry_text.into());
        self
    }

    pub fn render(&self) -> String {
        match self.input {
            InputKind::YesNo => format!("{} (yes or no)", self.text),
            _ => self.text.clone(),
        }
    }

    pub fn render_retry(&self) -> String {
        self.retry_text.clone().unwrap_or_else(|| self.render())
    }

    pub fn accept(&self, input: &TurnInput) -> Result<StepValue, ValidationFailure> {
        self.validator.validate(input)
    }
}
