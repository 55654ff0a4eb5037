use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Cup,
    Cone,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cup => "cup",
            Self::Cone => "cone",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cup => "Cup",
            Self::Cone => "Cone",
        }
    }

    /// Only cones come in more than one size.
    pub fn requires_size(&self) -> bool {
        matches!(self, Self::Cone)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cup" | "cups" => Ok(Self::Cup),
            "cone" | "cones" => Ok(Self::Cone),
            other => Err(DomainError::InvariantViolation(format!("unknown item kind `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Regular,
    Large,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Large => "large",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Large => "Large",
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Size {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "large" => Ok(Self::Large),
            other => Err(DomainError::InvariantViolation(format!("unknown size `{other}`"))),
        }
    }
}

/// Entities an NLU collaborator (or keyword matching) pulled out of free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedOrder {
    pub kind: Option<ItemKind>,
    pub size: Option<Size>,
}

impl RecognizedOrder {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.size.is_none()
    }

    /// Whole-word keyword match over an utterance such as "get me a large cone".
    pub fn from_keywords(text: &str) -> Self {
        let mut recognized = Self::default();
        for token in text
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            if recognized.kind.is_none() {
                recognized.kind = token.parse::<ItemKind>().ok();
            }
            if recognized.size.is_none() {
                recognized.size = token.parse::<Size>().ok();
            }
        }
        recognized
    }

    /// Fields present on `other` win over fields on `self`.
    pub fn merged_with(self, other: Option<&RecognizedOrder>) -> Self {
        match other {
            Some(other) => {
                Self { kind: other.kind.or(self.kind), size: other.size.or(self.size) }
            }
            None => self,
        }
    }
}

/// Cumulative slot-filling result for one order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub item_kind: Option<ItemKind>,
    pub size: Option<Size>,
    pub quantity: Option<u32>,
}

impl OrderRecord {
    pub fn prefilled(recognized: &RecognizedOrder) -> Self {
        let size = match recognized.kind {
            Some(ItemKind::Cup) => None,
            _ => recognized.size,
        };
        Self { item_kind: recognized.kind, size, quantity: None }
    }

    pub fn is_empty(&self) -> bool {
        self.item_kind.is_none() && self.size.is_none() && self.quantity.is_none()
    }

    pub fn set_item_kind(&mut self, kind: ItemKind) {
        self.item_kind = Some(kind);
        if !kind.requires_size() {
            self.size = None;
        }
    }

    pub fn needs_size(&self) -> bool {
        matches!(self.item_kind, Some(kind) if kind.requires_size()) && self.size.is_none()
    }

    /// Checks the record is ready to be presented for confirmation.
    pub fn complete(&self) -> Result<CompleteOrder, DomainError> {
        let Some(kind) = self.item_kind else {
            return Err(DomainError::InvariantViolation("order item kind is not set".to_string()));
        };
        let size = match kind {
            ItemKind::Cone => match self.size {
                Some(size) => Some(size),
                None => {
                    return Err(DomainError::InvariantViolation(
                        "cone orders require a size".to_string(),
                    ))
                }
            },
            ItemKind::Cup => None,
        };
        let quantity = match self.quantity {
            Some(quantity) if (MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) => quantity,
            Some(quantity) => {
                return Err(DomainError::InvariantViolation(format!(
                    "order quantity {quantity} is outside {MIN_QUANTITY}..={MAX_QUANTITY}"
                )))
            }
            None => {
                return Err(DomainError::InvariantViolation(
                    "order quantity is not set".to_string(),
                ))
            }
        };

        Ok(CompleteOrder { kind, size, quantity })
    }
}

/// An order whose invariants have been checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub kind: ItemKind,
    pub size: Option<Size>,
    pub quantity: u32,
}

impl CompleteOrder {
    /// "a" for a single item, otherwise the count.
    pub fn quantity_phrase(&self) -> String {
        if self.quantity == 1 {
            "a".to_string()
        } else {
            self.quantity.to_string()
        }
    }

    /// "Large Cone" or "Cup".
    pub fn description(&self) -> String {
        match self.size {
            Some(size) => format!("{size} {}", self.kind),
            None => self.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CompleteOrder, ItemKind, OrderRecord, RecognizedOrder, Size};

    #[test]
    fn kind_and_size_parse_case_insensitively() {
        assert_eq!(" CONE ".parse::<ItemKind>().ok(), Some(ItemKind::Cone));
        assert_eq!("Cups".parse::<ItemKind>().ok(), Some(ItemKind::Cup));
        assert_eq!("Large".parse::<Size>().ok(), Some(Size::Large));
        assert!("sundae".parse::<ItemKind>().is_err());
        assert!("medium".parse::<Size>().is_err());
    }

    #[test]
    fn keywords_fill_kind_and_size_from_utterance() {
        let recognized = RecognizedOrder::from_keywords("Get me a Regular Cone ice cream!");
        assert_eq!(recognized.kind, Some(ItemKind::Cone));
        assert_eq!(recognized.size, Some(Size::Regular));

        let nothing = RecognizedOrder::from_keywords("hello there");
        assert!(nothing.is_empty());
    }

    #[test]
    fn explicit_recognition_wins_over_keywords() {
        let keywords = RecognizedOrder { kind: Some(ItemKind::Cup), size: Some(Size::Large) };
        let nlu = RecognizedOrder { kind: Some(ItemKind::Cone), size: None };

        let merged = keywords.merged_with(Some(&nlu));
        assert_eq!(merged.kind, Some(ItemKind::Cone));
        assert_eq!(merged.size, Some(Size::Large));
    }

    #[test]
    fn prefill_drops_size_for_cups() {
        let record = OrderRecord::prefilled(&RecognizedOrder {
            kind: Some(ItemKind::Cup),
            size: Some(Size::Large),
        });
        assert_eq!(record.item_kind, Some(ItemKind::Cup));
        assert_eq!(record.size, None);
        assert!(!record.needs_size());
    }

    #[test]
    fn complete_requires_size_for_cones_and_bounded_quantity() {
        let mut record =
            OrderRecord { item_kind: Some(ItemKind::Cone), size: None, quantity: Some(2) };
        assert!(record.needs_size());
        assert!(record.complete().is_err());

        record.size = Some(Size::Large);
        assert_eq!(
            record.complete().ok(),
            Some(CompleteOrder { kind: ItemKind::Cone, size: Some(Size::Large), quantity: 2 })
        );

        record.quantity = Some(21);
        assert!(record.complete().is_err());
        record.quantity = None;
        assert!(record.complete().is_err());
    }

    #[test]
    fn phrases_use_article_for_single_items() {
        let single = CompleteOrder { kind: ItemKind::Cup, size: None, quantity: 1 };
        let many = CompleteOrder { kind: ItemKind::Cone, size: Some(Size::Large), quantity: 3 };

        assert_eq!(single.quantity_phrase(), "a");
        assert_eq!(single.description(), "Cup");
        assert_eq!(many.quantity_phrase(), "3");
        assert_eq!(many.description(), "Large Cone");
    }
}
