use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{CompleteOrder, ItemKind, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub unit_price: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

impl Price {
    /// Dollar amount with two fraction digits, e.g. `$11.25`.
    pub fn display_total(&self) -> String {
        format_usd(self.total)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_total())
    }
}

/// Fixed price table: cup $1.00, regular cone $2.50, large cone $3.75.
#[derive(Clone, Copy, Debug, Default)]
pub struct PriceCalculator;

impl PriceCalculator {
    pub fn unit_price(&self, kind: ItemKind, size: Option<Size>) -> Decimal {
        match (kind, size) {
            (ItemKind::Cup, _) => Decimal::new(100, 2),
            (ItemKind::Cone, Some(Size::Large)) => Decimal::new(375, 2),
            (ItemKind::Cone, Some(Size::Regular) | None) => Decimal::new(250, 2),
        }
    }

    pub fn price(&self, order: &CompleteOrder) -> Price {
        let unit_price = self.unit_price(order.kind, order.size);
        let total = unit_price * Decimal::from(order.quantity);
        Price { unit_price, quantity: order.quantity, total }
    }
}

pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    format!("${rounded:.2}")
}
