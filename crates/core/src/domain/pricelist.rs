use serde::{Deserialize, Serialize};

use crate::domain::currency::Currencies;
use crate::domain::sku::Sku;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Buy,
    Sell,
    Bank,
}

impl Intent {
    pub fn allows_buying(self) -> bool {
        matches!(self, Self::Buy | Self::Bank)
    }

    pub fn allows_selling(self) -> bool {
        matches!(self, Self::Sell | Self::Bank)
    }
}

/// A pricelist row as published by the pricing subsystem. The engine only
/// reads these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricelistEntry {
    pub sku: Sku,
    pub name: String,
    pub enabled: bool,
    pub intent: Intent,
    pub min: u32,
    /// `None` means no upper stock bound.
    pub max: Option<u32>,
    pub buy: Currencies,
    pub sell: Currencies,
    pub autoprice: bool,
    pub time: Option<i64>,
}

impl PricelistEntry {
    /// Sell must be worth strictly more than buy once normalised.
    pub fn has_valid_spread(&self, key_scrap: i64) -> bool {
        self.sell.to_value(key_scrap) > self.buy.to_value(key_scrap)
    }
}
