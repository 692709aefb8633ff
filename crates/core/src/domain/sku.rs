use std::fmt;

use serde::{Deserialize, Serialize};

/// Item signature (`defindex;quality[;modifiers]`), the join key between
/// inventories and the pricelist.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(pub String);

pub const KEY_SKU: &str = "5021;6";
pub const REFINED_SKU: &str = "5002;6";
pub const RECLAIMED_SKU: &str = "5001;6";
pub const SCRAP_SKU: &str = "5000;6";

impl Sku {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn key() -> Self {
        Self::new(KEY_SKU)
    }

    pub fn refined() -> Self {
        Self::new(REFINED_SKU)
    }

    pub fn reclaimed() -> Self {
        Self::new(RECLAIMED_SKU)
    }

    pub fn scrap() -> Self {
        Self::new(SCRAP_SKU)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_key(&self) -> bool {
        self.0 == KEY_SKU
    }

    pub fn is_metal(&self) -> bool {
        matches!(self.0.as_str(), REFINED_SKU | RECLAIMED_SKU | SCRAP_SKU)
    }

    pub fn is_currency(&self) -> bool {
        self.is_key() || self.is_metal()
    }

    /// Display names for the currency items, which are never looked up in
    /// the pricelist.
    pub fn builtin_name(&self) -> Option<&'static str> {
        match self.0.as_str() {
            KEY_SKU => Some("Mann Co. Supply Crate Key"),
            REFINED_SKU => Some("Refined Metal"),
            RECLAIMED_SKU => Some("Reclaimed Metal"),
            SCRAP_SKU => Some("Scrap Metal"),
            _ => None,
        }
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Sku {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// `"1 Refined Metal"` / `"3 x Refined Metal"` style quantity label.
pub fn quantity_label(amount: u32, name: &str) -> String {
    if amount == 1 {
        format!("1 {name}")
    } else {
        format!("{amount} x {name}")
    }
}
