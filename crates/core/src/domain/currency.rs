use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::sku::{Sku, KEY_SKU, RECLAIMED_SKU, REFINED_SKU, SCRAP_SKU};

pub const SCRAP_PER_REFINED: i64 = 9;
pub const SCRAP_PER_RECLAIMED: i64 = 3;

/// Converts conventional refined notation (`1.33` = 1 refined + 3 scrap)
/// into scrap. Each hundredth step of 0.11 is one scrap.
pub fn refined_to_scrap(metal: Decimal) -> i64 {
    let negative = metal.is_sign_negative();
    let metal = metal.abs();
    let whole = metal.trunc();
    let fraction = metal - whole;
    let scrap = whole.to_i64().unwrap_or_default() * SCRAP_PER_REFINED
        + (fraction * Decimal::from(100) / Decimal::from(11)).round().to_i64().unwrap_or_default();
    if negative {
        -scrap
    } else {
        scrap
    }
}

pub fn scrap_to_refined(scrap: i64) -> Decimal {
    let magnitude = scrap.abs();
    let refined = Decimal::from(magnitude / SCRAP_PER_REFINED)
        + Decimal::new((magnitude % SCRAP_PER_REFINED) * 11, 2);
    if scrap < 0 {
        -refined
    } else {
        refined
    }
}

/// A price as keys plus metal. All arithmetic goes through scrap; keys are
/// only comparable to metal once normalised with the current key rate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currencies {
    pub keys: u32,
    pub metal: Decimal,
}

impl Currencies {
    pub fn new(keys: u32, metal: Decimal) -> Self {
        Self { keys, metal }
    }

    pub fn metal_only(metal: Decimal) -> Self {
        Self { keys: 0, metal }
    }

    /// Normalised value in scrap, using `key_scrap` as the key rate.
    pub fn to_value(&self, key_scrap: i64) -> i64 {
        i64::from(self.keys) * key_scrap + refined_to_scrap(self.metal)
    }

    /// Splits a scrap value into whole keys plus metal.
    pub fn from_value(value: i64, key_scrap: i64) -> Self {
        if key_scrap <= 0 || value < key_scrap {
            return Self::metal_only(scrap_to_refined(value));
        }
        let keys = value / key_scrap;
        Self {
            keys: u32::try_from(keys).unwrap_or(u32::MAX),
            metal: scrap_to_refined(value % key_scrap),
        }
    }
}

impl fmt::Display for Currencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.keys > 0 {
            parts.push(format!("{} {}", self.keys, if self.keys == 1 { "key" } else { "keys" }));
        }
        if !self.metal.is_zero() || self.keys == 0 {
            parts.push(format!("{} ref", self.metal.normalize()));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Physical currency item counts, one field per denomination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyCounts {
    pub keys: u32,
    pub refined: u32,
    pub reclaimed: u32,
    pub scrap: u32,
}

impl CurrencyCounts {
    pub fn metal_value(&self) -> i64 {
        i64::from(self.refined) * SCRAP_PER_REFINED
            + i64::from(self.reclaimed) * SCRAP_PER_RECLAIMED
            + i64::from(self.scrap)
    }

    pub fn value(&self, key_scrap: i64) -> i64 {
        i64::from(self.keys) * key_scrap + self.metal_value()
    }

    pub fn is_empty(&self) -> bool {
        self.keys == 0 && self.refined == 0 && self.reclaimed == 0 && self.scrap == 0
    }

    pub fn without_keys(mut self) -> Self {
        self.keys = 0;
        self
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            keys: self.keys.saturating_sub(other.keys),
            refined: self.refined.saturating_sub(other.refined),
            reclaimed: self.reclaimed.saturating_sub(other.reclaimed),
            scrap: self.scrap.saturating_sub(other.scrap),
        }
    }

    /// Currency units found among `(sku, amount)` pairs.
    pub fn from_skus<'a>(items: impl IntoIterator<Item = (&'a Sku, &'a u32)>) -> Self {
        let mut counts = Self::default();
        for (sku, amount) in items {
            match sku.as_str() {
                KEY_SKU => counts.keys += amount,
                REFINED_SKU => counts.refined += amount,
                RECLAIMED_SKU => counts.reclaimed += amount,
                SCRAP_SKU => counts.scrap += amount,
                _ => {}
            }
        }
        counts
    }

    /// Non-zero denominations as `(sku, amount)`, keys first.
    pub fn by_sku(&self) -> Vec<(Sku, u32)> {
        [
            (Sku::key(), self.keys),
            (Sku::refined(), self.refined),
            (Sku::reclaimed(), self.reclaimed),
            (Sku::scrap(), self.scrap),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{refined_to_scrap, scrap_to_refined, Currencies, CurrencyCounts};
    use crate::domain::sku::Sku;

    #[test]
    fn refined_notation_converts_exactly() {
        assert_eq!(refined_to_scrap(Decimal::new(133, 2)), 12);
        assert_eq!(refined_to_scrap(Decimal::new(88, 2)), 8);
        assert_eq!(refined_to_scrap(Decimal::new(5011, 2)), 451);
        assert_eq!(scrap_to_refined(12), Decimal::new(133, 2));
        assert_eq!(scrap_to_refined(451), Decimal::new(5011, 2));
        assert_eq!(scrap_to_refined(-4), Decimal::new(-44, 2));
    }

    #[test]
    fn value_normalises_keys_through_rate() {
        let price = Currencies::new(2, Decimal::new(133, 2));
        assert_eq!(price.to_value(451), 2 * 451 + 12);
        assert_eq!(Currencies::from_value(2 * 451 + 12, 451), price);
        assert_eq!(Currencies::from_value(12, 451), Currencies::metal_only(Decimal::new(133, 2)));
    }

    #[test]
    fn display_matches_trading_convention() {
        assert_eq!(Currencies::new(1, Decimal::new(233, 2)).to_string(), "1 key, 2.33 ref");
        assert_eq!(Currencies::new(3, Decimal::ZERO).to_string(), "3 keys");
        assert_eq!(Currencies::default().to_string(), "0 ref");
        assert_eq!(Currencies::metal_only(Decimal::new(500, 2)).to_string(), "5 ref");
    }

    #[test]
    fn counts_value_includes_every_denomination() {
        let counts = CurrencyCounts { keys: 1, refined: 2, reclaimed: 1, scrap: 2 };
        assert_eq!(counts.value(450), 450 + 18 + 3 + 2);
        assert_eq!(counts.without_keys().value(450), 23);
    }

    #[test]
    fn counts_read_currency_skus_only() {
        let items = BTreeMap::from([(Sku::key(), 2), (Sku::scrap(), 3), (Sku::new("263;6"), 1)]);
        let counts = CurrencyCounts::from_skus(&items);
        assert_eq!(counts, CurrencyCounts { keys: 2, refined: 0, reclaimed: 0, scrap: 3 });
        assert_eq!(counts.by_sku(), vec![(Sku::key(), 2), (Sku::scrap(), 3)]);
        let left = counts.saturating_sub(CurrencyCounts { keys: 3, refined: 0, reclaimed: 0, scrap: 1 });
        assert_eq!(left, CurrencyCounts { keys: 0, refined: 0, reclaimed: 0, scrap: 2 });
    }
}
