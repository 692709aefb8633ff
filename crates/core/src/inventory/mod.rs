//! Per-identity inventory snapshots indexed by SKU.

mod manager;

pub use manager::{InventoryManager, TradeAllowance};

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::currency::CurrencyCounts;
use crate::domain::offer::EconItem;
use crate::domain::sku::Sku;
use crate::domain::SteamId;
use crate::errors::ProtocolError;
use crate::ports::TradeProtocol;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inventory {
    owner: SteamId,
    tradable: BTreeMap<Sku, Vec<String>>,
    non_tradable: BTreeMap<Sku, Vec<String>>,
}

impl Inventory {
    pub fn new(owner: SteamId) -> Self {
        Self { owner, tradable: BTreeMap::new(), non_tradable: BTreeMap::new() }
    }

    pub fn from_items(owner: SteamId, items: impl IntoIterator<Item = EconItem>) -> Self {
        let mut inventory = Self::new(owner);
        for item in items {
            let side = if item.tradable { &mut inventory.tradable } else { &mut inventory.non_tradable };
            let assets = side.entry(item.sku).or_default();
            if !assets.contains(&item.assetid) {
                assets.push(item.assetid);
            }
        }
        inventory
    }

    /// Loads a fresh snapshot. Transport failures are returned as-is.
    pub async fn fetch(protocol: &dyn TradeProtocol, owner: &SteamId) -> Result<Self, ProtocolError> {
        let items = protocol.fetch_inventory(owner).await?;
        let inventory = Self::from_items(owner.clone(), items);
        debug!(
            event_name = "inventory.fetched",
            owner = %owner,
            tradable = inventory.tradable_count(),
            "inventory loaded"
        );
        Ok(inventory)
    }

    pub fn owner(&self) -> &SteamId {
        &self.owner
    }

    /// Asset ids for `sku`; non-tradable ones follow the tradable ones when
    /// `tradable_only` is false.
    pub fn find_by_sku(&self, sku: &Sku, tradable_only: bool) -> Vec<String> {
        let mut assets = self.tradable.get(sku).cloned().unwrap_or_default();
        if !tradable_only {
            assets.extend(self.non_tradable.get(sku).into_iter().flatten().cloned());
        }
        assets
    }

    /// Tradable assets for `sku` that are not in `exclude`.
    pub fn find_available(&self, sku: &Sku, exclude: &BTreeSet<String>) -> Vec<String> {
        self.tradable
            .get(sku)
            .into_iter()
            .flatten()
            .filter(|asset| !exclude.contains(*asset))
            .cloned()
            .collect()
    }

    /// Tradable count for `sku`.
    pub fn get_amount(&self, sku: &Sku) -> u32 {
        self.tradable.get(sku).map_or(0, |assets| u32::try_from(assets.len()).unwrap_or(u32::MAX))
    }

    pub fn tradable_count(&self) -> usize {
        self.tradable.values().map(Vec::len).sum()
    }

    pub fn add_item(&mut self, sku: Sku, assetid: impl Into<String>) {
        let assetid = assetid.into();
        let assets = self.tradable.entry(sku).or_default();
        if !assets.contains(&assetid) {
            assets.push(assetid);
        }
    }

    /// Drops `assetid` from whichever SKU holds it. Returns whether it was
    /// present.
    pub fn remove_item(&mut self, assetid: &str) -> bool {
        for side in [&mut self.tradable, &mut self.non_tradable] {
            let mut emptied = None;
            let mut removed = false;
            for (sku, assets) in side.iter_mut() {
                if let Some(position) = assets.iter().position(|asset| asset == assetid) {
                    assets.remove(position);
                    removed = true;
                    if assets.is_empty() {
                        emptied = Some(sku.clone());
                    }
                    break;
                }
            }
            if let Some(sku) = emptied {
                side.remove(&sku);
            }
            if removed {
                return true;
            }
        }
        false
    }

    /// Tradable currency counts, ignoring assets in `exclude`.
    pub fn currency_counts(&self, exclude: &BTreeSet<String>) -> CurrencyCounts {
        let count = |sku: Sku| u32::try_from(self.find_available(&sku, exclude).len()).unwrap_or(u32::MAX);
        CurrencyCounts {
            keys: count(Sku::key()),
            refined: count(Sku::refined()),
            reclaimed: count(Sku::reclaimed()),
            scrap: count(Sku::scrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::Inventory;
    use crate::domain::currency::CurrencyCounts;
    use crate::domain::offer::EconItem;
    use crate::domain::sku::Sku;
    use crate::domain::SteamId;

    fn sample() -> Inventory {
        Inventory::from_items(
            SteamId::new("76561198000000001"),
            vec![
                EconItem::tf2("1", Sku::refined(), true),
                EconItem::tf2("2", Sku::refined(), true),
                EconItem::tf2("3", Sku::scrap(), true),
                EconItem::tf2("4", Sku::key(), false),
                EconItem::tf2("5", "263;6", true),
            ],
        )
    }

    #[test]
    fn partitions_tradable_items() {
        let inventory = sample();
        assert_eq!(inventory.get_amount(&Sku::refined()), 2);
        assert_eq!(inventory.get_amount(&Sku::key()), 0);
        assert_eq!(inventory.find_by_sku(&Sku::key(), false), vec!["4".to_string()]);
        assert!(inventory.find_by_sku(&Sku::key(), true).is_empty());
        assert_eq!(inventory.tradable_count(), 4);
    }

    #[test]
    fn add_and_remove_keep_index_consistent() {
        let mut inventory = sample();
        inventory.add_item(Sku::new("263;6"), "6");
        inventory.add_item(Sku::new("263;6"), "6");
        assert_eq!(inventory.get_amount(&Sku::new("263;6")), 2);

        assert!(inventory.remove_item("5"));
        assert!(inventory.remove_item("6"));
        assert!(!inventory.remove_item("6"));
        assert_eq!(inventory.get_amount(&Sku::new("263;6")), 0);
        assert!(inventory.remove_item("4"));
    }

    #[test]
    fn currency_counts_skip_excluded_assets() {
        let inventory = sample();
        let exclude = BTreeSet::from(["2".to_string()]);
        assert_eq!(
            inventory.currency_counts(&exclude),
            CurrencyCounts { keys: 0, refined: 1, reclaimed: 0, scrap: 1 }
        );
        assert_eq!(inventory.find_available(&Sku::refined(), &exclude), vec!["1".to_string()]);
    }
}
