use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use super::Inventory;
use crate::domain::sku::Sku;
use crate::errors::ProtocolError;
use crate::ports::{Pricelist, TradeProtocol};

/// How many more units of a SKU the stock policy allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeAllowance {
    Unlimited,
    Limited(u32),
}

impl TradeAllowance {
    pub fn cap(self, wanted: u32) -> u32 {
        match self {
            Self::Unlimited => wanted,
            Self::Limited(limit) => wanted.min(limit),
        }
    }
}

/// The bot's own long-lived inventory plus the pricelist stock bounds.
pub struct InventoryManager {
    inventory: RwLock<Inventory>,
    pricelist: Arc<dyn Pricelist>,
}

impl InventoryManager {
    pub fn new(inventory: Inventory, pricelist: Arc<dyn Pricelist>) -> Self {
        Self { inventory: RwLock::new(inventory), pricelist }
    }

    pub fn pricelist(&self) -> &Arc<dyn Pricelist> {
        &self.pricelist
    }

    pub fn inventory(&self) -> RwLockReadGuard<'_, Inventory> {
        match self.inventory.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn inventory_mut(&self) -> RwLockWriteGuard<'_, Inventory> {
        match self.inventory.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Remaining room under the pricelist max when buying, or stock above
    /// the pricelist min when selling. Unpriced SKUs can't be traded.
    pub fn amount_can_trade(&self, sku: &Sku, buying: bool) -> TradeAllowance {
        let Some(entry) = self.pricelist.get_price(sku) else {
            return TradeAllowance::Limited(0);
        };
        let current = i64::from(self.inventory().get_amount(sku));

        let room = if buying {
            match entry.max {
                None => return TradeAllowance::Unlimited,
                Some(max) => i64::from(max) - current,
            }
        } else {
            current - i64::from(entry.min)
        };

        TradeAllowance::Limited(u32::try_from(room.max(0)).unwrap_or(u32::MAX))
    }

    /// Whether changing our stock of `sku` by `diff` (positive when buying,
    /// negative when selling) breaks the bound.
    pub fn is_overstocked(&self, sku: &Sku, buying: bool, diff: i64) -> bool {
        match self.amount_can_trade(sku, buying) {
            TradeAllowance::Unlimited => false,
            TradeAllowance::Limited(limit) => {
                let limit = i64::from(limit);
                if buying {
                    limit - diff < 0
                } else {
                    limit + diff < 0
                }
            }
        }
    }

    pub fn remove_items<'a>(&self, assetids: impl IntoIterator<Item = &'a str>) {
        let mut inventory = self.inventory_mut();
        for assetid in assetids {
            inventory.remove_item(assetid);
        }
    }

    pub fn replace(&self, inventory: Inventory) {
        *self.inventory_mut() = inventory;
    }

    pub async fn refresh(&self, protocol: &dyn TradeProtocol) -> Result<(), ProtocolError> {
        let owner = self.inventory().owner().clone();
        let fresh = Inventory::fetch(protocol, &owner).await?;
        let tradable = fresh.tradable_count();
        self.replace(fresh);
        info!(event_name = "inventory.refreshed", owner = %owner, tradable, "own inventory refreshed");
        Ok(())
    }
}
