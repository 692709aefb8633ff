//! Per-partner carts
//!
//! A cart holds the desired SKU counts on both sides of a trade, turns them
//! into a protocol offer against live inventories and hands the offer to
//! `Trades`. `UserCart` prices the exchange and settles the difference in
//! currency, `AdminCart` moves items without valuation.

mod admin;
mod queue;
mod user;

pub use admin::AdminCart;
pub use queue::{CartQueue, CartSnapshot};
pub use user::UserCart;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::offer::{ItemDiff, Offer, OfferItem, OfferStatus};
use crate::domain::sku::{quantity_label, Sku};
use crate::domain::SteamId;
use crate::errors::{CartError, TradeError};
use crate::inventory::{Inventory, InventoryManager};
use crate::ports::{BanChecker, Pricelist, TradeProtocol};
use crate::trades::Trades;

/// Shared collaborators every cart needs.
pub struct CartServices {
    pub trades: Arc<Trades>,
    pub pricelist: Arc<dyn Pricelist>,
    pub bans: Arc<dyn BanChecker>,
    pub offer_message: String,
}

impl CartServices {
    pub fn protocol(&self) -> &Arc<dyn TradeProtocol> {
        self.trades.protocol()
    }

    pub fn inventory(&self) -> &Arc<InventoryManager> {
        self.trades.inventory()
    }

    pub fn item_name(&self, sku: &Sku) -> String {
        item_name(self.pricelist.as_ref(), sku)
    }
}

/// Desired counts per side. Counts are always positive; a count that
/// reaches zero removes the SKU.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartLedger {
    our: BTreeMap<Sku, u32>,
    their: BTreeMap<Sku, u32>,
}

impl CartLedger {
    fn adjust(side: &mut BTreeMap<Sku, u32>, sku: Sku, amount: i64) {
        let current = side.get(&sku).copied().map_or(0, i64::from);
        let next = current + amount;
        if next <= 0 {
            side.remove(&sku);
        } else {
            side.insert(sku, u32::try_from(next).unwrap_or(u32::MAX));
        }
    }

    pub fn add_our(&mut self, sku: Sku, amount: i64) {
        Self::adjust(&mut self.our, sku, amount);
    }

    pub fn add_their(&mut self, sku: Sku, amount: i64) {
        Self::adjust(&mut self.their, sku, amount);
    }

    pub fn set_our(&mut self, sku: Sku, amount: u32) {
        self.our.remove(&sku);
        self.add_our(sku, i64::from(amount));
    }

    pub fn set_their(&mut self, sku: Sku, amount: u32) {
        self.their.remove(&sku);
        self.add_their(sku, i64::from(amount));
    }

    pub fn our(&self) -> &BTreeMap<Sku, u32> {
        &self.our
    }

    pub fn their(&self) -> &BTreeMap<Sku, u32> {
        &self.their
    }

    pub fn our_amount(&self, sku: &Sku) -> u32 {
        self.our.get(sku).copied().unwrap_or(0)
    }

    pub fn their_amount(&self, sku: &Sku) -> u32 {
        self.their.get(sku).copied().unwrap_or(0)
    }

    pub fn contains_keys(&self) -> bool {
        self.our.keys().chain(self.their.keys()).any(Sku::is_key)
    }

    pub fn is_empty(&self) -> bool {
        self.our.is_empty() && self.their.is_empty()
    }

    pub fn clear(&mut self) {
        self.our.clear();
        self.their.clear();
    }

    pub fn as_diff(&self) -> ItemDiff {
        ItemDiff { our: self.our.clone(), their: self.their.clone() }
    }
}

#[async_trait]
pub trait Cart: Send + Sync {
    fn partner(&self) -> &SteamId;
    fn services(&self) -> &CartServices;
    fn ledger(&self) -> &CartLedger;
    fn ledger_mut(&mut self) -> &mut CartLedger;
    fn offer(&self) -> Option<&Offer>;
    fn offer_mut(&mut self) -> Option<&mut Offer>;

    /// Fills the offer draft from the ledger. Returns an alteration message
    /// when requested amounts had to be reduced.
    async fn construct_offer(&mut self) -> Result<Option<String>, CartError>;

    /// Last checks before the offer leaves the process.
    async fn pre_send_offer(&self) -> Result<(), CartError> {
        Ok(())
    }

    fn add_our_item(&mut self, sku: Sku, amount: i64) {
        self.ledger_mut().add_our(sku, amount);
    }

    fn add_their_item(&mut self, sku: Sku, amount: i64) {
        self.ledger_mut().add_their(sku, amount);
    }

    fn remove_our_item(&mut self, sku: Sku, amount: i64) {
        self.ledger_mut().add_our(sku, -amount);
    }

    fn remove_their_item(&mut self, sku: Sku, amount: i64) {
        self.ledger_mut().add_their(sku, -amount);
    }

    fn clear(&mut self) {
        self.ledger_mut().clear();
    }

    fn is_empty(&self) -> bool {
        self.ledger().is_empty()
    }

    async fn send_offer(&mut self) -> Result<OfferStatus, CartError> {
        self.pre_send_offer().await?;
        let trades = Arc::clone(&self.services().trades);
        let offer = self.offer_mut().ok_or(CartError::NotConstructed)?;
        trades.send_offer(offer).await.map_err(translate_send_error)
    }

    /// `"You will be offered X for Y"`, including currency once constructed.
    fn summary(&self) -> String {
        let diff = self.offer().and_then(|offer| offer.data.dict.clone()).unwrap_or_else(|| self.ledger().as_diff());
        let pricelist = self.services().pricelist.as_ref();
        format!(
            "You will be offered {} for {}",
            describe_items(pricelist, &diff.our),
            describe_items(pricelist, &diff.their)
        )
    }
}

/// Known protocol failures become fixed partner-facing reasons; anything
/// else stays opaque.
pub fn translate_send_error(error: TradeError) -> CartError {
    if let Some(reason) = error.protocol().and_then(|protocol| protocol.user_reason()) {
        return CartError::rejected(reason);
    }
    match error {
        TradeError::AlreadyReserved { .. } => {
            CartError::rejected("one or more of the items is already in another trade, please try again later")
        }
        other => CartError::Trade(other),
    }
}

pub fn item_name(pricelist: &dyn Pricelist, sku: &Sku) -> String {
    if let Some(name) = sku.builtin_name() {
        return name.to_owned();
    }
    pricelist.get_price(sku).map(|entry| entry.name).unwrap_or_else(|| sku.to_string())
}

pub fn describe_items(pricelist: &dyn Pricelist, items: &BTreeMap<Sku, u32>) -> String {
    if items.is_empty() {
        return "nothing".to_owned();
    }
    items
        .iter()
        .map(|(sku, amount)| quantity_label(*amount, &item_name(pricelist, sku)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Takes up to `amount` tradable assets of `sku` that are not in `used`,
/// marking them used.
pub(crate) fn pick_assets(inventory: &Inventory, sku: &Sku, amount: u32, used: &mut BTreeSet<String>) -> Vec<OfferItem> {
    let picked: Vec<String> = inventory.find_available(sku, used).into_iter().take(amount as usize).collect();
    used.extend(picked.iter().cloned());
    picked.into_iter().map(OfferItem::tf2).collect()
}

pub(crate) fn join_alterations(alterations: Vec<String>) -> Option<String> {
    if alterations.is_empty() {
        None
    } else {
        Some(alterations.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{describe_items, translate_send_error, CartLedger};
    use crate::domain::sku::Sku;
    use crate::errors::{CartError, EResult, ProtocolError, TradeError};
    use crate::memory::StaticPricelist;

    #[test]
    fn ledger_counts_delete_at_zero() {
        let mut ledger = CartLedger::default();
        ledger.add_our(Sku::key(), 2);
        ledger.add_our(Sku::key(), -1);
        assert_eq!(ledger.our_amount(&Sku::key()), 1);
        ledger.add_our(Sku::key(), -5);
        assert!(ledger.our().is_empty());

        ledger.add_their(Sku::new("263;6"), -3);
        assert!(ledger.is_empty());
        ledger.set_their(Sku::new("263;6"), 4);
        assert_eq!(ledger.their_amount(&Sku::new("263;6")), 4);
        assert!(!ledger.contains_keys());
    }

    #[test]
    fn known_send_failures_become_reasons() {
        let friends = translate_send_error(TradeError::Protocol(ProtocolError::FriendsOnly));
        assert!(matches!(friends, CartError::Rejected(ref reason) if reason.contains("friends")));

        let limited = translate_send_error(TradeError::AttemptsExhausted {
            operation: "send",
            attempts: 5,
            source: ProtocolError::result(EResult::LimitExceeded, "slow down"),
        });
        assert!(limited.user_reason().is_some());

        let opaque = translate_send_error(TradeError::Protocol(ProtocolError::Transport("eof".into())));
        assert!(matches!(opaque, CartError::Trade(_)));
    }

    #[test]
    fn item_descriptions_use_builtin_names() {
        let pricelist = StaticPricelist::new(Decimal::new(5011, 2));
        let items = [(Sku::refined(), 1), (Sku::scrap(), 3)].into_iter().collect();
        assert_eq!(describe_items(&pricelist, &items), "1 Refined Metal, 3 x Scrap Metal");
        assert_eq!(describe_items(&pricelist, &Default::default()), "nothing");
    }
}
