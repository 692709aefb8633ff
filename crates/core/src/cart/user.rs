use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{join_alterations, pick_assets, Cart, CartLedger, CartServices};
use crate::currency_allocator::CurrencyAllocator;
use crate::domain::currency::{Currencies, CurrencyCounts, SCRAP_PER_RECLAIMED, SCRAP_PER_REFINED};
use crate::domain::offer::{ItemDiff, Offer, OfferData, SideValue, ValueBreakdown};
use crate::domain::pricelist::PricelistEntry;
use crate::domain::sku::Sku;
use crate::domain::SteamId;
use crate::errors::CartError;
use crate::inventory::Inventory;

/// Which side pays the value difference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Payer {
    Us,
    Them,
}

/// Priced cart for regular partners.
pub struct UserCart {
    partner: SteamId,
    services: Arc<CartServices>,
    ledger: CartLedger,
    offer: Option<Offer>,
}

impl UserCart {
    pub fn new(partner: SteamId, services: Arc<CartServices>) -> Self {
        Self { partner, services, ledger: CartLedger::default(), offer: None }
    }

    /// Entry for a priced SKU, checked for the trade direction. Metal is
    /// valued at face value and has no entry.
    fn checked_entry(&self, sku: &Sku, we_sell: bool, key_scrap: i64) -> Result<Option<PricelistEntry>, CartError> {
        if sku.is_metal() {
            return Ok(None);
        }
        let name = self.services.item_name(sku);
        let entry = self
            .services
            .pricelist
            .get_price(sku)
            .filter(|entry| entry.enabled)
            .ok_or_else(|| CartError::rejected(format!("{name} is not in my pricelist")))?;

        if we_sell && !entry.intent.allows_selling() {
            return Err(CartError::rejected(format!("I am only buying {name}")));
        }
        if !we_sell && !entry.intent.allows_buying() {
            return Err(CartError::rejected(format!("I am only selling {name}")));
        }
        if !entry.has_valid_spread(key_scrap) {
            return Err(CartError::rejected(format!("{name} has an invalid price, please try again later")));
        }
        Ok(Some(entry))
    }

    fn unit_value(sku: &Sku, entry: Option<&PricelistEntry>, we_sell: bool, key_scrap: i64) -> i64 {
        match entry {
            Some(entry) if we_sell => entry.sell.to_value(key_scrap),
            Some(entry) => entry.buy.to_value(key_scrap),
            None => metal_scrap(sku),
        }
    }

    fn validate_prices(&self, key_scrap: i64) -> Result<(i64, i64), CartError> {
        let mut our_value = 0;
        for (sku, amount) in self.ledger.our() {
            let entry = self.checked_entry(sku, true, key_scrap)?;
            our_value += Self::unit_value(sku, entry.as_ref(), true, key_scrap) * i64::from(*amount);
        }
        let mut their_value = 0;
        for (sku, amount) in self.ledger.their() {
            let entry = self.checked_entry(sku, false, key_scrap)?;
            their_value += Self::unit_value(sku, entry.as_ref(), false, key_scrap) * i64::from(*amount);
        }
        Ok((our_value, their_value))
    }

    /// Caps our side at what we hold outside other trades and what the stock
    /// policy lets us sell.
    fn limit_our_side(&mut self, inventory: &Inventory, reserved: &BTreeSet<String>, alterations: &mut Vec<String>) {
        let manager = Arc::clone(self.services.inventory());
        for (sku, wanted) in self.ledger.our().clone() {
            let name = self.services.item_name(&sku);
            let held = u32::try_from(inventory.find_available(&sku, reserved).len()).unwrap_or(u32::MAX);
            let policy = if sku.is_metal() { wanted } else { manager.amount_can_trade(&sku, false).cap(wanted) };
            let allowed = wanted.min(held).min(policy);
            if allowed == wanted {
                continue;
            }
            alterations.push(if held <= policy {
                if held == 0 {
                    format!("I don't have any {name}")
                } else {
                    format!("I only have {held} {name}")
                }
            } else {
                format!("I can only sell {policy} more {name}")
            });
            self.ledger.set_our(sku, allowed);
        }
    }

    fn limit_their_side(&mut self, inventory: &Inventory, alterations: &mut Vec<String>) {
        let manager = Arc::clone(self.services.inventory());
        for (sku, wanted) in self.ledger.their().clone() {
            let name = self.services.item_name(&sku);
            let held = inventory.get_amount(&sku);
            let policy = if sku.is_metal() { wanted } else { manager.amount_can_trade(&sku, true).cap(wanted) };
            let allowed = wanted.min(held).min(policy);
            if allowed == wanted {
                continue;
            }
            alterations.push(if held <= policy {
                if held == 0 {
                    format!("you don't have any {name}")
                } else {
                    format!("you only have {held} {name}")
                }
            } else {
                format!("I can only buy {policy} more {name}")
            });
            self.ledger.set_their(sku, allowed);
        }
    }
}

fn metal_scrap(sku: &Sku) -> i64 {
    if *sku == Sku::refined() {
        SCRAP_PER_REFINED
    } else if *sku == Sku::reclaimed() {
        SCRAP_PER_RECLAIMED
    } else if *sku == Sku::scrap() {
        1
    } else {
        0
    }
}

/// Metal-only change: refined, then reclaimed, then scrap, floored and
/// capped at `available`. Returns the picks and what could not be covered.
pub(crate) fn make_change(amount: i64, available: CurrencyCounts) -> (CurrencyCounts, i64) {
    let mut remaining = amount;
    let mut picks = CurrencyCounts::default();
    for (value, supply, slot) in [
        (SCRAP_PER_REFINED, available.refined, &mut picks.refined),
        (SCRAP_PER_RECLAIMED, available.reclaimed, &mut picks.reclaimed),
        (1, available.scrap, &mut picks.scrap),
    ] {
        let take = (remaining / value).min(i64::from(supply)).max(0);
        *slot = u32::try_from(take).unwrap_or(0);
        remaining -= take * value;
    }
    (picks, remaining)
}

fn side_value(total: i64, key_scrap: i64) -> SideValue {
    let split = Currencies::from_value(total, key_scrap);
    SideValue { total, keys: split.keys, metal: split.metal }
}

fn merge_currency(items: &BTreeMap<Sku, u32>, currency: CurrencyCounts) -> BTreeMap<Sku, u32> {
    let mut merged = items.clone();
    for (sku, amount) in currency.by_sku() {
        *merged.entry(sku).or_default() += amount;
    }
    merged
}

#[async_trait]
impl Cart for UserCart {
    fn partner(&self) -> &SteamId {
        &self.partner
    }

    fn services(&self) -> &CartServices {
        &self.services
    }

    fn ledger(&self) -> &CartLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut CartLedger {
        &mut self.ledger
    }

    fn offer(&self) -> Option<&Offer> {
        self.offer.as_ref()
    }

    fn offer_mut(&mut self) -> Option<&mut Offer> {
        self.offer.as_mut()
    }

    async fn construct_offer(&mut self) -> Result<Option<String>, CartError> {
        if self.ledger.is_empty() {
            return Err(CartError::Empty);
        }
        let services = Arc::clone(&self.services);
        let key_scrap = services.pricelist.key_scrap();
        self.validate_prices(key_scrap)?;

        let reserved = services.trades.items_in_trade();
        let own = services.inventory().inventory().clone();
        let mut alterations = Vec::new();
        self.limit_our_side(&own, &reserved, &mut alterations);

        let theirs = Inventory::fetch(services.protocol().as_ref(), &self.partner).await.map_err(CartError::Inventory)?;
        self.limit_their_side(&theirs, &mut alterations);

        if self.ledger.is_empty() {
            debug!(partner = %self.partner, "nothing left in cart after alterations");
            self.offer = None;
            return Ok(join_alterations(alterations));
        }

        let (our_value, their_value) = self.validate_prices(key_scrap)?;
        let use_keys = !self.ledger.contains_keys();
        let (payer, price) = if our_value >= their_value {
            (Payer::Them, our_value - their_value)
        } else {
            (Payer::Us, their_value - our_value)
        };

        let own_currency = own.currency_counts(&reserved).saturating_sub(CurrencyCounts::from_skus(self.ledger.our()));
        let their_currency = theirs
            .currency_counts(&BTreeSet::new())
            .saturating_sub(CurrencyCounts::from_skus(self.ledger.their()));

        let mut our_currency = CurrencyCounts::default();
        let mut their_currency_picks = CurrencyCounts::default();
        if price > 0 {
            let (payer_supply, payee_supply) = match payer {
                Payer::Us => (own_currency, their_currency),
                Payer::Them => (their_currency, own_currency),
            };
            let payer_supply = if use_keys { payer_supply } else { payer_supply.without_keys() };
            if payer_supply.value(key_scrap) < price {
                return Err(CartError::rejected(match payer {
                    Payer::Us => "I don't have enough pure",
                    Payer::Them => "you don't have enough pure",
                }));
            }

            let allocation = CurrencyAllocator::new(key_scrap).allocate(price, payer_supply, use_keys);
            if allocation.change > 0 {
                return Err(CartError::rejected(match payer {
                    Payer::Us => "I don't have enough pure",
                    Payer::Them => "you don't have enough pure",
                }));
            }

            let mut change = CurrencyCounts::default();
            if allocation.change < 0 {
                let (picks, missing) = make_change(-allocation.change, payee_supply);
                if missing > 0 {
                    return Err(CartError::rejected(match payer {
                        Payer::Them => format!("I don't have enough metal to give you change, missing {missing} scrap"),
                        Payer::Us => format!("you don't have enough metal to give me change, missing {missing} scrap"),
                    }));
                }
                change = picks;
            }

            match payer {
                Payer::Us => {
                    our_currency = allocation.picks;
                    their_currency_picks = change;
                }
                Payer::Them => {
                    their_currency_picks = allocation.picks;
                    our_currency = change;
                }
            }
            debug!(
                partner = %self.partner,
                price,
                payer = ?payer,
                change = allocation.change,
                "currency allocated"
            );
        }

        let mut offer = services.protocol().create_offer(&self.partner);
        offer.message = services.offer_message.clone();

        let our_items = merge_currency(self.ledger.our(), our_currency);
        let their_items = merge_currency(self.ledger.their(), their_currency_picks);

        let mut used = reserved;
        for (sku, amount) in &our_items {
            for item in pick_assets(&own, sku, *amount, &mut used) {
                offer.add_my_item(item);
            }
        }
        let mut their_used = BTreeSet::new();
        for (sku, amount) in &their_items {
            for item in pick_assets(&theirs, sku, *amount, &mut their_used) {
                offer.add_their_item(item);
            }
        }

        let our_total = our_value + our_currency.value(key_scrap);
        let their_total = their_value + their_currency_picks.value(key_scrap);
        offer.data = OfferData {
            dict: Some(ItemDiff { our: our_items, their: their_items }),
            value: Some(ValueBreakdown {
                our: side_value(our_total, key_scrap),
                their: side_value(their_total, key_scrap),
                rate: services.pricelist.key_price(),
            }),
            ..OfferData::default()
        };

        info!(
            event_name = "cart.offer_constructed",
            partner = %self.partner,
            give = offer.items_to_give.len(),
            receive = offer.items_to_receive.len(),
            our_total,
            their_total,
            "offer constructed"
        );
        self.offer = Some(offer);
        Ok(join_alterations(alterations))
    }

    async fn pre_send_offer(&self) -> Result<(), CartError> {
        match self.services.bans.is_banned(&self.partner).await {
            Ok(false) => {}
            Ok(true) => {
                return Err(CartError::rejected("you are banned in one or more trading communities"));
            }
            Err(check_error) => {
                info!(partner = %self.partner, error = %check_error, "ban check failed");
                return Err(CartError::rejected("I could not check your ban status, please try again later"));
            }
        }

        match self.services.protocol().get_escrow_days(&self.partner).await {
            Ok(0) => Ok(()),
            Ok(days) => Err(CartError::rejected(format!(
                "the trade would be held for {days} days, I don't accept trades with escrow"
            ))),
            Err(escrow_error) => {
                info!(partner = %self.partner, error = %escrow_error, "escrow check failed");
                Err(CartError::rejected("I could not check for trade holds, please try again later"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::make_change;
    use crate::domain::currency::CurrencyCounts;

    #[test]
    fn change_is_made_from_metal_only() {
        let available = CurrencyCounts { keys: 4, refined: 1, reclaimed: 2, scrap: 1 };
        let (picks, missing) = make_change(16, available);
        assert_eq!(picks, CurrencyCounts { keys: 0, refined: 1, reclaimed: 2, scrap: 1 });
        assert_eq!(missing, 0);

        let (picks, missing) = make_change(5, CurrencyCounts { keys: 0, refined: 0, reclaimed: 3, scrap: 1 });
        assert_eq!(picks, CurrencyCounts { keys: 0, refined: 0, reclaimed: 1, scrap: 1 });
        assert_eq!(missing, 1);
    }
}
