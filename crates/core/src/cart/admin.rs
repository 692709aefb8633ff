use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{join_alterations, pick_assets, Cart, CartLedger, CartServices};
use crate::domain::offer::{Offer, OfferData};
use crate::domain::SteamId;
use crate::errors::CartError;
use crate::inventory::Inventory;

/// Unpriced cart for trusted operators: deposits and withdrawals move items
/// as requested, limited only by what both inventories hold.
pub struct AdminCart {
    partner: SteamId,
    services: Arc<CartServices>,
    ledger: CartLedger,
    offer: Option<Offer>,
}

impl AdminCart {
    pub fn new(partner: SteamId, services: Arc<CartServices>) -> Self {
        Self { partner, services, ledger: CartLedger::default(), offer: None }
    }
}

#[async_trait]
impl Cart for AdminCart {
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
        let reserved = services.trades.items_in_trade();
        let own = services.inventory().inventory().clone();
        let mut alterations = Vec::new();

        for (sku, wanted) in self.ledger.our().clone() {
            let held = u32::try_from(own.find_available(&sku, &reserved).len()).unwrap_or(u32::MAX);
            if held < wanted {
                let name = services.item_name(&sku);
                alterations.push(if held == 0 {
                    format!("I don't have any {name}")
                } else {
                    format!("I only have {held} {name}")
                });
                self.ledger.set_our(sku, held);
            }
        }

        let theirs = if self.ledger.their().is_empty() {
            Inventory::new(self.partner.clone())
        } else {
            Inventory::fetch(services.protocol().as_ref(), &self.partner).await.map_err(CartError::Inventory)?
        };
        for (sku, wanted) in self.ledger.their().clone() {
            let held = theirs.get_amount(&sku);
            if held < wanted {
                let name = services.item_name(&sku);
                alterations.push(if held == 0 {
                    format!("you don't have any {name}")
                } else {
                    format!("you only have {held} {name}")
                });
                self.ledger.set_their(sku, held);
            }
        }

        if self.ledger.is_empty() {
            self.offer = None;
            return Ok(join_alterations(alterations));
        }

        let mut offer = services.protocol().create_offer(&self.partner);
        offer.message = services.offer_message.clone();
        let mut used = reserved;
        for (sku, amount) in self.ledger.our() {
            for item in pick_assets(&own, sku, *amount, &mut used) {
                offer.add_my_item(item);
            }
        }
        let mut their_used = BTreeSet::new();
        for (sku, amount) in self.ledger.their() {
            for item in pick_assets(&theirs, sku, *amount, &mut their_used) {
                offer.add_their_item(item);
            }
        }
        offer.data = OfferData { dict: Some(self.ledger.as_diff()), ..OfferData::default() };

        info!(
            event_name = "cart.admin_offer_constructed",
            partner = %self.partner,
            give = offer.items_to_give.len(),
            receive = offer.items_to_receive.len(),
            "admin offer constructed"
        );
        self.offer = Some(offer);
        Ok(join_alterations(alterations))
    }
}
