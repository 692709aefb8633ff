//! Collaborator seams. The engine only talks to the outside world through
//! these traits; `memory` provides in-process implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::currency::refined_to_scrap;
use crate::domain::offer::{EconItem, Offer, OfferAction, OfferFilter, OfferId, OfferState, OfferStatus};
use crate::domain::poll_data::PollData;
use crate::domain::pricelist::PricelistEntry;
use crate::domain::sku::Sku;
use crate::domain::SteamId;
use crate::errors::{CollaboratorError, ProtocolError, StoreError};

/// What the protocol hands back after creating an offer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentOffer {
    pub id: OfferId,
    pub state: OfferState,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OfferList {
    pub sent: Vec<Offer>,
    pub received: Vec<Offer>,
}

#[async_trait]
pub trait TradeProtocol: Send + Sync {
    fn create_offer(&self, partner: &SteamId) -> Offer {
        Offer::draft(partner.clone())
    }

    async fn fetch_inventory(&self, owner: &SteamId) -> Result<Vec<EconItem>, ProtocolError>;
    async fn send_offer(&self, offer: &Offer) -> Result<SentOffer, ProtocolError>;
    async fn accept_offer(&self, id: &OfferId) -> Result<OfferStatus, ProtocolError>;
    async fn decline_offer(&self, id: &OfferId) -> Result<(), ProtocolError>;
    async fn cancel_offer(&self, id: &OfferId) -> Result<(), ProtocolError>;
    async fn get_offers(&self, filter: OfferFilter) -> Result<OfferList, ProtocolError>;
    async fn get_offer(&self, id: &OfferId) -> Result<Offer, ProtocolError>;
    /// Days a trade with `partner` would be held. Zero means no hold.
    async fn get_escrow_days(&self, partner: &SteamId) -> Result<u32, ProtocolError>;
    async fn accept_confirmation(&self, id: &OfferId) -> Result<(), ProtocolError>;
    /// Resolves once the web session is usable again.
    async fn wait_for_session(&self) -> Result<(), ProtocolError>;
}

pub trait Pricelist: Send + Sync {
    fn get_price(&self, sku: &Sku) -> Option<PricelistEntry>;
    /// Key rate in refined.
    fn key_price(&self) -> Decimal;

    fn key_scrap(&self) -> i64 {
        refined_to_scrap(self.key_price())
    }
}

#[async_trait]
pub trait BanChecker: Send + Sync {
    async fn is_banned(&self, partner: &SteamId) -> Result<bool, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub action: OfferAction,
    pub reason: Option<String>,
    pub meta: BTreeMap<String, String>,
}

impl Decision {
    pub fn new(action: OfferAction) -> Self {
        Self { action, reason: None, meta: BTreeMap::new() }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Decides on received offers and is told about terminal state changes.
#[async_trait]
pub trait OfferHandler: Send + Sync {
    async fn review_offer(&self, offer: &Offer) -> Decision;
    async fn on_offer_changed(&self, offer: &Offer, old_state: Option<OfferState>);
}

/// Fire-and-forget partner notifications.
pub trait Messenger: Send + Sync {
    fn send_message(&self, partner: &SteamId, text: &str);
}

#[async_trait]
pub trait PollDataStore: Send + Sync {
    async fn load(&self) -> Result<Option<PollData>, StoreError>;
    async fn save(&self, data: &PollData) -> Result<(), StoreError>;
}

/// Events pushed by the protocol layer.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolEvent {
    NewOffer(Offer),
    OfferChanged { offer: Offer, old_state: OfferState },
    PollData(PollData),
    SessionExpired,
}
