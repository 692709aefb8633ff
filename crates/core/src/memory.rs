//! In-process collaborators. Used by the test suites and by the offline
//! runtime when no protocol transport is configured.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::offer::{
    EconItem, Offer, OfferAction, OfferFilter, OfferId, OfferItem, OfferState, OfferStatus,
};
use crate::domain::poll_data::PollData;
use crate::domain::pricelist::PricelistEntry;
use crate::domain::sku::Sku;
use crate::domain::SteamId;
use crate::errors::{CollaboratorError, EResult, ProtocolError, StoreError};
use crate::ports::{
    BanChecker, Decision, Messenger, OfferHandler, OfferList, PollDataStore, Pricelist, SentOffer,
    TradeProtocol,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Scripted outcome for the next `send_offer` call. Unscripted calls
/// succeed.
#[derive(Clone, Debug)]
pub enum SendScript {
    Succeed,
    Fail(ProtocolError),
    /// The offer is created but the caller still sees the error.
    CreateThenFail(ProtocolError),
}

#[derive(Clone, Debug)]
pub enum AcceptScript {
    Succeed(OfferStatus),
    Fail(ProtocolError),
    AcceptThenFail(ProtocolError),
}

#[derive(Default)]
struct ProtocolState {
    inventories: BTreeMap<SteamId, Vec<EconItem>>,
    failing_inventories: BTreeSet<SteamId>,
    offers: BTreeMap<OfferId, Offer>,
    send_script: VecDeque<SendScript>,
    accept_script: VecDeque<AcceptScript>,
    escrow_days: BTreeMap<SteamId, u32>,
    require_confirmation: bool,
    next_id: u64,
    send_attempts: usize,
    accept_attempts: usize,
    /// Failures handed to the next decline or cancel calls.
    action_failures: VecDeque<ProtocolError>,
    action_attempts: usize,
    session_waits: usize,
    confirmations: Vec<OfferId>,
}

impl ProtocolState {
    fn allocate_id(&mut self) -> OfferId {
        self.next_id += 1;
        OfferId(format!("{}", 5_000_000_000 + self.next_id))
    }

    fn finish(&mut self, id: &OfferId, offer_state: OfferState) -> Result<(), ProtocolError> {
        self.action_attempts += 1;
        match self.action_failures.pop_front() {
            Some(error) => Err(error),
            None => self.set_state(id, offer_state),
        }
    }

    fn create(&mut self, offer: &Offer) -> SentOffer {
        let id = self.allocate_id();
        let state = if self.require_confirmation {
            OfferState::CreatedNeedsConfirmation
        } else {
            OfferState::Active
        };
        let created_at = Utc::now();
        let mut stored = offer.clone();
        stored.id = Some(id.clone());
        stored.state = state;
        stored.created_at = Some(created_at);
        stored.updated_at = Some(created_at);
        self.offers.insert(id.clone(), stored);
        SentOffer { id, state, created_at }
    }

    fn set_state(&mut self, id: &OfferId, state: OfferState) -> Result<(), ProtocolError> {
        let offer = self
            .offers
            .get_mut(id)
            .ok_or_else(|| ProtocolError::result(EResult::Fail, format!("unknown offer {id}")))?;
        offer.state = state;
        offer.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// Protocol fake keeping offers and inventories in memory.
#[derive(Default)]
pub struct InMemoryProtocol {
    state: Mutex<ProtocolState>,
}

impl InMemoryProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_inventory(&self, owner: SteamId, items: Vec<EconItem>) {
        lock(&self.state).inventories.insert(owner, items);
    }

    pub fn fail_inventory(&self, owner: SteamId) {
        lock(&self.state).failing_inventories.insert(owner);
    }

    pub fn set_escrow_days(&self, partner: SteamId, days: u32) {
        lock(&self.state).escrow_days.insert(partner, days);
    }

    pub fn require_confirmation(&self, required: bool) {
        lock(&self.state).require_confirmation = required;
    }

    pub fn script_send(&self, script: SendScript) {
        lock(&self.state).send_script.push_back(script);
    }

    pub fn script_accept(&self, script: AcceptScript) {
        lock(&self.state).accept_script.push_back(script);
    }

    /// Fails the next decline or cancel call with `error`.
    pub fn fail_next_action(&self, error: ProtocolError) {
        lock(&self.state).action_failures.push_back(error);
    }

    /// Adds an active offer from `partner` and returns its id.
    pub fn insert_received(&self, partner: SteamId, give: &[&str], receive: &[&str]) -> OfferId {
        let mut state = lock(&self.state);
        let id = state.allocate_id();
        let mut offer = Offer::draft(partner);
        offer.is_our_offer = false;
        offer.id = Some(id.clone());
        offer.state = OfferState::Active;
        offer.created_at = Some(Utc::now());
        for asset in give {
            offer.add_my_item(OfferItem::tf2(*asset));
        }
        for asset in receive {
            offer.add_their_item(OfferItem::tf2(*asset));
        }
        state.offers.insert(id.clone(), offer);
        id
    }

    pub fn set_offer_state(&self, id: &OfferId, offer_state: OfferState) -> Result<(), ProtocolError> {
        lock(&self.state).set_state(id, offer_state)
    }

    pub fn offers(&self) -> Vec<Offer> {
        lock(&self.state).offers.values().cloned().collect()
    }

    pub fn offer_state(&self, id: &OfferId) -> Option<OfferState> {
        lock(&self.state).offers.get(id).map(|offer| offer.state)
    }

    pub fn send_attempts(&self) -> usize {
        lock(&self.state).send_attempts
    }

    pub fn accept_attempts(&self) -> usize {
        lock(&self.state).accept_attempts
    }

    pub fn action_attempts(&self) -> usize {
        lock(&self.state).action_attempts
    }

    pub fn session_waits(&self) -> usize {
        lock(&self.state).session_waits
    }

    pub fn confirmations(&self) -> Vec<OfferId> {
        lock(&self.state).confirmations.clone()
    }
}

#[async_trait]
impl TradeProtocol for InMemoryProtocol {
    async fn fetch_inventory(&self, owner: &SteamId) -> Result<Vec<EconItem>, ProtocolError> {
        let state = lock(&self.state);
        if state.failing_inventories.contains(owner) {
            return Err(ProtocolError::Transport(format!("inventory of {owner} is private")));
        }
        Ok(state.inventories.get(owner).cloned().unwrap_or_default())
    }

    async fn send_offer(&self, offer: &Offer) -> Result<SentOffer, ProtocolError> {
        let mut state = lock(&self.state);
        state.send_attempts += 1;
        match state.send_script.pop_front().unwrap_or(SendScript::Succeed) {
            SendScript::Succeed => Ok(state.create(offer)),
            SendScript::Fail(error) => Err(error),
            SendScript::CreateThenFail(error) => {
                state.create(offer);
                Err(error)
            }
        }
    }

    async fn accept_offer(&self, id: &OfferId) -> Result<OfferStatus, ProtocolError> {
        let mut state = lock(&self.state);
        state.accept_attempts += 1;
        match state.accept_script.pop_front().unwrap_or(AcceptScript::Succeed(OfferStatus::Accepted)) {
            AcceptScript::Succeed(status) => {
                match status {
                    OfferStatus::Accepted => state.set_state(id, OfferState::Accepted)?,
                    OfferStatus::Escrow => state.set_state(id, OfferState::InEscrow)?,
                    OfferStatus::Pending | OfferStatus::Sent => {}
                }
                Ok(status)
            }
            AcceptScript::Fail(error) => Err(error),
            AcceptScript::AcceptThenFail(error) => {
                state.set_state(id, OfferState::Accepted)?;
                Err(error)
            }
        }
    }

    async fn decline_offer(&self, id: &OfferId) -> Result<(), ProtocolError> {
        lock(&self.state).finish(id, OfferState::Declined)
    }

    async fn cancel_offer(&self, id: &OfferId) -> Result<(), ProtocolError> {
        lock(&self.state).finish(id, OfferState::Canceled)
    }

    async fn get_offers(&self, filter: OfferFilter) -> Result<OfferList, ProtocolError> {
        let state = lock(&self.state);
        let mut list = OfferList::default();
        for offer in state.offers.values() {
            let keep = match filter {
                OfferFilter::ActiveOnly => offer.state.holds_items(),
                OfferFilter::HistoricalOnly => !offer.state.holds_items(),
                OfferFilter::All => true,
            };
            if !keep {
                continue;
            }
            if offer.is_our_offer {
                list.sent.push(offer.clone());
            } else {
                list.received.push(offer.clone());
            }
        }
        Ok(list)
    }

    async fn get_offer(&self, id: &OfferId) -> Result<Offer, ProtocolError> {
        lock(&self.state)
            .offers
            .get(id)
            .cloned()
            .ok_or_else(|| ProtocolError::result(EResult::Fail, format!("unknown offer {id}")))
    }

    async fn get_escrow_days(&self, partner: &SteamId) -> Result<u32, ProtocolError> {
        Ok(lock(&self.state).escrow_days.get(partner).copied().unwrap_or(0))
    }

    async fn accept_confirmation(&self, id: &OfferId) -> Result<(), ProtocolError> {
        let mut state = lock(&self.state);
        if let Some(offer) = state.offers.get_mut(id) {
            if offer.state == OfferState::CreatedNeedsConfirmation {
                offer.state = OfferState::Active;
            }
            offer.confirmation_pending = false;
        }
        state.confirmations.push(id.clone());
        Ok(())
    }

    async fn wait_for_session(&self) -> Result<(), ProtocolError> {
        lock(&self.state).session_waits += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticPricelist {
    entries: BTreeMap<Sku, PricelistEntry>,
    key_price: Decimal,
}

impl StaticPricelist {
    pub fn new(key_price: Decimal) -> Self {
        Self { entries: BTreeMap::new(), key_price }
    }

    pub fn with_entry(mut self, entry: PricelistEntry) -> Self {
        self.entries.insert(entry.sku.clone(), entry);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Pricelist for StaticPricelist {
    fn get_price(&self, sku: &Sku) -> Option<PricelistEntry> {
        self.entries.get(sku).cloned()
    }

    fn key_price(&self) -> Decimal {
        self.key_price
    }
}

#[derive(Default)]
pub struct StaticBanList {
    banned: BTreeSet<SteamId>,
    unavailable: bool,
}

impl StaticBanList {
    pub fn with_banned(mut self, partner: SteamId) -> Self {
        self.banned.insert(partner);
        self
    }

    pub fn unavailable() -> Self {
        Self { banned: BTreeSet::new(), unavailable: true }
    }
}

#[async_trait]
impl BanChecker for StaticBanList {
    async fn is_banned(&self, partner: &SteamId) -> Result<bool, CollaboratorError> {
        if self.unavailable {
            return Err(CollaboratorError::Unavailable("ban list offline".to_owned()));
        }
        Ok(self.banned.contains(partner))
    }
}

#[derive(Clone, Default)]
pub struct RecordingMessenger {
    messages: Arc<Mutex<Vec<(SteamId, String)>>>,
}

impl RecordingMessenger {
    pub fn messages(&self) -> Vec<(SteamId, String)> {
        lock(&self.messages).clone()
    }

    pub fn messages_for(&self, partner: &SteamId) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|(recipient, _)| recipient == partner)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Messenger for RecordingMessenger {
    fn send_message(&self, partner: &SteamId, text: &str) {
        tracing::debug!(partner = %partner, text, "message to partner");
        lock(&self.messages).push((partner.clone(), text.to_owned()));
    }
}

/// Returns a configured decision per offer and records what it was shown.
pub struct ScriptedHandler {
    decisions: Mutex<BTreeMap<OfferId, Decision>>,
    fallback: Decision,
    reviewed: Mutex<Vec<OfferId>>,
    changes: Mutex<Vec<(Option<OfferId>, Option<OfferState>, OfferState)>>,
}

impl Default for ScriptedHandler {
    fn default() -> Self {
        Self::new(Decision::new(OfferAction::Skip))
    }
}

impl ScriptedHandler {
    pub fn new(fallback: Decision) -> Self {
        Self {
            decisions: Mutex::new(BTreeMap::new()),
            fallback,
            reviewed: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
        }
    }

    pub fn decide(&self, id: OfferId, decision: Decision) {
        lock(&self.decisions).insert(id, decision);
    }

    pub fn reviewed(&self) -> Vec<OfferId> {
        lock(&self.reviewed).clone()
    }

    pub fn changes(&self) -> Vec<(Option<OfferId>, Option<OfferState>, OfferState)> {
        lock(&self.changes).clone()
    }
}

#[async_trait]
impl OfferHandler for ScriptedHandler {
    async fn review_offer(&self, offer: &Offer) -> Decision {
        let id = offer.id.clone();
        if let Some(id) = &id {
            lock(&self.reviewed).push(id.clone());
        }
        id.and_then(|id| lock(&self.decisions).get(&id).cloned()).unwrap_or_else(|| self.fallback.clone())
    }

    async fn on_offer_changed(&self, offer: &Offer, old_state: Option<OfferState>) {
        lock(&self.changes).push((offer.id.clone(), old_state, offer.state));
    }
}

#[derive(Default)]
pub struct InMemoryPollDataStore {
    data: Mutex<Option<PollData>>,
    saves: Mutex<usize>,
}

impl InMemoryPollDataStore {
    pub fn with_data(data: PollData) -> Self {
        Self { data: Mutex::new(Some(data)), saves: Mutex::new(0) }
    }

    pub fn snapshot(&self) -> Option<PollData> {
        lock(&self.data).clone()
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }
}

#[async_trait]
impl PollDataStore for InMemoryPollDataStore {
    async fn load(&self) -> Result<Option<PollData>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, data: &PollData) -> Result<(), StoreError> {
        *lock(&self.data) = Some(data.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }
}
