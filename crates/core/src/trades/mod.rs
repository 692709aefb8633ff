//! Offer lifecycle
//!
//! Owns the items-in-trade reservations and the durable poll data, sends
//! and accepts offers with bounded retry, reconciles ambiguous timeouts
//! against the protocol's own offer list, and feeds received offers one at
//! a time to the decision handler.

mod reservations;
mod retry;

pub use reservations::{ReservationHolder, Reservations};
pub use retry::RetryPolicy;

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::offer::{
    ActionRecord, Offer, OfferAction, OfferFilter, OfferId, OfferState, OfferStatus,
};
use crate::domain::poll_data::PollData;
use crate::errors::{FailureClass, ProtocolError, TradeError};
use crate::inventory::InventoryManager;
use crate::ports::{Decision, OfferHandler, OfferList, PollDataStore, SentOffer, TradeProtocol};
use retry::pause;

/// Decline reason for received offers that ask for items committed to
/// another offer.
pub const ITEMS_IN_TRADE: &str = "items already in another trade";

#[derive(Clone, Debug)]
pub struct TradesSettings {
    pub retry: RetryPolicy,
    pub confirmation_delay: Duration,
    /// Without an identity secret confirmations can't be accepted.
    pub confirmations_enabled: bool,
}

impl Default for TradesSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            confirmation_delay: Duration::from_millis(1_000),
            confirmations_enabled: true,
        }
    }
}

#[derive(Default)]
struct TradesState {
    reservations: Reservations,
    poll_data: PollData,
    received: VecDeque<OfferId>,
    processing: bool,
}

pub struct Trades {
    protocol: Arc<dyn TradeProtocol>,
    inventory: Arc<InventoryManager>,
    handler: Arc<dyn OfferHandler>,
    store: Arc<dyn PollDataStore>,
    settings: TradesSettings,
    state: Mutex<TradesState>,
}

impl Trades {
    pub fn new(
        protocol: Arc<dyn TradeProtocol>,
        inventory: Arc<InventoryManager>,
        handler: Arc<dyn OfferHandler>,
        store: Arc<dyn PollDataStore>,
        settings: TradesSettings,
    ) -> Self {
        Self { protocol, inventory, handler, store, settings, state: Mutex::new(TradesState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, TradesState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn protocol(&self) -> &Arc<dyn TradeProtocol> {
        &self.protocol
    }

    pub fn inventory(&self) -> &Arc<InventoryManager> {
        &self.inventory
    }

    pub fn poll_data(&self) -> PollData {
        self.state().poll_data.clone()
    }

    pub fn reservations(&self) -> Reservations {
        self.state().reservations.clone()
    }

    /// Asset ids that must not be offered to anyone else.
    pub fn items_in_trade(&self) -> BTreeSet<String> {
        self.state().reservations.assets()
    }

    /// Startup restore. Rebuilds reservations from the give-lists recorded
    /// for offers the poll data still considers committed.
    pub fn set_poll_data(&self, poll_data: PollData) {
        let mut state = self.state();
        state.reservations = Reservations::default();
        let conflicts = state.reservations.rebuild_offers(poll_data.committed_give_lists());
        if !conflicts.is_empty() {
            warn!(event_name = "trades.reservation_conflict", ?conflicts, "poll data reserves assets twice");
        }
        state.poll_data = poll_data;
        info!(
            event_name = "trades.poll_data_restored",
            sent = state.poll_data.sent.len(),
            received = state.poll_data.received.len(),
            reserved = state.reservations.len(),
            "poll data restored"
        );
    }

    /// Merges a poll data update pushed by the protocol layer and persists
    /// it.
    pub async fn on_poll_data(&self, update: PollData) {
        {
            let mut state = self.state();
            let PollData { sent, received, timestamps, offer_data } = update;
            state.poll_data.sent = sent;
            state.poll_data.received = received;
            state.poll_data.timestamps = timestamps;
            state.poll_data.offer_data.extend(offer_data);
        }
        self.persist().await;
    }

    pub async fn persist(&self) {
        let snapshot = self.poll_data();
        if let Err(store_error) = self.store.save(&snapshot).await {
            error!(event_name = "trades.persist_failed", error = %store_error, "failed to persist poll data");
        }
    }

    /// Sends an outgoing offer. The give-list is reserved for the draft
    /// first and handed over to the offer id once the protocol accepts it.
    pub async fn send_offer(&self, offer: &mut Offer) -> Result<OfferStatus, TradeError> {
        let draft = ReservationHolder::Draft(offer.local_id);
        let assets = give_assets(offer);
        self.state().reservations.reserve(&assets, &draft)?;

        let status = match self.send_offer_retry(offer).await {
            Ok(status) => status,
            Err(send_error) => {
                self.state().reservations.release_holder(&draft);
                warn!(
                    event_name = "trades.send_failed",
                    partner = %offer.partner,
                    offer_id = %offer.id_label(),
                    error = %send_error,
                    "failed to send offer"
                );
                return Err(send_error);
            }
        };

        let Some(id) = offer.id.clone() else {
            self.state().reservations.release_holder(&draft);
            return Err(TradeError::MissingOfferId(offer.id_label()));
        };
        self.state().reservations.rekey(&draft, &ReservationHolder::Offer(id.clone()));
        self.record_offer(offer, None);
        self.persist().await;

        info!(
            event_name = "trades.offer_sent",
            partner = %offer.partner,
            offer_id = %id,
            status = ?status,
            "offer sent"
        );
        if status == OfferStatus::Pending {
            self.schedule_confirmation(id);
        }
        Ok(status)
    }

    /// Sends with bounded retry. A timeout is never retried blindly: the
    /// protocol's active offers are searched for one identical to `offer`
    /// first, and a match is adopted instead of sending again.
    pub async fn send_offer_retry(&self, offer: &mut Offer) -> Result<OfferStatus, TradeError> {
        let policy = self.settings.retry;
        let mut attempts = 0;
        let mut session_waits = 0;

        loop {
            attempts += 1;
            let protocol_error = match self.protocol.send_offer(offer).await {
                Ok(sent) => {
                    adopt_sent(offer, sent);
                    return Ok(OfferStatus::from_sent_state(offer.state));
                }
                Err(protocol_error) => protocol_error,
            };

            warn!(
                event_name = "trades.send_attempt_failed",
                partner = %offer.partner,
                attempt = attempts,
                error = %protocol_error,
                "send attempt failed"
            );

            match protocol_error.classify() {
                FailureClass::Permanent => return Err(protocol_error.into()),
                FailureClass::Revoked => {
                    self.refresh_inventory().await;
                    return Err(protocol_error.into());
                }
                FailureClass::SessionExpired => {
                    session_waits += 1;
                    if session_waits > policy.max_session_waits {
                        return Err(exhausted("send", attempts, protocol_error));
                    }
                    attempts -= 1;
                    self.protocol.wait_for_session().await?;
                }
                FailureClass::Timeout => {
                    pause(policy.backoff(attempts)).await;
                    if let Some(existing) = self.find_matching_sent(offer).await {
                        info!(
                            event_name = "trades.send_reconciled",
                            partner = %offer.partner,
                            offer_id = ?existing.id,
                            "timed out send had created the offer"
                        );
                        adopt_existing(offer, &existing);
                        return Ok(OfferStatus::from_sent_state(offer.state));
                    }
                    if policy.exhausted(attempts) {
                        return Err(exhausted("send", attempts, protocol_error));
                    }
                }
                FailureClass::Transient => {
                    if policy.exhausted(attempts) {
                        return Err(exhausted("send", attempts, protocol_error));
                    }
                    pause(policy.backoff(attempts)).await;
                }
            }
        }
    }

    async fn find_matching_sent(&self, offer: &Offer) -> Option<Offer> {
        match self.protocol.get_offers(OfferFilter::ActiveOnly).await {
            Ok(list) => list.sent.into_iter().find(|candidate| {
                candidate.id.is_some() && candidate.state.holds_items() && candidate.is_structurally_equal(offer)
            }),
            Err(lookup_error) => {
                warn!(
                    event_name = "trades.reconcile_lookup_failed",
                    partner = %offer.partner,
                    error = %lookup_error,
                    "could not list sent offers"
                );
                None
            }
        }
    }

    pub async fn accept_offer(&self, offer: &mut Offer) -> Result<OfferStatus, TradeError> {
        let status = self.accept_offer_retry(offer).await?;
        let Some(id) = offer.id.clone() else {
            return Err(TradeError::MissingOfferId(offer.id_label()));
        };
        info!(event_name = "trades.offer_accepted", partner = %offer.partner, offer_id = %id, status = ?status, "offer accepted");
        if status == OfferStatus::Pending {
            self.schedule_confirmation(id);
        }
        Ok(status)
    }

    /// Accepts with bounded retry. A timed out accept is settled by
    /// re-reading the offer: accepted or escrowed means success, still
    /// active means try again.
    pub async fn accept_offer_retry(&self, offer: &mut Offer) -> Result<OfferStatus, TradeError> {
        let id = offer.id.clone().ok_or_else(|| TradeError::MissingOfferId(offer.id_label()))?;
        let policy = self.settings.retry;
        let mut attempts = 0;
        let mut session_waits = 0;

        loop {
            attempts += 1;
            let protocol_error = match self.protocol.accept_offer(&id).await {
                Ok(status) => {
                    apply_accept_status(offer, status);
                    return Ok(status);
                }
                Err(protocol_error) => protocol_error,
            };

            warn!(
                event_name = "trades.accept_attempt_failed",
                offer_id = %id,
                attempt = attempts,
                error = %protocol_error,
                "accept attempt failed"
            );

            match protocol_error.classify() {
                FailureClass::Permanent => return Err(protocol_error.into()),
                FailureClass::Revoked => {
                    self.refresh_inventory().await;
                    return Err(protocol_error.into());
                }
                FailureClass::SessionExpired => {
                    session_waits += 1;
                    if session_waits > policy.max_session_waits {
                        return Err(exhausted("accept", attempts, protocol_error));
                    }
                    attempts -= 1;
                    self.protocol.wait_for_session().await?;
                }
                FailureClass::Timeout => {
                    pause(policy.backoff(attempts)).await;
                    match self.protocol.get_offer(&id).await {
                        Ok(current) => {
                            offer.state = current.state;
                            match current.state {
                                OfferState::Accepted => return Ok(OfferStatus::Accepted),
                                OfferState::InEscrow => return Ok(OfferStatus::Escrow),
                                OfferState::Active => {}
                                other => {
                                    return Err(TradeError::UnexpectedState {
                                        offer_id: id.to_string(),
                                        state: format!("{other:?}"),
                                    })
                                }
                            }
                        }
                        Err(lookup_error) => {
                            warn!(offer_id = %id, error = %lookup_error, "could not re-read offer after accept timeout");
                        }
                    }
                    if policy.exhausted(attempts) {
                        return Err(exhausted("accept", attempts, protocol_error));
                    }
                }
                FailureClass::Transient => {
                    if policy.exhausted(attempts) {
                        return Err(exhausted("accept", attempts, protocol_error));
                    }
                    pause(policy.backoff(attempts)).await;
                }
            }
        }
    }

    pub async fn decline_offer(&self, id: &OfferId) -> Result<(), TradeError> {
        self.retry("decline", || self.protocol.decline_offer(id)).await?;
        info!(event_name = "trades.offer_declined", offer_id = %id, "offer declined");
        Ok(())
    }

    pub async fn cancel_offer(&self, id: &OfferId) -> Result<(), TradeError> {
        self.retry("cancel", || self.protocol.cancel_offer(id)).await?;
        info!(event_name = "trades.offer_canceled", offer_id = %id, "offer canceled");
        Ok(())
    }

    /// Retry loop for operations that are safe to repeat.
    async fn retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, TradeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProtocolError>>,
    {
        let policy = self.settings.retry;
        let mut attempts = 0;
        let mut session_waits = 0;

        loop {
            attempts += 1;
            let protocol_error = match call().await {
                Ok(value) => return Ok(value),
                Err(protocol_error) => protocol_error,
            };
            debug!(operation, attempt = attempts, error = %protocol_error, "protocol call failed");

            match protocol_error.classify() {
                FailureClass::Permanent | FailureClass::Revoked => return Err(protocol_error.into()),
                FailureClass::SessionExpired => {
                    session_waits += 1;
                    if session_waits > policy.max_session_waits {
                        return Err(exhausted(operation, attempts, protocol_error));
                    }
                    attempts -= 1;
                    self.protocol.wait_for_session().await?;
                }
                FailureClass::Timeout | FailureClass::Transient => {
                    if policy.exhausted(attempts) {
                        return Err(exhausted(operation, attempts, protocol_error));
                    }
                    pause(policy.backoff(attempts)).await;
                }
            }
        }
    }

    fn schedule_confirmation(&self, id: OfferId) {
        if !self.settings.confirmations_enabled {
            warn!(event_name = "trades.confirmation_skipped", offer_id = %id, "no identity secret, confirm manually");
            return;
        }
        let protocol = Arc::clone(&self.protocol);
        let delay = self.settings.confirmation_delay;
        tokio::spawn(async move {
            pause(delay).await;
            match protocol.accept_confirmation(&id).await {
                Ok(()) => info!(event_name = "trades.confirmation_accepted", offer_id = %id, "confirmation accepted"),
                Err(confirm_error) => warn!(
                    event_name = "trades.confirmation_failed",
                    offer_id = %id,
                    error = %confirm_error,
                    "failed to accept confirmation"
                ),
            }
        });
    }

    async fn refresh_inventory(&self) {
        if let Err(refresh_error) = self.inventory.refresh(self.protocol.as_ref()).await {
            warn!(event_name = "inventory.refresh_failed", error = %refresh_error, "failed to refresh own inventory");
        }
    }

    /// Bookkeeping for an offer state: poll data entry, give-list
    /// reservation while committed, release and finish time once not.
    fn record_offer(&self, offer: &Offer, old_state: Option<OfferState>) {
        let Some(id) = offer.id.clone() else {
            return;
        };
        let mut state = self.state();
        let state = &mut *state;
        let holder = ReservationHolder::Offer(id.clone());

        state.poll_data.record_state(&id, offer.is_our_offer, offer.state);
        state.poll_data.timestamps.entry(id.clone()).or_insert_with(|| Utc::now().timestamp());
        let data = state.poll_data.offer_data.entry(id.clone()).or_insert_with(|| offer.data.clone());

        if offer.state.holds_items() {
            match state.reservations.reserve(&give_assets(offer), &holder) {
                Ok(()) => data.our_items = Some(offer.items_to_give.clone()),
                Err(conflict) => {
                    warn!(event_name = "trades.reservation_conflict", offer_id = %id, error = %conflict, "asset already in trade");
                }
            }
        } else {
            let released = state.reservations.release_holder(&holder);
            if released > 0 || old_state.is_some_and(OfferState::holds_items) {
                data.finish_timestamp.get_or_insert_with(|| Utc::now().timestamp_millis());
                debug!(offer_id = %id, released, state = ?offer.state, "offer left committed state");
            }
        }
    }

    /// Protocol state change entry point.
    pub async fn on_offer_changed(&self, offer: &Offer, old_state: Option<OfferState>) {
        info!(
            event_name = "trades.offer_changed",
            offer_id = %offer.id_label(),
            partner = %offer.partner,
            old_state = ?old_state,
            state = ?offer.state,
            "offer state changed"
        );
        self.record_offer(offer, old_state);
        self.persist().await;

        if matches!(offer.state, OfferState::Accepted | OfferState::InEscrow) {
            self.inventory.remove_items(offer.items_to_give.iter().map(|item| item.assetid.as_str()));
            self.refresh_inventory().await;
        }
        self.handler.on_offer_changed(offer, old_state).await;
    }

    pub async fn on_new_offer(&self, offer: &Offer) {
        if self.queue_new_offer(offer) {
            self.process_received().await;
        }
    }

    /// Records a received offer and queues it for review without draining
    /// the queue. Returns whether anything was queued.
    pub fn queue_new_offer(&self, offer: &Offer) -> bool {
        if offer.is_our_offer {
            return false;
        }
        let Some(id) = offer.id.clone() else {
            warn!(partner = %offer.partner, "received offer without id");
            return false;
        };
        self.record_offer(offer, None);
        self.enqueue_received(vec![id])
    }

    pub async fn on_offer_list(&self, list: &OfferList) {
        if self.apply_offer_list(list).await {
            self.process_received().await;
        }
    }

    /// Applies an `ActiveOnly` offer list: reservations are rebuilt from it
    /// and unhandled received offers are queued. Returns whether anything
    /// was queued; draining is left to the caller.
    pub async fn apply_offer_list(&self, list: &OfferList) -> bool {
        let mut unhandled = Vec::new();
        {
            let mut state = self.state();
            let committed: Vec<(OfferId, Vec<String>)> = list
                .sent
                .iter()
                .chain(list.received.iter())
                .filter(|offer| offer.state.holds_items())
                .filter_map(|offer| Some((offer.id.clone()?, give_assets(offer))))
                .collect();
            let conflicts = state.reservations.rebuild_offers(committed);
            if !conflicts.is_empty() {
                warn!(event_name = "trades.reservation_conflict", ?conflicts, "offer list reserves assets twice");
            }

            for offer in list.sent.iter().chain(list.received.iter()) {
                if let Some(id) = &offer.id {
                    state.poll_data.record_state(id, offer.is_our_offer, offer.state);
                }
            }

            for offer in &list.received {
                let Some(id) = &offer.id else { continue };
                let handled = state.poll_data.offer_data.get(id).is_some_and(|data| data.handled_by_us);
                if offer.state == OfferState::Active && !handled {
                    unhandled.push(id.clone());
                }
            }
        }
        self.persist().await;

        if unhandled.is_empty() {
            return false;
        }
        debug!(count = unhandled.len(), "queueing unhandled received offers");
        self.enqueue_received(unhandled)
    }

    fn enqueue_received(&self, ids: Vec<OfferId>) -> bool {
        let mut state = self.state();
        let mut queued = false;
        for id in ids {
            let handled = state.poll_data.offer_data.get(&id).is_some_and(|data| data.handled_by_us);
            if !handled && !state.received.contains(&id) {
                state.received.push_back(id);
                queued = true;
            }
        }
        queued
    }

    /// Give-list assets of `offer` that some other offer or draft holds.
    fn assets_held_elsewhere(&self, offer: &Offer, id: &OfferId) -> Vec<String> {
        let own = ReservationHolder::Offer(id.clone());
        let state = self.state();
        give_assets(offer)
            .into_iter()
            .filter(|asset| state.reservations.holder_of(asset).is_some_and(|holder| *holder != own))
            .collect()
    }

    fn decline_held_elsewhere(&self, offer: &Offer, id: &OfferId) -> Option<Decision> {
        let held = self.assets_held_elsewhere(offer, id);
        if held.is_empty() {
            return None;
        }
        warn!(
            event_name = "trades.reservation_conflict",
            offer_id = %id,
            partner = %offer.partner,
            assets = ?held,
            "received offer asks for items already in trade"
        );
        Some(Decision::new(OfferAction::Decline).with_reason(ITEMS_IN_TRADE))
    }

    /// Drains the received-offer queue. A second caller returns at once and
    /// leaves the work to the active drain.
    pub async fn process_received(&self) {
        {
            let mut state = self.state();
            if state.processing {
                return;
            }
            state.processing = true;
        }

        loop {
            let next = {
                let mut state = self.state();
                let next = state.received.pop_front();
                if next.is_none() {
                    state.processing = false;
                }
                next
            };
            let Some(id) = next else { break };
            self.handle_received(&id).await;
        }
    }

    async fn handle_received(&self, id: &OfferId) {
        let mut offer = match self.retry("fetch", || self.protocol.get_offer(id)).await {
            Ok(offer) => offer,
            Err(fetch_error) => {
                warn!(event_name = "trades.fetch_failed", offer_id = %id, error = %fetch_error, "failed to fetch received offer");
                return;
            }
        };

        if offer.state != OfferState::Active {
            debug!(offer_id = %id, state = ?offer.state, "received offer is no longer active");
            return;
        }

        {
            let mut state = self.state();
            let data = state.poll_data.offer_data.entry(id.clone()).or_default();
            if data.handled_by_us {
                return;
            }
            data.handled_by_us = true;
            data.handle_timestamp = Some(Utc::now().timestamp_millis());
            offer.data = data.clone();
        }
        self.persist().await;

        let decision = match self.decline_held_elsewhere(&offer, id) {
            Some(decision) => decision,
            None => {
                let decision = self.handler.review_offer(&offer).await;
                match decision.action {
                    OfferAction::Accept => self.decline_held_elsewhere(&offer, id).unwrap_or(decision),
                    _ => decision,
                }
            }
        };
        info!(
            event_name = "trades.offer_reviewed",
            offer_id = %id,
            partner = %offer.partner,
            action = ?decision.action,
            reason = decision.reason.as_deref().unwrap_or(""),
            "received offer reviewed"
        );
        {
            let mut state = self.state();
            let data = state.poll_data.offer_data.entry(id.clone()).or_default();
            data.action = Some(ActionRecord {
                action: decision.action,
                reason: decision.reason.clone(),
                meta: decision.meta.clone(),
            });
            data.action_timestamp = Some(Utc::now().timestamp_millis());
        }
        self.persist().await;

        let outcome = match decision.action {
            OfferAction::Accept => self.accept_offer(&mut offer).await.map(|_| ()),
            OfferAction::Decline => self.decline_offer(id).await,
            OfferAction::Skip => Ok(()),
        };
        if let Err(action_error) = outcome {
            error!(
                event_name = "trades.action_failed",
                offer_id = %id,
                action = ?decision.action,
                error = %action_error,
                "failed to apply decision"
            );
        }
    }
}

fn give_assets(offer: &Offer) -> Vec<String> {
    offer.items_to_give.iter().map(|item| item.assetid.clone()).collect()
}

fn exhausted(operation: &'static str, attempts: u32, source: ProtocolError) -> TradeError {
    TradeError::AttemptsExhausted { operation, attempts, source }
}

fn adopt_sent(offer: &mut Offer, sent: SentOffer) {
    offer.id = Some(sent.id);
    offer.state = sent.state;
    offer.created_at = Some(sent.created_at);
    offer.updated_at = Some(sent.created_at);
    offer.confirmation_pending = sent.state == OfferState::CreatedNeedsConfirmation;
}

fn adopt_existing(offer: &mut Offer, existing: &Offer) {
    offer.id = existing.id.clone();
    offer.state = existing.state;
    offer.created_at = existing.created_at;
    offer.updated_at = existing.updated_at;
    offer.expires_at = existing.expires_at;
    offer.confirmation_pending = existing.state == OfferState::CreatedNeedsConfirmation;
}

fn apply_accept_status(offer: &mut Offer, status: OfferStatus) {
    match status {
        OfferStatus::Accepted => offer.state = OfferState::Accepted,
        OfferStatus::Escrow => offer.state = OfferState::InEscrow,
        OfferStatus::Pending => offer.confirmation_pending = true,
        OfferStatus::Sent => {}
    }
}
