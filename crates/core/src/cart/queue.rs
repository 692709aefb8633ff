use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::{Cart, CartLedger};
use crate::domain::offer::OfferStatus;
use crate::domain::SteamId;
use crate::errors::{CartError, CartQueueError};
use crate::ports::Messenger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartSnapshot {
    pub partner: SteamId,
    pub position: usize,
    pub ledger: CartLedger,
    pub summary: String,
}

#[derive(Default)]
struct QueueState {
    carts: VecDeque<Box<dyn Cart>>,
    active: Option<SteamId>,
    processing: bool,
}

impl QueueState {
    fn offset(&self) -> usize {
        usize::from(self.active.is_some())
    }

    fn position(&self, partner: &SteamId) -> Option<usize> {
        if self.active.as_ref() == Some(partner) {
            return Some(0);
        }
        self.carts.iter().position(|cart| cart.partner() == partner).map(|index| index + self.offset())
    }
}

/// Single FIFO for outgoing offers. One cart is constructed and sent at a
/// time across all partners.
pub struct CartQueue {
    state: Mutex<QueueState>,
    messenger: Arc<dyn Messenger>,
}

impl CartQueue {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { state: Mutex::new(QueueState::default()), messenger }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues `cart` and returns its 0-based position, counting the cart
    /// being processed as position 0. A drain is started on the current
    /// tokio runtime; it returns at once if one is already running.
    pub fn enqueue(self: &Arc<Self>, cart: Box<dyn Cart>) -> Result<usize, CartQueueError> {
        let position = {
            let mut state = self.state();
            if state.position(cart.partner()).is_some() {
                return Err(CartQueueError::AlreadyQueued);
            }
            let partner = cart.partner().clone();
            state.carts.push_back(cart);
            let position = state.carts.len() - 1 + state.offset();
            info!(event_name = "cart_queue.enqueued", partner = %partner, position, "cart queued");
            position
        };

        match Handle::try_current() {
            Ok(runtime) => {
                let queue = Arc::clone(self);
                runtime.spawn(async move { queue.handle_queue().await });
            }
            Err(_) => warn!(event_name = "cart_queue.no_runtime", "no runtime to drain the queue, call handle_queue"),
        }
        Ok(position)
    }

    /// Removes a cart that has not started processing.
    pub fn dequeue(&self, partner: &SteamId) -> bool {
        let mut state = self.state();
        let Some(index) = state.carts.iter().position(|cart| cart.partner() == partner) else {
            return false;
        };
        state.carts.remove(index);
        info!(event_name = "cart_queue.dequeued", partner = %partner, "cart removed from queue");
        true
    }

    pub fn get_position(&self, partner: &SteamId) -> Option<usize> {
        self.state().position(partner)
    }

    /// Queued cart for `partner`. The active cart is owned by the processor
    /// and is not returned.
    pub fn get_cart(&self, partner: &SteamId) -> Option<CartSnapshot> {
        let state = self.state();
        let offset = state.offset();
        state.carts.iter().enumerate().find(|(_, cart)| cart.partner() == partner).map(|(index, cart)| {
            CartSnapshot {
                partner: partner.clone(),
                position: index + offset,
                ledger: cart.ledger().clone(),
                summary: cart.summary(),
            }
        })
    }

    pub fn active_partner(&self) -> Option<SteamId> {
        self.state().active.clone()
    }

    pub fn len(&self) -> usize {
        let state = self.state();
        state.carts.len() + state.offset()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the queue. Returns immediately if another caller is already
    /// draining it.
    pub async fn handle_queue(&self) {
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
                let next = state.carts.pop_front();
                state.active = next.as_ref().map(|cart| cart.partner().clone());
                if next.is_none() {
                    state.processing = false;
                }
                next
            };
            let Some(cart) = next else { break };
            self.process(cart).await;
        }
    }

    async fn process(&self, mut cart: Box<dyn Cart>) {
        let partner = cart.partner().clone();
        info!(event_name = "cart_queue.processing", partner = %partner, "processing cart");

        let alteration = match cart.construct_offer().await {
            Ok(alteration) => alteration,
            Err(construct_error) => {
                self.report_failure(&partner, &construct_error);
                return;
            }
        };
        if let Some(reason) = alteration {
            self.messenger.send_message(&partner, &format!("Your offer has been altered! Reason: {reason}."));
        }
        if cart.is_empty() {
            self.messenger.send_message(
                &partner,
                "None of the items you asked for are available anymore, so there is nothing left to trade.",
            );
            return;
        }

        self.messenger.send_message(
            &partner,
            &format!("Please wait while I process your offer! {}.", cart.summary()),
        );

        match cart.send_offer().await {
            Ok(OfferStatus::Pending) => self.messenger.send_message(
                &partner,
                "Your offer has been made, please wait while I accept the mobile confirmation.",
            ),
            Ok(status) => info!(event_name = "cart_queue.sent", partner = %partner, status = ?status, "cart offer sent"),
            Err(send_error) => self.report_failure(&partner, &send_error),
        }
    }

    fn report_failure(&self, partner: &SteamId, failure: &CartError) {
        match failure.user_reason() {
            Some(reason) => {
                info!(event_name = "cart_queue.rejected", partner = %partner, reason = %reason, "cart rejected");
                self.messenger.send_message(partner, &format!("I failed to make the offer! Reason: {reason}."));
            }
            None => {
                warn!(event_name = "cart_queue.failed", partner = %partner, error = %failure, "cart failed");
                self.messenger
                    .send_message(partner, "Something went wrong while trying to make the offer, try again later!");
            }
        }
    }
}
