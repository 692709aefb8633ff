use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tradebot_core::domain::offer::OfferFilter;
use tradebot_core::ports::ProtocolEvent;
use tradebot_core::trades::Trades;

/// Feeds protocol events into `Trades` and polls the active offer list on a
/// fixed interval. Events are dispatched one at a time; reviewing received
/// offers runs on spawned drains so a slow handler never holds up state
/// changes.
pub struct EventPump {
    trades: Arc<Trades>,
    poll_interval: Duration,
    drains: Mutex<JoinSet<()>>,
}

impl EventPump {
    pub fn new(trades: Arc<Trades>, poll_interval: Duration) -> Self {
        Self { trades, poll_interval, drains: Mutex::new(JoinSet::new()) }
    }

    fn drains(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.drains.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_drain(&self) {
        let trades = Arc::clone(&self.trades);
        let mut drains = self.drains();
        while drains.try_join_next().is_some() {}
        drains.spawn(async move { trades.process_received().await });
    }

    /// Waits for every spawned review drain, including drains started
    /// while waiting.
    pub async fn drained(&self) {
        loop {
            let mut drains = std::mem::take(&mut *self.drains());
            if drains.is_empty() {
                return;
            }
            while let Some(joined) = drains.join_next().await {
                if let Err(join_error) = joined {
                    warn!(event_name = "events.drain_failed", error = %join_error, "review drain did not finish");
                }
            }
        }
    }

    /// Runs until `shutdown` resolves or every event sender is dropped, then
    /// persists poll data once more.
    pub async fn run<S>(&self, mut events: mpsc::Receiver<ProtocolEvent>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut poll_timer = interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(event_name = "events.shutdown", "shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        info!(event_name = "events.closed", "protocol event stream closed");
                        break;
                    }
                },
                _ = poll_timer.tick() => self.poll_offers().await,
            }
        }

        self.drained().await;
        self.trades.persist().await;
    }

    pub async fn dispatch(&self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::NewOffer(offer) => {
                if self.trades.queue_new_offer(&offer) {
                    self.spawn_drain();
                }
            }
            ProtocolEvent::OfferChanged { offer, old_state } => {
                self.trades.on_offer_changed(&offer, Some(old_state)).await;
            }
            ProtocolEvent::PollData(poll_data) => self.trades.on_poll_data(poll_data).await,
            ProtocolEvent::SessionExpired => {
                warn!(event_name = "events.session_expired", "web session expired, waiting for login");
                if let Err(session_error) = self.trades.protocol().wait_for_session().await {
                    warn!(event_name = "events.session_failed", error = %session_error, "session did not recover");
                }
            }
        }
    }

    pub async fn poll_offers(&self) {
        match self.trades.protocol().get_offers(OfferFilter::ActiveOnly).await {
            Ok(list) => {
                debug!(sent = list.sent.len(), received = list.received.len(), "active offers polled");
                if self.trades.apply_offer_list(&list).await {
                    self.spawn_drain();
                }
            }
            Err(poll_error) => {
                warn!(event_name = "events.poll_failed", error = %poll_error, "failed to poll active offers");
            }
        }
    }
}
