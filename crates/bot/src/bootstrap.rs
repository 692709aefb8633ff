use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tradebot_core::cart::{CartQueue, CartServices};
use tradebot_core::config::{AppConfig, ConfigError, LoadOptions};
use tradebot_core::domain::SteamId;
use tradebot_core::errors::StoreError;
use tradebot_core::inventory::{Inventory, InventoryManager};
use tradebot_core::memory::{InMemoryProtocol, ScriptedHandler, StaticBanList, StaticPricelist};
use tradebot_core::ports::{Messenger, PollDataStore, ProtocolEvent, TradeProtocol};
use tradebot_core::trades::Trades;

use crate::poll_store::FilePollDataStore;

const EVENT_BUFFER: usize = 256;

pub struct Application {
    pub config: AppConfig,
    pub steam_id: SteamId,
    pub protocol: Arc<dyn TradeProtocol>,
    pub trades: Arc<Trades>,
    pub cart_services: Arc<CartServices>,
    pub cart_queue: Arc<CartQueue>,
    /// Handed to the protocol transport; kept here so the pump stays open
    /// while no transport is attached.
    pub event_sender: mpsc::Sender<ProtocolEvent>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("loading poll data failed: {0}")]
    PollData(#[source] StoreError),
}

/// Sends partner messages to the log while no chat transport is attached.
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn send_message(&self, partner: &SteamId, text: &str) {
        info!(event_name = "chat.outgoing", partner = %partner, text, "message to partner");
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting bot bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the engine against the offline protocol. Poll data is restored
/// before anything can reserve items.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let steam_id = config.steam_id();
    let settings = config.trades_settings();
    if !settings.confirmations_enabled {
        warn!(
            event_name = "system.bootstrap.no_identity_secret",
            "bot.identity_secret is not set, offers will wait for manual confirmation"
        );
    }

    let protocol: Arc<dyn TradeProtocol> = Arc::new(InMemoryProtocol::new());
    info!(event_name = "system.bootstrap.transport_mode", transport_mode = "offline", "no protocol transport attached");

    let pricelist = Arc::new(StaticPricelist::default());
    let inventory = Arc::new(InventoryManager::new(Inventory::new(steam_id.clone()), pricelist.clone()));
    let store = Arc::new(FilePollDataStore::new(config.storage.poll_data_path.clone()));

    let trades = Arc::new(Trades::new(
        protocol.clone(),
        inventory.clone(),
        Arc::new(ScriptedHandler::default()),
        store.clone(),
        settings,
    ));

    let poll_data = store.load().await.map_err(BootstrapError::PollData)?;
    match poll_data {
        Some(poll_data) => trades.set_poll_data(poll_data),
        None => info!(
            event_name = "system.bootstrap.poll_data_missing",
            path = %store.path().display(),
            "no poll data yet, starting fresh"
        ),
    }

    if let Err(refresh_error) = inventory.refresh(protocol.as_ref()).await {
        warn!(event_name = "system.bootstrap.inventory_failed", error = %refresh_error, "could not load own inventory");
    }

    let cart_services = Arc::new(CartServices {
        trades: trades.clone(),
        pricelist,
        bans: Arc::new(StaticBanList::default()),
        offer_message: config.trading.offer_message.clone(),
    });
    let cart_queue = Arc::new(CartQueue::new(Arc::new(LogMessenger)));
    let (event_sender, events) = mpsc::channel(EVENT_BUFFER);

    info!(
        event_name = "system.bootstrap.ready",
        steam_id = %steam_id,
        reserved = trades.items_in_trade().len(),
        "bot bootstrap complete"
    );

    Ok(Application { config, steam_id, protocol, trades, cart_services, cart_queue, event_sender, events })
}

#[cfg(test)]
mod tests {
    use tradebot_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_steam_id() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { steam_id: Some("not-a-steam-id".to_string()), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("bot.steam_id"));
    }
}
