pub mod cart;
pub mod config;
pub mod currency_allocator;
pub mod domain;
pub mod errors;
pub mod inventory;
pub mod memory;
pub mod ports;
pub mod trades;

pub use cart::{AdminCart, Cart, CartLedger, CartQueue, CartServices, CartSnapshot, UserCart};
pub use currency_allocator::{Allocation, CurrencyAllocator};
pub use domain::currency::{Currencies, CurrencyCounts};
pub use domain::offer::{Offer, OfferData, OfferId, OfferState, OfferStatus};
pub use domain::poll_data::PollData;
pub use domain::pricelist::{Intent, PricelistEntry};
pub use domain::sku::Sku;
pub use domain::SteamId;
pub use errors::{CartError, CartQueueError, ProtocolError, StoreError, TradeError};
pub use inventory::{Inventory, InventoryManager, TradeAllowance};
pub use ports::{
    BanChecker, Decision, Messenger, OfferHandler, PollDataStore, Pricelist, ProtocolEvent,
    TradeProtocol,
};
pub use trades::{RetryPolicy, Trades, TradesSettings};
