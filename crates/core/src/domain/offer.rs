use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::sku::Sku;
use crate::domain::SteamId;

pub const TF2_APP_ID: u32 = 440;
pub const TF2_CONTEXT_ID: &str = "2";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Offer states as numbered by the trade protocol. Poll data stores the
/// numeric form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OfferState {
    Invalid,
    Active,
    Accepted,
    Countered,
    Expired,
    Canceled,
    Declined,
    InvalidItems,
    CreatedNeedsConfirmation,
    CanceledBySecondFactor,
    InEscrow,
}

impl OfferState {
    pub fn code(self) -> u8 {
        match self {
            Self::Invalid => 1,
            Self::Active => 2,
            Self::Accepted => 3,
            Self::Countered => 4,
            Self::Expired => 5,
            Self::Canceled => 6,
            Self::Declined => 7,
            Self::InvalidItems => 8,
            Self::CreatedNeedsConfirmation => 9,
            Self::CanceledBySecondFactor => 10,
            Self::InEscrow => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Invalid),
            2 => Some(Self::Active),
            3 => Some(Self::Accepted),
            4 => Some(Self::Countered),
            5 => Some(Self::Expired),
            6 => Some(Self::Canceled),
            7 => Some(Self::Declined),
            8 => Some(Self::InvalidItems),
            9 => Some(Self::CreatedNeedsConfirmation),
            10 => Some(Self::CanceledBySecondFactor),
            11 => Some(Self::InEscrow),
            _ => None,
        }
    }

    /// States in which our side of the offer is committed.
    pub fn holds_items(self) -> bool {
        matches!(self, Self::Active | Self::CreatedNeedsConfirmation)
    }
}

impl From<OfferState> for u8 {
    fn from(state: OfferState) -> Self {
        state.code()
    }
}

impl TryFrom<u8> for OfferState {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown offer state code {code}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferItem {
    pub appid: u32,
    pub contextid: String,
    pub assetid: String,
}

impl OfferItem {
    pub fn tf2(assetid: impl Into<String>) -> Self {
        Self { appid: TF2_APP_ID, contextid: TF2_CONTEXT_ID.to_string(), assetid: assetid.into() }
    }
}

/// An inventory item as reported by the protocol layer, already resolved to
/// its SKU.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconItem {
    pub appid: u32,
    pub contextid: String,
    pub assetid: String,
    pub sku: Sku,
    pub tradable: bool,
}

impl EconItem {
    pub fn tf2(assetid: impl Into<String>, sku: impl Into<Sku>, tradable: bool) -> Self {
        Self {
            appid: TF2_APP_ID,
            contextid: TF2_CONTEXT_ID.to_string(),
            assetid: assetid.into(),
            sku: sku.into(),
            tradable,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub our: BTreeMap<Sku, u32>,
    pub their: BTreeMap<Sku, u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideValue {
    /// Normalised value in scrap.
    pub total: i64,
    pub keys: u32,
    pub metal: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBreakdown {
    pub our: SideValue,
    pub their: SideValue,
    /// Key rate in refined at the time the offer was priced.
    pub rate: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferAction {
    Accept,
    Decline,
    Skip,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: OfferAction,
    pub reason: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Engine bookkeeping attached to an offer and persisted with poll data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfferData {
    pub handled_by_us: bool,
    pub dict: Option<ItemDiff>,
    pub value: Option<ValueBreakdown>,
    pub our_items: Option<Vec<OfferItem>>,
    pub action: Option<ActionRecord>,
    pub handle_timestamp: Option<i64>,
    pub action_timestamp: Option<i64>,
    pub finish_timestamp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Stable local handle, assigned before the protocol hands out an id.
    pub local_id: Uuid,
    pub id: Option<OfferId>,
    pub partner: SteamId,
    pub is_our_offer: bool,
    pub items_to_give: Vec<OfferItem>,
    pub items_to_receive: Vec<OfferItem>,
    pub state: OfferState,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmation_pending: bool,
    pub data: OfferData,
}

impl Offer {
    /// A fresh outgoing draft for `partner`.
    pub fn draft(partner: SteamId) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            id: None,
            partner,
            is_our_offer: true,
            items_to_give: Vec::new(),
            items_to_receive: Vec::new(),
            state: OfferState::Invalid,
            message: String::new(),
            created_at: None,
            updated_at: None,
            expires_at: None,
            confirmation_pending: false,
            data: OfferData::default(),
        }
    }

    pub fn add_my_item(&mut self, item: OfferItem) {
        if !self.items_to_give.contains(&item) {
            self.items_to_give.push(item);
        }
    }

    pub fn add_their_item(&mut self, item: OfferItem) {
        if !self.items_to_receive.contains(&item) {
            self.items_to_receive.push(item);
        }
    }

    pub fn id_label(&self) -> String {
        match &self.id {
            Some(id) => id.0.clone(),
            None => format!("draft:{}", self.local_id),
        }
    }

    /// Same direction, same partner and the same exact item sets on both
    /// sides. Item order is irrelevant.
    pub fn is_structurally_equal(&self, other: &Offer) -> bool {
        fn as_set(items: &[OfferItem]) -> BTreeSet<&OfferItem> {
            items.iter().collect()
        }

        self.is_our_offer == other.is_our_offer
            && self.partner == other.partner
            && self.items_to_give.len() == other.items_to_give.len()
            && self.items_to_receive.len() == other.items_to_receive.len()
            && as_set(&self.items_to_give) == as_set(&other.items_to_give)
            && as_set(&self.items_to_receive) == as_set(&other.items_to_receive)
    }
}

/// Outcome of sending or accepting an offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Sent,
    /// Created, waiting for the out-of-band confirmation.
    Pending,
    Accepted,
    Escrow,
}

impl OfferStatus {
    pub fn from_sent_state(state: OfferState) -> Self {
        if state == OfferState::CreatedNeedsConfirmation {
            Self::Pending
        } else {
            Self::Sent
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferFilter {
    ActiveOnly,
    HistoricalOnly,
    All,
}
