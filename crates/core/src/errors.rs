use std::fmt;

use thiserror::Error;

/// Numeric result codes attached to protocol failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EResult {
    Fail,
    AccessDenied,
    Timeout,
    ServiceUnavailable,
    LimitExceeded,
    Revoked,
    Other(u32),
}

impl EResult {
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => Self::Fail,
            15 => Self::AccessDenied,
            16 => Self::Timeout,
            20 => Self::ServiceUnavailable,
            25 => Self::LimitExceeded,
            26 => Self::Revoked,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Fail => 2,
            Self::AccessDenied => 15,
            Self::Timeout => 16,
            Self::ServiceUnavailable => 20,
            Self::LimitExceeded => 25,
            Self::Revoked => 26,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for EResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// How the retry loops treat a protocol failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Permanent,
    SessionExpired,
    Revoked,
    /// The operation may or may not have happened.
    Timeout,
    Transient,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("partner only accepts trade offers from friends")]
    FriendsOnly,
    #[error("partner inventory is full")]
    InventoryFull,
    #[error("partner is not able to trade")]
    NotTradable,
    #[error("partner is trade banned")]
    TradeBan,
    #[error("item server is unavailable")]
    ItemServerUnavailable,
    #[error("protocol returned {code}: {message}")]
    Result { code: EResult, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ProtocolError {
    pub fn result(code: EResult, message: impl Into<String>) -> Self {
        Self::Result { code, message: message.into() }
    }

    pub fn classify(&self) -> FailureClass {
        match self {
            Self::NotLoggedIn => FailureClass::SessionExpired,
            Self::FriendsOnly | Self::InventoryFull | Self::NotTradable | Self::TradeBan => {
                FailureClass::Permanent
            }
            Self::Result { code: EResult::Revoked, .. } => FailureClass::Revoked,
            Self::Result { code: EResult::Timeout, .. } => FailureClass::Timeout,
            Self::Result { .. } => FailureClass::Permanent,
            Self::ItemServerUnavailable | Self::Transport(_) => FailureClass::Transient,
        }
    }

    /// Fixed wording shown to a trade partner for failures they can act on.
    pub fn user_reason(&self) -> Option<&'static str> {
        match self {
            Self::FriendsOnly => {
                Some("you are only accepting trade offers from friends, so I can't send you one")
            }
            Self::InventoryFull => Some("your backpack is full"),
            Self::NotTradable => Some("you are not able to trade right now"),
            Self::TradeBan => Some("you are trade banned"),
            Self::Result { code: EResult::Revoked, .. } => {
                Some("one or more of the items in the offer is no longer available")
            }
            Self::Result { code: EResult::Timeout, .. } => {
                Some("Steam timed out while sending the offer, please try again later")
            }
            Self::Result { code: EResult::LimitExceeded, .. } => {
                Some("I am sending too many offers right now, please try again later")
            }
            Self::Result { code: EResult::ServiceUnavailable, .. }
            | Self::ItemServerUnavailable => Some("Steam is down, please try again later"),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TradeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{operation} failed after {attempts} attempts: {source}")]
    AttemptsExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: ProtocolError,
    },
    #[error("asset {asset_id} is already reserved by {holder}")]
    AlreadyReserved { asset_id: String, holder: String },
    #[error("offer {0} has no protocol id")]
    MissingOfferId(String),
    #[error("offer {offer_id} ended in unexpected state {state}")]
    UnexpectedState { offer_id: String, state: String },
}

impl TradeError {
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(error) | Self::AttemptsExhausted { source: error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,
    #[error("offer has not been constructed")]
    NotConstructed,
    /// Validation or policy rejection, worded for the partner.
    #[error("{0}")]
    Rejected(String),
    #[error("failed to load inventory: {0}")]
    Inventory(#[source] ProtocolError),
    #[error(transparent)]
    Trade(#[from] TradeError),
}

impl CartError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Reason safe to show the partner. `None` means the failure is opaque
    /// and only a generic apology should be sent.
    pub fn user_reason(&self) -> Option<String> {
        match self {
            Self::Empty => Some("cart is empty".to_owned()),
            Self::Rejected(reason) => Some(reason.clone()),
            Self::NotConstructed | Self::Inventory(_) | Self::Trade(_) => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CartQueueError {
    #[error("partner already has a cart in the queue")]
    AlreadyQueued,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("poll data io failure at {path}: {message}")]
    Io { path: String, message: String },
    #[error("poll data is malformed: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::{CartError, EResult, FailureClass, ProtocolError, TradeError};

    #[test]
    fn result_codes_classify_by_ambiguity() {
        assert_eq!(
            ProtocolError::result(EResult::Timeout, "timed out").classify(),
            FailureClass::Timeout
        );
        assert_eq!(
            ProtocolError::result(EResult::Revoked, "gone").classify(),
            FailureClass::Revoked
        );
        assert_eq!(
            ProtocolError::result(EResult::from_code(2), "fail").classify(),
            FailureClass::Permanent
        );
        assert_eq!(ProtocolError::NotLoggedIn.classify(), FailureClass::SessionExpired);
        assert_eq!(ProtocolError::FriendsOnly.classify(), FailureClass::Permanent);
        assert_eq!(ProtocolError::Transport("reset".into()).classify(), FailureClass::Transient);
    }

    #[test]
    fn unknown_codes_survive_round_trip() {
        assert_eq!(EResult::from_code(84), EResult::Other(84));
        assert_eq!(EResult::Other(84).code(), 84);
        assert_eq!(EResult::from_code(26), EResult::Revoked);
    }

    #[test]
    fn trade_errors_expose_underlying_protocol_failure() {
        let exhausted = TradeError::AttemptsExhausted {
            operation: "send",
            attempts: 5,
            source: ProtocolError::InventoryFull,
        };
        assert_eq!(exhausted.protocol(), Some(&ProtocolError::InventoryFull));
        assert_eq!(TradeError::MissingOfferId("draft".into()).protocol(), None);
    }

    #[test]
    fn opaque_cart_failures_have_no_user_reason() {
        assert_eq!(CartError::Empty.user_reason().as_deref(), Some("cart is empty"));
        assert_eq!(
            CartError::rejected("you are banned").user_reason().as_deref(),
            Some("you are banned")
        );
        let opaque = CartError::from(TradeError::from(ProtocolError::Transport("eof".into())));
        assert_eq!(opaque.user_reason(), None);
    }
}
