pub mod currency;
pub mod offer;
pub mod poll_data;
pub mod pricelist;
pub mod sku;

use std::fmt;

use serde::{Deserialize, Serialize};

/// 64-bit Steam identity in its decimal string form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SteamId(pub String);

impl SteamId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts the 17-digit individual account form (`7656119...`).
    pub fn is_valid(value: &str) -> bool {
        value.len() == 17 && value.starts_with("7656119") && value.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
