use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use uuid::Uuid;

use crate::domain::offer::OfferId;
use crate::errors::TradeError;

/// Who currently owns a reserved asset.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReservationHolder {
    /// An outgoing offer that has not been assigned an id yet.
    Draft(Uuid),
    Offer(OfferId),
}

impl fmt::Display for ReservationHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft(local_id) => write!(f, "draft:{local_id}"),
            Self::Offer(id) => write!(f, "offer:{id}"),
        }
    }
}

/// Items in trade. Every asset maps to exactly one holder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reservations {
    holds: BTreeMap<String, ReservationHolder>,
}

impl Reservations {
    /// Reserves every asset for `holder`, or none of them if any is held by
    /// someone else.
    pub fn reserve(&mut self, assets: &[String], holder: &ReservationHolder) -> Result<(), TradeError> {
        if let Some((asset, existing)) = assets
            .iter()
            .find_map(|asset| self.holds.get(asset).filter(|existing| *existing != holder).map(|h| (asset, h)))
        {
            return Err(TradeError::AlreadyReserved { asset_id: asset.clone(), holder: existing.to_string() });
        }
        for asset in assets {
            self.holds.insert(asset.clone(), holder.clone());
        }
        Ok(())
    }

    /// Releases everything `holder` owns. Returns how many assets were freed.
    pub fn release_holder(&mut self, holder: &ReservationHolder) -> usize {
        let before = self.holds.len();
        self.holds.retain(|_, existing| existing != holder);
        before - self.holds.len()
    }

    pub fn rekey(&mut self, from: &ReservationHolder, to: &ReservationHolder) {
        for existing in self.holds.values_mut() {
            if existing == from {
                *existing = to.clone();
            }
        }
    }

    /// Replaces all offer-held assets with `offers`, keeping draft holds.
    /// Returns assets that could not be reserved because a draft or an
    /// earlier offer in `offers` already holds them.
    pub fn rebuild_offers(&mut self, offers: impl IntoIterator<Item = (OfferId, Vec<String>)>) -> Vec<String> {
        self.holds.retain(|_, holder| matches!(holder, ReservationHolder::Draft(_)));
        let mut conflicts = Vec::new();
        for (id, assets) in offers {
            let holder = ReservationHolder::Offer(id);
            for asset in assets {
                match self.holds.get(&asset) {
                    Some(existing) if *existing != holder => conflicts.push(asset),
                    _ => {
                        self.holds.insert(asset, holder.clone());
                    }
                }
            }
        }
        conflicts
    }

    pub fn holder_of(&self, asset: &str) -> Option<&ReservationHolder> {
        self.holds.get(asset)
    }

    pub fn is_reserved(&self, asset: &str) -> bool {
        self.holds.contains_key(asset)
    }

    pub fn assets(&self) -> BTreeSet<String> {
        self.holds.keys().cloned().collect()
    }

    pub fn held_by(&self, holder: &ReservationHolder) -> Vec<String> {
        self.holds.iter().filter(|(_, existing)| *existing == holder).map(|(asset, _)| asset.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }
}
