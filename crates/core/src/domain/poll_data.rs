use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::offer::{OfferData, OfferId, OfferState};

/// Durable record of known offer states and their bookkeeping, persisted on
/// every change and reloaded at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollData {
    pub sent: BTreeMap<OfferId, OfferState>,
    pub received: BTreeMap<OfferId, OfferState>,
    /// Unix seconds at which each offer was first seen.
    pub timestamps: BTreeMap<OfferId, i64>,
    pub offer_data: BTreeMap<OfferId, OfferData>,
}

impl PollData {
    pub fn state_of(&self, id: &OfferId) -> Option<OfferState> {
        self.sent.get(id).or_else(|| self.received.get(id)).copied()
    }

    /// Ids of offers whose give-list is committed according to this record.
    pub fn committed_offer_ids(&self) -> Vec<OfferId> {
        self.sent
            .iter()
            .chain(self.received.iter())
            .filter(|(_, state)| state.holds_items())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Give-lists snapshotted for the committed offers, in id order.
    /// Received offers count only once they have been handled.
    pub fn committed_give_lists(&self) -> Vec<(OfferId, Vec<String>)> {
        let mut ids = self.committed_offer_ids();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| {
                let data = self.offer_data.get(&id)?;
                if self.received.contains_key(&id) && !data.handled_by_us {
                    return None;
                }
                let assets = data.our_items.as_ref()?.iter().map(|item| item.assetid.clone()).collect();
                Some((id, assets))
            })
            .collect()
    }

    pub fn record_state(&mut self, id: &OfferId, is_our_offer: bool, state: OfferState) {
        let map = if is_our_offer { &mut self.sent } else { &mut self.received };
        map.insert(id.clone(), state);
    }
}
