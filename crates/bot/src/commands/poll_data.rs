use std::collections::BTreeMap;

use serde::Serialize;
use tradebot_core::config::{AppConfig, LoadOptions};
use tradebot_core::domain::offer::{OfferId, OfferState};
use tradebot_core::domain::poll_data::PollData;
use tradebot_core::ports::PollDataStore;
use tradebot_core::trades::Reservations;

use super::CommandResult;
use crate::poll_store::FilePollDataStore;

#[derive(Debug, Serialize)]
pub struct PollDataReport {
    pub path: String,
    pub found: bool,
    pub sent: BTreeMap<String, usize>,
    pub received: BTreeMap<String, usize>,
    pub committed_offers: Vec<String>,
    pub reserved_assets: usize,
    /// Assets claimed by more than one committed offer.
    pub conflicts: Vec<String>,
}

impl PollDataReport {
    pub fn from_poll_data(path: String, poll_data: Option<&PollData>) -> Self {
        let Some(poll_data) = poll_data else {
            return Self {
                path,
                found: false,
                sent: BTreeMap::new(),
                received: BTreeMap::new(),
                committed_offers: Vec::new(),
                reserved_assets: 0,
                conflicts: Vec::new(),
            };
        };

        let count_states = |states: &BTreeMap<OfferId, OfferState>| {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for state in states.values() {
                *counts.entry(format!("{state:?}")).or_insert(0) += 1;
            }
            counts
        };

        let mut committed: Vec<String> = poll_data.committed_offer_ids().iter().map(ToString::to_string).collect();
        committed.sort();

        let mut reservations = Reservations::default();
        let conflicts = reservations.rebuild_offers(poll_data.committed_give_lists());

        Self {
            path,
            found: true,
            sent: count_states(&poll_data.sent),
            received: count_states(&poll_data.received),
            committed_offers: committed,
            reserved_assets: reservations.len(),
            conflicts,
        }
    }

    pub fn render_text(&self) -> String {
        if !self.found {
            return format!("no poll data at {}", self.path);
        }

        let render_counts = |counts: &BTreeMap<String, usize>| {
            if counts.is_empty() {
                return "none".to_string();
            }
            counts.iter().map(|(state, count)| format!("{state}={count}")).collect::<Vec<_>>().join(", ")
        };

        let mut lines = vec![
            format!("poll data: {}", self.path),
            format!("- sent: {}", render_counts(&self.sent)),
            format!("- received: {}", render_counts(&self.received)),
            format!("- committed offers: {}", self.committed_offers.len()),
            format!("- reserved assets: {}", self.reserved_assets),
        ];
        if !self.conflicts.is_empty() {
            lines.push(format!("- conflicting assets: {}", self.conflicts.join(", ")));
        }
        lines.join("\n")
    }
}

pub async fn run(options: LoadOptions, json: bool) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("poll-data", "config_validation", error.to_string(), 2);
        }
    };

    let store = FilePollDataStore::new(config.storage.poll_data_path.clone());
    let poll_data = match store.load().await {
        Ok(poll_data) => poll_data,
        Err(error) => return CommandResult::failure("poll-data", "poll_data", error.to_string(), 1),
    };

    let report = PollDataReport::from_poll_data(store.path().display().to_string(), poll_data.as_ref());
    if !json {
        return CommandResult::text(report.render_text());
    }

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult::text(output),
        Err(error) => CommandResult::failure("poll-data", "serialization", error.to_string(), 1),
    }
}
