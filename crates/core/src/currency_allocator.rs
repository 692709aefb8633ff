//! Currency decomposition
//!
//! Turns a value obligation (in scrap) into concrete currency picks from a
//! bounded supply of keys, refined, reclaimed and scrap. The walk order is
//! fixed so that the same inputs always produce the same picks, and the
//! alteration/change messages built on top of it stay stable.

use tracing::trace;

use crate::domain::currency::{CurrencyCounts, SCRAP_PER_RECLAIMED, SCRAP_PER_REFINED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denomination {
    Key,
    Refined,
    Reclaimed,
    Scrap,
}

impl Denomination {
    fn value(self, key_scrap: i64) -> i64 {
        match self {
            Self::Key => key_scrap,
            Self::Refined => SCRAP_PER_REFINED,
            Self::Reclaimed => SCRAP_PER_RECLAIMED,
            Self::Scrap => 1,
        }
    }

    fn count(self, counts: &CurrencyCounts) -> i64 {
        i64::from(match self {
            Self::Key => counts.keys,
            Self::Refined => counts.refined,
            Self::Reclaimed => counts.reclaimed,
            Self::Scrap => counts.scrap,
        })
    }

    fn adjust(self, counts: &mut CurrencyCounts, delta: i64) {
        let slot = match self {
            Self::Key => &mut counts.keys,
            Self::Refined => &mut counts.refined,
            Self::Reclaimed => &mut counts.reclaimed,
            Self::Scrap => &mut counts.scrap,
        };
        let next = i64::from(*slot) + delta;
        *slot = u32::try_from(next.max(0)).unwrap_or(u32::MAX);
    }
}

/// Result of an allocation.
///
/// `change` is the residual `target - value(picks)`. Zero is an exact hit,
/// negative means the picks overshoot and the other side owes the
/// difference back, positive is a shortfall the caller should have ruled
/// out with an affordability check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub picks: CurrencyCounts,
    pub change: i64,
}

#[derive(Clone, Copy, Debug)]
pub struct CurrencyAllocator {
    key_scrap: i64,
}

impl CurrencyAllocator {
    pub fn new(key_scrap: i64) -> Self {
        Self { key_scrap }
    }

    pub fn key_scrap(&self) -> i64 {
        self.key_scrap
    }

    pub fn allocate(&self, target: i64, available: CurrencyCounts, use_keys: bool) -> Allocation {
        let denominations: &[Denomination] = if use_keys && self.key_scrap > 0 {
            &[Denomination::Key, Denomination::Refined, Denomination::Reclaimed, Denomination::Scrap]
        } else {
            &[Denomination::Refined, Denomination::Reclaimed, Denomination::Scrap]
        };

        let mut picks = CurrencyCounts::default();
        let mut remaining = target;

        if remaining > 0 {
            remaining = self.walk(denominations, available, &mut picks, remaining);
        }

        if remaining < 0 {
            trace!(remaining, ?picks, "overshot target, returning surplus currency");
            // Largest denomination first, never pushing the residual past zero.
            for &denomination in denominations {
                let value = denomination.value(self.key_scrap);
                let removable = (remaining.abs() / value).min(denomination.count(&picks));
                if removable >= 1 {
                    remaining += removable * value;
                    denomination.adjust(&mut picks, -removable);
                }
            }
        }

        trace!(change = remaining, ?picks, "currency allocation finished");
        Allocation { picks, change: remaining }
    }

    /// Descending floor pass, then an ascending ceiling pass once the
    /// smallest denomination is reached with value still owed, then one more
    /// descending pass. Stops on an exact hit, an overshoot, or when the
    /// smallest denomination is reached a second time.
    fn walk(
        &self,
        denominations: &[Denomination],
        available: CurrencyCounts,
        picks: &mut CurrencyCounts,
        mut remaining: i64,
    ) -> i64 {
        let last = denominations.len() - 1;
        let mut index = 0;
        let mut reverse = false;
        let mut has_reversed = false;

        loop {
            let denomination = denominations[index];
            let value = denomination.value(self.key_scrap);
            let left = denomination.count(&available) - denomination.count(picks);

            if index == last {
                if has_reversed {
                    break;
                }
                reverse = true;
            }

            let take = if reverse {
                ((remaining + value - 1) / value).min(left)
            } else {
                (remaining / value).min(left)
            };

            if take >= 1 {
                denomination.adjust(picks, take);
                remaining -= take * value;
            }

            trace!(?denomination, take, remaining, reverse, has_reversed, "allocation step");

            if remaining <= 0 {
                break;
            }

            if index == 0 && reverse {
                has_reversed = true;
                reverse = false;
            }

            if reverse {
                index -= 1;
            } else {
                index += 1;
            }
        }

        remaining
    }
}
