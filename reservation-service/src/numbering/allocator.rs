//! Sequence allocation.
//!
//! Each scope has an explicit counter record advanced with an atomic
//! increment-and-fetch, so concurrent requests in one scope never observe
//! the same value. The history scanner only seeds a counter: the first time
//! a scope is touched (and after a uniqueness conflict) the highest existing
//! sequence is folded in with a `max`, which concurrent seeders agree on.

use super::scanner;
use super::scope::{ScopeKey, Series};
use crate::services::metrics;
use crate::services::store::{RecordStore, StoreError};
use crate::utils::dates::utc_midnight;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;

/// Minimum width of the zero-padded sequence suffix.
pub const SEQUENCE_WIDTH: usize = 4;

/// Sequence number carried by `identifier`, if it belongs to `prefix` and its
/// suffix is all ASCII digits.
pub fn parse_sequence(prefix: &str, identifier: &str) -> Option<u64> {
    let suffix = identifier.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// `prefix` followed by `sequence` zero-padded to [`SEQUENCE_WIDTH`]. Wider
/// values are written in full.
pub fn format_identifier(prefix: &str, sequence: u64) -> String {
    format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH)
}

/// The identifier following `last` in its scope, or the first one.
pub fn next_identifier(prefix: &str, last: Option<&str>) -> String {
    let next = last
        .and_then(|id| parse_sequence(prefix, id))
        .map_or(1, |seq| seq + 1);
    format_identifier(prefix, next)
}

#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn RecordStore>,
    offset: FixedOffset,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn RecordStore>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    pub fn scope(&self, series: Series, now: DateTime<Utc>) -> ScopeKey {
        ScopeKey::for_instant(series, now, self.offset)
    }

    /// Claim the next identifier of `series` in the scope of `now`.
    pub async fn allocate(&self, series: Series, now: DateTime<Utc>) -> Result<String, StoreError> {
        let prefix = self.scope(series, now).prefix();

        if self.store.counter_value(&prefix).await?.is_none() {
            self.seed(series, &prefix).await?;
        }

        let sequence = self.store.increment_counter(&prefix).await?;
        let identifier = format_identifier(&prefix, sequence);

        metrics::record_allocation(series);
        tracing::debug!(identifier = %identifier, "Allocated sequence number");
        Ok(identifier)
    }

    /// Hand `identifier` back to its scope counter after the write that was
    /// going to use it failed. Only the most recently issued number can be
    /// returned; anything older stays a gap.
    pub async fn release(
        &self,
        series: Series,
        now: DateTime<Utc>,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        let prefix = self.scope(series, now).prefix();
        let Some(sequence) = parse_sequence(&prefix, identifier) else {
            return Ok(false);
        };
        let released = self.store.release_counter(&prefix, sequence).await?;
        if released {
            tracing::debug!(identifier = %identifier, "Released unused sequence number");
        } else {
            tracing::warn!(
                identifier = %identifier,
                "Could not release sequence number; it stays unused"
            );
        }
        Ok(released)
    }

    /// UTC midnight of the calendar day `now` falls on in the scope offset,
    /// so a record's date and its scope month agree.
    pub fn calendar_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        utc_midnight(now.with_timezone(&self.offset).date_naive())
    }

    /// Raise the scope counter to the highest sequence found in history.
    pub async fn resync(&self, series: Series, now: DateTime<Utc>) -> Result<(), StoreError> {
        let prefix = self.scope(series, now).prefix();
        self.seed(series, &prefix).await
    }

    async fn seed(&self, series: Series, prefix: &str) -> Result<(), StoreError> {
        let hit = scanner::latest_in_scope(self.store.as_ref(), series, prefix).await?;
        let floor = hit.as_ref().map_or(0, |h| h.sequence);
        if let Some(hit) = &hit {
            tracing::info!(
                scope = %prefix,
                latest = %hit.identifier,
                "Seeding sequence counter from history"
            );
        }
        self.store.raise_counter(prefix, floor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PREFIX: &str = "INV/2025/06-VE-";

    #[test]
    fn first_in_scope_is_one() {
        assert_eq!(next_identifier(PREFIX, None), "INV/2025/06-VE-0001");
    }

    #[test]
    fn increments_previous_maximum() {
        assert_eq!(
            next_identifier(PREFIX, Some("INV/2025/06-VE-0014")),
            "INV/2025/06-VE-0015"
        );
    }

    #[test]
    fn widens_past_four_digits() {
        assert_eq!(
            next_identifier(PREFIX, Some("INV/2025/06-VE-9999")),
            "INV/2025/06-VE-10000"
        );
    }

    #[test]
    fn malformed_suffix_is_not_a_sequence() {
        assert_eq!(parse_sequence(PREFIX, "INV/2025/06-VE-XXXX"), None);
        assert_eq!(parse_sequence(PREFIX, "INV/2025/06-VE-"), None);
        assert_eq!(parse_sequence(PREFIX, "INV/2025/06-VE-+12"), None);
        assert_eq!(parse_sequence(PREFIX, "INV/2025/05-VE-0003"), None);
        assert_eq!(next_identifier(PREFIX, Some("INV/2025/06-VE-XXXX")), "INV/2025/06-VE-0001");
    }

    proptest! {
        #[test]
        fn next_is_strictly_greater(seq in 0u64..1_000_000) {
            let last = format_identifier(PREFIX, seq);
            let next = next_identifier(PREFIX, Some(&last));
            prop_assert_eq!(parse_sequence(PREFIX, &next), Some(seq + 1));
        }

        #[test]
        fn fixed_width_order_is_numeric_order(a in 0u64..10_000, b in 0u64..10_000) {
            let (ia, ib) = (format_identifier(PREFIX, a), format_identifier(PREFIX, b));
            prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
        }
    }
}
