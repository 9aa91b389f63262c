//! History scanner: finds the highest sequence already issued in a scope by
//! querying existing records.
//!
//! Relies on fixed-width suffixes: with a common prefix and 4-digit
//! zero-padded sequences, lexicographic order equals numeric order. Records
//! whose suffix is not 4 digits break that ordering; they are reported, not
//! corrected.

use super::allocator::{parse_sequence, SEQUENCE_WIDTH};
use super::scope::Series;
use crate::services::store::{RecordStore, StoreError};

const SCAN_BATCH: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub identifier: String,
    pub sequence: u64,
}

/// Greatest well-formed identifier with `prefix`, or `None`.
///
/// Identifiers whose suffix does not parse are logged and skipped.
pub async fn latest_in_scope(
    store: &dyn RecordStore,
    series: Series,
    prefix: &str,
) -> Result<Option<ScanHit>, StoreError> {
    let mut skip = 0u64;
    loop {
        let batch = store
            .identifiers_desc(series, prefix, skip, SCAN_BATCH)
            .await?;

        for identifier in &batch {
            match parse_sequence(prefix, identifier) {
                Some(sequence) => {
                    let width = identifier.len() - prefix.len();
                    if width != SEQUENCE_WIDTH {
                        tracing::warn!(
                            identifier = %identifier,
                            width,
                            "Sequence suffix is not {} digits; scope ordering may be wrong",
                            SEQUENCE_WIDTH
                        );
                    }
                    return Ok(Some(ScanHit {
                        identifier: identifier.clone(),
                        sequence,
                    }));
                }
                None => {
                    tracing::warn!(
                        identifier = %identifier,
                        series = series.label(),
                        "Skipping identifier with malformed sequence suffix"
                    );
                }
            }
        }

        if (batch.len() as i64) < SCAN_BATCH {
            return Ok(None);
        }
        skip += batch.len() as u64;
    }
}
