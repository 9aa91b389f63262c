use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last sequence number issued within one numbering scope.
///
/// Keyed by the scope prefix, e.g. `INV/2025/06-VE-`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceCounter {
    #[serde(rename = "_id")]
    pub scope: String,
    pub seq: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}
