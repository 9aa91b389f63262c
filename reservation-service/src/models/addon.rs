use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced line item attached to exactly one reservation.
///
/// Add-ons are append-only; they disappear only with their reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    #[serde(rename = "_id")]
    pub id: String,
    pub reservation_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Addon {
    pub fn new(
        reservation_id: String,
        name: String,
        quantity: i64,
        unit_price: f64,
        subtotal: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reservation_id,
            name,
            quantity,
            unit_price,
            subtotal: subtotal.unwrap_or(quantity as f64 * unit_price),
            created_at: now,
        }
    }
}
