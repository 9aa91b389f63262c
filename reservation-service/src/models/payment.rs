use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Deposit recorded automatically when the reservation is created.
    DownPayment,
    Installment,
}

/// A monetary transaction against one reservation, carrying its own receipt
/// number (`NOTA/{YYYY}/{MM}-SDP-{NNNN}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub reservation_id: String,
    #[serde(rename = "nomorNota")]
    pub receipt_number: String,
    pub kind: PaymentKind,
    pub amount: f64,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub paid_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reservation_id: String,
        receipt_number: String,
        kind: PaymentKind,
        amount: f64,
        method: Option<String>,
        paid_at: DateTime<Utc>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reservation_id,
            receipt_number,
            kind,
            amount,
            method,
            paid_at,
            notes,
            created_at: now,
        }
    }
}
