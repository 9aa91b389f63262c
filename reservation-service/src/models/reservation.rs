use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A venue reservation, keyed by its invoice number (`nomorInvoice`).
///
/// Owns its add-ons and payments, which live in their own collections and
/// reference the reservation by `_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "nomorInvoice")]
    pub invoice_number: String,
    pub client_name: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub event_date: DateTime<Utc>,
    #[serde(default)]
    pub venue: Option<String>,
    pub pax: i64,
    pub price_per_pax: f64,
    pub subtotal: f64,
    pub down_payment: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(invoice_number: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invoice_number,
            client_name: String::new(),
            client_phone: None,
            event_name: None,
            event_date: now,
            venue: None,
            pax: 0,
            price_per_pax: 0.0,
            subtotal: 0.0,
            down_payment: 0.0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a reservation's metadata. `None` leaves a field as is.
///
/// The invoice number and down payment are not editable.
#[derive(Debug, Clone)]
pub struct ReservationPatch {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub pax: Option<i64>,
    pub price_per_pax: Option<f64>,
    pub subtotal: Option<f64>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationPatch {
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            client_name: None,
            client_phone: None,
            event_name: None,
            event_date: None,
            venue: None,
            pax: None,
            price_per_pax: None,
            subtotal: None,
            notes: None,
            updated_at,
        }
    }

    pub fn apply(&self, reservation: &mut Reservation) {
        if let Some(v) = &self.client_name {
            reservation.client_name = v.clone();
        }
        if let Some(v) = &self.client_phone {
            reservation.client_phone = Some(v.clone());
        }
        if let Some(v) = &self.event_name {
            reservation.event_name = Some(v.clone());
        }
        if let Some(v) = self.event_date {
            reservation.event_date = v;
        }
        if let Some(v) = &self.venue {
            reservation.venue = Some(v.clone());
        }
        if let Some(v) = self.pax {
            reservation.pax = v;
        }
        if let Some(v) = self.price_per_pax {
            reservation.price_per_pax = v;
        }
        if let Some(v) = self.subtotal {
            reservation.subtotal = v;
        }
        if let Some(v) = &self.notes {
            reservation.notes = Some(v.clone());
        }
        reservation.updated_at = self.updated_at;
    }
}
