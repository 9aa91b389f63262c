use crate::models::{Addon, Reservation};
use crate::services::writer::{NewAddon, NewReservation, ReservationChanges, ReservationDetail};
use crate::utils::coerce::{lenient_f64, lenient_i64, lenient_opt_f64, lenient_opt_i64};
use crate::utils::dates::parse_calendar_date;
use crate::utils::non_blank;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::payment::PaymentResponse;
use super::{calendar_date, not_blank};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateReservationRequest {
    #[validate(custom(function = "not_blank", message = "Client name is required"))]
    pub client_name: String,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    #[validate(custom(function = "calendar_date", message = "Event date must be YYYY-MM-DD"))]
    pub event_date: String,
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub pax: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_per_pax: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub subtotal: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Down payment cannot be negative"))]
    pub down_payment: f64,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl CreateReservationRequest {
    /// Call after `validate()`; an unparseable date is reported there.
    pub fn into_input(self) -> Option<NewReservation> {
        Some(NewReservation {
            event_date: parse_calendar_date(&self.event_date)?,
            client_name: self.client_name.trim().to_string(),
            client_phone: non_blank(self.client_phone),
            event_name: non_blank(self.event_name),
            venue: non_blank(self.venue),
            pax: self.pax,
            price_per_pax: self.price_per_pax,
            subtotal: self.subtotal,
            down_payment: self.down_payment,
            payment_method: non_blank(self.payment_method),
            notes: non_blank(self.notes),
        })
    }
}

/// Editable reservation metadata. The invoice number and deposit are not
/// part of this structure, so attempts to change them are rejected as
/// unknown fields.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateReservationRequest {
    #[validate(custom(function = "not_blank", message = "Client name cannot be blank"))]
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    #[validate(custom(function = "calendar_date", message = "Event date must be YYYY-MM-DD"))]
    pub event_date: Option<String>,
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub pax: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub price_per_pax: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub subtotal: Option<f64>,
    pub notes: Option<String>,
}

impl UpdateReservationRequest {
    pub fn into_changes(self) -> ReservationChanges {
        ReservationChanges {
            client_name: non_blank(self.client_name),
            client_phone: non_blank(self.client_phone),
            event_name: non_blank(self.event_name),
            event_date: self.event_date.as_deref().and_then(parse_calendar_date),
            venue: non_blank(self.venue),
            pax: self.pax,
            price_per_pax: self.price_per_pax,
            subtotal: self.subtotal,
            notes: non_blank(self.notes),
        }
    }
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAddonRequest {
    #[validate(custom(function = "not_blank", message = "Add-on name is required"))]
    pub name: String,
    #[serde(default = "default_quantity", deserialize_with = "lenient_i64")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub subtotal: Option<f64>,
}

impl From<CreateAddonRequest> for NewAddon {
    fn from(req: CreateAddonRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            quantity: req.quantity,
            unit_price: req.unit_price,
            subtotal: req.subtotal,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: String,
    #[serde(rename = "nomorInvoice")]
    pub invoice_number: String,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    pub event_date: String,
    pub venue: Option<String>,
    pub pax: i64,
    pub price_per_pax: f64,
    pub subtotal: f64,
    pub down_payment: f64,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            invoice_number: r.invoice_number,
            client_name: r.client_name,
            client_phone: r.client_phone,
            event_name: r.event_name,
            event_date: calendar_date_string(&r.event_date),
            venue: r.venue,
            pax: r.pax,
            price_per_pax: r.price_per_pax,
            subtotal: r.subtotal,
            down_payment: r.down_payment,
            notes: r.notes,
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonResponse {
    pub id: String,
    pub reservation_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
    pub created_at: String,
}

impl From<Addon> for AddonResponse {
    fn from(a: Addon) -> Self {
        Self {
            id: a.id,
            reservation_id: a.reservation_id,
            name: a.name,
            quantity: a.quantity,
            unit_price: a.unit_price,
            subtotal: a.subtotal,
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationResponse {
    #[serde(flatten)]
    pub reservation: ReservationResponse,
    pub down_payment_receipt: Option<PaymentResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDetailResponse {
    #[serde(flatten)]
    pub reservation: ReservationResponse,
    pub addons: Vec<AddonResponse>,
    pub payments: Vec<PaymentResponse>,
    pub grand_total: f64,
    pub total_paid: f64,
    pub balance: f64,
}

impl From<ReservationDetail> for ReservationDetailResponse {
    fn from(detail: ReservationDetail) -> Self {
        let grand_total = detail.grand_total();
        let total_paid = detail.total_paid();
        Self {
            reservation: detail.reservation.into(),
            addons: detail.addons.into_iter().map(Into::into).collect(),
            payments: detail.payments.into_iter().map(Into::into).collect(),
            grand_total,
            total_paid,
            balance: grand_total - total_paid,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReservationResponse {
    pub id: String,
    pub addons_deleted: u64,
    pub payments_deleted: u64,
}

pub(crate) fn calendar_date_string(instant: &chrono::DateTime<chrono::Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}
