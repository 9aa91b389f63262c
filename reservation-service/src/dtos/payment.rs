use crate::models::{Payment, PaymentKind};
use crate::services::writer::NewPayment;
use crate::utils::coerce::lenient_f64;
use crate::utils::dates::parse_calendar_date;
use crate::utils::non_blank;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::calendar_date;
use super::reservation::calendar_date_string;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePaymentRequest {
    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(exclusive_min = 0.0, message = "Payment amount must be positive"))]
    pub amount: f64,
    pub method: Option<String>,
    #[validate(custom(function = "calendar_date", message = "Payment date must be YYYY-MM-DD"))]
    pub paid_at: Option<String>,
    pub notes: Option<String>,
}

impl From<CreatePaymentRequest> for NewPayment {
    fn from(req: CreatePaymentRequest) -> Self {
        Self {
            amount: req.amount,
            method: non_blank(req.method),
            paid_at: req.paid_at.as_deref().and_then(parse_calendar_date),
            notes: non_blank(req.notes),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub reservation_id: String,
    #[serde(rename = "nomorNota")]
    pub receipt_number: String,
    pub kind: PaymentKind,
    pub amount: f64,
    pub method: Option<String>,
    pub paid_at: String,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            reservation_id: p.reservation_id,
            receipt_number: p.receipt_number,
            kind: p.kind,
            amount: p.amount,
            method: p.method,
            paid_at: calendar_date_string(&p.paid_at),
            notes: p.notes,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}
