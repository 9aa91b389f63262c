//! Request and response bodies.
//!
//! Requests are closed structures: unknown fields are rejected, numeric
//! fields accept numbers or numeric strings, dates accept `YYYY-MM-DD`,
//! `DD/MM/YYYY` or RFC 3339.

pub mod listing;
pub mod payment;
pub mod reservation;

pub use listing::{ListResponse, Pagination, PaymentListParams, ReservationListParams};
pub use payment::{CreatePaymentRequest, PaymentResponse};
pub use reservation::{
    AddonResponse, CreateAddonRequest, CreateReservationRequest, CreateReservationResponse,
    DeleteReservationResponse, ReservationDetailResponse, ReservationResponse,
    UpdateReservationRequest,
};

use crate::utils::dates::parse_calendar_date;
use validator::ValidationError;

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

pub(crate) fn calendar_date(value: &str) -> Result<(), ValidationError> {
    match parse_calendar_date(value) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("date")),
    }
}
