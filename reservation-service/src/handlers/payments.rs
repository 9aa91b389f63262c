//! Payment handlers. Each recorded payment receives its own receipt number.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CreatePaymentRequest, ListResponse, PaymentListParams, PaymentResponse},
    AppState,
};

pub async fn append_payment(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    tracing::info!(
        reservation_id = %reservation_id,
        amount = payload.amount,
        "Recording payment"
    );

    let payment = state
        .reservations
        .append_payment(&reservation_id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// Receipts listing, newest first.
pub async fn list_payments(
    State(state): State<AppState>,
    params: Result<Query<PaymentListParams>, QueryRejection>,
) -> Result<Json<ListResponse<PaymentResponse>>, AppError> {
    let Query(params) = params?;
    let page = state.reservations.list_payments(&params.to_query()).await?;
    Ok(Json(ListResponse::from_page(page, params.pagination())))
}
