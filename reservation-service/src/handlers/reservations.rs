use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        CreateReservationRequest, CreateReservationResponse, DeleteReservationResponse,
        ListResponse, ReservationDetailResponse, ReservationListParams, ReservationResponse,
        UpdateReservationRequest,
    },
    AppState,
};

/// Create a reservation, numbering it and recording its deposit.
pub async fn create_reservation(
    State(state): State<AppState>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateReservationResponse>), AppError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let input = payload
        .into_input()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Event date is invalid")))?;

    tracing::info!(
        client_name = %input.client_name,
        event_date = %input.event_date,
        down_payment = input.down_payment,
        "Creating reservation"
    );

    let created = state.reservations.create_reservation(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateReservationResponse {
            reservation: created.reservation.into(),
            down_payment_receipt: created.down_payment.map(Into::into),
        }),
    ))
}

pub async fn list_reservations(
    State(state): State<AppState>,
    params: Result<Query<ReservationListParams>, QueryRejection>,
) -> Result<Json<ListResponse<ReservationResponse>>, AppError> {
    let Query(params) = params?;
    let query = params.to_query()?;
    let page = state.reservations.list_reservations(&query).await?;
    Ok(Json(ListResponse::from_page(page, params.pagination())))
}

/// A reservation with its add-ons, payments and running totals.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReservationDetailResponse>, AppError> {
    let detail = state.reservations.get_detail(&id).await?;
    Ok(Json(detail.into()))
}

pub async fn update_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateReservationRequest>, JsonRejection>,
) -> Result<Json<ReservationResponse>, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    tracing::info!(reservation_id = %id, "Updating reservation");

    let updated = state
        .reservations
        .update_reservation(&id, payload.into_changes())
        .await?;
    Ok(Json(updated.into()))
}

/// Delete a reservation together with its add-ons and payments.
pub async fn delete_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReservationResponse>, AppError> {
    tracing::info!(reservation_id = %id, "Deleting reservation");

    let summary = state.reservations.delete_reservation(&id).await?;
    Ok(Json(DeleteReservationResponse {
        id,
        addons_deleted: summary.addons_deleted,
        payments_deleted: summary.payments_deleted,
    }))
}
