use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{AddonResponse, CreateAddonRequest},
    AppState,
};

pub async fn append_addon(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
    payload: Result<Json<CreateAddonRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddonResponse>), AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let addon = state
        .reservations
        .append_addon(&reservation_id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(addon.into())))
}
