pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod numbering;
pub mod services;
pub mod startup;
pub mod utils;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware, tracing::REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::NumberingConfig;
use numbering::SequenceAllocator;
use services::{Clock, RecordStore, ReservationService};

pub use startup::Application;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub reservations: ReservationService,
}

impl AppState {
    pub fn new(
        service_name: impl Into<String>,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        numbering: NumberingConfig,
    ) -> Self {
        let allocator = SequenceAllocator::new(Arc::clone(&store), numbering.utc_offset);
        Self {
            service_name: service_name.into(),
            reservations: ReservationService::new(store, allocator, clock, numbering.max_attempts),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/reservations",
            post(handlers::reservations::create_reservation)
                .get(handlers::reservations::list_reservations),
        )
        .route(
            "/reservations/:id",
            get(handlers::reservations::get_reservation)
                .patch(handlers::reservations::update_reservation)
                .delete(handlers::reservations::delete_reservation),
        )
        .route(
            "/reservations/:id/addons",
            post(handlers::addons::append_addon),
        )
        .route(
            "/reservations/:id/payments",
            post(handlers::payments::append_payment),
        )
        .route("/payments", get(handlers::payments::list_payments))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
