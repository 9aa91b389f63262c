//! Shared setup for reservation-service integration tests.
//!
//! Drives the router in-process against the in-memory store with a clock
//! the test controls.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use reservation_service::config::NumberingConfig;
use reservation_service::models::{Addon, Payment, Reservation, ReservationPatch};
use reservation_service::numbering::Series;
use reservation_service::services::store::{CascadeSummary, Page, PaymentQuery, ReservationQuery};
use reservation_service::services::{Clock, FixedClock, MemoryStore, RecordStore, StoreError};
use reservation_service::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub fn june_2025() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_numbering(NumberingConfig::default())
    }

    pub fn with_numbering(numbering: NumberingConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), numbering)
    }

    pub fn with_store(store: Arc<MemoryStore>, numbering: NumberingConfig) -> Self {
        let record_store: Arc<dyn RecordStore> = store.clone();
        Self::with_record_store(store, record_store, numbering)
    }

    /// Route through `record_store` while `store` stays reachable for
    /// assertions, e.g. when `record_store` wraps it.
    pub fn with_record_store(
        store: Arc<MemoryStore>,
        record_store: Arc<dyn RecordStore>,
        numbering: NumberingConfig,
    ) -> Self {
        let clock = Arc::new(FixedClock::new(june_2025()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let state = AppState::new("reservation-service-test", record_store, dyn_clock, numbering);
        Self {
            router: build_router(state.clone()),
            state,
            store,
            clock,
        }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, None).await
    }

    /// Create a reservation and return the response body.
    pub async fn create_reservation(&self, body: Value) -> Value {
        let (status, json) = self.post("/reservations", body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", json);
        json
    }
}

pub fn booking(client_name: &str) -> Value {
    json!({
        "clientName": client_name,
        "eventName": "Wedding reception",
        "eventDate": "2025-08-17",
        "pax": 150,
        "pricePerPax": 95000,
    })
}

pub fn booking_with_deposit(client_name: &str, deposit: f64) -> Value {
    let mut body = booking(client_name);
    body["downPayment"] = json!(deposit);
    body["paymentMethod"] = json!("transfer");
    body
}

/// Memory store that fails on demand: the first `duplicate_inserts`
/// reservation inserts are rejected as duplicates, and deletes fail while
/// `fail_deletes` is set.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    pub inserts: AtomicU32,
    duplicate_inserts: u32,
    fail_deletes: bool,
}

impl FaultyStore {
    pub fn colliding(duplicate_inserts: u32) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            inserts: AtomicU32::new(0),
            duplicate_inserts,
            fail_deletes: false,
        }
    }

    pub fn failing_deletes(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            inserts: AtomicU32::new(0),
            duplicate_inserts: 0,
            fail_deletes: true,
        }
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn identifiers_desc(
        &self,
        series: Series,
        prefix: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.identifiers_desc(series, prefix, skip, limit).await
    }

    async fn counter_value(&self, scope: &str) -> Result<Option<u64>, StoreError> {
        self.inner.counter_value(scope).await
    }

    async fn raise_counter(&self, scope: &str, floor: u64) -> Result<(), StoreError> {
        self.inner.raise_counter(scope, floor).await
    }

    async fn increment_counter(&self, scope: &str) -> Result<u64, StoreError> {
        self.inner.increment_counter(scope).await
    }

    async fn release_counter(&self, scope: &str, seq: u64) -> Result<bool, StoreError> {
        self.inner.release_counter(scope, seq).await
    }

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
        down_payment: Option<&Payment>,
    ) -> Result<(), StoreError> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) < self.duplicate_inserts {
            return Err(StoreError::Duplicate(reservation.invoice_number.clone()));
        }
        self.inner.insert_reservation(reservation, down_payment).await
    }

    async fn find_reservation(&self, id: &str) -> Result<Option<Reservation>, StoreError> {
        self.inner.find_reservation(id).await
    }

    async fn update_reservation(
        &self,
        id: &str,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError> {
        self.inner.update_reservation(id, patch).await
    }

    async fn delete_reservation(&self, id: &str) -> Result<Option<CascadeSummary>, StoreError> {
        if self.fail_deletes {
            return Err(StoreError::Transient(anyhow::anyhow!(
                "connection reset while deleting {}",
                id
            )));
        }
        self.inner.delete_reservation(id).await
    }

    async fn list_reservations(
        &self,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>, StoreError> {
        self.inner.list_reservations(query).await
    }

    async fn append_addon(&self, addon: &Addon) -> Result<(), StoreError> {
        self.inner.append_addon(addon).await
    }

    async fn append_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.inner.append_payment(payment).await
    }

    async fn addons_for(&self, reservation_id: &str) -> Result<Vec<Addon>, StoreError> {
        self.inner.addons_for(reservation_id).await
    }

    async fn payments_for(&self, reservation_id: &str) -> Result<Vec<Payment>, StoreError> {
        self.inner.payments_for(reservation_id).await
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Page<Payment>, StoreError> {
        self.inner.list_payments(query).await
    }
}
