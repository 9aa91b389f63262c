//! Record store abstraction.
//!
//! A reservation and its down payment are written together or not at all.
//! A child is only kept if its parent still exists once the child is
//! written, and a cascade delete never leaves a child without its parent.

pub mod memory;
pub mod mongo;

use crate::models::{Addon, Payment, Reservation, ReservationPatch};
use crate::numbering::Series;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique identifier (invoice or receipt number) is already taken.
    #[error("Duplicate identifier: {0}")]
    Duplicate(String),

    /// The reservation a child record points at does not exist.
    #[error("Reservation {0} not found")]
    MissingParent(String),

    /// Connection loss, write conflict or similar; the caller may retry.
    #[error("Transient store error: {0}")]
    Transient(anyhow::Error),

    #[error("Store error: {0}")]
    Backend(anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            StoreError::MissingParent(id) => {
                AppError::NotFound(anyhow::anyhow!("Reservation {} not found", id))
            }
            StoreError::Transient(e) => {
                tracing::warn!(error = %e, "Transient store failure");
                AppError::ServiceUnavailable("Store temporarily unavailable, please retry".to_string())
            }
            StoreError::Backend(e) => AppError::DatabaseError(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReservationQuery {
    /// Case-insensitive substring of client name, event name or invoice number.
    pub search: Option<String>,
    pub event_from: Option<DateTime<Utc>>,
    /// Inclusive.
    pub event_to: Option<DateTime<Utc>>,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentQuery {
    /// Case-insensitive substring of receipt number or payment method.
    pub search: Option<String>,
    pub reservation_id: Option<String>,
    pub skip: u64,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeSummary {
    pub addons_deleted: u64,
    pub payments_deleted: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Identifiers of `series` starting with `prefix`, greatest first.
    async fn identifiers_desc(
        &self,
        series: Series,
        prefix: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Last value issued in `scope`, or `None` if the counter does not exist.
    async fn counter_value(&self, scope: &str) -> Result<Option<u64>, StoreError>;

    /// Create the counter if missing and raise it to at least `floor`.
    async fn raise_counter(&self, scope: &str, floor: u64) -> Result<(), StoreError>;

    /// Atomically increment the counter (creating it at zero) and return the
    /// new value.
    async fn increment_counter(&self, scope: &str) -> Result<u64, StoreError>;

    /// Step the counter back from `seq` to `seq - 1`, but only while `seq` is
    /// still the last value issued. Returns whether the number was handed back.
    async fn release_counter(&self, scope: &str, seq: u64) -> Result<bool, StoreError>;

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
        down_payment: Option<&Payment>,
    ) -> Result<(), StoreError>;

    async fn find_reservation(&self, id: &str) -> Result<Option<Reservation>, StoreError>;

    async fn update_reservation(
        &self,
        id: &str,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Delete a reservation with all its children. `None` if it did not exist.
    async fn delete_reservation(&self, id: &str) -> Result<Option<CascadeSummary>, StoreError>;

    async fn list_reservations(
        &self,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>, StoreError>;

    /// Insert an add-on, touching the parent's `updatedAt` in the same unit.
    async fn append_addon(&self, addon: &Addon) -> Result<(), StoreError>;

    /// Insert a payment, touching the parent's `updatedAt` in the same unit.
    async fn append_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn addons_for(&self, reservation_id: &str) -> Result<Vec<Addon>, StoreError>;

    async fn payments_for(&self, reservation_id: &str) -> Result<Vec<Payment>, StoreError>;

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Page<Payment>, StoreError>;
}
