//! Reservation and payment writers.
//!
//! Every operation that consumes a sequence number runs its allocate+write
//! unit on a spawned task, so dropping the request future (client
//! disconnect) cannot stop it between the two steps. A duplicate-key
//! rejection means another writer got the same number through a stale
//! counter; that one counter is resynchronized from history and the unit
//! retried with a fresh number for the colliding series only. Numbers a
//! failed unit never wrote are handed back to their counters.

use crate::models::{Addon, Payment, PaymentKind, Reservation, ReservationPatch};
use crate::numbering::{SequenceAllocator, Series};
use crate::services::clock::Clock;
use crate::services::metrics;
use crate::services::store::{
    CascadeSummary, Page, PaymentQuery, RecordStore, ReservationQuery, StoreError,
};
use crate::utils::dates::normalize_instant;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Validated input for a new reservation.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub client_name: String,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    pub event_date: DateTime<Utc>,
    pub venue: Option<String>,
    pub pax: i64,
    pub price_per_pax: f64,
    /// Defaults to `pax * price_per_pax`.
    pub subtotal: Option<f64>,
    /// A non-zero deposit is recorded as a down-payment receipt.
    pub down_payment: f64,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAddon {
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: f64,
    pub method: Option<String>,
    /// Defaults to the day the payment is recorded.
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationChanges {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub event_name: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub pax: Option<i64>,
    pub price_per_pax: Option<f64>,
    pub subtotal: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedReservation {
    pub reservation: Reservation,
    pub down_payment: Option<Payment>,
}

#[derive(Debug, Clone)]
pub struct ReservationDetail {
    pub reservation: Reservation,
    pub addons: Vec<Addon>,
    pub payments: Vec<Payment>,
}

impl ReservationDetail {
    /// Reservation subtotal plus every add-on.
    pub fn grand_total(&self) -> f64 {
        self.reservation.subtotal + self.addons.iter().map(|a| a.subtotal).sum::<f64>()
    }

    pub fn total_paid(&self) -> f64 {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn balance(&self) -> f64 {
        self.grand_total() - self.total_paid()
    }
}

/// Numbers claimed by one write unit, kept across conflict retries.
#[derive(Default)]
struct Claims {
    held: Mutex<Vec<(Series, String)>>,
}

impl Claims {
    /// The number already claimed for `series`, or a freshly allocated one.
    async fn take(
        &self,
        allocator: &SequenceAllocator,
        series: Series,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let held = self
            .held
            .lock()
            .await
            .iter()
            .find(|(s, _)| *s == series)
            .map(|(_, id)| id.clone());
        if let Some(identifier) = held {
            return Ok(identifier);
        }
        let identifier = allocator.allocate(series, now).await?;
        self.held.lock().await.push((series, identifier.clone()));
        Ok(identifier)
    }

    /// Drop the claim a duplicate-key rejection names; another record owns
    /// that number now.
    async fn forfeit(&self, rejected: &str) -> Option<(Series, String)> {
        let quoted = |id: &str| format!("\"{}\"", id);
        let mut held = self.held.lock().await;
        let index = held
            .iter()
            .position(|(_, id)| rejected == id.as_str() || rejected.contains(&quoted(id.as_str())))?;
        Some(held.remove(index))
    }

    async fn drain(&self) -> Vec<(Series, String)> {
        std::mem::take(&mut *self.held.lock().await)
    }
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn RecordStore>,
    allocator: SequenceAllocator,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        allocator: SequenceAllocator,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            allocator,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn create_reservation(
        &self,
        input: NewReservation,
    ) -> Result<CreatedReservation, AppError> {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let now = this.clock.now();
            let claims = Claims::default();
            this.with_conflict_retry(&claims, now, || this.try_create(&input, &claims, now))
                .await
        });
        let created = join(task).await?;

        tracing::info!(
            reservation_id = %created.reservation.id,
            invoice_number = %created.reservation.invoice_number,
            down_payment = created.down_payment.as_ref().map(|p| p.receipt_number.as_str()),
            "Reservation created"
        );
        Ok(created)
    }

    async fn try_create(
        &self,
        input: &NewReservation,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<CreatedReservation, StoreError> {
        let invoice_number = claims.take(&self.allocator, Series::Invoice, now).await?;

        let mut reservation = Reservation::new(invoice_number, now);
        reservation.client_name = input.client_name.clone();
        reservation.client_phone = input.client_phone.clone();
        reservation.event_name = input.event_name.clone();
        reservation.event_date = normalize_instant(input.event_date);
        reservation.venue = input.venue.clone();
        reservation.pax = input.pax;
        reservation.price_per_pax = input.price_per_pax;
        reservation.subtotal = input
            .subtotal
            .unwrap_or(input.pax as f64 * input.price_per_pax);
        reservation.down_payment = input.down_payment;
        reservation.notes = input.notes.clone();

        let down_payment = if input.down_payment != 0.0 {
            let receipt_number = claims.take(&self.allocator, Series::Receipt, now).await?;
            Some(Payment::new(
                reservation.id.clone(),
                receipt_number,
                PaymentKind::DownPayment,
                input.down_payment,
                input.payment_method.clone(),
                self.allocator.calendar_day(now),
                None,
                now,
            ))
        } else {
            None
        };

        self.store
            .insert_reservation(&reservation, down_payment.as_ref())
            .await?;

        Ok(CreatedReservation {
            reservation,
            down_payment,
        })
    }

    pub async fn append_addon(&self, reservation_id: &str, input: NewAddon) -> Result<Addon, AppError> {
        let addon = Addon::new(
            reservation_id.to_string(),
            input.name,
            input.quantity,
            input.unit_price,
            input.subtotal,
            self.clock.now(),
        );
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move {
            store.append_addon(&addon).await?;
            Ok::<_, AppError>(addon)
        });
        let addon = join(task).await?;

        tracing::info!(
            reservation_id = %reservation_id,
            addon_id = %addon.id,
            subtotal = addon.subtotal,
            "Add-on appended"
        );
        Ok(addon)
    }

    pub async fn append_payment(
        &self,
        reservation_id: &str,
        input: NewPayment,
    ) -> Result<Payment, AppError> {
        // Checked up front so an unknown reservation does not consume a receipt number.
        self.require_reservation(reservation_id).await?;

        let this = self.clone();
        let reservation_id = reservation_id.to_string();
        let task = tokio::spawn(async move {
            let now = this.clock.now();
            let claims = Claims::default();
            this.with_conflict_retry(&claims, now, || {
                this.try_append_payment(&reservation_id, &input, &claims, now)
            })
            .await
        });
        let payment = join(task).await?;

        tracing::info!(
            reservation_id = %payment.reservation_id,
            receipt_number = %payment.receipt_number,
            amount = payment.amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    async fn try_append_payment(
        &self,
        reservation_id: &str,
        input: &NewPayment,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<Payment, StoreError> {
        let receipt_number = claims.take(&self.allocator, Series::Receipt, now).await?;
        let paid_at = input
            .paid_at
            .map(normalize_instant)
            .unwrap_or_else(|| self.allocator.calendar_day(now));
        let payment = Payment::new(
            reservation_id.to_string(),
            receipt_number,
            PaymentKind::Installment,
            input.amount,
            input.method.clone(),
            paid_at,
            input.notes.clone(),
            now,
        );
        self.store.append_payment(&payment).await?;
        Ok(payment)
    }

    pub async fn update_reservation(
        &self,
        id: &str,
        changes: ReservationChanges,
    ) -> Result<Reservation, AppError> {
        let current = self.require_reservation(id).await?;

        let mut patch = ReservationPatch::new(self.clock.now());
        patch.subtotal = match changes.subtotal {
            Some(subtotal) => Some(subtotal),
            None if changes.pax.is_some() || changes.price_per_pax.is_some() => {
                let pax = changes.pax.unwrap_or(current.pax);
                let price = changes.price_per_pax.unwrap_or(current.price_per_pax);
                Some(pax as f64 * price)
            }
            None => None,
        };
        patch.client_name = changes.client_name;
        patch.client_phone = changes.client_phone;
        patch.event_name = changes.event_name;
        patch.event_date = changes.event_date.map(normalize_instant);
        patch.venue = changes.venue;
        patch.pax = changes.pax;
        patch.price_per_pax = changes.price_per_pax;
        patch.notes = changes.notes;

        let updated = self
            .store
            .update_reservation(id, &patch)
            .await?
            .ok_or_else(|| not_found(id))?;

        tracing::info!(reservation_id = %id, "Reservation updated");
        Ok(updated)
    }

    pub async fn delete_reservation(&self, id: &str) -> Result<CascadeSummary, AppError> {
        let store = Arc::clone(&self.store);
        let owned_id = id.to_string();
        let summary = tokio::spawn(async move { store.delete_reservation(&owned_id).await })
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Delete task failed: {}", e)))??
            .ok_or_else(|| not_found(id))?;

        tracing::info!(
            reservation_id = %id,
            addons_deleted = summary.addons_deleted,
            payments_deleted = summary.payments_deleted,
            "Reservation deleted"
        );
        Ok(summary)
    }

    pub async fn get_detail(&self, id: &str) -> Result<ReservationDetail, AppError> {
        let reservation = self.require_reservation(id).await?;
        let addons = self.store.addons_for(id).await?;
        let payments = self.store.payments_for(id).await?;
        Ok(ReservationDetail {
            reservation,
            addons,
            payments,
        })
    }

    pub async fn list_reservations(
        &self,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>, AppError> {
        Ok(self.store.list_reservations(query).await?)
    }

    pub async fn list_payments(&self, query: &PaymentQuery) -> Result<Page<Payment>, AppError> {
        Ok(self.store.list_payments(query).await?)
    }

    async fn require_reservation(&self, id: &str) -> Result<Reservation, AppError> {
        self.store
            .find_reservation(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Run `op` until it succeeds, retrying only when the store rejects a
    /// claimed number as a duplicate. Each retry resyncs the counter of the
    /// colliding series and keeps the other claims. Claims left over when
    /// `op` finally fails are released.
    async fn with_conflict_retry<T, F, Fut>(
        &self,
        claims: &Claims,
        now: DateTime<Utc>,
        mut op: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = AtomicU32::new(0);
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(20),
            max_interval: Duration::from_millis(500),
            max_elapsed_time: None,
            ..Default::default()
        };

        let result = retry(policy, || {
            let attempt = op();
            let attempts = &attempts;
            async move {
                match attempt.await {
                    Ok(value) => Ok(value),
                    Err(StoreError::Duplicate(rejected)) => {
                        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        let colliding: Vec<Series> = match claims.forfeit(&rejected).await {
                            Some((series, identifier)) => {
                                tracing::warn!(
                                    identifier = %identifier,
                                    attempt = n,
                                    "Allocated number already taken; resyncing counter"
                                );
                                vec![series]
                            }
                            None => {
                                tracing::warn!(
                                    rejected = %rejected,
                                    attempt = n,
                                    "Duplicate names no claimed number; releasing all claims"
                                );
                                let released = claims.drain().await;
                                let held: Vec<Series> = released.iter().map(|(s, _)| *s).collect();
                                self.release_all(released, now).await;
                                held
                            }
                        };
                        for s in colliding {
                            metrics::record_conflict(s);
                            if let Err(e) = self.allocator.resync(s, now).await {
                                return Err(backoff::Error::permanent(e));
                            }
                        }
                        let err = StoreError::Duplicate(rejected);
                        if n >= self.max_attempts {
                            Err(backoff::Error::permanent(err))
                        } else {
                            Err(backoff::Error::transient(err))
                        }
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await;

        if result.is_err() {
            self.release_all(claims.drain().await, now).await;
        }

        result.map_err(|e| match e {
            StoreError::Duplicate(identifier) => {
                tracing::error!(
                    identifier = %identifier,
                    attempts = self.max_attempts,
                    "Giving up on sequence allocation after repeated conflicts"
                );
                AppError::ServiceUnavailable(
                    "Could not allocate a unique document number, please retry".to_string(),
                )
            }
            other => other.into(),
        })
    }

    /// Hand numbers that were never written back to their counters, newest
    /// first.
    async fn release_all(&self, claims: Vec<(Series, String)>, now: DateTime<Utc>) {
        for (series, identifier) in claims.into_iter().rev() {
            if let Err(e) = self.allocator.release(series, now, &identifier).await {
                tracing::warn!(
                    identifier = %identifier,
                    error = %e,
                    "Failed to release sequence number"
                );
            }
        }
    }
}

async fn join<T>(task: tokio::task::JoinHandle<Result<T, AppError>>) -> Result<T, AppError> {
    task.await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Write task failed: {}", e)))?
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Reservation {} not found", id))
}
