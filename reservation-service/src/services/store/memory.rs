//! In-process store used by tests and `STORAGE_BACKEND=memory`.
//!
//! One mutex guards all collections, so every trait operation is atomic.

use super::{
    CascadeSummary, Page, PaymentQuery, RecordStore, ReservationQuery, StoreError,
};
use crate::models::{Addon, Payment, Reservation, ReservationPatch};
use crate::numbering::Series;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Collections {
    reservations: HashMap<String, Reservation>,
    addons: Vec<Addon>,
    payments: Vec<Payment>,
    counters: HashMap<String, u64>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn search_term(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn paginate<T: Clone>(mut items: Vec<T>, skip: u64, limit: i64) -> Page<T> {
    let total = items.len() as u64;
    let start = (skip as usize).min(items.len());
    let end = if limit > 0 {
        (start + limit as usize).min(items.len())
    } else {
        items.len()
    };
    let items = items.drain(start..end).collect();
    Page { items, total }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn identifiers_desc(
        &self,
        series: Series,
        prefix: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = match series {
            Series::Invoice => inner
                .reservations
                .values()
                .map(|r| r.invoice_number.clone())
                .filter(|id| id.starts_with(prefix))
                .collect(),
            Series::Receipt => inner
                .payments
                .iter()
                .map(|p| p.receipt_number.clone())
                .filter(|id| id.starts_with(prefix))
                .collect(),
        };
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(paginate(ids, skip, limit).items)
    }

    async fn counter_value(&self, scope: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.lock().await.counters.get(scope).copied())
    }

    async fn raise_counter(&self, scope: &str, floor: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(scope.to_string()).or_insert(0);
        *counter = (*counter).max(floor);
        Ok(())
    }

    async fn increment_counter(&self, scope: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn release_counter(&self, scope: &str, seq: u64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.counters.get_mut(scope) {
            Some(counter) if *counter == seq && seq > 0 => {
                *counter -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
        down_payment: Option<&Payment>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.reservations.contains_key(&reservation.id)
            || inner
                .reservations
                .values()
                .any(|r| r.invoice_number == reservation.invoice_number)
        {
            return Err(StoreError::Duplicate(reservation.invoice_number.clone()));
        }
        if let Some(payment) = down_payment {
            if inner
                .payments
                .iter()
                .any(|p| p.receipt_number == payment.receipt_number)
            {
                return Err(StoreError::Duplicate(payment.receipt_number.clone()));
            }
            inner.payments.push(payment.clone());
        }
        inner
            .reservations
            .insert(reservation.id.clone(), reservation.clone());
        Ok(())
    }

    async fn find_reservation(&self, id: &str) -> Result<Option<Reservation>, StoreError> {
        Ok(self.inner.lock().await.reservations.get(id).cloned())
    }

    async fn update_reservation(
        &self,
        id: &str,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.reservations.get_mut(id).map(|reservation| {
            patch.apply(reservation);
            reservation.clone()
        }))
    }

    async fn delete_reservation(&self, id: &str) -> Result<Option<CascadeSummary>, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.reservations.remove(id).is_none() {
            return Ok(None);
        }
        let addons_before = inner.addons.len();
        inner.addons.retain(|a| a.reservation_id != id);
        let payments_before = inner.payments.len();
        inner.payments.retain(|p| p.reservation_id != id);

        Ok(Some(CascadeSummary {
            addons_deleted: (addons_before - inner.addons.len()) as u64,
            payments_deleted: (payments_before - inner.payments.len()) as u64,
        }))
    }

    async fn list_reservations(
        &self,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>, StoreError> {
        let inner = self.inner.lock().await;
        let term = search_term(&query.search);

        let mut matches: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| {
                term.as_deref().map_or(true, |t| {
                    contains_ci(&r.client_name, t)
                        || contains_ci(&r.invoice_number, t)
                        || r.event_name.as_deref().is_some_and(|e| contains_ci(e, t))
                })
            })
            .filter(|r| query.event_from.map_or(true, |from| r.event_date >= from))
            .filter(|r| query.event_to.map_or(true, |to| r.event_date <= to))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.invoice_number.cmp(&a.invoice_number))
        });
        Ok(paginate(matches, query.skip, query.limit))
    }

    async fn append_addon(&self, addon: &Addon) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let parent = inner
            .reservations
            .get_mut(&addon.reservation_id)
            .ok_or_else(|| StoreError::MissingParent(addon.reservation_id.clone()))?;
        parent.updated_at = addon.created_at;
        inner.addons.push(addon.clone());
        Ok(())
    }

    async fn append_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.reservations.contains_key(&payment.reservation_id) {
            return Err(StoreError::MissingParent(payment.reservation_id.clone()));
        }
        if inner
            .payments
            .iter()
            .any(|p| p.receipt_number == payment.receipt_number)
        {
            return Err(StoreError::Duplicate(payment.receipt_number.clone()));
        }
        if let Some(parent) = inner.reservations.get_mut(&payment.reservation_id) {
            parent.updated_at = payment.created_at;
        }
        inner.payments.push(payment.clone());
        Ok(())
    }

    async fn addons_for(&self, reservation_id: &str) -> Result<Vec<Addon>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .addons
            .iter()
            .filter(|a| a.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    async fn payments_for(&self, reservation_id: &str) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .iter()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Page<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        let term = search_term(&query.search);

        let mut matches: Vec<Payment> = inner
            .payments
            .iter()
            .filter(|p| {
                query
                    .reservation_id
                    .as_deref()
                    .map_or(true, |rid| p.reservation_id == rid)
            })
            .filter(|p| {
                term.as_deref().map_or(true, |t| {
                    contains_ci(&p.receipt_number, t)
                        || p.method.as_deref().is_some_and(|m| contains_ci(m, t))
                })
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.receipt_number.cmp(&a.receipt_number))
        });
        Ok(paginate(matches, query.skip, query.limit))
    }
}
