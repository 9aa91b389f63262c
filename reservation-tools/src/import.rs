//! Idempotent import of legacy CSV exports into the reservation store.
//!
//! Reservations are upserted by invoice number and add-ons/payments by their
//! natural key, always with `$setOnInsert`, so a second run changes nothing.
//! Sequence counters are raised past every imported number afterwards.

use crate::legacy::{read_rows, split_identifier, AddonRow, PaymentRow, ReservationRow};
use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::{doc, to_document};
use mongodb::options::UpdateOptions;
use reservation_service::services::{MongoStore, RecordStore};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub reservations_inserted: u64,
    pub reservations_existing: u64,
    pub addons_inserted: u64,
    pub payments_inserted: u64,
    pub children_existing: u64,
    pub rejected: u64,
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reservations: {} new, {} existing; add-ons: {} new; payments: {} new; \
             children already present: {}; rejected rows: {}",
            self.reservations_inserted,
            self.reservations_existing,
            self.addons_inserted,
            self.payments_inserted,
            self.children_existing,
            self.rejected
        )
    }
}

/// Highest imported sequence per scope prefix.
#[derive(Debug, Default)]
struct ScopeHighWater(BTreeMap<String, u64>);

impl ScopeHighWater {
    fn observe(&mut self, identifier: &str) {
        if let Some((prefix, seq)) = split_identifier(identifier) {
            let entry = self.0.entry(prefix.to_string()).or_insert(0);
            *entry = (*entry).max(seq);
        }
    }
}

fn open_optional(dir: &Path, name: &str) -> Result<Option<File>> {
    let path = dir.join(name);
    if !path.exists() {
        tracing::warn!(file = %path.display(), "File not found, skipping");
        return Ok(None);
    }
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Some(file))
}

pub struct Importer<'a> {
    store: &'a MongoStore,
    summary: ImportSummary,
    invoice_ids: HashMap<String, String>,
    high_water: ScopeHighWater,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a MongoStore) -> Self {
        Self {
            store,
            summary: ImportSummary::default(),
            invoice_ids: HashMap::new(),
            high_water: ScopeHighWater::default(),
        }
    }

    /// Import `reservations.csv`, `addons.csv` and `payments.csv` from `dir`.
    pub async fn run(mut self, dir: &Path) -> Result<ImportSummary> {
        let reservations_path = dir.join("reservations.csv");
        let file = File::open(&reservations_path)
            .with_context(|| format!("opening {}", reservations_path.display()))?;
        self.import_reservations(read_rows(file)?).await?;

        if let Some(file) = open_optional(dir, "addons.csv")? {
            self.import_addons(read_rows(file)?).await?;
        }
        if let Some(file) = open_optional(dir, "payments.csv")? {
            self.import_payments(read_rows(file)?).await?;
        }

        self.raise_counters().await?;
        Ok(self.summary)
    }

    async fn import_reservations(&mut self, rows: Vec<(u64, ReservationRow)>) -> Result<()> {
        let total = rows.len();
        let upsert = UpdateOptions::builder().upsert(true).build();

        for (done, (line, row)) in rows.into_iter().enumerate() {
            let reservation = match row.into_reservation(Utc::now()) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(line, error = %e, "Rejected reservation row");
                    self.summary.rejected += 1;
                    continue;
                }
            };

            let result = self
                .store
                .reservations()
                .update_one(
                    doc! { "nomorInvoice": &reservation.invoice_number },
                    doc! { "$setOnInsert": to_document(&reservation)? },
                    upsert.clone(),
                )
                .await
                .with_context(|| format!("upserting {}", reservation.invoice_number))?;

            let id = if result.upserted_id.is_some() {
                self.summary.reservations_inserted += 1;
                reservation.id.clone()
            } else {
                self.summary.reservations_existing += 1;
                self.lookup_id(&reservation.invoice_number)
                    .await?
                    .unwrap_or_else(|| reservation.id.clone())
            };
            self.high_water.observe(&reservation.invoice_number);
            self.invoice_ids.insert(reservation.invoice_number, id);

            if (done + 1) % 100 == 0 {
                tracing::info!(done = done + 1, total, "Importing reservations");
            }
        }
        Ok(())
    }

    async fn lookup_id(&self, invoice_number: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .reservations()
            .find_one(doc! { "nomorInvoice": invoice_number }, None)
            .await?
            .map(|r| r.id))
    }

    async fn parent_id(&mut self, invoice_number: &str) -> Result<Option<String>> {
        let invoice_number = invoice_number.trim();
        if let Some(id) = self.invoice_ids.get(invoice_number) {
            return Ok(Some(id.clone()));
        }
        let found = self.lookup_id(invoice_number).await?;
        if let Some(id) = &found {
            self.invoice_ids.insert(invoice_number.to_string(), id.clone());
        }
        Ok(found)
    }

    async fn import_addons(&mut self, rows: Vec<(u64, AddonRow)>) -> Result<()> {
        let upsert = UpdateOptions::builder().upsert(true).build();
        for (line, row) in rows {
            let Some(parent) = self.parent_id(&row.nomor_invoice).await? else {
                tracing::warn!(line, invoice = %row.nomor_invoice, "Add-on for unknown reservation");
                self.summary.rejected += 1;
                continue;
            };
            let addon = match row.into_addon(&parent, line, Utc::now()) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(line, error = %e, "Rejected add-on row");
                    self.summary.rejected += 1;
                    continue;
                }
            };

            let result = self
                .store
                .addons()
                .update_one(
                    doc! { "_id": &addon.id },
                    doc! { "$setOnInsert": to_document(&addon)? },
                    upsert.clone(),
                )
                .await?;
            if result.upserted_id.is_some() {
                self.summary.addons_inserted += 1;
            } else {
                self.summary.children_existing += 1;
            }
        }
        Ok(())
    }

    async fn import_payments(&mut self, rows: Vec<(u64, PaymentRow)>) -> Result<()> {
        let upsert = UpdateOptions::builder().upsert(true).build();
        for (line, row) in rows {
            let Some(parent) = self.parent_id(&row.nomor_invoice).await? else {
                tracing::warn!(line, invoice = %row.nomor_invoice, "Payment for unknown reservation");
                self.summary.rejected += 1;
                continue;
            };
            let payment = match row.into_payment(&parent, Utc::now()) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(line, error = %e, "Rejected payment row");
                    self.summary.rejected += 1;
                    continue;
                }
            };

            let result = self
                .store
                .payments()
                .update_one(
                    doc! { "nomorNota": &payment.receipt_number },
                    doc! { "$setOnInsert": to_document(&payment)? },
                    upsert.clone(),
                )
                .await
                .with_context(|| format!("upserting {}", payment.receipt_number))?;
            self.high_water.observe(&payment.receipt_number);
            if result.upserted_id.is_some() {
                self.summary.payments_inserted += 1;
            } else {
                self.summary.children_existing += 1;
            }
        }
        Ok(())
    }

    async fn raise_counters(&self) -> Result<()> {
        for (scope, seq) in &self.high_water.0 {
            self.store
                .raise_counter(scope, *seq)
                .await
                .with_context(|| format!("raising counter {}", scope))?;
            tracing::debug!(scope = %scope, floor = seq, "Counter raised");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_keeps_the_maximum_per_scope() {
        let mut hw = ScopeHighWater::default();
        for id in [
            "INV/2024/03-VE-0004",
            "INV/2024/03-VE-0011",
            "INV/2024/03-VE-0002",
            "INV/2024/04-VE-0001",
            "INV/2024/04-VE-BAD",
        ] {
            hw.observe(id);
        }
        assert_eq!(hw.0.get("INV/2024/03-VE-"), Some(&11));
        assert_eq!(hw.0.get("INV/2024/04-VE-"), Some(&1));
        assert_eq!(hw.0.len(), 2);
    }
}
