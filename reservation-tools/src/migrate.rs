//! One-time move of `addons` / `payments` arrays embedded in reservation
//! documents into their own collections.
//!
//! Children are upserted with `$setOnInsert` before the arrays are unset,
//! so an interrupted run is simply repeated.

use crate::legacy::{parse_amount, payment_kind, LEGACY_NAMESPACE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, to_document, Bson, Document};
use mongodb::options::UpdateOptions;
use mongodb::ClientSession;
use reservation_service::models::{Addon, Payment};
use reservation_service::services::MongoStore;
use reservation_service::utils::dates::{normalize_instant, parse_calendar_date};
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub reservations_migrated: u64,
    pub reservations_skipped: u64,
    pub addons_moved: u64,
    pub payments_moved: u64,
}

impl std::fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reservations migrated: {}, skipped: {}; add-ons moved: {}; payments moved: {}",
            self.reservations_migrated,
            self.reservations_skipped,
            self.addons_moved,
            self.payments_moved
        )
    }
}

/// Children found inside one reservation document.
#[derive(Debug, Default)]
pub struct EmbeddedChildren {
    pub addons: Vec<Addon>,
    pub payments: Vec<Payment>,
    /// Entries that cannot be moved; the reservation is left untouched.
    pub problems: Vec<String>,
}

fn number(value: Option<&Bson>) -> f64 {
    match value {
        Some(Bson::Double(v)) if v.is_finite() => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::String(s)) => s.trim().parse().unwrap_or_else(|_| parse_amount(s)),
        _ => 0.0,
    }
}

fn text(value: Option<&Bson>) -> Option<String> {
    match value {
        Some(Bson::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn date(value: Option<&Bson>) -> Option<DateTime<Utc>> {
    match value {
        Some(Bson::DateTime(dt)) => Some(normalize_instant(dt.to_chrono())),
        Some(Bson::String(s)) => parse_calendar_date(s),
        _ => None,
    }
}

fn first<'a>(entry: &'a Document, keys: &[&str]) -> Option<&'a Bson> {
    keys.iter().find_map(|k| entry.get(*k))
}

/// Convert the embedded arrays of `reservation` into linked records.
pub fn extract_embedded(
    reservation_id: &str,
    reservation: &Document,
    now: DateTime<Utc>,
) -> EmbeddedChildren {
    let mut children = EmbeddedChildren::default();

    if let Ok(addons) = reservation.get_array("addons") {
        for (index, entry) in addons.iter().enumerate() {
            let Some(entry) = entry.as_document() else {
                children.problems.push(format!("addons[{}] is not a document", index));
                continue;
            };
            let Some(name) = text(first(entry, &["name", "nama"])) else {
                children.problems.push(format!("addons[{}] has no name", index));
                continue;
            };
            let subtotal = first(entry, &["subtotal"]).map(|v| number(Some(v)));
            let quantity = match first(entry, &["quantity", "qty"]) {
                Some(v) => number(Some(v)).trunc() as i64,
                None => 1,
            };
            let mut addon = Addon::new(
                reservation_id.to_string(),
                name,
                quantity,
                number(first(entry, &["unitPrice", "price", "harga"])),
                subtotal,
                now,
            );
            addon.id = Uuid::new_v5(
                &LEGACY_NAMESPACE,
                format!("embedded-addon:{}:{}", reservation_id, index).as_bytes(),
            )
            .to_string();
            children.addons.push(addon);
        }
    }

    if let Ok(payments) = reservation.get_array("payments") {
        for (index, entry) in payments.iter().enumerate() {
            let Some(entry) = entry.as_document() else {
                children.problems.push(format!("payments[{}] is not a document", index));
                continue;
            };
            let Some(receipt) = text(first(entry, &["nomorNota", "receiptNumber"])) else {
                children.problems.push(format!("payments[{}] has no receipt number", index));
                continue;
            };
            let paid_at = date(first(entry, &["paidAt", "date", "tanggal"]))
                .unwrap_or_else(|| normalize_instant(now));
            let kind = match first(entry, &["kind", "type"]) {
                Some(Bson::String(s)) => payment_kind(Some(s.as_str())),
                _ => payment_kind(None),
            };
            let mut payment = Payment::new(
                reservation_id.to_string(),
                receipt.clone(),
                kind,
                number(first(entry, &["amount", "nominal"])),
                text(first(entry, &["method"])),
                paid_at,
                text(first(entry, &["notes"])),
                now,
            );
            payment.id = Uuid::new_v5(&LEGACY_NAMESPACE, format!("payment:{}", receipt).as_bytes())
                .to_string();
            children.payments.push(payment);
        }
    }

    children
}

pub struct Migrator<'a> {
    store: &'a MongoStore,
    use_transactions: bool,
}

impl<'a> Migrator<'a> {
    pub fn new(store: &'a MongoStore, use_transactions: bool) -> Self {
        Self {
            store,
            use_transactions,
        }
    }

    pub async fn run(&self) -> Result<MigrationSummary> {
        let raw = self.store.database().collection::<Document>("reservations");
        let filter = doc! { "$or": [
            { "addons": { "$exists": true } },
            { "payments": { "$exists": true } }
        ] };
        let candidates: Vec<Document> = raw.find(filter, None).await?.try_collect().await?;
        tracing::info!(count = candidates.len(), "Reservations with embedded children");

        let mut summary = MigrationSummary::default();
        for reservation in candidates {
            let id = match reservation.get("_id") {
                Some(Bson::String(id)) => id.clone(),
                other => {
                    tracing::warn!(id = ?other, "Skipping reservation without a string id");
                    summary.reservations_skipped += 1;
                    continue;
                }
            };

            let children = extract_embedded(&id, &reservation, Utc::now());
            if !children.problems.is_empty() {
                tracing::warn!(
                    reservation_id = %id,
                    problems = ?children.problems,
                    "Leaving reservation untouched"
                );
                summary.reservations_skipped += 1;
                continue;
            }

            let (addons, payments) = if self.use_transactions {
                self.move_in_transaction(&id, &children).await
            } else {
                self.move_children(&id, &children, None).await
            }
            .with_context(|| format!("migrating reservation {}", id))?;

            summary.reservations_migrated += 1;
            summary.addons_moved += addons;
            summary.payments_moved += payments;
        }
        Ok(summary)
    }

    async fn move_in_transaction(&self, id: &str, children: &EmbeddedChildren) -> Result<(u64, u64)> {
        let mut session = self.store.client().start_session(None).await?;
        session.start_transaction(None).await?;
        match self.move_children(id, children, Some(&mut session)).await {
            Ok(moved) => {
                session.commit_transaction().await?;
                Ok(moved)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    /// Upsert every child, then unset the arrays. Returns how many add-ons
    /// and payments were newly inserted.
    async fn move_children(
        &self,
        id: &str,
        children: &EmbeddedChildren,
        mut session: Option<&mut ClientSession>,
    ) -> Result<(u64, u64)> {
        let upsert = UpdateOptions::builder().upsert(true).build();
        let (mut addons_moved, mut payments_moved) = (0, 0);

        for addon in &children.addons {
            let filter = doc! { "_id": &addon.id };
            let update = doc! { "$setOnInsert": to_document(addon)? };
            let result = match session.as_deref_mut() {
                Some(s) => {
                    self.store
                        .addons()
                        .update_one_with_session(filter, update, upsert.clone(), s)
                        .await?
                }
                None => self.store.addons().update_one(filter, update, upsert.clone()).await?,
            };
            if result.upserted_id.is_some() {
                addons_moved += 1;
            }
        }

        for payment in &children.payments {
            let filter = doc! { "nomorNota": &payment.receipt_number };
            let update = doc! { "$setOnInsert": to_document(payment)? };
            let result = match session.as_deref_mut() {
                Some(s) => {
                    self.store
                        .payments()
                        .update_one_with_session(filter, update, upsert.clone(), s)
                        .await?
                }
                None => self.store.payments().update_one(filter, update, upsert.clone()).await?,
            };
            if result.upserted_id.is_some() {
                payments_moved += 1;
            }
        }

        let raw = self.store.database().collection::<Document>("reservations");
        let filter = doc! { "_id": id };
        let unset = doc! { "$unset": { "addons": "", "payments": "" } };
        match session {
            Some(s) => {
                raw.update_one_with_session(filter, unset, None, s).await?;
            }
            None => {
                raw.update_one(filter, unset, None).await?;
            }
        }

        tracing::info!(
            reservation_id = %id,
            addons = addons_moved,
            payments = payments_moved,
            "Embedded children moved"
        );
        Ok((addons_moved, payments_moved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reservation_service::models::PaymentKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn embedded_arrays_become_linked_records() {
        let reservation = doc! {
            "_id": "res-1",
            "nomorInvoice": "INV/2024/02-VE-0003",
            "addons": [
                { "name": "Tenda", "qty": 2, "price": "Rp 500.000" },
                { "name": "Kursi", "quantity": 100, "unitPrice": 5000.0, "subtotal": 450000 }
            ],
            "payments": [
                { "nomorNota": "NOTA/2024/02-SDP-0001", "amount": 1000000, "kind": "dp",
                  "paidAt": "2024-02-03" }
            ],
        };

        let children = extract_embedded("res-1", &reservation, now());

        assert!(children.problems.is_empty());
        assert_eq!(children.addons.len(), 2);
        assert_eq!(children.addons[0].subtotal, 1_000_000.0);
        assert_eq!(children.addons[1].subtotal, 450_000.0);
        assert_eq!(children.payments[0].kind, PaymentKind::DownPayment);
        assert_eq!(children.payments[0].paid_at.to_rfc3339(), "2024-02-03T00:00:00+00:00");
        assert!(children.payments.iter().all(|p| p.reservation_id == "res-1"));
    }

    #[test]
    fn ids_are_deterministic_so_reruns_upsert_the_same_records() {
        let reservation = doc! { "_id": "res-2", "addons": [ { "name": "Sound" } ] };
        let a = extract_embedded("res-2", &reservation, now());
        let b = extract_embedded("res-2", &reservation, now());
        assert_eq!(a.addons[0].id, b.addons[0].id);
        assert_eq!(a.addons[0].quantity, 1);
    }

    #[test]
    fn payment_without_receipt_is_a_problem() {
        let reservation = doc! { "_id": "res-3", "payments": [ { "amount": 5 } ] };
        let children = extract_embedded("res-3", &reservation, now());
        assert!(children.payments.is_empty());
        assert_eq!(children.problems.len(), 1);
    }
}
