//! Legacy spreadsheet rows and their conversion into reservation records.
//!
//! Exports are loosely typed: amounts come as `Rp 1.250.000`, dates as
//! `YYYY-MM-DD` or `DD/MM/YYYY`, and any column may be blank.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use reservation_service::models::{Addon, Payment, PaymentKind, Reservation};
use reservation_service::numbering::parse_sequence;
use reservation_service::utils::dates::parse_calendar_date;
use reservation_service::utils::non_blank;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

/// Namespace for record ids derived from legacy keys, so a re-run produces
/// the same ids.
pub const LEGACY_NAMESPACE: Uuid = Uuid::from_u128(0x4f2a_8c1e_93d7_4b60_a5e2_7d19_c3b8_0f64);

/// Parse an amount such as `Rp 1.250.000`, `1250000` or `Rp 1.250.000,50`.
///
/// Dots are thousands separators; a comma followed by one or two digits is
/// the decimal part. Blank or digit-free input is zero.
pub fn parse_amount(raw: &str) -> f64 {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-');

    let (whole, fraction) = match trimmed.rsplit_once(',') {
        Some((whole, fraction))
            if (1..=2).contains(&fraction.trim().len())
                && fraction.trim().bytes().all(|b| b.is_ascii_digit()) =>
        {
            (whole, fraction.trim())
        }
        _ => (trimmed, ""),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0.0;
    }
    let value: f64 = if fraction.is_empty() {
        digits.parse().unwrap_or(0.0)
    } else {
        format!("{}.{}", digits, fraction).parse().unwrap_or(0.0)
    };
    if negative {
        -value
    } else {
        value
    }
}

/// Whole-number column (pax, quantity), read like an amount and truncated.
pub fn parse_count(raw: &str) -> i64 {
    parse_amount(raw).trunc() as i64
}

fn amount(raw: &Option<String>) -> f64 {
    raw.as_deref().map_or(0.0, parse_amount)
}

/// Scope prefix and sequence of a well-formed identifier.
pub fn split_identifier(identifier: &str) -> Option<(&str, u64)> {
    let cut = identifier.rfind('-')? + 1;
    let prefix = &identifier[..cut];
    parse_sequence(prefix, identifier).map(|seq| (prefix, seq))
}

pub fn read_rows<T, R>(reader: R) -> Result<Vec<(u64, T)>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, record) in csv_reader.deserialize::<T>().enumerate() {
        // Line 1 is the header.
        let line = index as u64 + 2;
        match record {
            Ok(row) => rows.push((line, row)),
            Err(e) => tracing::warn!(line, error = %e, "Skipping unreadable row"),
        }
    }
    Ok(rows)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRow {
    #[serde(alias = "nomorInvoice", alias = "invoice")]
    pub nomor_invoice: String,
    #[serde(default, alias = "clientName")]
    pub client_name: Option<String>,
    #[serde(default, alias = "clientPhone")]
    pub client_phone: Option<String>,
    #[serde(default, alias = "eventName")]
    pub event_name: Option<String>,
    #[serde(default, alias = "eventDate")]
    pub event_date: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub pax: Option<String>,
    #[serde(default, alias = "pricePerPax")]
    pub price_per_pax: Option<String>,
    #[serde(default)]
    pub subtotal: Option<String>,
    #[serde(default, alias = "downPayment")]
    pub down_payment: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

impl ReservationRow {
    pub fn into_reservation(self, now: DateTime<Utc>) -> Result<Reservation> {
        let invoice = self.nomor_invoice.trim().to_string();
        if invoice.is_empty() {
            bail!("missing invoice number");
        }
        let client_name = non_blank(self.client_name)
            .ok_or_else(|| anyhow!("{}: missing client name", invoice))?;
        let event_date = self
            .event_date
            .as_deref()
            .and_then(parse_calendar_date)
            .ok_or_else(|| anyhow!("{}: missing or unreadable event date", invoice))?;
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_calendar_date)
            .unwrap_or(now);

        let mut reservation = Reservation::new(invoice.clone(), created_at);
        reservation.id = Uuid::new_v5(&LEGACY_NAMESPACE, invoice.as_bytes()).to_string();
        reservation.client_name = client_name;
        reservation.client_phone = non_blank(self.client_phone);
        reservation.event_name = non_blank(self.event_name);
        reservation.event_date = event_date;
        reservation.venue = non_blank(self.venue);
        reservation.pax = self.pax.as_deref().map_or(0, parse_count);
        reservation.price_per_pax = amount(&self.price_per_pax);
        reservation.subtotal = match non_blank(self.subtotal) {
            Some(raw) => parse_amount(&raw),
            None => reservation.pax as f64 * reservation.price_per_pax,
        };
        reservation.down_payment = amount(&self.down_payment);
        reservation.notes = non_blank(self.notes);
        reservation.updated_at = now;
        Ok(reservation)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddonRow {
    #[serde(alias = "nomorInvoice", alias = "invoice")]
    pub nomor_invoice: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "qty")]
    pub quantity: Option<String>,
    #[serde(default, alias = "unitPrice", alias = "price")]
    pub unit_price: Option<String>,
    #[serde(default)]
    pub subtotal: Option<String>,
}

impl AddonRow {
    /// `line` is the row's position in its file; together with the invoice
    /// number it keys the add-on, since add-ons have no number of their own.
    pub fn into_addon(self, reservation_id: &str, line: u64, now: DateTime<Utc>) -> Result<Addon> {
        let invoice = self.nomor_invoice.trim();
        let name = non_blank(self.name).ok_or_else(|| anyhow!("{}: add-on without a name", invoice))?;
        let quantity = self.quantity.as_deref().map_or(1, parse_count);
        let mut addon = Addon::new(
            reservation_id.to_string(),
            name,
            quantity,
            amount(&self.unit_price),
            non_blank(self.subtotal).map(|raw| parse_amount(&raw)),
            now,
        );
        addon.id = Uuid::new_v5(
            &LEGACY_NAMESPACE,
            format!("addon:{}:{}", invoice, line).as_bytes(),
        )
        .to_string();
        Ok(addon)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRow {
    #[serde(alias = "nomorInvoice", alias = "invoice")]
    pub nomor_invoice: String,
    #[serde(default, alias = "nomorNota", alias = "receipt")]
    pub nomor_nota: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "paidAt", alias = "date")]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn payment_kind(raw: Option<&str>) -> PaymentKind {
    match raw.map(|k| k.trim().to_lowercase()).as_deref() {
        Some("dp" | "down_payment" | "downpayment" | "down payment" | "deposit") => {
            PaymentKind::DownPayment
        }
        _ => PaymentKind::Installment,
    }
}

impl PaymentRow {
    pub fn into_payment(self, reservation_id: &str, now: DateTime<Utc>) -> Result<Payment> {
        let invoice = self.nomor_invoice.trim();
        let receipt = non_blank(self.nomor_nota)
            .ok_or_else(|| anyhow!("{}: payment without a receipt number", invoice))?;
        let paid_at = self
            .paid_at
            .as_deref()
            .and_then(parse_calendar_date)
            .ok_or_else(|| anyhow!("{}: missing or unreadable payment date", receipt))?;

        let mut payment = Payment::new(
            reservation_id.to_string(),
            receipt.clone(),
            payment_kind(self.kind.as_deref()),
            amount(&self.amount),
            non_blank(self.method),
            paid_at,
            non_blank(self.notes),
            now,
        );
        payment.id = Uuid::new_v5(&LEGACY_NAMESPACE, format!("payment:{}", receipt).as_bytes())
            .to_string();
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rupiah_strings_reduce_to_digits() {
        assert_eq!(parse_amount("Rp 1.250.000"), 1_250_000.0);
        assert_eq!(parse_amount("Rp1.250.000,50"), 1_250_000.5);
        assert_eq!(parse_amount("750000"), 750_000.0);
        assert_eq!(parse_amount("-Rp 20.000"), -20_000.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("n/a"), 0.0);
        assert_eq!(parse_count("1.200 orang"), 1200);
    }

    #[test]
    fn identifiers_split_into_scope_and_sequence() {
        assert_eq!(
            split_identifier("INV/2024/03-VE-0042"),
            Some(("INV/2024/03-VE-", 42))
        );
        assert_eq!(split_identifier("NOTA/2024/03-SDP-00X1"), None);
        assert_eq!(split_identifier("legacy"), None);
    }

    #[test]
    fn reservation_rows_parse_from_csv() {
        let data = "\
nomor_invoice,client_name,event_name,event_date,pax,price_per_pax,down_payment
INV/2024/03-VE-0001,Budi Santoso,Akad Nikah,14/03/2024,\"1.200\",Rp 85.000,Rp 10.000.000
INV/2024/03-VE-0002,,Reuni,2024-03-20,50,Rp 50.000,
";
        let rows: Vec<(u64, ReservationRow)> = read_rows(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let (line, first) = rows[0].clone();
        assert_eq!(line, 2);
        let reservation = first.into_reservation(now()).unwrap();
        assert_eq!(reservation.invoice_number, "INV/2024/03-VE-0001");
        assert_eq!(reservation.event_date.to_rfc3339(), "2024-03-14T00:00:00+00:00");
        assert_eq!(reservation.pax, 1200);
        assert_eq!(reservation.subtotal, 102_000_000.0);
        assert_eq!(reservation.down_payment, 10_000_000.0);

        // Missing client name.
        assert!(rows[1].1.clone().into_reservation(now()).is_err());
    }

    #[test]
    fn legacy_ids_are_stable_across_runs() {
        let row = ReservationRow {
            nomor_invoice: "INV/2024/03-VE-0007".to_string(),
            client_name: Some("Sinta".to_string()),
            client_phone: None,
            event_name: None,
            event_date: Some("2024-04-01".to_string()),
            venue: None,
            pax: None,
            price_per_pax: None,
            subtotal: None,
            down_payment: None,
            notes: None,
            created_at: None,
        };
        let a = row.clone().into_reservation(now()).unwrap();
        let b = row.into_reservation(now()).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn payment_rows_need_a_receipt_number() {
        let row = PaymentRow {
            nomor_invoice: "INV/2024/03-VE-0001".to_string(),
            nomor_nota: Some("NOTA/2024/03-SDP-0003".to_string()),
            amount: Some("Rp 2.500.000".to_string()),
            method: Some("Transfer BCA".to_string()),
            paid_at: Some("02/03/2024".to_string()),
            kind: Some("DP".to_string()),
            notes: None,
        };
        let payment = row.clone().into_payment("res-1", now()).unwrap();
        assert_eq!(payment.kind, PaymentKind::DownPayment);
        assert_eq!(payment.amount, 2_500_000.0);

        let missing = PaymentRow {
            nomor_nota: None,
            ..row
        };
        assert!(missing.into_payment("res-1", now()).is_err());
    }
}
