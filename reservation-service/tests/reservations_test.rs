//! Reservation CRUD over HTTP.

mod common;

use axum::http::StatusCode;
use common::{booking, booking_with_deposit, FaultyStore, TestApp};
use reservation_service::config::NumberingConfig;
use reservation_service::services::store::PaymentQuery;
use reservation_service::services::{MemoryStore, RecordStore};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn create_returns_normalized_record() {
    let app = TestApp::spawn();

    let created = app
        .create_reservation(json!({
            "clientName": "  Putri  ",
            "clientPhone": "0812-555-0101",
            "eventName": "Engagement",
            "eventDate": "2025-09-01T19:30:00+07:00",
            "venue": "Hall A",
            "pax": "120",
            "pricePerPax": "75000",
        }))
        .await;

    assert_eq!(created["clientName"], "Putri");
    assert_eq!(created["eventDate"], "2025-09-01");
    assert_eq!(created["pax"], 120);
    assert_eq!(created["subtotal"], 9_000_000.0);
    assert_eq!(created["downPayment"], 0.0);
    assert!(created["downPaymentReceipt"].is_null());
}

#[tokio::test]
async fn malformed_numbers_coerce_to_zero() {
    let app = TestApp::spawn();
    let mut body = booking("Rudi");
    body["pax"] = json!("a lot");
    body["pricePerPax"] = json!("");

    let created = app.create_reservation(body).await;

    assert_eq!(created["pax"], 0);
    assert_eq!(created["pricePerPax"], 0.0);
    assert_eq!(created["subtotal"], 0.0);
}

#[tokio::test]
async fn blank_client_name_is_a_validation_error() {
    let app = TestApp::spawn();
    let mut body = booking("x");
    body["clientName"] = json!("   ");

    let (status, error) = app.post("/reservations", body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["category"], "validation");
}

#[tokio::test]
async fn unparseable_event_date_is_a_validation_error() {
    let app = TestApp::spawn();
    let mut body = booking("Sari");
    body["eventDate"] = json!("sometime in august");

    let (status, _) = app.post("/reservations", body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn missing_event_date_is_rejected() {
    let app = TestApp::spawn();
    let (status, _) = app
        .post("/reservations", json!({ "clientName": "Tono" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let app = TestApp::spawn();
    let mut body = booking("Umi");
    body["nomorInvoice"] = json!("INV/1999/01-VE-0001");

    let (status, error) = app.post("/reservations", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["category"], "validation");
}

#[tokio::test]
async fn negative_deposit_is_rejected() {
    let app = TestApp::spawn();
    let (status, _) = app
        .post("/reservations", booking_with_deposit("Vina", -1.0))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let app = TestApp::spawn();

    let (status, error) = app.get("/reservations/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["category"], "not_found");

    let (status, _) = app
        .patch("/reservations/does-not-exist", json!({ "venue": "Hall B" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete("/reservations/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_updates_fields_and_keeps_the_invoice_number() {
    let app = TestApp::spawn();
    let created = app.create_reservation(booking("Wati")).await;
    let id = created["id"].as_str().unwrap();

    let (status, updated) = app
        .patch(
            &format!("/reservations/{}", id),
            json!({ "pax": 200, "eventDate": "2025-10-05", "notes": "Halal catering" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["nomorInvoice"], created["nomorInvoice"]);
    assert_eq!(updated["pax"], 200);
    assert_eq!(updated["subtotal"], 19_000_000.0);
    assert_eq!(updated["eventDate"], "2025-10-05");
    assert_eq!(updated["notes"], "Halal catering");
    assert_eq!(updated["clientName"], "Wati");
}

#[tokio::test]
async fn patch_cannot_touch_the_invoice_number() {
    let app = TestApp::spawn();
    let created = app.create_reservation(booking("Yanti")).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = app
        .patch(
            &format!("/reservations/{}", id),
            json!({ "nomorInvoice": "INV/2025/06-VE-9999" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detail_includes_children_and_totals() {
    let app = TestApp::spawn();
    let created = app
        .create_reservation(booking_with_deposit("Zaki", 4_000_000.0))
        .await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = app
        .post(
            &format!("/reservations/{}/addons", id),
            json!({ "name": "Decoration", "quantity": "2", "unitPrice": 750000 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    app.post(
        &format!("/reservations/{}/payments", id),
        json!({ "amount": "3000000", "method": "cash", "paidAt": "20/06/2025" }),
    )
    .await;

    let (status, detail) = app.get(&format!("/reservations/{}", id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["addons"].as_array().unwrap().len(), 1);
    assert_eq!(detail["addons"][0]["subtotal"], 1_500_000.0);
    assert_eq!(detail["payments"].as_array().unwrap().len(), 2);
    assert_eq!(detail["payments"][1]["paidAt"], "2025-06-20");
    assert_eq!(detail["grandTotal"], 15_750_000.0);
    assert_eq!(detail["totalPaid"], 7_000_000.0);
    assert_eq!(detail["balance"], 8_750_000.0);
}

#[tokio::test]
async fn delete_cascades_to_every_child() {
    let app = TestApp::spawn();
    let keep = app.create_reservation(booking_with_deposit("Keep", 100.0)).await;
    let created = app.create_reservation(booking_with_deposit("Drop", 100.0)).await;
    let id = created["id"].as_str().unwrap();

    for name in ["Sound", "Lighting"] {
        app.post(
            &format!("/reservations/{}/addons", id),
            json!({ "name": name, "unitPrice": 100 }),
        )
        .await;
    }
    for amount in [50, 75] {
        app.post(&format!("/reservations/{}/payments", id), json!({ "amount": amount }))
            .await;
    }

    let (status, summary) = app.delete(&format!("/reservations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["addonsDeleted"], 2);
    assert_eq!(summary["paymentsDeleted"], 3);

    let (status, _) = app.get(&format!("/reservations/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(app.store.addons_for(id).await.unwrap().is_empty());
    let orphans = app
        .store
        .list_payments(&PaymentQuery {
            reservation_id: Some(id.to_string()),
            limit: 100,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(orphans.total, 0);

    let keep_id = keep["id"].as_str().unwrap();
    assert_eq!(app.store.payments_for(keep_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_delete_leaves_the_reservation_whole() {
    let store = Arc::new(MemoryStore::new());
    let faulty: Arc<dyn RecordStore> = Arc::new(FaultyStore::failing_deletes(store.clone()));
    let app = TestApp::with_record_store(store, faulty, NumberingConfig::default());
    let created = app.create_reservation(booking_with_deposit("Stay", 100.0)).await;
    let id = created["id"].as_str().unwrap();

    for name in ["Sound", "Lighting"] {
        app.post(
            &format!("/reservations/{}/addons", id),
            json!({ "name": name, "unitPrice": 100 }),
        )
        .await;
    }
    for amount in [50, 75] {
        app.post(&format!("/reservations/{}/payments", id), json!({ "amount": amount }))
            .await;
    }

    let (status, _) = app.delete(&format!("/reservations/{}", id)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, detail) = app.get(&format!("/reservations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["addons"].as_array().unwrap().len(), 2);
    assert_eq!(detail["payments"].as_array().unwrap().len(), 3);
    assert_eq!(app.store.addons_for(id).await.unwrap().len(), 2);
    assert_eq!(app.store.payments_for(id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn children_cannot_be_attached_to_a_deleted_reservation() {
    let app = TestApp::spawn();
    let created = app.create_reservation(booking("Gone")).await;
    let id = created["id"].as_str().unwrap();
    app.delete(&format!("/reservations/{}", id)).await;

    let (status, _) = app
        .post(
            &format!("/reservations/{}/addons", id),
            json!({ "name": "Late add-on", "unitPrice": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.addons_for(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_searches_and_paginates_newest_first() {
    let app = TestApp::spawn();
    for (i, name) in ["Andi", "Bella", "Candra", "Andika", "Erna"].iter().enumerate() {
        app.clock.advance(chrono::Duration::minutes(1));
        let mut body = booking(name);
        body["eventDate"] = json!(format!("2025-08-{:02}", 10 + i));
        app.create_reservation(body).await;
    }

    let (status, page) = app.get("/reservations?page=1&page_size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["page_size"], 2);
    assert_eq!(page["items"][0]["clientName"], "Erna");
    assert_eq!(page["items"][1]["clientName"], "Andika");

    let (_, page) = app.get("/reservations?page=3&page_size=2").await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["clientName"], "Andi");

    let (_, found) = app.get("/reservations?search=andi").await;
    assert_eq!(found["total"], 2);

    let (_, found) = app.get("/reservations?search=VE-0003").await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["clientName"], "Candra");

    let (_, ranged) = app
        .get("/reservations?event_from=2025-08-11&event_to=2025-08-13")
        .await;
    assert_eq!(ranged["total"], 3);

    let (status, _) = app.get("/reservations?event_from=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
