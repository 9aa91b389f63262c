//! MongoStore without transactions, against a live server. Runs only when
//! TEST_MONGODB_URI points at one.

use chrono::{TimeZone, Utc};
use mongodb::bson::doc;
use reservation_service::models::{Addon, Payment, PaymentKind, Reservation};
use reservation_service::services::{MongoStore, RecordStore, StoreError};
use std::sync::Arc;

async fn unsessioned_store() -> Option<Arc<MongoStore>> {
    let uri = std::env::var("TEST_MONGODB_URI").ok()?;
    let db_name = format!("reservation_test_{}", uuid::Uuid::new_v4().simple());
    let store = MongoStore::connect(&uri, &db_name, false).await.unwrap();
    store.init_indexes().await.unwrap();
    Some(Arc::new(store))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn appends_racing_a_delete_leave_no_orphans() {
    let Some(store) = unsessioned_store().await else {
        return;
    };
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let parent = Reservation::new("INV/2025/06-VE-0001".to_string(), now);
    store.insert_reservation(&parent, None).await.unwrap();

    let mut appends = Vec::new();
    for i in 0..20 {
        let store = Arc::clone(&store);
        let id = parent.id.clone();
        appends.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let addon = Addon::new(id, format!("Item {}", i), 1, 10.0, None, now);
                store.append_addon(&addon).await
            } else {
                let payment = Payment::new(
                    id,
                    format!("NOTA/2025/06-SDP-{:04}", i),
                    PaymentKind::Installment,
                    10.0,
                    None,
                    now,
                    None,
                    now,
                );
                store.append_payment(&payment).await
            }
        }));
    }
    let deleter = {
        let store = Arc::clone(&store);
        let id = parent.id.clone();
        tokio::spawn(async move { store.delete_reservation(&id).await })
    };

    for append in appends {
        match append.await.unwrap() {
            Ok(()) | Err(StoreError::MissingParent(_)) => {}
            Err(e) => panic!("unexpected append failure: {}", e),
        }
    }
    assert!(deleter.await.unwrap().unwrap().is_some());

    assert!(store.find_reservation(&parent.id).await.unwrap().is_none());
    assert!(store.addons_for(&parent.id).await.unwrap().is_empty());
    assert!(store.payments_for(&parent.id).await.unwrap().is_empty());

    store.database().drop(None).await.unwrap();
}

#[tokio::test]
async fn reservation_marked_for_deletion_takes_no_children() {
    let Some(store) = unsessioned_store().await else {
        return;
    };
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let parent = Reservation::new("INV/2025/06-VE-0001".to_string(), now);
    store.insert_reservation(&parent, None).await.unwrap();
    store
        .reservations()
        .update_one(doc! { "_id": &parent.id }, doc! { "$set": { "deleting": true } }, None)
        .await
        .unwrap();

    let addon = Addon::new(parent.id.clone(), "Sound".to_string(), 1, 10.0, None, now);
    let err = store.append_addon(&addon).await.unwrap_err();

    assert!(matches!(err, StoreError::MissingParent(_)));
    assert!(store.addons_for(&parent.id).await.unwrap().is_empty());

    store.database().drop(None).await.unwrap();
}
