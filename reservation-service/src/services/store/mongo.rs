//! MongoDB-backed record store.
//!
//! Collections: `reservations`, `addons`, `payments`, `counters`. Unique
//! indexes on `nomorInvoice` and `nomorNota` turn an allocation race into a
//! detectable duplicate-key error. Multi-document units run in a
//! transaction when `use_transactions` is set (requires a replica set).
//! Without transactions a cascade delete first marks the parent
//! `deleting`, and an append re-reads its parent after inserting the child
//! and removes the child if the parent is gone or marked.

use super::{
    CascadeSummary, Page, PaymentQuery, RecordStore, ReservationQuery, StoreError,
};
use crate::models::{Addon, Payment, Reservation, ReservationPatch, SequenceCounter};
use crate::numbering::Series;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::Serialize;

const DUPLICATE_KEY: i32 = 11000;

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(e) => e
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|w| w.code == DUPLICATE_KEY)),
        _ => false,
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return StoreError::Duplicate(err.to_string());
        }
        let transient = err.contains_label(TRANSIENT_TRANSACTION_ERROR)
            || matches!(
                err.kind.as_ref(),
                ErrorKind::Io(_)
                    | ErrorKind::ConnectionPoolCleared { .. }
                    | ErrorKind::ServerSelection { .. }
            );
        if transient {
            StoreError::Transient(anyhow::Error::new(err))
        } else {
            StoreError::Backend(anyhow::Error::new(err))
        }
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

fn series_location(series: Series) -> (&'static str, &'static str) {
    match series {
        Series::Invoice => ("reservations", "nomorInvoice"),
        Series::Receipt => ("payments", "nomorNota"),
    }
}

fn search_regex(raw: &Option<String>) -> Option<Document> {
    raw.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| doc! { "$regex": regex::escape(t), "$options": "i" })
}

/// A reservation that exists and is not being deleted.
fn live_parent(reservation_id: &str) -> Document {
    doc! { "_id": reservation_id, "deleting": { "$ne": true } }
}

fn bson_seq(value: i64) -> u64 {
    value.max(0) as u64
}

fn patch_to_set(patch: &ReservationPatch) -> Document {
    let mut set = doc! { "updatedAt": BsonDateTime::from_chrono(patch.updated_at) };
    if let Some(v) = &patch.client_name {
        set.insert("clientName", v.as_str());
    }
    if let Some(v) = &patch.client_phone {
        set.insert("clientPhone", v.as_str());
    }
    if let Some(v) = &patch.event_name {
        set.insert("eventName", v.as_str());
    }
    if let Some(v) = patch.event_date {
        set.insert("eventDate", BsonDateTime::from_chrono(v));
    }
    if let Some(v) = &patch.venue {
        set.insert("venue", v.as_str());
    }
    if let Some(v) = patch.pax {
        set.insert("pax", v);
    }
    if let Some(v) = patch.price_per_pax {
        set.insert("pricePerPax", v);
    }
    if let Some(v) = patch.subtotal {
        set.insert("subtotal", v);
    }
    if let Some(v) = &patch.notes {
        set.insert("notes", v.as_str());
    }
    set
}

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    use_transactions: bool,
}

impl MongoStore {
    pub async fn connect(
        uri: &str,
        database: &str,
        use_transactions: bool,
    ) -> Result<Self, StoreError> {
        tracing::info!(database = %database, use_transactions, "Connecting to MongoDB");
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some("reservation-service".to_string());
        let client = Client::with_options(client_options)?;
        let db = client.database(database);
        Ok(Self::from_parts(client, db, use_transactions))
    }

    pub fn from_parts(client: Client, db: Database, use_transactions: bool) -> Self {
        Self {
            client,
            db,
            use_transactions,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn reservations(&self) -> Collection<Reservation> {
        self.db.collection("reservations")
    }

    pub fn addons(&self) -> Collection<Addon> {
        self.db.collection("addons")
    }

    pub fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    fn counters(&self) -> Collection<SequenceCounter> {
        self.db.collection("counters")
    }

    pub async fn init_indexes(&self) -> Result<(), StoreError> {
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };
        let named = |name: &str| IndexOptions::builder().name(name.to_string()).build();

        self.reservations()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "nomorInvoice": 1 })
                        .options(unique("invoice_number_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "createdAt": -1 })
                        .options(named("created_at_desc"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "eventDate": 1 })
                        .options(named("event_date_lookup"))
                        .build(),
                ],
                None,
            )
            .await?;

        self.payments()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "nomorNota": 1 })
                        .options(unique("receipt_number_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "reservationId": 1, "createdAt": 1 })
                        .options(named("payment_parent_lookup"))
                        .build(),
                ],
                None,
            )
            .await?;

        self.addons()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "reservationId": 1, "createdAt": 1 })
                    .options(named("addon_parent_lookup"))
                    .build(),
                None,
            )
            .await?;

        tracing::info!("Reservation store indexes initialized");
        Ok(())
    }

    async fn begin(&self) -> Result<ClientSession, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    async fn abort(session: &mut ClientSession, err: mongodb::error::Error) -> StoreError {
        if let Err(abort_err) = session.abort_transaction().await {
            tracing::warn!(error = %abort_err, "Failed to abort transaction");
        }
        StoreError::from(err)
    }

    /// Run `update` as an upsert on a counter, retrying once if a concurrent
    /// upsert of the same scope wins the insert.
    async fn upsert_counter(
        &self,
        scope: &str,
        update: Document,
    ) -> Result<Option<SequenceCounter>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .counters()
                .find_one_and_update(doc! { "_id": scope }, update.clone(), options.clone())
                .await
            {
                Ok(counter) => return Ok(counter),
                Err(e) if is_duplicate_key(&e) && attempts < 2 => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn touch_parent(
        &self,
        session: Option<&mut ClientSession>,
        reservation_id: &str,
        at: chrono::DateTime<Utc>,
    ) -> Result<bool, mongodb::error::Error> {
        let filter = live_parent(reservation_id);
        let update = doc! { "$set": { "updatedAt": BsonDateTime::from_chrono(at) } };
        let result = match session {
            Some(session) => {
                self.reservations()
                    .update_one_with_session(filter, update, None, session)
                    .await?
            }
            None => self.reservations().update_one(filter, update, None).await?,
        };
        Ok(result.matched_count > 0)
    }

    /// Insert `child` under its parent without a transaction. The parent is
    /// re-read after the insert; if a delete got to it first, the child is
    /// removed again and the parent reported missing.
    async fn append_unsessioned<T>(
        &self,
        collection: Collection<T>,
        child: &T,
        child_id: &str,
        reservation_id: &str,
        at: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError>
    where
        T: Serialize + Send + Sync,
    {
        if !self.touch_parent(None, reservation_id, at).await? {
            return Err(StoreError::MissingParent(reservation_id.to_string()));
        }
        collection.insert_one(child, None).await?;

        let live = self
            .reservations()
            .count_documents(live_parent(reservation_id), None)
            .await?;
        if live > 0 {
            return Ok(());
        }

        tracing::warn!(
            reservation_id = %reservation_id,
            child_id = %child_id,
            "Parent deleted during append; removing child"
        );
        if let Err(e) = collection.delete_one(doc! { "_id": child_id }, None).await {
            tracing::error!(
                reservation_id = %reservation_id,
                child_id = %child_id,
                error = %e,
                "Failed to remove child of deleted reservation"
            );
            return Err(e.into());
        }
        Err(StoreError::MissingParent(reservation_id.to_string()))
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn identifiers_desc(
        &self,
        series: Series,
        prefix: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        let (collection, field) = series_location(series);
        let filter = doc! { field: { "$regex": format!("^{}", regex::escape(prefix)) } };
        let options = FindOptions::builder()
            .sort(doc! { field: -1 })
            .skip(skip)
            .limit(limit)
            .projection(doc! { field: 1, "_id": 0 })
            .build();

        let docs: Vec<Document> = self
            .db
            .collection::<Document>(collection)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;

        Ok(docs
            .iter()
            .filter_map(|d| d.get_str(field).ok().map(str::to_string))
            .collect())
    }

    async fn counter_value(&self, scope: &str) -> Result<Option<u64>, StoreError> {
        let counter = self.counters().find_one(doc! { "_id": scope }, None).await?;
        Ok(counter.map(|c| bson_seq(c.seq)))
    }

    async fn raise_counter(&self, scope: &str, floor: u64) -> Result<(), StoreError> {
        let update = doc! {
            "$max": { "seq": floor as i64 },
            "$set": { "updatedAt": BsonDateTime::now() },
        };
        self.upsert_counter(scope, update).await?;
        Ok(())
    }

    async fn increment_counter(&self, scope: &str) -> Result<u64, StoreError> {
        let update = doc! {
            "$inc": { "seq": 1_i64 },
            "$set": { "updatedAt": BsonDateTime::now() },
        };
        let counter = self.upsert_counter(scope, update).await?.ok_or_else(|| {
            StoreError::Backend(anyhow::anyhow!("Counter upsert for {} returned nothing", scope))
        })?;
        Ok(bson_seq(counter.seq))
    }

    async fn release_counter(&self, scope: &str, seq: u64) -> Result<bool, StoreError> {
        if seq == 0 {
            return Ok(false);
        }
        let result = self
            .counters()
            .update_one(
                doc! { "_id": scope, "seq": seq as i64 },
                doc! {
                    "$inc": { "seq": -1_i64 },
                    "$set": { "updatedAt": BsonDateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn insert_reservation(
        &self,
        reservation: &Reservation,
        down_payment: Option<&Payment>,
    ) -> Result<(), StoreError> {
        if self.use_transactions {
            let mut session = self.begin().await?;
            if let Err(e) = self
                .reservations()
                .insert_one_with_session(reservation, None, &mut session)
                .await
            {
                return Err(Self::abort(&mut session, e).await);
            }
            if let Some(payment) = down_payment {
                if let Err(e) = self
                    .payments()
                    .insert_one_with_session(payment, None, &mut session)
                    .await
                {
                    return Err(Self::abort(&mut session, e).await);
                }
            }
            session.commit_transaction().await?;
            return Ok(());
        }

        self.reservations().insert_one(reservation, None).await?;
        if let Some(payment) = down_payment {
            if let Err(e) = self.payments().insert_one(payment, None).await {
                // Compensate so the reservation never exists without its deposit.
                if let Err(cleanup) = self
                    .reservations()
                    .delete_one(doc! { "_id": &reservation.id }, None)
                    .await
                {
                    tracing::error!(
                        reservation_id = %reservation.id,
                        error = %cleanup,
                        "Failed to roll back reservation after down payment insert failed"
                    );
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn find_reservation(&self, id: &str) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations().find_one(doc! { "_id": id }, None).await?)
    }

    async fn update_reservation(
        &self,
        id: &str,
        patch: &ReservationPatch,
    ) -> Result<Option<Reservation>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .reservations()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": patch_to_set(patch) }, options)
            .await?)
    }

    async fn delete_reservation(&self, id: &str) -> Result<Option<CascadeSummary>, StoreError> {
        let children = doc! { "reservationId": id };

        if self.use_transactions {
            let mut session = self.begin().await?;
            let parent = match self
                .reservations()
                .delete_one_with_session(doc! { "_id": id }, None, &mut session)
                .await
            {
                Ok(r) => r,
                Err(e) => return Err(Self::abort(&mut session, e).await),
            };
            if parent.deleted_count == 0 {
                if let Err(e) = session.abort_transaction().await {
                    tracing::warn!(error = %e, "Failed to abort transaction");
                }
                return Ok(None);
            }
            let addons = match self
                .addons()
                .delete_many_with_session(children.clone(), None, &mut session)
                .await
            {
                Ok(r) => r,
                Err(e) => return Err(Self::abort(&mut session, e).await),
            };
            let payments = match self
                .payments()
                .delete_many_with_session(children, None, &mut session)
                .await
            {
                Ok(r) => r,
                Err(e) => return Err(Self::abort(&mut session, e).await),
            };
            session.commit_transaction().await?;
            return Ok(Some(CascadeSummary {
                addons_deleted: addons.deleted_count,
                payments_deleted: payments.deleted_count,
            }));
        }

        // Appends that re-read the parent after this mark remove their own
        // child; earlier ones are swept below. An interrupted delete leaves a
        // marked parent, never an orphan.
        let marked = self
            .reservations()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "deleting": true } },
                None,
            )
            .await?;
        if marked.matched_count == 0 {
            return Ok(None);
        }
        let addons = self.addons().delete_many(children.clone(), None).await?;
        let payments = self.payments().delete_many(children, None).await?;
        self.reservations()
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(Some(CascadeSummary {
            addons_deleted: addons.deleted_count,
            payments_deleted: payments.deleted_count,
        }))
    }

    async fn list_reservations(
        &self,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>, StoreError> {
        let mut filter = doc! {};
        if let Some(pattern) = search_regex(&query.search) {
            filter.insert(
                "$or",
                vec![
                    Bson::Document(doc! { "clientName": pattern.clone() }),
                    Bson::Document(doc! { "eventName": pattern.clone() }),
                    Bson::Document(doc! { "nomorInvoice": pattern }),
                ],
            );
        }
        let mut range = doc! {};
        if let Some(from) = query.event_from {
            range.insert("$gte", BsonDateTime::from_chrono(from));
        }
        if let Some(to) = query.event_to {
            range.insert("$lte", BsonDateTime::from_chrono(to));
        }
        if !range.is_empty() {
            filter.insert("eventDate", range);
        }

        let total = self
            .reservations()
            .count_documents(filter.clone(), None)
            .await?;

        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "nomorInvoice": -1 })
            .skip(query.skip)
            .limit(query.limit)
            .build();
        let items = self
            .reservations()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;

        Ok(Page { items, total })
    }

    async fn append_addon(&self, addon: &Addon) -> Result<(), StoreError> {
        if self.use_transactions {
            let mut session = self.begin().await?;
            match self
                .touch_parent(Some(&mut session), &addon.reservation_id, addon.created_at)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = session.abort_transaction().await {
                        tracing::warn!(error = %e, "Failed to abort transaction");
                    }
                    return Err(StoreError::MissingParent(addon.reservation_id.clone()));
                }
                Err(e) => return Err(Self::abort(&mut session, e).await),
            }
            if let Err(e) = self
                .addons()
                .insert_one_with_session(addon, None, &mut session)
                .await
            {
                return Err(Self::abort(&mut session, e).await);
            }
            session.commit_transaction().await?;
            return Ok(());
        }

        self.append_unsessioned(
            self.addons(),
            addon,
            &addon.id,
            &addon.reservation_id,
            addon.created_at,
        )
        .await
    }

    async fn append_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        if self.use_transactions {
            let mut session = self.begin().await?;
            match self
                .touch_parent(Some(&mut session), &payment.reservation_id, payment.created_at)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = session.abort_transaction().await {
                        tracing::warn!(error = %e, "Failed to abort transaction");
                    }
                    return Err(StoreError::MissingParent(payment.reservation_id.clone()));
                }
                Err(e) => return Err(Self::abort(&mut session, e).await),
            }
            if let Err(e) = self
                .payments()
                .insert_one_with_session(payment, None, &mut session)
                .await
            {
                return Err(Self::abort(&mut session, e).await);
            }
            session.commit_transaction().await?;
            return Ok(());
        }

        self.append_unsessioned(
            self.payments(),
            payment,
            &payment.id,
            &payment.reservation_id,
            payment.created_at,
        )
        .await
    }

    async fn addons_for(&self, reservation_id: &str) -> Result<Vec<Addon>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        Ok(self
            .addons()
            .find(doc! { "reservationId": reservation_id }, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn payments_for(&self, reservation_id: &str) -> Result<Vec<Payment>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "nomorNota": 1 })
            .build();
        Ok(self
            .payments()
            .find(doc! { "reservationId": reservation_id }, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn list_payments(&self, query: &PaymentQuery) -> Result<Page<Payment>, StoreError> {
        let mut filter = doc! {};
        if let Some(rid) = &query.reservation_id {
            filter.insert("reservationId", rid.as_str());
        }
        if let Some(pattern) = search_regex(&query.search) {
            filter.insert(
                "$or",
                vec![
                    Bson::Document(doc! { "nomorNota": pattern.clone() }),
                    Bson::Document(doc! { "method": pattern }),
                ],
            );
        }

        let total = self.payments().count_documents(filter.clone(), None).await?;
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "nomorNota": -1 })
            .skip(query.skip)
            .limit(query.limit)
            .build();
        let items = self
            .payments()
            .find(filter, options)
            .await?
            .try_collect()
            .await?;

        Ok(Page { items, total })
    }
}
