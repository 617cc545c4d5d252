//! Published records: publish, update, delete, feedback.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    domain::{Actor, FieldEdit, MessageId, Record},
    events::{DomainEvent, EventBus},
    locks::EntityLocks,
    ports::SearchIndex,
    Error, Result,
};

/// Owner of the Record lifecycle. All mutations of one uuid run under that
/// uuid's lock, so an update never interleaves with a delete.
pub struct RecordCatalog {
    index: Arc<dyn SearchIndex>,
    bus: Arc<EventBus>,
    locks: EntityLocks,
}

impl RecordCatalog {
    pub fn new(index: Arc<dyn SearchIndex>, bus: Arc<EventBus>) -> Self {
        Self {
            index,
            bus,
            locks: EntityLocks::default(),
        }
    }

    /// Insert a new record and announce it. Insert conflicts surface as
    /// `DuplicateKey`.
    pub async fn publish(&self, record: Record) -> Result<Record> {
        let _guard = self.locks.lock(record.uuid).await;
        self.index.insert_record(&record).await?;
        self.bus.publish(DomainEvent::RecordPublished(record.clone()));
        info!(uuid = %record.uuid, title = %record.title, "Record published");
        Ok(record)
    }

    /// Remember the bulletin message of a record. Does not emit an event.
    /// Returns `None` when the record was deleted in the meantime.
    pub async fn attach_bulletin(&self, uuid: Uuid, message_id: MessageId) -> Result<Option<Record>> {
        let _guard = self.locks.lock(uuid).await;
        let Some(mut record) = self.index.get_record(uuid).await? else {
            debug!(uuid = %uuid, "Record gone before bulletin id was attached");
            return Ok(None);
        };
        record.bulletin_message_id = Some(message_id);
        self.index.replace_record(&record).await?;
        Ok(Some(record))
    }

    /// Replace a record's editable content and announce the change.
    ///
    /// Identity, provenance and the bulletin reference are kept from the
    /// stored copy; `updated_at` is stamped here.
    pub async fn update(&self, record: Record) -> Result<Record> {
        let _guard = self.locks.lock(record.uuid).await;
        let current = self.load(record.uuid).await?;
        let merged = Record {
            bulletin_message_id: current.bulletin_message_id,
            created_at: current.created_at,
            created_by: current.created_by,
            ..record
        };
        self.store_update(merged).await
    }

    /// Apply a single field edit to a stored record.
    pub async fn edit(&self, uuid: Uuid, edit: FieldEdit) -> Result<Record> {
        let _guard = self.locks.lock(uuid).await;
        let mut record = self.load(uuid).await?;
        record.apply(edit);
        self.store_update(record).await
    }

    async fn store_update(&self, mut record: Record) -> Result<Record> {
        record.updated_at = Utc::now();
        self.index.replace_record(&record).await?;
        self.bus.publish(DomainEvent::RecordUpdated(record.clone()));
        info!(uuid = %record.uuid, "Record updated");
        Ok(record)
    }

    /// Remove a record. An unknown uuid is a no-op and yields `None`.
    pub async fn delete(&self, uuid: Uuid, actor: &Actor) -> Result<Option<Record>> {
        let _guard = self.locks.lock(uuid).await;
        let Some(record) = self.index.delete_record(uuid).await? else {
            debug!(uuid = %uuid, "Delete of unknown record ignored");
            return Ok(None);
        };
        self.bus.publish(DomainEvent::RecordDeleted {
            record: record.clone(),
            actor: actor.clone(),
        });
        info!(uuid = %uuid, actor = actor.id.0, "Record deleted");
        Ok(Some(record))
    }

    /// Forward user feedback about a record to whoever listens.
    pub async fn feedback(&self, uuid: Uuid, from: &Actor, content: &str) -> Result<Record> {
        let record = self.load(uuid).await?;
        self.bus.publish(DomainEvent::FeedbackReceived {
            record: record.clone(),
            from: from.clone(),
            content: content.to_string(),
        });
        Ok(record)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Option<Record>> {
        self.index.get_record(uuid).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.index.count_records().await
    }

    async fn load(&self, uuid: Uuid) -> Result<Record> {
        self.index
            .get_record(uuid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("record {uuid}")))
    }
}
