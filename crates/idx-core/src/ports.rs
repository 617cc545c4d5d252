use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    domain::{BanEntry, ChatId, ChatLookup, Enrollment, Page, Record, UserId},
    Result,
};

/// Search index port.
///
/// The index is both the query surface and the system of record for
/// enrollments and records. Collaborator failures map to
/// `Error::IndexUnavailable`.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn get_enrollment(&self, uuid: Uuid) -> Result<Option<Enrollment>>;
    /// Insert or replace.
    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()>;
    /// Returns whether a document was removed.
    async fn delete_enrollment(&self, uuid: Uuid) -> Result<bool>;
    async fn enrollments_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Enrollment>>;
    /// A submitted, undecided enrollment for the same chat, if any.
    async fn submitted_enrollment(&self, lookup: &ChatLookup) -> Result<Option<Enrollment>>;

    /// Fails with `Error::DuplicateKey` when the uuid is taken.
    async fn insert_record(&self, record: &Record) -> Result<()>;
    /// Fails with `Error::NotFound` when the record does not exist.
    async fn replace_record(&self, record: &Record) -> Result<()>;
    async fn get_record(&self, uuid: Uuid) -> Result<Option<Record>>;
    async fn delete_record(&self, uuid: Uuid) -> Result<Option<Record>>;
    async fn record_by(&self, lookup: &ChatLookup) -> Result<Option<Record>>;

    async fn search_by_keyword(&self, term: &str, offset: usize, limit: usize)
        -> Result<Page<Record>>;
    async fn search_by_classification(
        &self,
        classification: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>>;
    async fn search_by_creator(&self, user: UserId, offset: usize, limit: usize)
        -> Result<Page<Record>>;
    async fn count_records(&self) -> Result<u64>;
}

/// Durable storage behind the ban registry.
pub trait BanStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<BanEntry>>;
    fn insert(&self, entry: &BanEntry) -> Result<()>;
    fn remove(&self, chat_id: ChatId) -> Result<()>;
}
