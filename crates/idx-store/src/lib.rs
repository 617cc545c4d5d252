//! Embedded, on-disk search index and ban list backed by sled.
//!
//! Documents are JSON values keyed by uuid (enrollments, records) or by
//! big-endian chat id (bans). Queries scan a tree and filter with the
//! matching rules from `idx_core::domain`.

use std::path::Path;

use async_trait::async_trait;
use idx_core::{
    domain::{sort_records, BanEntry, ChatId, ChatLookup, Enrollment, Page, Record, UserId},
    ports::{BanStore, SearchIndex},
    Error, Result,
};
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};
use uuid::Uuid;

const ENROLLMENTS: &str = "enrollments";
const RECORDS: &str = "records";
const BANS: &str = "bans";

fn unavailable(e: sled::Error) -> Error {
    Error::IndexUnavailable(e.to_string())
}

/// Open (or create) the database under `dir`.
pub fn open(dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(dir)?;
    let db = sled::open(dir.join("index")).map_err(unavailable)?;
    info!(path = %dir.display(), "Opened index database");
    Ok(db)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn scan<T: DeserializeOwned>(tree: &Tree, mut keep: impl FnMut(&T) -> bool) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for item in tree.iter() {
        let (_, value) = item.map_err(unavailable)?;
        let doc: T = decode(&value)?;
        if keep(&doc) {
            out.push(doc);
        }
    }
    Ok(out)
}

pub struct SledIndex {
    enrollments: Tree,
    records: Tree,
}

impl SledIndex {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            enrollments: db.open_tree(ENROLLMENTS).map_err(unavailable)?,
            records: db.open_tree(RECORDS).map_err(unavailable)?,
        })
    }

    fn records_where(&self, keep: impl FnMut(&Record) -> bool) -> Result<Vec<Record>> {
        let mut out = scan(&self.records, keep)?;
        sort_records(&mut out);
        Ok(out)
    }
}

#[async_trait]
impl SearchIndex for SledIndex {
    async fn get_enrollment(&self, uuid: Uuid) -> Result<Option<Enrollment>> {
        match self.enrollments.get(uuid.as_bytes()).map_err(unavailable)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        self.enrollments
            .insert(enrollment.uuid.as_bytes(), encode(enrollment)?)
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete_enrollment(&self, uuid: Uuid) -> Result<bool> {
        let removed = self
            .enrollments
            .remove(uuid.as_bytes())
            .map_err(unavailable)?;
        Ok(removed.is_some())
    }

    async fn enrollments_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Enrollment>> {
        let mut all: Vec<Enrollment> = scan(&self.enrollments, |e: &Enrollment| e.created_by == user)?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));
        Ok(Page::window(all, offset, limit))
    }

    async fn submitted_enrollment(&self, lookup: &ChatLookup) -> Result<Option<Enrollment>> {
        let found = scan(&self.enrollments, |e: &Enrollment| {
            e.is_submitted && !e.approval.is_decided() && e.lookup_matches(lookup)
        })?;
        Ok(found.into_iter().next())
    }

    async fn insert_record(&self, record: &Record) -> Result<()> {
        let swapped = self
            .records
            .compare_and_swap(record.uuid.as_bytes(), None as Option<&[u8]>, Some(encode(record)?))
            .map_err(unavailable)?;
        if swapped.is_err() {
            return Err(Error::DuplicateKey(record.uuid.to_string()));
        }
        debug!(uuid = %record.uuid, "Record indexed");
        Ok(())
    }

    async fn replace_record(&self, record: &Record) -> Result<()> {
        let key = record.uuid.as_bytes();
        let Some(current) = self.records.get(key).map_err(unavailable)? else {
            return Err(Error::NotFound(format!("record {}", record.uuid)));
        };
        let swapped = self
            .records
            .compare_and_swap(key, Some(current), Some(encode(record)?))
            .map_err(unavailable)?;
        if swapped.is_err() {
            // Removed or rewritten underneath us.
            return Err(Error::NotFound(format!("record {}", record.uuid)));
        }
        Ok(())
    }

    async fn get_record(&self, uuid: Uuid) -> Result<Option<Record>> {
        match self.records.get(uuid.as_bytes()).map_err(unavailable)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_record(&self, uuid: Uuid) -> Result<Option<Record>> {
        match self.records.remove(uuid.as_bytes()).map_err(unavailable)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn record_by(&self, lookup: &ChatLookup) -> Result<Option<Record>> {
        let found = scan(&self.records, |r: &Record| r.lookup_matches(lookup))?;
        Ok(found.into_iter().next())
    }

    async fn search_by_keyword(
        &self,
        term: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        let all = self.records_where(|r| r.matches_keywords(term))?;
        Ok(Page::window(all, offset, limit))
    }

    async fn search_by_classification(
        &self,
        classification: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        let all = self.records_where(|r| r.in_classification(classification))?;
        Ok(Page::window(all, offset, limit))
    }

    async fn search_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        let all = self.records_where(|r| r.created_by == user)?;
        Ok(Page::window(all, offset, limit))
    }

    async fn count_records(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}

/// Ban list persisted in its own tree.
pub struct SledBanStore {
    bans: Tree,
}

impl SledBanStore {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            bans: db.open_tree(BANS).map_err(unavailable)?,
        })
    }
}

impl BanStore for SledBanStore {
    fn load_all(&self) -> Result<Vec<BanEntry>> {
        scan(&self.bans, |_: &BanEntry| true)
    }

    fn insert(&self, entry: &BanEntry) -> Result<()> {
        self.bans
            .insert(entry.chat_id.0.to_be_bytes(), encode(entry)?)
            .map_err(unavailable)?;
        self.bans.flush().map_err(unavailable)?;
        Ok(())
    }

    fn remove(&self, chat_id: ChatId) -> Result<()> {
        self.bans
            .remove(chat_id.0.to_be_bytes())
            .map_err(unavailable)?;
        self.bans.flush().map_err(unavailable)?;
        Ok(())
    }
}
