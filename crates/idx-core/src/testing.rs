//! Hand-written fakes shared by the unit tests.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    domain::{
        sort_records, Actor, Approval, BanEntry, ChatId, ChatLookup, ChatProfile, EntityKind,
        Enrollment, MessageId, MessageRef, Page, Record, UserId,
    },
    events::{DomainEvent, EventSubscriber, EventTopic},
    messaging::{
        port::ChatGateway,
        types::{ChatAction, InlineKeyboard, Markup, Sender},
    },
    ports::{BanStore, SearchIndex},
    Error, Result,
};

pub fn actor(id: i64) -> Actor {
    Actor::new(UserId(id), format!("user{id}"))
}

pub fn sender(id: i64) -> Sender {
    Sender {
        id: UserId(id),
        first_name: format!("user{id}"),
        last_name: None,
        username: None,
    }
}

pub fn profile(username: &str, kind: EntityKind) -> ChatProfile {
    ChatProfile {
        chat_id: None,
        kind,
        title: username.to_string(),
        description: Some(format!("About {username}")),
        username: Some(username.to_string()),
        link: None,
        member_count: Some(42),
    }
}

pub fn record(title: &str) -> Record {
    let now = Utc::now();
    Record {
        uuid: Uuid::new_v4(),
        bulletin_message_id: None,
        kind: EntityKind::Group,
        chat_id: None,
        title: title.to_string(),
        description: None,
        tags: None,
        classification: None,
        username: Some(title.to_lowercase().replace(' ', "_")),
        link: None,
        member_count: None,
        created_at: now,
        created_by: UserId(1),
        updated_at: now,
    }
}

pub fn enrollment(title: &str) -> Enrollment {
    Enrollment {
        uuid: Uuid::new_v4(),
        kind: EntityKind::Group,
        chat_id: None,
        title: title.to_string(),
        description: None,
        tags: None,
        classification: None,
        username: Some(title.to_lowercase().replace(' ', "_")),
        link: None,
        member_count: None,
        created_at: Utc::now(),
        created_by: UserId(1),
        created_by_display_name: "user1".to_string(),
        is_submitted: false,
        approval: Approval::Pending,
    }
}

// ---- chat gateway ----

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub message: MessageRef,
    pub html: String,
    pub markup: Option<Markup>,
}

#[derive(Clone, Debug)]
pub struct EditedMessage {
    pub message: MessageRef,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
struct GatewayLog {
    sent: Vec<SentMessage>,
    edits: Vec<EditedMessage>,
    cleared: Vec<MessageRef>,
    deleted: Vec<MessageRef>,
    answered: Vec<(String, Option<String>)>,
    actions: Vec<ChatId>,
    profiles: HashMap<ChatLookup, ChatProfile>,
    failing: BTreeSet<i64>,
    failing_clears: bool,
}

type SendHook = Box<dyn Fn() + Send + Sync>;

/// Records every call; `resolve_chat` answers from registered profiles.
#[derive(Default)]
pub struct FakeGateway {
    log: Mutex<GatewayLog>,
    next_id: AtomicI32,
    on_send: Mutex<Option<SendHook>>,
}

impl FakeGateway {
    pub fn add_profile(&self, lookup: ChatLookup, profile: ChatProfile) {
        self.log.lock().profiles.insert(lookup, profile);
    }

    /// Make every send to `chat_id` fail.
    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.log.lock().failing.insert(chat_id.0);
    }

    /// Make every `clear_keyboard` call fail.
    pub fn fail_keyboard_clears(&self) {
        self.log.lock().failing_clears = true;
    }

    /// Run `hook` after each successful send.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_send.lock() = Some(Box::new(hook));
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.log.lock().sent.clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<SentMessage> {
        self.log
            .lock()
            .sent
            .iter()
            .filter(|m| m.message.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.log.lock().edits.clone()
    }

    pub fn cleared(&self) -> Vec<MessageRef> {
        self.log.lock().cleared.clone()
    }

    pub fn answered(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().answered.clone()
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        markup: Option<Markup>,
    ) -> Result<MessageRef> {
        let message = {
            let mut log = self.log.lock();
            if log.failing.contains(&chat_id.0) {
                return Err(Error::External(format!("chat {chat_id} unreachable")));
            }
            let message = MessageRef {
                chat_id,
                message_id: MessageId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            };
            log.sent.push(SentMessage {
                message,
                html: html.to_string(),
                markup,
            });
            message
        };
        if let Some(hook) = self.on_send.lock().as_ref() {
            hook();
        }
        Ok(message)
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.log.lock().edits.push(EditedMessage {
            message: msg,
            html: html.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn clear_keyboard(&self, msg: MessageRef) -> Result<()> {
        let mut log = self.log.lock();
        if log.failing_clears {
            return Err(Error::External("message is not modified".to_string()));
        }
        log.cleared.push(msg);
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.log.lock().deleted.push(msg);
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.log
            .lock()
            .answered
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, _action: ChatAction) -> Result<()> {
        self.log.lock().actions.push(chat_id);
        Ok(())
    }

    async fn resolve_chat(&self, lookup: &ChatLookup) -> Result<Option<ChatProfile>> {
        Ok(self.log.lock().profiles.get(lookup).cloned())
    }
}

// ---- search index ----

#[derive(Default)]
struct IndexData {
    enrollments: HashMap<Uuid, Enrollment>,
    records: HashMap<Uuid, Record>,
}

/// In-memory search index with query counters.
#[derive(Default)]
pub struct MemoryIndex {
    data: Mutex<IndexData>,
    keyword_queries: AtomicUsize,
    classification_queries: AtomicUsize,
}

impl MemoryIndex {
    pub fn enrollment(&self, uuid: Uuid) -> Option<Enrollment> {
        self.data.lock().enrollments.get(&uuid).cloned()
    }

    pub fn record(&self, uuid: Uuid) -> Option<Record> {
        self.data.lock().records.get(&uuid).cloned()
    }

    pub fn remove_record(&self, uuid: Uuid) -> Option<Record> {
        self.data.lock().records.remove(&uuid)
    }

    pub fn keyword_queries(&self) -> usize {
        self.keyword_queries.load(Ordering::Relaxed)
    }

    pub fn classification_queries(&self) -> usize {
        self.classification_queries.load(Ordering::Relaxed)
    }

    fn records_where(&self, pred: impl Fn(&Record) -> bool) -> Vec<Record> {
        let mut out: Vec<_> = self
            .data
            .lock()
            .records
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        sort_records(&mut out);
        out
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn get_enrollment(&self, uuid: Uuid) -> Result<Option<Enrollment>> {
        Ok(self.enrollment(uuid))
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        self.data
            .lock()
            .enrollments
            .insert(enrollment.uuid, enrollment.clone());
        Ok(())
    }

    async fn delete_enrollment(&self, uuid: Uuid) -> Result<bool> {
        Ok(self.data.lock().enrollments.remove(&uuid).is_some())
    }

    async fn enrollments_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Enrollment>> {
        let mut all: Vec<_> = self
            .data
            .lock()
            .enrollments
            .values()
            .filter(|e| e.created_by == user)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uuid.cmp(&b.uuid)));
        Ok(Page::window(all, offset, limit))
    }

    async fn submitted_enrollment(&self, lookup: &ChatLookup) -> Result<Option<Enrollment>> {
        Ok(self
            .data
            .lock()
            .enrollments
            .values()
            .find(|e| e.is_submitted && !e.approval.is_decided() && e.lookup_matches(lookup))
            .cloned())
    }

    async fn insert_record(&self, record: &Record) -> Result<()> {
        let mut data = self.data.lock();
        if data.records.contains_key(&record.uuid) {
            return Err(Error::DuplicateKey(record.uuid.to_string()));
        }
        data.records.insert(record.uuid, record.clone());
        Ok(())
    }

    async fn replace_record(&self, record: &Record) -> Result<()> {
        let mut data = self.data.lock();
        match data.records.get_mut(&record.uuid) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("record {}", record.uuid))),
        }
    }

    async fn get_record(&self, uuid: Uuid) -> Result<Option<Record>> {
        Ok(self.record(uuid))
    }

    async fn delete_record(&self, uuid: Uuid) -> Result<Option<Record>> {
        Ok(self.data.lock().records.remove(&uuid))
    }

    async fn record_by(&self, lookup: &ChatLookup) -> Result<Option<Record>> {
        Ok(self
            .data
            .lock()
            .records
            .values()
            .find(|r| r.lookup_matches(lookup))
            .cloned())
    }

    async fn search_by_keyword(
        &self,
        term: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        self.keyword_queries.fetch_add(1, Ordering::Relaxed);
        Ok(Page::window(
            self.records_where(|r| r.matches_keywords(term)),
            offset,
            limit,
        ))
    }

    async fn search_by_classification(
        &self,
        classification: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        self.classification_queries.fetch_add(1, Ordering::Relaxed);
        Ok(Page::window(
            self.records_where(|r| r.in_classification(classification)),
            offset,
            limit,
        ))
    }

    async fn search_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Record>> {
        Ok(Page::window(
            self.records_where(|r| r.created_by == user),
            offset,
            limit,
        ))
    }

    async fn count_records(&self) -> Result<u64> {
        Ok(self.data.lock().records.len() as u64)
    }
}

// ---- ban store ----

#[derive(Default)]
pub struct MemoryBanStore {
    entries: Mutex<HashMap<ChatId, BanEntry>>,
}

impl BanStore for MemoryBanStore {
    fn load_all(&self) -> Result<Vec<BanEntry>> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    fn insert(&self, entry: &BanEntry) -> Result<()> {
        self.entries.lock().insert(entry.chat_id, entry.clone());
        Ok(())
    }

    fn remove(&self, chat_id: ChatId) -> Result<()> {
        self.entries.lock().remove(&chat_id);
        Ok(())
    }
}

// ---- events ----

/// Forwards every received event into a channel the test reads from.
pub struct RecordingSubscriber {
    topics: Vec<EventTopic>,
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl RecordingSubscriber {
    pub fn new(topics: &[EventTopic]) -> (Arc<Self>, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                topics: topics.to_vec(),
                tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl EventSubscriber for RecordingSubscriber {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn topics(&self) -> &[EventTopic] {
        &self.topics
    }

    async fn handle(&self, event: DomainEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<DomainEvent>) -> DomainEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

pub async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<DomainEvent>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {event:?}");
    }
}
