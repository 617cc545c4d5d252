use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). Negative for groups and channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for ChatId {
    /// A user's private chat shares the user's id.
    fn from(u: UserId) -> Self {
        ChatId(u.0)
    }
}

/// Kind of chat an update arrived in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// What a directory entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Channel,
    Group,
    Bot,
    Person,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Channel => "Channel",
            EntityKind::Group => "Group",
            EntityKind::Bot => "Bot",
            EntityKind::Person => "Person",
        }
    }
}

/// Moderator decision on an enrollment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Approval {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Approval {
    pub fn decided(passed: bool) -> Self {
        if passed {
            Approval::Approved
        } else {
            Approval::Rejected
        }
    }

    pub fn is_decided(self) -> bool {
        !matches!(self, Approval::Pending)
    }
}

/// Lifecycle stage derived from `is_submitted` + `approval`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Drafting,
    Submitted,
    Approved,
    Rejected,
}

/// Someone acting on the directory (submitter, moderator, feedback author).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// A pending proposal for directory inclusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub uuid: Uuid,
    pub kind: EntityKind,
    pub chat_id: Option<ChatId>,
    pub title: String,
    pub description: Option<String>,
    /// Tags keep their leading `#`, e.g. `#apple`.
    pub tags: Option<BTreeSet<String>>,
    pub classification: Option<String>,
    pub username: Option<String>,
    pub link: Option<String>,
    pub member_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub created_by_display_name: String,
    pub is_submitted: bool,
    pub approval: Approval,
}

impl Enrollment {
    pub fn lookup_matches(&self, lookup: &ChatLookup) -> bool {
        lookup.matches(self.username.as_deref(), self.chat_id)
    }

    pub fn stage(&self) -> Stage {
        match (self.is_submitted, self.approval) {
            (_, Approval::Approved) => Stage::Approved,
            (_, Approval::Rejected) => Stage::Rejected,
            (true, Approval::Pending) => Stage::Submitted,
            (false, Approval::Pending) => Stage::Drafting,
        }
    }

    pub fn apply(&mut self, edit: FieldEdit) {
        match edit {
            FieldEdit::Title(v) => self.title = v,
            FieldEdit::Description(v) => self.description = Some(v),
            FieldEdit::Tags(v) => self.tags = Some(v),
            FieldEdit::Classification(v) => self.classification = Some(v),
            FieldEdit::Link(v) => self.link = Some(v),
        }
    }
}

/// A published, publicly listed directory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub uuid: Uuid,
    pub bulletin_message_id: Option<MessageId>,
    pub kind: EntityKind,
    pub chat_id: Option<ChatId>,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub classification: Option<String>,
    pub username: Option<String>,
    pub link: Option<String>,
    pub member_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Materialize a record from an approved enrollment. The uuid is carried
    /// over so the record stays traceable to its enrollment.
    pub fn from_enrollment(enrollment: &Enrollment, now: DateTime<Utc>) -> Self {
        Self {
            uuid: enrollment.uuid,
            bulletin_message_id: None,
            kind: enrollment.kind,
            chat_id: enrollment.chat_id,
            title: enrollment.title.clone(),
            description: enrollment.description.clone(),
            tags: enrollment.tags.clone(),
            classification: enrollment.classification.clone(),
            username: enrollment.username.clone(),
            link: enrollment.link.clone(),
            member_count: enrollment.member_count,
            created_at: enrollment.created_at,
            created_by: enrollment.created_by,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, edit: FieldEdit) {
        match edit {
            FieldEdit::Title(v) => self.title = v,
            FieldEdit::Description(v) => self.description = Some(v),
            FieldEdit::Tags(v) => self.tags = Some(v),
            FieldEdit::Classification(v) => self.classification = Some(v),
            FieldEdit::Link(v) => self.link = Some(v),
        }
    }

    /// Every whitespace separated term of `query` occurs, ignoring case, in
    /// the title, description, username or tags.
    pub fn matches_keywords(&self, query: &str) -> bool {
        let mut haystack = self.title.to_lowercase();
        for part in [self.description.as_deref(), self.username.as_deref()]
            .into_iter()
            .flatten()
        {
            haystack.push('\n');
            haystack.push_str(&part.to_lowercase());
        }
        for tag in self.tags.iter().flatten() {
            haystack.push('\n');
            haystack.push_str(&tag.to_lowercase());
        }
        let mut terms = query.split_whitespace().peekable();
        terms.peek().is_some() && terms.all(|t| haystack.contains(&t.to_lowercase()))
    }

    pub fn in_classification(&self, classification: &str) -> bool {
        self.classification
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(classification))
    }

    pub fn lookup_matches(&self, lookup: &ChatLookup) -> bool {
        lookup.matches(self.username.as_deref(), self.chat_id)
    }
}

/// Listing order: title ignoring case, then uuid for stability.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then(a.uuid.cmp(&b.uuid))
    });
}

/// A single field change on an enrollment or record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldEdit {
    Title(String),
    Description(String),
    Tags(BTreeSet<String>),
    Classification(String),
    Link(String),
}

/// Banned chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub banned_at: DateTime<Utc>,
}

/// How to address a chat when resolving or de-duplicating.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatLookup {
    Username(String),
    Id(ChatId),
}

impl ChatLookup {
    pub fn matches(&self, username: Option<&str>, chat_id: Option<ChatId>) -> bool {
        match self {
            ChatLookup::Username(name) => username.is_some_and(|u| u.eq_ignore_ascii_case(name)),
            ChatLookup::Id(id) => chat_id == Some(*id),
        }
    }
}

/// Public information about a chat, resolved through the chat gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatProfile {
    pub chat_id: Option<ChatId>,
    pub kind: EntityKind,
    pub title: String,
    pub description: Option<String>,
    pub username: Option<String>,
    pub link: Option<String>,
    pub member_count: Option<u64>,
}

/// One window of a paginated query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Cut `[offset, offset + limit)` out of a complete, ordered result set.
    pub fn window(all: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = all.len() as u64;
        Self {
            items: all.into_iter().skip(offset).take(limit).collect(),
            total,
        }
    }
}

/// Parse `#tag` tokens out of free text. Tokens without `#` get one.
pub fn parse_tags(text: &str) -> BTreeSet<String> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == '，')
        .map(|s| s.trim().trim_start_matches('#'))
        .filter(|s| !s.is_empty())
        .map(|s| format!("#{s}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        let tags = parse_tags("#apple iphone,  #ios ##mac");
        let v: Vec<_> = tags.into_iter().collect();
        assert_eq!(v, vec!["#apple", "#ios", "#iphone", "#mac"]);
    }

    #[test]
    fn keyword_matching_covers_all_text_fields() {
        let r = Record {
            uuid: Uuid::new_v4(),
            bulletin_message_id: None,
            kind: EntityKind::Channel,
            chat_id: Some(ChatId(-1)),
            title: "Rust News".to_string(),
            description: Some("Weekly digest".to_string()),
            tags: Some(parse_tags("#programming")),
            classification: Some("Tech".to_string()),
            username: Some("rustnews".to_string()),
            link: None,
            member_count: None,
            created_at: Utc::now(),
            created_by: UserId(1),
            updated_at: Utc::now(),
        };
        assert!(r.matches_keywords("rust"));
        assert!(r.matches_keywords("WEEKLY #program"));
        assert!(!r.matches_keywords("rust python"));
        assert!(!r.matches_keywords("   "));
        assert!(r.in_classification("tech"));
        assert!(r.lookup_matches(&ChatLookup::Username("RustNews".into())));
        assert!(r.lookup_matches(&ChatLookup::Id(ChatId(-1))));
        assert_eq!(Page::window(vec![1, 2, 3, 4, 5], 3, 10), Page { items: vec![4, 5], total: 5 });
    }

    #[test]
    fn approval_stage() {
        let mut e = Enrollment {
            uuid: Uuid::new_v4(),
            kind: EntityKind::Group,
            chat_id: None,
            title: "Foo".to_string(),
            description: None,
            tags: None,
            classification: None,
            username: None,
            link: None,
            member_count: None,
            created_at: Utc::now(),
            created_by: UserId(1),
            created_by_display_name: "u".to_string(),
            is_submitted: false,
            approval: Approval::Pending,
        };
        assert_eq!(e.stage(), Stage::Drafting);
        e.is_submitted = true;
        assert_eq!(e.stage(), Stage::Submitted);
        e.approval = Approval::decided(false);
        assert_eq!(e.stage(), Stage::Rejected);
        assert!(e.approval.is_decided());
    }
}
