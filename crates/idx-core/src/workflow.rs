//! Enrollment lifecycle: draft, field edits, submit, decide.
//!
//! Every transition loads, mutates, persists and publishes under the
//! enrollment's uuid lock, so concurrent callers observe the transitions one
//! at a time and each transition publishes at most one event.

use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{Actor, Approval, ChatLookup, ChatProfile, Enrollment, FieldEdit, Page, UserId},
    events::{DomainEvent, EventBus},
    locks::EntityLocks,
    ports::SearchIndex,
    Error, Result,
};

pub struct SubmissionWorkflow {
    index: Arc<dyn SearchIndex>,
    bus: Arc<EventBus>,
    locks: EntityLocks,
}

/// Lookups under which an already listed or pending chat would collide.
pub fn lookups_for(profile: &ChatProfile) -> Vec<ChatLookup> {
    let mut out = Vec::new();
    if let Some(name) = profile.username.as_deref().filter(|n| !n.is_empty()) {
        out.push(ChatLookup::Username(name.to_string()));
    }
    if let Some(id) = profile.chat_id {
        out.push(ChatLookup::Id(id));
    }
    out
}

impl SubmissionWorkflow {
    pub fn new(index: Arc<dyn SearchIndex>, bus: Arc<EventBus>) -> Self {
        Self {
            index,
            bus,
            locks: EntityLocks::default(),
        }
    }

    /// Create a Drafting enrollment for a resolved chat.
    ///
    /// Fails with `DuplicateKey` when the chat is already listed or awaiting a
    /// decision.
    pub async fn draft(&self, profile: ChatProfile, owner: &Actor) -> Result<Enrollment> {
        let lookups = lookups_for(&profile);
        if lookups.is_empty() {
            return Err(Error::InvalidInput(
                "chat has neither a username nor an id".to_string(),
            ));
        }
        for lookup in &lookups {
            if self.index.record_by(lookup).await?.is_some()
                || self.index.submitted_enrollment(lookup).await?.is_some()
            {
                return Err(Error::DuplicateKey(describe(lookup)));
            }
        }

        let enrollment = Enrollment {
            uuid: Uuid::new_v4(),
            kind: profile.kind,
            chat_id: profile.chat_id,
            title: profile.title,
            description: profile.description,
            tags: None,
            classification: None,
            username: profile.username,
            link: profile.link,
            member_count: profile.member_count,
            created_at: Utc::now(),
            created_by: owner.id,
            created_by_display_name: owner.display_name.clone(),
            is_submitted: false,
            approval: Approval::Pending,
        };
        self.index.save_enrollment(&enrollment).await?;
        info!(uuid = %enrollment.uuid, user = owner.id.0, "Enrollment drafted");
        Ok(enrollment)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Enrollment> {
        self.index
            .get_enrollment(uuid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("enrollment {uuid}")))
    }

    /// Apply one field edit. Rejected with `Terminal` once decided; the
    /// stored enrollment is left untouched in that case.
    pub async fn edit(&self, uuid: Uuid, edit: FieldEdit) -> Result<Enrollment> {
        let _guard = self.locks.lock(uuid).await;
        let mut enrollment = self.get(uuid).await?;
        if enrollment.approval.is_decided() {
            return Err(Error::Terminal(uuid));
        }
        enrollment.apply(edit);
        self.index.save_enrollment(&enrollment).await?;
        Ok(enrollment)
    }

    pub async fn set_title(&self, uuid: Uuid, title: String) -> Result<Enrollment> {
        self.edit(uuid, FieldEdit::Title(title)).await
    }

    pub async fn set_description(&self, uuid: Uuid, description: String) -> Result<Enrollment> {
        self.edit(uuid, FieldEdit::Description(description)).await
    }

    pub async fn set_tags(&self, uuid: Uuid, tags: BTreeSet<String>) -> Result<Enrollment> {
        self.edit(uuid, FieldEdit::Tags(tags)).await
    }

    pub async fn set_classification(
        &self,
        uuid: Uuid,
        classification: String,
    ) -> Result<Enrollment> {
        self.edit(uuid, FieldEdit::Classification(classification))
            .await
    }

    pub async fn set_link(&self, uuid: Uuid, link: String) -> Result<Enrollment> {
        self.edit(uuid, FieldEdit::Link(link)).await
    }

    /// Hand a draft to the moderators. Publishes `EnrollSubmitted` once.
    pub async fn submit(&self, uuid: Uuid) -> Result<Enrollment> {
        let _guard = self.locks.lock(uuid).await;
        let mut enrollment = self.get(uuid).await?;
        if enrollment.approval.is_decided() {
            return Err(Error::Terminal(uuid));
        }
        if enrollment.is_submitted {
            return Err(Error::AlreadySubmitted(uuid));
        }
        enrollment.is_submitted = true;
        self.index.save_enrollment(&enrollment).await?;
        self.bus
            .publish(DomainEvent::EnrollSubmitted(enrollment.clone()));
        info!(uuid = %uuid, "Enrollment submitted");
        Ok(enrollment)
    }

    /// Discard a draft that was never submitted.
    pub async fn cancel(&self, uuid: Uuid, by: UserId) -> Result<()> {
        let _guard = self.locks.lock(uuid).await;
        let enrollment = self.get(uuid).await?;
        if enrollment.created_by != by {
            return Err(Error::NotFound(format!("enrollment {uuid}")));
        }
        if enrollment.is_submitted {
            return Err(Error::AlreadySubmitted(uuid));
        }
        self.index.delete_enrollment(uuid).await?;
        info!(uuid = %uuid, "Enrollment draft cancelled");
        Ok(())
    }

    /// Record a moderator decision and publish `EnrollDecided`.
    ///
    /// A passed enrollment still has to be materialized as a Record by the
    /// caller and then retired with [`SubmissionWorkflow::retire`].
    pub async fn approve(&self, uuid: Uuid, moderator: &Actor, passed: bool) -> Result<Enrollment> {
        let _guard = self.locks.lock(uuid).await;
        let mut enrollment = self.get(uuid).await?;
        if !enrollment.is_submitted {
            return Err(Error::NotSubmitted(uuid));
        }
        if enrollment.approval.is_decided() {
            return Err(Error::Terminal(uuid));
        }
        enrollment.approval = Approval::decided(passed);
        self.index.save_enrollment(&enrollment).await?;
        self.bus.publish(DomainEvent::EnrollDecided {
            enrollment: enrollment.clone(),
            moderator: moderator.clone(),
            passed,
        });
        info!(uuid = %uuid, moderator = moderator.id.0, passed, "Enrollment decided");
        Ok(enrollment)
    }

    /// Remove an approved enrollment once its Record exists.
    pub async fn retire(&self, uuid: Uuid) -> Result<bool> {
        let _guard = self.locks.lock(uuid).await;
        self.index.delete_enrollment(uuid).await
    }

    pub async fn list_by_creator(
        &self,
        user: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Enrollment>> {
        self.index.enrollments_by_creator(user, offset, limit).await
    }
}

fn describe(lookup: &ChatLookup) -> String {
    match lookup {
        ChatLookup::Username(name) => format!("@{name}"),
        ChatLookup::Id(id) => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, EntityKind, Record, Stage},
        events::EventTopic,
        testing::{actor, assert_no_event, next_event, profile, MemoryIndex, RecordingSubscriber},
    };

    fn setup() -> (Arc<MemoryIndex>, Arc<EventBus>, Arc<SubmissionWorkflow>) {
        let index = Arc::new(MemoryIndex::default());
        let bus = Arc::new(EventBus::new());
        let wf = Arc::new(SubmissionWorkflow::new(index.clone(), bus.clone()));
        (index, bus, wf)
    }

    #[tokio::test]
    async fn submit_twice_publishes_once() {
        let (_, bus, wf) = setup();
        let (sub, mut rx) = RecordingSubscriber::new(&[EventTopic::EnrollSubmitted]);
        bus.subscribe(sub);

        let e = wf.draft(profile("foo", EntityKind::Group), &actor(1)).await.unwrap();
        assert_eq!(e.stage(), Stage::Drafting);
        let submitted = wf.submit(e.uuid).await.unwrap();
        assert_eq!(submitted.stage(), Stage::Submitted);
        assert!(matches!(wf.submit(e.uuid).await, Err(Error::AlreadySubmitted(id)) if id == e.uuid));

        assert!(matches!(next_event(&mut rx).await, DomainEvent::EnrollSubmitted(x) if x.uuid == e.uuid));
        assert_no_event(&mut rx).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_are_serialized() {
        let (_, bus, wf) = setup();
        let (sub, mut rx) = RecordingSubscriber::new(&[EventTopic::EnrollSubmitted]);
        bus.subscribe(sub);
        let e = wf.draft(profile("foo", EntityKind::Group), &actor(1)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let wf = wf.clone();
                tokio::spawn(async move { wf.submit(e.uuid).await })
            })
            .collect();
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(Error::AlreadySubmitted(_)) => {}
                Err(other) => panic!("unexpected {other}"),
            }
        }
        assert_eq!(ok, 1);
        next_event(&mut rx).await;
        assert_no_event(&mut rx).await;
    }

    #[tokio::test]
    async fn decided_enrollment_rejects_edits() {
        let (index, _, wf) = setup();
        let e = wf.draft(profile("foo", EntityKind::Channel), &actor(1)).await.unwrap();
        wf.set_tags(e.uuid, crate::domain::parse_tags("#a #b")).await.unwrap();
        wf.submit(e.uuid).await.unwrap();
        wf.approve(e.uuid, &actor(99), false).await.unwrap();

        let before = index.enrollment(e.uuid).unwrap();
        assert!(matches!(wf.set_title(e.uuid, "Bar".into()).await, Err(Error::Terminal(_))));
        assert!(matches!(wf.set_link(e.uuid, "x".into()).await, Err(Error::Terminal(_))));
        assert!(matches!(wf.submit(e.uuid).await, Err(Error::Terminal(_))));
        assert_eq!(index.enrollment(e.uuid).unwrap(), before);
        assert_eq!(before.stage(), Stage::Rejected);
    }

    #[tokio::test]
    async fn approve_requires_submission_and_is_terminal() {
        let (_, bus, wf) = setup();
        let (sub, mut rx) = RecordingSubscriber::new(&[EventTopic::EnrollDecided]);
        bus.subscribe(sub);

        assert!(matches!(
            wf.approve(Uuid::new_v4(), &actor(9), true).await,
            Err(Error::NotFound(_))
        ));

        let e = wf.draft(profile("foo", EntityKind::Group), &actor(1)).await.unwrap();
        assert!(matches!(wf.approve(e.uuid, &actor(9), true).await, Err(Error::NotSubmitted(_))));

        wf.submit(e.uuid).await.unwrap();
        let decided = wf.approve(e.uuid, &actor(9), true).await.unwrap();
        assert_eq!(decided.stage(), Stage::Approved);
        assert!(matches!(wf.approve(e.uuid, &actor(9), true).await, Err(Error::Terminal(_))));

        match next_event(&mut rx).await {
            DomainEvent::EnrollDecided { enrollment, moderator, passed } => {
                assert_eq!(enrollment.uuid, e.uuid);
                assert_eq!(moderator.id, UserId(9));
                assert!(passed);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_no_event(&mut rx).await;

        assert!(wf.retire(e.uuid).await.unwrap());
        assert!(matches!(wf.approve(e.uuid, &actor(9), true).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn draft_rejects_listed_or_pending_chats() {
        let (index, _, wf) = setup();
        let first = wf.draft(profile("foo", EntityKind::Group), &actor(1)).await.unwrap();
        // Unsubmitted drafts do not block others.
        wf.draft(profile("foo", EntityKind::Group), &actor(2)).await.unwrap();

        wf.submit(first.uuid).await.unwrap();
        assert!(matches!(
            wf.draft(profile("foo", EntityKind::Group), &actor(2)).await,
            Err(Error::DuplicateKey(k)) if k == "@foo"
        ));

        let mut listed = profile("bar", EntityKind::Channel);
        listed.chat_id = Some(ChatId(-1001));
        let record = Record {
            chat_id: Some(ChatId(-1001)),
            username: None,
            ..crate::testing::record("Bar")
        };
        index.insert_record(&record).await.unwrap();
        assert!(matches!(wf.draft(listed, &actor(3)).await, Err(Error::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn cancel_only_discards_own_drafts() {
        let (index, _, wf) = setup();
        let e = wf.draft(profile("foo", EntityKind::Bot), &actor(1)).await.unwrap();
        assert!(matches!(wf.cancel(e.uuid, UserId(2)).await, Err(Error::NotFound(_))));
        wf.cancel(e.uuid, UserId(1)).await.unwrap();
        assert!(index.enrollment(e.uuid).is_none());

        let e = wf.draft(profile("foo", EntityKind::Bot), &actor(1)).await.unwrap();
        wf.submit(e.uuid).await.unwrap();
        assert!(matches!(wf.cancel(e.uuid, UserId(1)).await, Err(Error::AlreadySubmitted(_))));
    }
}
