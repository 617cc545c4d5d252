//! Public bulletin channel side of the event fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    catalog::RecordCatalog,
    domain::{ChatId, MessageId, MessageRef, Record},
    events::{DomainEvent, EventSubscriber, EventTopic},
    messaging::port::ChatGateway,
    replies::ReplyCatalog,
    views, Result,
};

const TOPICS: &[EventTopic] = &[
    EventTopic::RecordPublished,
    EventTopic::RecordUpdated,
    EventTopic::RecordDeleted,
];

/// Announces records in the bulletin channel and keeps those posts in sync.
pub struct BulletinPublisher {
    gateway: Arc<dyn ChatGateway>,
    catalog: Arc<RecordCatalog>,
    replies: Arc<ReplyCatalog>,
    channel: ChatId,
}

impl BulletinPublisher {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        catalog: Arc<RecordCatalog>,
        replies: Arc<ReplyCatalog>,
        channel: ChatId,
    ) -> Self {
        Self {
            gateway,
            catalog,
            replies,
            channel,
        }
    }

    fn message(&self, id: MessageId) -> MessageRef {
        MessageRef {
            chat_id: self.channel,
            message_id: id,
        }
    }

    async fn published(&self, record: Record) -> Result<()> {
        // Re-delivery after the post went out finds the id already stored.
        let current = self.catalog.get(record.uuid).await?;
        if record.bulletin_message_id.is_some()
            || current.as_ref().and_then(|r| r.bulletin_message_id).is_some()
        {
            debug!(uuid = %record.uuid, "Bulletin post already exists");
            return Ok(());
        }
        if current.is_none() {
            debug!(uuid = %record.uuid, "Record removed before it was announced");
            return Ok(());
        }

        let sent = self
            .gateway
            .send_message(self.channel, &views::record_detail(&record), None)
            .await?;
        let attached = self
            .catalog
            .attach_bulletin(record.uuid, sent.message_id)
            .await?;
        if attached.is_none() {
            // Removed while the post was in flight; its delete event carried no post.
            warn!(uuid = %record.uuid, "Record removed during announcement, retracting post");
            let text = self.replies.lookup("record-removed");
            return self.gateway.edit_message(sent, text, None).await;
        }
        info!(uuid = %record.uuid, message_id = sent.message_id.0, "Bulletin posted");
        Ok(())
    }

    async fn updated(&self, record: Record) -> Result<()> {
        let Some(id) = record.bulletin_message_id else {
            warn!(uuid = %record.uuid, "Updated record has no bulletin post");
            return Ok(());
        };
        self.gateway
            .edit_message(self.message(id), &views::record_detail(&record), None)
            .await
    }

    async fn deleted(&self, record: Record) -> Result<()> {
        let Some(id) = record.bulletin_message_id else {
            warn!(uuid = %record.uuid, "Deleted record has no bulletin post");
            return Ok(());
        };
        let text = self.replies.lookup("record-removed");
        self.gateway.edit_message(self.message(id), text, None).await
    }
}

#[async_trait]
impl EventSubscriber for BulletinPublisher {
    fn name(&self) -> &'static str {
        "bulletin"
    }

    fn topics(&self) -> &[EventTopic] {
        TOPICS
    }

    async fn handle(&self, event: DomainEvent) -> Result<()> {
        match event {
            DomainEvent::RecordPublished(record) => self.published(record).await,
            DomainEvent::RecordUpdated(record) => self.updated(record).await,
            DomainEvent::RecordDeleted { record, .. } => self.deleted(record).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::EventBus,
        testing::{record, FakeGateway, MemoryIndex},
    };

    const CHANNEL: ChatId = ChatId(-1000);

    fn setup() -> (Arc<FakeGateway>, Arc<MemoryIndex>, Arc<RecordCatalog>, BulletinPublisher) {
        let gw = Arc::new(FakeGateway::default());
        let index = Arc::new(MemoryIndex::default());
        let catalog = Arc::new(RecordCatalog::new(index.clone(), Arc::new(EventBus::new())));
        let publisher = BulletinPublisher::new(
            gw.clone(),
            catalog.clone(),
            Arc::new(ReplyCatalog::default()),
            CHANNEL,
        );
        (gw, index, catalog, publisher)
    }

    #[tokio::test]
    async fn publish_posts_once_and_attaches_message_id() {
        let (gw, index, catalog, publisher) = setup();
        let r = catalog.publish(record("Foo")).await.unwrap();

        publisher.handle(DomainEvent::RecordPublished(r.clone())).await.unwrap();
        publisher.handle(DomainEvent::RecordPublished(r.clone())).await.unwrap();

        let posts = gw.sent_to(CHANNEL);
        assert_eq!(posts.len(), 1);
        assert_eq!(
            index.record(r.uuid).unwrap().bulletin_message_id,
            Some(posts[0].message.message_id)
        );
    }

    #[tokio::test]
    async fn update_and_delete_edit_the_post() {
        let (gw, index, catalog, publisher) = setup();
        let r = catalog.publish(record("Foo")).await.unwrap();
        publisher.handle(DomainEvent::RecordPublished(r.clone())).await.unwrap();
        let stored = index.record(r.uuid).unwrap();

        let mut changed = stored.clone();
        changed.title = "Foo 2".into();
        publisher.handle(DomainEvent::RecordUpdated(changed)).await.unwrap();
        publisher
            .handle(DomainEvent::RecordDeleted {
                record: stored.clone(),
                actor: crate::testing::actor(1),
            })
            .await
            .unwrap();

        let edits = gw.edits();
        assert_eq!(edits.len(), 2);
        assert!(edits[0].html.contains("Foo 2"));
        assert_eq!(edits[1].html, "This entry has been removed from the directory.");
        assert!(edits[1].keyboard.is_none());
        assert_eq!(edits[1].message.message_id, stored.bulletin_message_id.unwrap());
    }

    #[tokio::test]
    async fn post_is_retracted_when_record_vanishes_mid_announcement() {
        let (gw, index, catalog, publisher) = setup();
        let r = catalog.publish(record("Foo")).await.unwrap();
        let uuid = r.uuid;
        let hook_index = index.clone();
        gw.on_send(move || {
            hook_index.remove_record(uuid);
        });

        publisher.handle(DomainEvent::RecordPublished(r)).await.unwrap();

        let posts = gw.sent_to(CHANNEL);
        assert_eq!(posts.len(), 1);
        let edits = gw.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message, posts[0].message);
        assert_eq!(edits[0].html, "This entry has been removed from the directory.");
        assert!(index.record(uuid).is_none());
    }

    #[tokio::test]
    async fn records_without_a_post_are_skipped() {
        let (gw, _, _, publisher) = setup();
        publisher.handle(DomainEvent::RecordUpdated(record("Foo"))).await.unwrap();
        // Never inserted into the catalog: nothing to announce.
        publisher.handle(DomainEvent::RecordPublished(record("Bar"))).await.unwrap();
        assert!(gw.edits().is_empty());
        assert!(gw.sent_to(CHANNEL).is_empty());
    }
}
