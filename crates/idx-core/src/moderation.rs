//! Moderator group side of the event fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    domain::{Actor, ChatId, Record},
    events::{DomainEvent, EventSubscriber, EventTopic},
    formatting::escape_html,
    messaging::{port::ChatGateway, types::Markup},
    replies::ReplyCatalog,
    views, Result,
};

const TOPICS: &[EventTopic] = &[
    EventTopic::EnrollSubmitted,
    EventTopic::EnrollDecided,
    EventTopic::RecordDeleted,
    EventTopic::FeedbackReceived,
];

/// Posts approval cards, decisions, removals and feedback to the moderator
/// group, and tells submitters how their submission was decided.
pub struct ModerationConsole {
    gateway: Arc<dyn ChatGateway>,
    replies: Arc<ReplyCatalog>,
    group: ChatId,
}

impl ModerationConsole {
    pub fn new(gateway: Arc<dyn ChatGateway>, replies: Arc<ReplyCatalog>, group: ChatId) -> Self {
        Self {
            gateway,
            replies,
            group,
        }
    }

    async fn post(&self, html: &str, markup: Option<Markup>) -> Result<()> {
        self.gateway.send_message(self.group, html, markup).await?;
        Ok(())
    }

    async fn record_deleted(&self, record: &Record, actor: &Actor) -> Result<()> {
        let text = escape_html(&self.replies.render(
            "remove-record-manager",
            &[("manager", &actor.display_name), ("record", &record.title)],
        ));
        self.post(&text, None).await?;
        if actor.id != record.created_by {
            let text = escape_html(
                &self
                    .replies
                    .render("remove-record-user", &[("record", &record.title)]),
            );
            self.gateway
                .send_message(ChatId::from(record.created_by), &text, None)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for ModerationConsole {
    fn name(&self) -> &'static str {
        "moderation"
    }

    fn topics(&self) -> &[EventTopic] {
        TOPICS
    }

    async fn handle(&self, event: DomainEvent) -> Result<()> {
        match event {
            DomainEvent::EnrollSubmitted(e) => {
                let keyboard = views::approve_keyboard(e.uuid);
                self.post(&views::approval_card(&e), Some(Markup::Inline(keyboard)))
                    .await?;
                info!(uuid = %e.uuid, "Approval card posted");
            }
            DomainEvent::EnrollDecided {
                enrollment,
                moderator,
                passed,
            } => {
                let keyboard = views::decision_keyboard(enrollment.uuid, passed);
                self.post(
                    &views::decision_card(&enrollment, &moderator, passed),
                    Some(Markup::Inline(keyboard)),
                )
                .await?;

                let key = if passed {
                    "approve-pass-user"
                } else {
                    "approve-fail-user"
                };
                let text = escape_html(&self.replies.render(key, &[("title", &enrollment.title)]));
                self.gateway
                    .send_message(ChatId::from(enrollment.created_by), &text, None)
                    .await?;
            }
            DomainEvent::RecordDeleted { record, actor } => {
                self.record_deleted(&record, &actor).await?;
            }
            DomainEvent::FeedbackReceived {
                record,
                from,
                content,
            } => {
                let keyboard = views::remove_keyboard(record.uuid);
                self.post(
                    &views::feedback_card(&record, &from, &content),
                    Some(Markup::Inline(keyboard)),
                )
                .await?;
            }
            DomainEvent::RecordPublished(_) | DomainEvent::RecordUpdated(_) => {}
        }
        Ok(())
    }
}
