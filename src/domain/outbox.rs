use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::domain::Listing;

/// A deferred side effect of a successful publish. Enqueued inside the
/// publish flow, executed later by the outbox worker so failures are
/// observable and retryable without touching the listing itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SocialPosts,
    Email,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

/// One auto-generated social-media post draft returned by the generation
/// function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialPostDraft {
    pub platform: String,
    pub caption: String,
    pub hashtags: Vec<String>,
}

/// A social post committed to a future publish slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledPost {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub platform: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub publish_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTaskPayload {
    pub to: String,
    pub listing_title: String,
    pub listing_url: String,
}

impl OutboxTask {
    fn new(kind: TaskKind, payload: serde_json::Value, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            run_at,
            attempts: 0,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Social-post generation runs as soon as the worker picks it up; the
    /// worker spreads the resulting posts over the scheduling window.
    pub fn social_posts(listing: &Listing) -> Self {
        Self::new(
            TaskKind::SocialPosts,
            serde_json::json!({ "listing": listing }),
            Utc::now(),
        )
    }

    pub fn email(payload: &EmailTaskPayload) -> Self {
        Self::new(
            TaskKind::Email,
            serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            Utc::now(),
        )
    }

    pub fn listing(&self) -> Option<Listing> {
        serde_json::from_value(self.payload.get("listing")?.clone()).ok()
    }

    pub fn email_payload(&self) -> Option<EmailTaskPayload> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Listing, ListingContent};

    #[test]
    fn social_task_payload_round_trips_the_listing() {
        let listing = Listing::from_content(
            Uuid::new_v4(),
            &ListingContent {
                title: "Road bike".to_string(),
                description: "54cm".to_string(),
                tags: vec![],
                category: "sports".to_string(),
                price_cents: 25000,
                metadata: serde_json::Value::Null,
            },
            None,
        );

        let task = OutboxTask::social_posts(&listing);
        assert_eq!(task.kind, TaskKind::SocialPosts);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.listing(), Some(listing));
    }

    #[test]
    fn email_task_payload_round_trips() {
        let payload = EmailTaskPayload {
            to: "seller@example.com".to_string(),
            listing_title: "Road bike".to_string(),
            listing_url: "https://market.example.com/l/abc".to_string(),
        };
        let task = OutboxTask::email(&payload);
        let back = task.email_payload().unwrap();
        assert_eq!(back.to, payload.to);
        assert_eq!(back.listing_title, payload.listing_title);
    }
}
