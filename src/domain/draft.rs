use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// In-progress listing content, persisted so users do not lose work.
/// Upserted by autosave and deleted outright once published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub id: Uuid,
    pub account_id: Uuid,
    pub category: String,
    pub content: serde_json::Value,
    pub last_saved: DateTime<Utc>,
}

impl Draft {
    pub fn new(account_id: Uuid, category: String, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            category,
            content,
            last_saved: Utc::now(),
        }
    }
}
