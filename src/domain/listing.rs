use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub account_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub status: ListingStatus,
    pub metadata: serde_json::Value,
    /// Draft this listing was published from. UNIQUE in storage, so a draft
    /// can be turned into at most one listing.
    pub source_draft_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Suspended,
    Archived,
}

/// Candidate listing content as submitted for publishing. Tags travel with
/// the content for moderation but are folded into `metadata` on commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingContent {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
    pub price_cents: i64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Listing {
    /// The publish path always creates listings as `active`; later status
    /// transitions belong to other flows and never happen here.
    pub fn from_content(
        account_id: Uuid,
        content: &ListingContent,
        source_draft_id: Option<Uuid>,
    ) -> Self {
        let mut metadata = content.metadata.clone();
        if !content.tags.is_empty() {
            if let serde_json::Value::Object(ref mut map) = metadata {
                map.insert("tags".to_string(), serde_json::json!(content.tags));
            } else if metadata.is_null() {
                metadata = serde_json::json!({ "tags": content.tags });
            }
        }

        Self {
            id: Uuid::new_v4(),
            account_id,
            title: content.title.clone(),
            description: content.description.clone(),
            category: content.category.clone(),
            price_cents: content.price_cents,
            status: ListingStatus::Active,
            metadata,
            source_draft_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> ListingContent {
        ListingContent {
            title: "Vintage desk lamp".to_string(),
            description: "Brass, rewired".to_string(),
            tags: vec!["vintage".to_string(), "lighting".to_string()],
            category: "furniture".to_string(),
            price_cents: 4500,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn new_listings_start_active_with_tags_in_metadata() {
        let account_id = Uuid::new_v4();
        let listing = Listing::from_content(account_id, &content(), None);

        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.account_id, account_id);
        assert_eq!(listing.metadata["tags"][0], "vintage");
        assert!(listing.source_draft_id.is_none());
    }

    #[test]
    fn source_draft_id_is_carried() {
        let draft_id = Uuid::new_v4();
        let listing = Listing::from_content(Uuid::new_v4(), &content(), Some(draft_id));
        assert_eq!(listing.source_draft_id, Some(draft_id));
    }
}
