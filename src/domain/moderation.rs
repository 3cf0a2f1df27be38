use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ListingContent;

/// Payload sent to the external moderation classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationRequest {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
    pub price_cents: i64,
    pub account_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<Uuid>,
}

/// The classifier's decision. Transient: logged for audit, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationVerdict {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub category_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_category: Option<String>,
}

impl ModerationRequest {
    pub fn from_content(
        account_id: Uuid,
        content: &ListingContent,
        draft_id: Option<Uuid>,
    ) -> Self {
        Self {
            title: content.title.clone(),
            description: content.description.clone(),
            tags: content.tags.clone(),
            category: content.category.clone(),
            price_cents: content.price_cents,
            account_id,
            draft_id,
        }
    }
}

impl ModerationVerdict {
    pub fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
            category_match: true,
            suggested_category: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            category_match: true,
            suggested_category: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_deserializes_with_optional_fields_absent() {
        let verdict: ModerationVerdict =
            serde_json::from_str(r#"{"approved": true, "category_match": true}"#).unwrap();
        assert!(verdict.approved);
        assert!(verdict.reason.is_none());
        assert!(verdict.suggested_category.is_none());
    }

    #[test]
    fn verdict_deserializes_rejection_with_suggestion() {
        let verdict: ModerationVerdict = serde_json::from_str(
            r#"{"approved": false, "reason": "prohibited item", "category_match": false, "suggested_category": "collectibles"}"#,
        )
        .unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.reason.as_deref(), Some("prohibited item"));
        assert_eq!(verdict.suggested_category.as_deref(), Some("collectibles"));
    }
}
