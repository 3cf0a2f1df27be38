use crate::application::{DraftError, PublishError, QuotaError};
use crate::infrastructure::RepositoryError;
use axum::http::StatusCode;

/// Raw collaborator errors are logged by the services; handlers surface only
/// the user-facing taxonomy.
pub(super) fn map_publish_error(err: &PublishError) -> (StatusCode, serde_json::Value) {
    match err {
        PublishError::QuotaExceeded(limit) => (
            StatusCode::PAYMENT_REQUIRED,
            serde_json::json!({
                "error": format!("Monthly listing limit reached ({})", limit),
                "upgrade": true
            }),
        ),
        PublishError::Rejected {
            reason,
            suggested_category,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({
                "error": reason,
                "suggested_category": suggested_category
            }),
        ),
        PublishError::AlreadyPublished => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": "Draft was already published" }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Publish failed, please retry" }),
        ),
    }
}

pub(super) fn map_account_read_error(err: &RepositoryError) -> (StatusCode, serde_json::Value) {
    match err {
        RepositoryError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to get account" }),
        ),
    }
}

pub(super) fn map_quota_error(err: &QuotaError) -> (StatusCode, serde_json::Value) {
    match err {
        QuotaError::Repository(RepositoryError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to get quota status" }),
        ),
    }
}

pub(super) fn map_draft_error(err: &DraftError) -> (StatusCode, serde_json::Value) {
    match err {
        DraftError::Repository(RepositoryError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Draft not found" }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to save draft" }),
        ),
    }
}
