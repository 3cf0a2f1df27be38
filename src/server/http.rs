use super::http_errors::{
    map_account_read_error, map_draft_error, map_publish_error, map_quota_error,
};
use super::state::AppState;
use crate::domain::{Account, Listing, ListingContent, PlanTier};
use crate::infrastructure::{AccountRepository, ListingRepository, NotificationRepository};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/plan", post(change_plan))
        .route("/accounts/:id/credits", post(grant_credits))
        .route("/accounts/:id/quota", get(get_quota_status))
        .route("/accounts/:id/ai-credit", post(consume_ai_credit))
        .route("/accounts/:id/listings", get(list_listings))
        .route("/accounts/:id/notifications", get(list_notifications))
        .route("/drafts", post(save_draft))
        .route("/drafts/:id", delete(delete_draft))
        .route("/publish", post(publish_listing))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_plan_tier(plan: &str) -> Option<PlanTier> {
    match plan {
        "free" => Some(PlanTier::Free),
        "basic" => Some(PlanTier::Basic),
        "pro" => Some(PlanTier::Pro),
        "business" => Some(PlanTier::Business),
        _ => None,
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        create_account,
        get_account,
        change_plan,
        grant_credits,
        get_quota_status,
        consume_ai_credit,
        list_listings,
        list_notifications,
        save_draft,
        delete_draft,
        publish_listing,
    ),
    components(
        schemas(
            CreateAccountRequest,
            ChangePlanRequest,
            GrantCreditsRequest,
            AccountResponse,
            CreditResponse,
            SaveDraftRequest,
            PublishRequest,
            ListingResponse,
            HealthResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Accounts", description = "Account and quota endpoints"),
        (name = "Drafts", description = "Draft autosave endpoints"),
        (name = "Publishing", description = "Listing publish endpoints"),
    ),
    info(
        title = "Listing Gate API",
        version = "0.1.0",
        description = "Quota-gated listing publishing with moderation",
        license(name = "MIT")
    )
)]
struct ApiDoc;

/// Health check response
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Create account request
#[derive(Deserialize, ToSchema)]
struct CreateAccountRequest {
    #[schema(example = "auth0|user-123")]
    external_id: String,
    #[schema(example = "seller@example.com")]
    email: Option<String>,
    #[schema(example = "basic")]
    plan: String,
}

#[derive(Serialize, ToSchema)]
struct AccountResponse {
    id: Uuid,
    external_id: String,
    email: Option<String>,
    plan: String,
    ai_credits: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            external_id: account.external_id,
            email: account.email,
            plan: account.plan.to_string(),
            ai_credits: account.ai_credits,
            created_at: account.created_at,
        }
    }
}

/// Create a new account
#[utoipa::path(
    post,
    path = "/accounts",
    tag = "Accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created successfully", body = AccountResponse),
        (status = 400, description = "Invalid plan tier", body = Object),
        (status = 500, description = "Failed to create account", body = Object)
    )
)]
async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let plan = match parse_plan_tier(req.plan.as_str()) {
        Some(p) => p,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid plan tier",
                    "allowed": ["free", "basic", "pro", "business"]
                })),
            );
        }
    };

    let account = Account::new(req.external_id, req.email, plan);
    if let Err(e) = state.account_repo.create(&account).await {
        error!(error = %e, "Failed to create account");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "Failed to create account"})),
        );
    }

    (
        StatusCode::CREATED,
        Json(serde_json::to_value(AccountResponse::from(account)).unwrap_or_default()),
    )
}

/// Get an account by id
#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account found", body = AccountResponse),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.account_repo.get_by_id(id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::to_value(AccountResponse::from(account)).unwrap_or_default()),
        ),
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            (status, Json(body))
        }
    }
}

/// Change plan request
#[derive(Deserialize, ToSchema)]
struct ChangePlanRequest {
    #[schema(example = "pro")]
    plan: String,
}

/// Change an account's plan tier
#[utoipa::path(
    post,
    path = "/accounts/{id}/plan",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body = ChangePlanRequest,
    responses(
        (status = 200, description = "Plan updated", body = AccountResponse),
        (status = 400, description = "Invalid plan tier", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn change_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePlanRequest>,
) -> impl IntoResponse {
    let plan = match parse_plan_tier(req.plan.as_str()) {
        Some(p) => p,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid plan tier",
                    "allowed": ["free", "basic", "pro", "business"]
                })),
            );
        }
    };

    if let Err(e) = state.account_repo.update_plan(id, plan).await {
        let (status, body) = map_account_read_error(&e);
        return (status, Json(body));
    }

    match state.account_repo.get_by_id(id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::to_value(AccountResponse::from(account)).unwrap_or_default()),
        ),
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            (status, Json(body))
        }
    }
}

/// Grant credits request
#[derive(Deserialize, Validate, ToSchema)]
struct GrantCreditsRequest {
    #[validate(range(min = 1, max = 10000))]
    #[schema(example = 25)]
    amount: i32,
}

/// Grant AI credits to an account
///
/// Used by billing webhooks on plan purchases and by support tooling.
#[utoipa::path(
    post,
    path = "/accounts/{id}/credits",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body = GrantCreditsRequest,
    responses(
        (status = 200, description = "Credits granted", body = AccountResponse),
        (status = 400, description = "Invalid amount", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn grant_credits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GrantCreditsRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        );
    }

    if let Err(e) = state.account_repo.grant_ai_credits(id, req.amount).await {
        let (status, body) = map_account_read_error(&e);
        return (status, Json(body));
    }

    match state.account_repo.get_by_id(id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::to_value(AccountResponse::from(account)).unwrap_or_default()),
        ),
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            (status, Json(body))
        }
    }
}

/// Quota status for the account: credits plus monthly listing usage.
#[utoipa::path(
    get,
    path = "/accounts/{id}/quota",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Quota status", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_quota_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let account = match state.account_repo.get_by_id(id).await {
        Ok(a) => a,
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            return (status, Json(body));
        }
    };

    match state.quota.quota_status(&account).await {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::to_value(status).unwrap_or_default()),
        ),
        Err(e) => {
            error!(account_id = %id, error = %e, "Failed to compute quota status");
            let (status, body) = map_quota_error(&e);
            (status, Json(body))
        }
    }
}

#[derive(Serialize, ToSchema)]
struct CreditResponse {
    consumed: bool,
    unlimited: bool,
}

/// Consume one AI credit
///
/// Unmetered plans always succeed without touching the counter. Metered
/// plans decrement atomically; exhaustion is reported as 402.
#[utoipa::path(
    post,
    path = "/accounts/{id}/ai-credit",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Credit consumed", body = CreditResponse),
        (status = 402, description = "No credits remaining", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn consume_ai_credit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let account = match state.account_repo.get_by_id(id).await {
        Ok(a) => a,
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            return (status, Json(body));
        }
    };

    if state.quota.use_ai_credit(&account).await {
        (
            StatusCode::OK,
            Json(
                serde_json::to_value(CreditResponse {
                    consumed: true,
                    unlimited: account.plan.ai_unlimited(),
                })
                .unwrap_or_default(),
            ),
        )
    } else {
        (
            StatusCode::PAYMENT_REQUIRED,
            Json(serde_json::json!({
                "error": "No AI credits remaining",
                "upgrade": true
            })),
        )
    }
}

#[derive(Serialize, ToSchema)]
struct ListingResponse {
    id: Uuid,
    account_id: Uuid,
    title: String,
    description: String,
    category: String,
    price_cents: i64,
    status: String,
    metadata: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            id: listing.id,
            account_id: listing.account_id,
            title: listing.title,
            description: listing.description,
            category: listing.category,
            price_cents: listing.price_cents,
            status: listing.status.to_string(),
            metadata: listing.metadata,
            created_at: listing.created_at,
        }
    }
}

/// List an account's listings
#[utoipa::path(
    get,
    path = "/accounts/{id}/listings",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Listings", body = [ListingResponse]),
        (status = 500, description = "Failed to list listings", body = Object)
    )
)]
async fn list_listings(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.listing_repo.list_by_account(id).await {
        Ok(listings) => {
            let body: Vec<ListingResponse> =
                listings.into_iter().map(ListingResponse::from).collect();
            (
                StatusCode::OK,
                Json(serde_json::to_value(body).unwrap_or_default()),
            )
        }
        Err(e) => {
            error!(account_id = %id, error = %e, "Failed to list listings");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list listings"})),
            )
        }
    }
}

/// List an account's notification feed
#[utoipa::path(
    get,
    path = "/accounts/{id}/notifications",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Notifications", body = Object),
        (status = 500, description = "Failed to list notifications", body = Object)
    )
)]
async fn list_notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.notification_repo.list_by_account(id).await {
        Ok(notifications) => (
            StatusCode::OK,
            Json(serde_json::to_value(notifications).unwrap_or_default()),
        ),
        Err(e) => {
            error!(account_id = %id, error = %e, "Failed to list notifications");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list notifications"})),
            )
        }
    }
}

/// Save draft request
#[derive(Deserialize, Validate, ToSchema)]
struct SaveDraftRequest {
    account_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    category: String,
    content: serde_json::Value,
    /// Present after the first save of a form session.
    draft_id: Option<Uuid>,
}

/// Save in-progress draft content
///
/// Debouncing happens at the edge (the form session); this endpoint persists
/// immediately. Returns the draft id to carry through the session.
#[utoipa::path(
    post,
    path = "/drafts",
    tag = "Drafts",
    request_body = SaveDraftRequest,
    responses(
        (status = 200, description = "Draft saved", body = Object),
        (status = 400, description = "Invalid draft payload", body = Object),
        (status = 404, description = "Draft not found", body = Object)
    )
)]
async fn save_draft(
    State(state): State<AppState>,
    Json(req): Json<SaveDraftRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        );
    }

    match state
        .drafts
        .save_draft(req.account_id, &req.category, req.content, req.draft_id)
        .await
    {
        Ok(id) => (StatusCode::OK, Json(serde_json::json!({"draft_id": id}))),
        Err(e) => {
            let (status, body) = map_draft_error(&e);
            (status, Json(body))
        }
    }
}

/// Discard a draft
#[utoipa::path(
    delete,
    path = "/drafts/{id}",
    tag = "Drafts",
    params(("id" = Uuid, Path, description = "Draft id")),
    responses(
        (status = 204, description = "Draft deleted"),
        (status = 404, description = "Draft not found", body = Object)
    )
)]
async fn delete_draft(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.drafts.delete_draft(id).await {
        Ok(true) => (StatusCode::NO_CONTENT, Json(serde_json::json!({}))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Draft not found"})),
        ),
        Err(e) => {
            let (status, body) = map_draft_error(&e);
            (status, Json(body))
        }
    }
}

/// Publish request
#[derive(Deserialize, Validate, ToSchema)]
struct PublishRequest {
    account_id: Uuid,
    #[validate(length(min = 3, max = 140))]
    title: String,
    #[validate(length(max = 5000))]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[validate(length(min = 1, max = 64))]
    category: String,
    #[validate(range(min = 0))]
    price_cents: i64,
    #[serde(default)]
    metadata: serde_json::Value,
    draft_id: Option<Uuid>,
}

/// Publish a listing
///
/// Runs the full gate: listing quota, moderation, commit, then best-effort
/// side effects. Quota exhaustion returns 402, moderation rejection 422 with
/// the reason and an optional category suggestion.
#[utoipa::path(
    post,
    path = "/publish",
    tag = "Publishing",
    request_body = PublishRequest,
    responses(
        (status = 201, description = "Listing published", body = ListingResponse),
        (status = 400, description = "Invalid listing payload", body = Object),
        (status = 402, description = "Listing quota exhausted", body = Object),
        (status = 404, description = "Account not found", body = Object),
        (status = 409, description = "Draft already published", body = Object),
        (status = 422, description = "Rejected by moderation", body = Object),
        (status = 500, description = "Publish failed", body = Object)
    )
)]
async fn publish_listing(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        );
    }

    let account = match state.account_repo.get_by_id(req.account_id).await {
        Ok(a) => a,
        Err(e) => {
            let (status, body) = map_account_read_error(&e);
            return (status, Json(body));
        }
    };

    let content = ListingContent {
        title: req.title,
        description: req.description,
        tags: req.tags,
        category: req.category,
        price_cents: req.price_cents,
        metadata: req.metadata,
    };

    match state.publisher.publish(&account, content, req.draft_id).await {
        Ok(outcome) => {
            let mut body =
                serde_json::to_value(ListingResponse::from(outcome.listing)).unwrap_or_default();
            if let (Some(hint), serde_json::Value::Object(map)) =
                (outcome.category_hint, &mut body)
            {
                map.insert("suggested_category".to_string(), serde_json::json!(hint));
            }
            (StatusCode::CREATED, Json(body))
        }
        Err(e) => {
            let (status, body) = map_publish_error(&e);
            (status, Json(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_tier_accepts_known_tiers() {
        assert_eq!(parse_plan_tier("free"), Some(PlanTier::Free));
        assert_eq!(parse_plan_tier("basic"), Some(PlanTier::Basic));
        assert_eq!(parse_plan_tier("pro"), Some(PlanTier::Pro));
        assert_eq!(parse_plan_tier("business"), Some(PlanTier::Business));
    }

    #[test]
    fn parse_plan_tier_rejects_unknown() {
        assert!(parse_plan_tier("platinum").is_none());
        assert!(parse_plan_tier("").is_none());
    }
}
