use crate::application::QuotaLedger;
use crate::domain::{
    Account, EmailTaskPayload, Listing, ListingContent, ModerationRequest, Notification,
    OutboxTask,
};
use crate::infrastructure::{
    AccountRepository, ContentModerator, DraftRepository, ListingRepository, ModerationError,
    NotificationRepository, OutboxRepository, RepositoryError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Monthly listing limit reached ({0})")]
    QuotaExceeded(i64),
    #[error("Listing rejected by moderation: {reason}")]
    Rejected {
        reason: String,
        suggested_category: Option<String>,
    },
    #[error("Draft was already published")]
    AlreadyPublished,
    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub listing: Listing,
    /// Non-blocking category suggestion from the moderator, passed through
    /// when the declared category did not match.
    pub category_hint: Option<String>,
}

/// The single orchestration point for turning candidate content into a
/// listing. Invariant: no listing exists that was not both quota-permitted
/// and moderation-approved at creation time.
pub struct PublishService<A, L, D, N, O, M>
where
    A: AccountRepository,
    L: ListingRepository,
    D: DraftRepository,
    N: NotificationRepository,
    O: OutboxRepository,
    M: ContentModerator,
{
    quota: Arc<QuotaLedger<A, L>>,
    listing_repo: Arc<L>,
    draft_repo: Arc<D>,
    notification_repo: Arc<N>,
    outbox_repo: Arc<O>,
    moderator: Arc<M>,
    listing_base_url: String,
}

impl<A, L, D, N, O, M> PublishService<A, L, D, N, O, M>
where
    A: AccountRepository,
    L: ListingRepository,
    D: DraftRepository,
    N: NotificationRepository,
    O: OutboxRepository,
    M: ContentModerator,
{
    pub fn new(
        quota: Arc<QuotaLedger<A, L>>,
        listing_repo: Arc<L>,
        draft_repo: Arc<D>,
        notification_repo: Arc<N>,
        outbox_repo: Arc<O>,
        moderator: Arc<M>,
        listing_base_url: String,
    ) -> Self {
        Self {
            quota,
            listing_repo,
            draft_repo,
            notification_repo,
            outbox_repo,
            moderator,
            listing_base_url,
        }
    }

    /// Quota check, moderation, commit, then best-effort side effects, in
    /// that order. Steps up to the listing insert abort atomically: a
    /// rejection or infrastructure failure leaves no partial state and the
    /// draft intact for retry. Everything after the insert is logged on
    /// failure and never surfaced.
    pub async fn publish(
        &self,
        account: &Account,
        content: ListingContent,
        draft_id: Option<Uuid>,
    ) -> Result<PublishOutcome, PublishError> {
        // Short-circuits before the moderation network call.
        if !self.quota.check_listing_quota(account).await {
            let limit = account.plan.monthly_listing_limit().unwrap_or(0);
            info!(account_id = %account.id, limit, "Publish blocked: listing quota");
            return Err(PublishError::QuotaExceeded(limit));
        }

        let request = ModerationRequest::from_content(account.id, &content, draft_id);
        let verdict = self.moderator.review(&request).await?;
        info!(
            account_id = %account.id,
            approved = verdict.approved,
            category_match = verdict.category_match,
            reason = verdict.reason.as_deref().unwrap_or(""),
            "Moderation verdict"
        );

        let category_hint = if verdict.category_match {
            None
        } else {
            verdict.suggested_category
        };

        if !verdict.approved {
            return Err(PublishError::Rejected {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "Content was rejected".to_string()),
                suggested_category: category_hint,
            });
        }

        let listing = Listing::from_content(account.id, &content, draft_id);
        self.listing_repo
            .create(&listing)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => PublishError::AlreadyPublished,
                other => PublishError::Repository(other),
            })?;
        info!(listing_id = %listing.id, account_id = %account.id, "Listing published");

        self.run_post_commit_steps(account, &listing, draft_id).await;

        Ok(PublishOutcome {
            listing,
            category_hint,
        })
    }

    /// Steps 5-7: the listing is already committed and valid, so nothing
    /// here may fail the publish or roll it back.
    async fn run_post_commit_steps(
        &self,
        account: &Account,
        listing: &Listing,
        draft_id: Option<Uuid>,
    ) {
        let notification = Notification::new(
            account.id,
            "listing_published",
            serde_json::json!({ "listing_id": listing.id, "title": listing.title }),
        );
        if let Err(e) = self.notification_repo.record(&notification).await {
            warn!(listing_id = %listing.id, error = %e, "Failed to record publish notification");
        }

        if let Some(id) = draft_id {
            match self.draft_repo.delete(id).await {
                Ok(true) => {}
                Ok(false) => warn!(draft_id = %id, "Draft was already gone at publish"),
                Err(e) => warn!(draft_id = %id, error = %e, "Failed to delete draft"),
            }
        }

        if let Err(e) = self
            .outbox_repo
            .enqueue(&OutboxTask::social_posts(listing))
            .await
        {
            warn!(listing_id = %listing.id, error = %e, "Failed to enqueue social-post task");
        }

        if let Some(email) = &account.email {
            let payload = EmailTaskPayload {
                to: email.clone(),
                listing_title: listing.title.clone(),
                listing_url: format!("{}/listings/{}", self.listing_base_url, listing.id),
            };
            if let Err(e) = self.outbox_repo.enqueue(&OutboxTask::email(&payload)).await {
                warn!(listing_id = %listing.id, error = %e, "Failed to enqueue email task");
            }
        }
    }
}
