use crate::domain::{
    Account, Draft, Listing, ListingStatus, Notification, OutboxTask, PlanTier, ScheduledPost,
    TaskKind, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    #[must_use]
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn update_plan(&self, id: Uuid, plan: PlanTier) -> Result<(), RepositoryError>;
    #[must_use]
    async fn grant_ai_credits(&self, id: Uuid, amount: i32) -> Result<(), RepositoryError>;
    /// Consume one AI credit with a single conditional update. Returns true
    /// iff a credit remained and was decremented. The counter can never go
    /// negative because the predicate and the write are one statement.
    #[must_use]
    async fn try_consume_ai_credit(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Insert a new listing. A duplicate `source_draft_id` is reported as
    /// `Conflict`: at most one listing per draft, enforced by the store.
    #[must_use]
    async fn create(&self, listing: &Listing) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Listing, RepositoryError>;
    #[must_use]
    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Listing>, RepositoryError>;
    /// Count listings created by the account at or after `since`. The quota
    /// ledger passes the first instant of the current month.
    #[must_use]
    async fn count_created_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    #[must_use]
    async fn insert(&self, draft: &Draft) -> Result<(), RepositoryError>;
    #[must_use]
    async fn update_content(
        &self,
        id: Uuid,
        content: &serde_json::Value,
    ) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Draft, RepositoryError>;
    /// Delete the row outright. Returns true iff a row was removed.
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    #[must_use]
    async fn record(&self, notification: &Notification) -> Result<(), RepositoryError>;
    #[must_use]
    async fn list_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Notification>, RepositoryError>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    #[must_use]
    async fn enqueue(&self, task: &OutboxTask) -> Result<(), RepositoryError>;
    #[must_use]
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxTask>, RepositoryError>;
    #[must_use]
    async fn mark_done(&self, id: Uuid) -> Result<(), RepositoryError>;
    #[must_use]
    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    #[must_use]
    async fn mark_failed(&self, id: Uuid, attempts: i32) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ScheduledPostRepository: Send + Sync {
    #[must_use]
    async fn create(&self, post: &ScheduledPost) -> Result<(), RepositoryError>;
    #[must_use]
    async fn list_by_listing(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<ScheduledPost>, RepositoryError>;
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, external_id, email, plan, ai_credits, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id)
        .bind(&account.external_id)
        .bind(&account.email)
        .bind(account.plan.to_string())
        .bind(account.ai_credits)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, email, plan, ai_credits, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Account {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, email, plan, ai_credits, created_at, updated_at
            FROM accounts
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                RepositoryError::NotFound(format!("Account {}", external_id))
            }
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn update_plan(&self, id: Uuid, plan: PlanTier) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET plan = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(plan.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn grant_ai_credits(&self, id: Uuid, amount: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET ai_credits = ai_credits + $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_consume_ai_credit(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET ai_credits = ai_credits - 1, updated_at = $1
            WHERE id = $2 AND ai_credits > 0
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let plan_str: String = row.try_get("plan")?;
    let plan = PlanTier::from_str(&plan_str)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown plan: {}", plan_str)))?;

    Ok(Account {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        plan,
        ai_credits: row.try_get("ai_credits")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresListingRepository {
    pool: PgPool,
}

impl PostgresListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingRepository for PostgresListingRepository {
    async fn create(&self, listing: &Listing) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, account_id, title, description, category, price_cents,
                                  status, metadata, source_draft_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(listing.id)
        .bind(listing.account_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(&listing.category)
        .bind(listing.price_cents)
        .bind(listing.status.to_string())
        .bind(&listing.metadata)
        .bind(listing.source_draft_id)
        .bind(listing.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("Draft {:?} already published", listing.source_draft_id),
            ),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Listing, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, title, description, category, price_cents,
                   status, metadata, source_draft_id, created_at
            FROM listings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Listing {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_listing(&row)
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Listing>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, title, description, category, price_cents,
                   status, metadata, source_draft_id, created_at
            FROM listings
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_listing).collect()
    }

    async fn count_created_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM listings
            WHERE account_id = $1 AND created_at >= $2
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

fn row_to_listing(row: &sqlx::postgres::PgRow) -> Result<Listing, RepositoryError> {
    let status_str: String = row.try_get("status")?;
    let status = ListingStatus::from_str(&status_str)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status_str)))?;

    Ok(Listing {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price_cents: row.try_get("price_cents")?,
        status,
        metadata: row.try_get("metadata")?,
        source_draft_id: row.try_get("source_draft_id")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresDraftRepository {
    pool: PgPool,
}

impl PostgresDraftRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DraftRepository for PostgresDraftRepository {
    async fn insert(&self, draft: &Draft) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO drafts (id, account_id, category, content, last_saved)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(draft.id)
        .bind(draft.account_id)
        .bind(&draft.category)
        .bind(&draft.content)
        .bind(draft.last_saved)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE drafts
            SET content = $1, last_saved = $2
            WHERE id = $3
            "#,
        )
        .bind(content)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Draft {}", id)));
        }

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Draft, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, category, content, last_saved
            FROM drafts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Draft {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(Draft {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            category: row.try_get("category")?,
            content: row.try_get("content")?,
            last_saved: row.try_get("last_saved")?,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM drafts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn record(&self, notification: &Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, account_id, kind, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.id)
        .bind(notification.account_id)
        .bind(&notification.kind)
        .bind(&notification.payload)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, kind, payload, created_at
            FROM notifications
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Notification {
                    id: row.try_get("id")?,
                    account_id: row.try_get("account_id")?,
                    kind: row.try_get("kind")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn enqueue(&self, task: &OutboxTask) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_tasks (id, kind, payload, run_at, attempts, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.id)
        .bind(task.kind.to_string())
        .bind(&task.payload)
        .bind(task.run_at)
        .bind(task.attempts)
        .bind(task.status.to_string())
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxTask>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, payload, run_at, attempts, status, created_at
            FROM outbox_tasks
            WHERE status = 'pending' AND run_at <= $1
            ORDER BY run_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn mark_done(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE outbox_tasks
            SET status = 'done'
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE outbox_tasks
            SET attempts = $1, run_at = $2
            WHERE id = $3
            "#,
        )
        .bind(attempts)
        .bind(run_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE outbox_tasks
            SET status = 'failed', attempts = $1
            WHERE id = $2
            "#,
        )
        .bind(attempts)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<OutboxTask, RepositoryError> {
    let kind_str: String = row.try_get("kind")?;
    let status_str: String = row.try_get("status")?;

    Ok(OutboxTask {
        id: row.try_get("id")?,
        kind: TaskKind::from_str(&kind_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown kind: {}", kind_str)))?,
        payload: row.try_get("payload")?,
        run_at: row.try_get("run_at")?,
        attempts: row.try_get("attempts")?,
        status: TaskStatus::from_str(&status_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status_str)))?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresScheduledPostRepository {
    pool: PgPool,
}

impl PostgresScheduledPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledPostRepository for PostgresScheduledPostRepository {
    async fn create(&self, post: &ScheduledPost) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_posts (id, listing_id, platform, caption, hashtags, publish_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(post.id)
        .bind(post.listing_id)
        .bind(&post.platform)
        .bind(&post.caption)
        .bind(&post.hashtags)
        .bind(post.publish_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_listing(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<ScheduledPost>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, listing_id, platform, caption, hashtags, publish_at
            FROM scheduled_posts
            WHERE listing_id = $1
            ORDER BY publish_at
            "#,
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ScheduledPost {
                    id: row.try_get("id")?,
                    listing_id: row.try_get("listing_id")?,
                    platform: row.try_get("platform")?,
                    caption: row.try_get("caption")?,
                    hashtags: row.try_get("hashtags")?,
                    publish_at: row.try_get("publish_at")?,
                })
            })
            .collect()
    }
}
