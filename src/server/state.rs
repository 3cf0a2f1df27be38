use crate::application::{DraftStore, OutboxWorker, PublishService, QuotaLedger};
use crate::infrastructure::{
    AppConfig, HttpFunctionsClient, HttpModerationClient, PostgresAccountRepository,
    PostgresDraftRepository, PostgresListingRepository, PostgresNotificationRepository,
    PostgresOutboxRepository, PostgresScheduledPostRepository,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

pub type QuotaLedgerType = QuotaLedger<PostgresAccountRepository, PostgresListingRepository>;

pub type DraftStoreType = DraftStore<PostgresDraftRepository, PostgresNotificationRepository>;

pub type PublishServiceType = PublishService<
    PostgresAccountRepository,
    PostgresListingRepository,
    PostgresDraftRepository,
    PostgresNotificationRepository,
    PostgresOutboxRepository,
    HttpModerationClient,
>;

pub type OutboxWorkerType = OutboxWorker<
    PostgresOutboxRepository,
    PostgresScheduledPostRepository,
    HttpFunctionsClient,
    HttpFunctionsClient,
>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub account_repo: Arc<PostgresAccountRepository>,
    pub listing_repo: Arc<PostgresListingRepository>,
    pub notification_repo: Arc<PostgresNotificationRepository>,
    pub quota: Arc<QuotaLedgerType>,
    pub drafts: Arc<DraftStoreType>,
    pub publisher: Arc<PublishServiceType>,
    pub outbox: Arc<OutboxWorkerType>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let moderator = Arc::new(
        HttpModerationClient::new(config.moderation_url.clone(), &config.functions_token)
            .context("init moderation client")?,
    );
    let functions = Arc::new(
        HttpFunctionsClient::new(config.functions_url.clone(), &config.functions_token)
            .context("init functions client")?,
    );

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let listing_repo = Arc::new(PostgresListingRepository::new(pool.clone()));
    let draft_repo = Arc::new(PostgresDraftRepository::new(pool.clone()));
    let notification_repo = Arc::new(PostgresNotificationRepository::new(pool.clone()));
    let outbox_repo = Arc::new(PostgresOutboxRepository::new(pool.clone()));
    let post_repo = Arc::new(PostgresScheduledPostRepository::new(pool.clone()));

    let quota = Arc::new(QuotaLedger::new(account_repo.clone(), listing_repo.clone()));
    let drafts = Arc::new(DraftStore::new(
        draft_repo.clone(),
        notification_repo.clone(),
    ));

    let publisher = Arc::new(PublishService::new(
        quota.clone(),
        listing_repo.clone(),
        draft_repo.clone(),
        notification_repo.clone(),
        outbox_repo.clone(),
        moderator,
        config.listing_base_url.clone(),
    ));

    let outbox = Arc::new(OutboxWorker::new(
        outbox_repo,
        post_repo,
        functions.clone(),
        functions,
        config.social_window_days,
        config.outbox_max_attempts,
    ));

    Ok(AppState {
        pool,
        account_repo,
        listing_repo,
        notification_repo,
        quota,
        drafts,
        publisher,
        outbox,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
