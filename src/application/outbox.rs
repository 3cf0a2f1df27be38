use crate::domain::{OutboxTask, ScheduledPost, TaskKind};
use crate::infrastructure::{
    EmailSender, FunctionsError, OutboxRepository, RepositoryError, ScheduledPostRepository,
    SocialPostGenerator,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Function error: {0}")]
    Functions(#[from] FunctionsError),
    #[error("Invalid task payload for {0}")]
    InvalidPayload(Uuid),
}

const DRAIN_BATCH: i64 = 20;
const RETRY_DELAY_SECS: i64 = 60;

/// Consumes deferred publish side effects. Runs independently of the publish
/// transaction: a task that keeps failing ends up `failed` in the store,
/// where it is observable, instead of silently vanishing.
pub struct OutboxWorker<O, S, G, E>
where
    O: OutboxRepository,
    S: ScheduledPostRepository,
    G: SocialPostGenerator,
    E: EmailSender,
{
    outbox_repo: Arc<O>,
    post_repo: Arc<S>,
    generator: Arc<G>,
    email: Arc<E>,
    social_window_days: i64,
    max_attempts: i32,
}

impl<O, S, G, E> OutboxWorker<O, S, G, E>
where
    O: OutboxRepository,
    S: ScheduledPostRepository,
    G: SocialPostGenerator,
    E: EmailSender,
{
    pub fn new(
        outbox_repo: Arc<O>,
        post_repo: Arc<S>,
        generator: Arc<G>,
        email: Arc<E>,
        social_window_days: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            outbox_repo,
            post_repo,
            generator,
            email,
            social_window_days,
            max_attempts,
        }
    }

    /// Poll loop for the standalone server. Never returns.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain(Utc::now()).await {
                warn!(error = %e, "Outbox drain failed");
            }
        }
    }

    /// Execute everything due at `now`. Per-task failures are absorbed into
    /// retry bookkeeping; only a failure to read the queue surfaces.
    pub async fn drain(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let tasks = self.outbox_repo.due(now, DRAIN_BATCH).await?;
        let count = tasks.len();

        for task in tasks {
            self.execute(task, now).await;
        }

        Ok(count)
    }

    async fn execute(&self, task: OutboxTask, now: DateTime<Utc>) {
        let result = match task.kind {
            TaskKind::SocialPosts => self.run_social_posts(&task, now).await,
            TaskKind::Email => self.run_email(&task).await,
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.outbox_repo.mark_done(task.id).await {
                    warn!(task_id = %task.id, error = %e, "Failed to mark task done");
                }
            }
            Err(e) => {
                let attempts = task.attempts + 1;
                if attempts >= self.max_attempts {
                    warn!(task_id = %task.id, attempts, error = %e, "Task failed permanently");
                    if let Err(e) = self.outbox_repo.mark_failed(task.id, attempts).await {
                        warn!(task_id = %task.id, error = %e, "Failed to mark task failed");
                    }
                } else {
                    warn!(task_id = %task.id, attempts, error = %e, "Task failed, rescheduling");
                    let run_at = now + ChronoDuration::seconds(RETRY_DELAY_SECS * attempts as i64);
                    if let Err(e) = self.outbox_repo.reschedule(task.id, attempts, run_at).await {
                        warn!(task_id = %task.id, error = %e, "Failed to reschedule task");
                    }
                }
            }
        }
    }

    /// Generate social-post drafts for the listing and spread them over the
    /// scheduling window at randomized times.
    async fn run_social_posts(
        &self,
        task: &OutboxTask,
        now: DateTime<Utc>,
    ) -> Result<(), OutboxError> {
        let listing = task.listing().ok_or(OutboxError::InvalidPayload(task.id))?;
        let drafts = self.generator.generate(&listing).await?;

        let window_minutes = self.social_window_days * 24 * 60;
        let posts: Vec<ScheduledPost> = {
            let mut rng = rand::thread_rng();
            drafts
                .into_iter()
                .map(|draft| ScheduledPost {
                    id: Uuid::new_v4(),
                    listing_id: listing.id,
                    platform: draft.platform,
                    caption: draft.caption,
                    hashtags: draft.hashtags,
                    publish_at: now + ChronoDuration::minutes(rng.gen_range(0..window_minutes)),
                })
                .collect()
        };

        for post in &posts {
            self.post_repo.create(post).await?;
        }

        info!(
            listing_id = %listing.id,
            posts = posts.len(),
            "Scheduled social posts"
        );
        Ok(())
    }

    async fn run_email(&self, task: &OutboxTask) -> Result<(), OutboxError> {
        let payload = task
            .email_payload()
            .ok_or(OutboxError::InvalidPayload(task.id))?;

        self.email
            .send_listing_published(&payload.to, &payload.listing_title, &payload.listing_url)
            .await?;

        info!(to = %payload.to, "Sent listing_published email");
        Ok(())
    }
}
