use crate::domain::{Draft, Notification};
use crate::infrastructure::{DraftRepository, NotificationRepository, RepositoryError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Durable persistence of in-progress listing content.
pub struct DraftStore<D, N>
where
    D: DraftRepository,
    N: NotificationRepository,
{
    draft_repo: Arc<D>,
    notification_repo: Arc<N>,
}

impl<D, N> DraftStore<D, N>
where
    D: DraftRepository,
    N: NotificationRepository,
{
    pub fn new(draft_repo: Arc<D>, notification_repo: Arc<N>) -> Self {
        Self {
            draft_repo,
            notification_repo,
        }
    }

    /// Insert on first save, update thereafter. The `draft_saved`
    /// notification is emitted on creation only; a failed notification write
    /// never fails the save.
    pub async fn save_draft(
        &self,
        account_id: Uuid,
        category: &str,
        content: serde_json::Value,
        existing: Option<Uuid>,
    ) -> Result<Uuid, DraftError> {
        if let Some(id) = existing {
            self.draft_repo.update_content(id, &content).await?;
            return Ok(id);
        }

        let draft = Draft::new(account_id, category.to_string(), content);
        self.draft_repo.insert(&draft).await?;

        let notification = Notification::new(
            account_id,
            "draft_saved",
            serde_json::json!({ "draft_id": draft.id, "category": category }),
        );
        if let Err(e) = self.notification_repo.record(&notification).await {
            warn!(draft_id = %draft.id, error = %e, "Failed to record draft_saved notification");
        }

        Ok(draft.id)
    }

    pub async fn get_draft(&self, id: Uuid) -> Result<Draft, DraftError> {
        Ok(self.draft_repo.get_by_id(id).await?)
    }

    pub async fn delete_draft(&self, id: Uuid) -> Result<bool, DraftError> {
        Ok(self.draft_repo.delete(id).await?)
    }
}

struct AutosaveSession {
    draft_id: Option<Uuid>,
}

/// Debounced autosave for one form session. Every call cancels the pending
/// timer and restarts the quiet period, so a burst of edits produces exactly
/// one save carrying the content of the final call. The session lock keeps
/// saves single-flight; the held draft id makes the second and later fires
/// update instead of insert.
pub struct DraftAutosaver<D, N>
where
    D: DraftRepository + 'static,
    N: NotificationRepository + 'static,
{
    store: Arc<DraftStore<D, N>>,
    account_id: Uuid,
    category: String,
    quiet: Duration,
    session: Arc<tokio::sync::Mutex<AutosaveSession>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<D, N> DraftAutosaver<D, N>
where
    D: DraftRepository + 'static,
    N: NotificationRepository + 'static,
{
    pub fn new(store: Arc<DraftStore<D, N>>, account_id: Uuid, category: String) -> Self {
        Self::with_quiet_period(store, account_id, category, Duration::from_millis(2000))
    }

    pub fn with_quiet_period(
        store: Arc<DraftStore<D, N>>,
        account_id: Uuid,
        category: String,
        quiet: Duration,
    ) -> Self {
        Self {
            store,
            account_id,
            category,
            quiet,
            session: Arc::new(tokio::sync::Mutex::new(AutosaveSession { draft_id: None })),
            pending: Mutex::new(None),
        }
    }

    /// Restart the quiet-period timer with fresh content.
    pub fn debounced_save(&self, content: serde_json::Value) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let store = self.store.clone();
        let session = self.session.clone();
        let account_id = self.account_id;
        let category = self.category.clone();
        let quiet = self.quiet;

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let mut session = session.lock().await;
            match store
                .save_draft(account_id, &category, content, session.draft_id)
                .await
            {
                Ok(id) => session.draft_id = Some(id),
                Err(e) => warn!(account_id = %account_id, error = %e, "Autosave failed"),
            }
        }));
    }

    /// Save immediately, cancelling any pending timer. Used when the form is
    /// about to publish and must not lose the last keystrokes.
    pub async fn flush(&self, content: serde_json::Value) -> Result<Uuid, DraftError> {
        {
            let mut pending = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }

        let mut session = self.session.lock().await;
        let id = self
            .store
            .save_draft(self.account_id, &self.category, content, session.draft_id)
            .await?;
        session.draft_id = Some(id);
        Ok(id)
    }

    /// Draft id held for the lifetime of this form session, if any save has
    /// completed.
    pub async fn draft_id(&self) -> Option<Uuid> {
        self.session.lock().await.draft_id
    }
}
