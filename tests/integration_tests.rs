//! Integration tests for listing-gate: credit accounting, listing quotas,
//! the publish gate, draft autosave debouncing, and the outbox worker.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use listing_gate::{
    application::{DraftAutosaver, DraftStore, OutboxWorker, PublishError, PublishService, QuotaLedger},
    domain::{
        Account, Draft, Listing, ListingContent, ModerationRequest, ModerationVerdict,
        Notification, OutboxTask, PlanTier, ScheduledPost, SocialPostDraft, TaskKind, TaskStatus,
    },
    infrastructure::{
        AccountRepository, ContentModerator, DraftRepository, EmailSender, FunctionsError,
        ListingRepository, ModerationError, NotificationRepository, OutboxRepository,
        RepositoryError, ScheduledPostRepository, SocialPostGenerator,
    },
};
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Mock Repositories for Testing
// ============================================================================

/// In-memory mock implementation of AccountRepository. The conditional
/// decrement happens under one lock, mirroring the single-statement UPDATE
/// of the Postgres implementation.
#[derive(Clone, Default)]
struct MockAccountRepository {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
}

impl MockAccountRepository {
    fn seed(&self, account: &Account) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id, account.clone());
    }

    fn credits(&self, id: Uuid) -> i32 {
        self.accounts.lock().unwrap().get(&id).map(|a| a.ai_credits).unwrap_or(-1)
    }
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&account.id) {
            return Err(RepositoryError::InvalidData(
                "Account already exists".to_string(),
            ));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        self.accounts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.external_id == external_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", external_id)))
    }

    async fn update_plan(&self, id: Uuid, plan: PlanTier) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.plan = plan;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn grant_ai_credits(&self, id: Uuid, amount: i32) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.ai_credits += amount;
        Ok(())
    }

    async fn try_consume_ai_credit(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        if account.ai_credits > 0 {
            account.ai_credits -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// In-memory mock implementation of ListingRepository, including the unique
/// constraint on `source_draft_id`.
#[derive(Clone, Default)]
struct MockListingRepository {
    listings: Arc<Mutex<Vec<Listing>>>,
}

impl MockListingRepository {
    fn seed_created_at(&self, account_id: Uuid, count: usize, created_at: DateTime<Utc>) {
        let mut listings = self.listings.lock().unwrap();
        for i in 0..count {
            let mut listing = Listing::from_content(
                account_id,
                &ListingContent {
                    title: format!("Seeded listing {}", i),
                    description: "seed".to_string(),
                    tags: vec![],
                    category: "misc".to_string(),
                    price_cents: 100,
                    metadata: serde_json::Value::Null,
                },
                None,
            );
            listing.created_at = created_at;
            listings.push(listing);
        }
    }

    fn all(&self) -> Vec<Listing> {
        self.listings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingRepository for MockListingRepository {
    async fn create(&self, listing: &Listing) -> Result<(), RepositoryError> {
        let mut listings = self.listings.lock().unwrap();
        if let Some(draft_id) = listing.source_draft_id {
            if listings.iter().any(|l| l.source_draft_id == Some(draft_id)) {
                return Err(RepositoryError::Conflict(format!(
                    "Draft {} already published",
                    draft_id
                )));
            }
        }
        listings.push(listing.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Listing, RepositoryError> {
        self.listings
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Listing {}", id)))
    }

    async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<Listing>, RepositoryError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn count_created_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.account_id == account_id && l.created_at >= since)
            .count() as i64)
    }
}

/// In-memory mock implementation of DraftRepository
#[derive(Clone, Default)]
struct MockDraftRepository {
    drafts: Arc<Mutex<HashMap<Uuid, Draft>>>,
}

impl MockDraftRepository {
    fn count(&self) -> usize {
        self.drafts.lock().unwrap().len()
    }

    fn get(&self, id: Uuid) -> Option<Draft> {
        self.drafts.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl DraftRepository for MockDraftRepository {
    async fn insert(&self, draft: &Draft) -> Result<(), RepositoryError> {
        self.drafts.lock().unwrap().insert(draft.id, draft.clone());
        Ok(())
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut drafts = self.drafts.lock().unwrap();
        let draft = drafts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Draft {}", id)))?;
        draft.content = content.clone();
        draft.last_saved = Utc::now();
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Draft, RepositoryError> {
        self.drafts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Draft {}", id)))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.drafts.lock().unwrap().remove(&id).is_some())
    }
}

/// In-memory mock implementation of NotificationRepository
#[derive(Clone, Default)]
struct MockNotificationRepository {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl MockNotificationRepository {
    fn of_kind(&self, kind: &str) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationRepository for MockNotificationRepository {
    async fn record(&self, notification: &Notification) -> Result<(), RepositoryError> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn list_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Notification>, RepositoryError> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.account_id == account_id)
            .cloned()
            .collect())
    }
}

/// In-memory mock implementation of OutboxRepository
#[derive(Clone, Default)]
struct MockOutboxRepository {
    tasks: Arc<Mutex<HashMap<Uuid, OutboxTask>>>,
}

impl MockOutboxRepository {
    fn of_kind(&self, kind: TaskKind) -> Vec<OutboxTask> {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect()
    }

    fn get(&self, id: Uuid) -> Option<OutboxTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl OutboxRepository for MockOutboxRepository {
    async fn enqueue(&self, task: &OutboxTask) -> Result<(), RepositoryError> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxTask>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.run_at <= now)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_done(&self, id: Uuid) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.status = TaskStatus::Done;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        run_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.attempts = attempts;
            task.run_at = run_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i32) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.status = TaskStatus::Failed;
            task.attempts = attempts;
        }
        Ok(())
    }
}

/// In-memory mock implementation of ScheduledPostRepository
#[derive(Clone, Default)]
struct MockScheduledPostRepository {
    posts: Arc<Mutex<Vec<ScheduledPost>>>,
}

impl MockScheduledPostRepository {
    fn all(&self) -> Vec<ScheduledPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduledPostRepository for MockScheduledPostRepository {
    async fn create(&self, post: &ScheduledPost) -> Result<(), RepositoryError> {
        self.posts.lock().unwrap().push(post.clone());
        Ok(())
    }

    async fn list_by_listing(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<ScheduledPost>, RepositoryError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.listing_id == listing_id)
            .cloned()
            .collect())
    }
}

mock! {
    pub Moderator {}

    #[async_trait]
    impl ContentModerator for Moderator {
        async fn review(
            &self,
            request: &ModerationRequest,
        ) -> Result<ModerationVerdict, ModerationError>;
    }
}

/// Stub social-post generator returning a fixed set of drafts.
#[derive(Clone)]
struct StubGenerator {
    fail: bool,
}

#[async_trait]
impl SocialPostGenerator for StubGenerator {
    async fn generate(&self, _listing: &Listing) -> Result<Vec<SocialPostDraft>, FunctionsError> {
        if self.fail {
            return Err(FunctionsError::RequestFailed("generator down".to_string()));
        }
        Ok(vec![
            SocialPostDraft {
                platform: "instagram".to_string(),
                caption: "Fresh find".to_string(),
                hashtags: vec!["#market".to_string()],
            },
            SocialPostDraft {
                platform: "facebook".to_string(),
                caption: "Now available".to_string(),
                hashtags: vec![],
            },
        ])
    }
}

/// Stub email sender that records sends and can be told to fail.
#[derive(Clone, Default)]
struct StubEmailSender {
    fail: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EmailSender for StubEmailSender {
    async fn send_listing_published(
        &self,
        to: &str,
        _listing_title: &str,
        _listing_url: &str,
    ) -> Result<(), FunctionsError> {
        if self.fail {
            return Err(FunctionsError::RequestFailed("smtp down".to_string()));
        }
        self.sent.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

// ============================================================================
// Test harness
// ============================================================================

type TestPublisher = PublishService<
    MockAccountRepository,
    MockListingRepository,
    MockDraftRepository,
    MockNotificationRepository,
    MockOutboxRepository,
    MockModerator,
>;

struct Harness {
    account_repo: Arc<MockAccountRepository>,
    listing_repo: Arc<MockListingRepository>,
    draft_repo: Arc<MockDraftRepository>,
    notification_repo: Arc<MockNotificationRepository>,
    outbox_repo: Arc<MockOutboxRepository>,
    quota: Arc<QuotaLedger<MockAccountRepository, MockListingRepository>>,
    publisher: TestPublisher,
}

fn harness(moderator: MockModerator) -> Harness {
    let account_repo = Arc::new(MockAccountRepository::default());
    let listing_repo = Arc::new(MockListingRepository::default());
    let draft_repo = Arc::new(MockDraftRepository::default());
    let notification_repo = Arc::new(MockNotificationRepository::default());
    let outbox_repo = Arc::new(MockOutboxRepository::default());
    let quota = Arc::new(QuotaLedger::new(account_repo.clone(), listing_repo.clone()));

    let publisher = PublishService::new(
        quota.clone(),
        listing_repo.clone(),
        draft_repo.clone(),
        notification_repo.clone(),
        outbox_repo.clone(),
        Arc::new(moderator),
        "https://market.example.com".to_string(),
    );

    Harness {
        account_repo,
        listing_repo,
        draft_repo,
        notification_repo,
        outbox_repo,
        quota,
        publisher,
    }
}

fn account(plan: PlanTier, ai_credits: i32) -> Account {
    let mut account = Account::new(
        format!("user-{}", Uuid::new_v4()),
        Some("seller@example.com".to_string()),
        plan,
    );
    account.ai_credits = ai_credits;
    account
}

fn content(title: &str) -> ListingContent {
    ListingContent {
        title: title.to_string(),
        description: "A perfectly ordinary description".to_string(),
        tags: vec!["test".to_string()],
        category: "misc".to_string(),
        price_cents: 1500,
        metadata: serde_json::Value::Null,
    }
}

// ============================================================================
// Quota ledger: AI credits
// ============================================================================

#[tokio::test]
async fn unlimited_plans_never_touch_the_credit_counter() {
    let h = harness(MockModerator::new());
    for plan in [PlanTier::Pro, PlanTier::Business] {
        let acct = account(plan, 0);
        h.account_repo.seed(&acct);

        assert!(h.quota.check_ai_credits(&acct));
        assert!(h.quota.use_ai_credit(&acct).await);
        assert!(h.quota.use_ai_credit(&acct).await);
        assert_eq!(h.account_repo.credits(acct.id), 0);
    }
}

#[tokio::test]
async fn metered_plan_with_zero_credits_is_refused_and_stays_at_zero() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Free, 0);
    h.account_repo.seed(&acct);

    assert!(!h.quota.check_ai_credits(&acct));
    assert!(!h.quota.use_ai_credit(&acct).await);
    assert_eq!(h.account_repo.credits(acct.id), 0);
}

#[tokio::test]
async fn sequential_credit_spends_drain_exactly_to_zero() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Basic, 3);
    h.account_repo.seed(&acct);

    for _ in 0..3 {
        assert!(h.quota.use_ai_credit(&acct).await);
    }
    assert_eq!(h.account_repo.credits(acct.id), 0);
    assert!(!h.quota.use_ai_credit(&acct).await);
    assert_eq!(h.account_repo.credits(acct.id), 0);
}

#[tokio::test]
async fn concurrent_spend_of_last_credit_succeeds_exactly_once() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Free, 1);
    h.account_repo.seed(&acct);

    let (a, b) = tokio::join!(
        {
            let quota = h.quota.clone();
            let acct = acct.clone();
            tokio::spawn(async move { quota.use_ai_credit(&acct).await })
        },
        {
            let quota = h.quota.clone();
            let acct = acct.clone();
            tokio::spawn(async move { quota.use_ai_credit(&acct).await })
        }
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a ^ b, "exactly one of the two spends may succeed");
    assert_eq!(h.account_repo.credits(acct.id), 0);
}

#[tokio::test]
async fn plan_upgrade_and_credit_grants_take_effect() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Free, 0);
    h.account_repo.seed(&acct);

    assert!(!h.quota.use_ai_credit(&acct).await);

    h.account_repo
        .grant_ai_credits(acct.id, 25)
        .await
        .unwrap();
    let refreshed = h.account_repo.get_by_id(acct.id).await.unwrap();
    assert!(h.quota.use_ai_credit(&refreshed).await);
    assert_eq!(h.account_repo.credits(acct.id), 24);

    // After upgrading to an unmetered tier the counter is irrelevant.
    h.account_repo
        .update_plan(acct.id, PlanTier::Pro)
        .await
        .unwrap();
    let upgraded = h.account_repo.get_by_id(acct.id).await.unwrap();
    assert!(h.quota.use_ai_credit(&upgraded).await);
    assert_eq!(h.account_repo.credits(acct.id), 24);
}

// ============================================================================
// Quota ledger: monthly listings
// ============================================================================

#[tokio::test]
async fn basic_plan_listing_quota_boundary_at_twenty() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Basic, 0);
    h.account_repo.seed(&acct);

    h.listing_repo.seed_created_at(acct.id, 19, Utc::now());
    assert!(h.quota.check_listing_quota(&acct).await);

    h.listing_repo.seed_created_at(acct.id, 1, Utc::now());
    assert!(!h.quota.check_listing_quota(&acct).await);
}

#[tokio::test]
async fn prior_month_listings_do_not_count_against_quota() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Free, 0);
    h.account_repo.seed(&acct);

    // Well before the first of this month regardless of today's date.
    h.listing_repo
        .seed_created_at(acct.id, 50, Utc::now() - ChronoDuration::days(40));
    assert!(h.quota.check_listing_quota(&acct).await);

    h.listing_repo.seed_created_at(acct.id, 5, Utc::now());
    assert!(!h.quota.check_listing_quota(&acct).await);
}

#[tokio::test]
async fn pro_plan_has_no_listing_ceiling() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Pro, 0);
    h.account_repo.seed(&acct);

    h.listing_repo.seed_created_at(acct.id, 500, Utc::now());
    assert!(h.quota.check_listing_quota(&acct).await);
}

#[tokio::test]
async fn business_plan_keeps_the_default_listing_ceiling() {
    let h = harness(MockModerator::new());
    let acct = account(PlanTier::Business, 0);
    h.account_repo.seed(&acct);

    h.listing_repo.seed_created_at(acct.id, 4, Utc::now());
    assert!(h.quota.check_listing_quota(&acct).await);

    h.listing_repo.seed_created_at(acct.id, 1, Utc::now());
    assert!(!h.quota.check_listing_quota(&acct).await);

    // AI stays unmetered on this tier even with the listing ceiling hit.
    assert!(h.quota.use_ai_credit(&acct).await);
}

// ============================================================================
// Publisher
// ============================================================================

#[tokio::test]
async fn rejected_moderation_never_creates_a_listing() {
    let mut moderator = MockModerator::new();
    moderator.expect_review().returning(|_| {
        Ok(ModerationVerdict {
            approved: false,
            reason: Some("prohibited item".to_string()),
            category_match: false,
            suggested_category: Some("collectibles".to_string()),
        })
    });
    let h = harness(moderator);
    let acct = account(PlanTier::Pro, 0);
    h.account_repo.seed(&acct);

    let err = h
        .publisher
        .publish(&acct, content("Suspicious item"), None)
        .await
        .unwrap_err();

    match err {
        PublishError::Rejected {
            reason,
            suggested_category,
        } => {
            assert_eq!(reason, "prohibited item");
            assert_eq!(suggested_category.as_deref(), Some("collectibles"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert!(h.listing_repo.all().is_empty());
    assert!(h.notification_repo.of_kind("listing_published").is_empty());
}

#[tokio::test]
async fn exhausted_quota_short_circuits_before_moderation() {
    let mut moderator = MockModerator::new();
    moderator.expect_review().times(0);
    let h = harness(moderator);

    let acct = account(PlanTier::Free, 0);
    h.account_repo.seed(&acct);
    h.listing_repo.seed_created_at(acct.id, 5, Utc::now());

    let err = h
        .publisher
        .publish(&acct, content("One too many"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::QuotaExceeded(5)));
    assert_eq!(h.listing_repo.all().len(), 5);
}

#[tokio::test]
async fn successful_publish_commits_listing_and_clears_draft() {
    let mut moderator = MockModerator::new();
    moderator
        .expect_review()
        .returning(|_| Ok(ModerationVerdict::approved()));
    let h = harness(moderator);

    let acct = account(PlanTier::Basic, 0);
    h.account_repo.seed(&acct);

    let draft = Draft::new(
        acct.id,
        "misc".to_string(),
        serde_json::json!({"title": "Old bike"}),
    );
    h.draft_repo.insert(&draft).await.unwrap();

    let outcome = h
        .publisher
        .publish(&acct, content("Old bike"), Some(draft.id))
        .await
        .unwrap();

    // Exactly one listing, draft gone, notification recorded.
    let listings = h.listing_repo.all();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].id, outcome.listing.id);
    assert_eq!(listings[0].source_draft_id, Some(draft.id));
    assert_eq!(h.draft_repo.count(), 0);
    assert_eq!(h.notification_repo.of_kind("listing_published").len(), 1);

    // Side effects queued: one social-posts task, one email task.
    assert_eq!(h.outbox_repo.of_kind(TaskKind::SocialPosts).len(), 1);
    assert_eq!(h.outbox_repo.of_kind(TaskKind::Email).len(), 1);
}

#[tokio::test]
async fn republishing_the_same_draft_conflicts() {
    let mut moderator = MockModerator::new();
    moderator
        .expect_review()
        .returning(|_| Ok(ModerationVerdict::approved()));
    let h = harness(moderator);

    let acct = account(PlanTier::Pro, 0);
    h.account_repo.seed(&acct);
    let draft_id = Uuid::new_v4();

    h.publisher
        .publish(&acct, content("First attempt"), Some(draft_id))
        .await
        .unwrap();
    let err = h
        .publisher
        .publish(&acct, content("Double click"), Some(draft_id))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::AlreadyPublished));
    assert_eq!(h.listing_repo.all().len(), 1);
}

#[tokio::test]
async fn moderation_outage_aborts_publish_and_preserves_draft() {
    let mut moderator = MockModerator::new();
    moderator
        .expect_review()
        .returning(|_| Err(ModerationError::RequestFailed("timeout".to_string())));
    let h = harness(moderator);

    let acct = account(PlanTier::Pro, 0);
    h.account_repo.seed(&acct);
    let draft = Draft::new(acct.id, "misc".to_string(), serde_json::json!({}));
    h.draft_repo.insert(&draft).await.unwrap();

    let err = h
        .publisher
        .publish(&acct, content("Unlucky timing"), Some(draft.id))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Moderation(_)));
    assert!(h.listing_repo.all().is_empty());
    assert_eq!(h.draft_repo.count(), 1, "draft must survive for retry");
}

#[tokio::test]
async fn approved_with_category_mismatch_passes_hint_through() {
    let mut moderator = MockModerator::new();
    moderator.expect_review().returning(|_| {
        Ok(ModerationVerdict {
            approved: true,
            reason: None,
            category_match: false,
            suggested_category: Some("furniture".to_string()),
        })
    });
    let h = harness(moderator);
    let acct = account(PlanTier::Pro, 0);
    h.account_repo.seed(&acct);

    let outcome = h
        .publisher
        .publish(&acct, content("Oak shelf"), None)
        .await
        .unwrap();

    assert_eq!(outcome.category_hint.as_deref(), Some("furniture"));
    assert_eq!(h.listing_repo.all().len(), 1);
}

/// The end-to-end scenario from the product: free plan, one AI credit, four
/// listings this month. Generate (credit drains to 0), autosave, publish.
#[tokio::test(start_paused = true)]
async fn free_plan_generate_edit_publish_scenario() {
    let mut moderator = MockModerator::new();
    moderator
        .expect_review()
        .returning(|_| Ok(ModerationVerdict::approved()));
    let h = harness(moderator);

    let acct = account(PlanTier::Free, 1);
    h.account_repo.seed(&acct);
    h.listing_repo.seed_created_at(acct.id, 4, Utc::now());

    // AI generation consumes the last credit.
    assert!(h.quota.check_ai_credits(&acct));
    assert!(h.quota.use_ai_credit(&acct).await);
    assert_eq!(h.account_repo.credits(acct.id), 0);

    // Edit with debounced autosave; one save fires after the quiet period.
    let store = Arc::new(DraftStore::new(
        h.draft_repo.clone(),
        h.notification_repo.clone(),
    ));
    let autosaver = DraftAutosaver::with_quiet_period(
        store,
        acct.id,
        "misc".to_string(),
        Duration::from_millis(2000),
    );
    autosaver.debounced_save(serde_json::json!({"title": "Old bike"}));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let draft_id = autosaver.draft_id().await.expect("autosave fired");

    // Publish: quota passes (4 < 5), moderation approves.
    let outcome = h
        .publisher
        .publish(&acct, content("Old bike"), Some(draft_id))
        .await
        .unwrap();

    assert_eq!(h.listing_repo.all().len(), 5);
    assert_eq!(h.draft_repo.count(), 0);
    assert_eq!(h.account_repo.credits(acct.id), 0);
    assert_eq!(h.notification_repo.of_kind("listing_published").len(), 1);
    assert_eq!(h.outbox_repo.of_kind(TaskKind::SocialPosts).len(), 1);
    assert_eq!(outcome.listing.account_id, acct.id);
}

// ============================================================================
// Draft autosave debouncing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn three_rapid_saves_produce_one_write_with_final_content() {
    let draft_repo = Arc::new(MockDraftRepository::default());
    let notification_repo = Arc::new(MockNotificationRepository::default());
    let store = Arc::new(DraftStore::new(draft_repo.clone(), notification_repo.clone()));
    let account_id = Uuid::new_v4();
    let autosaver = DraftAutosaver::with_quiet_period(
        store,
        account_id,
        "misc".to_string(),
        Duration::from_millis(2000),
    );

    autosaver.debounced_save(serde_json::json!({"title": "O"}));
    tokio::time::sleep(Duration::from_millis(500)).await;
    autosaver.debounced_save(serde_json::json!({"title": "Old"}));
    tokio::time::sleep(Duration::from_millis(500)).await;
    autosaver.debounced_save(serde_json::json!({"title": "Old bike"}));

    // Quiet period elapses only after the final call.
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(draft_repo.count(), 1);
    let draft_id = autosaver.draft_id().await.unwrap();
    let draft = draft_repo.get(draft_id).unwrap();
    assert_eq!(draft.content["title"], "Old bike");
    // First creation emits the saved notification exactly once.
    assert_eq!(notification_repo.of_kind("draft_saved").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn later_bursts_update_the_same_draft() {
    let draft_repo = Arc::new(MockDraftRepository::default());
    let notification_repo = Arc::new(MockNotificationRepository::default());
    let store = Arc::new(DraftStore::new(draft_repo.clone(), notification_repo.clone()));
    let autosaver = DraftAutosaver::with_quiet_period(
        store,
        Uuid::new_v4(),
        "misc".to_string(),
        Duration::from_millis(2000),
    );

    autosaver.debounced_save(serde_json::json!({"v": 1}));
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let first_id = autosaver.draft_id().await.unwrap();

    autosaver.debounced_save(serde_json::json!({"v": 2}));
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(draft_repo.count(), 1);
    assert_eq!(autosaver.draft_id().await, Some(first_id));
    assert_eq!(draft_repo.get(first_id).unwrap().content["v"], 2);
    assert_eq!(notification_repo.of_kind("draft_saved").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_saves_immediately_and_cancels_pending_timer() {
    let draft_repo = Arc::new(MockDraftRepository::default());
    let notification_repo = Arc::new(MockNotificationRepository::default());
    let store = Arc::new(DraftStore::new(draft_repo.clone(), notification_repo));
    let autosaver = DraftAutosaver::with_quiet_period(
        store,
        Uuid::new_v4(),
        "misc".to_string(),
        Duration::from_millis(2000),
    );

    autosaver.debounced_save(serde_json::json!({"title": "stale"}));
    let id = autosaver.flush(serde_json::json!({"title": "final"})).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(draft_repo.count(), 1);
    assert_eq!(draft_repo.get(id).unwrap().content["title"], "final");
}

// ============================================================================
// Outbox worker
// ============================================================================

fn worker(
    outbox_repo: Arc<MockOutboxRepository>,
    post_repo: Arc<MockScheduledPostRepository>,
    generator_fails: bool,
    email_fails: bool,
) -> (
    OutboxWorker<MockOutboxRepository, MockScheduledPostRepository, StubGenerator, StubEmailSender>,
    StubEmailSender,
) {
    let email = StubEmailSender {
        fail: email_fails,
        sent: Arc::new(Mutex::new(Vec::new())),
    };
    (
        OutboxWorker::new(
            outbox_repo,
            post_repo,
            Arc::new(StubGenerator {
                fail: generator_fails,
            }),
            Arc::new(email.clone()),
            7,
            3,
        ),
        email,
    )
}

fn sample_listing() -> Listing {
    Listing::from_content(Uuid::new_v4(), &content("Old bike"), None)
}

#[tokio::test]
async fn social_task_schedules_posts_within_the_window() {
    let outbox_repo = Arc::new(MockOutboxRepository::default());
    let post_repo = Arc::new(MockScheduledPostRepository::default());
    let (worker, _) = worker(outbox_repo.clone(), post_repo.clone(), false, false);

    let listing = sample_listing();
    let task = OutboxTask::social_posts(&listing);
    outbox_repo.enqueue(&task).await.unwrap();

    let now = Utc::now();
    let drained = worker.drain(now).await.unwrap();
    assert_eq!(drained, 1);

    let posts = post_repo.all();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post.listing_id, listing.id);
        assert!(post.publish_at >= now);
        assert!(post.publish_at <= now + ChronoDuration::days(7));
    }
    assert_eq!(outbox_repo.get(task.id).unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn email_task_sends_to_the_seller() {
    let outbox_repo = Arc::new(MockOutboxRepository::default());
    let post_repo = Arc::new(MockScheduledPostRepository::default());
    let (worker, email) = worker(outbox_repo.clone(), post_repo, false, false);

    let task = OutboxTask::email(&listing_gate::domain::EmailTaskPayload {
        to: "seller@example.com".to_string(),
        listing_title: "Old bike".to_string(),
        listing_url: "https://market.example.com/listings/x".to_string(),
    });
    outbox_repo.enqueue(&task).await.unwrap();

    worker.drain(Utc::now()).await.unwrap();

    assert_eq!(email.sent.lock().unwrap().as_slice(), ["seller@example.com"]);
    assert_eq!(outbox_repo.get(task.id).unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn failing_task_is_retried_then_marked_failed() {
    let outbox_repo = Arc::new(MockOutboxRepository::default());
    let post_repo = Arc::new(MockScheduledPostRepository::default());
    let (worker, _) = worker(outbox_repo.clone(), post_repo.clone(), true, false);

    let task = OutboxTask::social_posts(&sample_listing());
    outbox_repo.enqueue(&task).await.unwrap();

    // First two failures reschedule with incremented attempts.
    let mut now = Utc::now();
    worker.drain(now).await.unwrap();
    let after_first = outbox_repo.get(task.id).unwrap();
    assert_eq!(after_first.status, TaskStatus::Pending);
    assert_eq!(after_first.attempts, 1);
    assert!(after_first.run_at > now);

    now = after_first.run_at;
    worker.drain(now).await.unwrap();
    let after_second = outbox_repo.get(task.id).unwrap();
    assert_eq!(after_second.attempts, 2);

    // Third failure exhausts the allowed attempts.
    worker.drain(after_second.run_at).await.unwrap();
    let after_third = outbox_repo.get(task.id).unwrap();
    assert_eq!(after_third.status, TaskStatus::Failed);
    assert_eq!(after_third.attempts, 3);
    assert!(post_repo.all().is_empty());
}

#[tokio::test]
async fn tasks_are_not_picked_up_before_their_run_time() {
    let outbox_repo = Arc::new(MockOutboxRepository::default());
    let post_repo = Arc::new(MockScheduledPostRepository::default());
    let (worker, _) = worker(outbox_repo.clone(), post_repo, false, false);

    let mut task = OutboxTask::social_posts(&sample_listing());
    task.run_at = Utc::now() + ChronoDuration::hours(1);
    outbox_repo.enqueue(&task).await.unwrap();

    let drained = worker.drain(Utc::now()).await.unwrap();
    assert_eq!(drained, 0);
    assert_eq!(
        outbox_repo.get(task.id).unwrap().status,
        TaskStatus::Pending
    );
}
