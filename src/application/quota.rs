use crate::domain::Account;
use crate::infrastructure::{AccountRepository, ListingRepository, RepositoryError};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum QuotaError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Answers "may this account consume one more unit" for AI credits and
/// monthly listings. Backing-store failures are logged and answered `false`:
/// a quota that cannot be verified blocks the privileged action.
pub struct QuotaLedger<A, L>
where
    A: AccountRepository,
    L: ListingRepository,
{
    account_repo: Arc<A>,
    listing_repo: Arc<L>,
}

impl<A, L> QuotaLedger<A, L>
where
    A: AccountRepository,
    L: ListingRepository,
{
    pub fn new(account_repo: Arc<A>, listing_repo: Arc<L>) -> Self {
        Self {
            account_repo,
            listing_repo,
        }
    }

    /// Side-effect-free credit check against the account snapshot.
    pub fn check_ai_credits(&self, account: &Account) -> bool {
        account.plan.ai_unlimited() || account.ai_credits > 0
    }

    /// Consume one AI credit. Unmetered plans succeed without touching the
    /// counter; metered plans go through the store's atomic conditional
    /// decrement, so two concurrent calls can never both spend the last
    /// credit or drive the counter negative.
    pub async fn use_ai_credit(&self, account: &Account) -> bool {
        if account.plan.ai_unlimited() {
            return true;
        }

        match self.account_repo.try_consume_ai_credit(account.id).await {
            Ok(consumed) => consumed,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Credit decrement failed, denying");
                false
            }
        }
    }

    /// True iff the account may create one more listing this calendar month.
    pub async fn check_listing_quota(&self, account: &Account) -> bool {
        let limit = match account.plan.monthly_listing_limit() {
            Some(limit) => limit,
            None => return true,
        };

        let since = first_of_month(Utc::now());
        match self
            .listing_repo
            .count_created_since(account.id, since)
            .await
        {
            Ok(count) => count < limit,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Listing count failed, denying");
                false
            }
        }
    }

    /// Read model for the UI's usage/upgrade surfaces.
    pub async fn quota_status(&self, account: &Account) -> Result<QuotaStatus, QuotaError> {
        let monthly_used = self
            .listing_repo
            .count_created_since(account.id, first_of_month(Utc::now()))
            .await?;

        Ok(QuotaStatus {
            plan: account.plan.to_string(),
            ai_unlimited: account.plan.ai_unlimited(),
            ai_credits: account.ai_credits,
            monthly_listings_used: monthly_used,
            monthly_listing_limit: account.plan.monthly_listing_limit(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub plan: String,
    pub ai_unlimited: bool,
    pub ai_credits: i32,
    pub monthly_listings_used: i64,
    pub monthly_listing_limit: Option<i64>,
}

/// First instant of the month `now` falls in.
pub fn first_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn first_of_month_truncates_day_and_time() {
        assert_eq!(first_of_month(utc(2024, 3, 17, 13)), utc(2024, 3, 1, 0));
        assert_eq!(first_of_month(utc(2024, 12, 31, 23)), utc(2024, 12, 1, 0));
    }

    #[test]
    fn first_of_month_is_identity_on_boundary() {
        let boundary = utc(2024, 7, 1, 0);
        assert_eq!(first_of_month(boundary), boundary);
    }
}
