use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub external_id: String,
    pub email: Option<String>,
    pub plan: PlanTier,
    pub ai_credits: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Business,
}

impl PlanTier {
    /// Tiers whose AI usage is not metered at all.
    pub fn ai_unlimited(&self) -> bool {
        matches!(self, PlanTier::Pro | PlanTier::Business)
    }

    /// Ceiling on listings created per calendar month. `None` means
    /// unlimited. Only `pro` lifts the ceiling; `business` buys unmetered AI,
    /// not extra listings, and stays on the default.
    pub fn monthly_listing_limit(&self) -> Option<i64> {
        match self {
            PlanTier::Pro => None,
            PlanTier::Basic => Some(20),
            PlanTier::Free | PlanTier::Business => Some(5),
        }
    }

    /// AI credits granted when an account is created on this tier.
    pub fn starting_ai_credits(&self) -> i32 {
        match self {
            PlanTier::Free => 3,
            PlanTier::Basic => 25,
            // Unmetered tiers never consult the counter.
            PlanTier::Pro | PlanTier::Business => 0,
        }
    }
}

impl Account {
    pub fn new(external_id: String, email: Option<String>, plan: PlanTier) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id,
            email,
            plan,
            ai_credits: plan.starting_ai_credits(),
            created_at: now,
            updated_at: now,
        }
    }
}
