//! Pool of logged-in WhatsApp account sessions for deep-link lookups.
//!
//! Shared across all concurrent jobs. Selection and the usage increment
//! happen under one lock so two jobs can never claim the same under-quota
//! account and jointly blow its daily limit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Seed shape loaded from the accounts file at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSeed {
    pub id: String,
    pub label: String,
    pub session_token: String,
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_daily_quota() -> u32 {
    200
}

fn default_active() -> bool {
    true
}

#[derive(Debug)]
struct AccountSlot {
    id: String,
    label: String,
    session_token: String,
    active: bool,
    daily_quota: u32,
    used_today: u32,
    usage_day: NaiveDate,
    rate_limited_until: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

impl AccountSlot {
    /// Usable: active, not rate-limited, and under 80% of the daily quota.
    fn available(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if let Some(until) = self.rate_limited_until {
            if now < until {
                return false;
            }
        }
        self.used_today.saturating_mul(5) < self.daily_quota.saturating_mul(4)
    }
}

/// Credentials handed out by a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedAccount {
    pub id: String,
    pub label: String,
    pub session_token: String,
}

/// Account pool. Constructed once at process start and passed by reference
/// into the providers; owns its own claim semantics.
pub struct AccountPool {
    accounts: Mutex<Vec<AccountSlot>>,
}

impl AccountPool {
    pub fn new(seeds: Vec<AccountSeed>) -> Self {
        let today = Utc::now().date_naive();
        let accounts = seeds
            .into_iter()
            .map(|seed| AccountSlot {
                id: seed.id,
                label: seed.label,
                session_token: seed.session_token,
                active: seed.active,
                daily_quota: seed.daily_quota,
                used_today: 0,
                usage_day: today,
                rate_limited_until: None,
                last_used_at: None,
            })
            .collect();
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    /// Claim the least-recently-used available account and count the use
    /// against its quota, atomically. None when every account is inactive,
    /// rate-limited or over quota.
    pub async fn claim(&self, now: DateTime<Utc>) -> Option<ClaimedAccount> {
        let mut accounts = self.accounts.lock().await;
        let today = now.date_naive();

        for slot in accounts.iter_mut() {
            if slot.usage_day != today {
                slot.usage_day = today;
                slot.used_today = 0;
            }
        }

        let slot = accounts
            .iter_mut()
            .filter(|slot| slot.available(now))
            .min_by_key(|slot| slot.last_used_at)?;

        slot.used_today += 1;
        slot.last_used_at = Some(now);
        debug!(
            account = %slot.id,
            used_today = slot.used_today,
            quota = slot.daily_quota,
            "account claimed"
        );

        Some(ClaimedAccount {
            id: slot.id.clone(),
            label: slot.label.clone(),
            session_token: slot.session_token.clone(),
        })
    }

    /// Take an account out of rotation until `until` (e.g. after an upstream
    /// 429).
    pub async fn mark_rate_limited(&self, account_id: &str, until: DateTime<Utc>) {
        let mut accounts = self.accounts.lock().await;
        if let Some(slot) = accounts.iter_mut().find(|s| s.id == account_id) {
            slot.rate_limited_until = Some(until);
            debug!(account = %account_id, until = %until, "account rate-limited");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn seed(id: &str, quota: u32) -> AccountSeed {
        AccountSeed {
            id: id.to_string(),
            label: format!("account-{id}"),
            session_token: format!("token-{id}"),
            daily_quota: quota,
            active: true,
        }
    }

    #[tokio::test]
    async fn claims_least_recently_used_first() {
        let pool = AccountPool::new(vec![seed("a", 100), seed("b", 100)]);
        let now = Utc::now();

        let first = pool.claim(now).await.unwrap();
        let second = pool.claim(now + Duration::seconds(1)).await.unwrap();

        // never-used account wins over the just-used one
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn quota_cutoff_is_eighty_percent() {
        // quota 5: available while used < 4
        let pool = AccountPool::new(vec![seed("a", 5)]);
        let now = Utc::now();

        for _ in 0..4 {
            assert!(pool.claim(now).await.is_some());
        }
        assert!(pool.claim(now).await.is_none());
    }

    #[tokio::test]
    async fn day_rollover_resets_usage() {
        let pool = AccountPool::new(vec![seed("a", 5)]);
        let now = Utc::now();

        for _ in 0..4 {
            pool.claim(now).await.unwrap();
        }
        assert!(pool.claim(now).await.is_none());
        assert!(pool.claim(now + Duration::days(1)).await.is_some());
    }

    #[tokio::test]
    async fn rate_limited_accounts_are_skipped_until_expiry() {
        let pool = AccountPool::new(vec![seed("a", 100)]);
        let now = Utc::now();

        pool.mark_rate_limited("a", now + Duration::minutes(15)).await;
        assert!(pool.claim(now).await.is_none());
        assert!(pool.claim(now + Duration::minutes(16)).await.is_some());
    }

    #[tokio::test]
    async fn inactive_accounts_never_claim() {
        let mut inactive = seed("a", 100);
        inactive.active = false;
        let pool = AccountPool::new(vec![inactive]);
        assert!(pool.claim(Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_exceed_quota() {
        // quota 10 -> at most 8 claims (80%), no matter the interleaving
        let pool = Arc::new(AccountPool::new(vec![seed("a", 10)]));
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.claim(now).await.is_some() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 8);
    }
}
