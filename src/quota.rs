//! Quota Enforcer
//!
//! Bounds each user to their plan's message allowance over a rolling
//! 30-day window. The counter is derived per request by counting raw
//! action rows; nothing is pre-aggregated.
//!
//! `check` is the plain read-then-decide form of the contract. It is
//! racy under concurrent requests from the same user: both can read
//! `used < limit` and proceed. The webhook therefore uses `reserve`,
//! which appends the action record through a guarded INSERT so the cap
//! holds no matter how many requests are in flight.

use crate::clones::CloneKind;
use crate::plans::USAGE_WINDOW_SECS;
use crate::store::{RecordStore, UserRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Action type counted against the message allowance
pub const MESSAGE_ACTION: &str = "message";

/// Outcome of a quota check
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Actions in the current window, not counting the one being decided
    pub used: i64,
    /// Plan allowance; `None` means unlimited
    pub limit: Option<i64>,
}

/// Quota enforcer over the record store
pub struct QuotaEnforcer {
    store: Arc<RecordStore>,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Read-then-decide check. Does not record anything.
    pub fn check(&self, user: &UserRecord, action: &str, now: DateTime<Utc>) -> Result<QuotaDecision> {
        let since = now.timestamp() - USAGE_WINDOW_SECS;
        let used = self.store.count_actions_since(user.id, action, since)?;

        let limit = user.plan.message_limit();
        let allowed = match limit {
            Some(limit) => used < limit,
            None => true,
        };

        Ok(QuotaDecision { allowed, used, limit })
    }

    /// Check and, if allowed, append the action record in one step.
    /// Rejected attempts append nothing. Each accepted message appends
    /// exactly one record tagged with the chosen clone.
    pub fn reserve(
        &self,
        user: &UserRecord,
        action: &str,
        clone: CloneKind,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision> {
        let at = now.timestamp();
        let since = at - USAGE_WINDOW_SECS;
        let used = self.store.count_actions_since(user.id, action, since)?;
        let limit = user.plan.message_limit();

        let allowed = match limit {
            Some(limit) => {
                self.store
                    .try_record_action(user.id, action, Some(clone), at, since, limit)?
            }
            None => {
                // Unlimited tier, nothing to guard
                self.store.record_action(user.id, action, Some(clone), at)?;
                true
            }
        };

        if !allowed {
            warn!(
                user_id = user.id,
                plan = user.plan.as_str(),
                used,
                "quota exhausted"
            );
        }

        Ok(QuotaDecision { allowed, used, limit })
    }
}
