//! Subscription Plans
//!
//! Plan tiers and their message allowances per rolling 30-day window.
//! This table is the single source of truth for quota decisions and for
//! the texts sent back to users, so both read from here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the rolling usage window in seconds (30 days)
pub const USAGE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Enterprise,
    /// Unrecognized or missing tier - gets the most restrictive limit
    Unknown,
}

impl PlanTier {
    /// Parse a stored tier string. Anything unrecognized maps to Unknown.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "free" => PlanTier::Free,
            "basic" => PlanTier::Basic,
            "pro" => PlanTier::Pro,
            "enterprise" => PlanTier::Enterprise,
            _ => PlanTier::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
            PlanTier::Unknown => "unknown",
        }
    }

    /// Message allowance per 30-day window. `None` means unlimited.
    pub fn message_limit(&self) -> Option<i64> {
        match self {
            PlanTier::Free => Some(10),
            PlanTier::Basic => Some(100),
            PlanTier::Pro => Some(500),
            PlanTier::Enterprise => None,
            PlanTier::Unknown => Some(5),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
