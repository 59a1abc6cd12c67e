use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

/// Paid-access flags stored on the user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntitlement {
    pub user_id: Uuid,
    pub is_paid: bool,
    /// `None` together with `is_paid` means perpetual access.
    pub subscription_expires_at: Option<NaiveDateTime>,
}

impl UserEntitlement {
    pub fn is_perpetual(&self) -> bool {
        self.is_paid && self.subscription_expires_at.is_none()
    }
}

/// Longest access period a single purchase can carry.
pub const MAX_DURATION_DAYS: i32 = 3650;

pub fn is_valid_duration_days(duration_days: i32) -> bool {
    (1..=MAX_DURATION_DAYS).contains(&duration_days)
}

/// Compute a new expiry when `duration_days` are added to an entitlement.
///
/// An entitlement that is still running is extended from its current expiry;
/// an expired or missing one starts counting from `now`.
/// Returns `None` if the result is outside the representable date range.
pub fn extend_expiry(
    current: Option<NaiveDateTime>,
    now: NaiveDateTime,
    duration_days: i32,
) -> Option<NaiveDateTime> {
    let base = match current {
        Some(expires_at) if expires_at > now => expires_at,
        _ => now,
    };
    base.checked_add_signed(Duration::days(i64::from(duration_days)))
}
