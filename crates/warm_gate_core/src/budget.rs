use std::time::Duration;

/// Share of the remaining budget an application invocation may use before it
/// is asked to abort.
pub const SOFT_DEADLINE_NUMERATOR: u32 = 3;
pub const SOFT_DEADLINE_DENOMINATOR: u32 = 4;

/// Soft deadline measured from now: 75% of the time left before the platform's
/// hard deadline.
pub fn soft_deadline(remaining_budget: Duration) -> Duration {
    remaining_budget * SOFT_DEADLINE_NUMERATOR / SOFT_DEADLINE_DENOMINATOR
}

/// Time left until `deadline_epoch_ms`, or zero when it has already passed.
pub fn remaining_until(deadline_epoch_ms: u64, now_epoch_ms: u64) -> Duration {
    Duration::from_millis(deadline_epoch_ms.saturating_sub(now_epoch_ms))
}
