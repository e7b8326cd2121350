//! Per-channel send pacing.
//!
//! Two independent rules guard every channel:
//!
//! * a ceiling on consecutive sends that grows by one per month of channel
//!   age, from [`BASE_CONSECUTIVE_SENDS`] up to [`MAX_CONSECUTIVE_SENDS`];
//! * a fixed [`COOLDOWN`] between two sends.
//!
//! [`RateLimiter::evaluate`] never mutates the channel. It returns the state
//! to write back if the caller goes ahead, and [`RateLimiter::commit`]
//! applies it.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use crate::models::channel::{Channel, ThrottleState};

pub const BASE_CONSECUTIVE_SENDS: i64 = 2;
pub const MAX_CONSECUTIVE_SENDS: i64 = 6;
pub const COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const CEILING_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleReason {
    ConsecutiveSends { current: i64, allowed: i64 },
    Cooldown { elapsed_secs: i64 },
}

impl Display for ThrottleReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ThrottleReason::ConsecutiveSends { current, allowed } => {
                write!(f, "max consecutive sends reached {}/{}", current, allowed)
            }
            ThrottleReason::Cooldown { elapsed_secs } => {
                write!(f, "last send {}s ago, cooldown not elapsed", elapsed_secs)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Carries the state to persist once the caller commits to sending.
    Allow(ThrottleState),
    Throttled {
        reason: ThrottleReason,
        retry_in: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    bypass: bool,
}

impl RateLimiter {
    /// With `bypass` set, breaches are logged and then allowed.
    pub fn new(bypass: bool) -> Self {
        Self { bypass }
    }

    pub fn max_allowed_sends(channel: &Channel, now: DateTime<Utc>) -> i64 {
        (BASE_CONSECUTIVE_SENDS + channel.months_since_creation(now)).min(MAX_CONSECUTIVE_SENDS)
    }

    pub fn evaluate(&self, channel: &Channel, now: DateTime<Utc>) -> Verdict {
        let current = &channel.throttle;
        let mut next = current.clone();

        match current.consecutive_sends {
            None => next.consecutive_sends = Some(BASE_CONSECUTIVE_SENDS),
            Some(sent) => {
                let allowed = Self::max_allowed_sends(channel, now);
                if sent >= allowed {
                    let reason = ThrottleReason::ConsecutiveSends {
                        current: sent,
                        allowed,
                    };
                    if !self.bypass {
                        return Verdict::Throttled {
                            reason,
                            retry_in: CEILING_RETRY_DELAY,
                        };
                    }
                    warn!(channel = %channel.instance_name, %reason, "Throttle bypassed");
                } else {
                    next.consecutive_sends = Some(sent + 1);
                }
            }
        }

        match current.last_send_time {
            None => next.last_send_time = Some(now),
            Some(last_send) => {
                let elapsed = now - last_send;
                if elapsed < cooldown() {
                    let reason = ThrottleReason::Cooldown {
                        elapsed_secs: elapsed.num_seconds(),
                    };
                    if !self.bypass {
                        return Verdict::Throttled {
                            reason,
                            retry_in: remaining_cooldown(elapsed),
                        };
                    }
                    warn!(channel = %channel.instance_name, %reason, "Throttle bypassed");
                } else {
                    next.last_send_time = Some(now);
                }
            }
        }

        Verdict::Allow(next)
    }

    pub fn commit(channel: &mut Channel, next: ThrottleState) {
        channel.throttle = next;
    }
}

fn cooldown() -> TimeDelta {
    TimeDelta::seconds(COOLDOWN.as_secs() as i64)
}

/// Rest of the cooldown, rounded to the nearest whole minute, never zero.
fn remaining_cooldown(elapsed: TimeDelta) -> Duration {
    let remaining = (cooldown() - elapsed).num_seconds().min(cooldown().num_seconds());
    let minutes = ((remaining + 30) / 60).max(1) as u64;
    Duration::from_secs(minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn channel(age_days: i64, throttle: ThrottleState) -> Channel {
        Channel {
            id: 10,
            instance_name: "sales-1".to_string(),
            owner: None,
            organization_id: 1,
            created_at: now() - TimeDelta::days(age_days),
            throttle,
        }
    }

    fn state(sends: Option<i64>, last_send_ago: Option<TimeDelta>) -> ThrottleState {
        ThrottleState {
            consecutive_sends: sends,
            last_send_time: last_send_ago.map(|ago| now() - ago),
            ..Default::default()
        }
    }

    #[test]
    fn first_use_initializes_both_rules() {
        let limiter = RateLimiter::new(false);

        let verdict = limiter.evaluate(&channel(0, ThrottleState::default()), now());

        assert_eq!(verdict, Verdict::Allow(state(Some(2), Some(TimeDelta::zero()))));
    }

    #[test]
    fn ceiling_grows_one_per_month_up_to_six() {
        assert_eq!(RateLimiter::max_allowed_sends(&channel(10, state(None, None)), now()), 2);
        assert_eq!(RateLimiter::max_allowed_sends(&channel(61, state(None, None)), now()), 4);
        assert_eq!(RateLimiter::max_allowed_sends(&channel(400, state(None, None)), now()), 6);
    }

    #[test]
    fn ceiling_breach_retries_in_five_minutes() {
        let limiter = RateLimiter::new(false);
        let young = channel(40, state(Some(3), Some(TimeDelta::hours(1))));

        match limiter.evaluate(&young, now()) {
            Verdict::Throttled { reason, retry_in } => {
                assert_eq!(reason, ThrottleReason::ConsecutiveSends { current: 3, allowed: 3 });
                assert_eq!(retry_in, Duration::from_secs(300));
            }
            other => panic!("expected throttle, got {:?}", other),
        }
    }

    #[test]
    fn cooldown_breach_retries_after_remaining_minutes() {
        let limiter = RateLimiter::new(false);
        let recent = channel(200, state(Some(2), Some(TimeDelta::minutes(1))));

        match limiter.evaluate(&recent, now()) {
            Verdict::Throttled { reason, retry_in } => {
                assert_eq!(reason, ThrottleReason::Cooldown { elapsed_secs: 60 });
                assert_eq!(retry_in, Duration::from_secs(4 * 60));
            }
            other => panic!("expected throttle, got {:?}", other),
        }
    }

    #[test]
    fn almost_elapsed_cooldown_still_waits_a_minute() {
        assert_eq!(remaining_cooldown(TimeDelta::seconds(295)), Duration::from_secs(60));
        assert_eq!(remaining_cooldown(TimeDelta::seconds(-600)), Duration::from_secs(300));
    }

    #[test]
    fn allowed_send_increments_counter_and_stamps_time() {
        let limiter = RateLimiter::new(false);
        let mut idle = channel(200, state(Some(4), Some(TimeDelta::minutes(5))));

        let Verdict::Allow(next) = limiter.evaluate(&idle, now()) else {
            panic!("expected allow");
        };
        RateLimiter::commit(&mut idle, next);

        assert_eq!(idle.throttle.consecutive_sends, Some(5));
        assert_eq!(idle.throttle.last_send_time, Some(now()));
    }

    #[test]
    fn committed_counter_never_exceeds_ceiling() {
        let limiter = RateLimiter::new(false);

        for age_days in [0, 31, 65, 95, 130, 1000] {
            let mut ch = channel(age_days, ThrottleState::default());
            let allowed = RateLimiter::max_allowed_sends(&ch, now());

            for _ in 0..10 {
                ch.throttle.last_send_time = Some(now() - TimeDelta::minutes(10));
                if let Verdict::Allow(next) = limiter.evaluate(&ch, now()) {
                    RateLimiter::commit(&mut ch, next);
                    assert!(ch.throttle.consecutive_sends.unwrap_or(0) <= allowed);
                }
            }
        }
    }

    #[test]
    fn bypass_allows_without_touching_breached_fields() {
        let limiter = RateLimiter::new(true);
        let busy = channel(0, state(Some(9), Some(TimeDelta::seconds(30))));

        let verdict = limiter.evaluate(&busy, now());

        assert_eq!(verdict, Verdict::Allow(busy.throttle.clone()));
    }
}
