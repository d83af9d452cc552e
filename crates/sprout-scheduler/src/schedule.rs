use chrono::{DateTime, Datelike, Days, Duration, Utc};
use sprout_core::{Schedule, TimeOfDay};

/// First firing time for a freshly constructed (or re-armed) job.
///
/// Once jobs keep their instant even when it already passed, so an overdue
/// one-shot still fires on the next tick.
pub fn initial_next_run(
    schedule: &Schedule,
    now: DateTime<Utc>,
    start_immediately: bool,
) -> DateTime<Utc> {
    match schedule {
        Schedule::Once { at } => *at,
        Schedule::Interval { every_secs } => {
            if start_immediately {
                now
            } else {
                now + Duration::seconds(*every_secs as i64)
            }
        }
        Schedule::Daily { time } => next_daily(*time, now),
        Schedule::Weekly { day, time } => next_weekly(*day, *time, now),
    }
}

/// Next firing time after the occurrence scheduled for `scheduled_for` fired.
///
/// Interval jobs advance from the scheduled time, not from completion, so
/// execution latency never accumulates. When the result is not strictly after
/// `now` the job skips forward by whole periods instead of replaying missed
/// ticks. Returns `None` when the schedule is exhausted.
pub fn next_run_after(
    schedule: &Schedule,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { .. } => None,

        Schedule::Interval { every_secs } => {
            let period = Duration::seconds(*every_secs as i64);
            let next = scheduled_for + period;
            if next > now {
                return Some(next);
            }
            // Smallest scheduled_for + k*period strictly after now.
            let period_ms = period.num_milliseconds().max(1);
            let behind_ms = (now - scheduled_for).num_milliseconds();
            let periods = behind_ms / period_ms + 1;
            Some(scheduled_for + Duration::milliseconds(periods * period_ms))
        }

        Schedule::Daily { time } => Some(next_daily(*time, scheduled_for.max(now))),

        Schedule::Weekly { day, time } => Some(next_weekly(*day, *time, scheduled_for.max(now))),
    }
}

/// Today at `time` if still strictly after `from`, else tomorrow.
fn next_daily(time: TimeOfDay, from: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = from.date_naive().and_time(time.as_naive()).and_utc();
    if candidate > from {
        candidate
    } else {
        // Today's window has passed; advance to tomorrow.
        candidate + Duration::days(1)
    }
}

/// Next `day`/`time` strictly after `from`; a same-day time that already
/// passed rolls a full week forward.
fn next_weekly(day: u8, time: TimeOfDay, from: DateTime<Utc>) -> DateTime<Utc> {
    let today = from.weekday().num_days_from_monday() as u64;
    let target = (day as u64).min(6);
    let days_ahead = (target + 7 - today) % 7;

    let candidate = (from.date_naive() + Days::new(days_ahead)).and_time(time.as_naive()).and_utc();
    if candidate > from {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}
