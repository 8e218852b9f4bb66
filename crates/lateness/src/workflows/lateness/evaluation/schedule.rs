use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use super::super::triggers::{SanctionDay, SanctionSchedule};

/// Date and time at which a sanction opened at `now` takes place.
///
/// A weekday shift moves `(6 + target - iso_weekday) mod (6 + delay) + 1` days ahead, so
/// the sanction never lands on the triggering day. With a one-day delay this is the next
/// occurrence of the target weekday; longer delays widen the cycle and may settle on
/// another day. A missing time falls back to the time of the lateness.
pub fn sanction_datetime(schedule: &SanctionSchedule, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date();
    let day = match schedule.day {
        SanctionDay::SameDay => today,
        SanctionDay::Weekday(weekday) => {
            let delay = schedule.delay_days.map(i64::from).unwrap_or(1);
            let target = i64::from(weekday.number_from_monday());
            today + Duration::days(shift_days(today, target, delay))
        }
    };

    let time = schedule.time.unwrap_or_else(|| now.time());
    day.and_time(time)
}

fn shift_days(today: NaiveDate, target: i64, delay: i64) -> i64 {
    let current = i64::from(today.weekday().number_from_monday());
    (6 + target - current).rem_euclid(6 + delay) + 1
}
