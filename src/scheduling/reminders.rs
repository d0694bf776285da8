//! Reminder timing: lesson reminder windows and the weekly schedule prompt.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// Who a lesson reminder is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderWindow {
    /// 10 minutes before start: teacher and the broadcast channel.
    Teacher,
    /// 30 minutes before start: the student.
    Student,
}

/// Window a lesson falls into, given the time left until it starts.
///
/// Windows are `(9, 10]` and `(29, 30]` minutes; with a one-minute scan each
/// lesson hits each window once.
pub fn reminder_window(until_start: Duration) -> Option<ReminderWindow> {
    let in_window = |lo: i64, hi: i64| until_start > Duration::minutes(lo) && until_start <= Duration::minutes(hi);

    if in_window(9, 10) {
        Some(ReminderWindow::Teacher)
    } else if in_window(29, 30) {
        Some(ReminderWindow::Student)
    } else {
        None
    }
}

/// Validate cron expression.
pub fn validate_cron(expr: &str) -> Result<(), String> {
    Schedule::from_str(expr)
        .map(|_| ())
        .map_err(|e| format!("Invalid cron: {}", e))
}

/// Cron schedule evaluated in a fixed time zone.
#[derive(Debug, Clone)]
pub struct WeeklySchedule {
    schedule: Schedule,
    tz: Tz,
}

impl WeeklySchedule {
    pub fn new(expr: &str, tz: Tz) -> Result<Self, String> {
        let schedule = Schedule::from_str(expr).map_err(|e| format!("Invalid cron: {}", e))?;
        Ok(Self { schedule, tz })
    }

    /// Next fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn test_reminder_windows() {
        assert_eq!(reminder_window(Duration::minutes(10)), Some(ReminderWindow::Teacher));
        assert_eq!(reminder_window(Duration::seconds(9 * 60 + 1)), Some(ReminderWindow::Teacher));
        assert_eq!(reminder_window(Duration::minutes(9)), None);
        assert_eq!(reminder_window(Duration::minutes(30)), Some(ReminderWindow::Student));
        assert_eq!(reminder_window(Duration::seconds(30 * 60 + 1)), None);
        assert_eq!(reminder_window(Duration::minutes(20)), None);
        assert_eq!(reminder_window(Duration::minutes(-5)), None);
    }

    #[test]
    fn test_minute_scan_hits_each_window_once() {
        // Lesson at 12:00:00, scans every minute starting at an odd offset.
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let mut now = start - Duration::minutes(45) + Duration::seconds(17);
        let (mut teacher, mut student) = (0, 0);
        while now < start {
            match reminder_window(start - now) {
                Some(ReminderWindow::Teacher) => teacher += 1,
                Some(ReminderWindow::Student) => student += 1,
                None => {}
            }
            now += Duration::minutes(1);
        }
        assert_eq!((teacher, student), (1, 1));
    }

    #[test]
    fn test_validate_cron() {
        // cron crate uses 7-field format: sec min hour day month dow year
        assert!(validate_cron("0 0 18 * * Sun *").is_ok());
        assert!(validate_cron("0 0 9 * * * *").is_ok());
        assert!(validate_cron("invalid").is_err());
    }

    #[test]
    fn test_weekly_trigger_in_zone() {
        let schedule = WeeklySchedule::new("0 0 18 * * Sun *", chrono_tz::Europe::Moscow).unwrap();
        // Monday 10 March 2025, noon UTC.
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let next = schedule.next_after(now).unwrap();

        let local = next.with_timezone(&chrono_tz::Europe::Moscow);
        assert_eq!(local.weekday(), Weekday::Sun);
        assert_eq!(local.hour(), 18);
        // Moscow is UTC+3.
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 16, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_weekly_trigger_is_strictly_after() {
        let schedule = WeeklySchedule::new("0 0 18 * * Sun *", chrono_tz::UTC).unwrap();
        let fire = Utc.with_ymd_and_hms(2025, 3, 16, 18, 0, 0).unwrap();
        let next = schedule.next_after(fire).unwrap();
        assert_eq!(next, fire + Duration::weeks(1));
    }
}
