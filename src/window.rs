use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::DailyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

/// How the monthly window is bounded. Views disagreed on this, so it is
/// configured rather than fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyWindow {
    #[default]
    CalendarMonth,
    #[serde(rename = "rolling_30_days")]
    Rolling30Days,
}

impl TimeWindow {
    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::Daily => "Today",
            TimeWindow::Weekly => "This Week",
            TimeWindow::Monthly => "This Month",
        }
    }

    /// Day count used for per-day averages.
    pub fn nominal_days(self) -> u32 {
        match self {
            TimeWindow::Daily => 1,
            TimeWindow::Weekly => 7,
            TimeWindow::Monthly => 30,
        }
    }

    /// Date lower bound for fetching records in this window.
    pub fn since_date(self, now: NaiveDateTime, policy: MonthlyWindow) -> NaiveDate {
        window_start(self, now, policy).date()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeWindow::Daily => "daily",
            TimeWindow::Weekly => "weekly",
            TimeWindow::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// Start of `window` relative to `now`. The end is always `now`.
pub fn window_start(window: TimeWindow, now: NaiveDateTime, policy: MonthlyWindow) -> NaiveDateTime {
    match window {
        TimeWindow::Daily => now.date().and_time(NaiveTime::MIN),
        TimeWindow::Weekly => now - Duration::days(7),
        TimeWindow::Monthly => match policy {
            MonthlyWindow::CalendarMonth => now
                .date()
                .with_day(1)
                .unwrap_or(now.date())
                .and_time(NaiveTime::MIN),
            MonthlyWindow::Rolling30Days => now - Duration::days(30),
        },
    }
}

/// Keeps records dated on or after `since`. Undated records never match.
pub fn filter_window(records: Vec<DailyRecord>, since: NaiveDate) -> Vec<DailyRecord> {
    records
        .into_iter()
        .filter(|record| record.date.is_some_and(|date| date >= since))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn daily_starts_at_midnight() {
        let now = at(2024, 3, 15, 14, 30);
        assert_eq!(
            window_start(TimeWindow::Daily, now, MonthlyWindow::CalendarMonth),
            at(2024, 3, 15, 0, 0)
        );
    }

    #[test]
    fn weekly_is_exact_seven_days_back() {
        let now = at(2024, 3, 15, 14, 30);
        assert_eq!(
            window_start(TimeWindow::Weekly, now, MonthlyWindow::CalendarMonth),
            at(2024, 3, 8, 14, 30)
        );
    }

    #[test]
    fn monthly_follows_policy() {
        let now = at(2024, 3, 15, 14, 30);
        assert_eq!(
            window_start(TimeWindow::Monthly, now, MonthlyWindow::CalendarMonth),
            at(2024, 3, 1, 0, 0)
        );
        assert_eq!(
            window_start(TimeWindow::Monthly, now, MonthlyWindow::Rolling30Days),
            at(2024, 2, 14, 14, 30)
        );
    }

    #[test]
    fn since_date_truncates_weekly_boundary() {
        let now = at(2024, 3, 15, 14, 30);
        assert_eq!(
            TimeWindow::Weekly.since_date(now, MonthlyWindow::CalendarMonth),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
        );
    }

    #[test]
    fn filter_drops_old_and_undated_records() {
        let since = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let record = |date: Option<NaiveDate>| DailyRecord {
            agent_name: "Avery Lee".to_string(),
            date,
            ..DailyRecord::default()
        };

        let kept = filter_window(
            vec![
                record(NaiveDate::from_ymd_opt(2024, 3, 8)),
                record(NaiveDate::from_ymd_opt(2024, 3, 7)),
                record(None),
            ],
            since,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, Some(since));
    }
}
