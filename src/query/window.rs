use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::date_util::{end_of_day_bound, start_of_day};

/// A labelled, inclusive calendar date range used to bucket report metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub label: &'static str,
    #[serde(with = "crate::date_util::display_date")]
    pub date_from: NaiveDate,
    #[serde(with = "crate::date_util::display_date")]
    pub date_to: NaiveDate,
}

impl ReportWindow {
    pub fn new(label: &'static str, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            label,
            date_from,
            date_to,
        }
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        self.date_from <= d && d <= self.date_to
    }

    /// Lower bound for `creation` timestamps: midnight opening `date_from`.
    pub fn created_lower_bound(&self) -> NaiveDateTime {
        start_of_day(self.date_from)
    }

    /// Upper bound for `creation` timestamps. Records carry a time of day, so
    /// the bound is midnight of the following day rather than `date_to` itself.
    /// Range queries treat it as exclusive.
    pub fn created_upper_bound(&self) -> NaiveDateTime {
        end_of_day_bound(self.date_to)
    }

    pub fn num_days(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }
}

/// The three canonical reporting windows relative to a reference date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportWindows {
    pub this_week: ReportWindow,
    pub last_week: ReportWindow,
    pub last_30_days: ReportWindow,
}

impl ReportWindows {
    pub fn for_date(today: NaiveDate) -> Self {
        let offset = today.weekday().num_days_from_monday() as i64;
        let week_start = today - Duration::days(offset);
        let this_week = ReportWindow::new("this_week", week_start, week_start + Duration::days(6));
        let last_week = ReportWindow::new(
            "last_week",
            week_start - Duration::days(7),
            week_start - Duration::days(1),
        );
        let last_30_days = ReportWindow::new("last_30_days", today - Duration::days(29), today);
        Self {
            this_week,
            last_week,
            last_30_days,
        }
    }

    /// Windows in report order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportWindow> {
        [&self.this_week, &self.last_week, &self.last_30_days].into_iter()
    }
}
