use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{Boq, BoqStatus, Company, Priority, TaskRow};
use crate::query::window::ReportWindow;

/// A record annotated with the window it was counted in. Cumulative metrics
/// have no lower bound and carry `date_to` only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tagged<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(
        with = "crate::date_util::display_date_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_from: Option<NaiveDate>,
    #[serde(with = "crate::date_util::display_date")]
    pub date_to: NaiveDate,
}

impl<T> Tagged<T> {
    pub fn in_window(record: T, window: &ReportWindow) -> Self {
        Self {
            record,
            date_from: Some(window.date_from),
            date_to: window.date_to,
        }
    }

    pub fn as_of(record: T, window: &ReportWindow) -> Self {
        Self {
            record,
            date_from: None,
            date_to: window.date_to,
        }
    }
}

// ── Sales performance ──────────────────────────────────────────────

/// Metrics for one owner in one window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMetrics {
    pub window: ReportWindow,
    /// Completed in-person meetings, newest first.
    pub meetings: Vec<Tagged<TaskRow>>,
    /// One meeting per company (or contact), keeping the newest.
    pub unique_meetings: Vec<Tagged<TaskRow>>,
    /// Active companies assigned by the end of the window.
    pub assigned_companies: Vec<Tagged<Company>>,
    pub boqs_received: Vec<Tagged<Boq>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerPerformance {
    pub user_name: String,
    pub full_name: String,
    pub email: String,
    pub this_week: WindowMetrics,
    pub last_week: WindowMetrics,
    pub last_30_days: WindowMetrics,
}

impl OwnerPerformance {
    pub fn windows(&self) -> [&WindowMetrics; 3] {
        [&self.this_week, &self.last_week, &self.last_30_days]
    }
}

// ── Exception report ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeetingFlag {
    Yes,
    No,
}

impl MeetingFlag {
    pub fn from_date(d: Option<NaiveDate>) -> Self {
        if d.is_some() {
            MeetingFlag::Yes
        } else {
            MeetingFlag::No
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionRow {
    pub company: String,
    pub company_name: String,
    pub priority: Priority,
    /// The company's own `last_meeting`, used for ordering.
    pub last_meeting_company: Option<NaiveDate>,
    pub last_meeting_status: MeetingFlag,
    pub last_meeting_date: Option<NaiveDate>,
    pub next_meeting_status: MeetingFlag,
    pub next_meeting_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerExceptions {
    pub user_full_name: String,
    pub email: String,
    pub companies: Vec<ExceptionRow>,
}

// ── Company roster ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    #[serde(flatten)]
    pub company: Company,
    pub next_meeting_date: Option<NaiveDate>,
    pub next_meeting_id: Option<String>,
    pub last_three_remarks: Vec<String>,
    pub active_boqs: Vec<Boq>,
    pub hot_boqs: Vec<Boq>,
    pub boqs_last_30_days: Vec<Boq>,
    pub meetings_last_7_days: usize,
    pub meetings_next_14_days: usize,
}

// ── Sales tasks ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoqSummary {
    pub name: String,
    pub boq_status: Option<BoqStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub companies: Vec<FilterOption>,
    pub statuses: Vec<FilterOption>,
    pub types: Vec<FilterOption>,
    pub profiles: Vec<FilterOption>,
    pub salespersons: Vec<FilterOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesTasks {
    pub tasks: Vec<TaskRow>,
    /// Open BOQs keyed by company id.
    pub boq_data: BTreeMap<String, Vec<BoqSummary>>,
    pub filter_options: FilterOptions,
    /// Email to full name for every salesperson on the listed tasks.
    pub salesperson_map: BTreeMap<String, String>,
}
