use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Boq, Company, CrmUser, RoleProfile, Task, TaskProfileFilter, TaskRow, TaskStatus, TaskType};
use crate::query::filter::{BoqFilter, CompanyFilter, TaskFilter, TaskOrder, UserFilter};
use crate::query::window::{ReportWindow, ReportWindows};
use crate::source::RecordSource;

use super::types::{OwnerPerformance, Tagged, WindowMetrics};

/// Business key used to collapse a window's meetings into unique engagements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingKey {
    #[default]
    Company,
    Contact,
}

impl MeetingKey {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "company" => Ok(MeetingKey::Company),
            "contact" => Ok(MeetingKey::Contact),
            other => Err(Error::Validation(format!(
                "invalid meeting dedupe key '{other}' (expected company or contact)"
            ))),
        }
    }

    fn of<'a>(&self, task: &'a Task) -> Option<&'a str> {
        let key = match self {
            MeetingKey::Company => task.company.as_deref(),
            MeetingKey::Contact => task.contact.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceOptions {
    pub profile: TaskProfileFilter,
    pub dedupe_key: MeetingKey,
}

/// Per-window meetings, unique meetings, cumulative company assignments and
/// BOQs received for every Sales-role user.
pub fn sales_performance<S: RecordSource>(
    source: &S,
    today: NaiveDate,
    options: &PerformanceOptions,
) -> Result<Vec<OwnerPerformance>> {
    let windows = ReportWindows::for_date(today);
    for w in windows.iter() {
        log::debug!("{}: {} .. {}", w.label, w.date_from, w.date_to);
    }

    let users = source.users(&UserFilter::new().role(RoleProfile::Sales))?;
    if users.is_empty() {
        log::info!("no sales users found");
        return Ok(Vec::new());
    }

    users
        .iter()
        .map(|user| owner_performance(source, user, &windows, options))
        .collect()
}

fn owner_performance<S: RecordSource>(
    source: &S,
    user: &CrmUser,
    windows: &ReportWindows,
    options: &PerformanceOptions,
) -> Result<OwnerPerformance> {
    let owner = user.email.as_str();
    let perf = OwnerPerformance {
        user_name: user.name.clone(),
        full_name: user.full_name.clone(),
        email: user.email.clone(),
        this_week: window_metrics(source, owner, &windows.this_week, options)?,
        last_week: window_metrics(source, owner, &windows.last_week, options)?,
        last_30_days: window_metrics(source, owner, &windows.last_30_days, options)?,
    };
    log::debug!(
        "{owner}: meetings {}/{}/{}, boqs {}/{}/{}",
        perf.this_week.meetings.len(),
        perf.last_week.meetings.len(),
        perf.last_30_days.meetings.len(),
        perf.this_week.boqs_received.len(),
        perf.last_week.boqs_received.len(),
        perf.last_30_days.boqs_received.len(),
    );
    Ok(perf)
}

pub fn window_metrics<S: RecordSource>(
    source: &S,
    owner: &str,
    window: &ReportWindow,
    options: &PerformanceOptions,
) -> Result<WindowMetrics> {
    let meetings = fetch_meetings(source, owner, window, options)?;
    let unique_meetings = dedupe_meetings(&meetings, options.dedupe_key);
    Ok(WindowMetrics {
        window: window.clone(),
        unique_meetings,
        meetings,
        assigned_companies: cumulative_companies(source, owner, window)?,
        boqs_received: fetch_boqs_received(source, owner, window)?,
    })
}

/// Completed in-person meetings in the window, newest first.
pub fn fetch_meetings<S: RecordSource>(
    source: &S,
    owner: &str,
    window: &ReportWindow,
    options: &PerformanceOptions,
) -> Result<Vec<Tagged<TaskRow>>> {
    let mut filter = TaskFilter::new()
        .task_type(TaskType::InPersonMeeting)
        .status(TaskStatus::Completed)
        .start_between(Some(window.date_from), Some(window.date_to))
        .assigned_sales(owner)
        .order(TaskOrder::StartDateDesc);
    if options.dedupe_key == MeetingKey::Company {
        filter = filter.requires_company();
    }
    if options.profile != TaskProfileFilter::All {
        filter = filter.profiles(options.profile.profiles());
    }
    Ok(source
        .tasks(&filter)?
        .into_iter()
        .map(|t| Tagged::in_window(t, window))
        .collect())
}

/// BOQs created during the window. Creation carries a time of day, so the
/// upper bound is the midnight after `date_to`, exclusive.
pub fn fetch_boqs_received<S: RecordSource>(
    source: &S,
    owner: &str,
    window: &ReportWindow,
) -> Result<Vec<Tagged<Boq>>> {
    let filter = BoqFilter::new()
        .assigned_sales(owner)
        .created_between(window.created_lower_bound(), window.created_upper_bound());
    Ok(source
        .boqs(&filter)?
        .into_iter()
        .map(|b| Tagged::in_window(b, window))
        .collect())
}

/// Active companies assigned to `owner` and created by the end of the
/// window. There is no lower bound, so this is a running total. Priority is
/// read as it is now, not as it was at `date_to`.
pub fn cumulative_companies<S: RecordSource>(
    source: &S,
    owner: &str,
    window: &ReportWindow,
) -> Result<Vec<Tagged<Company>>> {
    let filter = CompanyFilter::new()
        .assigned_sales(owner)
        .active()
        .created_to(window.created_upper_bound());
    Ok(source
        .companies(&filter)?
        .into_iter()
        .map(|c| Tagged::as_of(c, window))
        .collect())
}

/// Keep the first meeting seen for each key. Input is newest first, so the
/// survivor is the most recent meeting for that key; order is preserved.
/// Meetings without the key are dropped.
pub fn dedupe_meetings(meetings: &[Tagged<TaskRow>], key: MeetingKey) -> Vec<Tagged<TaskRow>> {
    let mut seen = HashSet::new();
    meetings
        .iter()
        .filter(|m| key.of(&m.record.task).is_some_and(|k| seen.insert(k.to_string())))
        .cloned()
        .collect()
}
