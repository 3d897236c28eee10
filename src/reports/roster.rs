use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::error::Result;
use crate::model::{Boq, DealStatus, TaskProfileFilter, TaskRow, TaskStatus, TaskType};
use crate::query::filter::{BoqFilter, CompanyFilter, TaskFilter, TaskOrder};
use crate::query::window::ReportWindows;
use crate::source::RecordSource;

use super::exceptions::{LOOKAHEAD_DAYS, LOOKBACK_DAYS};
use super::types::RosterEntry;

const REMARKS_FROM_LAST: usize = 3;

/// Every visible company with its next meeting, recent remarks, BOQ
/// summaries and meeting counts, sorted so that companies with an upcoming
/// meeting come first, then companies met before, then the rest.
pub fn company_roster<S: RecordSource>(
    source: &S,
    today: NaiveDate,
    profile: TaskProfileFilter,
) -> Result<Vec<RosterEntry>> {
    let companies = source.companies(&CompanyFilter::new())?;
    if companies.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = companies.iter().map(|c| c.name.clone()).collect();
    let tasks = |filter: TaskFilter| {
        let filter = filter.companies(ids.clone());
        match profile {
            TaskProfileFilter::All => filter,
            p => filter.profiles(p.profiles()),
        }
    };

    let upcoming = source.tasks(
        &tasks(TaskFilter::new())
            .exclude_statuses(vec![TaskStatus::Completed, TaskStatus::Incomplete])
            .start_between(Some(today), None)
            .order(TaskOrder::StartDateAsc),
    )?;
    let completed = source.tasks(
        &tasks(TaskFilter::new())
            .status(TaskStatus::Completed)
            .order(TaskOrder::ModifiedDesc),
    )?;
    let recent_meetings = source.tasks(
        &tasks(TaskFilter::new())
            .task_type(TaskType::InPersonMeeting)
            .status(TaskStatus::Completed)
            .start_between(Some(today - Duration::days(LOOKBACK_DAYS)), Some(today)),
    )?;
    let planned_meetings = source.tasks(
        &tasks(TaskFilter::new())
            .task_type(TaskType::InPersonMeeting)
            .statuses(vec![TaskStatus::Pending, TaskStatus::Scheduled])
            .start_between(Some(today), Some(today + Duration::days(LOOKAHEAD_DAYS))),
    )?;

    let last_30_days = ReportWindows::for_date(today).last_30_days;
    let active_boqs = source.boqs(&BoqFilter::new().companies(ids.clone()).active())?;
    let hot_boqs = source.boqs(
        &BoqFilter::new()
            .companies(ids.clone())
            .deal_status(DealStatus::Hot),
    )?;
    let recent_boqs = source.boqs(&BoqFilter::new().companies(ids.clone()).created_between(
        last_30_days.created_lower_bound(),
        last_30_days.created_upper_bound(),
    ))?;

    let upcoming = by_company(upcoming, |t: &TaskRow| t.task.company.as_deref());
    let completed = by_company(completed, |t: &TaskRow| t.task.company.as_deref());
    let recent_meetings = by_company(recent_meetings, |t: &TaskRow| t.task.company.as_deref());
    let planned_meetings = by_company(planned_meetings, |t: &TaskRow| t.task.company.as_deref());
    let mut active_boqs = by_company(active_boqs, |b: &Boq| b.company.as_deref());
    let mut hot_boqs = by_company(hot_boqs, |b: &Boq| b.company.as_deref());
    let mut recent_boqs = by_company(recent_boqs, |b: &Boq| b.company.as_deref());

    let mut roster: Vec<RosterEntry> = companies
        .into_iter()
        .map(|company| {
            let id = company.name.as_str();
            let next = upcoming.get(id).and_then(|t| t.first());
            let last_three_remarks = completed
                .get(id)
                .map(|tasks| {
                    tasks
                        .iter()
                        .take(REMARKS_FROM_LAST)
                        .filter_map(|t| t.task.remarks.clone())
                        .filter(|r| !r.trim().is_empty())
                        .collect()
                })
                .unwrap_or_default();
            RosterEntry {
                next_meeting_date: next.and_then(|t| t.task.start_date),
                next_meeting_id: next.map(|t| t.task.name.clone()),
                last_three_remarks,
                active_boqs: active_boqs.remove(id).unwrap_or_default(),
                hot_boqs: hot_boqs.remove(id).unwrap_or_default(),
                boqs_last_30_days: recent_boqs.remove(id).unwrap_or_default(),
                meetings_last_7_days: recent_meetings.get(id).map_or(0, Vec::len),
                meetings_next_14_days: planned_meetings.get(id).map_or(0, Vec::len),
                company,
            }
        })
        .collect();

    sort_roster(&mut roster);
    Ok(roster)
}

/// Upcoming meeting date descending, then company `last_meeting`
/// descending. A missing date sorts after any date at both levels; full ties
/// keep source order.
pub fn sort_roster(roster: &mut [RosterEntry]) {
    roster.sort_by(|a, b| {
        b.next_meeting_date
            .cmp(&a.next_meeting_date)
            .then_with(|| b.company.last_meeting.cmp(&a.company.last_meeting))
    });
}

fn by_company<T>(
    records: Vec<T>,
    key: impl Fn(&T) -> Option<&str>,
) -> HashMap<String, Vec<T>> {
    let mut map: HashMap<String, Vec<T>> = HashMap::new();
    for record in records {
        if let Some(company) = key(&record).map(str::to_string) {
            map.entry(company).or_default().push(record);
        }
    }
    map
}
