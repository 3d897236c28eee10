use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::error::Result;
use crate::model::{RoleProfile, TaskProfileFilter, TaskRow, TaskStatus, TaskType};
use crate::query::filter::{CompanyFilter, CompanyOrder, TaskFilter, UserFilter};
use crate::source::RecordSource;

use super::types::{ExceptionRow, MeetingFlag, OwnerExceptions};

/// Days looked back for a completed meeting.
pub const LOOKBACK_DAYS: i64 = 7;
/// Days looked ahead for a planned meeting.
pub const LOOKAHEAD_DAYS: i64 = 14;

/// Flag every company assigned to a Sales-role user by whether it had a
/// completed in-person meeting in the last week and has one planned in the
/// next two weeks.
pub fn exception_report<S: RecordSource>(
    source: &S,
    today: NaiveDate,
    profile: TaskProfileFilter,
) -> Result<Vec<OwnerExceptions>> {
    let users = source.users(&UserFilter::new().role(RoleProfile::Sales))?;
    if users.is_empty() {
        log::info!("no sales users found");
        return Ok(Vec::new());
    }
    let emails: Vec<String> = users.iter().map(|u| u.email.clone()).collect();

    let companies = source.companies(
        &CompanyFilter::new()
            .assigned_sales_in(emails)
            .order(CompanyOrder::LastMeetingDesc),
    )?;
    if companies.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = companies.iter().map(|c| c.name.clone()).collect();

    let meetings = |filter: TaskFilter| {
        let filter = filter
            .task_type(TaskType::InPersonMeeting)
            .companies(ids.clone());
        match profile {
            TaskProfileFilter::All => filter,
            p => filter.profiles(p.profiles()),
        }
    };
    let past = source.tasks(
        &meetings(TaskFilter::new())
            .status(TaskStatus::Completed)
            .start_between(Some(today - Duration::days(LOOKBACK_DAYS)), Some(today)),
    )?;
    let upcoming = source.tasks(
        &meetings(TaskFilter::new())
            .statuses(vec![TaskStatus::Pending, TaskStatus::Scheduled])
            .start_between(Some(today), Some(today + Duration::days(LOOKAHEAD_DAYS))),
    )?;
    log::debug!(
        "exception report: {} companies, {} past and {} upcoming meetings",
        companies.len(),
        past.len(),
        upcoming.len()
    );

    let last = meeting_dates(&past, |a, b| a.max(b));
    let next = meeting_dates(&upcoming, |a, b| a.min(b));

    let mut report = Vec::new();
    for user in &users {
        let mut rows: Vec<ExceptionRow> = companies
            .iter()
            .filter(|c| c.assigned_sales.as_deref() == Some(user.email.as_str()))
            .map(|c| {
                let last_date = last.get(c.name.as_str()).copied();
                let next_date = next.get(c.name.as_str()).copied();
                ExceptionRow {
                    company: c.name.clone(),
                    company_name: c.display_name().to_string(),
                    priority: c.priority.clone(),
                    last_meeting_company: c.last_meeting,
                    last_meeting_status: MeetingFlag::from_date(last_date),
                    last_meeting_date: last_date,
                    next_meeting_status: MeetingFlag::from_date(next_date),
                    next_meeting_date: next_date,
                }
            })
            .collect();
        if rows.is_empty() {
            continue;
        }
        sort_by_company_last_meeting(&mut rows);
        report.push(OwnerExceptions {
            user_full_name: user.full_name.clone(),
            email: user.email.clone(),
            companies: rows,
        });
    }
    Ok(report)
}

/// Newest company-level `last_meeting` first; never-met companies last.
pub fn sort_by_company_last_meeting(rows: &mut [ExceptionRow]) {
    rows.sort_by(|a, b| b.last_meeting_company.cmp(&a.last_meeting_company));
}

fn meeting_dates(
    tasks: &[TaskRow],
    pick: impl Fn(NaiveDate, NaiveDate) -> NaiveDate,
) -> HashMap<&str, NaiveDate> {
    let mut dates: HashMap<&str, NaiveDate> = HashMap::new();
    for row in tasks {
        let (Some(company), Some(start)) = (row.task.company.as_deref(), row.task.start_date)
        else {
            continue;
        };
        dates
            .entry(company)
            .and_modify(|d| *d = pick(*d, start))
            .or_insert(start);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Priority;
    use crate::reports::testutil::*;
    use crate::source::MemorySource;

    const REP: &str = "rep@example.com";

    fn row(company: &str, last_meeting: Option<&str>) -> ExceptionRow {
        ExceptionRow {
            company: company.into(),
            company_name: company.into(),
            priority: Priority::Unset,
            last_meeting_company: last_meeting.map(d),
            last_meeting_status: MeetingFlag::No,
            last_meeting_date: None,
            next_meeting_status: MeetingFlag::No,
            next_meeting_date: None,
        }
    }

    #[test]
    fn test_sort_newest_first_none_last() {
        let mut rows = vec![
            row("A", None),
            row("B", Some("2024-01-01")),
            row("C", Some("2024-03-01")),
        ];
        sort_by_company_last_meeting(&mut rows);
        let order: Vec<_> = rows.iter().map(|r| r.last_meeting_company).collect();
        assert_eq!(
            order,
            vec![Some(d("2024-03-01")), Some(d("2024-01-01")), None]
        );
    }

    #[test]
    fn test_recent_and_upcoming_meetings_flagged() {
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user(REP, "Rep One", RoleProfile::Sales));
        src.add_company(company("C1", REP, "P1", "2024-01-01 10:00:00"));
        src.add_task(meeting("T-past", REP, Some("C1"), None, TaskStatus::Completed, "2025-03-09"));
        src.add_task(meeting("T-next", REP, Some("C1"), None, TaskStatus::Pending, "2025-03-17"));

        let report = exception_report(&src, today, TaskProfileFilter::All).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].user_full_name, "Rep One");
        let c1 = &report[0].companies[0];
        assert_eq!(c1.company_name, "C1 Pvt Ltd");
        assert_eq!(c1.last_meeting_status, MeetingFlag::Yes);
        assert_eq!(c1.last_meeting_date, Some(d("2025-03-09")));
        assert_eq!(c1.next_meeting_status, MeetingFlag::Yes);
        assert_eq!(c1.next_meeting_date, Some(d("2025-03-17")));

        let json = serde_json::to_value(c1).unwrap();
        assert_eq!(json["last_meeting_status"], "YES");
        assert_eq!(json["next_meeting_date"], "2025-03-17");
    }

    #[test]
    fn test_picks_latest_past_and_earliest_upcoming() {
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user(REP, "Rep One", RoleProfile::Sales));
        src.add_company(company("C1", REP, "P1", "2024-01-01 10:00:00"));
        for (name, status, start) in [
            ("P-a", TaskStatus::Completed, "2025-03-06"),
            ("P-b", TaskStatus::Completed, "2025-03-11"),
            ("P-c", TaskStatus::Completed, "2025-03-04"),
            ("U-a", TaskStatus::Scheduled, "2025-03-20"),
            ("U-b", TaskStatus::Pending, "2025-03-14"),
            ("U-c", TaskStatus::Pending, "2025-03-27"),
        ] {
            src.add_task(meeting(name, REP, Some("C1"), None, status, start));
        }
        let report = exception_report(&src, today, TaskProfileFilter::All).unwrap();
        let c1 = &report[0].companies[0];
        assert_eq!(c1.last_meeting_date, Some(d("2025-03-11")));
        assert_eq!(c1.next_meeting_date, Some(d("2025-03-14")));
    }

    #[test]
    fn test_window_edges_are_inclusive() {
        // today - 7 = 03-05, today + 14 = 03-26
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user(REP, "Rep One", RoleProfile::Sales));
        for (company_id, status, start) in [
            ("LB-7", TaskStatus::Completed, "2025-03-05"),
            ("LB-8", TaskStatus::Completed, "2025-03-04"),
            ("LB-0", TaskStatus::Completed, "2025-03-12"),
            ("LA-0", TaskStatus::Pending, "2025-03-12"),
            ("LA-14", TaskStatus::Scheduled, "2025-03-26"),
            ("LA-15", TaskStatus::Pending, "2025-03-27"),
        ] {
            src.add_company(company(company_id, REP, "P1", "2024-01-01 10:00:00"));
            let task = format!("T-{company_id}");
            src.add_task(meeting(&task, REP, Some(company_id), None, status, start));
        }

        let report = exception_report(&src, today, TaskProfileFilter::All).unwrap();
        let flags = |id: &str| {
            let row = report[0]
                .companies
                .iter()
                .find(|r| r.company == id)
                .unwrap();
            (row.last_meeting_status, row.next_meeting_status)
        };
        assert_eq!(flags("LB-7"), (MeetingFlag::Yes, MeetingFlag::No));
        assert_eq!(flags("LB-8"), (MeetingFlag::No, MeetingFlag::No));
        assert_eq!(flags("LB-0"), (MeetingFlag::Yes, MeetingFlag::No));
        assert_eq!(flags("LA-0"), (MeetingFlag::No, MeetingFlag::Yes));
        assert_eq!(flags("LA-14"), (MeetingFlag::No, MeetingFlag::Yes));
        assert_eq!(flags("LA-15"), (MeetingFlag::No, MeetingFlag::No));
    }

    #[test]
    fn test_company_without_meetings_flagged_no() {
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user(REP, "Rep One", RoleProfile::Sales));
        let mut c = company("C2", REP, "P1", "2024-01-01 10:00:00");
        c.company_name = None;
        src.add_company(c);
        src.add_task(meeting("T-old", REP, Some("C2"), None, TaskStatus::Completed, "2025-03-01"));
        src.add_task(meeting("T-far", REP, Some("C2"), None, TaskStatus::Pending, "2025-03-30"));

        let report = exception_report(&src, today, TaskProfileFilter::All).unwrap();
        let c2 = &report[0].companies[0];
        assert_eq!(c2.company_name, "C2");
        assert_eq!(c2.last_meeting_status, MeetingFlag::No);
        assert_eq!(c2.last_meeting_date, None);
        assert_eq!(c2.next_meeting_status, MeetingFlag::No);
    }

    #[test]
    fn test_grouped_by_owner_with_companies_only() {
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user("b@example.com", "Bina", RoleProfile::Sales));
        src.add_user(user("a@example.com", "Arjun", RoleProfile::Sales));
        src.add_user(user("idle@example.com", "Idle", RoleProfile::Sales));
        src.add_user(user("est@example.com", "Esha", RoleProfile::Estimations));
        let mut a1 = company("A1", "a@example.com", "P1", "2024-01-01 10:00:00");
        a1.last_meeting = Some(d("2025-01-01"));
        let mut a2 = company("A2", "a@example.com", "P1", "2024-01-02 10:00:00");
        a2.last_meeting = Some(d("2025-02-01"));
        src.add_company(a1);
        src.add_company(a2);
        src.add_company(company("B1", "b@example.com", "P1", "2024-01-01 10:00:00"));
        src.add_company(company("E1", "est@example.com", "P1", "2024-01-01 10:00:00"));

        let report = exception_report(&src, today, TaskProfileFilter::All).unwrap();
        let owners: Vec<&str> = report.iter().map(|o| o.user_full_name.as_str()).collect();
        assert_eq!(owners, vec!["Arjun", "Bina"]);
        let arjun: Vec<&str> = report[0].companies.iter().map(|c| c.company.as_str()).collect();
        assert_eq!(arjun, vec!["A2", "A1"]);
    }

    #[test]
    fn test_issues_four_queries_and_aborts_on_failure() {
        let today = d("2025-03-12");
        let mut src = MemorySource::new();
        src.add_user(user(REP, "Rep One", RoleProfile::Sales));
        src.add_company(company("C1", REP, "P1", "2024-01-01 10:00:00"));

        let counting = FailingSource::new(src.clone(), usize::MAX);
        exception_report(&counting, today, TaskProfileFilter::All).unwrap();
        assert_eq!(counting.calls.get(), 4);

        let failing = FailingSource::new(src, 3);
        let err = exception_report(&failing, today, TaskProfileFilter::All).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
