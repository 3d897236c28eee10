use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::date_util::{parse_date, parse_timestamp};
use crate::error::{Error, Result};
use crate::model::{
    Boq, BoqStatus, Company, CrmUser, DealStatus, Priority, Task, TaskProfile, TaskRow,
};
use crate::query::filter::{BoqFilter, CompanyFilter, TaskFilter, UserFilter};

use super::RecordSource;

/// Record source over the local SQLite store. Borrows a connection so it
/// can run inside a single `tokio_rusqlite` call.
pub struct SqliteSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn query<T>(
        &self,
        (sql, params): (String, Vec<Box<dyn ToSql>>),
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        log::trace!("{sql}");
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }
}

impl RecordSource for SqliteSource<'_> {
    fn users(&self, filter: &UserFilter) -> Result<Vec<CrmUser>> {
        self.query(filter.build_sql(), |row| {
            Ok(CrmUser {
                name: row.get(0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
                role_profile: row.get::<_, String>(3)?.into(),
                has_company: row.get::<_, i32>(4)? != 0,
            })
        })
    }

    fn companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>> {
        self.query(filter.build_sql(), |row| {
            Ok(Company {
                name: row.get(0)?,
                company_name: row.get(1)?,
                company_city: row.get(2)?,
                assigned_sales: row.get(3)?,
                priority: row
                    .get::<_, Option<String>>(4)?
                    .map(Priority::from)
                    .unwrap_or_default(),
                last_meeting: date_col(row, 5)?,
                creation: timestamp_col(row, 6)?,
                modified: timestamp_opt_col(row, 7)?,
            })
        })
    }

    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRow>> {
        self.query(filter.build_sql(), |row| {
            Ok(TaskRow {
                task: task_from_row(row)?,
                company_name: row.get(13)?,
                contact_first_name: row.get(14)?,
                contact_last_name: row.get(15)?,
            })
        })
    }

    fn boqs(&self, filter: &BoqFilter) -> Result<Vec<Boq>> {
        self.query(filter.build_sql(), |row| {
            Ok(Boq {
                name: row.get(0)?,
                boq_name: row.get(1)?,
                boq_type: row.get(2)?,
                city: row.get(3)?,
                company: row.get(4)?,
                contact: row.get(5)?,
                boq_status: non_empty(row, 6)?.map(BoqStatus::from),
                deal_status: non_empty(row, 7)?.map(DealStatus::from),
                boq_value: row.get(8)?,
                boq_submission_date: date_col(row, 9)?,
                assigned_sales: row.get(10)?,
                assigned_estimations: row.get(11)?,
                creation: timestamp_col(row, 12)?,
                modified: timestamp_opt_col(row, 13)?,
            })
        })
    }
}

/// Map the first 13 columns of a task select (see [`TaskFilter::build_sql`]).
pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        name: row.get(0)?,
        task_type: row.get::<_, String>(1)?.into(),
        status: row.get::<_, String>(2)?.into(),
        start_date: date_col(row, 3)?,
        company: row.get(4)?,
        contact: row.get(5)?,
        boq: row.get(6)?,
        task_profile: non_empty(row, 7)?.map(TaskProfile::from),
        assigned_sales: row.get(8)?,
        owner: row.get(9)?,
        remarks: row.get(10)?,
        creation: timestamp_col(row, 11)?,
        modified: timestamp_opt_col(row, 12)?,
    })
}

/// Fetch one task by id, ignoring row visibility.
pub(crate) fn read_task(conn: &Connection, name: &str) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        "SELECT name, type, status, start_date, company, contact, boq, task_profile,
                assigned_sales, owner, remarks, creation, modified
         FROM crm_tasks WHERE name = ?1",
        [name],
        task_from_row,
    )
    .optional()
}

fn conversion_error(idx: usize, e: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn non_empty(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .filter(|s| !s.is_empty()))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    non_empty(row, idx)?
        .map(|s| parse_date(&s))
        .transpose()
        .map_err(|e| conversion_error(idx, e))
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).map_err(|e| conversion_error(idx, e))
}

fn timestamp_opt_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    non_empty(row, idx)?
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;
    use crate::model::{RoleProfile, TaskStatus, TaskType};
    use crate::query::filter::{CompanyOrder, TaskOrder};
    use crate::source::MemorySource;
    use crate::storage::repository::{load_fixture, Fixture};
    use crate::storage::Database;

    const FIXTURE: &str = r#"{
        "users": [
            {"name": "a@example.com", "full_name": "Zoya", "email": "a@example.com",
             "role_profile": "Nirmaan Sales User Profile"},
            {"name": "b@example.com", "full_name": "Aarav", "email": "b@example.com",
             "role_profile": "Nirmaan Sales User Profile"},
            {"name": "c@example.com", "full_name": "Esha", "email": "c@example.com",
             "role_profile": "Nirmaan Estimations User Profile"}
        ],
        "companies": [
            {"name": "C-1", "company_name": "Acme", "assigned_sales": "a@example.com",
             "priority": "P1", "last_meeting": "2025-02-01",
             "creation": "2025-01-01 10:00:00", "modified": "2025-02-01 10:00:00"},
            {"name": "C-2", "company_name": "Zenith", "assigned_sales": "b@example.com",
             "priority": "Hold", "creation": "2025-01-05 10:00:00",
             "modified": "2025-01-05 10:00:00"},
            {"name": "C-3", "assigned_sales": "a@example.com",
             "creation": "2025-01-03 10:00:00", "modified": "2025-01-03 10:00:00"},
            {"name": "C-4", "company_name": "Orbit", "assigned_sales": "a@example.com",
             "priority": "P2", "creation": "2025-01-03 10:00:00",
             "modified": "2025-01-03 10:00:00"}
        ],
        "contacts": [
            {"name": "CT-1", "first_name": "Asha", "last_name": "Rao", "company": "C-1",
             "creation": "2025-01-01 10:00:00", "modified": "2025-01-01 10:00:00"}
        ],
        "tasks": [
            {"name": "T-1", "type": "In Person Meeting", "status": "Completed",
             "start_date": "2025-01-10", "company": "C-1", "contact": "CT-1",
             "task_profile": "Sales", "assigned_sales": "a@example.com",
             "creation": "2025-01-02 10:00:00", "modified": "2025-01-11 10:00:00"},
            {"name": "T-2", "type": "Call", "status": "Pending",
             "start_date": "2025-01-12", "company": "C-3",
             "task_profile": "Estimates", "assigned_sales": "a@example.com",
             "creation": "2025-01-02 10:00:00", "modified": "2025-01-13 10:00:00"},
            {"name": "T-3", "type": "In Person Meeting", "status": "Completed",
             "start_date": "2025-01-10", "company": "C-2",
             "task_profile": "Sales", "assigned_sales": "b@example.com",
             "creation": "2025-01-02 10:00:00", "modified": "2025-01-10 10:00:00"},
            {"name": "T-4", "type": "In Person Meeting", "status": "Scheduled",
             "assigned_sales": "a@example.com",
             "creation": "2025-01-02 10:00:00", "modified": "2025-01-12 10:00:00"}
        ],
        "boqs": [
            {"name": "B-1", "company": "C-1", "boq_status": "New", "deal_status": "Hot",
             "assigned_sales": "a@example.com",
             "creation": "2025-01-02 10:00:00", "modified": "2025-01-02 10:00:00"},
            {"name": "B-2", "company": "C-1", "boq_status": "Won",
             "assigned_sales": "a@example.com",
             "creation": "2025-01-04 10:00:00", "modified": "2025-01-04 10:00:00"},
            {"name": "B-3", "assigned_sales": "b@example.com",
             "creation": "2025-01-04 10:00:00", "modified": "2025-01-04 10:00:00"}
        ]
    }"#;

    fn memory(fixture: &Fixture) -> MemorySource {
        let mut src = MemorySource::new();
        fixture.users.iter().cloned().for_each(|u| src.add_user(u));
        fixture.companies.iter().cloned().for_each(|c| src.add_company(c));
        fixture.contacts.iter().cloned().for_each(|c| src.add_contact(c));
        fixture.tasks.iter().cloned().for_each(|t| src.add_task(t));
        fixture.boqs.iter().cloned().for_each(|b| src.add_boq(b));
        src
    }

    fn task_filters() -> Vec<TaskFilter> {
        let d = |s: &str| parse_date(s).unwrap();
        vec![
            TaskFilter::new(),
            TaskFilter::new().order(TaskOrder::StartDateAsc),
            TaskFilter::new().order(TaskOrder::ModifiedDesc).limit(2),
            TaskFilter::new()
                .task_type(TaskType::InPersonMeeting)
                .status(TaskStatus::Completed)
                .requires_company(),
            TaskFilter::new().exclude_statuses(vec![TaskStatus::Completed]),
            TaskFilter::new().profiles(vec![crate::model::TaskProfile::Sales]),
            TaskFilter::new().companies(vec!["C-1".into(), "C-3".into()]),
            TaskFilter::new().companies(vec![]),
            TaskFilter::new().start_between(Some(d("2025-01-11")), None),
            TaskFilter::new().restrict_owner(Some("b@example.com")),
        ]
    }

    fn company_filters() -> Vec<CompanyFilter> {
        vec![
            CompanyFilter::new(),
            CompanyFilter::new().order(CompanyOrder::LastMeetingDesc),
            CompanyFilter::new().active(),
            CompanyFilter::new()
                .assigned_sales_in(vec!["b@example.com".into()])
                .created_to(parse_timestamp("2025-01-06 00:00:00").unwrap()),
        ]
    }

    fn boq_filters() -> Vec<BoqFilter> {
        vec![
            BoqFilter::new(),
            BoqFilter::new().active(),
            BoqFilter::new().deal_status(DealStatus::Hot),
            BoqFilter::new().companies(vec!["C-1".into()]).created_between(
                parse_timestamp("2025-01-04 00:00:00").unwrap(),
                parse_timestamp("2025-01-05 00:00:00").unwrap(),
            ),
        ]
    }

    #[tokio::test]
    async fn test_sqlite_agrees_with_memory_source() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let mem = memory(&fixture);
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(move |conn| load_fixture(conn, &fixture))
            .await
            .unwrap();

        let expected = (
            task_filters().iter().map(|f| mem.tasks(f).unwrap()).collect::<Vec<_>>(),
            company_filters().iter().map(|f| mem.companies(f).unwrap()).collect::<Vec<_>>(),
            boq_filters().iter().map(|f| mem.boqs(f).unwrap()).collect::<Vec<_>>(),
            mem.users(&UserFilter::new().role(RoleProfile::Sales)).unwrap(),
        );
        let actual = db
            .reader()
            .call(|conn| {
                let src = SqliteSource::new(conn);
                let run = || -> Result<_> {
                    Ok((
                        task_filters().iter().map(|f| src.tasks(f)).collect::<Result<Vec<_>>>()?,
                        company_filters()
                            .iter()
                            .map(|f| src.companies(f))
                            .collect::<Result<Vec<_>>>()?,
                        boq_filters().iter().map(|f| src.boqs(f)).collect::<Result<Vec<_>>>()?,
                        src.users(&UserFilter::new().role(RoleProfile::Sales))?,
                    ))
                };
                Ok::<_, rusqlite::Error>(run())
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(actual.0, expected.0);
        assert_eq!(actual.1, expected.1);
        assert_eq!(actual.2, expected.2);
        assert_eq!(actual.3, expected.3);

        let names: Vec<&str> = actual.0[0].iter().map(|t| t.task.name.as_str()).collect();
        assert_eq!(names, vec!["T-2", "T-1", "T-3", "T-4"]);
        assert_eq!(actual.0[0][1].contact_last_name.as_deref(), Some("Rao"));
        let users: Vec<&str> = actual.3.iter().map(|u| u.full_name.as_str()).collect();
        assert_eq!(users, vec!["Aarav", "Zoya"]);
    }

    #[tokio::test]
    async fn test_read_task_ignores_visibility() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(move |conn| load_fixture(conn, &fixture))
            .await
            .unwrap();
        let (found, missing) = db
            .reader()
            .call(|conn| Ok::<_, rusqlite::Error>((read_task(conn, "T-3")?, read_task(conn, "T-9")?)))
            .await
            .unwrap();
        assert_eq!(found.unwrap().assigned_sales.as_deref(), Some("b@example.com"));
        assert!(missing.is_none());
    }
}
