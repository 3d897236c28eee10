pub mod date_util;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod reports;
pub mod search;
pub mod source;
pub mod storage;

pub use error::{Error, Result};
pub use model::{RoleProfile, Session, TaskProfileFilter, TaskStatus};
pub use query::window::{ReportWindow, ReportWindows};
pub use reports::{
    MeetingKey, OwnerExceptions, OwnerPerformance, PerformanceOptions, RosterEntry, SalesTasks,
};
pub use search::{SearchHit, SearchResults};
pub use storage::repository::{Fixture, LoadReport, NewUser};
pub use storage::Database;

use chrono::NaiveDate;
use rusqlite::Connection;

use model::{CrmUser, Task};
use source::{ScopedSource, SqliteSource};
use storage::repository;

/// Config key selecting the meeting deduplication key.
pub const DEDUPE_KEY_CONFIG: &str = "meeting_dedupe_key";

/// Entry point for the CRM reporting engine.
pub struct NirmaanCrm {
    db: Database,
}

impl NirmaanCrm {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Resolve the caller from `user`, or from the `session_user` setting.
    pub async fn session(&self, user: Option<&str>) -> Result<Session> {
        let user = user.map(str::to_string);
        self.db
            .reader()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>(repository::resolve_session(conn, user.as_deref()))
            })
            .await?
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Sales performance for `today`. Without an explicit dedupe key the
    /// `meeting_dedupe_key` setting applies, defaulting to company.
    pub async fn sales_performance(
        &self,
        session: &Session,
        today: NaiveDate,
        profile: TaskProfileFilter,
        dedupe_key: Option<MeetingKey>,
    ) -> Result<Vec<OwnerPerformance>> {
        self.run_report("sales performance report", session, move |conn, source| {
            let dedupe_key = match dedupe_key {
                Some(key) => key,
                None => match repository::get_config(conn, DEDUPE_KEY_CONFIG)? {
                    Some(value) => MeetingKey::parse(&value)?,
                    None => MeetingKey::default(),
                },
            };
            let options = PerformanceOptions {
                profile,
                dedupe_key,
            };
            reports::sales_performance(source, today, &options)
        })
        .await
    }

    pub async fn exception_report(
        &self,
        session: &Session,
        today: NaiveDate,
        profile: TaskProfileFilter,
    ) -> Result<Vec<OwnerExceptions>> {
        self.run_report("exception report", session, move |_, source| {
            reports::exception_report(source, today, profile)
        })
        .await
    }

    pub async fn company_roster(
        &self,
        session: &Session,
        today: NaiveDate,
        profile: TaskProfileFilter,
    ) -> Result<Vec<RosterEntry>> {
        self.run_report("company roster", session, move |_, source| {
            reports::company_roster(source, today, profile)
        })
        .await
    }

    pub async fn sales_tasks(
        &self,
        session: &Session,
        profile: TaskProfileFilter,
    ) -> Result<SalesTasks> {
        self.run_report("sales tasks", session, move |_, source| {
            reports::sales_tasks(source, profile)
        })
        .await
    }

    pub async fn search(&self, session: &Session, term: &str) -> Result<SearchResults> {
        search::search(&self.db, session, term)
            .await
            .map_err(|e| e.into_report_error("global search"))
    }

    /// Run a report engine inside one reader call, scoped to `session`.
    async fn run_report<T, F>(&self, context: &'static str, session: &Session, report: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &ScopedSource<SqliteSource<'_>>) -> Result<T> + Send + 'static,
    {
        let session = session.clone();
        let outcome = self
            .db
            .reader()
            .call(move |conn| {
                let conn: &Connection = conn;
                let source = ScopedSource::new(SqliteSource::new(conn), &session);
                Ok::<_, rusqlite::Error>(report(conn, &source))
            })
            .await;
        match outcome {
            Ok(result) => result,
            Err(e) => Err(Error::from(e)),
        }
        .map_err(|e| e.into_report_error(context))
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Import a fixture. Task inserts never fire the last-meeting hook.
    pub async fn load_fixture(&self, fixture: Fixture) -> Result<LoadReport> {
        let report = self
            .db
            .writer()
            .call(move |conn| repository::load_fixture(conn, &fixture))
            .await?;
        log::info!(
            "loaded {} users, {} companies, {} contacts, {} tasks, {} boqs",
            report.users,
            report.companies,
            report.contacts,
            report.tasks,
            report.boqs
        );
        Ok(report)
    }

    pub async fn set_task_status(
        &self,
        session: &Session,
        task: &str,
        status: TaskStatus,
    ) -> Result<Task> {
        let session = session.clone();
        let task = task.to_string();
        let now = chrono::Local::now().naive_local();
        self.db
            .writer()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>(repository::set_task_status(
                    conn, &session, &task, status, now,
                ))
            })
            .await?
    }

    pub async fn create_user(&self, session: &Session, new_user: NewUser) -> Result<CrmUser> {
        let session = session.clone();
        self.db
            .writer()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>(repository::create_user(conn, &session, &new_user))
            })
            .await?
    }

    /// Row counts per table.
    pub async fn counts(&self) -> Result<Vec<(&'static str, i64)>> {
        self.db
            .reader()
            .call(|conn| {
                ["crm_users", "crm_companies", "crm_contacts", "crm_tasks", "crm_boqs"]
                    .into_iter()
                    .map(|table| repository::count_rows(conn, table).map(|n| (table, n)))
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if key == DEDUPE_KEY_CONFIG {
            MeetingKey::parse(value)?;
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_date;
    use crate::reports::MeetingFlag;

    const FIXTURE: &str = r#"{
        "users": [
            {"name": "admin@example.com", "full_name": "Admin", "email": "admin@example.com",
             "role_profile": "Nirmaan Admin User Profile"},
            {"name": "rep@example.com", "full_name": "Rep One", "email": "rep@example.com",
             "role_profile": "Nirmaan Sales User Profile"},
            {"name": "two@example.com", "full_name": "Rep Two", "email": "two@example.com",
             "role_profile": "Nirmaan Sales User Profile"}
        ],
        "companies": [
            {"name": "C-1", "company_name": "Acme", "assigned_sales": "rep@example.com",
             "priority": "P1", "creation": "2025-01-01 10:00:00"},
            {"name": "C-2", "company_name": "Zenith", "assigned_sales": "two@example.com",
             "priority": "P2", "creation": "2025-01-01 10:00:00"}
        ],
        "contacts": [
            {"name": "CT-1", "first_name": "Asha", "company": "C-1",
             "creation": "2025-01-01 10:00:00"},
            {"name": "CT-2", "first_name": "Ravi", "company": "C-1",
             "creation": "2025-01-01 10:00:00"}
        ],
        "tasks": [
            {"name": "T-1", "type": "In Person Meeting", "status": "Completed",
             "start_date": "2025-03-10", "company": "C-1", "contact": "CT-1",
             "task_profile": "Sales", "assigned_sales": "rep@example.com",
             "creation": "2025-03-01 10:00:00"},
            {"name": "T-2", "type": "In Person Meeting", "status": "Completed",
             "start_date": "2025-03-11", "company": "C-1", "contact": "CT-2",
             "task_profile": "Sales", "assigned_sales": "rep@example.com",
             "creation": "2025-03-01 10:00:00"},
            {"name": "T-3", "type": "In Person Meeting", "status": "Scheduled",
             "start_date": "2025-03-14", "company": "C-2",
             "task_profile": "Sales", "assigned_sales": "two@example.com",
             "creation": "2025-03-01 10:00:00"}
        ]
    }"#;

    async fn crm() -> NirmaanCrm {
        let crm = NirmaanCrm::new(Database::open_memory().await.unwrap());
        crm.load_fixture(serde_json::from_str(FIXTURE).unwrap())
            .await
            .unwrap();
        crm
    }

    fn today() -> NaiveDate {
        parse_date("2025-03-12").unwrap()
    }

    #[tokio::test]
    async fn test_session_from_config() {
        let crm = crm().await;
        assert!(matches!(crm.session(None).await, Err(Error::Config(_))));
        crm.config_set("session_user", "rep@example.com").await.unwrap();
        let session = crm.session(None).await.unwrap();
        assert_eq!(session.role, RoleProfile::Sales);
        assert!(matches!(
            crm.session(Some("ghost@example.com")).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_performance_uses_configured_dedupe_key() {
        let crm = crm().await;
        let admin = crm.session(Some("admin@example.com")).await.unwrap();
        let by_company = crm
            .sales_performance(&admin, today(), TaskProfileFilter::All, None)
            .await
            .unwrap();
        let rep = by_company.iter().find(|p| p.email == "rep@example.com").unwrap();
        assert_eq!(rep.this_week.meetings.len(), 2);
        assert_eq!(rep.this_week.unique_meetings.len(), 1);

        crm.config_set(DEDUPE_KEY_CONFIG, "contact").await.unwrap();
        let by_contact = crm
            .sales_performance(&admin, today(), TaskProfileFilter::All, None)
            .await
            .unwrap();
        let rep = by_contact.iter().find(|p| p.email == "rep@example.com").unwrap();
        assert_eq!(rep.this_week.unique_meetings.len(), 2);

        assert!(matches!(
            crm.config_set(DEDUPE_KEY_CONFIG, "boq").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reports_scoped_to_sales_user() {
        let crm = crm().await;
        let rep = crm.session(Some("rep@example.com")).await.unwrap();
        let report = crm
            .exception_report(&rep, today(), TaskProfileFilter::All)
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].email, "rep@example.com");
        assert_eq!(report[0].companies[0].last_meeting_status, MeetingFlag::Yes);
        assert_eq!(report[0].companies[0].next_meeting_status, MeetingFlag::No);

        let roster = crm
            .company_roster(&rep, today(), TaskProfileFilter::All)
            .await
            .unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].company.name, "C-1");
    }

    #[tokio::test]
    async fn test_create_user_requires_admin() {
        let crm = crm().await;
        let rep = crm.session(Some("rep@example.com")).await.unwrap();
        let new_user = NewUser {
            email: "new@example.com".into(),
            first_name: "Neha".into(),
            role_profile: RoleProfile::Sales,
        };
        let err = crm.create_user(&rep, new_user.clone()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "You do not have permission to create new users."
        );

        let admin = crm.session(Some("admin@example.com")).await.unwrap();
        let user = crm.create_user(&admin, new_user).await.unwrap();
        assert_eq!(user.full_name, "Neha");
        assert_eq!(crm.counts().await.unwrap()[0], ("crm_users", 4));
    }

    #[tokio::test]
    async fn test_completing_meeting_updates_company() {
        let crm = crm().await;
        let two = crm.session(Some("two@example.com")).await.unwrap();
        let task = crm
            .set_task_status(&two, "T-3", TaskStatus::Completed)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        let last_meeting: Option<String> = crm
            .db()
            .reader()
            .call(|conn| {
                conn.query_row(
                    "SELECT last_meeting FROM crm_companies WHERE name = 'C-2'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(last_meeting.as_deref(), Some("2025-03-14"));

        let rep = crm.session(Some("rep@example.com")).await.unwrap();
        assert!(matches!(
            crm.set_task_status(&rep, "T-3", TaskStatus::Pending).await,
            Err(Error::Permission(_))
        ));
    }
}
