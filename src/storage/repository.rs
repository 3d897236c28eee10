use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::date_util::{format_date, format_timestamp};
use crate::error::{Error, Result};
use crate::lifecycle::{self, LastMeetingUpdate};
use crate::model::{Boq, Company, Contact, CrmUser, RoleProfile, Session, Task, TaskStatus};
use crate::source::read_task;

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

// ── Records ────────────────────────────────────────────────────────

pub fn upsert_user(conn: &Connection, user: &CrmUser) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO crm_users (name, full_name, email, role_profile, has_company)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(name) DO UPDATE SET
            full_name = excluded.full_name,
            email = excluded.email,
            role_profile = excluded.role_profile,
            has_company = excluded.has_company",
        params![
            user.name,
            user.full_name,
            user.email,
            user.role_profile.as_str(),
            user.has_company as i32,
        ],
    )?;
    Ok(())
}

pub fn upsert_company(
    conn: &Connection,
    company: &Company,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO crm_companies
            (name, company_name, company_city, assigned_sales, priority, last_meeting,
             creation, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(name) DO UPDATE SET
            company_name = excluded.company_name,
            company_city = excluded.company_city,
            assigned_sales = excluded.assigned_sales,
            priority = excluded.priority,
            last_meeting = excluded.last_meeting,
            creation = excluded.creation,
            modified = excluded.modified",
        params![
            company.name,
            company.company_name,
            company.company_city,
            company.assigned_sales,
            company.priority.as_str(),
            company.last_meeting.map(format_date),
            format_timestamp(company.creation),
            format_timestamp(company.last_modified()),
        ],
    )?;
    Ok(())
}

pub fn upsert_contact(
    conn: &Connection,
    contact: &Contact,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO crm_contacts
            (name, first_name, last_name, email, mobile, company, assigned_sales,
             last_meeting, creation, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(name) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            mobile = excluded.mobile,
            company = excluded.company,
            assigned_sales = excluded.assigned_sales,
            last_meeting = excluded.last_meeting,
            creation = excluded.creation,
            modified = excluded.modified",
        params![
            contact.name,
            contact.first_name,
            contact.last_name,
            contact.email,
            contact.mobile,
            contact.company,
            contact.assigned_sales,
            contact.last_meeting.map(format_date),
            format_timestamp(contact.creation),
            format_timestamp(contact.modified.unwrap_or(contact.creation)),
        ],
    )?;
    Ok(())
}

/// Write a task without running lifecycle hooks. Used for imports, where
/// no status transition has taken place.
pub fn insert_task(conn: &Connection, task: &Task) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO crm_tasks
            (name, type, status, start_date, company, contact, boq, task_profile,
             assigned_sales, owner, remarks, creation, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(name) DO UPDATE SET
            type = excluded.type,
            status = excluded.status,
            start_date = excluded.start_date,
            company = excluded.company,
            contact = excluded.contact,
            boq = excluded.boq,
            task_profile = excluded.task_profile,
            assigned_sales = excluded.assigned_sales,
            owner = excluded.owner,
            remarks = excluded.remarks,
            creation = excluded.creation,
            modified = excluded.modified",
        params![
            task.name,
            task.task_type.as_str(),
            task.status.as_str(),
            task.start_date.map(format_date),
            task.company,
            task.contact,
            task.boq,
            task.task_profile.as_ref().map(|p| p.as_str().to_string()),
            task.assigned_sales,
            task.owner,
            task.remarks,
            format_timestamp(task.creation),
            format_timestamp(task.last_modified()),
        ],
    )?;
    Ok(())
}

pub fn upsert_boq(conn: &Connection, boq: &Boq) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO crm_boqs
            (name, boq_name, boq_type, city, company, contact, boq_status, deal_status,
             boq_value, boq_submission_date, assigned_sales, assigned_estimations,
             creation, modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(name) DO UPDATE SET
            boq_name = excluded.boq_name,
            boq_type = excluded.boq_type,
            city = excluded.city,
            company = excluded.company,
            contact = excluded.contact,
            boq_status = excluded.boq_status,
            deal_status = excluded.deal_status,
            boq_value = excluded.boq_value,
            boq_submission_date = excluded.boq_submission_date,
            assigned_sales = excluded.assigned_sales,
            assigned_estimations = excluded.assigned_estimations,
            creation = excluded.creation,
            modified = excluded.modified",
        params![
            boq.name,
            boq.boq_name,
            boq.boq_type,
            boq.city,
            boq.company,
            boq.contact,
            boq.boq_status.as_ref().map(|s| s.as_str().to_string()),
            boq.deal_status.as_ref().map(|s| s.as_str().to_string()),
            boq.boq_value,
            boq.boq_submission_date.map(format_date),
            boq.assigned_sales,
            boq.assigned_estimations,
            format_timestamp(boq.creation),
            format_timestamp(boq.last_modified()),
        ],
    )?;
    Ok(())
}

pub fn get_user(
    conn: &Connection,
    email: &str,
) -> std::result::Result<Option<CrmUser>, rusqlite::Error> {
    conn.query_row(
        "SELECT name, full_name, email, role_profile, has_company
         FROM crm_users WHERE name = ?1 OR email = ?1
         LIMIT 1",
        params![email],
        |row| {
            Ok(CrmUser {
                name: row.get(0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
                role_profile: row.get::<_, String>(3)?.into(),
                has_company: row.get::<_, i32>(4)? != 0,
            })
        },
    )
    .optional()
}

pub fn count_rows(conn: &Connection, table: &str) -> std::result::Result<i64, rusqlite::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
}

// ── Fixtures ───────────────────────────────────────────────────────

/// A batch of records to import, as read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<CrmUser>,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub boqs: Vec<Boq>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    pub users: usize,
    pub companies: usize,
    pub contacts: usize,
    pub tasks: usize,
    pub boqs: usize,
}

/// Import a fixture in one transaction. Tasks are inserted without hooks.
pub fn load_fixture(
    conn: &Connection,
    fixture: &Fixture,
) -> std::result::Result<LoadReport, rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    for user in &fixture.users {
        upsert_user(&tx, user)?;
    }
    for company in &fixture.companies {
        upsert_company(&tx, company)?;
    }
    for contact in &fixture.contacts {
        upsert_contact(&tx, contact)?;
    }
    for task in &fixture.tasks {
        insert_task(&tx, task)?;
    }
    for boq in &fixture.boqs {
        upsert_boq(&tx, boq)?;
    }
    tx.commit()?;
    Ok(LoadReport {
        users: fixture.users.len(),
        companies: fixture.companies.len(),
        contacts: fixture.contacts.len(),
        tasks: fixture.tasks.len(),
        boqs: fixture.boqs.len(),
    })
}

// ── Task updates ───────────────────────────────────────────────────

/// Save an existing task and propagate a completed in-person meeting to the
/// linked company and contact. Propagation bypasses row visibility; a failure
/// there is logged and does not undo the task update.
pub fn update_task(
    conn: &Connection,
    task: &Task,
) -> std::result::Result<Option<LastMeetingUpdate>, rusqlite::Error> {
    let before = read_task(conn, &task.name)?;
    insert_task(conn, task)?;
    let update = lifecycle::last_meeting_update(before.as_ref(), task);
    if let Some(ref update) = update {
        apply_last_meeting(conn, update, task.last_modified());
    }
    Ok(update)
}

fn apply_last_meeting(conn: &Connection, update: &LastMeetingUpdate, at: NaiveDateTime) {
    let date = format_date(update.date);
    let at = format_timestamp(at);
    for (table, id) in [
        ("crm_companies", update.company.as_deref()),
        ("crm_contacts", update.contact.as_deref()),
    ] {
        let Some(id) = id else { continue };
        let sql = format!("UPDATE {table} SET last_meeting = ?1, modified = ?2 WHERE name = ?3");
        match conn.execute(&sql, params![date, at, id]) {
            Ok(0) => log::warn!(
                "task {}: linked record {id} not found in {table}",
                update.task
            ),
            Ok(_) => log::debug!("task {}: set last_meeting of {id} to {date}", update.task),
            Err(e) => log::error!(
                "task {}: failed to update last_meeting of {id}: {e}",
                update.task
            ),
        }
    }
}

/// Change a task's status on behalf of `session`.
pub fn set_task_status(
    conn: &Connection,
    session: &Session,
    name: &str,
    status: TaskStatus,
    now: NaiveDateTime,
) -> Result<Task> {
    if let TaskStatus::Other(ref unknown) = status {
        return Err(Error::Validation(format!("unknown task status '{unknown}'")));
    }
    let mut task =
        read_task(conn, name)?.ok_or_else(|| Error::NotFound(format!("task '{name}'")))?;
    if let Some(owner) = session.visible_owner() {
        if task.assigned_sales.as_deref() != Some(owner) {
            return Err(Error::Permission(format!(
                "You do not have permission to update task '{name}'."
            )));
        }
    }
    task.status = status;
    task.modified = Some(now);
    update_task(conn, &task)?;
    Ok(task)
}

// ── Users ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub role_profile: RoleProfile,
}

/// Provision a CRM user. Only admins may do this.
pub fn create_user(conn: &Connection, session: &Session, new_user: &NewUser) -> Result<CrmUser> {
    if !session.is_admin() {
        return Err(Error::Permission(
            "You do not have permission to create new users.".into(),
        ));
    }
    let email = new_user.email.trim();
    if !RE_EMAIL.is_match(email) {
        return Err(Error::Validation(format!("invalid email address '{email}'")));
    }
    let first_name = new_user.first_name.trim();
    if first_name.is_empty() {
        return Err(Error::Validation("first name is required".into()));
    }
    if let RoleProfile::Other(ref role) = new_user.role_profile {
        return Err(Error::Validation(format!("unknown role profile: {role}")));
    }
    if get_user(conn, email)?.is_some() {
        return Err(Error::Validation(format!(
            "User with email '{email}' already exists."
        )));
    }

    let user = CrmUser {
        name: email.to_string(),
        full_name: first_name.to_string(),
        email: email.to_string(),
        role_profile: new_user.role_profile.clone(),
        has_company: false,
    };
    upsert_user(conn, &user)?;
    log::info!("created user {} ({})", user.email, user.role_profile);
    Ok(user)
}

/// Resolve the caller: an explicit user, else the `session_user` setting.
pub fn resolve_session(conn: &Connection, user: Option<&str>) -> Result<Session> {
    let email = match user {
        Some(u) => u.to_string(),
        None => get_config(conn, "session_user")?.ok_or_else(|| {
            Error::Config("no session user (pass --user or set config session_user)".into())
        })?,
    };
    let user =
        get_user(conn, &email)?.ok_or_else(|| Error::Config(format!("unknown user '{email}'")))?;
    Ok(Session::new(user.email, user.role_profile))
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(
    conn: &Connection,
    key: &str,
) -> std::result::Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(
    conn: &Connection,
    key: &str,
    value: &str,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> std::result::Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
