//! Record predicates shared by every [`RecordSource`](crate::source::RecordSource).
//!
//! Each filter renders itself to SQL for the SQLite source and evaluates
//! itself directly for the in-memory source. Both paths must agree, so every
//! predicate is written twice, side by side.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;

use crate::date_util::{format_date, format_timestamp};
use crate::model::{
    Boq, BoqStatus, Company, CrmUser, DealStatus, Priority, RoleProfile, Task, TaskProfile,
    TaskStatus, TaskType,
};

/// Accumulates WHERE clauses and their numbered parameters.
#[derive(Default)]
struct Clauses {
    wheres: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Clauses {
    fn bind(&mut self, value: impl ToSql + 'static) -> String {
        self.params.push(Box::new(value));
        format!("?{}", self.params.len())
    }

    fn cmp(&mut self, column: &str, op: &str, value: impl ToSql + 'static) {
        let p = self.bind(value);
        self.wheres.push(format!("{column} {op} {p}"));
    }

    fn in_list(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            self.wheres.push("0".to_string());
            return;
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
        self.wheres
            .push(format!("{column} IN ({})", placeholders.join(", ")));
    }

    fn not_in_list(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
        self.wheres
            .push(format!("{column} NOT IN ({})", placeholders.join(", ")));
    }

    fn finish(
        mut self,
        select: &str,
        order: &str,
        limit: Option<u32>,
    ) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = select.to_string();
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
        if let Some(limit) = limit {
            let p = self.bind(limit);
            sql.push_str(&format!(" LIMIT {p}"));
        }
        (sql, self.params)
    }
}

fn strings<T: ToString>(values: &[T]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn option_in(value: Option<&String>, set: &Option<Vec<String>>) -> bool {
    match set {
        None => true,
        Some(set) => value.is_some_and(|v| set.contains(v)),
    }
}

fn option_eq(value: Option<&String>, expected: &Option<String>) -> bool {
    match expected {
        None => true,
        Some(e) => value == Some(e),
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskOrder {
    #[default]
    StartDateDesc,
    StartDateAsc,
    ModifiedDesc,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    task_type: Option<TaskType>,
    statuses: Option<Vec<TaskStatus>>,
    excluded_statuses: Vec<TaskStatus>,
    start_from: Option<NaiveDate>,
    start_to: Option<NaiveDate>,
    assigned_sales: Option<String>,
    companies: Option<Vec<String>>,
    requires_company: bool,
    profiles: Option<Vec<TaskProfile>>,
    restrict_owner: Option<String>,
    order: TaskOrder,
    limit: Option<u32>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_type(mut self, t: TaskType) -> Self {
        self.task_type = Some(t);
        self
    }

    pub fn status(self, s: TaskStatus) -> Self {
        self.statuses(vec![s])
    }

    pub fn statuses(mut self, s: Vec<TaskStatus>) -> Self {
        self.statuses = Some(s);
        self
    }

    pub fn exclude_statuses(mut self, s: Vec<TaskStatus>) -> Self {
        self.excluded_statuses = s;
        self
    }

    /// Inclusive `start_date` range. Either bound may be omitted.
    pub fn start_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.start_from = from;
        self.start_to = to;
        self
    }

    pub fn assigned_sales(mut self, owner: &str) -> Self {
        self.assigned_sales = Some(owner.to_string());
        self
    }

    pub fn companies(mut self, ids: Vec<String>) -> Self {
        self.companies = Some(ids);
        self
    }

    pub fn requires_company(mut self) -> Self {
        self.requires_company = true;
        self
    }

    pub fn profiles(mut self, p: Vec<TaskProfile>) -> Self {
        self.profiles = Some(p);
        self
    }

    pub fn restrict_owner(mut self, owner: Option<&str>) -> Self {
        self.restrict_owner = owner.map(str::to_string);
        self
    }

    pub fn order(mut self, order: TaskOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn get_limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn get_order(&self) -> TaskOrder {
        self.order
    }

    pub fn build_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let select = "SELECT t.name, t.type, t.status, t.start_date, t.company, t.contact, t.boq,
                t.task_profile, t.assigned_sales, t.owner, t.remarks, t.creation, t.modified,
                c.company_name, ct.first_name, ct.last_name
            FROM crm_tasks t
            LEFT JOIN crm_companies c ON c.name = t.company
            LEFT JOIN crm_contacts ct ON ct.name = t.contact";

        let mut q = Clauses::default();
        if let Some(ref t) = self.task_type {
            q.cmp("t.type", "=", t.to_string());
        }
        if let Some(ref s) = self.statuses {
            q.in_list("t.status", &strings(s));
        }
        q.not_in_list("t.status", &strings(&self.excluded_statuses));
        if let Some(d) = self.start_from {
            q.cmp("t.start_date", ">=", format_date(d));
        }
        if let Some(d) = self.start_to {
            q.cmp("t.start_date", "<=", format_date(d));
        }
        if let Some(ref owner) = self.assigned_sales {
            q.cmp("t.assigned_sales", "=", owner.clone());
        }
        if let Some(ref ids) = self.companies {
            q.in_list("t.company", ids);
        }
        if self.requires_company {
            q.wheres
                .push("t.company IS NOT NULL AND t.company != ''".to_string());
        }
        if let Some(ref p) = self.profiles {
            q.in_list("t.task_profile", &strings(p));
        }
        if let Some(ref owner) = self.restrict_owner {
            q.cmp("t.assigned_sales", "=", owner.clone());
        }

        let order = match self.order {
            TaskOrder::StartDateDesc => "t.start_date DESC, t.rowid ASC",
            TaskOrder::StartDateAsc => "t.start_date ASC, t.rowid ASC",
            TaskOrder::ModifiedDesc => "COALESCE(t.modified, t.creation) DESC, t.rowid ASC",
        };
        q.finish(select, order, self.limit)
    }

    pub fn matches(&self, task: &Task) -> bool {
        if self.task_type.as_ref().is_some_and(|t| *t != task.task_type) {
            return false;
        }
        if self
            .statuses
            .as_ref()
            .is_some_and(|s| !s.contains(&task.status))
        {
            return false;
        }
        if self.excluded_statuses.contains(&task.status) {
            return false;
        }
        if let Some(from) = self.start_from {
            if !task.start_date.is_some_and(|d| d >= from) {
                return false;
            }
        }
        if let Some(to) = self.start_to {
            if !task.start_date.is_some_and(|d| d <= to) {
                return false;
            }
        }
        if !option_eq(task.assigned_sales.as_ref(), &self.assigned_sales) {
            return false;
        }
        if !option_in(task.company.as_ref(), &self.companies) {
            return false;
        }
        if self.requires_company && task.company.as_deref().unwrap_or("").is_empty() {
            return false;
        }
        if let Some(ref p) = self.profiles {
            if !task.task_profile.as_ref().is_some_and(|tp| p.contains(tp)) {
                return false;
            }
        }
        option_eq(task.assigned_sales.as_ref(), &self.restrict_owner)
    }
}

// ── BOQs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BoqFilter {
    assigned_sales: Option<String>,
    created_from: Option<NaiveDateTime>,
    created_to: Option<NaiveDateTime>,
    companies: Option<Vec<String>>,
    excluded_statuses: Vec<BoqStatus>,
    deal_status: Option<DealStatus>,
    restrict_owner: Option<String>,
}

impl BoqFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assigned_sales(mut self, owner: &str) -> Self {
        self.assigned_sales = Some(owner.to_string());
        self
    }

    /// Half-open `creation` range: `from <= creation < to`, so adjacent
    /// windows never share a record.
    pub fn created_between(mut self, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    pub fn companies(mut self, ids: Vec<String>) -> Self {
        self.companies = Some(ids);
        self
    }

    /// Open BOQs only.
    pub fn active(mut self) -> Self {
        self.excluded_statuses = BoqStatus::TERMINAL.to_vec();
        self
    }

    pub fn deal_status(mut self, d: DealStatus) -> Self {
        self.deal_status = Some(d);
        self
    }

    pub fn restrict_owner(mut self, owner: Option<&str>) -> Self {
        self.restrict_owner = owner.map(str::to_string);
        self
    }

    pub fn build_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let select = "SELECT b.name, b.boq_name, b.boq_type, b.city, b.company, b.contact,
                b.boq_status, b.deal_status, b.boq_value, b.boq_submission_date,
                b.assigned_sales, b.assigned_estimations, b.creation, b.modified
            FROM crm_boqs b";

        let mut q = Clauses::default();
        if let Some(ref owner) = self.assigned_sales {
            q.cmp("b.assigned_sales", "=", owner.clone());
        }
        if let Some(ts) = self.created_from {
            q.cmp("b.creation", ">=", format_timestamp(ts));
        }
        if let Some(ts) = self.created_to {
            q.cmp("b.creation", "<", format_timestamp(ts));
        }
        if let Some(ref ids) = self.companies {
            q.in_list("b.company", ids);
        }
        q.not_in_list(
            "COALESCE(b.boq_status, '')",
            &strings(&self.excluded_statuses),
        );
        if let Some(ref d) = self.deal_status {
            q.cmp("b.deal_status", "=", d.to_string());
        }
        if let Some(ref owner) = self.restrict_owner {
            q.cmp("b.assigned_sales", "=", owner.clone());
        }
        q.finish(select, "b.creation DESC, b.rowid ASC", None)
    }

    pub fn matches(&self, boq: &Boq) -> bool {
        if !option_eq(boq.assigned_sales.as_ref(), &self.assigned_sales) {
            return false;
        }
        if self.created_from.is_some_and(|ts| boq.creation < ts) {
            return false;
        }
        if self.created_to.is_some_and(|ts| boq.creation >= ts) {
            return false;
        }
        if !option_in(boq.company.as_ref(), &self.companies) {
            return false;
        }
        if boq
            .boq_status
            .as_ref()
            .is_some_and(|s| self.excluded_statuses.contains(s))
        {
            return false;
        }
        if let Some(ref d) = self.deal_status {
            if boq.deal_status.as_ref() != Some(d) {
                return false;
            }
        }
        option_eq(boq.assigned_sales.as_ref(), &self.restrict_owner)
    }
}

// ── Companies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompanyOrder {
    #[default]
    CreationDesc,
    /// Most recently met first, never-met companies last.
    LastMeetingDesc,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyFilter {
    assigned_sales: Option<String>,
    assigned_sales_in: Option<Vec<String>>,
    excluded_priorities: Vec<Priority>,
    created_to: Option<NaiveDateTime>,
    restrict_owner: Option<String>,
    order: CompanyOrder,
}

impl CompanyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assigned_sales(mut self, owner: &str) -> Self {
        self.assigned_sales = Some(owner.to_string());
        self
    }

    pub fn assigned_sales_in(mut self, owners: Vec<String>) -> Self {
        self.assigned_sales_in = Some(owners);
        self
    }

    /// Exclude held and untriaged companies.
    pub fn active(mut self) -> Self {
        self.excluded_priorities = Priority::INACTIVE.to_vec();
        self
    }

    /// Inclusive upper bound on `creation`.
    pub fn created_to(mut self, ts: NaiveDateTime) -> Self {
        self.created_to = Some(ts);
        self
    }

    pub fn restrict_owner(mut self, owner: Option<&str>) -> Self {
        self.restrict_owner = owner.map(str::to_string);
        self
    }

    pub fn order(mut self, order: CompanyOrder) -> Self {
        self.order = order;
        self
    }

    pub fn build_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let select = "SELECT c.name, c.company_name, c.company_city, c.assigned_sales, c.priority,
                c.last_meeting, c.creation, c.modified
            FROM crm_companies c";

        let mut q = Clauses::default();
        if let Some(ref owner) = self.assigned_sales {
            q.cmp("c.assigned_sales", "=", owner.clone());
        }
        if let Some(ref owners) = self.assigned_sales_in {
            q.in_list("c.assigned_sales", owners);
        }
        q.not_in_list(
            "COALESCE(c.priority, '')",
            &strings(&self.excluded_priorities),
        );
        if let Some(ts) = self.created_to {
            q.cmp("c.creation", "<=", format_timestamp(ts));
        }
        if let Some(ref owner) = self.restrict_owner {
            q.cmp("c.assigned_sales", "=", owner.clone());
        }
        let order = match self.order {
            CompanyOrder::CreationDesc => "c.creation DESC, c.rowid ASC",
            CompanyOrder::LastMeetingDesc => "c.last_meeting DESC, c.rowid ASC",
        };
        q.finish(select, order, None)
    }

    pub fn matches(&self, company: &Company) -> bool {
        if !option_eq(company.assigned_sales.as_ref(), &self.assigned_sales) {
            return false;
        }
        if !option_in(company.assigned_sales.as_ref(), &self.assigned_sales_in) {
            return false;
        }
        if self.excluded_priorities.contains(&company.priority) {
            return false;
        }
        if self.created_to.is_some_and(|ts| company.creation > ts) {
            return false;
        }
        option_eq(company.assigned_sales.as_ref(), &self.restrict_owner)
    }

    pub fn get_order(&self) -> CompanyOrder {
        self.order
    }
}

// ── Users ──────────────────────────────────────────────────────────

/// Users are ordered by full name.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    role: Option<RoleProfile>,
    emails: Option<Vec<String>>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: RoleProfile) -> Self {
        self.role = Some(role);
        self
    }

    pub fn emails(mut self, emails: Vec<String>) -> Self {
        self.emails = Some(emails);
        self
    }

    pub fn build_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let select = "SELECT u.name, u.full_name, u.email, u.role_profile, u.has_company
            FROM crm_users u";
        let mut q = Clauses::default();
        if let Some(ref role) = self.role {
            q.cmp("u.role_profile", "=", role.to_string());
        }
        if let Some(ref emails) = self.emails {
            q.in_list("u.email", emails);
        }
        q.finish(select, "u.full_name ASC, u.rowid ASC", None)
    }

    pub fn matches(&self, user: &CrmUser) -> bool {
        if self.role.as_ref().is_some_and(|r| *r != user.role_profile) {
            return false;
        }
        match self.emails {
            Some(ref emails) => emails.contains(&user.email),
            None => true,
        }
    }
}
