use crate::error::Result;
use crate::model::{Boq, Company, Contact, CrmUser, Task, TaskRow};
use crate::query::filter::{
    BoqFilter, CompanyFilter, CompanyOrder, TaskFilter, TaskOrder, UserFilter,
};

use super::RecordSource;

/// Vector-backed record source. Insertion order is the native order used to
/// break ordering ties, matching `rowid` order in SQLite.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    users: Vec<CrmUser>,
    companies: Vec<Company>,
    contacts: Vec<Contact>,
    tasks: Vec<Task>,
    boqs: Vec<Boq>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user: CrmUser) {
        self.users.push(user);
    }

    pub fn add_company(&mut self, company: Company) {
        self.companies.push(company);
    }

    pub fn add_contact(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn add_boq(&mut self, boq: Boq) {
        self.boqs.push(boq);
    }

    fn task_row(&self, task: &Task) -> TaskRow {
        let company = task
            .company
            .as_ref()
            .and_then(|id| self.companies.iter().find(|c| &c.name == id));
        let contact = task
            .contact
            .as_ref()
            .and_then(|id| self.contacts.iter().find(|c| &c.name == id));
        TaskRow {
            task: task.clone(),
            company_name: company.and_then(|c| c.company_name.clone()),
            contact_first_name: contact.and_then(|c| c.first_name.clone()),
            contact_last_name: contact.and_then(|c| c.last_name.clone()),
        }
    }
}

impl RecordSource for MemorySource {
    fn users(&self, filter: &UserFilter) -> Result<Vec<CrmUser>> {
        let mut users: Vec<CrmUser> = self
            .users
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    fn companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>> {
        let mut companies: Vec<Company> = self
            .companies
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        match filter.get_order() {
            CompanyOrder::CreationDesc => companies.sort_by(|a, b| b.creation.cmp(&a.creation)),
            CompanyOrder::LastMeetingDesc => {
                companies.sort_by(|a, b| b.last_meeting.cmp(&a.last_meeting))
            }
        }
        Ok(companies)
    }

    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRow>> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| filter.matches(t)).collect();
        match filter.get_order() {
            TaskOrder::StartDateDesc => tasks.sort_by(|a, b| b.start_date.cmp(&a.start_date)),
            TaskOrder::StartDateAsc => tasks.sort_by(|a, b| a.start_date.cmp(&b.start_date)),
            TaskOrder::ModifiedDesc => {
                tasks.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()))
            }
        }
        if let Some(limit) = filter.get_limit() {
            tasks.truncate(limit as usize);
        }
        Ok(tasks.into_iter().map(|t| self.task_row(t)).collect())
    }

    fn boqs(&self, filter: &BoqFilter) -> Result<Vec<Boq>> {
        let mut boqs: Vec<Boq> = self
            .boqs
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        boqs.sort_by(|a, b| b.creation.cmp(&a.creation));
        Ok(boqs)
    }
}
