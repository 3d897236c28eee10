//! Record sources the report engine reads from.
//!
//! Engines are generic over [`RecordSource`] so they run unchanged against
//! SQLite or against an in-memory fake.

mod memory;
mod sqlite;

pub use memory::MemorySource;
pub use sqlite::SqliteSource;
pub(crate) use sqlite::read_task;

use crate::error::Result;
use crate::model::{Boq, Company, CrmUser, Session, TaskRow};
use crate::query::filter::{BoqFilter, CompanyFilter, TaskFilter, UserFilter};

/// Filtered, ordered access to CRM records. Every call is a conjunction of
/// the filter's predicates; ties in ordering keep the source's native order.
pub trait RecordSource {
    fn users(&self, filter: &UserFilter) -> Result<Vec<CrmUser>>;
    fn companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>>;
    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRow>>;
    fn boqs(&self, filter: &BoqFilter) -> Result<Vec<Boq>>;
}

/// Applies row visibility for a session: non-admins only see companies,
/// tasks and BOQs assigned to them. User records are not scoped.
pub struct ScopedSource<S> {
    inner: S,
    owner: Option<String>,
}

impl<S: RecordSource> ScopedSource<S> {
    pub fn new(inner: S, session: &Session) -> Self {
        Self {
            inner,
            owner: session.visible_owner().map(str::to_string),
        }
    }
}

impl<S: RecordSource> RecordSource for ScopedSource<S> {
    fn users(&self, filter: &UserFilter) -> Result<Vec<CrmUser>> {
        self.inner.users(filter)
    }

    fn companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>> {
        self.inner
            .companies(&filter.clone().restrict_owner(self.owner.as_deref()))
    }

    fn tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRow>> {
        self.inner
            .tasks(&filter.clone().restrict_owner(self.owner.as_deref()))
    }

    fn boqs(&self, filter: &BoqFilter) -> Result<Vec<Boq>> {
        self.inner
            .boqs(&filter.clone().restrict_owner(self.owner.as_deref()))
    }
}
