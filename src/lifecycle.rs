//! Write-side derivation of `last_meeting` on companies and contacts.

use chrono::NaiveDate;

use crate::model::{Task, TaskStatus};

/// `last_meeting` change to apply after a task update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMeetingUpdate {
    pub task: String,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub date: NaiveDate,
}

/// Decide whether saving `after` over `before` completes an in-person
/// meeting. Only a transition into `Completed` qualifies, so creation
/// (`before == None`) and saves that leave the status unchanged never do.
pub fn last_meeting_update(before: Option<&Task>, after: &Task) -> Option<LastMeetingUpdate> {
    let before = before?;
    if before.status == TaskStatus::Completed || after.status != TaskStatus::Completed {
        return None;
    }
    if !after.is_in_person_meeting() {
        return None;
    }
    let date = after.start_date?;
    if after.company.is_none() && after.contact.is_none() {
        return None;
    }
    Some(LastMeetingUpdate {
        task: after.name.clone(),
        company: after.company.clone().filter(|c| !c.is_empty()),
        contact: after.contact.clone().filter(|c| !c.is_empty()),
        date,
    })
}
