//! Typed CRM records.
//!
//! Enumerated fields are stored as free text by the CRM, so every enum keeps
//! an `Other` variant carrying values this crate does not know about.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Other(s) => s.as_str(),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($text => $name::$variant,)+
                    other => $name::Other(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Task lifecycle status.
    TaskStatus {
        Pending => "Pending",
        Scheduled => "Scheduled",
        Completed => "Completed",
        Incomplete => "Incomplete",
    }
);

string_enum!(
    TaskType {
        InPersonMeeting => "In Person Meeting",
        Call => "Call",
        VirtualMeeting => "Virtual Meeting",
        FollowUp => "Follow-up",
        SubmitBoq => "Submit BOQ",
        FollowUpBoq => "Follow-up BOQ",
    }
);

string_enum!(
    /// Which team a task belongs to.
    TaskProfile {
        Sales => "Sales",
        Estimates => "Estimates",
    }
);

string_enum!(
    /// Company priority. An empty priority means "not yet triaged".
    Priority {
        Hold => "Hold",
        Unset => "",
    }
);

string_enum!(
    BoqStatus {
        New => "New",
        InProgress => "In-Progress",
        BoqSubmitted => "BOQ Submitted",
        PartialBoqSubmitted => "Partial BOQ Submitted",
        RevisionSubmitted => "Revision Submitted",
        RevisionPending => "Revision Pending",
        Negotiation => "Negotiation",
        Won => "Won",
        Lost => "Lost",
        Dropped => "Dropped",
        Hold => "Hold",
    }
);

string_enum!(
    DealStatus {
        Hot => "Hot",
        Warm => "Warm",
        Cold => "Cold",
    }
);

string_enum!(
    /// Role profile attached to a CRM user.
    RoleProfile {
        Admin => "Nirmaan Admin User Profile",
        Sales => "Nirmaan Sales User Profile",
        Estimations => "Nirmaan Estimations User Profile",
    }
);

impl Default for Priority {
    fn default() -> Self {
        Priority::Unset
    }
}

impl Priority {
    /// Held and untriaged companies do not count toward assignment totals.
    pub const INACTIVE: [Priority; 2] = [Priority::Hold, Priority::Unset];
}

impl BoqStatus {
    /// Terminal BOQ statuses. Anything else is an open opportunity.
    pub const TERMINAL: [BoqStatus; 3] = [BoqStatus::Won, BoqStatus::Lost, BoqStatus::Dropped];
}

impl TaskStatus {
    /// Parse a status typed by a caller. Unknown statuses are rejected so a
    /// typo never reaches the database.
    pub fn parse(s: &str) -> Result<Self> {
        match TaskStatus::from(s.trim()) {
            TaskStatus::Other(name) => Err(Error::Validation(format!(
                "unknown task status '{name}' (expected Pending, Scheduled, Completed or Incomplete)"
            ))),
            known => Ok(known),
        }
    }
}

impl RoleProfile {
    /// Accept the short names used on the command line as well as the full
    /// profile names.
    pub fn from_alias(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(RoleProfile::Admin),
            "sales" => Ok(RoleProfile::Sales),
            "estimations" | "estimates" => Ok(RoleProfile::Estimations),
            _ => match RoleProfile::from(s.trim()) {
                RoleProfile::Other(name) => {
                    Err(Error::Validation(format!("unknown role profile: {name}")))
                }
                known => Ok(known),
            },
        }
    }
}

/// Task-profile filter accepted by the reporting endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TaskProfileFilter {
    #[default]
    All,
    Sales,
    Estimates,
}

impl TaskProfileFilter {
    /// Parse `all`, `Sales` or `Estimates`. Anything else is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "all" | "All" | "" => Ok(TaskProfileFilter::All),
            "Sales" | "sales" => Ok(TaskProfileFilter::Sales),
            "Estimates" | "estimates" => Ok(TaskProfileFilter::Estimates),
            other => Err(Error::Validation(format!(
                "invalid task profile filter '{other}' (expected all, Sales or Estimates)"
            ))),
        }
    }

    pub fn profiles(&self) -> Vec<TaskProfile> {
        match self {
            TaskProfileFilter::All => vec![TaskProfile::Sales, TaskProfile::Estimates],
            TaskProfileFilter::Sales => vec![TaskProfile::Sales],
            TaskProfileFilter::Estimates => vec![TaskProfile::Estimates],
        }
    }
}

// ── Records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrmUser {
    /// Record identifier; in practice the user's email.
    pub name: String,
    pub full_name: String,
    pub email: String,
    pub role_profile: RoleProfile,
    #[serde(default)]
    pub has_company: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Company {
    pub name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_city: Option<String>,
    #[serde(default)]
    pub assigned_sales: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Start date of the most recent completed in-person meeting.
    #[serde(default)]
    pub last_meeting: Option<NaiveDate>,
    #[serde(with = "crate::date_util::timestamp")]
    pub creation: NaiveDateTime,
    #[serde(default, with = "crate::date_util::timestamp_opt")]
    pub modified: Option<NaiveDateTime>,
}

impl Company {
    /// Display name, falling back to the record id.
    pub fn display_name(&self) -> &str {
        self.company_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn last_modified(&self) -> NaiveDateTime {
        self.modified.unwrap_or(self.creation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub assigned_sales: Option<String>,
    #[serde(default)]
    pub last_meeting: Option<NaiveDate>,
    #[serde(with = "crate::date_util::timestamp")]
    pub creation: NaiveDateTime,
    #[serde(default, with = "crate::date_util::timestamp_opt")]
    pub modified: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub boq: Option<String>,
    #[serde(default)]
    pub task_profile: Option<TaskProfile>,
    /// Sales owner the task counts toward.
    #[serde(default)]
    pub assigned_sales: Option<String>,
    /// User who created the task.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(with = "crate::date_util::timestamp")]
    pub creation: NaiveDateTime,
    #[serde(default, with = "crate::date_util::timestamp_opt")]
    pub modified: Option<NaiveDateTime>,
}

impl Task {
    pub fn last_modified(&self) -> NaiveDateTime {
        self.modified.unwrap_or(self.creation)
    }

    pub fn is_in_person_meeting(&self) -> bool {
        self.task_type == TaskType::InPersonMeeting
    }
}

/// A task together with the display names of the records it links to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRow {
    #[serde(flatten)]
    pub task: Task,
    pub company_name: Option<String>,
    pub contact_first_name: Option<String>,
    pub contact_last_name: Option<String>,
}

/// Bill of Quantities: a tracked sales opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Boq {
    pub name: String,
    #[serde(default)]
    pub boq_name: Option<String>,
    #[serde(default)]
    pub boq_type: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub boq_status: Option<BoqStatus>,
    #[serde(default)]
    pub deal_status: Option<DealStatus>,
    #[serde(default)]
    pub boq_value: Option<String>,
    #[serde(default)]
    pub boq_submission_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_sales: Option<String>,
    #[serde(default)]
    pub assigned_estimations: Option<String>,
    #[serde(with = "crate::date_util::timestamp")]
    pub creation: NaiveDateTime,
    #[serde(default, with = "crate::date_util::timestamp_opt")]
    pub modified: Option<NaiveDateTime>,
}

impl Boq {
    pub fn last_modified(&self) -> NaiveDateTime {
        self.modified.unwrap_or(self.creation)
    }
}

// ── Session ────────────────────────────────────────────────────────

/// The caller a request runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub role: RoleProfile,
}

impl Session {
    pub fn new(user: impl Into<String>, role: RoleProfile) -> Self {
        Self {
            user: user.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == RoleProfile::Admin
    }

    /// Owner that record visibility is restricted to, or `None` for admins.
    pub fn visible_owner(&self) -> Option<&str> {
        if self.is_admin() {
            None
        } else {
            Some(&self.user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_enum_round_trip() {
        assert_eq!(TaskType::from("In Person Meeting"), TaskType::InPersonMeeting);
        assert_eq!(TaskType::InPersonMeeting.as_str(), "In Person Meeting");
        assert_eq!(
            TaskStatus::from("Rescheduled"),
            TaskStatus::Other("Rescheduled".to_string())
        );
        assert_eq!(Priority::from(""), Priority::Unset);
        assert_eq!(String::from(BoqStatus::InProgress), "In-Progress");
    }

    #[test]
    fn test_enum_serde_as_plain_strings() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"Completed\"");
        let status: TaskStatus = serde_json::from_str("\"Scheduled\"").unwrap();
        assert_eq!(status, TaskStatus::Scheduled);
    }

    #[test]
    fn test_task_status_parse_rejects_unknown() {
        assert_eq!(TaskStatus::parse(" Completed ").unwrap(), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("Incomplete").unwrap(), TaskStatus::Incomplete);
        let err = TaskStatus::parse("Complted").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_task_profile_filter_parse() {
        assert_eq!(TaskProfileFilter::parse("all").unwrap(), TaskProfileFilter::All);
        assert_eq!(
            TaskProfileFilter::parse("Estimates").unwrap().profiles(),
            vec![TaskProfile::Estimates]
        );
        assert!(matches!(
            TaskProfileFilter::parse("Marketing"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_role_from_alias() {
        assert_eq!(RoleProfile::from_alias("sales").unwrap(), RoleProfile::Sales);
        assert_eq!(
            RoleProfile::from_alias("Nirmaan Admin User Profile").unwrap(),
            RoleProfile::Admin
        );
        assert!(RoleProfile::from_alias("intern").is_err());
    }

    #[test]
    fn test_task_rejects_unknown_fields() {
        let json = r#"{
            "name": "T-1", "type": "Call", "status": "Pending",
            "creation": "2025-01-01 09:00:00", "colour": "red"
        }"#;
        let err = serde_json::from_str::<Task>(json).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let json = r#"{
            "name": "T-1", "type": "In Person Meeting", "status": "Completed",
            "start_date": "2025-01-03", "company": "C-1",
            "creation": "2025-01-01T09:00:00"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.is_in_person_meeting());
        assert_eq!(task.company.as_deref(), Some("C-1"));
        assert_eq!(task.last_modified(), task.creation);
    }

    #[test]
    fn test_session_visibility() {
        let admin = Session::new("boss@example.com", RoleProfile::Admin);
        assert_eq!(admin.visible_owner(), None);
        let rep = Session::new("rep@example.com", RoleProfile::Sales);
        assert_eq!(rep.visible_owner(), Some("rep@example.com"));
    }

    #[test]
    fn test_company_display_name_fallback() {
        let mut c = Company {
            name: "COMP-0001".into(),
            company_name: Some(String::new()),
            company_city: None,
            assigned_sales: None,
            priority: Priority::Unset,
            last_meeting: None,
            creation: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            modified: None,
        };
        assert_eq!(c.display_name(), "COMP-0001");
        c.company_name = Some("Acme Interiors".into());
        assert_eq!(c.display_name(), "Acme Interiors");
    }
}
