use regex::{Regex, RegexBuilder};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::Result;
use crate::model::{RoleProfile, Session};
use crate::storage::{repository, Database};

/// Shortest term (after trimming) that runs a search.
pub const MIN_TERM_LEN: usize = 2;
/// Config key that turns on match highlighting in titles.
pub const HIGHLIGHT_KEY: &str = "highlight_search_results";

const HIGHLIGHT_OPEN: &str = r#"<span class="search-highlight">"#;

/// Record type a hit points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Doctype {
    #[serde(rename = "CRM Contacts")]
    Contact,
    #[serde(rename = "CRM Company")]
    Company,
    #[serde(rename = "CRM BOQ")]
    Boq,
    #[serde(rename = "CRM Task")]
    Task,
}

impl Doctype {
    fn path(self, name: &str) -> String {
        let base = match self {
            Doctype::Contact => "/contacts/contact",
            Doctype::Company => "/companies/company",
            Doctype::Boq => "/boqs/boq",
            Doctype::Task => "/tasks/task",
        };
        format!("{base}?id={name}")
    }

    /// Roles allowed to search this record type.
    fn searchable_by(self, role: &RoleProfile) -> bool {
        match self {
            Doctype::Contact | Doctype::Company => {
                matches!(role, RoleProfile::Admin | RoleProfile::Sales)
            }
            Doctype::Boq | Doctype::Task => matches!(
                role,
                RoleProfile::Admin | RoleProfile::Sales | RoleProfile::Estimations
            ),
        }
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doctype: Doctype,
    /// Record id.
    pub name: String,
    /// HTML-escaped display text, optionally with the match highlighted.
    pub title: String,
    pub path: String,
}

/// Search results container.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub total: usize,
}

/// Search contacts, companies, BOQs and tasks visible to `session`.
pub async fn search(db: &Database, session: &Session, term: &str) -> Result<SearchResults> {
    let term = term.trim().to_string();
    if term.chars().count() < MIN_TERM_LEN {
        return Ok(SearchResults {
            query: term,
            hits: Vec::new(),
            total: 0,
        });
    }

    let session = session.clone();
    let query = term.clone();
    let hits = db
        .reader()
        .call(move |conn| {
            let highlight = repository::get_config(conn, HIGHLIGHT_KEY)?
                .is_some_and(|v| v.trim() == "1");
            search_records(conn, &session, &query, highlight)
        })
        .await?;
    log::debug!("search '{term}': {} hits", hits.len());

    Ok(SearchResults {
        query: term,
        total: hits.len(),
        hits,
    })
}

/// Run the per-type LIKE queries. Each type is ordered newest `modified`
/// first; types appear in a fixed order.
pub fn search_records(
    conn: &Connection,
    session: &Session,
    term: &str,
    highlight: bool,
) -> rusqlite::Result<Vec<SearchHit>> {
    let pattern = format!("%{}%", escape_like(term));
    let owner = session.visible_owner();
    let titles = Titles::new(term, highlight);
    let mut hits = Vec::new();

    if Doctype::Contact.searchable_by(&session.role) {
        let rows = matching(
            conn,
            "crm_contacts",
            "name, first_name, last_name, mobile, email",
            &["first_name", "last_name", "email", "mobile"],
            owner,
            &pattern,
            |row| {
                let first: Option<String> = row.get(1)?;
                let last: Option<String> = row.get(2)?;
                let full_name = format!(
                    "{} {}",
                    first.unwrap_or_default(),
                    last.unwrap_or_default()
                );
                let reach = non_empty(row.get(3)?).or(non_empty(row.get(4)?));
                Ok((row.get::<_, String>(0)?, format!("{} ({})", full_name.trim(), or_na(reach))))
            },
        )?;
        hits.extend(titles.hits(Doctype::Contact, rows));
    }

    if Doctype::Company.searchable_by(&session.role) {
        let rows = matching(
            conn,
            "crm_companies",
            "name, company_name, company_city",
            &["company_name", "company_city"],
            owner,
            &pattern,
            |row| {
                let name: String = row.get(0)?;
                let label = non_empty(row.get(1)?).unwrap_or_else(|| name.clone());
                let city = non_empty(row.get(2)?);
                Ok((name, format!("{label} ({})", or_na(city))))
            },
        )?;
        hits.extend(titles.hits(Doctype::Company, rows));
    }

    if Doctype::Boq.searchable_by(&session.role) {
        let rows = matching(
            conn,
            "crm_boqs",
            "name, boq_name, boq_status",
            &["name", "boq_name", "boq_type", "city", "boq_status"],
            owner,
            &pattern,
            |row| {
                let name: String = row.get(0)?;
                let label = non_empty(row.get(1)?).unwrap_or_else(|| name.clone());
                let status = non_empty(row.get(2)?);
                Ok((name, format!("{label} ({})", or_na(status))))
            },
        )?;
        hits.extend(titles.hits(Doctype::Boq, rows));
    }

    if Doctype::Task.searchable_by(&session.role) {
        let rows = matching(
            conn,
            "crm_tasks",
            "name, type, company, status",
            &["name", "type", "remarks"],
            owner,
            &pattern,
            |row| {
                let task_type: String = row.get(1)?;
                let company = non_empty(row.get(2)?);
                let status = non_empty(row.get(3)?);
                Ok((
                    row.get::<_, String>(0)?,
                    format!("{task_type} - {} ({})", or_na(company), or_na(status)),
                ))
            },
        )?;
        hits.extend(titles.hits(Doctype::Task, rows));
    }

    Ok(hits)
}

fn matching<T>(
    conn: &Connection,
    table: &str,
    fields: &str,
    searched: &[&str],
    owner: Option<&str>,
    pattern: &str,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let any = searched
        .iter()
        .map(|col| format!("{col} LIKE ?1 ESCAPE '\\'"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let mut sql = format!("SELECT {fields} FROM {table} WHERE ({any})");
    if owner.is_some() {
        sql.push_str(" AND assigned_sales = ?2");
    }
    sql.push_str(" ORDER BY modified DESC, rowid ASC");
    log::trace!("{sql}");

    let mut stmt = conn.prepare(&sql)?;
    let rows: rusqlite::Result<Vec<T>> = match owner {
        Some(owner) => stmt.query_map(params![pattern, owner], map)?.collect(),
        None => stmt.query_map(params![pattern], map)?.collect(),
    };
    rows
}

/// Renders display text into HTML-safe titles.
struct Titles {
    highlight: Option<Regex>,
}

impl Titles {
    fn new(term: &str, highlight: bool) -> Self {
        let highlight = highlight
            .then(|| {
                RegexBuilder::new(&regex::escape(&escape_html(term)))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .flatten();
        Self { highlight }
    }

    fn render(&self, text: &str) -> String {
        let escaped = escape_html(text);
        match self.highlight {
            Some(ref re) => re
                .replace_all(&escaped, |caps: &regex::Captures| {
                    format!("{HIGHLIGHT_OPEN}{}</span>", &caps[0])
                })
                .into_owned(),
            None => escaped,
        }
    }

    fn hits(&self, doctype: Doctype, rows: Vec<(String, String)>) -> Vec<SearchHit> {
        rows.into_iter()
            .map(|(name, text)| SearchHit {
                doctype,
                title: self.render(&text),
                path: doctype.path(&name),
                name,
            })
            .collect()
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}
