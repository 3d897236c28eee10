use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use nirmaancrm::date_util::{format_date, parse_date};
use nirmaancrm::{MeetingKey, NirmaanCrm, RoleProfile, Session, TaskProfileFilter, TaskStatus};

#[derive(Parser)]
#[command(name = "nirmaancrm", about = "Nirmaan CRM sales reporting CLI")]
struct Cli {
    /// Database path (default: ~/.nirmaancrm/nirmaancrm.db)
    #[arg(long)]
    db: Option<String>,

    /// Act as this user (default: the session_user setting)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show record counts
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Import users, companies, contacts, tasks and BOQs from a JSON file
    Load {
        /// Path to the fixture file
        file: String,
    },
    /// Manage CRM users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Update tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Run a report
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
    /// Search contacts, companies, BOQs and tasks
    Search {
        /// Search term (at least 2 characters)
        term: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user (admins only)
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        /// admin, sales or estimations
        #[arg(long)]
        role: String,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Set a task's status
    Status {
        /// Task id
        id: String,
        /// Pending, Scheduled, Completed or Incomplete
        status: String,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Meetings, unique meetings, companies and BOQs per sales user and window
    Performance {
        /// all, Sales or Estimates
        #[arg(long, default_value = "all")]
        profile: String,
        /// company or contact (default: the meeting_dedupe_key setting)
        #[arg(long)]
        dedupe_by: Option<String>,
        /// Report as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Companies without a recent or upcoming in-person meeting
    Exceptions {
        #[arg(long, default_value = "all")]
        profile: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Companies with next meeting, remarks, BOQs and meeting counts
    Roster {
        #[arg(long, default_value = "all")]
        profile: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Tasks with open BOQs and filter options
    Tasks {
        #[arg(long, default_value = "all")]
        profile: String,
        #[arg(long)]
        json: bool,
    },
}

fn parse_today(date: Option<&str>) -> anyhow::Result<NaiveDate> {
    match date {
        Some(d) => Ok(parse_date(d)?),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn or_dash(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => nirmaancrm::Database::open_at(path).await?,
        None => nirmaancrm::Database::open().await?,
    };
    let crm = NirmaanCrm::new(db);
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Status => {
            print_status(&crm).await?;
        }
        Commands::Config { action } => {
            handle_config(&crm, action).await?;
        }
        Commands::Load { file } => {
            let text = std::fs::read_to_string(&file)?;
            let fixture: nirmaancrm::Fixture = serde_json::from_str(&text)?;
            let report = crm.load_fixture(fixture).await?;
            println!(
                "Loaded {} users, {} companies, {} contacts, {} tasks, {} BOQs.",
                report.users, report.companies, report.contacts, report.tasks, report.boqs
            );
        }
        Commands::User { action } => {
            let session = crm.session(user).await?;
            handle_user(&crm, &session, action).await?;
        }
        Commands::Task { action } => {
            let session = crm.session(user).await?;
            match action {
                TaskAction::Status { id, status } => {
                    let task = crm
                        .set_task_status(&session, &id, TaskStatus::parse(&status)?)
                        .await?;
                    println!("Task {} is now {}.", task.name, task.status);
                }
            }
        }
        Commands::Report { report } => {
            let session = crm.session(user).await?;
            handle_report(&crm, &session, report).await?;
        }
        Commands::Search { term, json } => {
            let session = crm.session(user).await?;
            let results = crm.search(&session, &term).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Search: \"{}\" ({} results)", results.query, results.total);
                for hit in &results.hits {
                    println!("  [{}] {}", hit.name, hit.title);
                    println!("    {}", hit.path);
                }
            }
        }
    }

    Ok(())
}

async fn print_status(crm: &NirmaanCrm) -> anyhow::Result<()> {
    let counts = crm.counts().await?;
    println!("CRM Status");
    for (table, count) in counts {
        let label = table.trim_start_matches("crm_");
        println!("  {:<10} {count}", format!("{label}:"));
    }
    Ok(())
}

async fn handle_config(crm: &NirmaanCrm, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match crm.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            crm.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = crm.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_user(crm: &NirmaanCrm, session: &Session, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Add {
            email,
            first_name,
            role,
        } => {
            let new_user = nirmaancrm::NewUser {
                email,
                first_name,
                role_profile: RoleProfile::from_alias(&role)?,
            };
            let created = crm.create_user(session, new_user).await?;
            println!("Created {} ({}).", created.email, created.role_profile);
        }
    }
    Ok(())
}

async fn handle_report(crm: &NirmaanCrm, session: &Session, report: ReportKind) -> anyhow::Result<()> {
    match report {
        ReportKind::Performance {
            profile,
            dedupe_by,
            date,
            json,
        } => {
            let profile = TaskProfileFilter::parse(&profile)?;
            let dedupe_key = dedupe_by.as_deref().map(MeetingKey::parse).transpose()?;
            let today = parse_today(date.as_deref())?;
            let report = crm
                .sales_performance(session, today, profile, dedupe_key)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("Sales Performance (as of {})", format_date(today));
            for owner in &report {
                println!("{} <{}>", owner.full_name, owner.email);
                for w in owner.windows() {
                    println!(
                        "  {:<13} {} .. {}  meetings {:>3}  unique {:>3}  companies {:>3}  boqs {:>3}",
                        w.window.label,
                        format_date(w.window.date_from),
                        format_date(w.window.date_to),
                        w.meetings.len(),
                        w.unique_meetings.len(),
                        w.assigned_companies.len(),
                        w.boqs_received.len()
                    );
                }
            }
        }
        ReportKind::Exceptions {
            profile,
            date,
            json,
        } => {
            let profile = TaskProfileFilter::parse(&profile)?;
            let today = parse_today(date.as_deref())?;
            let report = crm.exception_report(session, today, profile).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("Meeting Exceptions (as of {})", format_date(today));
            for owner in &report {
                println!("{} <{}>", owner.user_full_name, owner.email);
                for row in &owner.companies {
                    println!(
                        "  {:<30} last {:<3} {:<10}  next {:<3} {:<10}",
                        row.company_name,
                        format!("{:?}", row.last_meeting_status).to_uppercase(),
                        or_dash(row.last_meeting_date),
                        format!("{:?}", row.next_meeting_status).to_uppercase(),
                        or_dash(row.next_meeting_date),
                    );
                }
            }
        }
        ReportKind::Roster {
            profile,
            date,
            json,
        } => {
            let profile = TaskProfileFilter::parse(&profile)?;
            let today = parse_today(date.as_deref())?;
            let roster = crm.company_roster(session, today, profile).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&roster)?);
                return Ok(());
            }
            println!("Company Roster ({} companies)", roster.len());
            for entry in &roster {
                println!(
                    "  {:<30} next {:<10}  last {:<10}  boqs {:>2} active / {:>2} hot  meetings {}/{}",
                    entry.company.display_name(),
                    or_dash(entry.next_meeting_date),
                    or_dash(entry.company.last_meeting),
                    entry.active_boqs.len(),
                    entry.hot_boqs.len(),
                    entry.meetings_last_7_days,
                    entry.meetings_next_14_days,
                );
            }
        }
        ReportKind::Tasks { profile, json } => {
            let profile = TaskProfileFilter::parse(&profile)?;
            let out = crm.sales_tasks(session, profile).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!("Tasks ({})", out.tasks.len());
            for row in &out.tasks {
                let task = &row.task;
                let owner = task
                    .assigned_sales
                    .as_ref()
                    .and_then(|e| out.salesperson_map.get(e))
                    .map(String::as_str)
                    .unwrap_or("-");
                println!(
                    "  {:<12} {:<10} {:<18} {:<10} {:<24} {}",
                    task.name,
                    or_dash(task.start_date),
                    task.task_type,
                    task.status,
                    row.company_name.as_deref().unwrap_or("-"),
                    owner
                );
            }
        }
    }
    Ok(())
}
