mod aggregate;
mod api;
mod board;
mod config;
mod error;
mod models;
mod optimistic;
mod resume;
mod session;
mod tui;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use aggregate::{analysis_percentage, coverage_percentage, monthly_counts, status_counts, DashboardStats};
use api::{ApiClient, ApplicationUpdate, HttpTransport, NewApplication, RegisterForm};
use board::{move_card, Board, MoveOutcome};
use config::Config;
use error::ApiError;
use models::{Application, ApplicationStatus, RecordId};
use resume::ResumeReport;
use session::{FileSessionStore, Session};

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications, resumes and recommendations from the terminal")]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "JOBTRACK_API_URL")]
    api_url: Option<String>,

    /// Log request details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Register {
        username: String,
        email: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        /// Read the password from this file instead of prompting
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Sign in and save the session
    Login {
        username: String,

        /// Read the password from this file instead of prompting
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Forget the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Summary cards and recent applications
    Dashboard,

    /// Manage applications
    Apps {
        #[command(subcommand)]
        command: AppCommands,
    },

    /// Interactive kanban board
    Board,

    /// Application counts by status and by month
    Stats,

    /// Resume upload and analysis
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },

    /// Refresh and show job recommendations
    Recs {
        /// Number of recommendations to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Compare your resume against a job
    Gap {
        /// Job ID
        job_id: String,
    },
}

#[derive(Subcommand)]
enum AppCommands {
    /// List applications
    List {
        /// Filter by status (saved, applied, phone_screen, interviewing, offer, accepted, rejected)
        #[arg(short, long)]
        status: Option<ApplicationStatus>,
    },

    /// Show application details
    Show {
        /// Application ID
        id: String,
    },

    /// Track a job
    Add {
        /// Job ID
        job_id: String,

        #[arg(short, long)]
        status: Option<ApplicationStatus>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Replace status and notes
    Update {
        /// Application ID
        id: String,

        #[arg(short, long)]
        status: ApplicationStatus,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Move an application to another column
    Move {
        /// Application ID
        id: String,

        /// Target status
        status: ApplicationStatus,
    },

    /// Delete an application
    Delete {
        /// Application ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Save resume text (from a file, or stdin) and analyze it
    Text {
        /// Plain-text resume; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Upload a PDF or DOCX resume and analyze it
    Upload {
        /// Path to the resume file
        path: PathBuf,
    },

    /// Extract skills without saving
    Skills {
        /// Plain-text resume; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// AI-parse a resume into sections without saving
    Parse {
        /// Plain-text resume; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?.with_api_url(cli.api_url.clone());

    let interactive = matches!(cli.command, Commands::Board);
    init_tracing(cli.verbose, config.log_file.as_deref(), interactive)?;

    run(cli.command, &config).map_err(|err| {
        let expired = err
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthorized);
        if expired {
            anyhow!("Not signed in or session expired. Run `jobtrack login`.")
        } else {
            err
        }
    })
}

/// Logs go to stderr, or to `log_file` when set. While the board owns the
/// terminal nothing is logged unless a file was given.
fn init_tracing(verbose: bool, log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("jobtrack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_client(config: &Config) -> Result<ApiClient> {
    let store = FileSessionStore::new(config.session_path.clone());
    tracing::debug!(api_url = %config.api_url, session = %store.path().display(), "opening client");
    let session = Session::new(Box::new(store))?;
    let transport = HttpTransport::new(&config.api_url, config.timeout)?;
    Ok(ApiClient::new(Box::new(transport), session))
}

/// Protected views need at least one token; the client refreshes an expired
/// access token on its own.
fn require_login(client: &ApiClient) -> Result<()> {
    let session = client.session();
    if session.access_token().is_none() && session.refresh_token().is_none() {
        return Err(ApiError::Unauthorized.into());
    }
    Ok(())
}

fn run(command: Commands, config: &Config) -> Result<()> {
    let client = open_client(config)?;

    match command {
        Commands::Register {
            username,
            email,
            first_name,
            last_name,
            password_file,
        } => {
            let password = read_password(password_file.as_deref(), "Password: ")?;
            let confirm_password = match password_file {
                Some(_) => password.clone(),
                None => read_password(None, "Confirm password: ")?,
            };
            let form = RegisterForm {
                username,
                email,
                password,
                confirm_password,
                first_name,
                last_name,
            };
            let auth = client.register(&form)?;
            println!("Welcome, {}! Your account is ready.", auth.user.greeting_name());
            if let Some(message) = &auth.message {
                println!("{}", message);
            }
        }

        Commands::Login {
            username,
            password_file,
        } => {
            let password = read_password(password_file.as_deref(), "Password: ")?;
            let auth = client.login(&username, &password)?;
            match &auth.message {
                Some(message) => println!("{} Signed in as {}.", message, auth.user.username),
                None => println!("Signed in as {}.", auth.user.username),
            }
            println!("Session saved to {}", config.session_path.display());
        }

        Commands::Logout => {
            client.logout()?;
            println!("Signed out.");
        }

        Commands::Whoami => {
            require_login(&client)?;
            let user = client.current_user()?;
            println!("User: {}", user.username);
            if let Some(email) = &user.email {
                println!("Email: {}", email);
            }
            if let Some(id) = &user.user_id {
                println!("ID: {}", id);
            }
            if let Some(claims) = client.session().claims() {
                let expires = chrono::DateTime::<chrono::Utc>::from_timestamp(claims.exp, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| claims.exp.to_string());
                let state = if client.session().is_authenticated() { "valid" } else { "expired" };
                println!("Access token: {} (expires {})", state, expires);
                let subject = [
                    claims.username,
                    claims.user_id.map(|id| format!("#{}", id)),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();
                if !subject.is_empty() {
                    println!("Token subject: {}", subject.join(" "));
                }
            }
        }

        Commands::Dashboard => {
            require_login(&client)?;
            let apps = client.list_applications()?;
            let name = client
                .session()
                .user()
                .map(|u| u.greeting_name().to_string())
                .unwrap_or_else(|| "there".to_string());
            print_dashboard(&name, &DashboardStats::from_applications(&apps));
        }

        Commands::Apps { command } => {
            require_login(&client)?;
            run_apps(&client, command)?;
        }

        Commands::Board => {
            require_login(&client)?;
            tui::run_board(&client)?;
        }

        Commands::Stats => {
            require_login(&client)?;
            let apps = client.list_applications()?;
            print_stats(&apps);
        }

        Commands::Resume { command } => {
            require_login(&client)?;
            run_resume(&client, command)?;
        }

        Commands::Recs { limit } => {
            require_login(&client)?;
            let recs = client.refresh_recommendations()?;
            if recs.is_empty() {
                println!("No recommendations yet. Upload a resume with `jobtrack resume upload`.");
                return Ok(());
            }
            let tracked = tracked_statuses(&client)?;

            println!(
                "{:<8} {:<6} {:<30} {:<20} {:<14}",
                "JOB", "MATCH", "TITLE", "COMPANY", "TRACKED"
            );
            println!("{}", "-".repeat(82));
            for rec in recs.iter().take(limit) {
                let status = tracked
                    .get(&rec.job_id)
                    .map(|s| s.label())
                    .unwrap_or("-");
                println!(
                    "{:<8} {:>4}%  {:<30} {:<20} {:<14}",
                    rec.job_id,
                    coverage_percentage(rec.score),
                    truncate(&rec.title, 28),
                    truncate(&rec.company, 18),
                    status
                );
                let mut facts = Vec::new();
                if let Some(location) = &rec.location {
                    facts.push(location.clone());
                }
                if rec.is_remote() {
                    facts.push("Remote".to_string());
                }
                if let Some(salary) = rec.salary.as_ref().and_then(|s| s.describe()) {
                    facts.push(salary);
                }
                if !rec.required_skills.is_empty() {
                    let matched = rec.required_skills.len().saturating_sub(rec.missing_skills.len());
                    facts.push(format!("{}/{} skills", matched, rec.required_skills.len()));
                }
                if !facts.is_empty() {
                    println!("         {}", facts.join(" · "));
                }
                if !rec.missing_skills.is_empty() {
                    println!("         Missing: {}", skill_list(&rec.missing_skills, 6));
                }
            }
        }

        Commands::Gap { job_id } => {
            require_login(&client)?;
            let gap = client.skills_gap(&RecordId::new(job_id.trim()))?;
            println!("Job #{}", gap.job_id);
            println!("Coverage: {}%", coverage_percentage(gap.coverage));
            if gap.missing_keywords.is_empty() {
                println!("Your resume covers every keyword for this job.");
            } else {
                println!("\nMissing keywords ({}):", gap.missing_keywords.len());
                for keyword in &gap.missing_keywords {
                    println!("  - {}", keyword);
                }
            }
        }
    }

    Ok(())
}

/// Status of each tracked job, keyed by job id. Only an expired session is
/// an error; any other failure leaves the recommendations untagged.
fn tracked_statuses(client: &ApiClient) -> Result<HashMap<RecordId, ApplicationStatus>, ApiError> {
    let apps = match client.list_applications() {
        Ok(apps) => apps,
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized),
        Err(err) => {
            tracing::warn!(error = %err, "could not load applications for recommendations");
            Vec::new()
        }
    };
    Ok(apps
        .into_iter()
        .filter_map(|app| app.job_ref().cloned().map(|job| (job, app.status)))
        .collect())
}

fn run_apps(client: &ApiClient, command: AppCommands) -> Result<()> {
    match command {
        AppCommands::List { status } => {
            let mut apps = client.list_applications()?;
            if let Some(status) = status {
                apps.retain(|a| a.status == status);
            }
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                print_application_table(&apps);
            }
        }

        AppCommands::Show { id } => {
            let app = client.get_application(&RecordId::new(id))?;
            println!("Application #{}", app.id);
            println!("Title: {}", app.display_title());
            let company = app.display_company();
            if !company.is_empty() {
                println!("Company: {}", company);
            }
            if let Some(job) = app.job_ref() {
                println!("Job: #{}", job);
            }
            println!("Status: {}", app.status.label());
            if let Some(applied) = &app.applied_date {
                println!("Applied: {}", applied);
            }
            if let Some(updated) = &app.updated_at {
                println!("Updated: {}", updated);
            }
            if let Some(notes) = app.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                println!("\n--- Notes ---\n{}", textwrap::fill(notes, 80));
            }
        }

        AppCommands::Add {
            job_id,
            status,
            notes,
        } => {
            let new = NewApplication {
                job_id: RecordId::new(job_id),
                status,
                notes,
            };
            let app = client.create_application(&new)?;
            println!("Added application #{} ({})", app.id, app.status.label());
        }

        AppCommands::Update { id, status, notes } => {
            let update = ApplicationUpdate { status, notes };
            let app = client.update_application(&RecordId::new(id), &update)?;
            println!("Updated application #{} -> {}", app.id, app.status.label());
        }

        AppCommands::Move { id, status } => {
            let id = RecordId::new(id);
            let mut board = Board::new(client.list_applications()?);
            match move_card(&mut board, client, &id, status)? {
                MoveOutcome::Moved => println!("Moved #{} to {}.", id, status.label()),
                MoveOutcome::Unchanged => println!("#{} is already in {}.", id, status.label()),
            }
        }

        AppCommands::Delete { id } => {
            let id = RecordId::new(id);
            client.delete_application(&id)?;
            println!("Deleted application #{}", id);
        }
    }
    Ok(())
}

fn run_resume(client: &ApiClient, command: ResumeCommands) -> Result<()> {
    match command {
        ResumeCommands::Text { file } => {
            let text = read_text(file.as_deref())?;
            let report = resume::process_text(client, &text)?;
            print_resume_report(&report);
        }

        ResumeCommands::Upload { path } => {
            let report = resume::process_file(client, &path)?;
            println!("Uploaded {}", path.display());
            print_resume_report(&report);
        }

        ResumeCommands::Skills { file } => {
            let text = read_text(file.as_deref())?;
            let skills = client.extract_skills(&text)?;
            println!("Analysis: {}%", analysis_percentage(skills.len()));
            println!("Skills ({}): {}", skills.len(), skills.join(", "));
        }

        ResumeCommands::Parse { file } => {
            let text = read_text(file.as_deref())?;
            let parsed = client.parse_resume(&text)?;
            let report = ResumeReport {
                text,
                skills: parsed.skills.clone(),
                parsed: Some(parsed),
                ..Default::default()
            };
            print_resume_report(&report);
        }
    }
    Ok(())
}

fn print_dashboard(name: &str, stats: &DashboardStats) {
    println!("Welcome back, {}!\n", name);
    println!(
        "{:<14} {:<14} {:<14} {:<14}",
        "TOTAL", "ACTIVE", "INTERVIEWS", "OFFERS"
    );
    println!(
        "{:<14} {:<14} {:<14} {:<14}",
        stats.total, stats.active, stats.interviews, stats.offers
    );

    if stats.recent.is_empty() {
        println!("\nNo applications yet. Track one with `jobtrack apps add <job-id>`.");
    } else {
        println!("\nRecent applications:");
        print_application_table(&stats.recent);
    }
}

fn print_application_table(apps: &[Application]) {
    println!(
        "{:<6} {:<14} {:<30} {:<20} {:<12}",
        "ID", "STATUS", "TITLE", "COMPANY", "APPLIED"
    );
    println!("{}", "-".repeat(86));
    for app in apps {
        let applied = app
            .applied_date
            .as_deref()
            .and_then(aggregate::parse_timestamp)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<14} {:<30} {:<20} {:<12}",
            app.id,
            app.status.label(),
            truncate(&app.display_title(), 28),
            truncate(&app.display_company(), 18),
            applied
        );
    }
}

fn print_stats(apps: &[Application]) {
    let counts = status_counts(apps);
    let widest = counts.values().copied().max().unwrap_or(0);

    println!("{:<14} {:>6}", "STATUS", "COUNT");
    println!("{}", "-".repeat(21));
    for (status, count) in &counts {
        println!("{:<14} {:>6}  {}", status.label(), count, bar(*count, widest));
    }

    let months = monthly_counts(apps);
    println!();
    if months.is_empty() {
        println!("No dated applications.");
        return;
    }
    let widest = months.iter().map(|(_, c)| *c).max().unwrap_or(0);
    println!("{:<14} {:>6}", "MONTH", "COUNT");
    println!("{}", "-".repeat(21));
    for (month, count) in &months {
        println!("{:<14} {:>6}  {}", month.to_string(), count, bar(*count, widest));
    }
}

fn print_resume_report(report: &ResumeReport) {
    if report.saved {
        println!("Resume saved.");
    }
    if let Some(pct) = report.analysis_pct {
        println!("Analysis: {}%", pct);
    }
    if !report.skills.is_empty() {
        println!("Skills ({}): {}", report.skills.len(), report.skills.join(", "));
    }

    if let Some(parsed) = &report.parsed {
        if let Some(summary) = parsed.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            println!("\n--- Summary ---\n{}", textwrap::fill(summary, 80));
        }
        if !parsed.experience.is_empty() {
            println!("\n--- Experience ---");
            for exp in &parsed.experience {
                let title = exp.title.as_deref().unwrap_or("Role");
                match &exp.company {
                    Some(company) => println!("{} at {}", title, company),
                    None => println!("{}", title),
                }
                let dates = [exp.start_date.as_deref(), exp.end_date.as_deref()];
                if dates.iter().any(Option::is_some) {
                    println!(
                        "  {} - {}",
                        dates[0].unwrap_or("?"),
                        dates[1].unwrap_or("present")
                    );
                }
                for bullet in &exp.bullets {
                    println!("  • {}", bullet);
                }
            }
        }
        if !parsed.education.is_empty() {
            println!("\n--- Education ---");
            for edu in &parsed.education {
                let degree = [edu.degree.as_deref(), edu.field.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{}{}",
                    edu.institution.as_deref().unwrap_or("School"),
                    if degree.is_empty() { String::new() } else { format!(" ({})", degree) }
                );
            }
        }
    }

    if report.recommendations_refreshed {
        println!("\nRecommendations refreshed. See `jobtrack recs`.");
    }
    for notice in &report.notices {
        eprintln!("warning: {}", notice);
    }
}

fn read_password(file: Option<&Path>, prompt: &str) -> Result<String> {
    if let Some(path) = file {
        let password = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read password file: {}", path.display()))?;
        return Ok(password.trim().to_string());
    }
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password is required");
    }
    Ok(password)
}

fn read_text(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read resume text: {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn skill_list(skills: &[String], max: usize) -> String {
    let mut shown = skills.iter().take(max).cloned().collect::<Vec<_>>().join(", ");
    if skills.len() > max {
        shown.push_str(", …");
    }
    shown
}

fn bar(count: usize, widest: usize) -> String {
    const WIDTH: usize = 40;
    if widest == 0 {
        return String::new();
    }
    "#".repeat((count * WIDTH).div_ceil(widest))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
