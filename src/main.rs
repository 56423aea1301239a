use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod error;
mod import;
mod models;
mod records;
mod refresh;
mod report;
mod window;

use crate::aggregate::Ranking;
use crate::config::Config;
use crate::models::{Channel, DailyRecord, Metric, RawDailyRecord, Role, StatEntry};
use crate::records::RecordSort;
use crate::report::Snapshot;
use crate::window::TimeWindow;

#[derive(Parser)]
#[command(name = "momentum")]
#[command(about = "Agent performance leaderboard and stats admin console", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/momentum/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("team_scope")
        .args(["team", "my_team"])
        .multiple(false)
))]
struct ViewArgs {
    #[arg(long, value_enum, default_value_t = TimeWindow::Daily)]
    window: TimeWindow,
    /// `total` or a channel key such as `calls` or `live_chat`
    #[arg(long, default_value = "total")]
    metric: Metric,
    /// Only agents of this team lead group
    #[arg(long)]
    team: Option<String>,
    /// Only the team of the user with this email (needs the database)
    #[arg(long, value_name = "EMAIL", conflicts_with = "input")]
    my_team: Option<String>,
    /// Channel scope summed into the total
    #[arg(long)]
    scope: Option<String>,
    /// Aggregate a JSON export of daily stats rows instead of the database
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a week of sample stats
    Seed,
    /// Import daily stats from a CSV export of the stats sheet
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record one agent's stats for a day
    Entry(EntryArgs),
    /// Browse or delete stored daily records
    Records {
        #[command(subcommand)]
        action: RecordCommand,
    },
    /// Top and bottom performers for a window
    Board(ViewArgs),
    /// Ranked agent cards and per-channel leaders
    Dashboard(ViewArgs),
    /// Per-agent channel breakdown and team totals
    Metrics(ViewArgs),
    /// Generate a markdown report, or a JSON snapshot with --json
    Report {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Keep the dashboard refreshed until interrupted
    Watch {
        #[command(flatten)]
        view: ViewArgs,
        /// Seconds between refreshes (defaults to the configured interval)
        #[arg(long)]
        every: Option<u64>,
    },
    /// List team lead groups present in the stats
    Teams,
    /// Show the configured channel scopes
    Scopes,
    /// Manage the agent directory and roles
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Manage avatar references
    Avatar {
        #[command(subcommand)]
        action: AvatarCommand,
    },
    /// Show an agent's profile and recent history
    Profile {
        agent_id: String,
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },
}

#[derive(Args)]
struct EntryArgs {
    #[arg(long)]
    agent: String,
    #[arg(long)]
    email: Option<String>,
    /// Defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, default_value_t = 0)]
    calls: u64,
    #[arg(long, default_value_t = 0)]
    live_chat: u64,
    #[arg(long, default_value_t = 0)]
    helpdesk: u64,
    #[arg(long, default_value_t = 0)]
    support_emails: u64,
    #[arg(long, default_value_t = 0)]
    social_tickets: u64,
    #[arg(long, default_value_t = 0)]
    billing_tickets: u64,
    #[arg(long, default_value_t = 0)]
    walk_ins: u64,
    #[arg(long, default_value_t = 0)]
    sales_tickets: u64,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    team_lead: Option<String>,
}

impl EntryArgs {
    fn into_entry(self, today: NaiveDate) -> anyhow::Result<StatEntry> {
        let mut entry = StatEntry::new(&self.agent, self.date.unwrap_or(today))?;
        entry.email = self.email.filter(|email| !email.trim().is_empty());
        entry.group = self.group.filter(|group| !group.trim().is_empty());
        entry.team_lead_group = self.team_lead.filter(|team| !team.trim().is_empty());

        for (channel, value) in [
            (Channel::Calls, self.calls),
            (Channel::LiveChat, self.live_chat),
            (Channel::HelpdeskTicketing, self.helpdesk),
            (Channel::SupportEmails, self.support_emails),
            (Channel::SocialTickets, self.social_tickets),
            (Channel::BillingTickets, self.billing_tickets),
            (Channel::WalkIns, self.walk_ins),
            (Channel::SalesTickets, self.sales_tickets),
        ] {
            entry.counts.set(channel, value);
        }
        Ok(entry)
    }
}

#[derive(Subcommand)]
enum RecordCommand {
    /// List records, newest first by default
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = RecordSort::Date)]
        sort: RecordSort,
        #[arg(long)]
        asc: bool,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Delete one agent's record for a date
    Delete {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        date: NaiveDate,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    List {
        #[arg(long, value_enum)]
        role: Option<Role>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        team_lead: Option<String>,
    },
    Update {
        agent_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        team_lead: Option<String>,
    },
    Remove {
        agent_id: String,
    },
    Role {
        agent_id: String,
        #[arg(value_enum)]
        role: Role,
    },
}

#[derive(Subcommand)]
enum AvatarCommand {
    /// Point an agent's avatar at a URL or stored image path
    Set { agent_id: String, reference: String },
    Clear { agent_id: String },
}

/// Inputs for building a [`Snapshot`], shared with the refresh loop.
struct ViewContext {
    config: Config,
    view: ViewArgs,
    pool: Option<PgPool>,
}

impl ViewContext {
    async fn snapshot(&self) -> anyhow::Result<Snapshot> {
        let now = Local::now().naive_local();
        let since = self.view.window.since_date(now, self.config.monthly_window);
        let scope = self.config.scope(self.view.scope.as_deref())?;
        let leader_scope = self.config.scope(Some("channel_leaders"))?;

        let (team, records, directory, avatars) = match (&self.view.input, &self.pool) {
            (Some(path), _) => {
                let team = self.view.team.clone();
                let records = load_json_records(path, since, team.as_deref())?;
                (team, records, None, None)
            }
            (None, Some(pool)) => {
                let team = match &self.view.my_team {
                    Some(email) => {
                        let team = db::team_for_email(pool, email).await?;
                        if team.is_none() {
                            warn!(%email, "no team lead on profile, showing all teams");
                        }
                        team
                    }
                    None => self.view.team.clone(),
                };
                let records = db::fetch_records(pool, since, team.as_deref()).await?;
                let directory = db::fetch_agent_ids(pool).await?;
                let avatars = db::fetch_avatars(pool).await?;
                (team, records, Some(directory), Some(avatars))
            }
            (None, None) => anyhow::bail!("no database connection and no --input file"),
        };

        let ranking = Ranking::new(&scope, self.config.group_by).with_metric(self.view.metric);
        let ranking = match &directory {
            Some(ids) => ranking.with_directory(ids),
            None => ranking,
        };
        let mut snapshot = Snapshot::build(
            records,
            self.view.window,
            since,
            team,
            &ranking,
            &leader_scope,
            self.config.top_n,
            self.config.bottom_n,
        );
        if let Some(avatars) = avatars {
            snapshot.attach_avatars(&avatars);
        }
        Ok(snapshot)
    }
}

fn load_json_records(
    path: &std::path::Path,
    since: NaiveDate,
    team: Option<&str>,
) -> anyhow::Result<Vec<DailyRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rows: Vec<RawDailyRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of daily stats rows", path.display()))?;

    let records = rows
        .iter()
        .map(DailyRecord::from_raw)
        .filter(|record| team.map_or(true, |team| record.team_lead_group.as_deref() == Some(team)))
        .collect();
    Ok(window::filter_window(records, since))
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config.database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn init_tracing(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn view_context(config: Config, view: ViewArgs) -> anyhow::Result<ViewContext> {
    let pool = match view.input {
        Some(_) => None,
        None => Some(connect(&config).await?),
    };
    Ok(ViewContext { config, view, pool })
}

fn report_body(snapshot: &Snapshot, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(snapshot)?)
    } else {
        Ok(report::build_report(snapshot))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load(cli.config.as_deref())?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let inserted = db::seed(&pool, today).await?;
            println!("Seed data inserted ({inserted} daily records).");
        }
        Commands::Import { csv } => {
            let pool = connect(&config).await?;
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Processed {} records from {}, {} duplicates skipped, {} rows unusable.",
                summary.processed,
                csv.display(),
                summary.duplicates,
                summary.skipped
            );
        }
        Commands::Entry(args) => {
            let entry = args.into_entry(today)?;
            let pool = connect(&config).await?;
            db::insert_entry(&pool, &entry).await?;
            let data_entry = config.scope(Some("data_entry"))?;
            println!(
                "Saved {} for {} ({} issues).",
                entry.date,
                entry.agent_name,
                entry.counts.total(&data_entry.channels)
            );
        }
        Commands::Records { action } => {
            let pool = connect(&config).await?;
            match action {
                RecordCommand::List {
                    search,
                    sort,
                    asc,
                    scope,
                } => {
                    let scope = config.scope(scope.as_deref())?;
                    let records = records::search_and_sort(
                        db::fetch_all_records(&pool).await?,
                        search.as_deref(),
                        sort,
                        asc,
                        &scope,
                    );
                    println!("{} records", records.len());
                    for record in &records {
                        println!(
                            "- {} {} ({}) {} issues, group {}",
                            record
                                .date
                                .map(|date| date.to_string())
                                .unwrap_or_else(|| "undated".to_string()),
                            record.agent_name,
                            record.agent_id.as_deref().unwrap_or("no id"),
                            aggregate::record_total(record, &scope),
                            record.group.as_deref().unwrap_or("n/a")
                        );
                    }
                }
                RecordCommand::Delete { agent, date } => {
                    if db::delete_record(&pool, &agent, date).await? {
                        println!("Deleted the record for {agent} on {date}.");
                    } else {
                        println!("No record for {agent} on {date}.");
                    }
                }
            }
        }
        Commands::Board(view) => {
            let json = view.json;
            let snapshot = view_context(config, view).await?.snapshot().await?;
            if json {
                print_json(&snapshot.standings)?;
            } else {
                print!("{}", report::render_board(&snapshot));
            }
        }
        Commands::Dashboard(view) => {
            let json = view.json;
            let size = config.dashboard_size;
            let snapshot = view_context(config, view).await?.snapshot().await?;
            if json {
                print_json(&snapshot)?;
            } else {
                print!("{}", report::render_dashboard(&snapshot, size));
            }
        }
        Commands::Metrics(view) => {
            let json = view.json;
            let scope = config.scope(view.scope.as_deref())?;
            let snapshot = view_context(config, view).await?.snapshot().await?;
            if json {
                print_json(&snapshot.metrics_view())?;
            } else {
                print!("{}", report::render_metrics(&snapshot, &scope));
            }
        }
        Commands::Report { view, out } => {
            let json = view.json;
            let snapshot = view_context(config, view).await?.snapshot().await?;
            std::fs::write(&out, report_body(&snapshot, json)?)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch { view, every } => {
            let period = Duration::from_secs(every.unwrap_or(config.refresh_secs).max(1));
            let size = config.dashboard_size;
            let json = view.json;
            let context = Arc::new(view_context(config, view).await?);
            info!(seconds = period.as_secs(), "watching for changes");

            refresh::watch(
                period,
                period * 2,
                move |_| {
                    let context = Arc::clone(&context);
                    async move { context.snapshot().await }
                },
                |sequence, snapshot: Snapshot| {
                    if json {
                        if let Err(err) = print_json(&snapshot) {
                            warn!(sequence, error = %err, "failed to print snapshot");
                        }
                    } else {
                        println!(
                            "--- refresh #{sequence} at {} ---",
                            Local::now().format("%H:%M:%S")
                        );
                        print!("{}", report::render_dashboard(&snapshot, size));
                    }
                },
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
            )
            .await;
        }
        Commands::Teams => {
            let pool = connect(&config).await?;
            let teams = db::fetch_team_leads(&pool).await?;
            if teams.is_empty() {
                println!("No team lead groups recorded.");
            }
            for team in teams {
                println!("- {team}");
            }
        }
        Commands::Scopes => {
            println!(
                "Default scope: {} (monthly window: {:?}, grouping: {:?})",
                config.default_scope, config.monthly_window, config.group_by
            );
            for (name, channels) in config.all_scopes() {
                let listed: Vec<&str> = channels.iter().map(|channel| channel.label()).collect();
                println!("- {name}: {}", listed.join(", "));
                let missing: Vec<&str> = Channel::ALL
                    .iter()
                    .filter(|channel| !channels.contains(channel))
                    .map(|channel| channel.label())
                    .collect();
                if !missing.is_empty() {
                    println!("    excludes: {}", missing.join(", "));
                }
            }
        }
        Commands::User { action } => {
            let pool = connect(&config).await?;
            match action {
                UserCommand::List { role } => {
                    let agents = db::list_agents(&pool, role).await?;
                    println!("{} agents", agents.len());
                    for agent in agents {
                        println!(
                            "- {} ({}) {} {}, team lead {}",
                            agent.agent_name,
                            agent.agent_id,
                            agent.role,
                            agent.email.as_deref().unwrap_or("no email"),
                            agent.team_lead_name.as_deref().unwrap_or("none")
                        );
                    }
                }
                UserCommand::Add {
                    name,
                    email,
                    profile,
                    team_lead,
                } => {
                    let agent_id = db::add_agent(
                        &pool,
                        &name,
                        email.as_deref(),
                        profile.as_deref(),
                        team_lead.as_deref(),
                    )
                    .await?;
                    println!("Added {name} as {agent_id}.");
                }
                UserCommand::Update {
                    agent_id,
                    name,
                    email,
                    profile,
                    team_lead,
                } => {
                    db::update_agent(
                        &pool,
                        &agent_id,
                        name.as_deref(),
                        email.as_deref(),
                        profile.as_deref(),
                        team_lead.as_deref(),
                    )
                    .await?;
                    println!("Updated {agent_id}.");
                }
                UserCommand::Remove { agent_id } => {
                    db::remove_agent(&pool, &agent_id).await?;
                    println!("Removed {agent_id}.");
                }
                UserCommand::Role { agent_id, role } => {
                    db::set_role(&pool, &agent_id, role).await?;
                    println!("{agent_id} is now {role}.");
                }
            }
        }
        Commands::Avatar { action } => {
            let pool = connect(&config).await?;
            match action {
                AvatarCommand::Set {
                    agent_id,
                    reference,
                } => {
                    db::set_avatar(&pool, &agent_id, Some(reference.trim())).await?;
                    println!("Avatar updated for {agent_id}.");
                }
                AvatarCommand::Clear { agent_id } => {
                    db::set_avatar(&pool, &agent_id, None).await?;
                    println!("Avatar removed for {agent_id}.");
                }
            }
        }
        Commands::Profile { agent_id, limit } => {
            let pool = connect(&config).await?;
            let scope = config.scope(None)?;
            let profile = db::agent_profile(&pool, &agent_id).await?;
            let history = db::agent_history(&pool, &agent_id, limit.max(1)).await?;
            let summary = records::summarize_history(&history, &scope);
            print!(
                "{}",
                report::render_profile(&profile, &history, &summary, &scope)
            );
        }
    }

    Ok(())
}
