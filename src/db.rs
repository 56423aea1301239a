use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DomainError;
use crate::import;
use crate::models::{
    agent_slug, AgentProfile, Channel, DailyRecord, ImportSummary, RawDailyRecord, Role, StatEntry,
};

const STATS_COLUMNS: &str = "agent_id, agent_name, email, stat_date::text AS stat_date, \
     calls, live_chat, helpdesk_ticketing, support_emails, social_tickets, \
     billing_tickets, walk_ins, sales_tickets, agent_group, team_lead_group";

const PROFILE_QUERY: &str = "SELECT a.agent_id, a.agent_name, COALESCE(p.email, a.email) AS email, \
     a.profile, p.role, p.team_lead_name, p.avatar, p.department, p.post \
     FROM leaderboard.agents a \
     LEFT JOIN leaderboard.profiles p ON p.agent_id = a.agent_id";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<usize> {
    let agents = [
        ("Avery Lee", "avery.lee@momentum.example", "Dana Brooks", "Tier 1"),
        ("Jules Moreno", "jules.moreno@momentum.example", "Dana Brooks", "Tier 1"),
        ("Kiara Patel", "kiara.patel@momentum.example", "Marcus Lee", "Tier 2"),
        ("Noor Haddad", "noor.haddad@momentum.example", "Marcus Lee", "Tier 2"),
    ];

    let mut inserted = 0usize;
    for (position, (name, email, team_lead, group)) in agents.iter().enumerate() {
        let agent_id = agent_slug(name);
        for days_ago in 0..7i64 {
            let mut entry = StatEntry::new(name, today - Duration::days(days_ago))?;
            entry.agent_id = agent_id.clone();
            entry.email = Some(email.to_string());
            entry.group = Some(group.to_string());
            entry.team_lead_group = Some(team_lead.to_string());

            let base = (position as u64 + 1) * 3 + days_ago as u64;
            entry.counts.set(Channel::Calls, base * 2 % 17);
            entry.counts.set(Channel::LiveChat, (base * 5 + 1) % 11);
            entry.counts.set(Channel::HelpdeskTicketing, base % 4);
            entry.counts.set(Channel::SupportEmails, (base * 3) % 7);
            entry.counts.set(Channel::SocialTickets, base % 3);
            entry.counts.set(Channel::BillingTickets, (base + position as u64) % 5);
            entry.counts.set(Channel::WalkIns, u64::from(days_ago % 3 == 0));
            entry.counts.set(Channel::SalesTickets, (base * 7) % 6);

            if insert_stats(pool, &entry).await? {
                inserted += 1;
            }
        }

        // Profiles need the agent row that insert_stats upserts.
        sqlx::query(
            r#"
            INSERT INTO leaderboard.profiles (agent_id, email, role, team_lead_name)
            VALUES ($1, $2, 'agent', $3)
            ON CONFLICT (agent_id) DO NOTHING
            "#,
        )
        .bind(&agent_id)
        .bind(*email)
        .bind(*team_lead)
        .execute(pool)
        .await?;
    }

    info!(inserted, "seeded daily stats");
    Ok(inserted)
}

fn text_value(row: &PgRow, column: &str) -> Value {
    row.get::<Option<String>, _>(column)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn record_from_row(row: &PgRow) -> DailyRecord {
    let raw = RawDailyRecord {
        agent: row.get("agent_name"),
        agent_id: row.get("agent_id"),
        email: row.get("email"),
        date: row.get("stat_date"),
        group: row.get("agent_group"),
        team_lead_group: row.get("team_lead_group"),
        calls: text_value(row, "calls"),
        live_chat: text_value(row, "live_chat"),
        helpdesk_ticketing: text_value(row, "helpdesk_ticketing"),
        support_emails: text_value(row, "support_emails"),
        social_tickets: text_value(row, "social_tickets"),
        billing_tickets: text_value(row, "billing_tickets"),
        walk_ins: text_value(row, "walk_ins"),
        sales_tickets: text_value(row, "sales_tickets"),
    };
    DailyRecord::from_raw(&raw)
}

pub async fn fetch_records(
    pool: &PgPool,
    since_date: NaiveDate,
    team: Option<&str>,
) -> anyhow::Result<Vec<DailyRecord>> {
    let mut query = format!(
        "SELECT {STATS_COLUMNS} FROM leaderboard.daily_stats WHERE stat_date >= $1"
    );
    if team.is_some() {
        query.push_str(" AND team_lead_group = $2");
    }
    query.push_str(" ORDER BY stat_date, agent_name");

    let mut rows = sqlx::query(&query).bind(since_date);
    if let Some(value) = team {
        rows = rows.bind(value);
    }

    let records: Vec<DailyRecord> = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch daily stats")?
        .iter()
        .map(record_from_row)
        .collect();

    debug!(count = records.len(), %since_date, team = ?team, "fetched daily stats");
    Ok(records)
}

pub async fn fetch_all_records(pool: &PgPool) -> anyhow::Result<Vec<DailyRecord>> {
    let query = format!(
        "SELECT {STATS_COLUMNS} FROM leaderboard.daily_stats ORDER BY stat_date DESC NULLS LAST"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn fetch_team_leads(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT team_lead_group
        FROM leaderboard.daily_stats
        WHERE team_lead_group IS NOT NULL AND team_lead_group <> ''
        ORDER BY team_lead_group
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get("team_lead_group")).collect())
}

/// Team lead of the user with this email, from their profile.
pub async fn team_for_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<String>> {
    let team: Option<Option<String>> = sqlx::query(
        "SELECT team_lead_name FROM leaderboard.profiles WHERE lower(email) = lower($1)",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .map(|row| row.get("team_lead_name"));

    Ok(team.flatten().filter(|team| !team.is_empty()))
}

async fn upsert_agent(pool: &PgPool, entry: &StatEntry) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO leaderboard.agents (agent_id, agent_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (agent_id) DO UPDATE
        SET email = COALESCE(leaderboard.agents.email, EXCLUDED.email)
        "#,
    )
    .bind(&entry.agent_id)
    .bind(&entry.agent_name)
    .bind(&entry.email)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stores one day of stats. Returns `false` when the agent already has a
/// record for that date.
pub async fn insert_stats(pool: &PgPool, entry: &StatEntry) -> anyhow::Result<bool> {
    upsert_agent(pool, entry).await?;

    let count = |channel: Channel| entry.counts.get(channel).to_string();
    let result = sqlx::query(
        r#"
        INSERT INTO leaderboard.daily_stats
        (id, agent_id, agent_name, email, stat_date, calls, live_chat, helpdesk_ticketing,
         support_emails, social_tickets, billing_tickets, walk_ins, sales_tickets,
         agent_group, team_lead_group)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (agent_name, stat_date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.agent_id)
    .bind(&entry.agent_name)
    .bind(&entry.email)
    .bind(entry.date)
    .bind(count(Channel::Calls))
    .bind(count(Channel::LiveChat))
    .bind(count(Channel::HelpdeskTicketing))
    .bind(count(Channel::SupportEmails))
    .bind(count(Channel::SocialTickets))
    .bind(count(Channel::BillingTickets))
    .bind(count(Channel::WalkIns))
    .bind(count(Channel::SalesTickets))
    .bind(&entry.group)
    .bind(&entry.team_lead_group)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_entry(pool: &PgPool, entry: &StatEntry) -> anyhow::Result<()> {
    if !insert_stats(pool, entry).await? {
        return Err(DomainError::DuplicateEntry {
            agent: entry.agent_name.clone(),
            date: entry.date,
        }
        .into());
    }
    info!(agent = %entry.agent_name, date = %entry.date, "stored manual entry");
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = import::read_rows(file)?;
    if rows.is_empty() {
        return Err(DomainError::EmptyImport(csv_path.to_path_buf()).into());
    }

    let (entries, skipped) = import::prepare_entries(&rows);
    let mut summary = ImportSummary {
        skipped,
        ..ImportSummary::default()
    };

    for entry in &entries {
        match insert_stats(pool, entry).await {
            Ok(true) => summary.processed += 1,
            Ok(false) => summary.duplicates += 1,
            Err(err) => {
                warn!(agent = %entry.agent_name, date = %entry.date, error = %err, "failed to insert row");
                summary.skipped += 1;
            }
        }
    }

    info!(
        processed = summary.processed,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        "import finished"
    );
    Ok(summary)
}

pub async fn delete_record(pool: &PgPool, agent_name: &str, date: NaiveDate) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "DELETE FROM leaderboard.daily_stats WHERE agent_name = $1 AND stat_date = $2",
    )
    .bind(agent_name)
    .bind(date)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn profile_from_row(row: &PgRow) -> AgentProfile {
    let role: Option<String> = row.get("role");
    AgentProfile {
        agent_id: row.get("agent_id"),
        agent_name: row.get("agent_name"),
        email: row.get("email"),
        profile: row.get("profile"),
        role: Role::from_db(role.as_deref()),
        team_lead_name: row.get("team_lead_name"),
        avatar: row.get("avatar"),
        department: row.get("department"),
        post: row.get("post"),
    }
}

pub async fn list_agents(pool: &PgPool, role: Option<Role>) -> anyhow::Result<Vec<AgentProfile>> {
    let query = format!("{PROFILE_QUERY} ORDER BY a.agent_name");
    let agents = sqlx::query(&query)
        .fetch_all(pool)
        .await?
        .iter()
        .map(profile_from_row)
        .filter(|agent| role.map_or(true, |role| agent.role == role))
        .collect();
    Ok(agents)
}

/// Ids of every agent in the directory. Aggregation trusts only these.
pub async fn fetch_agent_ids(pool: &PgPool) -> anyhow::Result<HashSet<String>> {
    let rows = sqlx::query("SELECT agent_id FROM leaderboard.agents")
        .fetch_all(pool)
        .await
        .context("failed to fetch agent directory")?;
    Ok(rows.iter().map(|row| row.get("agent_id")).collect())
}

pub async fn agent_profile(pool: &PgPool, agent_id: &str) -> anyhow::Result<AgentProfile> {
    let query = format!("{PROFILE_QUERY} WHERE a.agent_id = $1");
    let row = sqlx::query(&query)
        .bind(agent_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DomainError::UnknownAgent(agent_id.to_string()))?;
    Ok(profile_from_row(&row))
}

pub async fn agent_history(
    pool: &PgPool,
    agent_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<DailyRecord>> {
    let query = format!(
        "SELECT {STATS_COLUMNS} FROM leaderboard.daily_stats \
         WHERE agent_id = $1 ORDER BY stat_date DESC NULLS LAST LIMIT $2"
    );
    let rows = sqlx::query(&query)
        .bind(agent_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn add_agent(
    pool: &PgPool,
    name: &str,
    email: Option<&str>,
    profile: Option<&str>,
    team_lead: Option<&str>,
) -> anyhow::Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::MissingAgentName.into());
    }
    let agent_id = agent_slug(name);

    sqlx::query(
        "INSERT INTO leaderboard.agents (agent_id, agent_name, email, profile) VALUES ($1, $2, $3, $4)",
    )
    .bind(&agent_id)
    .bind(name)
    .bind(email)
    .bind(profile)
    .execute(pool)
    .await
    .with_context(|| format!("failed to add agent {agent_id}"))?;

    sqlx::query(
        r#"
        INSERT INTO leaderboard.profiles (agent_id, email, role, team_lead_name)
        VALUES ($1, $2, 'agent', $3)
        ON CONFLICT (agent_id) DO NOTHING
        "#,
    )
    .bind(&agent_id)
    .bind(email)
    .bind(team_lead)
    .execute(pool)
    .await?;

    info!(%agent_id, "added agent");
    Ok(agent_id)
}

pub async fn update_agent(
    pool: &PgPool,
    agent_id: &str,
    name: Option<&str>,
    email: Option<&str>,
    profile: Option<&str>,
    team_lead: Option<&str>,
) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE leaderboard.agents
        SET agent_name = COALESCE($2, agent_name),
            email = COALESCE($3, email),
            profile = COALESCE($4, profile)
        WHERE agent_id = $1
        "#,
    )
    .bind(agent_id)
    .bind(name.map(str::trim).filter(|name| !name.is_empty()))
    .bind(email)
    .bind(profile)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DomainError::UnknownAgent(agent_id.to_string()).into());
    }

    if email.is_some() || team_lead.is_some() {
        sqlx::query(
            r#"
            INSERT INTO leaderboard.profiles (agent_id, email, team_lead_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (agent_id) DO UPDATE
            SET email = COALESCE(EXCLUDED.email, leaderboard.profiles.email),
                team_lead_name = COALESCE(EXCLUDED.team_lead_name, leaderboard.profiles.team_lead_name)
            "#,
        )
        .bind(agent_id)
        .bind(email)
        .bind(team_lead)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn remove_agent(pool: &PgPool, agent_id: &str) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM leaderboard.agents WHERE agent_id = $1")
        .bind(agent_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DomainError::UnknownAgent(agent_id.to_string()).into());
    }
    info!(%agent_id, "removed agent");
    Ok(())
}

async fn ensure_agent(pool: &PgPool, agent_id: &str) -> anyhow::Result<()> {
    let exists = sqlx::query("SELECT 1 FROM leaderboard.agents WHERE agent_id = $1")
        .bind(agent_id)
        .fetch_optional(pool)
        .await?
        .is_some();

    if !exists {
        return Err(DomainError::UnknownAgent(agent_id.to_string()).into());
    }
    Ok(())
}

pub async fn set_role(pool: &PgPool, agent_id: &str, role: Role) -> anyhow::Result<()> {
    ensure_agent(pool, agent_id).await?;
    sqlx::query(
        r#"
        INSERT INTO leaderboard.profiles (agent_id, role)
        VALUES ($1, $2)
        ON CONFLICT (agent_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(agent_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;

    info!(%agent_id, %role, "role updated");
    Ok(())
}

/// Sets or, with `None`, clears the avatar reference of an agent.
pub async fn set_avatar(pool: &PgPool, agent_id: &str, reference: Option<&str>) -> anyhow::Result<()> {
    ensure_agent(pool, agent_id).await?;
    sqlx::query(
        r#"
        INSERT INTO leaderboard.profiles (agent_id, avatar)
        VALUES ($1, $2)
        ON CONFLICT (agent_id) DO UPDATE SET avatar = EXCLUDED.avatar
        "#,
    )
    .bind(agent_id)
    .bind(reference)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_avatars(pool: &PgPool) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query(
        "SELECT agent_id, avatar FROM leaderboard.profiles WHERE avatar IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("agent_id"), row.get("avatar")))
        .collect())
}
