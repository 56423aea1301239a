use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;

/// A category of work an agent handles, tracked as its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Calls,
    LiveChat,
    HelpdeskTicketing,
    SupportEmails,
    SocialTickets,
    BillingTickets,
    WalkIns,
    SalesTickets,
}

impl Channel {
    pub const COUNT: usize = 8;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Calls,
        Channel::LiveChat,
        Channel::HelpdeskTicketing,
        Channel::SupportEmails,
        Channel::SocialTickets,
        Channel::BillingTickets,
        Channel::WalkIns,
        Channel::SalesTickets,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            Channel::Calls => "calls",
            Channel::LiveChat => "live_chat",
            Channel::HelpdeskTicketing => "helpdesk_ticketing",
            Channel::SupportEmails => "support_emails",
            Channel::SocialTickets => "social_tickets",
            Channel::BillingTickets => "billing_tickets",
            Channel::WalkIns => "walk_ins",
            Channel::SalesTickets => "sales_tickets",
        }
    }

    /// Column header used by the stats sheet and its JSON exports.
    pub fn label(self) -> &'static str {
        match self {
            Channel::Calls => "Calls",
            Channel::LiveChat => "Live Chat",
            Channel::HelpdeskTicketing => "Helpdesk ticketing",
            Channel::SupportEmails => "Support/DNS Emails",
            Channel::SocialTickets => "Social Tickets",
            Channel::BillingTickets => "Billing Tickets",
            Channel::WalkIns => "Walk-Ins",
            Channel::SalesTickets => "Sales Tickets",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let key = lowered.replace('-', "_");
        Channel::ALL
            .into_iter()
            .find(|channel| channel.key() == key || channel.label().to_lowercase() == lowered)
            .ok_or_else(|| DomainError::UnknownChannel(s.to_string()))
    }
}

/// The value an aggregation is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Total,
    Channel(Channel),
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Total => "Total Issues",
            Metric::Channel(channel) => channel.label(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Total => f.write_str("total"),
            Metric::Channel(channel) => write!(f, "{channel}"),
        }
    }
}

impl FromStr for Metric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "total" | "total_issues" | "total-issues" => Ok(Metric::Total),
            _ => s.parse().map(Metric::Channel),
        }
    }
}

/// Per-channel counters, indexed by [`Channel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounts([u64; Channel::COUNT]);

impl ChannelCounts {
    pub fn get(&self, channel: Channel) -> u64 {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: u64) {
        self.0[channel.index()] = value;
    }

    pub fn accumulate(&mut self, other: &ChannelCounts) {
        for (sum, value) in self.0.iter_mut().zip(other.0.iter()) {
            *sum = sum.saturating_add(*value);
        }
    }

    pub fn total(&self, channels: &[Channel]) -> u64 {
        channels
            .iter()
            .fold(0u64, |acc, channel| acc.saturating_add(self.get(*channel)))
    }
}

impl Serialize for ChannelCounts {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(Channel::COUNT))?;
        for channel in Channel::ALL {
            map.serialize_entry(channel.key(), &self.get(channel))?;
        }
        map.end()
    }
}

/// A daily stats row as it arrives from the database or a JSON export.
/// Counters are left untyped; [`DailyRecord::from_raw`] coerces them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDailyRecord {
    #[serde(rename = "Agent", alias = "agent", default)]
    pub agent: Option<String>,
    #[serde(rename = "agentid", alias = "agent_id", default)]
    pub agent_id: Option<String>,
    #[serde(rename = "Email", alias = "email", default)]
    pub email: Option<String>,
    #[serde(rename = "Date", alias = "date", default)]
    pub date: Option<String>,
    #[serde(rename = "Group", alias = "group", default)]
    pub group: Option<String>,
    #[serde(rename = "Team Lead Group", alias = "team_lead_group", default)]
    pub team_lead_group: Option<String>,
    #[serde(rename = "Calls", alias = "calls", default)]
    pub calls: Value,
    #[serde(rename = "Live Chat", alias = "live_chat", default)]
    pub live_chat: Value,
    #[serde(rename = "Helpdesk ticketing", alias = "helpdesk_ticketing", default)]
    pub helpdesk_ticketing: Value,
    #[serde(rename = "Support/DNS Emails", alias = "support_emails", default)]
    pub support_emails: Value,
    #[serde(rename = "Social Tickets", alias = "social_tickets", default)]
    pub social_tickets: Value,
    #[serde(rename = "Billing Tickets", alias = "billing_tickets", default)]
    pub billing_tickets: Value,
    #[serde(rename = "Walk-Ins", alias = "walk_ins", default)]
    pub walk_ins: Value,
    #[serde(rename = "Sales Tickets", alias = "sales_tickets", default)]
    pub sales_tickets: Value,
}

impl RawDailyRecord {
    fn raw_count(&self, channel: Channel) -> &Value {
        match channel {
            Channel::Calls => &self.calls,
            Channel::LiveChat => &self.live_chat,
            Channel::HelpdeskTicketing => &self.helpdesk_ticketing,
            Channel::SupportEmails => &self.support_emails,
            Channel::SocialTickets => &self.social_tickets,
            Channel::BillingTickets => &self.billing_tickets,
            Channel::WalkIns => &self.walk_ins,
            Channel::SalesTickets => &self.sales_tickets,
        }
    }
}

/// One agent's counts for one calendar date, with every counter coerced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyRecord {
    pub agent_name: String,
    pub agent_id: Option<String>,
    pub email: Option<String>,
    pub date: Option<NaiveDate>,
    pub group: Option<String>,
    pub team_lead_group: Option<String>,
    pub counts: ChannelCounts,
}

impl DailyRecord {
    pub fn from_raw(raw: &RawDailyRecord) -> Self {
        let mut counts = ChannelCounts::default();
        for channel in Channel::ALL {
            counts.set(channel, coerce_count(raw.raw_count(channel)));
        }

        Self {
            agent_name: raw.agent.as_deref().map(str::trim).unwrap_or_default().to_string(),
            agent_id: non_empty(raw.agent_id.as_deref()),
            email: non_empty(raw.email.as_deref()),
            date: raw.date.as_deref().and_then(parse_record_date),
            group: non_empty(raw.group.as_deref()),
            team_lead_group: non_empty(raw.team_lead_group.as_deref()),
            counts,
        }
    }

    pub fn total(&self, channels: &[Channel]) -> u64 {
        self.counts.total(channels)
    }
}

/// Coerces a loosely typed counter to a non-negative integer. Never fails:
/// anything that does not start with a decimal integer counts as zero.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                unsigned
            } else if number.is_i64() {
                0
            } else {
                match number.as_f64() {
                    Some(float) if float.is_finite() && float > 0.0 => float.trunc() as u64,
                    _ => 0,
                }
            }
        }
        Value::String(text) => parse_count(text),
        _ => 0,
    }
}

/// Reads the leading decimal integer of `text`, the way spreadsheet exports
/// are interpreted: `" 12 tickets"` is 12, `"3.9"` is 3, `"-4"` and `"n/a"` are 0.
pub fn parse_count(text: &str) -> u64 {
    let trimmed = text.trim_start();
    let unsigned = match trimmed.strip_prefix('+') {
        Some(rest) => rest,
        None if trimmed.starts_with('-') => return 0,
        None => trimmed,
    };

    unsigned
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        })
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_record_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Stable agent id derived from a display name: lowercase, whitespace runs
/// replaced by `-`.
pub fn agent_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Accumulated totals for one agent over a time window.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedAgent {
    pub agent_id: Option<String>,
    pub agent_name: String,
    pub email: Option<String>,
    pub team_lead_group: Option<String>,
    pub counts: ChannelCounts,
    pub total: u64,
    pub value: u64,
    pub latest_date: Option<NaiveDate>,
    pub record_count: usize,
    pub avg_per_day: f64,
    pub rank: usize,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelLeader {
    pub channel: Channel,
    pub agent_id: Option<String>,
    pub agent_name: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TeamSummary {
    pub total_agents: usize,
    pub total_issues: u64,
    pub avg_issues_per_agent: f64,
    pub top_team: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    TeamLead,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::TeamLead => "team_lead",
            Role::Agent => "agent",
        }
    }

    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(|role| role.trim().to_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            Some("team_lead") | Some("team lead") | Some("manager") => Role::TeamLead,
            _ => Role::Agent,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub agent_name: String,
    pub email: Option<String>,
    pub profile: Option<String>,
    pub role: Role,
    pub team_lead_name: Option<String>,
    pub avatar: Option<String>,
    pub department: Option<String>,
    pub post: Option<String>,
}

/// One day of stats for one agent, ready to be stored.
#[derive(Debug, Clone)]
pub struct StatEntry {
    pub agent_id: String,
    pub agent_name: String,
    pub email: Option<String>,
    pub date: NaiveDate,
    pub counts: ChannelCounts,
    pub group: Option<String>,
    pub team_lead_group: Option<String>,
}

impl StatEntry {
    /// Requires a non-blank agent name; the agent id is derived from it.
    pub fn new(agent_name: &str, date: NaiveDate) -> Result<Self, DomainError> {
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return Err(DomainError::MissingAgentName);
        }

        Ok(Self {
            agent_id: agent_slug(agent_name),
            agent_name: agent_name.to_string(),
            email: None,
            date,
            counts: ChannelCounts::default(),
            group: None,
            team_lead_group: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub processed: usize,
    pub duplicates: usize,
    pub skipped: usize,
}
