use std::io::Read;

use serde::Deserialize;
use tracing::warn;

use crate::models::{parse_count, parse_record_date, Channel, ChannelCounts, StatEntry};

/// One row of a stats sheet exported to CSV. Headers follow the sheet's
/// column names; every column is optional. The sheet's `agentid` column
/// holds a fresh id per row, so it is not read: agents are identified by
/// the slug of their name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportRow {
    #[serde(rename = "Agent")]
    pub agent: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Helpdesk ticketing")]
    pub helpdesk_ticketing: Option<String>,
    #[serde(rename = "Calls")]
    pub calls: Option<String>,
    #[serde(rename = "Live Chat")]
    pub live_chat: Option<String>,
    #[serde(rename = "Support/DNS Emails")]
    pub support_emails: Option<String>,
    #[serde(rename = "Social Tickets")]
    pub social_tickets: Option<String>,
    #[serde(rename = "Billing Tickets")]
    pub billing_tickets: Option<String>,
    #[serde(rename = "Walk-Ins")]
    pub walk_ins: Option<String>,
    #[serde(rename = "Sales Tickets")]
    pub sales_tickets: Option<String>,
    #[serde(rename = "Group")]
    pub group: Option<String>,
    #[serde(rename = "Team Lead Group")]
    pub team_lead_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingAgent,
    InvalidDate(String),
}

impl ImportRow {
    fn raw_count(&self, channel: Channel) -> Option<&str> {
        let value = match channel {
            Channel::Calls => &self.calls,
            Channel::LiveChat => &self.live_chat,
            Channel::HelpdeskTicketing => &self.helpdesk_ticketing,
            Channel::SupportEmails => &self.support_emails,
            Channel::SocialTickets => &self.social_tickets,
            Channel::BillingTickets => &self.billing_tickets,
            Channel::WalkIns => &self.walk_ins,
            Channel::SalesTickets => &self.sales_tickets,
        };
        value.as_deref()
    }

    pub fn to_entry(&self) -> Result<StatEntry, SkipReason> {
        let raw_date = self.date.as_deref().unwrap_or_default();
        let date = parse_record_date(raw_date)
            .ok_or_else(|| SkipReason::InvalidDate(raw_date.to_string()))?;
        let mut entry = StatEntry::new(self.agent.as_deref().unwrap_or_default(), date)
            .map_err(|_| SkipReason::MissingAgent)?;

        entry.email = non_blank(&self.email);
        entry.group = non_blank(&self.group);
        entry.team_lead_group = non_blank(&self.team_lead_group);

        let mut counts = ChannelCounts::default();
        for channel in Channel::ALL {
            counts.set(channel, self.raw_count(channel).map(parse_count).unwrap_or(0));
        }
        entry.counts = counts;

        Ok(entry)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn read_rows<R: Read>(reader: R) -> anyhow::Result<Vec<ImportRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in reader.deserialize::<ImportRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Splits rows into storable entries and a count of skipped rows.
pub fn prepare_entries(rows: &[ImportRow]) -> (Vec<StatEntry>, usize) {
    let mut entries = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;

    for (line, row) in rows.iter().enumerate() {
        match row.to_entry() {
            Ok(entry) => entries.push(entry),
            Err(SkipReason::MissingAgent) => skipped += 1,
            Err(SkipReason::InvalidDate(value)) => {
                warn!(row = line + 1, date = %value, "skipping row with unreadable date");
                skipped += 1;
            }
        }
    }

    (entries, skipped)
}
