use std::cmp::Ordering;

use crate::aggregate::{record_total, sum_records};
use crate::config::ChannelScope;
use crate::models::{ChannelCounts, DailyRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RecordSort {
    Agent,
    #[default]
    Date,
    Total,
}

/// Case-insensitive match on agent name, agent id or email.
pub fn matches_search(record: &DailyRecord, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let contains = |value: &str| value.to_lowercase().contains(&needle);

    contains(record.agent_name.as_str())
        || record.agent_id.as_deref().is_some_and(contains)
        || record.email.as_deref().is_some_and(contains)
}

pub fn search_and_sort(
    records: Vec<DailyRecord>,
    search: Option<&str>,
    sort: RecordSort,
    ascending: bool,
    scope: &ChannelScope,
) -> Vec<DailyRecord> {
    let mut filtered: Vec<DailyRecord> = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(needle) => records
            .into_iter()
            .filter(|record| matches_search(record, needle))
            .collect(),
        None => records,
    };

    filtered.sort_by(|a, b| {
        let ordering = match sort {
            RecordSort::Agent => a.agent_name.cmp(&b.agent_name),
            RecordSort::Date => a.date.cmp(&b.date),
            RecordSort::Total => record_total(a, scope).cmp(&record_total(b, scope)),
        };
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });

    filtered
}

/// Totals over an agent's recent records.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct HistorySummary {
    pub days: usize,
    pub total_issues: u64,
    pub counts: ChannelCounts,
}

pub fn summarize_history(records: &[DailyRecord], scope: &ChannelScope) -> HistorySummary {
    let counts = sum_records(records);
    HistorySummary {
        days: records.len(),
        total_issues: counts.total(&scope.channels),
        counts,
    }
}

/// Newest first, undated records last.
pub fn newest_first(a: &DailyRecord, b: &DailyRecord) -> Ordering {
    match (a.date, b.date) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
