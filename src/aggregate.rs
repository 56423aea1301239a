//! Per-agent aggregation and ranking of daily stats.
//!
//! Everything here is a pure function of its inputs. Records are expected to
//! be coerced already (see [`DailyRecord::from_raw`]) and filtered to the
//! window by the caller; the window is only used for per-day averages.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::config::{ChannelScope, GroupBy};
use crate::models::{
    AggregatedAgent, ChannelCounts, ChannelLeader, DailyRecord, Metric, TeamSummary,
};
use crate::window::TimeWindow;

/// What drives an aggregation: the channels summed into the total, the
/// value agents are ordered by, and how records are keyed.
#[derive(Debug, Clone, Copy)]
pub struct Ranking<'a> {
    pub scope: &'a ChannelScope,
    pub metric: Metric,
    pub group_by: GroupBy,
    /// Ids of the agent directory. When present, only these ids identify an
    /// agent; any other id on a record is treated as noise.
    pub directory: Option<&'a HashSet<String>>,
}

impl<'a> Ranking<'a> {
    pub fn new(scope: &'a ChannelScope, group_by: GroupBy) -> Self {
        Self {
            scope,
            metric: Metric::Total,
            group_by,
            directory: None,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_directory(mut self, directory: &'a HashSet<String>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn is_directory_id(&self, id: &str) -> bool {
        self.directory.is_some_and(|ids| ids.contains(id))
    }
}

/// Top and bottom of the active (non-zero) agents.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Standings {
    pub top: Vec<AggregatedAgent>,
    pub bottom: Vec<AggregatedAgent>,
}

#[derive(Debug, Default)]
struct AgentAccumulator {
    agent_id: Option<String>,
    agent_name: String,
    email: Option<String>,
    team_lead_group: Option<String>,
    counts: ChannelCounts,
    latest_date: Option<NaiveDate>,
    record_count: usize,
}

impl AgentAccumulator {
    fn add_record(&mut self, record: &DailyRecord, agent_id: Option<&str>) {
        if self.agent_id.is_none() {
            self.agent_id = agent_id.map(str::to_string);
        }
        if self.agent_name.is_empty() {
            self.agent_name = record.agent_name.clone();
        }
        if self.email.is_none() {
            self.email = record.email.clone();
        }
        if self.team_lead_group.is_none() {
            self.team_lead_group = record.team_lead_group.clone();
        }

        self.counts.accumulate(&record.counts);
        self.latest_date = self.latest_date.max(record.date);
        self.record_count += 1;
    }

    fn into_agent(self, window: TimeWindow, ranking: &Ranking<'_>) -> AggregatedAgent {
        let total = self.counts.total(&ranking.scope.channels);
        let value = match ranking.metric {
            Metric::Total => total,
            Metric::Channel(channel) => self.counts.get(channel),
        };

        AggregatedAgent {
            agent_id: self.agent_id,
            agent_name: self.agent_name,
            email: self.email,
            team_lead_group: self.team_lead_group,
            counts: self.counts,
            total,
            value,
            latest_date: self.latest_date,
            record_count: self.record_count,
            avg_per_day: round_tenth(total as f64 / f64::from(window.nominal_days())),
            rank: 0,
            avatar: None,
        }
    }
}

/// Resolves every record to a group key and the agent id the group carries.
///
/// Imported sheets stamp a fresh id on each row and older rows may have
/// lost theirs, so an id alone does not identify an agent. Grouping by id
/// uses a record's own id only when it is a directory id. Every other
/// record joins the first directory id seen under its name. Without a
/// directory, the first id seen under a name stands for all of that
/// name's records. Names with no usable id group by name.
fn resolve_agents<'r>(
    records: &'r [DailyRecord],
    ranking: &Ranking<'_>,
) -> Vec<(String, Option<&'r str>)> {
    if ranking.group_by == GroupBy::AgentName {
        return records
            .iter()
            .map(|record| {
                let id = record
                    .agent_id
                    .as_deref()
                    .filter(|id| ranking.is_directory_id(id));
                (format!("name:{}", record.agent_name), id)
            })
            .collect();
    }

    let mut by_name: HashMap<&str, &str> = HashMap::new();
    for record in records {
        let usable = record
            .agent_id
            .as_deref()
            .filter(|id| ranking.directory.is_none() || ranking.is_directory_id(id));
        if let Some(id) = usable {
            by_name.entry(record.agent_name.as_str()).or_insert(id);
        }
    }

    records
        .iter()
        .map(|record| {
            let id = record
                .agent_id
                .as_deref()
                .filter(|id| ranking.is_directory_id(id))
                .or_else(|| by_name.get(record.agent_name.as_str()).copied());
            match id {
                Some(id) => (format!("id:{id}"), Some(id)),
                None => (format!("name:{}", record.agent_name), None),
            }
        })
        .collect()
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Groups records per agent, sums every channel, and returns the agents
/// ranked by the selected metric. Ties keep first-encounter order.
pub fn aggregate(
    records: &[DailyRecord],
    window: TimeWindow,
    ranking: &Ranking<'_>,
) -> Vec<AggregatedAgent> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<AgentAccumulator> = Vec::new();

    for (record, (key, agent_id)) in records.iter().zip(resolve_agents(records, ranking)) {
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(AgentAccumulator::default());
            groups.len() - 1
        });
        groups[slot].add_record(record, agent_id);
    }

    let mut agents: Vec<AggregatedAgent> = groups
        .into_iter()
        .map(|group| group.into_agent(window, ranking))
        .collect();

    agents.sort_by(|a, b| b.value.cmp(&a.value));
    for (position, agent) in agents.iter_mut().enumerate() {
        agent.rank = position + 1;
    }

    agents
}

pub fn top_n(agents: &[AggregatedAgent], n: usize) -> Vec<AggregatedAgent> {
    agents.iter().take(n).cloned().collect()
}

/// The `n` lowest non-zero agents, worst first.
pub fn bottom_n(agents: &[AggregatedAgent], n: usize) -> Vec<AggregatedAgent> {
    let active: Vec<&AggregatedAgent> = agents.iter().filter(|agent| agent.value > 0).collect();
    let start = active.len().saturating_sub(n);
    active[start..].iter().rev().map(|agent| (*agent).clone()).collect()
}

pub fn active(agents: &[AggregatedAgent]) -> Vec<AggregatedAgent> {
    agents.iter().filter(|agent| agent.value > 0).cloned().collect()
}

pub fn standings(agents: &[AggregatedAgent], top: usize, bottom: usize) -> Standings {
    let active = active(agents);
    Standings {
        top: top_n(&active, top),
        bottom: bottom_n(&active, bottom),
    }
}

/// The rank-1 agent for each channel in the ranking's scope. Channels
/// nobody worked are left out.
pub fn channel_leaders(
    records: &[DailyRecord],
    window: TimeWindow,
    ranking: &Ranking<'_>,
) -> Vec<ChannelLeader> {
    ranking
        .scope
        .channels
        .iter()
        .filter_map(|&channel| {
            let ranking = ranking.with_metric(Metric::Channel(channel));
            let leader = aggregate(records, window, &ranking).into_iter().next()?;
            (leader.value > 0).then(|| ChannelLeader {
                channel,
                agent_id: leader.agent_id,
                agent_name: leader.agent_name,
                value: leader.value,
            })
        })
        .collect()
}

/// Team-level totals. Each record counts toward the team lead group it was
/// logged under, so an agent who moved teams inside the window splits
/// their issues between both teams.
pub fn team_summary(
    agents: &[AggregatedAgent],
    records: &[DailyRecord],
    scope: &ChannelScope,
) -> TeamSummary {
    let total_issues = agents
        .iter()
        .fold(0u64, |acc, agent| acc.saturating_add(agent.total));

    let mut team_index: HashMap<&str, usize> = HashMap::new();
    let mut team_totals: Vec<(&str, u64)> = Vec::new();
    for record in records {
        let team = record.team_lead_group.as_deref().unwrap_or("");
        let slot = *team_index.entry(team).or_insert_with(|| {
            team_totals.push((team, 0));
            team_totals.len() - 1
        });
        team_totals[slot].1 = team_totals[slot].1.saturating_add(record_total(record, scope));
    }

    let top_team = team_totals
        .iter()
        .filter(|(team, _)| !team.is_empty())
        .fold(None::<(&str, u64)>, |best, &(team, total)| match best {
            Some((_, best_total)) if best_total >= total => best,
            _ => Some((team, total)),
        })
        .map(|(team, _)| team.to_string());

    TeamSummary {
        total_agents: agents.len(),
        total_issues,
        avg_issues_per_agent: if agents.is_empty() {
            0.0
        } else {
            round_tenth(total_issues as f64 / agents.len() as f64)
        },
        top_team,
    }
}

/// Attaches avatar references keyed by agent id.
pub fn attach_avatars(agents: &mut [AggregatedAgent], avatars: &HashMap<String, String>) {
    for agent in agents.iter_mut() {
        agent.avatar = agent
            .agent_id
            .as_ref()
            .and_then(|id| avatars.get(id))
            .cloned();
    }
}

/// Per-record total for the scope, used by the history views.
pub fn record_total(record: &DailyRecord, scope: &ChannelScope) -> u64 {
    record.total(&scope.channels)
}

/// Channel sums across a list of records, e.g. an agent's recent history.
pub fn sum_records(records: &[DailyRecord]) -> ChannelCounts {
    records.iter().fold(ChannelCounts::default(), |mut acc, record| {
        acc.accumulate(&record.counts);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, RawDailyRecord};
    use serde_json::json;

    fn scope(channels: &[Channel]) -> ChannelScope {
        ChannelScope {
            name: "test".to_string(),
            channels: channels.to_vec(),
        }
    }

    fn raw(value: serde_json::Value) -> DailyRecord {
        let raw: RawDailyRecord = serde_json::from_value(value).unwrap();
        DailyRecord::from_raw(&raw)
    }

    fn record(name: &str, calls: u64, chat: u64) -> DailyRecord {
        let mut counts = ChannelCounts::default();
        counts.set(Channel::Calls, calls);
        counts.set(Channel::LiveChat, chat);
        DailyRecord {
            agent_name: name.to_string(),
            counts,
            ..DailyRecord::default()
        }
    }

    #[test]
    fn aggregates_mixed_inputs_and_ranks() {
        let records = vec![
            raw(json!({"Agent": "A", "Calls": 3, "Live Chat": "2"})),
            raw(json!({"Agent": "A", "Calls": 1, "Live Chat": null})),
            raw(json!({"Agent": "B", "Calls": 5, "Live Chat": 0})),
        ];
        let scope = scope(&[Channel::Calls, Channel::LiveChat]);
        let ranking = Ranking::new(&scope, GroupBy::AgentName);

        let agents = aggregate(&records, TimeWindow::Daily, &ranking);
        assert_eq!(agents.len(), 2);

        assert_eq!(agents[0].agent_name, "A");
        assert_eq!(agents[0].counts.get(Channel::Calls), 4);
        assert_eq!(agents[0].counts.get(Channel::LiveChat), 2);
        assert_eq!(agents[0].total, 6);
        assert_eq!(agents[0].rank, 1);

        assert_eq!(agents[1].agent_name, "B");
        assert_eq!(agents[1].counts.get(Channel::Calls), 5);
        assert_eq!(agents[1].counts.get(Channel::LiveChat), 0);
        assert_eq!(agents[1].total, 5);
        assert_eq!(agents[1].rank, 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let scope = scope(&Channel::ALL);
        let ranking = Ranking::new(&scope, GroupBy::AgentId);
        assert!(aggregate(&[], TimeWindow::Weekly, &ranking).is_empty());
        assert!(channel_leaders(&[], TimeWindow::Weekly, &ranking).is_empty());
        assert_eq!(team_summary(&[], &[], &scope), TeamSummary::default());
    }

    #[test]
    fn totals_only_cover_scoped_channels() {
        let mut walk_in = record("A", 2, 0);
        walk_in.counts.set(Channel::WalkIns, 10);
        let scope = scope(&[Channel::Calls]);
        let ranking = Ranking::new(&scope, GroupBy::AgentName);

        let agents = aggregate(&[walk_in], TimeWindow::Daily, &ranking);
        assert_eq!(agents[0].total, 2);
        assert_eq!(agents[0].counts.get(Channel::WalkIns), 10);
    }

    #[test]
    fn sorts_by_selected_channel() {
        let records = vec![record("A", 10, 1), record("B", 1, 8), record("C", 4, 4)];
        let scope = scope(&[Channel::Calls, Channel::LiveChat]);
        let ranking =
            Ranking::new(&scope, GroupBy::AgentName).with_metric(Metric::Channel(Channel::LiveChat));

        let agents = aggregate(&records, TimeWindow::Daily, &ranking);
        let names: Vec<&str> = agents.iter().map(|a| a.agent_name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
        assert_eq!(agents[0].value, 8);
        assert_eq!(agents[2].total, 11);
    }

    #[test]
    fn ties_keep_first_encounter_order_with_distinct_ranks() {
        let records = vec![record("Late", 3, 0), record("Early", 3, 0)];
        let scope = scope(&[Channel::Calls]);
        let ranking = Ranking::new(&scope, GroupBy::AgentName);

        let first = aggregate(&records, TimeWindow::Daily, &ranking);
        let second = aggregate(&records, TimeWindow::Daily, &ranking);
        assert_eq!(first[0].agent_name, "Late");
        assert_eq!(first[0].rank, 1);
        assert_eq!(first[1].rank, 2);

        let summary = |agents: &[AggregatedAgent]| {
            agents
                .iter()
                .map(|a| (a.agent_name.clone(), a.total, a.rank))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
    }

    #[test]
    fn ranking_invariants_hold_over_generated_records() {
        let names = ["Avery", "Jules", "Kiara", "Noor", "Sam"];
        let texts = ["7", "", "abc", " 3", "12.5", "-1"];
        let mut seed: u64 = 0x9e37_79b9;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut records = Vec::new();
        for _ in 0..200 {
            let name = names[(next() % names.len() as u64) as usize];
            let chat = texts[(next() % texts.len() as u64) as usize];
            let calls = next() % 20;
            records.push(raw(json!({"Agent": name, "Calls": calls, "Live Chat": chat})));
        }

        let scope = scope(&[Channel::Calls, Channel::LiveChat]);
        let ranking = Ranking::new(&scope, GroupBy::AgentName);
        let agents = aggregate(&records, TimeWindow::Monthly, &ranking);

        let mut distinct: Vec<&str> = records.iter().map(|r| r.agent_name.as_str()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(agents.len(), distinct.len());

        for agent in &agents {
            let expected: u64 = records
                .iter()
                .filter(|r| r.agent_name == agent.agent_name)
                .map(|r| r.counts.get(Channel::Calls) + r.counts.get(Channel::LiveChat))
                .sum();
            assert_eq!(agent.total, expected);
            assert_eq!(
                agent.total,
                agent.counts.get(Channel::Calls) + agent.counts.get(Channel::LiveChat)
            );
        }

        for pair in agents.windows(2) {
            assert!(pair[0].value >= pair[1].value);
            assert!(pair[0].rank < pair[1].rank);
        }
        assert_eq!(agents.first().map(|a| a.rank), Some(1));
    }

    fn with_id(mut record: DailyRecord, id: Option<&str>) -> DailyRecord {
        record.agent_id = id.map(str::to_string);
        record
    }

    #[test]
    fn default_grouping_collapses_row_ids_into_one_agent() {
        let config = crate::config::Config::default();
        let scope = config.scope(None).unwrap();
        let records = vec![
            with_id(record("Avery Lee", 4, 0), Some("5f0c2d1e-8a8b-4f6e-9d0a-1b2c3d4e5f60")),
            with_id(record("Avery Lee", 3, 0), Some("0a9b8c7d-6e5f-4a3b-8c1d-2e3f4a5b6c7d")),
            with_id(record("Avery Lee", 2, 0), Some("avery-lee")),
            with_id(record("Avery Lee", 1, 0), None),
            with_id(record("Jules Moreno", 6, 0), Some("jules-moreno")),
        ];

        let agents = aggregate(
            &records,
            TimeWindow::Weekly,
            &Ranking::new(&scope, config.group_by),
        );
        let rows: Vec<(&str, u64, usize)> = agents
            .iter()
            .map(|a| (a.agent_name.as_str(), a.total, a.rank))
            .collect();
        assert_eq!(rows, vec![("Avery Lee", 10, 1), ("Jules Moreno", 6, 2)]);
        assert_eq!(agents[0].record_count, 4);
    }

    #[test]
    fn directory_ids_pin_identity() {
        let directory: HashSet<String> = ["avery-lee", "avery-lee-2", "jules"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let records = vec![
            with_id(record("Avery Lee", 2, 0), Some("avery-lee")),
            with_id(record("Avery Lee", 5, 0), Some("avery-lee-2")),
            with_id(record("Avery Lee", 1, 0), Some("3b1d0c4e-row-id")),
            with_id(record("Avery Lee", 1, 0), None),
            with_id(record("Jules Moreno", 3, 0), Some("jules")),
            with_id(record("Jules M.", 4, 0), Some("jules")),
        ];
        let scope = scope(&[Channel::Calls]);

        let by_id = aggregate(
            &records,
            TimeWindow::Daily,
            &Ranking::new(&scope, GroupBy::AgentId).with_directory(&directory),
        );
        let rows: Vec<(Option<&str>, u64)> = by_id
            .iter()
            .map(|a| (a.agent_id.as_deref(), a.total))
            .collect();
        assert_eq!(
            rows,
            vec![(Some("jules"), 7), (Some("avery-lee-2"), 5), (Some("avery-lee"), 4)]
        );
        assert_eq!(by_id[0].agent_name, "Jules Moreno");

        let by_name = aggregate(
            &records,
            TimeWindow::Daily,
            &Ranking::new(&scope, GroupBy::AgentName).with_directory(&directory),
        );
        let names: Vec<(&str, u64)> = by_name
            .iter()
            .map(|a| (a.agent_name.as_str(), a.total))
            .collect();
        assert_eq!(names, vec![("Avery Lee", 9), ("Jules M.", 4), ("Jules Moreno", 3)]);
        assert_eq!(by_name[0].agent_id.as_deref(), Some("avery-lee"));
    }

    #[test]
    fn tracks_latest_date_count_and_daily_average() {
        let mut older = record("A", 4, 0);
        older.date = NaiveDate::from_ymd_opt(2024, 3, 10);
        let mut newer = record("A", 3, 0);
        newer.date = NaiveDate::from_ymd_opt(2024, 3, 12);
        let undated = record("A", 0, 0);

        let scope = scope(&[Channel::Calls]);
        let agents = aggregate(
            &[newer, older, undated],
            TimeWindow::Weekly,
            &Ranking::new(&scope, GroupBy::AgentName),
        );
        assert_eq!(agents[0].latest_date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(agents[0].record_count, 3);
        assert_eq!(agents[0].avg_per_day, 1.0);
    }

    #[test]
    fn bottom_skips_zero_and_lists_worst_first() {
        let records = vec![
            record("A", 9, 0),
            record("B", 7, 0),
            record("C", 5, 0),
            record("D", 2, 0),
            record("Idle", 0, 0),
        ];
        let scope = scope(&[Channel::Calls]);
        let agents = aggregate(&records, TimeWindow::Daily, &Ranking::new(&scope, GroupBy::AgentName));

        let bottom: Vec<String> = bottom_n(&agents, 2).into_iter().map(|a| a.agent_name).collect();
        assert_eq!(bottom, vec!["D", "C"]);

        let top: Vec<String> = top_n(&agents, 2).into_iter().map(|a| a.agent_name).collect();
        assert_eq!(top, vec!["A", "B"]);

        let board = standings(&agents, 10, 10);
        assert_eq!(board.top.len(), 4);
        assert_eq!(board.bottom.first().map(|a| a.rank), Some(4));
        assert_eq!(bottom_n(&agents, 0).len(), 0);
    }

    #[test]
    fn channel_leaders_skip_idle_channels() {
        let mut helpdesk = record("Kiara", 0, 0);
        helpdesk.counts.set(Channel::HelpdeskTicketing, 6);
        let records = vec![record("Avery", 4, 1), record("Jules", 2, 3), helpdesk];
        let scope = scope(&[
            Channel::HelpdeskTicketing,
            Channel::Calls,
            Channel::LiveChat,
            Channel::BillingTickets,
        ]);

        let ranking = Ranking::new(&scope, GroupBy::AgentName);
        let leaders = channel_leaders(&records, TimeWindow::Daily, &ranking);
        let summary: Vec<(Channel, &str, u64)> = leaders
            .iter()
            .map(|l| (l.channel, l.agent_name.as_str(), l.value))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Channel::HelpdeskTicketing, "Kiara", 6),
                (Channel::Calls, "Avery", 4),
                (Channel::LiveChat, "Jules", 3),
            ]
        );
    }

    #[test]
    fn team_summary_picks_busiest_named_team() {
        let mut a = record("A", 5, 0);
        a.team_lead_group = Some("North".to_string());
        let mut b = record("B", 4, 0);
        b.team_lead_group = Some("South".to_string());
        let mut c = record("C", 3, 0);
        c.team_lead_group = Some("South".to_string());
        let d = record("D", 20, 0);

        let scope = scope(&[Channel::Calls]);
        let records = [a, b, c, d];
        let agents = aggregate(&records, TimeWindow::Daily, &Ranking::new(&scope, GroupBy::AgentName));
        let summary = team_summary(&agents, &records, &scope);

        assert_eq!(summary.total_agents, 4);
        assert_eq!(summary.total_issues, 32);
        assert_eq!(summary.avg_issues_per_agent, 8.0);
        assert_eq!(summary.top_team.as_deref(), Some("South"));
    }

    #[test]
    fn team_totals_follow_each_record_team() {
        let mut north_day = record("A", 6, 0);
        north_day.team_lead_group = Some("North".to_string());
        let mut south_day = record("A", 5, 0);
        south_day.team_lead_group = Some("South".to_string());
        let mut south_peer = record("B", 2, 0);
        south_peer.team_lead_group = Some("South".to_string());

        let scope = scope(&[Channel::Calls]);
        let records = [north_day, south_day, south_peer];
        let agents = aggregate(&records, TimeWindow::Weekly, &Ranking::new(&scope, GroupBy::AgentName));
        let summary = team_summary(&agents, &records, &scope);

        assert_eq!(agents[0].team_lead_group.as_deref(), Some("North"));
        assert_eq!(summary.total_issues, 13);
        assert_eq!(summary.top_team.as_deref(), Some("South"));
    }

    #[test]
    fn avatars_attach_by_agent_id() {
        let mut with_id = record("Avery", 1, 0);
        with_id.agent_id = Some("avery".to_string());
        let scope = scope(&[Channel::Calls]);
        let mut agents = aggregate(
            &[with_id, record("Jules", 1, 0)],
            TimeWindow::Daily,
            &Ranking::new(&scope, GroupBy::AgentId),
        );

        let avatars = HashMap::from([("avery".to_string(), "https://cdn.example/avery.png".to_string())]);
        attach_avatars(&mut agents, &avatars);
        assert_eq!(agents[0].avatar.as_deref(), Some("https://cdn.example/avery.png"));
        assert_eq!(agents[1].avatar, None);
    }
}
