use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{self, Ranking, Standings};
use crate::config::ChannelScope;
use crate::models::{AgentProfile, AggregatedAgent, ChannelLeader, DailyRecord, Metric, TeamSummary};
use crate::records::{newest_first, HistorySummary};
use crate::window::TimeWindow;

/// Everything the leaderboard views show for one window, computed from a
/// single batch of records.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub window: TimeWindow,
    pub since: NaiveDate,
    pub team: Option<String>,
    pub scope: String,
    pub metric: Metric,
    pub agents: Vec<AggregatedAgent>,
    pub standings: Standings,
    pub leaders: Vec<ChannelLeader>,
    pub summary: TeamSummary,
    pub recent: Vec<RecentRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentRecord {
    pub agent_name: String,
    pub date: Option<NaiveDate>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsView<'a> {
    pub window: TimeWindow,
    pub since: NaiveDate,
    pub team: Option<&'a str>,
    pub scope: &'a str,
    pub summary: &'a TeamSummary,
    pub agents: &'a [AggregatedAgent],
}

impl Snapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        records: Vec<DailyRecord>,
        window: TimeWindow,
        since: NaiveDate,
        team: Option<String>,
        ranking: &Ranking<'_>,
        leader_scope: &ChannelScope,
        top: usize,
        bottom: usize,
    ) -> Self {
        let agents = aggregate::aggregate(&records, window, ranking);
        let standings = aggregate::standings(&agents, top, bottom);
        let leader_ranking = Ranking {
            scope: leader_scope,
            ..*ranking
        };
        let leaders = aggregate::channel_leaders(&records, window, &leader_ranking);
        let summary = aggregate::team_summary(&agents, &records, ranking.scope);

        let mut latest = records;
        latest.sort_by(newest_first);
        let recent = latest
            .into_iter()
            .take(5)
            .map(|record| RecentRecord {
                total: aggregate::record_total(&record, ranking.scope),
                agent_name: record.agent_name,
                date: record.date,
            })
            .collect();

        Self {
            window,
            since,
            team,
            scope: ranking.scope.name.clone(),
            metric: ranking.metric,
            agents,
            standings,
            leaders,
            summary,
            recent,
        }
    }

    pub fn attach_avatars(&mut self, avatars: &HashMap<String, String>) {
        aggregate::attach_avatars(&mut self.agents, avatars);
        aggregate::attach_avatars(&mut self.standings.top, avatars);
        aggregate::attach_avatars(&mut self.standings.bottom, avatars);
    }

    /// The metrics view as JSON: team totals plus every agent's breakdown.
    pub fn metrics_view(&self) -> MetricsView<'_> {
        MetricsView {
            window: self.window,
            since: self.since,
            team: self.team.as_deref(),
            scope: &self.scope,
            summary: &self.summary,
            agents: &self.agents,
        }
    }

    pub fn team_label(&self) -> &str {
        self.team.as_deref().unwrap_or("all teams")
    }
}

fn rank_badge(rank: usize) -> String {
    match rank {
        1 => "[1st]".to_string(),
        2 => "[2nd]".to_string(),
        3 => "[3rd]".to_string(),
        _ => format!("#{rank}"),
    }
}

pub fn format_agent_line(agent: &AggregatedAgent, metric: Metric) -> String {
    let mut line = format!(
        "{} {} - {} {}",
        rank_badge(agent.rank),
        agent.agent_name,
        agent.value,
        metric.label()
    );
    if metric != Metric::Total {
        let _ = write!(line, " ({} total)", agent.total);
    }
    if let Some(team) = &agent.team_lead_group {
        let _ = write!(line, ", team {team}");
    }
    if let Some(date) = agent.latest_date {
        let _ = write!(line, ", last active {date}");
    }
    if let Some(avatar) = &agent.avatar {
        let _ = write!(line, " [avatar: {avatar}]");
    }
    line
}

pub fn format_leader_line(leader: &ChannelLeader) -> String {
    format!(
        "{}: {} with {}",
        leader.channel.label(),
        leader.agent_name,
        leader.value
    )
}

/// Top and bottom performers, as the admin leaderboard shows them.
pub fn render_board(snapshot: &Snapshot) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} leaderboard by {} for {} (since {}, scope {})",
        snapshot.window.label(),
        snapshot.metric.label(),
        snapshot.team_label(),
        snapshot.since,
        snapshot.scope
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "Top performers:");
    if snapshot.standings.top.is_empty() {
        let _ = writeln!(output, "  No activity recorded for this window.");
    }
    for agent in &snapshot.standings.top {
        let _ = writeln!(output, "  {}", format_agent_line(agent, snapshot.metric));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "Needs attention:");
    if snapshot.standings.bottom.is_empty() {
        let _ = writeln!(output, "  No activity recorded for this window.");
    }
    for agent in &snapshot.standings.bottom {
        let _ = writeln!(output, "  {}", format_agent_line(agent, snapshot.metric));
    }
    output
}

/// Ranked agent cards plus the per-channel leaders.
pub fn render_dashboard(snapshot: &Snapshot, size: usize) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Momentum dashboard - {} ({} agents, {} issues)",
        snapshot.window.label(),
        snapshot.summary.total_agents,
        snapshot.summary.total_issues
    );

    if snapshot.agents.is_empty() {
        let _ = writeln!(output, "No stats recorded since {}.", snapshot.since);
        return output;
    }

    for agent in aggregate::top_n(&snapshot.agents, size) {
        let _ = writeln!(output, "  {}", format_agent_line(&agent, snapshot.metric));
    }

    if !snapshot.leaders.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Top issue generators:");
        for leader in &snapshot.leaders {
            let _ = writeln!(output, "  {}", format_leader_line(leader));
        }
    }
    output
}

/// Per-agent channel breakdown with team-level totals.
pub fn render_metrics(snapshot: &Snapshot, scope: &ChannelScope) -> String {
    let mut output = String::new();
    let summary = &snapshot.summary;
    let _ = writeln!(
        output,
        "{} metrics for {}: {} agents, {} issues, {:.1} per agent, top team {}",
        snapshot.window.label(),
        snapshot.team_label(),
        summary.total_agents,
        summary.total_issues,
        summary.avg_issues_per_agent,
        summary.top_team.as_deref().unwrap_or("n/a")
    );

    let mut header = String::from("Agent | Team");
    for channel in &scope.channels {
        let _ = write!(header, " | {}", channel.label());
    }
    header.push_str(" | Total | Avg/day");
    let _ = writeln!(output, "{header}");

    for agent in &snapshot.agents {
        let mut row = format!(
            "{} | {}",
            agent.agent_name,
            agent.team_lead_group.as_deref().unwrap_or("-")
        );
        for channel in &scope.channels {
            let _ = write!(row, " | {}", agent.counts.get(*channel));
        }
        let _ = write!(row, " | {} | {:.1}", agent.total, agent.avg_per_day);
        let _ = writeln!(output, "{row}");
    }
    output
}

pub fn render_profile(
    profile: &AgentProfile,
    history: &[DailyRecord],
    summary: &HistorySummary,
    scope: &ChannelScope,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} ({})", profile.agent_name, profile.agent_id);
    let _ = writeln!(output, "  role: {}", profile.role);
    if let Some(email) = &profile.email {
        let _ = writeln!(output, "  email: {email}");
    }
    if let Some(team) = &profile.team_lead_name {
        let _ = writeln!(output, "  team lead: {team}");
    }
    for (label, value) in [
        ("department", &profile.department),
        ("post", &profile.post),
        ("profile", &profile.profile),
        ("avatar", &profile.avatar),
    ] {
        if let Some(value) = value {
            let _ = writeln!(output, "  {label}: {value}");
        }
    }

    let _ = writeln!(
        output,
        "  last {} days: {} issues",
        summary.days, summary.total_issues
    );
    for record in history {
        let _ = writeln!(
            output,
            "  {} - {} issues",
            record
                .date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "undated".to_string()),
            aggregate::record_total(record, scope)
        );
    }
    output
}

pub fn build_report(snapshot: &Snapshot) -> String {
    let mut output = String::new();
    let summary = &snapshot.summary;

    let _ = writeln!(output, "# Agent Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} window, stats since {}, ranked by {})",
        snapshot.team_label(),
        snapshot.window,
        snapshot.since,
        snapshot.metric.label()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Snapshot");
    let _ = writeln!(output, "- Agents: {}", summary.total_agents);
    let _ = writeln!(output, "- Total issues: {}", summary.total_issues);
    let _ = writeln!(output, "- Average per agent: {:.1}", summary.avg_issues_per_agent);
    if let Some(team) = &summary.top_team {
        let _ = writeln!(output, "- Top team: {team}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");
    if snapshot.standings.top.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
    } else {
        for agent in &snapshot.standings.top {
            let _ = writeln!(output, "- {}", format_agent_line(agent, snapshot.metric));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");
    if snapshot.standings.bottom.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
    } else {
        for agent in &snapshot.standings.bottom {
            let _ = writeln!(output, "- {}", format_agent_line(agent, snapshot.metric));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Channel Leaders");
    if snapshot.leaders.is_empty() {
        let _ = writeln!(output, "No channel activity for this window.");
    } else {
        for leader in &snapshot.leaders {
            let _ = writeln!(output, "- {}", format_leader_line(leader));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");
    if snapshot.recent.is_empty() {
        let _ = writeln!(output, "No stats recorded for this window.");
    } else {
        for record in &snapshot.recent {
            let _ = writeln!(
                output,
                "- {} on {}: {} issues",
                record.agent_name,
                record
                    .date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "unknown date".to_string()),
                record.total
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GroupBy};
    use crate::models::{Channel, ChannelCounts};

    fn record(name: &str, team: &str, day: u32, calls: u64, chat: u64) -> DailyRecord {
        let mut counts = ChannelCounts::default();
        counts.set(Channel::Calls, calls);
        counts.set(Channel::LiveChat, chat);
        DailyRecord {
            agent_name: name.to_string(),
            team_lead_group: Some(team.to_string()),
            date: NaiveDate::from_ymd_opt(2024, 3, day),
            counts,
            ..DailyRecord::default()
        }
    }

    fn snapshot(records: Vec<DailyRecord>) -> Snapshot {
        let config = Config::default();
        let scope = config.scope(None).unwrap();
        let leaders = config.scope(Some("channel_leaders")).unwrap();
        let ranking = Ranking::new(&scope, GroupBy::AgentName);
        Snapshot::build(
            records,
            TimeWindow::Weekly,
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            None,
            &ranking,
            &leaders,
            5,
            5,
        )
    }

    #[test]
    fn report_lists_sections_in_order() {
        let report = build_report(&snapshot(vec![
            record("Avery Lee", "Dana Brooks", 14, 8, 2),
            record("Jules Moreno", "Marcus Lee", 15, 3, 0),
        ]));

        let sections = [
            "## Team Snapshot",
            "## Top Performers",
            "## Needs Attention",
            "## Channel Leaders",
            "## Recent Activity",
        ];
        let positions: Vec<usize> = sections
            .iter()
            .map(|section| report.find(section).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(report.contains("- Top team: Dana Brooks"));
        assert!(report.contains("[1st] Avery Lee - 10 Total Issues"));
        assert!(report.contains("- Calls: Avery Lee with 8"));
        assert!(report.contains("- Jules Moreno on 2024-03-15: 3 issues"));
    }

    #[test]
    fn empty_window_reports_no_activity() {
        let snapshot = snapshot(Vec::new());
        let report = build_report(&snapshot);
        assert!(report.contains("No activity recorded for this window."));
        assert!(report.contains("No channel activity for this window."));

        let dashboard = render_dashboard(&snapshot, 10);
        assert!(dashboard.contains("No stats recorded since 2024-03-08."));
    }

    #[test]
    fn agent_line_shows_total_for_channel_metric() {
        let snapshot = snapshot(vec![record("Avery Lee", "Dana Brooks", 14, 8, 2)]);
        let mut agent = snapshot.agents[0].clone();
        agent.value = 2;
        agent.avatar = Some("avatars/avery.png".to_string());

        let line = format_agent_line(&agent, Metric::Channel(Channel::LiveChat));
        assert_eq!(
            line,
            "[1st] Avery Lee - 2 Live Chat (10 total), team Dana Brooks, last active 2024-03-14 [avatar: avatars/avery.png]"
        );
    }

    #[test]
    fn metrics_table_has_one_row_per_agent() {
        let snapshot = snapshot(vec![
            record("Avery Lee", "Dana Brooks", 14, 7, 0),
            record("Avery Lee", "Dana Brooks", 15, 7, 0),
            record("Kiara Patel", "Marcus Lee", 15, 1, 1),
        ]);
        let scope = Config::default().scope(None).unwrap();
        let table = render_metrics(&snapshot, &scope);

        assert!(table.contains("Agent | Team | Calls | Live Chat"));
        assert!(table.contains("Avery Lee | Dana Brooks | 14 | 0"));
        assert!(table.contains("| 14 | 2.0"));
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn metrics_json_carries_agent_rows() {
        let snapshot = snapshot(vec![
            record("Avery Lee", "Dana Brooks", 14, 7, 0),
            record("Kiara Patel", "Marcus Lee", 15, 1, 1),
        ]);
        let json = serde_json::to_string(&snapshot.metrics_view()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let agents = value["agents"].as_array().unwrap();
        let rows: Vec<(&str, u64)> = agents
            .iter()
            .map(|agent| {
                (
                    agent["agent_name"].as_str().unwrap(),
                    agent["total"].as_u64().unwrap(),
                )
            })
            .collect();
        assert_eq!(rows, vec![("Avery Lee", 7), ("Kiara Patel", 2)]);
        assert!(agents[0]["counts"].is_object());
        assert_eq!(value["summary"]["total_agents"], 2);
        assert_eq!(value["summary"]["top_team"], "Dana Brooks");
    }
}
