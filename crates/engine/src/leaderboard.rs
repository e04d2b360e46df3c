use core_types::{CompetitionConfig, LeaderboardEntry, PerformanceSnapshot};
use rust_decimal::Decimal;

/// Ranks agents by their latest portfolio value, highest first.
///
/// Ties keep agent registration order. An agent without a snapshot yet is
/// ranked at its initial capital with a zero return.
pub fn compute_leaderboard(
    config: &CompetitionConfig,
    latest: &[PerformanceSnapshot],
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = config
        .agents
        .iter()
        .map(|agent| {
            match latest.iter().find(|s| s.agent_name == agent.name) {
                Some(snapshot) => LeaderboardEntry {
                    agent_name: agent.name.clone(),
                    rank: 0,
                    portfolio_value: snapshot.portfolio_value,
                    return_pct: snapshot.return_pct,
                },
                None => LeaderboardEntry {
                    agent_name: agent.name.clone(),
                    rank: 0,
                    portfolio_value: config.capital_for(agent),
                    return_pct: Decimal::ZERO,
                },
            }
        })
        .collect();

    // Stable sort: equal values stay in registration order.
    entries.sort_by(|a, b| b.portfolio_value.cmp(&a.portfolio_value));
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = u32::try_from(index + 1).unwrap_or(u32::MAX);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AgentSpec, ProviderKind};
    use rust_decimal_macros::dec;

    fn config() -> CompetitionConfig {
        let mut rich = AgentSpec::new("carol", ProviderKind::Scripted, "s");
        rich.initial_capital = Some(dec!(20000));
        CompetitionConfig {
            id: "cmp".to_string(),
            name: "Ranks".to_string(),
            agents: vec![
                AgentSpec::new("alice", ProviderKind::Scripted, "s"),
                AgentSpec::new("bob", ProviderKind::Scripted, "s"),
                rich,
            ],
            symbols: vec!["BTC/USD".to_string()],
            initial_capital: dec!(10000),
            cycle_interval_secs: 60,
            max_cycles: None,
            exchange: "paper".to_string(),
        }
    }

    fn snapshot(agent: &str, value: Decimal) -> PerformanceSnapshot {
        PerformanceSnapshot {
            competition_id: "cmp".to_string(),
            agent_name: agent.to_string(),
            cycle_number: 1,
            portfolio_value: value,
            cash: value,
            pnl: Decimal::ZERO,
            return_pct: Decimal::ZERO,
            positions_count: 0,
            trades_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_before_first_cycle_uses_initial_capital() {
        let board = compute_leaderboard(&config(), &[]);
        let names: Vec<_> = board.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
        assert_eq!(board[0].portfolio_value, dec!(20000));
        assert_eq!(board[2].rank, 3);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let latest = vec![
            snapshot("carol", dec!(9000)),
            snapshot("bob", dec!(10500)),
            snapshot("alice", dec!(10500)),
        ];
        let board = compute_leaderboard(&config(), &latest);
        let names: Vec<_> = board.iter().map(|e| e.agent_name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(board.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
