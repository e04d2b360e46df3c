use crate::error::EngineError;
use crate::market::MarketContext;
use agents::{
    Agent, AgentOutcome, FailureClass, PromptContext, TradeAction, render_market_context,
    system_prompt,
};
use chrono::{DateTime, Utc};
use core_types::{Competition, Decision, PerformanceSnapshot, Portfolio};
use executor::{Executor, ExecutorError, PortfolioLedger, TradeInstruction};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// An agent as seen by the executor: either callable, or known to be unusable
/// for this cycle (which yields a WAIT).
#[derive(Debug, Clone)]
pub enum AgentSlot {
    Ready(Agent),
    Unavailable { name: String, reason: String },
}

impl AgentSlot {
    pub fn name(&self) -> &str {
        match self {
            AgentSlot::Ready(agent) => agent.name(),
            AgentSlot::Unavailable { name, .. } => name,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AgentSlot::Ready(_))
    }
}

/// Everything one cycle produced, in agent registration order.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub cycle_number: u64,
    pub decisions: Vec<Decision>,
    pub snapshots: Vec<PerformanceSnapshot>,
    /// Next-state portfolios. Not yet committed anywhere.
    pub portfolios: Vec<Portfolio>,
    pub timestamp: DateTime<Utc>,
}

/// Runs one cycle: asks every agent concurrently, then settles each decision
/// against its ledger.
pub struct CycleExecutor {
    ledger: PortfolioLedger,
    executor: Arc<dyn Executor>,
}

/// How a single decision was settled against the ledger.
struct Settlement {
    executed: bool,
    quantity: Decimal,
    price: Option<Decimal>,
    trade_pnl: Decimal,
    portfolio: Portfolio,
    note: Option<String>,
}

impl Settlement {
    fn unchanged(portfolio: &Portfolio, quantity: Decimal, price: Option<Decimal>, note: Option<String>) -> Self {
        Self {
            executed: false,
            quantity,
            price,
            trade_pnl: Decimal::ZERO,
            portfolio: portfolio.clone(),
            note,
        }
    }
}

impl CycleExecutor {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { ledger: PortfolioLedger::new(), executor }
    }

    /// `agents` and `portfolios` are both in registration order. Inputs are never
    /// mutated; the caller commits `CycleResult::portfolios` once persisted.
    ///
    /// Only ledger invariant violations fail the cycle. Agent problems of any
    /// kind become WAIT decisions.
    pub async fn run_cycle(
        &self,
        competition: &Competition,
        agents: &[AgentSlot],
        portfolios: &[Portfolio],
        market: &MarketContext,
    ) -> Result<CycleResult, EngineError> {
        if agents.len() != portfolios.len() {
            return Err(EngineError::Validation(format!(
                "{} agents but {} portfolios",
                agents.len(),
                portfolios.len()
            )));
        }

        let config = &competition.config;
        let cycle_number = competition.cycle_count + 1;
        let prices = market.price_map();
        let system_prompt = system_prompt(&config.symbols);

        let mut values_before = Vec::with_capacity(portfolios.len());
        let mut contexts = Vec::with_capacity(portfolios.len());
        for portfolio in portfolios {
            let value = self.ledger.total_value(portfolio, &prices)?;
            contexts.push(render_market_context(&PromptContext {
                competition_name: &config.name,
                cycle_number,
                max_cycles: config.max_cycles,
                prices: market.prices(),
                portfolio,
                portfolio_value: value,
            }));
            values_before.push(value);
        }

        tracing::info!(
            competition_id = %competition.id(),
            cycle = cycle_number,
            agents = agents.len(),
            "Requesting decisions"
        );

        let calls = agents.iter().zip(&contexts).map(|(slot, context)| {
            let system_prompt = &system_prompt;
            async move {
                match slot {
                    AgentSlot::Ready(agent) => agent.decide(system_prompt, context).await,
                    AgentSlot::Unavailable { reason, .. } => AgentOutcome::failed(
                        FailureClass::AgentUnavailable,
                        reason,
                        Duration::ZERO,
                    ),
                }
            }
        });
        let outcomes = join_all(calls).await;

        let timestamp = Utc::now();
        let mut decisions = Vec::with_capacity(agents.len());
        let mut snapshots = Vec::with_capacity(agents.len());
        let mut next_portfolios = Vec::with_capacity(agents.len());

        for (index, outcome) in outcomes.into_iter().enumerate() {
            let portfolio = &portfolios[index];
            let agent_name = agents[index].name();

            if let Some(class) = outcome.failure {
                tracing::warn!(
                    competition_id = %competition.id(),
                    cycle = cycle_number,
                    agent = agent_name,
                    failure = class.as_str(),
                    "Agent degraded to WAIT"
                );
            } else if let Some(usage) = outcome.token_usage {
                tracing::debug!(
                    agent = agent_name,
                    latency_ms = outcome.latency.as_millis() as u64,
                    total_tokens = usage.total_tokens,
                    "Decision received"
                );
            }

            let settlement = self.settle(portfolio, &outcome.decision.action, market).await?;
            let value_after = self.ledger.total_value(&settlement.portfolio, &prices)?;

            let reasoning = match &settlement.note {
                Some(note) if outcome.decision.reasoning.is_empty() => note.clone(),
                Some(note) => format!("{} ({})", outcome.decision.reasoning, note),
                None => outcome.decision.reasoning.clone(),
            };

            decisions.push(Decision {
                competition_id: config.id.clone(),
                agent_name: agent_name.to_string(),
                cycle_number,
                action: outcome.decision.action.kind(),
                symbol: outcome.decision.action.symbol().map(str::to_string),
                quantity: settlement.quantity,
                confidence: outcome.decision.confidence,
                reasoning,
                trade_executed: settlement.executed,
                price_at_decision: settlement.price,
                trade_pnl: settlement.trade_pnl,
                portfolio_value_before: values_before[index],
                portfolio_value_after: value_after,
                timestamp,
            });
            snapshots.push(snapshot(
                &config.id,
                cycle_number,
                &settlement.portfolio,
                value_after,
                timestamp,
            ));
            next_portfolios.push(settlement.portfolio);
        }

        Ok(CycleResult {
            cycle_number,
            decisions,
            snapshots,
            portfolios: next_portfolios,
            timestamp,
        })
    }

    async fn settle(
        &self,
        portfolio: &Portfolio,
        action: &TradeAction,
        market: &MarketContext,
    ) -> Result<Settlement, EngineError> {
        let instruction = match action {
            TradeAction::Buy { symbol, quantity } => TradeInstruction::buy(symbol.clone(), *quantity),
            TradeAction::Sell { symbol, quantity } => TradeInstruction::sell(symbol.clone(), *quantity),
            TradeAction::Hold | TradeAction::Wait => {
                return Ok(Settlement::unchanged(portfolio, Decimal::ZERO, None, None));
            }
        };

        let price = market.price(&instruction.symbol).ok_or_else(|| EngineError::MarketData {
            symbol: instruction.symbol.clone(),
            source: api_client::ApiError::PriceUnavailable(instruction.symbol.clone()),
        })?;

        let (quantity, clip_note) = match self.ledger.clip(portfolio, &instruction, price) {
            Ok(clipped) => clipped,
            Err(e) => {
                return Ok(Settlement::unchanged(
                    portfolio,
                    instruction.quantity,
                    Some(price),
                    Some(e.to_string()),
                ));
            }
        };
        if quantity.is_zero() {
            return Ok(Settlement::unchanged(portfolio, instruction.quantity, Some(price), clip_note));
        }

        let fill = match self.executor.execute(&instruction.with_quantity(quantity), price).await {
            Ok(fill) => fill,
            Err(e) => {
                tracing::warn!(
                    agent = %portfolio.agent_name,
                    venue = self.executor.venue(),
                    error = %e,
                    "Execution rejected"
                );
                return Ok(Settlement::unchanged(
                    portfolio,
                    instruction.quantity,
                    Some(price),
                    Some(format!("execution rejected: {}", e)),
                ));
            }
        };

        match self
            .ledger
            .apply(portfolio, &instruction.with_quantity(fill.quantity), fill.price)
        {
            Ok(applied) => Ok(Settlement {
                executed: applied.executed,
                quantity: if applied.executed {
                    applied.filled_quantity
                } else {
                    instruction.quantity
                },
                price: Some(fill.price),
                trade_pnl: applied.realized_pnl,
                note: applied.note.or(clip_note),
                portfolio: applied.portfolio,
            }),
            Err(e @ ExecutorError::InvariantViolation { .. }) => Err(EngineError::Ledger(e)),
            Err(e) => Ok(Settlement::unchanged(
                portfolio,
                instruction.quantity,
                Some(price),
                Some(e.to_string()),
            )),
        }
    }
}

fn snapshot(
    competition_id: &str,
    cycle_number: u64,
    portfolio: &Portfolio,
    portfolio_value: Decimal,
    timestamp: DateTime<Utc>,
) -> PerformanceSnapshot {
    let pnl = portfolio_value - portfolio.initial_capital;
    let return_pct = pnl
        .checked_div(portfolio.initial_capital)
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO);
    PerformanceSnapshot {
        competition_id: competition_id.to_string(),
        agent_name: portfolio.agent_name.clone(),
        cycle_number,
        portfolio_value,
        cash: portfolio.cash,
        pnl,
        return_pct,
        positions_count: u32::try_from(portfolio.open_positions()).unwrap_or(u32::MAX),
        trades_count: portfolio.trades_count,
        timestamp,
    }
}
