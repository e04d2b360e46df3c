use crate::error::ExecutorError;
use core_types::{Portfolio, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A BUY or SELL an agent asked for. HOLD and WAIT never reach the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
}

impl TradeInstruction {
    pub fn buy(symbol: impl Into<String>, quantity: Decimal) -> Self {
        Self { symbol: symbol.into(), side: TradeSide::Buy, quantity }
    }

    pub fn sell(symbol: impl Into<String>, quantity: Decimal) -> Self {
        Self { symbol: symbol.into(), side: TradeSide::Sell, quantity }
    }

    pub fn with_quantity(&self, quantity: Decimal) -> Self {
        Self { quantity, ..self.clone() }
    }
}

/// The outcome of applying one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    pub executed: bool,
    /// Quantity actually traded after clipping. Zero when not executed.
    pub filled_quantity: Decimal,
    /// Realized PnL of this trade alone; zero for buys.
    pub realized_pnl: Decimal,
    /// The portfolio after the trade. Equal to the input when not executed.
    pub portfolio: Portfolio,
    /// Why the trade was clipped or skipped, for the decision's reasoning.
    pub note: Option<String>,
}

impl ApplyResult {
    pub fn new_cash(&self) -> Decimal {
        self.portfolio.cash
    }

    pub fn new_positions(&self) -> &BTreeMap<String, Position> {
        &self.portfolio.positions
    }
}

/// Deterministic, side-effect-free portfolio bookkeeping.
///
/// Positions are long-only. Cash never goes negative: a BUY larger than the
/// available cash is clipped to `floor(cash / price)` whole units, and a SELL
/// larger than the holding is clipped to the holding.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortfolioLedger;

impl PortfolioLedger {
    pub fn new() -> Self {
        Self
    }

    /// Returns the quantity that can actually be traded and, when it differs from
    /// the request, a note explaining why.
    pub fn clip(
        &self,
        portfolio: &Portfolio,
        instruction: &TradeInstruction,
        market_price: Decimal,
    ) -> Result<(Decimal, Option<String>), ExecutorError> {
        Self::validate(instruction, market_price)?;

        match instruction.side {
            TradeSide::Buy => {
                // An overflowing cost is unaffordable and falls through to clipping.
                if let Some(cost) = instruction.quantity.checked_mul(market_price) {
                    if cost <= portfolio.cash {
                        return Ok((instruction.quantity, None));
                    }
                }
                let affordable = portfolio
                    .cash
                    .checked_div(market_price)
                    .map(|q| q.floor())
                    .unwrap_or(Decimal::ZERO)
                    .max(Decimal::ZERO);
                if affordable.is_zero() {
                    Ok((Decimal::ZERO, Some("insufficient funds".to_string())))
                } else {
                    Ok((
                        affordable,
                        Some(format!(
                            "quantity clipped from {} to {} by available cash",
                            instruction.quantity.normalize(),
                            affordable.normalize()
                        )),
                    ))
                }
            }
            TradeSide::Sell => {
                let held = portfolio.quantity_of(&instruction.symbol);
                if held <= Decimal::ZERO {
                    Ok((
                        Decimal::ZERO,
                        Some(format!("no position in {}", instruction.symbol)),
                    ))
                } else if instruction.quantity > held {
                    Ok((
                        held,
                        Some(format!(
                            "quantity clipped from {} to held {}",
                            instruction.quantity.normalize(),
                            held.normalize()
                        )),
                    ))
                } else {
                    Ok((instruction.quantity, None))
                }
            }
        }
    }

    /// Applies a trade at `market_price` and returns the resulting state.
    pub fn apply(
        &self,
        portfolio: &Portfolio,
        instruction: &TradeInstruction,
        market_price: Decimal,
    ) -> Result<ApplyResult, ExecutorError> {
        let (quantity, note) = self.clip(portfolio, instruction, market_price)?;

        if quantity.is_zero() {
            return Ok(ApplyResult {
                executed: false,
                filled_quantity: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
                portfolio: portfolio.clone(),
                note,
            });
        }

        let mut next = portfolio.clone();
        let symbol = &instruction.symbol;
        let mut realized_pnl = Decimal::ZERO;

        match instruction.side {
            TradeSide::Buy => {
                let cost = checked(quantity.checked_mul(market_price), "trade cost")?;
                next.cash = checked(next.cash.checked_sub(cost), "cash")?;
                let position = next.positions.entry(symbol.clone()).or_insert_with(|| Position {
                    symbol: symbol.clone(),
                    quantity: Decimal::ZERO,
                    avg_price: Decimal::ZERO,
                });
                let total_quantity =
                    checked(position.quantity.checked_add(quantity), "position quantity")?;
                let held_cost =
                    checked(position.avg_price.checked_mul(position.quantity), "position cost")?;
                let total_cost = checked(held_cost.checked_add(cost), "position cost")?;
                position.avg_price =
                    checked(total_cost.checked_div(total_quantity), "average price")?;
                position.quantity = total_quantity;
            }
            TradeSide::Sell => {
                let emptied = match next.positions.get_mut(symbol) {
                    Some(position) => {
                        let margin =
                            checked(market_price.checked_sub(position.avg_price), "realized pnl")?;
                        realized_pnl = checked(margin.checked_mul(quantity), "realized pnl")?;
                        position.quantity -= quantity;
                        position.quantity.is_zero()
                    }
                    None => {
                        return Err(ExecutorError::InvariantViolation {
                            agent: portfolio.agent_name.clone(),
                            detail: format!("sold {} without a position", symbol),
                        });
                    }
                };
                if emptied {
                    next.positions.remove(symbol);
                }
                let proceeds = checked(quantity.checked_mul(market_price), "trade proceeds")?;
                next.cash = checked(next.cash.checked_add(proceeds), "cash")?;
                next.realized_pnl =
                    checked(next.realized_pnl.checked_add(realized_pnl), "realized pnl")?;
            }
        }
        next.trades_count += 1;

        Self::check_invariants(&next)?;

        tracing::debug!(
            agent = %next.agent_name,
            symbol = %symbol,
            side = ?instruction.side,
            quantity = %quantity,
            price = %market_price,
            cash = %next.cash,
            "Trade applied"
        );

        Ok(ApplyResult {
            executed: true,
            filled_quantity: quantity,
            realized_pnl,
            portfolio: next,
            note,
        })
    }

    /// `cash + Σ quantity × price`. Every held symbol must have a price.
    pub fn total_value(
        &self,
        portfolio: &Portfolio,
        prices: &HashMap<String, Decimal>,
    ) -> Result<Decimal, ExecutorError> {
        let mut positions_value = Decimal::ZERO;
        for (symbol, position) in &portfolio.positions {
            let price = prices
                .get(symbol)
                .ok_or_else(|| ExecutorError::MissingPrice(symbol.clone()))?;
            let value = checked(position.quantity.checked_mul(*price), "position value")?;
            positions_value = checked(positions_value.checked_add(value), "portfolio value")?;
        }
        checked(portfolio.cash.checked_add(positions_value), "portfolio value")
    }

    pub fn unrealized_pnl(
        &self,
        portfolio: &Portfolio,
        prices: &HashMap<String, Decimal>,
    ) -> Result<Decimal, ExecutorError> {
        let mut pnl = Decimal::ZERO;
        for (symbol, position) in &portfolio.positions {
            let price = prices
                .get(symbol)
                .ok_or_else(|| ExecutorError::MissingPrice(symbol.clone()))?;
            let margin = checked(price.checked_sub(position.avg_price), "unrealized pnl")?;
            let position_pnl = checked(margin.checked_mul(position.quantity), "unrealized pnl")?;
            pnl = checked(pnl.checked_add(position_pnl), "unrealized pnl")?;
        }
        Ok(pnl)
    }

    fn validate(instruction: &TradeInstruction, market_price: Decimal) -> Result<(), ExecutorError> {
        if market_price <= Decimal::ZERO {
            return Err(ExecutorError::InvalidPrice {
                symbol: instruction.symbol.clone(),
                price: market_price.to_string(),
            });
        }
        if instruction.quantity <= Decimal::ZERO {
            return Err(ExecutorError::InvalidQuantity(format!(
                "{} must be greater than zero",
                instruction.quantity
            )));
        }
        Ok(())
    }

    fn check_invariants(portfolio: &Portfolio) -> Result<(), ExecutorError> {
        if portfolio.cash < Decimal::ZERO {
            return Err(ExecutorError::InvariantViolation {
                agent: portfolio.agent_name.clone(),
                detail: format!("cash is negative ({})", portfolio.cash),
            });
        }
        if let Some(position) = portfolio.positions.values().find(|p| p.quantity < Decimal::ZERO) {
            return Err(ExecutorError::InvariantViolation {
                agent: portfolio.agent_name.clone(),
                detail: format!("negative quantity in {}", position.symbol),
            });
        }
        Ok(())
    }
}

/// Model-supplied quantities are unbounded, so every ledger product is checked.
fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal, ExecutorError> {
    value.ok_or_else(|| ExecutorError::InvalidQuantity(format!("{} is out of range", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn prices(btc: Decimal) -> HashMap<String, Decimal> {
        HashMap::from([("BTC/USD".to_string(), btc)])
    }

    #[test]
    fn test_buy_within_cash_executes_in_full() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));

        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(0.1)), dec!(50000))
            .unwrap();

        assert!(result.executed);
        assert_eq!(result.filled_quantity, dec!(0.1));
        assert_eq!(result.new_cash(), dec!(5000));
        assert_eq!(result.portfolio.quantity_of("BTC/USD"), dec!(0.1));
        assert_eq!(result.portfolio.trades_count, 1);
        assert!(result.note.is_none());
        // The input is untouched.
        assert_eq!(portfolio.cash, dec!(10000));
    }

    #[test]
    fn test_buy_at_twice_cash_is_clipped_to_whole_units() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));

        // 2x available cash: 200 units at 100.
        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("ETH/USD", dec!(200)), dec!(100))
            .unwrap();
        assert!(result.executed);
        assert_eq!(result.filled_quantity, dec!(100));
        assert_eq!(result.new_cash(), dec!(0));
        assert!(result.note.unwrap().contains("clipped"));

        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("ETH/USD", dec!(300)), dec!(70))
            .unwrap();
        assert_eq!(result.filled_quantity, dec!(142));
        assert!(result.new_cash() >= Decimal::ZERO);
    }

    #[test]
    fn test_buy_clipped_to_zero_is_insufficient_funds() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));

        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(0.4)), dec!(65000))
            .unwrap();

        assert!(!result.executed);
        assert_eq!(result.filled_quantity, Decimal::ZERO);
        assert_eq!(result.note.as_deref(), Some("insufficient funds"));
        assert_eq!(result.portfolio, portfolio);
    }

    #[test]
    fn test_sell_realizes_pnl_and_clips_to_holding() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));
        let bought = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(2)), dec!(1000))
            .unwrap()
            .portfolio;

        let sold = ledger
            .apply(&bought, &TradeInstruction::sell("BTC/USD", dec!(5)), dec!(1500))
            .unwrap();

        assert!(sold.executed);
        assert_eq!(sold.filled_quantity, dec!(2));
        assert_eq!(sold.realized_pnl, dec!(1000));
        assert_eq!(sold.portfolio.realized_pnl, dec!(1000));
        assert_eq!(sold.new_cash(), dec!(11000));
        assert!(sold.new_positions().is_empty());
        assert_eq!(sold.portfolio.trades_count, 2);
    }

    #[test]
    fn test_sell_without_position_is_not_executed() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));

        let result = ledger
            .apply(&portfolio, &TradeInstruction::sell("BTC/USD", dec!(1)), dec!(1000))
            .unwrap();

        assert!(!result.executed);
        assert_eq!(result.note.as_deref(), Some("no position in BTC/USD"));
    }

    #[test]
    fn test_average_price_is_weighted() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));
        let first = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(1)), dec!(1000))
            .unwrap()
            .portfolio;
        let second = ledger
            .apply(&first, &TradeInstruction::buy("BTC/USD", dec!(3)), dec!(2000))
            .unwrap()
            .portfolio;

        let position = &second.positions["BTC/USD"];
        assert_eq!(position.quantity, dec!(4));
        assert_eq!(position.avg_price, dec!(1750));
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));

        assert!(matches!(
            ledger.apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(0)), dec!(100)),
            Err(ExecutorError::InvalidQuantity(_))
        ));
        assert!(matches!(
            ledger.apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(1)), dec!(0)),
            Err(ExecutorError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_total_value_conserves_cash_plus_holdings() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));
        let after = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", dec!(0.1)), dec!(50000))
            .unwrap()
            .portfolio;

        assert_eq!(ledger.total_value(&after, &prices(dec!(50000))).unwrap(), dec!(10000));
        assert_eq!(ledger.total_value(&after, &prices(dec!(60000))).unwrap(), dec!(11000));
        assert_eq!(ledger.unrealized_pnl(&after, &prices(dec!(60000))).unwrap(), dec!(1000));
        assert!(matches!(
            ledger.total_value(&after, &HashMap::new()),
            Err(ExecutorError::MissingPrice(_))
        ));
    }

    #[test]
    fn test_unbounded_quantities_never_overflow() {
        let ledger = PortfolioLedger::new();
        let portfolio = Portfolio::new("alpha", dec!(10000));
        let huge = Decimal::from_str_exact("10000000000000000000000000000").unwrap();

        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", huge), dec!(50000))
            .unwrap();
        assert!(!result.executed);
        assert_eq!(result.note.as_deref(), Some("insufficient funds"));

        let result = ledger
            .apply(&portfolio, &TradeInstruction::buy("BTC/USD", huge), dec!(0.0001))
            .unwrap();
        assert!(result.executed);
        assert_eq!(result.filled_quantity, dec!(100000000));
        assert!(result.new_cash() >= Decimal::ZERO);

        let mut whale = Portfolio::new("whale", dec!(10000));
        whale.positions.insert(
            "BTC/USD".to_string(),
            Position { symbol: "BTC/USD".to_string(), quantity: huge, avg_price: dec!(1) },
        );
        assert!(matches!(
            ledger.total_value(&whale, &prices(dec!(50000))),
            Err(ExecutorError::InvalidQuantity(_))
        ));
        assert!(matches!(
            ledger.unrealized_pnl(&whale, &prices(dec!(50000))),
            Err(ExecutorError::InvalidQuantity(_))
        ));
    }
}
