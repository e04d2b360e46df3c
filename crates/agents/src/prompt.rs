use core_types::Portfolio;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Everything an agent is shown about the current cycle.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub competition_name: &'a str,
    pub cycle_number: u64,
    pub max_cycles: Option<u64>,
    pub prices: &'a BTreeMap<String, Decimal>,
    pub portfolio: &'a Portfolio,
    pub portfolio_value: Decimal,
}

/// Instructions shared by every agent of a competition.
pub fn system_prompt(symbols: &[String]) -> String {
    format!(
        "You are an autonomous trader competing against other AI models in a paper-trading \
competition. Each cycle you see current prices and your own portfolio, and you make exactly one \
decision. Positions are long only: you can BUY with available cash and SELL what you hold. \
Orders larger than your cash or holdings are reduced.\n\n\
Tradable symbols: {}\n\n\
Respond with a single JSON object and nothing else:\n\
{{\"action\": \"BUY\" | \"SELL\" | \"HOLD\" | \"WAIT\", \"symbol\": \"<symbol, required for BUY/SELL>\", \
\"quantity\": <positive number, required for BUY/SELL>, \"confidence\": <number between 0 and 1>, \
\"reasoning\": \"<one or two sentences>\"}}",
        symbols.join(", ")
    )
}

/// Renders the per-cycle user message.
pub fn render_market_context(ctx: &PromptContext<'_>) -> String {
    let mut out = String::new();
    let cycle = match ctx.max_cycles {
        Some(max) => format!("{} of {}", ctx.cycle_number, max),
        None => ctx.cycle_number.to_string(),
    };
    let _ = writeln!(out, "Competition: {}", ctx.competition_name);
    let _ = writeln!(out, "Cycle: {}", cycle);
    let _ = writeln!(out);
    let _ = writeln!(out, "Current prices:");
    for (symbol, price) in ctx.prices {
        let _ = writeln!(out, "- {}: {}", symbol, price.normalize());
    }

    let portfolio = ctx.portfolio;
    let _ = writeln!(out);
    let _ = writeln!(out, "Your portfolio:");
    let _ = writeln!(out, "- Cash: {}", portfolio.cash.round_dp(2));
    let _ = writeln!(out, "- Total value: {}", ctx.portfolio_value.round_dp(2));
    let _ = writeln!(out, "- Starting capital: {}", portfolio.initial_capital.round_dp(2));
    let _ = writeln!(out, "- Realized PnL: {}", portfolio.realized_pnl.round_dp(2));
    let _ = writeln!(out, "- Trades so far: {}", portfolio.trades_count);
    if portfolio.positions.is_empty() {
        let _ = writeln!(out, "- Positions: none");
    } else {
        let _ = writeln!(out, "- Positions:");
        for position in portfolio.positions.values() {
            let _ = writeln!(
                out,
                "  - {}: {} @ avg {}",
                position.symbol,
                position.quantity.normalize(),
                position.avg_price.round_dp(2)
            );
        }
    }
    let _ = writeln!(out);
    out.push_str("Decide your action for this cycle.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Position;
    use rust_decimal_macros::dec;

    #[test]
    fn test_system_prompt_lists_symbols() {
        let prompt = system_prompt(&["BTC/USD".to_string(), "ETH/USD".to_string()]);
        assert!(prompt.contains("BTC/USD, ETH/USD"));
        assert!(prompt.contains("\"action\""));
    }

    #[test]
    fn test_context_includes_prices_and_positions() {
        let prices = BTreeMap::from([("BTC/USD".to_string(), dec!(65000.50))]);
        let mut portfolio = Portfolio::new("alpha", dec!(10000));
        portfolio.cash = dec!(3499.75);
        portfolio.positions.insert(
            "BTC/USD".to_string(),
            Position { symbol: "BTC/USD".to_string(), quantity: dec!(0.1), avg_price: dec!(65002.5) },
        );

        let text = render_market_context(&PromptContext {
            competition_name: "Weekly",
            cycle_number: 3,
            max_cycles: Some(10),
            prices: &prices,
            portfolio: &portfolio,
            portfolio_value: dec!(9999.80),
        });

        assert!(text.contains("Cycle: 3 of 10"));
        assert!(text.contains("- BTC/USD: 65000.5"));
        assert!(text.contains("- Cash: 3499.75"));
        assert!(text.contains("BTC/USD: 0.1 @ avg 65002.5"));
    }
}
