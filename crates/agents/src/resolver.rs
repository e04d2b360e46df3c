use crate::error::AgentError;
use core_types::Action;
use rust_decimal::Decimal;
use serde::Deserialize;

/// A validated trading decision. Trades always carry a known symbol and a
/// positive quantity; HOLD and WAIT carry nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Buy { symbol: String, quantity: Decimal },
    Sell { symbol: String, quantity: Decimal },
    Hold,
    Wait,
}

impl TradeAction {
    pub fn kind(&self) -> Action {
        match self {
            TradeAction::Buy { .. } => Action::Buy,
            TradeAction::Sell { .. } => Action::Sell,
            TradeAction::Hold => Action::Hold,
            TradeAction::Wait => Action::Wait,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            TradeAction::Buy { symbol, .. } | TradeAction::Sell { symbol, .. } => Some(symbol),
            TradeAction::Hold | TradeAction::Wait => None,
        }
    }

    pub fn quantity(&self) -> Decimal {
        match self {
            TradeAction::Buy { quantity, .. } | TradeAction::Sell { quantity, .. } => *quantity,
            TradeAction::Hold | TradeAction::Wait => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDecision {
    pub action: TradeAction,
    pub confidence: f64,
    pub reasoning: String,
}

impl AgentDecision {
    /// The decision recorded when an agent produced nothing usable.
    pub fn wait(reasoning: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Wait,
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Shape models are asked to answer with. Everything but `action` is optional
/// at this stage and checked afterwards.
#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    quantity: Option<Decimal>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "reason")]
    reasoning: Option<String>,
}

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The single parse boundary between free-form model output and a typed decision.
#[derive(Debug, Clone)]
pub struct DecisionResolver {
    symbols: Vec<String>,
}

impl DecisionResolver {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    pub fn resolve(&self, text: &str) -> Result<AgentDecision, AgentError> {
        let json = extract_json(text)
            .ok_or_else(|| AgentError::Parse("no JSON object in response".to_string()))?;
        let raw: RawDecision =
            serde_json::from_str(json).map_err(|e| AgentError::Parse(e.to_string()))?;

        let confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AgentError::Validation(format!(
                "confidence {} is outside [0, 1]",
                confidence
            )));
        }
        let reasoning = raw.reasoning.unwrap_or_default().trim().to_string();

        let action = match raw.action.trim().to_ascii_uppercase().as_str() {
            "BUY" => {
                let (symbol, quantity) = self.trade_fields(raw.symbol, raw.quantity)?;
                TradeAction::Buy { symbol, quantity }
            }
            "SELL" => {
                let (symbol, quantity) = self.trade_fields(raw.symbol, raw.quantity)?;
                TradeAction::Sell { symbol, quantity }
            }
            "HOLD" => TradeAction::Hold,
            "WAIT" => TradeAction::Wait,
            other => return Err(AgentError::Parse(format!("unknown action '{}'", other))),
        };

        Ok(AgentDecision { action, confidence, reasoning })
    }

    fn trade_fields(
        &self,
        symbol: Option<String>,
        quantity: Option<Decimal>,
    ) -> Result<(String, Decimal), AgentError> {
        let requested =
            symbol.ok_or_else(|| AgentError::Validation("trade without a symbol".to_string()))?;
        let symbol = self.canonical_symbol(&requested).ok_or_else(|| {
            AgentError::Validation(format!("symbol '{}' is not traded in this competition", requested))
        })?;
        let quantity = quantity
            .ok_or_else(|| AgentError::Validation("trade without a quantity".to_string()))?;
        if quantity <= Decimal::ZERO {
            return Err(AgentError::Validation(format!(
                "quantity {} must be greater than zero",
                quantity
            )));
        }
        Ok((symbol, quantity))
    }

    /// Matches `btc/usd` or a bare base asset like `BTC` to the configured symbol.
    fn canonical_symbol(&self, requested: &str) -> Option<String> {
        let requested = requested.trim();
        if let Some(exact) = self.symbols.iter().find(|s| s.eq_ignore_ascii_case(requested)) {
            return Some(exact.clone());
        }
        let mut by_base = self.symbols.iter().filter(|s| {
            s.split_once('/')
                .is_some_and(|(base, _)| base.eq_ignore_ascii_case(requested))
        });
        match (by_base.next(), by_base.next()) {
            (Some(only), None) => Some(only.clone()),
            _ => None,
        }
    }
}

/// Finds the outermost `{...}` span, which also strips markdown fences and prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
