use crate::error::ExecutorError;
use crate::portfolio::{TradeInstruction, TradeSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Receipt for an instruction that was filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// The trade execution collaborator.
///
/// Receives an instruction that the ledger has already clipped and reports the
/// price it was filled at. It never touches the portfolio; the caller feeds the
/// fill back into `PortfolioLedger::apply`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        instruction: &TradeInstruction,
        market_price: Decimal,
    ) -> Result<Fill, ExecutorError>;

    /// Identifier stored in the competition config, e.g. `paper`.
    fn venue(&self) -> &str;
}

/// Fills every order in full at the quoted market price, with no fees or slippage.
#[derive(Debug, Default, Clone)]
pub struct PaperExecutor;

impl PaperExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn execute(
        &self,
        instruction: &TradeInstruction,
        market_price: Decimal,
    ) -> Result<Fill, ExecutorError> {
        if market_price <= Decimal::ZERO {
            return Err(ExecutorError::InvalidPrice {
                symbol: instruction.symbol.clone(),
                price: market_price.to_string(),
            });
        }
        if instruction.quantity <= Decimal::ZERO {
            return Err(ExecutorError::Rejected(format!(
                "quantity {} is not tradable",
                instruction.quantity
            )));
        }

        tracing::debug!(
            symbol = %instruction.symbol,
            side = ?instruction.side,
            quantity = %instruction.quantity,
            price = %market_price,
            "Paper fill"
        );

        Ok(Fill {
            symbol: instruction.symbol.clone(),
            side: instruction.side,
            quantity: instruction.quantity,
            price: market_price,
            timestamp: Utc::now(),
        })
    }

    fn venue(&self) -> &str {
        "paper"
    }
}
