use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an agent decided to do in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Wait,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
            Action::Wait => "WAIT",
        }
    }

    /// Returns true for the actions that touch the ledger.
    pub fn is_trade(&self) -> bool {
        matches!(self, Action::Buy | Action::Sell)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            "WAIT" => Ok(Action::Wait),
            _ => Err(CoreError::UnknownVariant { field: "action", value: s.to_string() }),
        }
    }
}

/// Lifecycle state of a competition.
///
/// ```text
/// CREATED -> RUNNING <-> PAUSED -> COMPLETED
///     \________\___________\_____-> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompetitionStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Created => "CREATED",
            CompetitionStatus::Running => "RUNNING",
            CompetitionStatus::Paused => "PAUSED",
            CompetitionStatus::Completed => "COMPLETED",
            CompetitionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CompetitionStatus::Completed | CompetitionStatus::Failed)
    }

    /// The transition table of the competition state machine.
    pub fn can_transition_to(&self, next: CompetitionStatus) -> bool {
        use CompetitionStatus::*;
        match (self, next) {
            (Created, Running) | (Paused, Running) => true,
            (Running, Paused) | (Running, Completed) | (Paused, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetitionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(CompetitionStatus::Created),
            "RUNNING" => Ok(CompetitionStatus::Running),
            "PAUSED" => Ok(CompetitionStatus::Paused),
            "COMPLETED" => Ok(CompetitionStatus::Completed),
            "FAILED" => Ok(CompetitionStatus::Failed),
            _ => Err(CoreError::UnknownVariant { field: "status", value: s.to_string() }),
        }
    }
}

/// The LLM vendor behind an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "grok")]
    Grok,
    #[serde(rename = "qwen")]
    Qwen,
    /// Any endpoint speaking the OpenAI chat-completions dialect; needs a `base_url`.
    #[serde(rename = "openai_compat")]
    OpenAiCompat,
    /// Offline provider replaying canned responses.
    #[serde(rename = "scripted")]
    Scripted,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::DeepSeek,
        ProviderKind::Grok,
        ProviderKind::Qwen,
        ProviderKind::OpenAiCompat,
        ProviderKind::Scripted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Grok => "grok",
            ProviderKind::Qwen => "qwen",
            ProviderKind::OpenAiCompat => "openai_compat",
            ProviderKind::Scripted => "scripted",
        }
    }

    /// Name of the environment variable consulted when no credential was supplied.
    pub fn credential_env_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::Grok => Some("XAI_API_KEY"),
            ProviderKind::Qwen => Some("DASHSCOPE_API_KEY"),
            ProviderKind::OpenAiCompat => Some("OPENAI_COMPAT_API_KEY"),
            ProviderKind::Scripted => None,
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Scripted | ProviderKind::OpenAiCompat)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a decision against the ledger, as stored in `decisions.trade_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Executed,
    Rejected,
    Skipped,
}

impl TradeStatus {
    pub fn of(action: Action, executed: bool) -> Self {
        match (action.is_trade(), executed) {
            (_, true) => TradeStatus::Executed,
            (true, false) => TradeStatus::Rejected,
            (false, false) => TradeStatus::Skipped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Executed => "executed",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(TradeStatus::Executed),
            "rejected" => Ok(TradeStatus::Rejected),
            "skipped" => Ok(TradeStatus::Skipped),
            _ => Err(CoreError::UnknownVariant { field: "trade_status", value: s.to_string() }),
        }
    }
}
