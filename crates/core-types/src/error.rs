use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid competition config: {0}")]
    InvalidConfig(String),

    #[error("Unknown value '{value}' for {field}")]
    UnknownVariant { field: &'static str, value: String },
}
