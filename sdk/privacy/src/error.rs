use thiserror::Error;

/// Errors raised while parsing primitive values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: &'static str },

    #[error("invalid amount {0:?}")]
    InvalidAmount(String),
}
