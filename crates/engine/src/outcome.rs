use crate::error::CycleError;
use rust_decimal::Decimal;
use std::fmt;

/// How one poll ended. Only ever logged, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Success { equity: Decimal, position_count: usize },
    /// Transport trouble; the next tick is the retry.
    NetworkFailure { reason: String },
    /// The exchange answered with a business-level rejection.
    ExchangeFailure { reason: String },
    /// Anything else, most likely a response-schema change or a local fault.
    UnexpectedFailure { kind: &'static str, reason: String },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Success { .. } => "success",
            CycleOutcome::NetworkFailure { .. } => "network",
            CycleOutcome::ExchangeFailure { .. } => "exchange",
            CycleOutcome::UnexpectedFailure { .. } => "unexpected",
        }
    }
}

/// Classifies an error. Buckets are tried most specific first: network, then
/// exchange, and everything left over is unexpected.
impl From<&CycleError> for CycleOutcome {
    fn from(err: &CycleError) -> Self {
        let reason = err.to_string();
        match err {
            CycleError::ApiClient(e) if e.is_network() => CycleOutcome::NetworkFailure { reason },
            CycleError::ApiClient(e) if e.is_exchange() => CycleOutcome::ExchangeFailure { reason },
            CycleError::MissingQuoteBalance(_) => CycleOutcome::ExchangeFailure { reason },
            _ => CycleOutcome::UnexpectedFailure {
                kind: err.kind(),
                reason,
            },
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Success { equity, position_count } => {
                write!(f, "ok: equity {}, {} active positions", equity, position_count)
            }
            CycleOutcome::NetworkFailure { reason } => write!(f, "network error: {}", reason),
            CycleOutcome::ExchangeFailure { reason } => write!(f, "exchange error: {}", reason),
            CycleOutcome::UnexpectedFailure { kind, reason } => {
                write!(f, "UNEXPECTED error: {} - {}", kind, reason)
            }
        }
    }
}
