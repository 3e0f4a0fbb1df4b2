use crate::outcome::CycleOutcome;
use core_types::{AccountId, PositionSummary};

/// Receives the result of every poll. Injected into each poller so the
/// production sink (tracing) and test sinks are interchangeable.
pub trait CycleReporter: Send + Sync {
    /// Called exactly once per cycle.
    fn cycle_finished(&self, account: &AccountId, outcome: &CycleOutcome);

    /// Per-position detail of a successful cycle.
    fn position_summary(&self, _account: &AccountId, _positions: &[PositionSummary]) {}

    /// The account has failed `consecutive` cycles in a row.
    fn failure_streak(&self, _account: &AccountId, _consecutive: u32) {}
}

/// Writes cycle outcomes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl CycleReporter for TracingReporter {
    fn cycle_finished(&self, account: &AccountId, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Success { equity, position_count } => {
                tracing::info!(
                    account = %account,
                    equity = %equity,
                    "Successfully fetched account info. Net value: {}",
                    equity
                );
                tracing::info!(
                    account = %account,
                    active_positions = position_count,
                    "Number of active positions: {}",
                    position_count
                );
            }
            CycleOutcome::NetworkFailure { reason } => {
                tracing::error!(account = %account, "Network error when fetching account info: {}", reason);
            }
            CycleOutcome::ExchangeFailure { reason } => {
                tracing::error!(account = %account, "Exchange error when fetching account info: {}", reason);
            }
            CycleOutcome::UnexpectedFailure { kind, reason } => {
                tracing::error!(
                    account = %account,
                    kind,
                    "UNEXPECTED error when fetching account info: {} - {}",
                    kind,
                    reason
                );
            }
        }
    }

    fn position_summary(&self, account: &AccountId, positions: &[PositionSummary]) {
        for p in positions {
            tracing::debug!(
                account = %account,
                symbol = %p.symbol,
                amount = %p.amount,
                entry_price = %p.entry_price,
                market_price = %p.market_price,
                unrealized_pnl = %p.unrealized_pnl,
                "Position"
            );
        }
    }

    fn failure_streak(&self, account: &AccountId, consecutive: u32) {
        tracing::warn!(
            account = %account,
            consecutive_failures = consecutive,
            "Account has failed {} polls in a row. Polling continues.",
            consecutive
        );
    }
}
