//! # Polling Engine
//!
//! Turns the exchange client and the telemetry store into a running collector.
//!
//! - `AccountPoller`: one poll of one account. Fetches balance, positions and
//!   tickers, builds the records in memory, then writes them in one
//!   transaction. Never fails; every error becomes a `CycleOutcome`.
//! - `outcome`: network / exchange / unexpected classification.
//! - `CycleReporter`: where outcomes go. `TracingReporter` in production.
//! - `scheduler`: the per-account interval loop and the `Supervisor` that runs
//!   every account concurrently until shutdown.

pub mod error;
pub mod outcome;
pub mod poller;
pub mod reporter;
pub mod scheduler;

pub use error::CycleError;
pub use outcome::CycleOutcome;
pub use poller::{AccountPoller, PollTask, Snapshot};
pub use reporter::{CycleReporter, TracingReporter};
pub use scheduler::{run_account_loop, Supervisor};
