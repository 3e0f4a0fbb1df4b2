use crate::error::CycleError;
use crate::outcome::CycleOutcome;
use crate::reporter::CycleReporter;
use api_client::ApiClient;
use async_trait::async_trait;
use chrono::Utc;
use configuration::AccountConfig;
use core_types::{normalize_symbol, AccountId, EquityRecord, PositionRecord, PositionSummary};
use database::{AccountTables, DbRepository};
use futures::FutureExt;
use rust_decimal::Decimal;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The unit of work the scheduler drives once per tick.
#[async_trait]
pub trait PollTask: Send {
    fn account(&self) -> &AccountId;

    /// Runs one cycle. Never fails: every error is folded into the outcome.
    async fn run_cycle(&mut self) -> CycleOutcome;
}

/// Everything one successful cycle produced, built in memory before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub equity: EquityRecord,
    /// Net size per normalized symbol, zero nets omitted.
    pub positions: Vec<PositionRecord>,
    /// One entry per open leg, for the debug report.
    pub summaries: Vec<PositionSummary>,
}

/// Polls one account and records its equity and net positions.
pub struct AccountPoller {
    tables: AccountTables,
    client: Arc<dyn ApiClient>,
    repo: DbRepository,
    reporter: Arc<dyn CycleReporter>,
    quote_currency: String,
    alert_after_failures: Option<u32>,
    consecutive_failures: u32,
}

impl AccountPoller {
    pub fn new(
        account: &AccountId,
        client: Arc<dyn ApiClient>,
        repo: DbRepository,
        reporter: Arc<dyn CycleReporter>,
    ) -> Self {
        Self {
            tables: AccountTables::new(account),
            client,
            repo,
            reporter,
            quote_currency: "USDT".to_string(),
            alert_after_failures: None,
            consecutive_failures: 0,
        }
    }

    /// Builds a poller with the account's quote currency and alert settings.
    pub fn from_config(
        config: &AccountConfig,
        client: Arc<dyn ApiClient>,
        repo: DbRepository,
        reporter: Arc<dyn CycleReporter>,
    ) -> Self {
        Self::new(&config.id, client, repo, reporter)
            .with_quote_currency(&config.quote_currency)
            .with_failure_alerts(config.alert_after_failures)
    }

    pub fn with_quote_currency(mut self, currency: &str) -> Self {
        self.quote_currency = currency.to_string();
        self
    }

    pub fn with_failure_alerts(mut self, after: Option<u32>) -> Self {
        self.alert_after_failures = after.filter(|n| *n > 0);
        self
    }

    pub fn tables(&self) -> &AccountTables {
        &self.tables
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Runs one full cycle: fetch, persist, report.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let timestamp = Utc::now().timestamp();

        let outcome = match AssertUnwindSafe(self.poll(timestamp)).catch_unwind().await {
            Ok(Ok(snapshot)) => {
                self.reporter.position_summary(self.tables.account(), &snapshot.summaries);
                CycleOutcome::Success {
                    equity: snapshot.equity.equity,
                    position_count: snapshot.positions.len(),
                }
            }
            Ok(Err(e)) => CycleOutcome::from(&e),
            Err(payload) => CycleOutcome::from(&CycleError::Panicked(panic_message(payload.as_ref()))),
        };

        self.reporter.cycle_finished(self.tables.account(), &outcome);
        self.track_streak(&outcome);
        outcome
    }

    /// Fetches the account state and builds the cycle's records. Writes nothing.
    pub async fn collect(&self, timestamp: i64) -> Result<Snapshot, CycleError> {
        self.client.load_markets().await?;

        let balance = self.client.fetch_balance().await?;
        let equity = balance
            .get(&self.quote_currency)
            .map(|b| b.total)
            .ok_or_else(|| CycleError::MissingQuoteBalance(self.quote_currency.clone()))?;

        let positions = self.client.fetch_positions().await?;

        // Hedge-mode legs of one market normalize to the same symbol and net out here.
        let mut net: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut summaries = Vec::new();
        for position in positions.iter().filter(|p| p.is_open()) {
            let symbol = normalize_symbol(&position.symbol);
            let ticker = self.client.fetch_ticker(&position.symbol).await?;
            let amount = position.signed_contracts();

            *net.entry(symbol.clone()).or_default() += amount;
            summaries.push(PositionSummary {
                symbol,
                amount,
                entry_price: position.entry_price,
                market_price: ticker.last,
                unrealized_pnl: position.unrealized_pnl,
            });
        }

        let positions = net
            .into_iter()
            .filter(|(_, contracts)| !contracts.is_zero())
            .map(|(symbol, net_contracts)| PositionRecord {
                timestamp,
                symbol,
                net_contracts,
            })
            .collect();

        Ok(Snapshot {
            equity: EquityRecord { timestamp, equity },
            positions,
            summaries,
        })
    }

    async fn poll(&self, timestamp: i64) -> Result<Snapshot, CycleError> {
        let snapshot = self.collect(timestamp).await?;
        self.repo
            .save_snapshot(&self.tables, &snapshot.equity, &snapshot.positions)
            .await?;
        Ok(snapshot)
    }

    fn track_streak(&mut self, outcome: &CycleOutcome) {
        if outcome.is_success() {
            if self.consecutive_failures > 0 {
                tracing::info!(
                    account = %self.tables.account(),
                    after_failures = self.consecutive_failures,
                    "Account recovered."
                );
            }
            self.consecutive_failures = 0;
            return;
        }

        self.consecutive_failures += 1;
        if let Some(every) = self.alert_after_failures {
            if self.consecutive_failures % every == 0 {
                self.reporter
                    .failure_streak(self.tables.account(), self.consecutive_failures);
            }
        }
    }
}

#[async_trait]
impl PollTask for AccountPoller {
    fn account(&self) -> &AccountId {
        self.tables.account()
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        AccountPoller::run_cycle(self).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
