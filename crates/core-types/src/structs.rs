use crate::enums::PositionSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==============================================================================
// Exchange-facing shapes
// ==============================================================================

/// Funds held in a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrencyBalance {
    /// Available for new positions or withdrawal.
    pub free: Decimal,
    /// Locked as margin or in open orders.
    pub used: Decimal,
    /// The total value held in this currency, as reported by the exchange.
    pub total: Decimal,
}

/// An account balance, keyed by currency code (e.g. "USDT").
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub currencies: HashMap<String, CurrencyBalance>,
}

impl Balance {
    pub fn get(&self, currency: &str) -> Option<&CurrencyBalance> {
        self.currencies.get(currency)
    }

    pub fn insert(&mut self, currency: impl Into<String>, balance: CurrencyBalance) {
        self.currencies.insert(currency.into(), balance);
    }
}

/// An open derivative position as reported by the exchange.
///
/// `contracts` is always the unsigned size; the direction lives in `side`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Unified market symbol, e.g. "BTC/USDT:USDT".
    pub symbol: String,
    pub side: PositionSide,
    pub contracts: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Positions with a zero size are closed; exchanges still list them.
    pub fn is_open(&self) -> bool {
        !self.contracts.is_zero()
    }

    /// The size signed by direction: positive for long, negative for short.
    pub fn signed_contracts(&self) -> Decimal {
        match self.side {
            PositionSide::Long => self.contracts,
            PositionSide::Short => -self.contracts,
        }
    }
}

/// The latest traded price for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
}

// ==============================================================================
// Persisted records
// ==============================================================================

/// One point of an account's equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub equity: Decimal,
}

impl EquityRecord {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// The net size held in one symbol at one snapshot timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Normalized symbol (settlement suffix removed).
    pub symbol: String,
    /// Signed size: positive long, negative short.
    pub net_contracts: Decimal,
}

/// In-memory view of an active position, assembled during a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub market_price: Decimal,
    pub unrealized_pnl: Decimal,
}
