use crate::error::ApiError;
use crate::responses::{
    AccountResponse, ExchangeInfoResponse, PortfolioMarginBalanceResponse, PositionResponse, SymbolInfo,
};
use chrono::DateTime;
use core_types::{Balance, CurrencyBalance, Position, PositionSide};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Static metadata for one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    /// The exchange's own id, e.g. "BTCUSDT".
    pub id: String,
    /// Unified symbol, e.g. "BTC/USDT:USDT" or "BTC/USDT:USDT-250926".
    pub symbol: String,
}

/// `deliveryDate` Binance reports for contracts that never expire (2100-12-25).
const PERPETUAL_DELIVERY_MS: i64 = 4_133_404_800_000;

/// Perpetuals keep an expiry-free symbol through every contract type they
/// pass through, delisting (`PERPETUAL_DELIVERING`) included.
fn is_perpetual(info: &SymbolInfo) -> bool {
    info.contract_type.contains("PERPETUAL") || info.delivery_date == Some(PERPETUAL_DELIVERY_MS)
}

/// Bidirectional lookup between exchange ids and unified symbols.
#[derive(Debug, Clone, Default)]
pub struct MarketCache {
    by_id: HashMap<String, Market>,
    id_by_symbol: HashMap<String, String>,
}

impl MarketCache {
    pub fn from_exchange_info(info: ExchangeInfoResponse) -> Self {
        let mut cache = Self::default();
        for s in info.symbols {
            let expiry = if is_perpetual(&s) {
                None
            } else {
                match s.delivery_date.and_then(DateTime::from_timestamp_millis) {
                    Some(date) => Some(date.format("%y%m%d").to_string()),
                    // Settled or otherwise unlisted contracts carry no usable date.
                    None => continue,
                }
            };

            let mut symbol = format!("{}/{}:{}", s.base_asset, s.quote_asset, s.margin_asset);
            if let Some(expiry) = expiry {
                symbol.push('-');
                symbol.push_str(&expiry);
            }

            cache.insert(Market { id: s.symbol, symbol });
        }
        cache
    }

    pub fn insert(&mut self, market: Market) {
        self.id_by_symbol.insert(market.symbol.clone(), market.id.clone());
        self.by_id.insert(market.id.clone(), market);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn by_id(&self, id: &str) -> Option<&Market> {
        self.by_id.get(id)
    }

    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.id_by_symbol.contains_key(symbol)
    }

    /// The first open position whose market is not in the cache, if any.
    pub fn missing_open_market<'a>(&self, raw: &'a [PositionResponse]) -> Option<&'a str> {
        raw.iter()
            .find(|p| !p.position_amt.is_zero() && !self.by_id.contains_key(&p.symbol))
            .map(|p| p.symbol.as_str())
    }

    /// Resolves a unified symbol to the exchange id used in request params.
    pub fn id_for(&self, symbol: &str) -> Result<&str, ApiError> {
        self.id_by_symbol
            .get(symbol)
            .map(String::as_str)
            .ok_or_else(|| ApiError::BadSymbol(symbol.to_string()))
    }

    /// Converts raw position rows into unified positions.
    ///
    /// Flat rows for markets missing from the cache (typically delisted
    /// contracts) are dropped; an open position on an unknown market is an
    /// error because its symbol cannot be expressed.
    pub fn positions(&self, raw: Vec<PositionResponse>) -> Result<Vec<Position>, ApiError> {
        let mut positions = Vec::with_capacity(raw.len());
        for p in raw {
            let Some(market) = self.by_id(&p.symbol) else {
                if p.position_amt.is_zero() {
                    continue;
                }
                return Err(ApiError::InvalidData(format!(
                    "open position on unknown market '{}'",
                    p.symbol
                )));
            };

            let side = match p.position_side.as_str() {
                "LONG" => PositionSide::Long,
                "SHORT" => PositionSide::Short,
                "BOTH" if p.position_amt.is_sign_negative() && !p.position_amt.is_zero() => {
                    PositionSide::Short
                }
                "BOTH" => PositionSide::Long,
                other => {
                    return Err(ApiError::InvalidData(format!(
                        "unknown positionSide '{}' for {}",
                        other, p.symbol
                    )));
                }
            };

            positions.push(Position {
                symbol: market.symbol.clone(),
                side,
                contracts: p.position_amt.abs(),
                entry_price: p.entry_price,
                unrealized_pnl: p.un_realized_profit,
            });
        }
        Ok(positions)
    }
}

/// USDⓈ-M futures: total = the asset's margin balance, i.e. wallet balance
/// plus the unrealized PnL of cross and isolated positions.
pub fn futures_balance(raw: AccountResponse) -> Balance {
    let mut balance = Balance::default();
    for b in raw.assets {
        let total = b.margin_balance;
        balance.insert(
            b.asset,
            CurrencyBalance {
                free: b.available_balance,
                used: total - b.available_balance,
                total,
            },
        );
    }
    balance
}

/// Portfolio margin: total = wallet balance plus UM and CM unrealized PnL.
pub fn portfolio_margin_balance(raw: Vec<PortfolioMarginBalanceResponse>) -> Balance {
    let mut balance = Balance::default();
    for b in raw {
        let unrealized = b.um_unrealized_pnl.unwrap_or(Decimal::ZERO)
            + b.cm_unrealized_pnl.unwrap_or(Decimal::ZERO);
        balance.insert(
            b.asset,
            CurrencyBalance {
                free: b.cross_margin_free.unwrap_or(Decimal::ZERO),
                used: b.cross_margin_locked.unwrap_or(Decimal::ZERO),
                total: b.total_wallet_balance + unrealized,
            },
        );
    }
    balance
}
