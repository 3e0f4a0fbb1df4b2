use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.

/// `GET /fapi/v1/exchangeInfo`. Only the symbol list is of interest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

/// One tradable contract from `exchangeInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub contract_type: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub margin_asset: String,
    /// Milliseconds since epoch. Perpetuals carry a far-future sentinel.
    #[serde(default)]
    pub delivery_date: Option<i64>,
}

/// `GET /fapi/v2/account`. Only the per-asset balances are of interest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub assets: Vec<AccountAssetResponse>,
}

/// One asset of a USDⓈ-M account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAssetResponse {
    pub asset: String,
    /// Wallet balance plus the unrealized PnL of every position, cross and
    /// isolated alike.
    pub margin_balance: Decimal,
    pub available_balance: Decimal,
}

/// A single asset's balance from `GET /papi/v1/balance` (portfolio margin).
///
/// Binance sends empty strings for some numeric fields on assets that were
/// never used, so everything but the wallet total is parsed leniently.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMarginBalanceResponse {
    pub asset: String,
    pub total_wallet_balance: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub cross_margin_free: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub cross_margin_locked: Option<Decimal>,
    #[serde(default, rename = "umUnrealizedPNL", deserialize_with = "lenient_decimal")]
    pub um_unrealized_pnl: Option<Decimal>,
    #[serde(default, rename = "cmUnrealizedPNL", deserialize_with = "lenient_decimal")]
    pub cm_unrealized_pnl: Option<Decimal>,
}

/// A single position from `GET /fapi/v2/positionRisk` or
/// `GET /papi/v1/um/positionRisk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub entry_price: Decimal,
    /// Signed in one-way mode, per-leg in hedge mode.
    pub position_amt: Decimal,
    /// "BOTH" in one-way mode, "LONG"/"SHORT" in hedge mode.
    #[serde(default = "default_position_side")]
    pub position_side: String,
    pub symbol: String,
    pub un_realized_profit: Decimal,
}

fn default_position_side() -> String {
    "BOTH".to_string()
}

/// `GET /fapi/v1/ticker/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPriceResponse {
    pub price: Decimal,
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(Raw::Number(n)) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
