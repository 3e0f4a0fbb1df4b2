use serde::{Deserialize, Serialize};
use std::fmt;

/// The direction of an open derivative position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Which family of account endpoints an exchange client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// USDⓈ-margined perpetual and delivery futures.
    #[default]
    UsdmFutures,
    /// Unified portfolio-margin account (UM positions, cross-margin balance).
    PortfolioMargin,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::UsdmFutures => write!(f, "usdm_futures"),
            MarketType::PortfolioMargin => write!(f, "portfolio_margin"),
        }
    }
}
