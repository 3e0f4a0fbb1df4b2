pub mod account;
pub mod enums;
pub mod error;
pub mod structs;
pub mod symbol;

// Re-export the core types to provide a clean public API.
pub use account::AccountId;
pub use enums::{MarketType, PositionSide};
pub use error::CoreError;
pub use structs::{
    Balance, CurrencyBalance, EquityRecord, Position, PositionRecord, PositionSummary, Ticker,
};
pub use symbol::normalize_symbol;
