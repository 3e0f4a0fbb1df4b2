use thiserror::Error;

/// Binance error codes that describe a transient transport condition rather
/// than a rejected request: -1001 (internal disconnect), -1007 (backend
/// timeout) and -1021 (timestamp outside recvWindow, i.e. clock drift or a
/// slow link).
const TRANSIENT_CODES: [i64; 3] = [-1001, -1007, -1021];

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error talking to the exchange: {0}")]
    Network(String),

    #[error("Exchange unavailable (HTTP {status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("Binance error {code}: {msg}")]
    BinanceError { code: i64, msg: String },

    #[error("The API request returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Unknown market symbol: {0}")]
    BadSymbol(String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Failed to build the HTTP client: {0}")]
    ClientBuild(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Deserialization(e.to_string())
        } else if e.is_builder() {
            ApiError::ClientBuild(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl ApiError {
    /// Connectivity trouble: the request may not have reached the exchange, or
    /// the exchange could not answer it.
    pub fn is_network(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Unavailable { .. } => true,
            ApiError::BinanceError { code, .. } => TRANSIENT_CODES.contains(code),
            _ => false,
        }
    }

    /// The exchange answered and rejected the request (bad symbol, auth,
    /// rate limit, ...).
    pub fn is_exchange(&self) -> bool {
        match self {
            ApiError::BinanceError { code, .. } => !TRANSIENT_CODES.contains(code),
            ApiError::HttpStatus { .. } | ApiError::BadSymbol(_) => true,
            _ => false,
        }
    }

    /// A short, stable name of the variant for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "Network",
            ApiError::Unavailable { .. } => "Unavailable",
            ApiError::BinanceError { .. } => "BinanceError",
            ApiError::HttpStatus { .. } => "HttpStatus",
            ApiError::BadSymbol(_) => "BadSymbol",
            ApiError::Deserialization(_) => "Deserialization",
            ApiError::InvalidData(_) => "InvalidData",
            ApiError::ClientBuild(_) => "ClientBuild",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_network_class() {
        assert!(ApiError::Network("connection reset".into()).is_network());
        assert!(ApiError::Unavailable { status: 503, body: String::new() }.is_network());
        assert!(ApiError::BinanceError { code: -1007, msg: "Timeout".into() }.is_network());
    }

    #[test]
    fn rejections_are_exchange_class() {
        let auth = ApiError::BinanceError { code: -2015, msg: "Invalid API-key".into() };
        assert!(auth.is_exchange());
        assert!(!auth.is_network());
        assert!(ApiError::HttpStatus { status: 403, body: String::new() }.is_exchange());
        assert!(ApiError::BadSymbol("FOO/BAR".into()).is_exchange());
    }

    #[test]
    fn payload_problems_are_neither() {
        for err in [
            ApiError::Deserialization("missing field".into()),
            ApiError::InvalidData("bad number".into()),
        ] {
            assert!(!err.is_network());
            assert!(!err.is_exchange());
        }
    }
}
