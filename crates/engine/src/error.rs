use thiserror::Error;

/// Everything that can end a poll early.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("{0}")]
    ApiClient(#[from] api_client::ApiError),

    #[error("{0}")]
    Database(#[from] database::DbError),

    #[error("Balance response has no '{0}' entry")]
    MissingQuoteBalance(String),

    #[error("Poll panicked: {0}")]
    Panicked(String),
}

impl CycleError {
    /// The concrete error kind, as shown on "unexpected" log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::ApiClient(e) => e.kind(),
            CycleError::Database(database::DbError::QueryError(_)) => "DatabaseQuery",
            CycleError::Database(database::DbError::NumericConversion { .. }) => "NumericConversion",
            CycleError::Database(database::DbError::NotFound) => "NotFound",
            CycleError::MissingQuoteBalance(_) => "MissingQuoteBalance",
            CycleError::Panicked(_) => "Panic",
        }
    }
}
