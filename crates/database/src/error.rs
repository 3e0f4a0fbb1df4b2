use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Value {value} for '{field}' cannot be represented in the store")]
    NumericConversion { field: &'static str, value: String },

    #[error("The requested data was not found in the database.")]
    NotFound,
}
