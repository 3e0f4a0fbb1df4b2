use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid account id '{0}': must start with a letter or underscore, contain only ASCII letters, digits or underscores, and be at most 64 characters long")]
    InvalidAccountId(String),
}
