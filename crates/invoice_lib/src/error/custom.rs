use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("{msg}")]
pub struct CustomError {
    pub msg: String,
}

impl CustomError {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("Transaction failed: {msg}")]
pub struct TransactionFailedError {
    pub msg: String,
}

impl TransactionFailedError {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

/// Rejected input. `field` names the first offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {msg}")]
pub struct ValidationError {
    pub field: String,
    pub msg: String,
}

impl ValidationError {
    pub fn new(field: &str, msg: &str) -> Self {
        Self {
            field: field.to_string(),
            msg: msg.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: i64,
}

impl NotFoundError {
    pub fn new(entity: &'static str, id: i64) -> Self {
        Self { entity, id }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{entity} {id} already has a chain operation in progress")]
pub struct AlreadyProcessingError {
    pub entity: &'static str,
    pub id: i64,
}
