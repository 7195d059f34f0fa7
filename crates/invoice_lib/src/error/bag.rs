use crate::error::custom::*;
use crate::utils::ConversionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorBag {
    #[error("Hex decode error: {0}")]
    HexDecodeError(#[from] hex::FromHexError),
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    ConversionError(#[from] ConversionError),
    #[error("web3 error: {0}")]
    Web3Error(#[from] web3::Error),
    #[error("abi error: {0}")]
    Web3AbiError(#[from] web3::ethabi::Error),
    #[error("secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Toml error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Csv error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("{0}")]
    CustomError(#[from] CustomError),
    #[error("{0}")]
    ValidationError(#[from] ValidationError),
    #[error("{0}")]
    NotFoundError(#[from] NotFoundError),
    #[error("{0}")]
    TransactionFailedError(#[from] TransactionFailedError),
    #[error("{0}")]
    AlreadyProcessingError(#[from] AlreadyProcessingError),
}
