use crate::error::{InvoiceError, ValidationError};
use crate::err_create;
use secp256k1::{PublicKey, SecretKey};
use sha3::Digest;
use sha3::Keccak256;
use std::str::FromStr;
use web3::transports::Http;
use web3::types::{Address, H256};
use web3::Web3;

pub async fn get_transaction_count(
    address: Address,
    web3: &Web3<Http>,
    pending: bool,
) -> Result<u64, web3::Error> {
    let nonce_type = match pending {
        true => web3::types::BlockNumber::Pending,
        false => web3::types::BlockNumber::Latest,
    };
    let nonce = web3
        .eth()
        .transaction_count(address, Some(nonce_type))
        .await?;
    Ok(nonce.as_u64())
}

pub fn get_eth_addr_from_secret(secret_key: &SecretKey) -> Address {
    Address::from_slice(
        &Keccak256::digest(
            &PublicKey::from_secret_key(&secp256k1::Secp256k1::new(), secret_key)
                .serialize_uncompressed()[1..65],
        )
        .as_slice()[12..],
    )
}

/// Identifier of an invoice inside the escrow contract.
pub fn invoice_key(payment_id: &str) -> H256 {
    H256::from_slice(Keccak256::digest(payment_id.as_bytes()).as_slice())
}

/// Parses a `0x` prefixed 20 byte hex address.
pub fn parse_address(field: &str, value: &str) -> Result<Address, InvoiceError> {
    let trimmed = value.trim();
    let Some(hex_part) = trimmed.strip_prefix("0x") else {
        return Err(err_create!(ValidationError::new(field, "address must start with 0x")));
    };
    if hex_part.len() != 40 {
        return Err(err_create!(ValidationError::new(
            field,
            "address must be 20 bytes long"
        )));
    }
    Address::from_str(hex_part)
        .map_err(|_| err_create!(ValidationError::new(field, "address is not valid hex")))
}

pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}
