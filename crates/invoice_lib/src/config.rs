use serde::Deserialize;
use std::collections::btree_map::BTreeMap as Map;

use std::fs;
use std::path::Path;

use crate::error::InvoiceError;
use crate::err_from;
use web3::types::Address;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub chain: Map<String, Chain>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EscrowContractSettings {
    pub address: Address,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Chain {
    pub network_id: usize,
    pub rpc_endpoints: Vec<String>,
    pub currency_symbol: String,
    pub priority_fee: f64,
    pub max_fee_per_gas: f64,
    pub usdc: Option<Token>,
    pub escrow_contract: Option<EscrowContractSettings>,
    pub transaction_timeout: u64,
    pub confirmation_blocks: u64,
    #[serde(default = "default_receipt_poll_interval")]
    pub receipt_poll_interval: u64,
}

fn default_receipt_poll_interval() -> u64 {
    5
}

#[derive(Deserialize, Debug, Clone)]
pub struct Token {
    pub symbol: Option<String>,
    pub address: Address,
    pub decimals: u32,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, InvoiceError> {
        Self::load_from_str(&fs::read_to_string(path).map_err(err_from!())?)
    }

    pub fn load_from_str(content: &str) -> Result<Self, InvoiceError> {
        toml::from_str(content).map_err(err_from!())
    }
}
