use crate::config::Config;
use crate::err_custom_create;
use crate::error::InvoiceError;
use crate::eth::get_eth_addr_from_secret;
use crate::utils::gwei_to_u256;
use rand::Rng;
use secp256k1::SecretKey;
use serde::Serialize;
use std::collections::BTreeMap;
use web3::transports::Http;
use web3::types::{Address, U256};
use web3::Web3;

#[derive(Clone, Debug)]
pub struct ProviderSetup {
    pub provider: Web3<Http>,
    pub endpoint: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSetup {
    pub chain_id: i64,
    #[serde(skip_serializing)]
    pub providers: Vec<ProviderSetup>,
    pub currency_symbol: String,
    pub max_fee_per_gas: U256,
    pub priority_fee: U256,
    pub usdc_address: Option<Address>,
    pub usdc_decimals: u32,
    pub escrow_contract_address: Option<Address>,
    pub transaction_timeout: u64,
    pub confirmation_blocks: u64,
    pub receipt_poll_interval: u64,
}

impl ChainSetup {
    pub fn get_provider(&self) -> Result<&Web3<Http>, InvoiceError> {
        let mut rng = rand::thread_rng();
        if self.providers.is_empty() {
            return Err(err_custom_create!(
                "No providers found for chain id: {}",
                self.chain_id
            ));
        }
        let provider = &self.providers[rng.gen_range(0..self.providers.len())];
        log::debug!("Using rpc endpoint {}", provider.endpoint);
        Ok(&provider.provider)
    }

    pub fn escrow_contract(&self) -> Result<Address, InvoiceError> {
        self.escrow_contract_address.ok_or_else(|| {
            err_custom_create!("Escrow contract not set on chain {}", self.chain_id)
        })
    }

    pub fn usdc(&self) -> Result<Address, InvoiceError> {
        self.usdc_address
            .ok_or_else(|| err_custom_create!("USDC token not set on chain {}", self.chain_id))
    }
}

#[derive(Clone, Debug)]
pub struct InvoiceSetup {
    pub chain_setup: BTreeMap<i64, ChainSetup>,
    pub secret_key: Option<SecretKey>,
    pub chain_id: i64,
}

impl InvoiceSetup {
    pub fn new(
        config: &Config,
        secret_key: Option<SecretKey>,
        chain_id: i64,
    ) -> Result<Self, InvoiceError> {
        let mut ps = InvoiceSetup {
            chain_setup: BTreeMap::new(),
            secret_key,
            chain_id,
        };
        for chain_config in &config.chain {
            let mut providers = Vec::new();
            for endp in &chain_config.1.rpc_endpoints {
                let Ok(transport) = web3::transports::Http::new(endp) else {
                    return Err(err_custom_create!("Failed to create transport for endpoint: {}", endp));
                };
                providers.push(ProviderSetup {
                    provider: Web3::new(transport),
                    endpoint: endp.clone(),
                });
            }
            let network_id = chain_config.1.network_id as i64;
            ps.chain_setup.insert(
                network_id,
                ChainSetup {
                    chain_id: network_id,
                    providers,
                    max_fee_per_gas: gwei_to_u256(chain_config.1.max_fee_per_gas)
                        .map_err(crate::err_from!())?,
                    priority_fee: gwei_to_u256(chain_config.1.priority_fee)
                        .map_err(crate::err_from!())?,
                    usdc_address: chain_config.1.usdc.as_ref().map(|t| t.address),
                    usdc_decimals: chain_config.1.usdc.as_ref().map(|t| t.decimals).unwrap_or(6),
                    escrow_contract_address: chain_config
                        .1
                        .escrow_contract
                        .as_ref()
                        .map(|c| c.address),
                    transaction_timeout: chain_config.1.transaction_timeout,
                    confirmation_blocks: chain_config.1.confirmation_blocks,
                    receipt_poll_interval: chain_config.1.receipt_poll_interval,
                    currency_symbol: chain_config.1.currency_symbol.clone(),
                },
            );
        }
        Ok(ps)
    }

    pub fn get_chain_setup(&self) -> Result<&ChainSetup, InvoiceError> {
        self.chain_setup
            .get(&self.chain_id)
            .ok_or_else(|| err_custom_create!("No chain setup for chain id: {}", self.chain_id))
    }

    pub fn service_address(&self) -> Option<Address> {
        self.secret_key.as_ref().map(get_eth_addr_from_secret)
    }
}

#[cfg(test)]
pub(crate) fn test_chain_setup() -> ChainSetup {
    ChainSetup {
        chain_id: 5,
        providers: vec![],
        currency_symbol: "tETH".to_string(),
        max_fee_per_gas: U256::from(20_000_000_000u64),
        priority_fee: U256::from(1_000_000_000u64),
        usdc_address: Some(Address::repeat_byte(0x0c)),
        usdc_decimals: 6,
        escrow_contract_address: Some(Address::repeat_byte(0xe5)),
        transaction_timeout: 60,
        confirmation_blocks: 0,
        receipt_poll_interval: 1,
    }
}
