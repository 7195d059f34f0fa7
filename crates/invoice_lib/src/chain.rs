use crate::contracts::get_erc20_balance_of;
use crate::error::{InvoiceError, TransactionFailedError};
use crate::eth::{get_eth_addr_from_secret, get_transaction_count};
use crate::setup::ChainSetup;
use crate::transaction::{
    call_to_call_request, call_to_transaction, ChainCall, ReceiptInfo, ReceiptLog,
};
use crate::{err_create, err_custom_create, err_from};
use async_trait::async_trait;
use secp256k1::SecretKey;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use web3::types::{Address, Bytes, CallRequest, H256, U256};

/// Blockchain access used by payment, escrow and wallet operations.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> i64;

    /// Address of the key signing submitted calls.
    fn sender(&self) -> Result<Address, InvoiceError>;

    /// Signs and broadcasts the call, returning its hash without waiting.
    async fn submit(&self, call: &ChainCall) -> Result<H256, InvoiceError>;

    async fn find_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, InvoiceError>;

    /// Waits until the receipt has enough confirmations.
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<ReceiptInfo, InvoiceError>;

    async fn native_balance(&self, address: Address) -> Result<U256, InvoiceError>;

    async fn token_balance(&self, token: Address, address: Address) -> Result<U256, InvoiceError>;

    async fn submit_and_wait(&self, call: &ChainCall) -> Result<ReceiptInfo, InvoiceError> {
        let tx_hash = self.submit(call).await?;
        log::info!("Submitted {} tx_hash: {:#x}", call.method, tx_hash);
        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(err_create!(TransactionFailedError::new(&format!(
                "{} reverted, tx_hash: {:#x}",
                call.method, tx_hash
            ))));
        }
        Ok(receipt)
    }
}

/// Nonce for the next submission. The node's pending count can lag behind
/// transactions this process already broadcast.
fn next_nonce(pending_count: u64, last_sent: Option<u64>) -> u64 {
    match last_sent {
        Some(last) if last >= pending_count => last + 1,
        _ => pending_count,
    }
}

pub struct Web3ChainClient {
    chain_setup: ChainSetup,
    secret_key: Option<SecretKey>,
    /// Last nonce broadcast by this client, held from nonce lookup until send.
    last_nonce: Mutex<Option<u64>>,
}

impl Web3ChainClient {
    pub fn new(chain_setup: ChainSetup, secret_key: Option<SecretKey>) -> Self {
        Self {
            chain_setup,
            secret_key,
            last_nonce: Mutex::new(None),
        }
    }

    fn secret_key(&self) -> Result<&SecretKey, InvoiceError> {
        self.secret_key
            .as_ref()
            .ok_or_else(|| err_custom_create!("No signing key configured"))
    }
}

#[async_trait]
impl ChainClient for Web3ChainClient {
    fn chain_id(&self) -> i64 {
        self.chain_setup.chain_id
    }

    fn sender(&self) -> Result<Address, InvoiceError> {
        Ok(get_eth_addr_from_secret(self.secret_key()?))
    }

    async fn submit(&self, call: &ChainCall) -> Result<H256, InvoiceError> {
        let secret_key = self.secret_key()?;
        let from = get_eth_addr_from_secret(secret_key);
        let web3 = self.chain_setup.get_provider()?;

        let mut last_nonce = self.last_nonce.lock().await;
        let pending_count = get_transaction_count(from, web3, true)
            .await
            .map_err(err_from!())?;
        let nonce = next_nonce(pending_count, *last_nonce);

        let call_request = call_to_call_request(call, from, &self.chain_setup);
        log::debug!("Estimating gas for {}: {:?}", call.method, call_request);
        let gas_est = web3
            .eth()
            .estimate_gas(call_request, None)
            .await
            .map_err(err_from!())?;
        let add_gas_safety_margin: U256 = U256::from(20000);
        let gas_limit = gas_est + add_gas_safety_margin;
        log::debug!(
            "Set gas limit basing on gas estimation: {gas_est}. Setting {gas_limit} increased by {add_gas_safety_margin} for safe execution."
        );

        let tx_object = call_to_transaction(call, nonce, gas_limit, &self.chain_setup);
        log::debug!("Signing transaction: {:#?}", tx_object);
        let signed = web3
            .accounts()
            .sign_transaction(tx_object, secret_key)
            .await
            .map_err(err_from!())?;

        log::info!(
            "Sending {} from {:#x} with nonce {}",
            call.method,
            from,
            nonce
        );
        web3.eth()
            .send_raw_transaction(signed.raw_transaction)
            .await
            .map_err(err_from!())?;
        *last_nonce = Some(nonce);
        Ok(signed.transaction_hash)
    }

    async fn find_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, InvoiceError> {
        let web3 = self.chain_setup.get_provider()?;
        let receipt = web3
            .eth()
            .transaction_receipt(tx_hash)
            .await
            .map_err(err_from!())?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            // still pending
            return Ok(None);
        };
        let fee_paid = match (receipt.gas_used, receipt.effective_gas_price) {
            (Some(gas_used), Some(gas_price)) => gas_used * gas_price,
            _ => U256::zero(),
        };
        Ok(Some(ReceiptInfo {
            tx_hash,
            block_number: block_number.as_u64(),
            success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            fee_paid,
            logs: receipt
                .logs
                .iter()
                .map(|log| ReceiptLog {
                    address: log.address,
                    topics: log.topics.clone(),
                })
                .collect(),
        }))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<ReceiptInfo, InvoiceError> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.chain_setup.transaction_timeout);
        let poll_interval = Duration::from_secs(self.chain_setup.receipt_poll_interval);
        loop {
            if let Some(receipt) = self.find_receipt(tx_hash).await? {
                let web3 = self.chain_setup.get_provider()?;
                let current_block = web3
                    .eth()
                    .block_number()
                    .await
                    .map_err(err_from!())?
                    .as_u64();
                let expected = receipt.block_number + self.chain_setup.confirmation_blocks;
                if expected <= current_block {
                    log::info!("Transaction confirmed: tx_hash: {:#x}", tx_hash);
                    return Ok(receipt);
                }
                log::info!(
                    "Waiting for confirmations: tx_hash: {:#x}. Current block {}, expected at least: {}",
                    tx_hash,
                    current_block,
                    expected
                );
            } else {
                log::debug!("Receipt not found: {:#x}", tx_hash);
            }
            if started.elapsed() > timeout {
                return Err(err_create!(TransactionFailedError::new(&format!(
                    "No confirmed receipt after {} seconds, tx_hash: {:#x}",
                    timeout.as_secs(),
                    tx_hash
                ))));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn native_balance(&self, address: Address) -> Result<U256, InvoiceError> {
        let web3 = self.chain_setup.get_provider()?;
        web3.eth()
            .balance(address, None)
            .await
            .map_err(err_from!())
    }

    async fn token_balance(&self, token: Address, address: Address) -> Result<U256, InvoiceError> {
        let web3 = self.chain_setup.get_provider()?;
        let call_request = CallRequest {
            from: None,
            to: Some(token),
            gas: None,
            gas_price: None,
            value: None,
            data: Some(Bytes(get_erc20_balance_of(address).map_err(err_from!())?)),
            transaction_type: None,
            access_list: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        };
        let res = web3
            .eth()
            .call(call_request, None)
            .await
            .map_err(err_from!())?;
        if res.0.len() != 32 {
            return Err(err_custom_create!(
                "Invalid response from ERC20 balanceOf {:?}",
                res
            ));
        }
        Ok(U256::from_big_endian(&res.0))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory chain: every submitted call gets a receipt with the configured outcome.
    pub struct MockChainClient {
        pub sender: Address,
        pub submitted: Mutex<Vec<ChainCall>>,
        pub receipts: Mutex<HashMap<H256, ReceiptInfo>>,
        pub revert: bool,
        pub fail_submit: bool,
        pub emit_logs: bool,
        pub balance: U256,
    }

    impl MockChainClient {
        pub fn new() -> Self {
            Self {
                sender: Address::repeat_byte(0xaa),
                submitted: Mutex::new(vec![]),
                receipts: Mutex::new(HashMap::new()),
                revert: false,
                fail_submit: false,
                emit_logs: true,
                balance: U256::zero(),
            }
        }

        pub fn submitted_methods(&self) -> Vec<String> {
            self.submitted
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.method.clone())
                .collect()
        }

        pub fn add_receipt(&self, receipt: ReceiptInfo) {
            self.receipts
                .lock()
                .unwrap()
                .insert(receipt.tx_hash, receipt);
        }
    }

    fn event_for(call: &ChainCall) -> Option<H256> {
        let name = match call.method.as_str() {
            "ESCROW.deposit" => "Deposited",
            "ESCROW.release" => "Released",
            _ => return None,
        };
        crate::contracts::get_escrow_event_signature(name).ok()
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        fn chain_id(&self) -> i64 {
            5
        }

        fn sender(&self) -> Result<Address, InvoiceError> {
            Ok(self.sender)
        }

        async fn submit(&self, call: &ChainCall) -> Result<H256, InvoiceError> {
            if self.fail_submit {
                return Err(err_custom_create!("User rejected the request"));
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(call.clone());
            let tx_hash = H256::from_low_u64_be(submitted.len() as u64);
            let logs = match (self.emit_logs, event_for(call)) {
                (true, Some(signature)) => vec![ReceiptLog {
                    address: call.to,
                    topics: vec![signature],
                }],
                _ => vec![],
            };
            self.receipts.lock().unwrap().insert(
                tx_hash,
                ReceiptInfo {
                    tx_hash,
                    block_number: 100,
                    success: !self.revert,
                    fee_paid: U256::from(21000u64),
                    logs,
                },
            );
            Ok(tx_hash)
        }

        async fn find_receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, InvoiceError> {
            Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
        }

        async fn wait_for_receipt(&self, tx_hash: H256) -> Result<ReceiptInfo, InvoiceError> {
            self.find_receipt(tx_hash)
                .await?
                .ok_or_else(|| err_custom_create!("No receipt for {:#x}", tx_hash))
        }

        async fn native_balance(&self, _address: Address) -> Result<U256, InvoiceError> {
            Ok(self.balance)
        }

        async fn token_balance(
            &self,
            _token: Address,
            _address: Address,
        ) -> Result<U256, InvoiceError> {
            Ok(self.balance)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_nonce_never_reuses_sent_nonce() {
        assert_eq!(next_nonce(4, None), 4);
        // node has not seen the last broadcast yet
        assert_eq!(next_nonce(4, Some(4)), 5);
        assert_eq!(next_nonce(4, Some(6)), 7);
        // transactions sent elsewhere moved the account ahead
        assert_eq!(next_nonce(9, Some(4)), 9);
    }
}
