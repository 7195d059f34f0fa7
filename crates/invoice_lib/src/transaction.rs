use crate::contracts::{
    get_erc20_approve, get_erc20_transfer, get_escrow_deposit, get_escrow_release,
};
use crate::error::InvoiceError;
use crate::err_from;
use crate::setup::ChainSetup;
use web3::types::{Address, Bytes, CallRequest, TransactionParameters, H256, U256, U64};

/// Contract call or plain transfer to be signed and sent by the service key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainCall {
    pub method: String,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptInfo {
    pub tx_hash: H256,
    pub block_number: u64,
    pub success: bool,
    pub fee_paid: U256,
    pub logs: Vec<ReceiptLog>,
}

impl ReceiptInfo {
    pub fn tx_hash_str(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }

    pub fn has_event(&self, contract: Address, signature: H256) -> bool {
        self.logs
            .iter()
            .any(|log| log.address == contract && log.topics.first() == Some(&signature))
    }
}

pub fn create_eth_transfer(to: Address, amount: U256) -> ChainCall {
    ChainCall {
        method: "transfer".to_string(),
        to,
        value: amount,
        data: vec![],
    }
}

pub fn create_erc20_transfer(
    token: Address,
    erc20_to: Address,
    erc20_amount: U256,
) -> Result<ChainCall, InvoiceError> {
    Ok(ChainCall {
        method: "ERC20.transfer".to_string(),
        to: token,
        value: U256::zero(),
        data: get_erc20_transfer(erc20_to, erc20_amount).map_err(err_from!())?,
    })
}

pub fn create_erc20_approve(
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<ChainCall, InvoiceError> {
    Ok(ChainCall {
        method: "ERC20.approve".to_string(),
        to: token,
        value: U256::zero(),
        data: get_erc20_approve(spender, amount).map_err(err_from!())?,
    })
}

/// `token` None deposits the native currency, sent as the call value.
pub fn create_escrow_deposit(
    escrow: Address,
    invoice_key: H256,
    payee: Address,
    token: Option<Address>,
    amount: U256,
    release_after: U256,
) -> Result<ChainCall, InvoiceError> {
    let value = if token.is_none() { amount } else { U256::zero() };
    Ok(ChainCall {
        method: "ESCROW.deposit".to_string(),
        to: escrow,
        value,
        data: get_escrow_deposit(
            invoice_key,
            payee,
            token.unwrap_or_else(Address::zero),
            amount,
            release_after,
        )
        .map_err(err_from!())?,
    })
}

pub fn create_escrow_release(escrow: Address, invoice_key: H256) -> Result<ChainCall, InvoiceError> {
    Ok(ChainCall {
        method: "ESCROW.release".to_string(),
        to: escrow,
        value: U256::zero(),
        data: get_escrow_release(invoice_key).map_err(err_from!())?,
    })
}

fn call_data(call: &ChainCall) -> Option<Bytes> {
    if call.data.is_empty() {
        None
    } else {
        Some(Bytes(call.data.clone()))
    }
}

pub fn call_to_call_request(
    call: &ChainCall,
    from: Address,
    chain_setup: &ChainSetup,
) -> CallRequest {
    CallRequest {
        from: Some(from),
        to: Some(call.to),
        gas: None,
        gas_price: None,
        value: Some(call.value),
        data: call_data(call),
        transaction_type: Some(U64::from(2)),
        access_list: None,
        max_fee_per_gas: Some(chain_setup.max_fee_per_gas),
        max_priority_fee_per_gas: Some(chain_setup.priority_fee),
    }
}

pub fn call_to_transaction(
    call: &ChainCall,
    nonce: u64,
    gas_limit: U256,
    chain_setup: &ChainSetup,
) -> TransactionParameters {
    TransactionParameters {
        nonce: Some(U256::from(nonce)),
        to: Some(call.to),
        gas: gas_limit,
        gas_price: None,
        value: call.value,
        data: call_data(call).unwrap_or_default(),
        chain_id: Some(chain_setup.chain_id as u64),
        transaction_type: Some(U64::from(2)),
        access_list: None,
        max_fee_per_gas: Some(chain_setup.max_fee_per_gas),
        max_priority_fee_per_gas: Some(chain_setup.priority_fee),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::get_escrow_event_signature;

    #[test]
    fn test_eth_deposit_carries_value() {
        let call = create_escrow_deposit(
            Address::repeat_byte(1),
            H256::repeat_byte(2),
            Address::repeat_byte(3),
            None,
            U256::from(1000),
            U256::from(1),
        )
        .unwrap();
        assert_eq!(call.value, U256::from(1000));
        assert_eq!(call.to, Address::repeat_byte(1));

        let call = create_escrow_deposit(
            Address::repeat_byte(1),
            H256::repeat_byte(2),
            Address::repeat_byte(3),
            Some(Address::repeat_byte(4)),
            U256::from(1000),
            U256::from(1),
        )
        .unwrap();
        assert_eq!(call.value, U256::zero());
    }

    #[test]
    fn test_receipt_event_lookup() {
        let escrow = Address::repeat_byte(7);
        let signature = get_escrow_event_signature("Deposited").unwrap();
        let receipt = ReceiptInfo {
            tx_hash: H256::repeat_byte(9),
            block_number: 10,
            success: true,
            fee_paid: U256::zero(),
            logs: vec![ReceiptLog {
                address: escrow,
                topics: vec![signature, H256::zero()],
            }],
        };
        assert!(receipt.has_event(escrow, signature));
        assert!(!receipt.has_event(Address::repeat_byte(8), signature));
        assert!(!receipt.has_event(
            escrow,
            get_escrow_event_signature("Released").unwrap()
        ));
        assert!(receipt.tx_hash_str().starts_with("0x0909"));
    }
}
