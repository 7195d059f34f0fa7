use lazy_static::lazy_static;
use std::error;
use web3::contract::tokens::Tokenize;
use web3::contract::Contract;
use web3::transports::Http;
use web3::types::{Address, H256, U256};
use web3::{Transport, Web3};

lazy_static! {
    pub static ref DUMMY_RPC_PROVIDER: Web3<Http> = {
        let transport = web3::transports::Http::new("http://noconn").unwrap();
        Web3::new(transport)
    };
    pub static ref ERC20_CONTRACT_TEMPLATE: Contract<Http> =
        prepare_contract_template(include_bytes!("../contracts/ierc20.json")).unwrap();
    pub static ref ESCROW_CONTRACT_TEMPLATE: Contract<Http> =
        prepare_contract_template(include_bytes!("../contracts/escrow.json")).unwrap();
}

pub fn prepare_contract_template(json_abi: &[u8]) -> Result<Contract<Http>, Box<dyn error::Error>> {
    let contract = Contract::from_json(DUMMY_RPC_PROVIDER.eth(), Address::zero(), json_abi)?;

    Ok(contract)
}

pub fn contract_encode<P, T>(
    contract: &Contract<T>,
    func: &str,
    params: P,
) -> Result<Vec<u8>, web3::ethabi::Error>
where
    P: Tokenize,
    T: Transport,
{
    contract
        .abi()
        .function(func)
        .and_then(|function| function.encode_input(&params.into_tokens()))
}

pub fn get_erc20_transfer(
    address: Address,
    amount: U256,
) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(&ERC20_CONTRACT_TEMPLATE, "transfer", (address, amount))
}

pub fn get_erc20_approve(
    spender: Address,
    amount: U256,
) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(&ERC20_CONTRACT_TEMPLATE, "approve", (spender, amount))
}

pub fn get_erc20_balance_of(account: Address) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(&ERC20_CONTRACT_TEMPLATE, "balanceOf", (account,))
}

/// `token` set to the zero address means the deposit is paid in the native currency.
pub fn get_escrow_deposit(
    invoice_key: H256,
    payee: Address,
    token: Address,
    amount: U256,
    release_after: U256,
) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(
        &ESCROW_CONTRACT_TEMPLATE,
        "deposit",
        (invoice_key, payee, token, amount, release_after),
    )
}

pub fn get_escrow_release(invoice_key: H256) -> Result<Vec<u8>, web3::ethabi::Error> {
    contract_encode(&ESCROW_CONTRACT_TEMPLATE, "release", (invoice_key,))
}

pub fn get_escrow_event_signature(event: &str) -> Result<H256, web3::ethabi::Error> {
    ESCROW_CONTRACT_TEMPLATE
        .abi()
        .event(event)
        .map(|event| event.signature())
}
