use crate::chain::ChainClient;
use crate::db::model::{TxDao, WalletDao};
use crate::db::ops::*;
use crate::error::{InvoiceError, NotFoundError, ValidationError};
use crate::eth::{format_address, parse_address};
use crate::model::{TransactionStatus, TransactionType, WalletType};
use crate::runtime::{with_wallet_guard, SharedState};
use crate::setup::ChainSetup;
use crate::transaction::{create_erc20_transfer, create_eth_transfer};
use crate::utils::{parse_decimal, rust_dec_to_u256, u256_to_rust_dec};
use crate::validation::{validate_new_wallet, NewWallet};
use crate::{err_create, err_from};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Connection, SqliteConnection};
use std::str::FromStr;
use tokio::sync::Mutex;
use web3::types::Address;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub to: String,
    pub amount: Decimal,
}

fn decimals(wallet_type: WalletType, chain_setup: &ChainSetup) -> u32 {
    match wallet_type {
        WalletType::Eth => 18,
        WalletType::Usdc => chain_setup.usdc_decimals,
    }
}

pub async fn get_wallet_or_err(
    conn: &mut SqliteConnection,
    wallet_id: i64,
) -> Result<WalletDao, InvoiceError> {
    get_wallet(conn, wallet_id)
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_create!(NotFoundError::new("Wallet", wallet_id)))
}

pub async fn read_chain_balance(
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    wallet_type: WalletType,
    address: Address,
) -> Result<Decimal, InvoiceError> {
    let balance = match wallet_type {
        WalletType::Eth => chain.native_balance(address).await?,
        WalletType::Usdc => chain.token_balance(chain_setup.usdc()?, address).await?,
    };
    u256_to_rust_dec(balance, decimals(wallet_type, chain_setup)).map_err(err_from!())
}

/// Registers a wallet with its current on-chain balance. The first wallet of a
/// type becomes the default one.
pub async fn connect_wallet(
    conn: &Mutex<SqliteConnection>,
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    new_wallet: &NewWallet,
) -> Result<WalletDao, InvoiceError> {
    let wallet_type = validate_new_wallet(new_wallet)?;
    let address = parse_address("wallet_address", &new_wallet.wallet_address)?;
    let balance = read_chain_balance(chain, chain_setup, wallet_type, address).await?;

    let mut db_conn = conn.lock().await;
    let mut db_transaction = db_conn.begin().await.map_err(err_from!())?;
    let is_default = get_default_wallet(&mut db_transaction, wallet_type.as_str())
        .await
        .map_err(err_from!())?
        .is_none();
    let wallet = insert_wallet(
        &mut db_transaction,
        &WalletDao {
            id: 0,
            wallet_address: format_address(address),
            wallet_type: wallet_type.to_string(),
            label: new_wallet
                .label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            balance: balance.to_string(),
            is_default,
            created_date: chrono::Utc::now(),
        },
    )
    .await
    .map_err(err_from!())?;
    db_transaction.commit().await.map_err(err_from!())?;
    log::info!(
        "Connected {} wallet {} with balance {}",
        wallet.wallet_type,
        wallet.wallet_address,
        wallet.balance
    );
    Ok(wallet)
}

pub async fn set_default_wallet(
    conn: &mut SqliteConnection,
    wallet_id: i64,
) -> Result<WalletDao, InvoiceError> {
    let mut db_transaction = conn.begin().await.map_err(err_from!())?;
    let mut wallet = get_wallet_or_err(&mut db_transaction, wallet_id).await?;
    clear_default_wallets(&mut db_transaction, &wallet.wallet_type)
        .await
        .map_err(err_from!())?;
    wallet.is_default = true;
    let wallet = update_wallet(&mut db_transaction, &wallet)
        .await
        .map_err(err_from!())?;
    db_transaction.commit().await.map_err(err_from!())?;
    log::info!("Wallet {} is now the default {} wallet", wallet.id, wallet.wallet_type);
    Ok(wallet)
}

pub async fn set_wallet_balance(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    balance: Decimal,
) -> Result<WalletDao, InvoiceError> {
    if balance.is_sign_negative() {
        return Err(err_create!(ValidationError::new(
            "balance",
            "cannot be negative"
        )));
    }
    let mut wallet = get_wallet_or_err(conn, wallet_id).await?;
    wallet.balance = balance.normalize().to_string();
    update_wallet(conn, &wallet).await.map_err(err_from!())
}

pub async fn list_wallets(conn: &mut SqliteConnection) -> Result<Vec<WalletDao>, InvoiceError> {
    get_all_wallets(conn).await.map_err(err_from!())
}

pub async fn remove_wallet(
    conn: &mut SqliteConnection,
    wallet_id: i64,
) -> Result<(), InvoiceError> {
    if !delete_wallet(conn, wallet_id).await.map_err(err_from!())? {
        return Err(err_create!(NotFoundError::new("Wallet", wallet_id)));
    }
    log::info!("Deleted wallet {}", wallet_id);
    Ok(())
}

/// Sends funds out of a wallet controlled by the service key and books the
/// withdrawal against the stored balance. One withdrawal per wallet at a time.
pub async fn withdraw(
    conn: &Mutex<SqliteConnection>,
    shared_state: &Mutex<SharedState>,
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    wallet_id: i64,
    request: &WithdrawRequest,
) -> Result<TxDao, InvoiceError> {
    with_wallet_guard(
        shared_state,
        wallet_id,
        withdraw_inner(conn, chain, chain_setup, wallet_id, request),
    )
    .await
}

async fn withdraw_inner(
    conn: &Mutex<SqliteConnection>,
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    wallet_id: i64,
    request: &WithdrawRequest,
) -> Result<TxDao, InvoiceError> {
    let to = parse_address("to", &request.to)?;
    if request.amount <= Decimal::ZERO {
        return Err(err_create!(ValidationError::new(
            "amount",
            "must be greater than zero"
        )));
    }
    let wallet = {
        let mut db_conn = conn.lock().await;
        get_wallet_or_err(&mut db_conn, wallet_id).await?
    };
    let wallet_type = WalletType::from_str(&wallet.wallet_type)?;
    let sender = chain.sender()?;
    if parse_address("wallet_address", &wallet.wallet_address)? != sender {
        return Err(err_create!(ValidationError::new(
            "wallet_address",
            "wallet is not controlled by the service key"
        )));
    }
    let balance = parse_decimal(&wallet.balance).map_err(err_from!())?;
    if request.amount > balance {
        return Err(err_create!(ValidationError::new(
            "amount",
            &format!("exceeds wallet balance {balance}")
        )));
    }

    let units = rust_dec_to_u256(request.amount, decimals(wallet_type, chain_setup))
        .map_err(err_from!())?;
    let call = match wallet_type {
        WalletType::Eth => create_eth_transfer(to, units),
        WalletType::Usdc => create_erc20_transfer(chain_setup.usdc()?, to, units)?,
    };
    log::info!(
        "Withdrawing {} {} from wallet {} to {:#x}",
        request.amount,
        wallet_type.currency(),
        wallet.id,
        to
    );
    let receipt = chain.submit_and_wait(&call).await?;
    let fee_paid = u256_to_rust_dec(receipt.fee_paid, 18).map_err(err_from!())?;

    let mut db_conn = conn.lock().await;
    let mut db_transaction = db_conn.begin().await.map_err(err_from!())?;
    // re-read, the balance may have been set while the transfer was pending
    let mut wallet = get_wallet_or_err(&mut db_transaction, wallet_id).await?;
    let balance = parse_decimal(&wallet.balance).map_err(err_from!())?;
    if request.amount > balance {
        log::warn!(
            "Wallet {} balance was set to {} while withdrawing {}, booking it as empty",
            wallet.id,
            balance,
            request.amount
        );
    }
    wallet.balance = (balance - request.amount)
        .max(Decimal::ZERO)
        .normalize()
        .to_string();
    update_wallet(&mut db_transaction, &wallet)
        .await
        .map_err(err_from!())?;
    let tx = insert_tx(
        &mut db_transaction,
        &TxDao {
            id: 0,
            invoice_id: None,
            wallet_id: Some(wallet.id),
            transaction_type: TransactionType::Withdrawal.to_string(),
            amount: request.amount.normalize().to_string(),
            currency: wallet_type.currency().to_string(),
            chain_id: chain.chain_id(),
            tx_hash: Some(receipt.tx_hash_str()),
            status: TransactionStatus::Confirmed.to_string(),
            fee_paid: Some(fee_paid.to_string()),
            error: None,
            created_date: chrono::Utc::now(),
        },
    )
    .await
    .map_err(err_from!())?;
    db_transaction.commit().await.map_err(err_from!())?;
    Ok(tx)
}
