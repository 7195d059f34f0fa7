use crate::chain::ChainClient;
use crate::contracts::get_escrow_event_signature;
use crate::db::model::{InvoiceDao, TxDao};
use crate::db::ops::*;
use crate::error::{InvoiceError, ValidationError};
use crate::eth::{format_address, invoice_key, parse_address};
use crate::model::{CryptoCurrency, InvoiceStatus, TransactionStatus, TransactionType};
use crate::runtime::{with_invoice_guard, SharedState};
use crate::service::get_invoice_or_err;
use crate::setup::ChainSetup;
use crate::transaction::{
    create_erc20_approve, create_escrow_deposit, create_escrow_release, ReceiptInfo,
};
use crate::utils::{parse_decimal, rust_dec_to_u256, u256_to_rust_dec};
use crate::{err_create, err_from};
use sqlx::{Connection, SqliteConnection};
use std::str::FromStr;
use tokio::sync::Mutex;
use web3::types::{Address, U256};

pub const SECONDS_PER_DAY: i64 = 86400;

fn token_decimals(crypto_currency: CryptoCurrency, chain_setup: &ChainSetup) -> u32 {
    match crypto_currency {
        CryptoCurrency::Eth => 18,
        CryptoCurrency::Usdc => chain_setup.usdc_decimals,
    }
}

fn check_event(receipt: &ReceiptInfo, contract: Address, event: &str) {
    match get_escrow_event_signature(event) {
        Ok(signature) if receipt.has_event(contract, signature) => {}
        Ok(_) => log::warn!(
            "No {} event from escrow {:#x} in tx {}",
            event,
            contract,
            receipt.tx_hash_str()
        ),
        Err(err) => log::error!("Cannot resolve {} event signature: {}", event, err),
    }
}

fn escrow_tx_row(
    invoice: &InvoiceDao,
    transaction_type: TransactionType,
    chain_id: i64,
    receipt: &ReceiptInfo,
    fee_paid: U256,
) -> Result<TxDao, InvoiceError> {
    Ok(TxDao {
        id: 0,
        invoice_id: Some(invoice.id),
        wallet_id: None,
        transaction_type: transaction_type.to_string(),
        amount: invoice.amount.clone(),
        currency: invoice.crypto_currency.clone(),
        chain_id,
        tx_hash: Some(receipt.tx_hash_str()),
        status: TransactionStatus::Confirmed.to_string(),
        fee_paid: Some(u256_to_rust_dec(fee_paid, 18).map_err(err_from!())?.to_string()),
        error: None,
        created_date: chrono::Utc::now(),
    })
}

/// Locks the invoice amount in the escrow contract on behalf of `recipient`
/// (the invoice's recipient wallet when not given). USDC needs an allowance,
/// so an `approve` is sent and confirmed before the deposit.
pub async fn escrow_deposit(
    conn: &Mutex<SqliteConnection>,
    shared_state: &Mutex<SharedState>,
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    invoice_id: i64,
    recipient: Option<&str>,
) -> Result<InvoiceDao, InvoiceError> {
    with_invoice_guard(
        shared_state,
        invoice_id,
        deposit_inner(conn, chain, chain_setup, invoice_id, recipient),
    )
    .await
}

async fn deposit_inner(
    conn: &Mutex<SqliteConnection>,
    chain: &dyn ChainClient,
    chain_setup: &ChainSetup,
    invoice_id: i64,
    recipient: Option<&str>,
) -> Result<InvoiceDao, InvoiceError> {
    let mut invoice = {
        let mut db_conn = conn.lock().await;
        get_invoice_or_err(&mut db_conn, invoice_id).await?
    };
    if !invoice.escrow_enabled {
        return Err(err_create!(ValidationError::new(
            "escrow_enabled",
            "escrow is not enabled for this invoice"
        )));
    }
    let recipient = recipient
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .or(invoice.recipient_wallet.as_deref())
        .ok_or_else(|| err_create!(ValidationError::new("recipient", "is required")))?;
    let payee = parse_address("recipient", recipient)?;

    match InvoiceStatus::from_str(&invoice.status) {
        Ok(InvoiceStatus::Draft | InvoiceStatus::Pending) => {}
        _ => log::warn!(
            "Escrow deposit for invoice {} in status {}",
            invoice.invoice_number,
            invoice.status
        ),
    }

    let crypto_currency = CryptoCurrency::from_str(&invoice.crypto_currency)?;
    let amount = parse_decimal(&invoice.amount).map_err(err_from!())?;
    let amount = rust_dec_to_u256(amount, token_decimals(crypto_currency, chain_setup))
        .map_err(err_from!())?;
    let escrow = chain_setup.escrow_contract()?;
    let release_after =
        U256::from((chrono::Utc::now().timestamp() + invoice.escrow_days * SECONDS_PER_DAY) as u64);
    let key = invoice_key(&invoice.payment_id);

    let mut fee_paid = U256::zero();
    let token = match crypto_currency {
        CryptoCurrency::Eth => None,
        CryptoCurrency::Usdc => {
            let usdc = chain_setup.usdc()?;
            let approve = create_erc20_approve(usdc, escrow, amount)?;
            let receipt = chain.submit_and_wait(&approve).await?;
            fee_paid += receipt.fee_paid;
            Some(usdc)
        }
    };
    log::info!(
        "Depositing {} {} for invoice {} into escrow {:#x}, payee {:#x}",
        invoice.amount,
        crypto_currency,
        invoice.invoice_number,
        escrow,
        payee
    );
    let deposit = create_escrow_deposit(escrow, key, payee, token, amount, release_after)?;
    let receipt = chain.submit_and_wait(&deposit).await?;
    fee_paid += receipt.fee_paid;
    check_event(&receipt, escrow, "Deposited");

    let now = chrono::Utc::now();
    invoice.status = InvoiceStatus::EscrowHeld.to_string();
    invoice.escrow_contract = Some(format_address(escrow));
    invoice.escrow_tx_hash = Some(receipt.tx_hash_str());
    invoice.recipient_wallet = Some(format_address(payee));
    invoice.updated_date = now;
    let tx = escrow_tx_row(
        &invoice,
        TransactionType::Payment,
        chain.chain_id(),
        &receipt,
        fee_paid,
    )?;

    let mut db_conn = conn.lock().await;
    let mut db_transaction = db_conn.begin().await.map_err(err_from!())?;
    update_invoice(&mut db_transaction, &invoice)
        .await
        .map_err(err_from!())?;
    insert_tx(&mut db_transaction, &tx)
        .await
        .map_err(err_from!())?;
    db_transaction.commit().await.map_err(err_from!())?;
    log::info!(
        "Invoice {} held in escrow, tx_hash: {}",
        invoice.invoice_number,
        receipt.tx_hash_str()
    );
    Ok(invoice)
}

/// Releases escrowed funds to the payee through the contract the deposit went to.
pub async fn escrow_release(
    conn: &Mutex<SqliteConnection>,
    shared_state: &Mutex<SharedState>,
    chain: &dyn ChainClient,
    invoice_id: i64,
) -> Result<InvoiceDao, InvoiceError> {
    with_invoice_guard(
        shared_state,
        invoice_id,
        release_inner(conn, chain, invoice_id),
    )
    .await
}

async fn release_inner(
    conn: &Mutex<SqliteConnection>,
    chain: &dyn ChainClient,
    invoice_id: i64,
) -> Result<InvoiceDao, InvoiceError> {
    let mut invoice = {
        let mut db_conn = conn.lock().await;
        get_invoice_or_err(&mut db_conn, invoice_id).await?
    };
    let escrow = match invoice.escrow_contract.as_deref() {
        Some(escrow) => parse_address("escrow_contract", escrow)?,
        None => {
            return Err(err_create!(ValidationError::new(
                "escrow_contract",
                "invoice has no escrow deposit"
            )))
        }
    };
    if invoice.status != InvoiceStatus::EscrowHeld.as_str() {
        log::warn!(
            "Escrow release for invoice {} in status {}",
            invoice.invoice_number,
            invoice.status
        );
    }

    let release = create_escrow_release(escrow, invoice_key(&invoice.payment_id))?;
    let receipt = chain.submit_and_wait(&release).await?;
    check_event(&receipt, escrow, "Released");

    let now = chrono::Utc::now();
    invoice.status = InvoiceStatus::EscrowReleased.to_string();
    invoice.release_tx_hash = Some(receipt.tx_hash_str());
    invoice.paid_date = Some(now);
    invoice.updated_date = now;
    let tx = escrow_tx_row(
        &invoice,
        TransactionType::EscrowRelease,
        chain.chain_id(),
        &receipt,
        receipt.fee_paid,
    )?;

    let mut db_conn = conn.lock().await;
    let mut db_transaction = db_conn.begin().await.map_err(err_from!())?;
    update_invoice(&mut db_transaction, &invoice)
        .await
        .map_err(err_from!())?;
    insert_tx(&mut db_transaction, &tx)
        .await
        .map_err(err_from!())?;
    db_transaction.commit().await.map_err(err_from!())?;
    log::info!(
        "Escrow released for invoice {}, tx_hash: {}",
        invoice.invoice_number,
        receipt.tx_hash_str()
    );
    Ok(invoice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::db::create_sqlite_connection;
    use crate::service::{create_invoice, new_invoice};
    use crate::setup::test_chain_setup;

    const PAYEE: &str = "0x00000000000000000000000000000000000000b0";

    async fn setup_invoice(crypto: &str, escrow_enabled: bool) -> (Mutex<SqliteConnection>, i64) {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let mut invoice = new_invoice("Audit");
        invoice.crypto_currency = crypto.to_string();
        invoice.escrow_enabled = escrow_enabled;
        invoice.escrow_days = if escrow_enabled { 14 } else { 0 };
        invoice.submit = true;
        let details = create_invoice(&mut conn, &invoice).await.unwrap();
        (Mutex::new(conn), details.invoice.id)
    }

    async fn invoice_transactions(conn: &Mutex<SqliteConnection>, id: i64) -> Vec<TxDao> {
        let mut db_conn = conn.lock().await;
        get_transactions_by_invoice(&mut db_conn, id).await.unwrap()
    }

    #[tokio::test]
    async fn test_eth_deposit_and_release() {
        let (conn, id) = setup_invoice("ETH", true).await;
        let state = Mutex::new(SharedState::default());
        let chain = MockChainClient::new();
        let chain_setup = test_chain_setup();

        let invoice = escrow_deposit(&conn, &state, &chain, &chain_setup, id, Some(PAYEE))
            .await
            .unwrap();
        assert_eq!(invoice.status, "escrow_held");
        assert_eq!(
            invoice.escrow_contract,
            Some(format_address(Address::repeat_byte(0xe5)))
        );
        assert_eq!(invoice.recipient_wallet.as_deref(), Some(PAYEE));
        assert!(invoice.escrow_tx_hash.is_some());

        let submitted = chain.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].method, "ESCROW.deposit");
        assert_eq!(
            submitted[0].value,
            U256::from_dec_str("500000000000000000").unwrap()
        );

        let invoice = escrow_release(&conn, &state, &chain, id).await.unwrap();
        assert_eq!(invoice.status, "escrow_released");
        assert!(invoice.release_tx_hash.is_some());
        assert!(invoice.paid_date.is_some());
        assert_eq!(
            chain.submitted_methods(),
            vec!["ESCROW.deposit", "ESCROW.release"]
        );

        let txs = invoice_transactions(&conn, id).await;
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].transaction_type, "payment");
        assert_eq!(txs[1].transaction_type, "escrow_release");
        assert!(state.lock().await.invoices_in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_usdc_deposit_approves_first() {
        let (conn, id) = setup_invoice("USDC", true).await;
        let state = Mutex::new(SharedState::default());
        let chain = MockChainClient::new();

        let invoice = escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, Some(PAYEE))
            .await
            .unwrap();
        assert_eq!(invoice.status, "escrow_held");
        let submitted = chain.submitted.lock().unwrap().clone();
        assert_eq!(submitted[0].method, "ERC20.approve");
        assert_eq!(submitted[0].to, Address::repeat_byte(0x0c));
        assert_eq!(submitted[1].method, "ESCROW.deposit");
        assert_eq!(submitted[1].value, U256::zero());

        let txs = invoice_transactions(&conn, id).await;
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].currency, "USDC");
        assert_eq!(txs[0].fee_paid.as_deref(), Some("0.000000000000042"));
    }

    #[tokio::test]
    async fn test_reverted_deposit_leaves_rows_untouched() {
        let (conn, id) = setup_invoice("ETH", true).await;
        let state = Mutex::new(SharedState::default());
        let mut chain = MockChainClient::new();
        chain.revert = true;

        assert!(
            escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, Some(PAYEE))
                .await
                .is_err()
        );
        let mut db_conn = conn.lock().await;
        let invoice = get_invoice_or_err(&mut db_conn, id).await.unwrap();
        assert_eq!(invoice.status, "pending");
        assert_eq!(invoice.escrow_tx_hash, None);
        drop(db_conn);
        assert!(invoice_transactions(&conn, id).await.is_empty());
        assert!(state.lock().await.invoices_in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let (conn, id) = setup_invoice("ETH", true).await;
        let state = Mutex::new(SharedState::default());
        let mut chain = MockChainClient::new();
        chain.fail_submit = true;

        let err = escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, Some(PAYEE))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("User rejected"));
        assert!(invoice_transactions(&conn, id).await.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_preconditions() {
        let state = Mutex::new(SharedState::default());
        let chain = MockChainClient::new();

        let (conn, id) = setup_invoice("ETH", false).await;
        let err = escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, Some(PAYEE))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let (conn, id) = setup_invoice("ETH", true).await;
        let err = escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = escrow_release(&conn, &state, &chain, id).await.unwrap_err();
        assert!(err.is_validation());

        let err = escrow_release(&conn, &state, &chain, 999).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(chain.submitted_methods().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let (conn, id) = setup_invoice("ETH", true).await;
        let state = Mutex::new(SharedState::default());
        let _slot = state.lock().await.begin_chain_operation(id).unwrap();
        let chain = MockChainClient::new();
        let err = escrow_deposit(&conn, &state, &chain, &test_chain_setup(), id, Some(PAYEE))
            .await
            .unwrap_err();
        assert!(matches!(
            err.inner,
            crate::error::ErrorBag::AlreadyProcessingError(_)
        ));
        assert!(chain.submitted_methods().is_empty());
    }
}
