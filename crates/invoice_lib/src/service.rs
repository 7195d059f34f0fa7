use crate::chain::ChainClient;
use crate::db::model::*;
use crate::db::ops::*;
use crate::error::{InvoiceError, NotFoundError, ValidationError};
use crate::model::{CryptoCurrency, InvoiceStatus, TransactionStatus, TransactionType};
use crate::search::{filter_invoices, summarize_invoices, InvoiceFilter, InvoiceSummary};
use crate::totals::{invoice_amount, stored_items_total};
use crate::utils::{format_money, u256_to_rust_dec};
use crate::validation::{validate_new_invoice, NewInvoice};
use crate::{err_create, err_from};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use std::str::FromStr;
use tokio::sync::Mutex;
use web3::types::H256;

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub invoice: InvoiceDao,
    pub status_label: &'static str,
    pub items: Vec<InvoiceItemDao>,
    /// Sum of the stored line items, absent for invoices without items.
    pub items_total: Option<String>,
    pub client: Option<ClientDao>,
    pub transactions: Vec<TxDao>,
}

pub async fn get_invoice_or_err(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<InvoiceDao, InvoiceError> {
    get_invoice(conn, invoice_id)
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_create!(NotFoundError::new("Invoice", invoice_id)))
}

pub async fn create_invoice(
    conn: &mut SqliteConnection,
    new_invoice: &NewInvoice,
) -> Result<InvoiceDetails, InvoiceError> {
    let crypto_currency = validate_new_invoice(new_invoice)?;
    if let Some(client_id) = new_invoice.client_id {
        if get_client(conn, client_id)
            .await
            .map_err(err_from!())?
            .is_none()
        {
            return Err(err_create!(ValidationError::new(
                "client_id",
                &format!("client {client_id} does not exist")
            )));
        }
    }

    let amount = invoice_amount(new_invoice)?;
    let now = chrono::Utc::now();
    let status = if new_invoice.submit {
        InvoiceStatus::Pending
    } else {
        InvoiceStatus::Draft
    };

    let mut db_transaction = conn.begin().await.map_err(err_from!())?;
    let invoice_number = next_invoice_number(&mut db_transaction)
        .await
        .map_err(err_from!())?;
    let invoice = insert_invoice(
        &mut db_transaction,
        &InvoiceDao {
            id: 0,
            invoice_number,
            payment_id: uuid::Uuid::new_v4().to_string(),
            title: new_invoice.title.trim().to_string(),
            description: new_invoice.description.clone(),
            amount: format_money(amount),
            currency: new_invoice.currency.trim().to_uppercase(),
            crypto_currency: crypto_currency.to_string(),
            status: status.to_string(),
            escrow_enabled: new_invoice.escrow_enabled,
            escrow_days: new_invoice.escrow_days,
            escrow_contract: None,
            escrow_tx_hash: None,
            release_tx_hash: None,
            payment_tx_hash: None,
            recipient_wallet: new_invoice
                .recipient_wallet
                .as_deref()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
            due_date: new_invoice.due_date,
            client_id: new_invoice.client_id,
            created_date: now,
            updated_date: now,
            paid_date: None,
        },
    )
    .await
    .map_err(err_from!())?;

    let mut items = Vec::with_capacity(new_invoice.items.len());
    for item in &new_invoice.items {
        items.push(
            insert_invoice_item(
                &mut db_transaction,
                &InvoiceItemDao {
                    id: 0,
                    invoice_id: invoice.id,
                    description: item.description.trim().to_string(),
                    quantity: item.quantity.to_string(),
                    unit_price: item.unit_price.to_string(),
                },
            )
            .await
            .map_err(err_from!())?,
        );
    }
    db_transaction.commit().await.map_err(err_from!())?;
    log::info!(
        "Created invoice {} ({}) for {} {}",
        invoice.invoice_number,
        invoice.id,
        invoice.amount,
        invoice.crypto_currency
    );

    get_invoice_details(conn, invoice.id).await
}

pub async fn get_invoice_details(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<InvoiceDetails, InvoiceError> {
    let invoice = get_invoice_or_err(conn, invoice_id).await?;
    let items = get_invoice_items(conn, invoice_id)
        .await
        .map_err(err_from!())?;
    let client = match invoice.client_id {
        Some(client_id) => get_client(conn, client_id).await.map_err(err_from!())?,
        None => None,
    };
    let transactions = get_transactions_by_invoice(conn, invoice_id)
        .await
        .map_err(err_from!())?;
    let status_label = InvoiceStatus::from_str(&invoice.status)
        .map(|s| s.label())
        .unwrap_or("Unknown");
    let items_total = if items.is_empty() {
        None
    } else {
        Some(format_money(stored_items_total(&items)?))
    };
    Ok(InvoiceDetails {
        invoice,
        status_label,
        items,
        items_total,
        client,
        transactions,
    })
}

pub async fn list_invoices(
    conn: &mut SqliteConnection,
    filter: &InvoiceFilter,
) -> Result<Vec<InvoiceSummary>, InvoiceError> {
    let invoices = get_invoices(conn, None, None, None)
        .await
        .map_err(err_from!())?;
    let clients = get_all_clients(conn).await.map_err(err_from!())?;
    Ok(filter_invoices(summarize_invoices(invoices, &clients), filter))
}

/// Transition legality is reported but not enforced, the last write wins.
pub async fn update_invoice_status(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    status: InvoiceStatus,
) -> Result<InvoiceDao, InvoiceError> {
    let mut invoice = get_invoice_or_err(conn, invoice_id).await?;
    match InvoiceStatus::from_str(&invoice.status) {
        Ok(current) if !current.can_transition_to(status) => {
            log::warn!(
                "Invoice {} moves from {} to {} outside of the usual lifecycle",
                invoice.invoice_number,
                current,
                status
            );
        }
        Ok(_) => {}
        Err(err) => log::warn!("Invoice {} has unknown status: {}", invoice_id, err),
    }
    let now = chrono::Utc::now();
    invoice.status = status.to_string();
    invoice.updated_date = now;
    if status.is_settled() && invoice.paid_date.is_none() {
        invoice.paid_date = Some(now);
    }
    update_invoice(conn, &invoice).await.map_err(err_from!())?;
    log::info!("Invoice {} status set to {}", invoice.invoice_number, status);
    Ok(invoice)
}

pub async fn remove_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<(), InvoiceError> {
    if !delete_invoice(conn, invoice_id).await.map_err(err_from!())? {
        return Err(err_create!(NotFoundError::new("Invoice", invoice_id)));
    }
    log::info!("Deleted invoice {}", invoice_id);
    Ok(())
}

pub async fn get_transaction_or_err(
    conn: &mut SqliteConnection,
    tx_id: i64,
) -> Result<TxDao, InvoiceError> {
    get_tx(conn, tx_id)
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_create!(NotFoundError::new("Transaction", tx_id)))
}

/// Transactions are append only, only their status and error can change.
pub async fn set_transaction_status(
    conn: &mut SqliteConnection,
    tx_id: i64,
    status: TransactionStatus,
    error: Option<&str>,
) -> Result<TxDao, InvoiceError> {
    if !update_tx_status(conn, tx_id, status.as_str(), error)
        .await
        .map_err(err_from!())?
    {
        return Err(err_create!(NotFoundError::new("Transaction", tx_id)));
    }
    get_transaction_or_err(conn, tx_id).await
}

pub fn parse_tx_hash(tx_hash: &str) -> Result<H256, InvoiceError> {
    let trimmed = tx_hash.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.len() != 64 {
        return Err(err_create!(ValidationError::new(
            "tx_hash",
            "must be 32 bytes long"
        )));
    }
    H256::from_str(hex_part)
        .map_err(|_| err_create!(ValidationError::new("tx_hash", "is not valid hex")))
}

/// Direct payment made by the client from their own wallet. The receipt is read
/// from chain; a reverted transaction is logged as failed and the invoice stays as is.
pub async fn record_payment(
    conn: &Mutex<SqliteConnection>,
    chain: &dyn ChainClient,
    invoice_id: i64,
    tx_hash: &str,
) -> Result<TxDao, InvoiceError> {
    let tx_hash = parse_tx_hash(tx_hash)?;
    let invoice = {
        let mut db_conn = conn.lock().await;
        get_invoice_or_err(&mut db_conn, invoice_id).await?
    };
    let crypto_currency = CryptoCurrency::from_str(&invoice.crypto_currency)?;

    let receipt = chain
        .find_receipt(tx_hash)
        .await?
        .ok_or_else(|| {
            err_create!(ValidationError::new(
                "tx_hash",
                &format!("no mined transaction {:#x}", tx_hash)
            ))
        })?;

    let fee_paid = u256_to_rust_dec(receipt.fee_paid, 18).map_err(err_from!())?;
    let status = if receipt.success {
        TransactionStatus::Confirmed
    } else {
        TransactionStatus::Failed
    };
    let tx = TxDao {
        id: 0,
        invoice_id: Some(invoice.id),
        wallet_id: None,
        transaction_type: TransactionType::Payment.to_string(),
        amount: invoice.amount.clone(),
        currency: crypto_currency.to_string(),
        chain_id: chain.chain_id(),
        tx_hash: Some(receipt.tx_hash_str()),
        status: status.to_string(),
        fee_paid: Some(fee_paid.to_string()),
        error: (!receipt.success).then(|| "transaction reverted".to_string()),
        created_date: chrono::Utc::now(),
    };

    let mut db_conn = conn.lock().await;
    let mut db_transaction = db_conn.begin().await.map_err(err_from!())?;
    let tx = insert_tx(&mut db_transaction, &tx).await.map_err(err_from!())?;
    if receipt.success {
        let mut invoice = invoice;
        let now = chrono::Utc::now();
        invoice.status = InvoiceStatus::Paid.to_string();
        invoice.payment_tx_hash = Some(receipt.tx_hash_str());
        invoice.paid_date = Some(now);
        invoice.updated_date = now;
        update_invoice(&mut db_transaction, &invoice)
            .await
            .map_err(err_from!())?;
        log::info!(
            "Invoice {} paid, tx_hash: {}",
            invoice.invoice_number,
            receipt.tx_hash_str()
        );
    } else {
        log::warn!(
            "Payment for invoice {} reverted, tx_hash: {}",
            invoice_id,
            receipt.tx_hash_str()
        );
    }
    db_transaction.commit().await.map_err(err_from!())?;
    Ok(tx)
}

#[cfg(test)]
pub(crate) fn new_invoice(title: &str) -> NewInvoice {
    NewInvoice {
        title: title.to_string(),
        amount: Some(rust_decimal::Decimal::new(5, 1)),
        currency: "usd".to_string(),
        crypto_currency: "eth".to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::db::create_sqlite_connection;
    use crate::transaction::ReceiptInfo;
    use crate::validation::NewInvoiceItem;
    use rust_decimal::Decimal;
    use web3::types::U256;

    #[tokio::test]
    async fn test_create_invoice_with_items() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let mut invoice = new_invoice("Backend work");
        invoice.items = vec![
            NewInvoiceItem {
                description: "API".to_string(),
                quantity: Decimal::from(2),
                unit_price: Decimal::from_str("100.125").unwrap(),
            },
            NewInvoiceItem {
                description: "Review".to_string(),
                quantity: Decimal::from(1),
                unit_price: Decimal::from_str("49.99").unwrap(),
            },
        ];
        invoice.submit = true;
        let details = create_invoice(&mut conn, &invoice).await.unwrap();
        assert_eq!(details.invoice.invoice_number, "INV-00001");
        assert_eq!(details.invoice.amount, "250.24");
        assert_eq!(details.invoice.currency, "USD");
        assert_eq!(details.invoice.crypto_currency, "ETH");
        assert_eq!(details.invoice.status, "pending");
        assert_eq!(details.status_label, "Pending");
        assert_eq!(details.items.len(), 2);
        assert_eq!(details.items_total.as_deref(), Some("250.24"));

        let second = create_invoice(&mut conn, &new_invoice("Second")).await.unwrap();
        assert_eq!(second.invoice.invoice_number, "INV-00002");
        assert_eq!(second.invoice.status, "draft");
        assert_ne!(second.invoice.payment_id, details.invoice.payment_id);
    }

    #[tokio::test]
    async fn test_create_invoice_rejects_invalid() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let mut invoice = new_invoice("");
        let err = create_invoice(&mut conn, &invoice).await.unwrap_err();
        assert!(err.is_validation());

        invoice.title = "ok".to_string();
        invoice.client_id = Some(42);
        let err = create_invoice(&mut conn, &invoice).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(get_invoice_count(&mut conn, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_update_is_not_enforced() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let created = create_invoice(&mut conn, &new_invoice("Work")).await.unwrap();
        let id = created.invoice.id;

        let invoice = update_invoice_status(&mut conn, id, InvoiceStatus::Paid)
            .await
            .unwrap();
        assert_eq!(invoice.status, "paid");
        assert!(invoice.paid_date.is_some());

        let invoice = update_invoice_status(&mut conn, id, InvoiceStatus::Draft)
            .await
            .unwrap();
        assert_eq!(invoice.status, "draft");

        let err = update_invoice_status(&mut conn, 999, InvoiceStatus::Paid)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_invoice() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let created = create_invoice(&mut conn, &new_invoice("Work")).await.unwrap();
        remove_invoice(&mut conn, created.invoice.id).await.unwrap();
        assert!(remove_invoice(&mut conn, created.invoice.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_record_payment() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let created = create_invoice(&mut conn, &new_invoice("Work")).await.unwrap();
        let conn = Mutex::new(conn);

        let chain = MockChainClient::new();
        let tx_hash = H256::repeat_byte(0x11);
        chain.add_receipt(ReceiptInfo {
            tx_hash,
            block_number: 5,
            success: true,
            fee_paid: U256::from(1_000_000_000u64),
            logs: vec![],
        });

        let tx = record_payment(&conn, &chain, created.invoice.id, &format!("{:#x}", tx_hash))
            .await
            .unwrap();
        assert_eq!(tx.status, "confirmed");
        assert_eq!(tx.transaction_type, "payment");
        assert_eq!(tx.amount, "0.50");
        assert_eq!(tx.fee_paid.as_deref(), Some("0.000000001"));

        let mut db_conn = conn.lock().await;
        let details = get_invoice_details(&mut db_conn, created.invoice.id)
            .await
            .unwrap();
        assert_eq!(details.invoice.status, "paid");
        assert_eq!(details.invoice.payment_tx_hash, Some(format!("{:#x}", tx_hash)));
        assert_eq!(details.transactions.len(), 1);

        let tx = set_transaction_status(&mut db_conn, tx.id, TransactionStatus::Failed, Some("reorg"))
            .await
            .unwrap();
        assert_eq!(tx.status, "failed");
        assert_eq!(tx.error.as_deref(), Some("reorg"));
        assert!(set_transaction_status(&mut db_conn, 999, TransactionStatus::Failed, None)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_record_reverted_payment_keeps_invoice() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let created = create_invoice(&mut conn, &new_invoice("Work")).await.unwrap();
        let conn = Mutex::new(conn);

        let chain = MockChainClient::new();
        let tx_hash = H256::repeat_byte(0x22);
        chain.add_receipt(ReceiptInfo {
            tx_hash,
            block_number: 5,
            success: false,
            fee_paid: U256::zero(),
            logs: vec![],
        });
        let tx = record_payment(&conn, &chain, created.invoice.id, &format!("{:#x}", tx_hash))
            .await
            .unwrap();
        assert_eq!(tx.status, "failed");

        let mut db_conn = conn.lock().await;
        let invoice = get_invoice_or_err(&mut db_conn, created.invoice.id)
            .await
            .unwrap();
        assert_eq!(invoice.status, "draft");
    }

    #[tokio::test]
    async fn test_record_payment_unknown_hash() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let created = create_invoice(&mut conn, &new_invoice("Work")).await.unwrap();
        let conn = Mutex::new(conn);
        let chain = MockChainClient::new();
        assert!(record_payment(&conn, &chain, created.invoice.id, "0x1234")
            .await
            .unwrap_err()
            .is_validation());
        assert!(record_payment(
            &conn,
            &chain,
            created.invoice.id,
            &format!("{:#x}", H256::repeat_byte(0x33))
        )
        .await
        .unwrap_err()
        .is_validation());
        let mut db_conn = conn.lock().await;
        assert!(get_transactions(&mut db_conn, None, None, None)
            .await
            .unwrap()
            .is_empty());
    }
}
