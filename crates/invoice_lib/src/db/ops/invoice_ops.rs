use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_invoice(
    conn: &mut SqliteConnection,
    invoice: &InvoiceDao,
) -> Result<InvoiceDao, sqlx::Error> {
    let res = sqlx::query_as::<_, InvoiceDao>(
        r"INSERT INTO invoice
(invoice_number, payment_id, title, description, amount, currency, crypto_currency, status,
escrow_enabled, escrow_days, escrow_contract, escrow_tx_hash, release_tx_hash, payment_tx_hash,
recipient_wallet, due_date, client_id, created_date, updated_date, paid_date)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) RETURNING *;
",
    )
    .bind(&invoice.invoice_number)
    .bind(&invoice.payment_id)
    .bind(&invoice.title)
    .bind(&invoice.description)
    .bind(&invoice.amount)
    .bind(&invoice.currency)
    .bind(&invoice.crypto_currency)
    .bind(&invoice.status)
    .bind(invoice.escrow_enabled)
    .bind(invoice.escrow_days)
    .bind(&invoice.escrow_contract)
    .bind(&invoice.escrow_tx_hash)
    .bind(&invoice.release_tx_hash)
    .bind(&invoice.payment_tx_hash)
    .bind(&invoice.recipient_wallet)
    .bind(invoice.due_date)
    .bind(invoice.client_id)
    .bind(invoice.created_date)
    .bind(invoice.updated_date)
    .bind(invoice.paid_date)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn update_invoice(
    conn: &mut SqliteConnection,
    invoice: &InvoiceDao,
) -> Result<InvoiceDao, sqlx::Error> {
    let _res = sqlx::query(
        r"UPDATE invoice SET
invoice_number = $2,
payment_id = $3,
title = $4,
description = $5,
amount = $6,
currency = $7,
crypto_currency = $8,
status = $9,
escrow_enabled = $10,
escrow_days = $11,
escrow_contract = $12,
escrow_tx_hash = $13,
release_tx_hash = $14,
payment_tx_hash = $15,
recipient_wallet = $16,
due_date = $17,
client_id = $18,
created_date = $19,
updated_date = $20,
paid_date = $21
WHERE id = $1
",
    )
    .bind(invoice.id)
    .bind(&invoice.invoice_number)
    .bind(&invoice.payment_id)
    .bind(&invoice.title)
    .bind(&invoice.description)
    .bind(&invoice.amount)
    .bind(&invoice.currency)
    .bind(&invoice.crypto_currency)
    .bind(&invoice.status)
    .bind(invoice.escrow_enabled)
    .bind(invoice.escrow_days)
    .bind(&invoice.escrow_contract)
    .bind(&invoice.escrow_tx_hash)
    .bind(&invoice.release_tx_hash)
    .bind(&invoice.payment_tx_hash)
    .bind(&invoice.recipient_wallet)
    .bind(invoice.due_date)
    .bind(invoice.client_id)
    .bind(invoice.created_date)
    .bind(invoice.updated_date)
    .bind(invoice.paid_date)
    .execute(conn)
    .await?;
    Ok(invoice.clone())
}

pub async fn get_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<Option<InvoiceDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, InvoiceDao>(r"SELECT * FROM invoice WHERE id = $1")
        .bind(invoice_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn delete_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(r"DELETE FROM invoice WHERE id = $1")
        .bind(invoice_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub const INVOICE_FILTER_ALL: &str = "(id >= 0)";
pub const INVOICE_FILTER_OPEN: &str = "(status IN ('draft', 'pending', 'escrow_held'))";
pub const INVOICE_FILTER_SETTLED: &str = "(status IN ('paid', 'escrow_released'))";
pub const INVOICE_ORDER_BY_CREATE_DATE_DESC: &str = "created_date DESC, id DESC";

pub async fn get_invoices(
    conn: &mut SqliteConnection,
    filter: Option<&str>,
    limit: Option<i64>,
    order: Option<&str>,
) -> Result<Vec<InvoiceDao>, sqlx::Error> {
    let limit = limit.unwrap_or(i64::MAX);
    let filter = filter.unwrap_or(INVOICE_FILTER_ALL);
    let order = order.unwrap_or(INVOICE_ORDER_BY_CREATE_DATE_DESC);
    let rows = sqlx::query_as::<_, InvoiceDao>(
        format!(
            r"SELECT * FROM invoice WHERE {} ORDER BY {} LIMIT {}",
            filter, order, limit
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_invoices_by_client(
    conn: &mut SqliteConnection,
    client_id: i64,
) -> Result<Vec<InvoiceDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, InvoiceDao>(
        r"SELECT * FROM invoice WHERE client_id = $1 ORDER BY id DESC",
    )
    .bind(client_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn get_invoice_count(
    conn: &mut SqliteConnection,
    invoice_filter: Option<&str>,
) -> Result<usize, sqlx::Error> {
    let invoice_filter = invoice_filter.unwrap_or(INVOICE_FILTER_ALL);
    let count = sqlx::query_scalar::<_, i64>(
        format!(r"SELECT COUNT(*) FROM invoice WHERE {}", invoice_filter).as_str(),
    )
    .fetch_one(conn)
    .await?;
    Ok(count as usize)
}

/// Next number in the `INV-00001` sequence. Numbers of deleted invoices are not reused.
pub async fn next_invoice_number(conn: &mut SqliteConnection) -> Result<String, sqlx::Error> {
    let last = sqlx::query_scalar::<_, i64>(
        r"SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'invoice'), 0)",
    )
    .fetch_one(conn)
    .await?;
    Ok(format!("INV-{:05}", last + 1))
}

pub async fn insert_invoice_item(
    conn: &mut SqliteConnection,
    item: &InvoiceItemDao,
) -> Result<InvoiceItemDao, sqlx::Error> {
    let res = sqlx::query_as::<_, InvoiceItemDao>(
        r"INSERT INTO invoice_item
(invoice_id, description, quantity, unit_price)
VALUES ($1, $2, $3, $4) RETURNING *;
",
    )
    .bind(item.invoice_id)
    .bind(&item.description)
    .bind(&item.quantity)
    .bind(&item.unit_price)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn get_invoice_items(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<Vec<InvoiceItemDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, InvoiceItemDao>(
        r"SELECT * FROM invoice_item WHERE invoice_id = $1 ORDER BY id ASC",
    )
    .bind(invoice_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) fn sample_invoice(invoice_number: &str) -> InvoiceDao {
    let now = chrono::Utc::now();
    InvoiceDao {
        id: 0,
        invoice_number: invoice_number.to_string(),
        payment_id: uuid::Uuid::new_v4().to_string(),
        title: "Website redesign".to_string(),
        description: None,
        amount: "100.00".to_string(),
        currency: "USD".to_string(),
        crypto_currency: "ETH".to_string(),
        status: "draft".to_string(),
        escrow_enabled: false,
        escrow_days: 0,
        escrow_contract: None,
        escrow_tx_hash: None,
        release_tx_hash: None,
        payment_tx_hash: None,
        recipient_wallet: None,
        due_date: None,
        client_id: None,
        created_date: now,
        updated_date: now,
        paid_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;

    #[tokio::test]
    async fn test_insert_and_update_invoice() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        assert_eq!(next_invoice_number(&mut conn).await.unwrap(), "INV-00001");

        let invoice = insert_invoice(&mut conn, &sample_invoice("INV-00001"))
            .await
            .unwrap();
        assert!(invoice.id > 0);
        assert_eq!(next_invoice_number(&mut conn).await.unwrap(), "INV-00002");

        let mut changed = invoice.clone();
        changed.status = "pending".to_string();
        update_invoice(&mut conn, &changed).await.unwrap();
        let loaded = get_invoice(&mut conn, invoice.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, "pending");
        assert_eq!(loaded.payment_id, invoice.payment_id);

        assert_eq!(
            get_invoice_count(&mut conn, Some(INVOICE_FILTER_OPEN)).await.unwrap(),
            1
        );
        assert_eq!(
            get_invoice_count(&mut conn, Some(INVOICE_FILTER_SETTLED)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_items_are_deleted_with_invoice() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let invoice = insert_invoice(&mut conn, &sample_invoice("INV-00001"))
            .await
            .unwrap();
        for n in 0..2 {
            insert_invoice_item(
                &mut conn,
                &InvoiceItemDao {
                    id: 0,
                    invoice_id: invoice.id,
                    description: format!("Item {n}"),
                    quantity: "1".to_string(),
                    unit_price: "10".to_string(),
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(get_invoice_items(&mut conn, invoice.id).await.unwrap().len(), 2);
        assert!(delete_invoice(&mut conn, invoice.id).await.unwrap());
        assert!(get_invoice(&mut conn, invoice.id).await.unwrap().is_none());
        assert!(get_invoice_items(&mut conn, invoice.id).await.unwrap().is_empty());
        assert!(!delete_invoice(&mut conn, invoice.id).await.unwrap());
    }
}
