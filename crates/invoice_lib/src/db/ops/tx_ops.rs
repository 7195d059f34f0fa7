use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_tx(conn: &mut SqliteConnection, tx: &TxDao) -> Result<TxDao, sqlx::Error> {
    let res = sqlx::query_as::<_, TxDao>(
        r"INSERT INTO tx
(invoice_id, wallet_id, transaction_type, amount, currency, chain_id, tx_hash, status, fee_paid, error, created_date)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *;
",
    )
    .bind(tx.invoice_id)
    .bind(tx.wallet_id)
    .bind(&tx.transaction_type)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(tx.chain_id)
    .bind(&tx.tx_hash)
    .bind(&tx.status)
    .bind(&tx.fee_paid)
    .bind(&tx.error)
    .bind(tx.created_date)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

/// Rows are append only, only the status columns change.
pub async fn update_tx_status(
    conn: &mut SqliteConnection,
    tx_id: i64,
    status: &str,
    error: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(r"UPDATE tx SET status = $2, error = $3 WHERE id = $1")
        .bind(tx_id)
        .bind(status)
        .bind(error)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn get_tx(conn: &mut SqliteConnection, tx_id: i64) -> Result<Option<TxDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, TxDao>(r"SELECT * FROM tx WHERE id = $1")
        .bind(tx_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub const TX_FILTER_ALL: &str = "(id >= 0)";
pub const TX_FILTER_CONFIRMED: &str = "(status = 'confirmed')";

pub async fn get_transactions(
    conn: &mut SqliteConnection,
    filter: Option<&str>,
    transaction_type: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<TxDao>, sqlx::Error> {
    let limit = limit.unwrap_or(i64::MAX);
    let filter = filter.unwrap_or(TX_FILTER_ALL);
    let rows = if let Some(transaction_type) = transaction_type {
        sqlx::query_as::<_, TxDao>(
            format!(
                r"SELECT * FROM tx WHERE {} AND transaction_type = $1 ORDER BY id DESC LIMIT $2",
                filter
            )
            .as_str(),
        )
        .bind(transaction_type)
        .bind(limit)
        .fetch_all(conn)
        .await?
    } else {
        sqlx::query_as::<_, TxDao>(
            format!(r"SELECT * FROM tx WHERE {} ORDER BY id DESC LIMIT $1", filter).as_str(),
        )
        .bind(limit)
        .fetch_all(conn)
        .await?
    };
    Ok(rows)
}

pub async fn get_transactions_by_invoice(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> Result<Vec<TxDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TxDao>(r"SELECT * FROM tx WHERE invoice_id = $1 ORDER BY id ASC")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
