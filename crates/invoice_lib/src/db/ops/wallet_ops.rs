use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_wallet(
    conn: &mut SqliteConnection,
    wallet: &WalletDao,
) -> Result<WalletDao, sqlx::Error> {
    let res = sqlx::query_as::<_, WalletDao>(
        r"INSERT INTO wallet
(wallet_address, wallet_type, label, balance, is_default, created_date)
VALUES ($1, $2, $3, $4, $5, $6) RETURNING *;
",
    )
    .bind(&wallet.wallet_address)
    .bind(&wallet.wallet_type)
    .bind(&wallet.label)
    .bind(&wallet.balance)
    .bind(wallet.is_default)
    .bind(wallet.created_date)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn update_wallet(
    conn: &mut SqliteConnection,
    wallet: &WalletDao,
) -> Result<WalletDao, sqlx::Error> {
    let _res = sqlx::query(
        r"UPDATE wallet SET
wallet_address = $2,
wallet_type = $3,
label = $4,
balance = $5,
is_default = $6
WHERE id = $1
",
    )
    .bind(wallet.id)
    .bind(&wallet.wallet_address)
    .bind(&wallet.wallet_type)
    .bind(&wallet.label)
    .bind(&wallet.balance)
    .bind(wallet.is_default)
    .execute(conn)
    .await?;
    Ok(wallet.clone())
}

pub async fn get_wallet(
    conn: &mut SqliteConnection,
    wallet_id: i64,
) -> Result<Option<WalletDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, WalletDao>(r"SELECT * FROM wallet WHERE id = $1")
        .bind(wallet_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn get_all_wallets(conn: &mut SqliteConnection) -> Result<Vec<WalletDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WalletDao>(r"SELECT * FROM wallet ORDER BY id ASC")
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn get_default_wallet(
    conn: &mut SqliteConnection,
    wallet_type: &str,
) -> Result<Option<WalletDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, WalletDao>(
        r"SELECT * FROM wallet WHERE wallet_type = $1 AND is_default = 1 ORDER BY id ASC LIMIT 1",
    )
    .bind(wallet_type)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Clears the default flag on every wallet of `wallet_type`.
pub async fn clear_default_wallets(
    conn: &mut SqliteConnection,
    wallet_type: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r"UPDATE wallet SET is_default = 0 WHERE wallet_type = $1")
        .bind(wallet_type)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_wallet(
    conn: &mut SqliteConnection,
    wallet_id: i64,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(r"DELETE FROM wallet WHERE id = $1")
        .bind(wallet_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;

    #[tokio::test]
    async fn test_default_wallet_per_type() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let wallet = insert_wallet(
            &mut conn,
            &WalletDao {
                id: 0,
                wallet_address: "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf".to_string(),
                wallet_type: "eth".to_string(),
                label: None,
                balance: "1.5".to_string(),
                is_default: true,
                created_date: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            get_default_wallet(&mut conn, "eth").await.unwrap().map(|w| w.id),
            Some(wallet.id)
        );
        assert!(get_default_wallet(&mut conn, "usdc").await.unwrap().is_none());

        clear_default_wallets(&mut conn, "eth").await.unwrap();
        assert!(get_default_wallet(&mut conn, "eth").await.unwrap().is_none());
    }
}
