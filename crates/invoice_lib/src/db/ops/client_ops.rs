use crate::db::model::*;
use sqlx::SqliteConnection;

pub async fn insert_client(
    conn: &mut SqliteConnection,
    client: &ClientDao,
) -> Result<ClientDao, sqlx::Error> {
    let res = sqlx::query_as::<_, ClientDao>(
        r"INSERT INTO client
(name, email, wallet_address, client_type, created_date)
VALUES ($1, $2, $3, $4, $5) RETURNING *;
",
    )
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.wallet_address)
    .bind(&client.client_type)
    .bind(client.created_date)
    .fetch_one(conn)
    .await?;
    Ok(res)
}

pub async fn update_client(
    conn: &mut SqliteConnection,
    client: &ClientDao,
) -> Result<ClientDao, sqlx::Error> {
    let _res = sqlx::query(
        r"UPDATE client SET
name = $2,
email = $3,
wallet_address = $4,
client_type = $5
WHERE id = $1
",
    )
    .bind(client.id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.wallet_address)
    .bind(&client.client_type)
    .execute(conn)
    .await?;
    Ok(client.clone())
}

pub async fn get_client(
    conn: &mut SqliteConnection,
    client_id: i64,
) -> Result<Option<ClientDao>, sqlx::Error> {
    let row = sqlx::query_as::<_, ClientDao>(r"SELECT * FROM client WHERE id = $1")
        .bind(client_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn get_all_clients(conn: &mut SqliteConnection) -> Result<Vec<ClientDao>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ClientDao>(r"SELECT * FROM client ORDER BY name ASC, id ASC")
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn delete_client(
    conn: &mut SqliteConnection,
    client_id: i64,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(r"DELETE FROM client WHERE id = $1")
        .bind(client_id)
        .execute(conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_sqlite_connection;
    use crate::db::ops::{get_invoice, insert_invoice, sample_invoice};

    fn sample_client(name: &str) -> ClientDao {
        ClientDao {
            id: 0,
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            wallet_address: None,
            client_type: "business".to_string(),
            created_date: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_clients_sorted_by_name() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        insert_client(&mut conn, &sample_client("Zeta")).await.unwrap();
        let acme = insert_client(&mut conn, &sample_client("Acme")).await.unwrap();
        let clients = get_all_clients(&mut conn).await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].name, "Acme");

        let mut renamed = acme.clone();
        renamed.name = "Acme Ltd".to_string();
        update_client(&mut conn, &renamed).await.unwrap();
        let loaded = get_client(&mut conn, acme.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Acme Ltd");
    }

    #[tokio::test]
    async fn test_delete_client_detaches_invoices() {
        let mut conn = create_sqlite_connection(None, true).await.unwrap();
        let client = insert_client(&mut conn, &sample_client("Acme")).await.unwrap();
        let mut invoice = sample_invoice("INV-00001");
        invoice.client_id = Some(client.id);
        let invoice = insert_invoice(&mut conn, &invoice).await.unwrap();

        assert!(delete_client(&mut conn, client.id).await.unwrap());
        let invoice = get_invoice(&mut conn, invoice.id).await.unwrap().unwrap();
        assert_eq!(invoice.client_id, None);
    }
}
