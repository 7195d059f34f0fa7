use crate::db::model::ClientDao;
use crate::db::ops::*;
use crate::error::{InvoiceError, NotFoundError};
use crate::validation::{validate_new_client, NewClient};
use crate::{err_create, err_from};
use sqlx::SqliteConnection;

fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn create_client(
    conn: &mut SqliteConnection,
    new_client: &NewClient,
) -> Result<ClientDao, InvoiceError> {
    let client_type = validate_new_client(new_client)?;
    let client = insert_client(
        conn,
        &ClientDao {
            id: 0,
            name: new_client.name.trim().to_string(),
            email: normalized(&new_client.email),
            wallet_address: normalized(&new_client.wallet_address).map(|w| w.to_lowercase()),
            client_type: client_type.to_string(),
            created_date: chrono::Utc::now(),
        },
    )
    .await
    .map_err(err_from!())?;
    log::info!("Created client {} ({})", client.name, client.id);
    Ok(client)
}

pub async fn get_client_or_err(
    conn: &mut SqliteConnection,
    client_id: i64,
) -> Result<ClientDao, InvoiceError> {
    get_client(conn, client_id)
        .await
        .map_err(err_from!())?
        .ok_or_else(|| err_create!(NotFoundError::new("Client", client_id)))
}

pub async fn list_clients(conn: &mut SqliteConnection) -> Result<Vec<ClientDao>, InvoiceError> {
    get_all_clients(conn).await.map_err(err_from!())
}

pub async fn update_client_details(
    conn: &mut SqliteConnection,
    client_id: i64,
    changes: &NewClient,
) -> Result<ClientDao, InvoiceError> {
    let client_type = validate_new_client(changes)?;
    let mut client = get_client_or_err(conn, client_id).await?;
    client.name = changes.name.trim().to_string();
    client.email = normalized(&changes.email);
    client.wallet_address = normalized(&changes.wallet_address).map(|w| w.to_lowercase());
    client.client_type = client_type.to_string();
    update_client(conn, &client).await.map_err(err_from!())
}

/// Invoices of a removed client are kept without a client.
pub async fn remove_client(
    conn: &mut SqliteConnection,
    client_id: i64,
) -> Result<(), InvoiceError> {
    if !delete_client(conn, client_id).await.map_err(err_from!())? {
        return Err(err_create!(NotFoundError::new("Client", client_id)));
    }
    log::info!("Deleted client {}", client_id);
    Ok(())
}
