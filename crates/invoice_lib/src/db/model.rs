use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDao {
    pub id: i64,
    pub invoice_number: String,
    pub payment_id: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: String,
    pub currency: String,
    pub crypto_currency: String,
    pub status: String,
    pub escrow_enabled: bool,
    pub escrow_days: i64,
    pub escrow_contract: Option<String>,
    pub escrow_tx_hash: Option<String>,
    pub release_tx_hash: Option<String>,
    pub payment_tx_hash: Option<String>,
    pub recipient_wallet: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub client_id: Option<i64>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemDao {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientDao {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub wallet_address: Option<String>,
    pub client_type: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletDao {
    pub id: i64,
    pub wallet_address: String,
    pub wallet_type: String,
    pub label: Option<String>,
    pub balance: String,
    pub is_default: bool,
    pub created_date: DateTime<Utc>,
}

#[derive(Serialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TxDao {
    pub id: i64,
    pub invoice_id: Option<i64>,
    pub wallet_id: Option<i64>,
    pub transaction_type: String,
    pub amount: String,
    pub currency: String,
    pub chain_id: i64,
    pub tx_hash: Option<String>,
    pub status: String,
    pub fee_paid: Option<String>,
    pub error: Option<String>,
    pub created_date: DateTime<Utc>,
}
