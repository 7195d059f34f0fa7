use crate::eth::parse_address;
use crate::error::{InvoiceError, ValidationError};
use crate::model::{ClientType, CryptoCurrency, WalletType};
use crate::totals::invoice_total;
use crate::err_create;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub const MAX_ESCROW_DAYS: i64 = 365;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoiceItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub title: String,
    pub description: Option<String>,
    /// Ignored when `items` is not empty.
    pub amount: Option<Decimal>,
    pub currency: String,
    pub crypto_currency: String,
    #[serde(default)]
    pub escrow_enabled: bool,
    #[serde(default)]
    pub escrow_days: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub client_id: Option<i64>,
    pub recipient_wallet: Option<String>,
    #[serde(default)]
    pub items: Vec<NewInvoiceItem>,
    /// Create as `pending` instead of `draft`.
    #[serde(default)]
    pub submit: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub wallet_address: Option<String>,
    pub client_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewWallet {
    pub wallet_address: String,
    pub wallet_type: String,
    pub label: Option<String>,
}

fn required(field: &str, value: &str) -> Result<(), InvoiceError> {
    if value.trim().is_empty() {
        return Err(err_create!(ValidationError::new(field, "is required")));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn validate_new_invoice(invoice: &NewInvoice) -> Result<CryptoCurrency, InvoiceError> {
    required("title", &invoice.title)?;
    required("currency", &invoice.currency)?;
    required("crypto_currency", &invoice.crypto_currency)?;
    let crypto_currency = CryptoCurrency::from_str(&invoice.crypto_currency)?;

    if invoice.items.is_empty() {
        match invoice.amount {
            Some(amount) if amount > Decimal::ZERO => {}
            Some(_) => {
                return Err(err_create!(ValidationError::new(
                    "amount",
                    "must be greater than zero"
                )))
            }
            None => return Err(err_create!(ValidationError::new("amount", "is required"))),
        }
    }
    for (idx, item) in invoice.items.iter().enumerate() {
        required(&format!("items[{idx}].description"), &item.description)?;
        if item.quantity <= Decimal::ZERO {
            return Err(err_create!(ValidationError::new(
                &format!("items[{idx}].quantity"),
                "must be greater than zero"
            )));
        }
        if item.unit_price.is_sign_negative() {
            return Err(err_create!(ValidationError::new(
                &format!("items[{idx}].unit_price"),
                "cannot be negative"
            )));
        }
    }
    invoice_total(&invoice.items)?;

    if invoice.escrow_days < 0 || invoice.escrow_days > MAX_ESCROW_DAYS {
        return Err(err_create!(ValidationError::new(
            "escrow_days",
            &format!("must be between 0 and {MAX_ESCROW_DAYS}")
        )));
    }
    if invoice.escrow_enabled && invoice.escrow_days == 0 {
        return Err(err_create!(ValidationError::new(
            "escrow_days",
            "is required when escrow is enabled"
        )));
    }
    if let Some(recipient) = non_empty(&invoice.recipient_wallet) {
        parse_address("recipient_wallet", recipient)?;
    }
    Ok(crypto_currency)
}

pub fn validate_new_client(client: &NewClient) -> Result<ClientType, InvoiceError> {
    required("name", &client.name)?;
    let email = non_empty(&client.email);
    let wallet_address = non_empty(&client.wallet_address);
    if email.is_none() && wallet_address.is_none() {
        return Err(err_create!(ValidationError::new(
            "email",
            "email or wallet address is required"
        )));
    }
    if let Some(email) = email {
        if !EMAIL_REGEX.is_match(email) {
            return Err(err_create!(ValidationError::new("email", "is not a valid email")));
        }
    }
    if let Some(wallet_address) = wallet_address {
        parse_address("wallet_address", wallet_address)?;
    }
    match non_empty(&client.client_type) {
        Some(client_type) => ClientType::from_str(client_type),
        None => Ok(ClientType::Individual),
    }
}

pub fn validate_new_wallet(wallet: &NewWallet) -> Result<WalletType, InvoiceError> {
    required("wallet_address", &wallet.wallet_address)?;
    parse_address("wallet_address", &wallet.wallet_address)?;
    required("wallet_type", &wallet.wallet_type)?;
    WalletType::from_str(&wallet.wallet_type)
}
