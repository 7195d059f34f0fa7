use crate::db::model::TxDao;
use crate::error::InvoiceError;
use crate::err_from;
use crate::search::InvoiceSummary;
use serde::Serialize;

#[derive(Serialize)]
struct InvoiceCsvRow<'a> {
    invoice_number: &'a str,
    title: &'a str,
    client: &'a str,
    amount: &'a str,
    currency: &'a str,
    crypto_currency: &'a str,
    status: &'a str,
    escrow_enabled: bool,
    due_date: String,
    created_date: String,
    paid_date: String,
    payment_tx_hash: &'a str,
}

#[derive(Serialize)]
struct TxCsvRow<'a> {
    id: i64,
    invoice_id: String,
    transaction_type: &'a str,
    amount: &'a str,
    currency: &'a str,
    status: &'a str,
    tx_hash: &'a str,
    fee_paid: &'a str,
    created_date: String,
}

fn csv_to_string<T: Serialize>(rows: impl Iterator<Item = T>) -> Result<String, InvoiceError> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer.serialize(row).map_err(err_from!())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| crate::err_custom_create!("Failed to flush csv: {}", err))?;
    String::from_utf8(bytes).map_err(|err| crate::err_custom_create!("Invalid csv output: {}", err))
}

fn date_or_empty(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_default()
}

pub fn export_invoices_csv(invoices: &[InvoiceSummary]) -> Result<String, InvoiceError> {
    if invoices.is_empty() {
        return Ok(String::new());
    }
    csv_to_string(invoices.iter().map(|s| {
        let invoice = &s.invoice;
        InvoiceCsvRow {
            invoice_number: &invoice.invoice_number,
            title: &invoice.title,
            client: s.client_name.as_deref().unwrap_or(""),
            amount: &invoice.amount,
            currency: &invoice.currency,
            crypto_currency: &invoice.crypto_currency,
            status: &invoice.status,
            escrow_enabled: invoice.escrow_enabled,
            due_date: date_or_empty(invoice.due_date),
            created_date: invoice.created_date.to_rfc3339(),
            paid_date: date_or_empty(invoice.paid_date),
            payment_tx_hash: invoice
                .payment_tx_hash
                .as_deref()
                .or(invoice.escrow_tx_hash.as_deref())
                .unwrap_or(""),
        }
    }))
}

pub fn export_transactions_csv(transactions: &[TxDao]) -> Result<String, InvoiceError> {
    if transactions.is_empty() {
        return Ok(String::new());
    }
    csv_to_string(transactions.iter().map(|tx| TxCsvRow {
        id: tx.id,
        invoice_id: tx.invoice_id.map(|id| id.to_string()).unwrap_or_default(),
        transaction_type: &tx.transaction_type,
        amount: &tx.amount,
        currency: &tx.currency,
        status: &tx.status,
        tx_hash: tx.tx_hash.as_deref().unwrap_or(""),
        fee_paid: tx.fee_paid.as_deref().unwrap_or(""),
        created_date: tx.created_date.to_rfc3339(),
    }))
}

pub fn export_json<T: Serialize + ?Sized>(rows: &T) -> Result<String, InvoiceError> {
    serde_json::to_string_pretty(rows).map_err(err_from!())
}
