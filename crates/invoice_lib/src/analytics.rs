use crate::db::model::{InvoiceDao, TxDao};
use crate::error::InvoiceError;
use crate::err_from;
use crate::model::InvoiceStatus;
use crate::totals::checked_sum;
use crate::utils::{format_money, parse_decimal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AmountCount {
    pub count: usize,
    pub amount: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAnalytics {
    pub invoice_count: usize,
    pub by_status: BTreeMap<String, AmountCount>,
    pub by_crypto_currency: BTreeMap<String, AmountCount>,
    pub total_revenue: String,
    pub outstanding: String,
    pub held_in_escrow: String,
    pub overdue_count: usize,
    /// Settled amounts keyed `YYYY-MM` by paid date.
    pub monthly_revenue: BTreeMap<String, String>,
    pub transactions_by_type: BTreeMap<String, AmountCount>,
}

#[derive(Default)]
struct Acc {
    count: usize,
    amount: Decimal,
}

impl Acc {
    fn add(&mut self, amount: Decimal, field: &str) -> Result<(), InvoiceError> {
        self.amount = checked_sum(self.amount, amount, field)?;
        self.count += 1;
        Ok(())
    }
}

fn finish(map: BTreeMap<String, Acc>) -> BTreeMap<String, AmountCount> {
    map.into_iter()
        .map(|(key, acc)| {
            (
                key,
                AmountCount {
                    count: acc.count,
                    amount: format_money(acc.amount),
                },
            )
        })
        .collect()
}

fn is_overdue(invoice: &InvoiceDao, status: Option<InvoiceStatus>, now: DateTime<Utc>) -> bool {
    let open = match status {
        Some(status) => !status.is_settled() && status != InvoiceStatus::Canceled,
        None => false,
    };
    open && invoice.due_date.map(|due| due < now).unwrap_or(false)
}

/// Aggregates over every invoice and transaction row, `now` decides what is overdue.
pub fn compute_analytics(
    invoices: &[InvoiceDao],
    transactions: &[TxDao],
    now: DateTime<Utc>,
) -> Result<InvoiceAnalytics, InvoiceError> {
    let mut by_status: BTreeMap<String, Acc> = BTreeMap::new();
    let mut by_crypto_currency: BTreeMap<String, Acc> = BTreeMap::new();
    let mut monthly: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut revenue = Decimal::ZERO;
    let mut outstanding = Decimal::ZERO;
    let mut held_in_escrow = Decimal::ZERO;
    let mut overdue_count = 0;

    for invoice in invoices {
        let amount = parse_decimal(&invoice.amount).map_err(err_from!())?;
        let status = InvoiceStatus::from_str(&invoice.status).ok();
        if status.is_none() {
            log::warn!(
                "Invoice {} has unknown status {}, counted only by status",
                invoice.id,
                invoice.status
            );
        }
        by_status
            .entry(invoice.status.clone())
            .or_default()
            .add(amount, "by_status")?;
        by_crypto_currency
            .entry(invoice.crypto_currency.clone())
            .or_default()
            .add(amount, "by_crypto_currency")?;

        if let Some(status) = status {
            if status.is_settled() {
                revenue = checked_sum(revenue, amount, "total_revenue")?;
                if let Some(paid_date) = invoice.paid_date {
                    let month = monthly
                        .entry(paid_date.format("%Y-%m").to_string())
                        .or_default();
                    *month = checked_sum(*month, amount, "monthly_revenue")?;
                }
            }
            if status.is_outstanding() {
                outstanding = checked_sum(outstanding, amount, "outstanding")?;
            }
            if status == InvoiceStatus::EscrowHeld {
                held_in_escrow = checked_sum(held_in_escrow, amount, "held_in_escrow")?;
            }
        }
        if is_overdue(invoice, status, now) {
            overdue_count += 1;
        }
    }

    let mut transactions_by_type: BTreeMap<String, Acc> = BTreeMap::new();
    for tx in transactions {
        let amount = parse_decimal(&tx.amount).map_err(err_from!())?;
        transactions_by_type
            .entry(tx.transaction_type.clone())
            .or_default()
            .add(amount, "transactions_by_type")?;
    }

    Ok(InvoiceAnalytics {
        invoice_count: invoices.len(),
        by_status: finish(by_status),
        by_crypto_currency: finish(by_crypto_currency),
        total_revenue: format_money(revenue),
        outstanding: format_money(outstanding),
        held_in_escrow: format_money(held_in_escrow),
        overdue_count,
        monthly_revenue: monthly
            .into_iter()
            .map(|(month, amount)| (month, format_money(amount)))
            .collect(),
        transactions_by_type: finish(transactions_by_type),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ops::sample_invoice;
    use chrono::TimeZone;

    fn invoice(status: &str, amount: &str, crypto: &str) -> InvoiceDao {
        let mut invoice = sample_invoice("INV-00001");
        invoice.status = status.to_string();
        invoice.amount = amount.to_string();
        invoice.crypto_currency = crypto.to_string();
        invoice
    }

    fn tx(transaction_type: &str, amount: &str) -> TxDao {
        TxDao {
            id: 0,
            invoice_id: None,
            wallet_id: None,
            transaction_type: transaction_type.to_string(),
            amount: amount.to_string(),
            currency: "ETH".to_string(),
            chain_id: 5,
            tx_hash: None,
            status: "confirmed".to_string(),
            fee_paid: None,
            error: None,
            created_date: Utc::now(),
        }
    }

    #[test]
    fn test_totals() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let mut paid = invoice("paid", "100.10", "ETH");
        paid.paid_date = Some(Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap());
        let mut released = invoice("escrow_released", "50.05", "USDC");
        released.paid_date = Some(Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap());
        let mut late = invoice("pending", "20", "USDC");
        late.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let mut canceled = invoice("canceled", "5", "ETH");
        canceled.due_date = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let held = invoice("escrow_held", "30", "ETH");

        let stats = compute_analytics(
            &[paid, released, late, canceled, held],
            &[tx("payment", "1.5"), tx("payment", "2"), tx("withdrawal", "0.25")],
            now,
        )
        .unwrap();

        assert_eq!(stats.invoice_count, 5);
        assert_eq!(stats.total_revenue, "150.15");
        assert_eq!(stats.outstanding, "50.00");
        assert_eq!(stats.held_in_escrow, "30.00");
        assert_eq!(stats.overdue_count, 1);
        assert_eq!(stats.by_status["paid"].amount, "100.10");
        assert_eq!(stats.by_crypto_currency["ETH"].count, 3);
        assert_eq!(stats.by_crypto_currency["USDC"].amount, "70.05");
        assert_eq!(stats.monthly_revenue.len(), 1);
        assert_eq!(stats.monthly_revenue["2024-02"], "150.15");
        assert_eq!(stats.transactions_by_type["payment"].count, 2);
        assert_eq!(stats.transactions_by_type["payment"].amount, "3.50");
        assert_eq!(stats.transactions_by_type["withdrawal"].amount, "0.25");
    }

    #[test]
    fn test_empty() {
        let stats = compute_analytics(&[], &[], Utc::now()).unwrap();
        assert_eq!(stats.total_revenue, "0.00");
        assert!(stats.monthly_revenue.is_empty());
    }

    #[test]
    fn test_overflowing_amounts_are_an_error() {
        let max = Decimal::MAX.to_string();
        let res = compute_analytics(
            &[invoice("pending", &max, "ETH"), invoice("pending", &max, "ETH")],
            &[],
            Utc::now(),
        );
        assert!(matches!(
            res.unwrap_err().inner,
            crate::error::ErrorBag::ValidationError(_)
        ));
    }
}
