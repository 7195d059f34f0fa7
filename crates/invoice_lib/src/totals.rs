use crate::db::model::InvoiceItemDao;
use crate::error::{InvoiceError, ValidationError};
use crate::{err_create, err_from};
use crate::utils::{parse_decimal, round_money};
use crate::validation::{NewInvoice, NewInvoiceItem};
use rust_decimal::Decimal;

fn too_large(field: &str) -> InvoiceError {
    err_create!(ValidationError::new(field, "amount too large"))
}

/// Adds `amount` to `sum`, failing on overflow of the decimal range.
pub fn checked_sum(sum: Decimal, amount: Decimal, field: &str) -> Result<Decimal, InvoiceError> {
    sum.checked_add(amount).ok_or_else(|| too_large(field))
}

pub fn line_total(idx: usize, item: &NewInvoiceItem) -> Result<Decimal, InvoiceError> {
    item.quantity
        .checked_mul(item.unit_price)
        .ok_or_else(|| too_large(&format!("items[{idx}]")))
}

/// Sum of line totals rounded to cents.
pub fn invoice_total(items: &[NewInvoiceItem]) -> Result<Decimal, InvoiceError> {
    let mut sum = Decimal::ZERO;
    for (idx, item) in items.iter().enumerate() {
        sum = checked_sum(sum, line_total(idx, item)?, &format!("items[{idx}]"))?;
    }
    Ok(round_money(sum))
}

/// Amount billed by a new invoice: its items when present, the entered amount otherwise.
pub fn invoice_amount(invoice: &NewInvoice) -> Result<Decimal, InvoiceError> {
    if invoice.items.is_empty() {
        Ok(round_money(invoice.amount.unwrap_or_default()))
    } else {
        invoice_total(&invoice.items)
    }
}

pub fn stored_items_total(items: &[InvoiceItemDao]) -> Result<Decimal, InvoiceError> {
    let mut sum = Decimal::ZERO;
    for (idx, item) in items.iter().enumerate() {
        let quantity = parse_decimal(&item.quantity).map_err(err_from!())?;
        let unit_price = parse_decimal(&item.unit_price).map_err(err_from!())?;
        let line = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| too_large(&format!("items[{idx}]")))?;
        sum = checked_sum(sum, line, &format!("items[{idx}]"))?;
    }
    Ok(round_money(sum))
}
