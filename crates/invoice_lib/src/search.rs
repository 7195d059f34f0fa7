use crate::db::model::{ClientDao, InvoiceDao};
use crate::model::{CryptoCurrency, InvoiceStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Invoice row as shown in lists, with the client name resolved.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: InvoiceDao,
    pub client_name: Option<String>,
    pub status_label: &'static str,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub search: Option<String>,
    pub client_id: Option<i64>,
    pub crypto_currency: Option<CryptoCurrency>,
}

impl InvoiceFilter {
    pub fn matches(&self, summary: &InvoiceSummary) -> bool {
        let invoice = &summary.invoice;
        if let Some(status) = self.status {
            if invoice.status != status.as_str() {
                return false;
            }
        }
        if let Some(client_id) = self.client_id {
            if invoice.client_id != Some(client_id) {
                return false;
            }
        }
        if let Some(crypto_currency) = self.crypto_currency {
            if invoice.crypto_currency != crypto_currency.as_str() {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(search) => {
                let needle = search.to_lowercase();
                invoice.title.to_lowercase().contains(&needle)
                    || invoice.invoice_number.to_lowercase().contains(&needle)
                    || summary
                        .client_name
                        .as_deref()
                        .map(|name| name.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
        }
    }
}

pub fn summarize_invoices(invoices: Vec<InvoiceDao>, clients: &[ClientDao]) -> Vec<InvoiceSummary> {
    let names: HashMap<i64, &str> = clients.iter().map(|c| (c.id, c.name.as_str())).collect();
    invoices
        .into_iter()
        .map(|invoice| {
            let client_name = invoice
                .client_id
                .and_then(|id| names.get(&id))
                .map(|name| name.to_string());
            let status_label = InvoiceStatus::from_str(&invoice.status)
                .map(|s| s.label())
                .unwrap_or("Unknown");
            InvoiceSummary {
                invoice,
                client_name,
                status_label,
            }
        })
        .collect()
}

pub fn filter_invoices(invoices: Vec<InvoiceSummary>, filter: &InvoiceFilter) -> Vec<InvoiceSummary> {
    invoices.into_iter().filter(|s| filter.matches(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ops::sample_invoice;

    fn client(id: i64, name: &str) -> ClientDao {
        ClientDao {
            id,
            name: name.to_string(),
            email: None,
            wallet_address: None,
            client_type: "business".to_string(),
            created_date: chrono::Utc::now(),
        }
    }

    fn fixtures() -> Vec<InvoiceSummary> {
        let mut first = sample_invoice("INV-00001");
        first.id = 1;
        first.title = "Website redesign".to_string();
        first.client_id = Some(10);
        let mut second = sample_invoice("INV-00002");
        second.id = 2;
        second.title = "Smart contract audit".to_string();
        second.status = "escrow_held".to_string();
        second.crypto_currency = "USDC".to_string();
        second.client_id = Some(11);
        let mut third = sample_invoice("INV-00003");
        third.id = 3;
        third.title = "Logo".to_string();
        summarize_invoices(
            vec![first, second, third],
            &[client(10, "Acme Corp"), client(11, "Globex")],
        )
    }

    fn ids(summaries: &[InvoiceSummary]) -> Vec<i64> {
        summaries.iter().map(|s| s.invoice.id).collect()
    }

    #[test]
    fn test_summary_resolves_client() {
        let summaries = fixtures();
        assert_eq!(summaries[0].client_name.as_deref(), Some("Acme Corp"));
        assert_eq!(summaries[1].status_label, "In Escrow");
        assert_eq!(summaries[2].client_name, None);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let search = |text: &str| InvoiceFilter {
            search: Some(text.to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_invoices(fixtures(), &search("WEBSITE"))), vec![1]);
        assert_eq!(ids(&filter_invoices(fixtures(), &search("inv-0000"))), vec![1, 2, 3]);
        assert_eq!(ids(&filter_invoices(fixtures(), &search("globe"))), vec![2]);
        assert_eq!(ids(&filter_invoices(fixtures(), &search("  "))), vec![1, 2, 3]);
        assert!(filter_invoices(fixtures(), &search("nothing")).is_empty());
    }

    #[test]
    fn test_filters_combine() {
        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::EscrowHeld),
            crypto_currency: Some(CryptoCurrency::Usdc),
            ..Default::default()
        };
        assert_eq!(ids(&filter_invoices(fixtures(), &filter)), vec![2]);

        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::Draft),
            client_id: Some(11),
            ..Default::default()
        };
        assert!(filter_invoices(fixtures(), &filter).is_empty());
    }
}
