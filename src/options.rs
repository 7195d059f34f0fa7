use invoice_lib::err_custom_create;
use invoice_lib::error::InvoiceError;
use invoice_lib::model::InvoiceStatus;
use invoice_lib::search::InvoiceFilter;
use std::path::PathBuf;
use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug, StructOpt, Clone)]
pub struct CommonOptions {
    #[structopt(long = "chain-id", default_value = "5")]
    pub chain_id: i64,

    #[structopt(long = "memory-db", help = "Use memory db, default is file db")]
    pub memory_db: bool,

    #[structopt(long = "config", default_value = "config-invoices.toml")]
    pub config: PathBuf,
}

#[derive(Debug, StructOpt, Clone)]
pub struct ServerOptions {
    #[structopt(flatten)]
    pub common: CommonOptions,

    #[structopt(long = "host", default_value = "127.0.0.1")]
    pub host: String,

    #[structopt(long = "port", default_value = "8080")]
    pub port: u16,

    #[structopt(
        long = "frontend",
        help = "Directory with static frontend files, served under /ui"
    )]
    pub frontend: Option<PathBuf>,
}

#[derive(Debug, StructOpt, Clone)]
pub struct ListOptions {
    #[structopt(flatten)]
    pub common: CommonOptions,

    #[structopt(long = "status")]
    pub status: Option<String>,

    #[structopt(long = "search", help = "Matches title, invoice number or client name")]
    pub search: Option<String>,
}

#[derive(Debug, StructOpt, Clone)]
pub struct ExportOptions {
    #[structopt(flatten)]
    pub common: CommonOptions,

    #[structopt(long = "what", default_value = "invoices", help = "invoices or transactions")]
    pub what: String,

    #[structopt(long = "format", default_value = "csv", help = "csv or json")]
    pub format: String,

    #[structopt(long = "output", help = "Output file, stdout when not set")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, StructOpt, Clone)]
pub struct InvoiceIdOptions {
    #[structopt(flatten)]
    pub common: CommonOptions,

    #[structopt(long = "invoice-id")]
    pub invoice_id: i64,

    #[structopt(long = "recipient", help = "Payee address for escrow deposit")]
    pub recipient: Option<String>,

    #[structopt(long = "tx-hash", help = "Hash of the client's payment transaction")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, StructOpt, Clone)]
#[structopt(name = "crypto_invoice", about = "Invoices paid in ETH/USDC, directly or through escrow")]
pub enum CliOptions {
    /// Run the HTTP API
    #[structopt(name = "server")]
    Server(ServerOptions),
    #[structopt(name = "list-invoices")]
    ListInvoices(ListOptions),
    #[structopt(name = "export")]
    Export(ExportOptions),
    #[structopt(name = "analytics")]
    Analytics(CommonOptions),
    #[structopt(name = "escrow-deposit")]
    EscrowDeposit(InvoiceIdOptions),
    #[structopt(name = "escrow-release")]
    EscrowRelease(InvoiceIdOptions),
    #[structopt(name = "record-payment")]
    RecordPayment(InvoiceIdOptions),
}

impl CliOptions {
    pub fn common(&self) -> &CommonOptions {
        match self {
            CliOptions::Server(o) => &o.common,
            CliOptions::ListInvoices(o) => &o.common,
            CliOptions::Export(o) => &o.common,
            CliOptions::Analytics(o) => o,
            CliOptions::EscrowDeposit(o)
            | CliOptions::EscrowRelease(o)
            | CliOptions::RecordPayment(o) => &o.common,
        }
    }
}

impl ListOptions {
    pub fn filter(&self) -> Result<InvoiceFilter, InvoiceError> {
        Ok(InvoiceFilter {
            status: self
                .status
                .as_deref()
                .map(InvoiceStatus::from_str)
                .transpose()?,
            search: self.search.clone(),
            ..Default::default()
        })
    }
}

pub fn validated_cli() -> Result<CliOptions, InvoiceError> {
    let opt = CliOptions::from_args();
    match &opt {
        CliOptions::Export(export) => {
            if !["invoices", "transactions"].contains(&export.what.as_str()) {
                return Err(err_custom_create!(
                    "Unknown export {}, use invoices or transactions",
                    export.what
                ));
            }
            if !["csv", "json"].contains(&export.format.as_str()) {
                return Err(err_custom_create!(
                    "Unknown format {}, use csv or json",
                    export.format
                ));
            }
        }
        CliOptions::RecordPayment(payment) if payment.tx_hash.is_none() => {
            return Err(err_custom_create!("--tx-hash is required to record a payment"));
        }
        CliOptions::ListInvoices(list) => {
            list.filter()?;
        }
        _ => {}
    }
    Ok(opt)
}
