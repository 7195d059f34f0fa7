mod options;

use actix_cors::Cors;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use invoice_lib::analytics::compute_analytics;
use invoice_lib::config;
use invoice_lib::db::ops::{get_invoices, get_transactions, TX_FILTER_CONFIRMED};
use invoice_lib::error::InvoiceError;
use invoice_lib::escrow::{escrow_deposit, escrow_release};
use invoice_lib::export::{export_invoices_csv, export_json, export_transactions_csv};
use invoice_lib::runtime::{start_invoice_engine, with_invoice_guard, InvoiceRuntime};
use invoice_lib::search::InvoiceFilter;
use invoice_lib::server::{configure_api, ServerData};
use invoice_lib::service::{list_invoices, record_payment};
use invoice_lib::{err_custom_create, err_from};
use secp256k1::SecretKey;
use std::env;

use crate::options::{validated_cli, CliOptions, ExportOptions, ServerOptions};

/// `ETH_PRIVATE_KEY` as hex, or an encrypted keystore at `KEYSTORE_PATH`
/// unlocked with `KEYSTORE_PASSWORD`.
fn load_secret_key() -> Result<Option<SecretKey>, InvoiceError> {
    if let Ok(private_key) = env::var("ETH_PRIVATE_KEY") {
        let bytes = hex::decode(private_key.trim().trim_start_matches("0x")).map_err(err_from!())?;
        return Ok(Some(SecretKey::from_slice(&bytes).map_err(err_from!())?));
    }
    if let Ok(keystore_path) = env::var("KEYSTORE_PATH") {
        let password = env::var("KEYSTORE_PASSWORD")
            .map_err(|_| err_custom_create!("KEYSTORE_PASSWORD is required with KEYSTORE_PATH"))?;
        let bytes = eth_keystore::decrypt_key(&keystore_path, password)
            .map_err(|e| err_custom_create!("Failed to decrypt keystore {}: {:?}", keystore_path, e))?;
        return Ok(Some(SecretKey::from_slice(&bytes).map_err(err_from!())?));
    }
    Ok(None)
}

async fn run_server(runtime: InvoiceRuntime, opts: ServerOptions) -> Result<(), InvoiceError> {
    let server_data = Data::new(Box::new(ServerData {
        shared_state: runtime.shared_state.clone(),
        db_connection: runtime.conn.clone(),
        chain: runtime.chain.clone(),
        setup: runtime.setup.clone(),
    }));
    let frontend = opts.frontend.clone();
    log::info!("Starting server at http://{}:{}", opts.host, opts.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);
        let app = App::new()
            .wrap(cors)
            .app_data(server_data.clone())
            .configure(configure_api);
        match &frontend {
            Some(dir) => app.service(actix_files::Files::new("/ui", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind((opts.host.as_str(), opts.port))
    .map_err(err_from!())?
    .run()
    .await
    .map_err(err_from!())
}

async fn run_export(runtime: &InvoiceRuntime, opts: &ExportOptions) -> Result<(), InvoiceError> {
    let content = {
        let mut db_conn = runtime.conn.lock().await;
        match (opts.what.as_str(), opts.format.as_str()) {
            ("invoices", format) => {
                let invoices = list_invoices(&mut db_conn, &InvoiceFilter::default()).await?;
                if format == "json" {
                    export_json(&invoices)?
                } else {
                    export_invoices_csv(&invoices)?
                }
            }
            (_, format) => {
                let txs = get_transactions(&mut db_conn, None, None, None)
                    .await
                    .map_err(err_from!())?;
                if format == "json" {
                    export_json(&txs)?
                } else {
                    export_transactions_csv(&txs)?
                }
            }
        }
    };
    match &opts.output {
        Some(path) => {
            tokio::fs::write(path, content).await.map_err(err_from!())?;
            log::info!("Exported {} to {}", opts.what, path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<(), InvoiceError> {
    let dotenv_res = dotenv::dotenv();
    env_logger::init();
    if let Err(err) = dotenv_res {
        log::warn!("No .env file loaded: {}", err);
    }
    let cli = validated_cli()?;
    let common = cli.common().clone();
    let secret_key = load_secret_key()?;
    let config = config::Config::load(&common.config)?;

    let db_filename = if common.memory_db {
        None
    } else {
        Some(env::var("DB_SQLITE_FILENAME").unwrap_or_else(|_| "db.sqlite".to_string()))
    };
    let runtime =
        start_invoice_engine(db_filename.as_deref(), secret_key, config, common.chain_id).await?;

    match cli {
        CliOptions::Server(opts) => run_server(runtime, opts).await?,
        CliOptions::ListInvoices(opts) => {
            let filter = opts.filter()?;
            let mut db_conn = runtime.conn.lock().await;
            for summary in list_invoices(&mut db_conn, &filter).await? {
                let invoice = &summary.invoice;
                println!(
                    "{}\t{}\t{} {}\t{}\t{}",
                    invoice.invoice_number,
                    invoice.title,
                    invoice.amount,
                    invoice.crypto_currency,
                    summary.status_label,
                    summary.client_name.as_deref().unwrap_or("-")
                );
            }
        }
        CliOptions::Export(opts) => run_export(&runtime, &opts).await?,
        CliOptions::Analytics(_) => {
            let (invoices, txs) = {
                let mut db_conn = runtime.conn.lock().await;
                (
                    get_invoices(&mut db_conn, None, None, None)
                        .await
                        .map_err(err_from!())?,
                    get_transactions(&mut db_conn, Some(TX_FILTER_CONFIRMED), None, None)
                        .await
                        .map_err(err_from!())?,
                )
            };
            let analytics = compute_analytics(&invoices, &txs, chrono::Utc::now())?;
            println!("{}", export_json(&analytics)?);
        }
        CliOptions::EscrowDeposit(opts) => {
            let invoice = escrow_deposit(
                &runtime.conn,
                &runtime.shared_state,
                runtime.chain.as_ref(),
                runtime.setup.get_chain_setup()?,
                opts.invoice_id,
                opts.recipient.as_deref(),
            )
            .await?;
            log::info!(
                "Invoice {} is {}, escrow tx: {:?}",
                invoice.invoice_number,
                invoice.status,
                invoice.escrow_tx_hash
            );
        }
        CliOptions::EscrowRelease(opts) => {
            let invoice = escrow_release(
                &runtime.conn,
                &runtime.shared_state,
                runtime.chain.as_ref(),
                opts.invoice_id,
            )
            .await?;
            log::info!(
                "Invoice {} is {}, release tx: {:?}",
                invoice.invoice_number,
                invoice.status,
                invoice.release_tx_hash
            );
        }
        CliOptions::RecordPayment(opts) => {
            let tx_hash = opts.tx_hash.unwrap_or_default();
            let tx = with_invoice_guard(
                &runtime.shared_state,
                opts.invoice_id,
                record_payment(
                    &runtime.conn,
                    runtime.chain.as_ref(),
                    opts.invoice_id,
                    &tx_hash,
                ),
            )
            .await?;
            log::info!("Payment for invoice {} recorded as {}", opts.invoice_id, tx.status);
        }
    }
    Ok(())
}
