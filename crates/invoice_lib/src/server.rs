use crate::analytics::compute_analytics;
use crate::chain::ChainClient;
use crate::clients::*;
use crate::db::ops::{
    get_invoice_count, get_invoices, get_invoices_by_client, get_transactions,
    INVOICE_FILTER_OPEN, INVOICE_FILTER_SETTLED, TX_FILTER_CONFIRMED,
};
use crate::error::{ErrorBag, InvoiceError};
use crate::escrow::{escrow_deposit, escrow_release};
use crate::export::{export_invoices_csv, export_json, export_transactions_csv};
use crate::model::{InvoiceStatus, TransactionStatus, TransactionType};
use crate::runtime::{with_invoice_guard, SharedState};
use crate::search::InvoiceFilter;
use crate::service::*;
use crate::setup::InvoiceSetup;
use crate::validation::{NewClient, NewInvoice, NewWallet};
use crate::wallet::*;
use crate::err_from;
use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::{web, HttpResponse, ResponseError};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ServerData {
    pub shared_state: Arc<Mutex<SharedState>>,
    pub db_connection: Arc<Mutex<SqliteConnection>>,
    pub chain: Arc<dyn ChainClient>,
    pub setup: InvoiceSetup,
}

pub fn error_status(err: &InvoiceError) -> StatusCode {
    match err.inner {
        ErrorBag::ValidationError(_) => StatusCode::BAD_REQUEST,
        ErrorBag::AlreadyProcessingError(_) => StatusCode::CONFLICT,
        _ if err.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: InvoiceError) -> HttpResponse {
    let status = error_status(&err);
    if status.is_server_error() {
        log::error!("Request failed: {} ({}:{})", err, err.file, err.line);
    } else {
        log::warn!("Request rejected: {}", err);
    }
    HttpResponse::build(status).json(json!({
        "error": err.to_string()
    }))
}

/// Malformed body, query or path, answered in the same `{"error": ..}` shape.
fn extractor_error<E>(err: E) -> actix_web::Error
where
    E: ResponseError + 'static,
{
    let msg = err.to_string();
    log::warn!("Request rejected: {}", msg);
    let response = HttpResponse::build(err.status_code()).json(json!({
        "error": msg
    }));
    InternalError::from_response(err, response).into()
}

macro_rules! return_on_error {
    ( $e:expr ) => {
        match $e {
            Ok(x) => x,
            Err(err) => return error_response(err),
        }
    };
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub tx_hash: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EscrowDepositRequest {
    pub recipient: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub balance: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusRequest {
    pub status: TransactionStatus,
    pub error: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<i64>,
}

pub async fn invoices(data: Data<Box<ServerData>>, query: web::Query<InvoiceFilter>) -> HttpResponse {
    let invoices = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_invoices(&mut db_conn, &query).await)
    };
    HttpResponse::Ok().json(json!({
        "invoices": invoices,
    }))
}

pub async fn invoice_create(
    data: Data<Box<ServerData>>,
    new_invoice: web::Json<NewInvoice>,
) -> HttpResponse {
    let details = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(create_invoice(&mut db_conn, &new_invoice).await)
    };
    HttpResponse::Created().json(json!({
        "invoice": details,
    }))
}

pub async fn invoice_details(data: Data<Box<ServerData>>, invoice_id: web::Path<i64>) -> HttpResponse {
    let details = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(get_invoice_details(&mut db_conn, *invoice_id).await)
    };
    HttpResponse::Ok().json(json!({
        "invoice": details,
    }))
}

pub async fn invoice_delete(data: Data<Box<ServerData>>, invoice_id: web::Path<i64>) -> HttpResponse {
    {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(remove_invoice(&mut db_conn, *invoice_id).await)
    };
    HttpResponse::Ok().json(json!({
        "deleted": *invoice_id,
    }))
}

pub async fn invoice_status(
    data: Data<Box<ServerData>>,
    invoice_id: web::Path<i64>,
    request: web::Json<StatusRequest>,
) -> HttpResponse {
    let invoice = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(update_invoice_status(&mut db_conn, *invoice_id, request.status).await)
    };
    HttpResponse::Ok().json(json!({
        "invoice": invoice,
    }))
}

pub async fn invoice_payment(
    data: Data<Box<ServerData>>,
    invoice_id: web::Path<i64>,
    request: web::Json<PaymentRequest>,
) -> HttpResponse {
    let tx = return_on_error!(
        with_invoice_guard(
            &data.shared_state,
            *invoice_id,
            record_payment(
                &data.db_connection,
                data.chain.as_ref(),
                *invoice_id,
                &request.tx_hash
            )
        )
        .await
    );
    HttpResponse::Ok().json(json!({
        "transaction": tx,
    }))
}

pub async fn invoice_escrow_deposit(
    data: Data<Box<ServerData>>,
    invoice_id: web::Path<i64>,
    request: Option<web::Json<EscrowDepositRequest>>,
) -> HttpResponse {
    let chain_setup = return_on_error!(data.setup.get_chain_setup());
    let recipient = request.and_then(|r| r.into_inner().recipient);
    let invoice = return_on_error!(
        escrow_deposit(
            &data.db_connection,
            &data.shared_state,
            data.chain.as_ref(),
            chain_setup,
            *invoice_id,
            recipient.as_deref(),
        )
        .await
    );
    HttpResponse::Ok().json(json!({
        "invoice": invoice,
    }))
}

pub async fn invoice_escrow_release(
    data: Data<Box<ServerData>>,
    invoice_id: web::Path<i64>,
) -> HttpResponse {
    let invoice = return_on_error!(
        escrow_release(
            &data.db_connection,
            &data.shared_state,
            data.chain.as_ref(),
            *invoice_id,
        )
        .await
    );
    HttpResponse::Ok().json(json!({
        "invoice": invoice,
    }))
}

pub async fn clients(data: Data<Box<ServerData>>) -> HttpResponse {
    let clients = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_clients(&mut db_conn).await)
    };
    HttpResponse::Ok().json(json!({
        "clients": clients,
    }))
}

pub async fn client_create(data: Data<Box<ServerData>>, new_client: web::Json<NewClient>) -> HttpResponse {
    let client = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(create_client(&mut db_conn, &new_client).await)
    };
    HttpResponse::Created().json(json!({
        "client": client,
    }))
}

pub async fn client_details(data: Data<Box<ServerData>>, client_id: web::Path<i64>) -> HttpResponse {
    let (client, invoices) = {
        let mut db_conn = data.db_connection.lock().await;
        let client = return_on_error!(get_client_or_err(&mut db_conn, *client_id).await);
        let invoices = return_on_error!(get_invoices_by_client(&mut db_conn, client.id)
            .await
            .map_err(err_from!()));
        (client, invoices)
    };
    HttpResponse::Ok().json(json!({
        "client": client,
        "invoices": invoices,
    }))
}

pub async fn client_update(
    data: Data<Box<ServerData>>,
    client_id: web::Path<i64>,
    changes: web::Json<NewClient>,
) -> HttpResponse {
    let client = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(update_client_details(&mut db_conn, *client_id, &changes).await)
    };
    HttpResponse::Ok().json(json!({
        "client": client,
    }))
}

pub async fn client_delete(data: Data<Box<ServerData>>, client_id: web::Path<i64>) -> HttpResponse {
    {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(remove_client(&mut db_conn, *client_id).await)
    };
    HttpResponse::Ok().json(json!({
        "deleted": *client_id,
    }))
}

pub async fn wallets(data: Data<Box<ServerData>>) -> HttpResponse {
    let wallets = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_wallets(&mut db_conn).await)
    };
    HttpResponse::Ok().json(json!({
        "wallets": wallets,
    }))
}

pub async fn wallet_connect(data: Data<Box<ServerData>>, new_wallet: web::Json<NewWallet>) -> HttpResponse {
    let chain_setup = return_on_error!(data.setup.get_chain_setup());
    let wallet = return_on_error!(
        connect_wallet(
            &data.db_connection,
            data.chain.as_ref(),
            chain_setup,
            &new_wallet
        )
        .await
    );
    HttpResponse::Created().json(json!({
        "wallet": wallet,
    }))
}

pub async fn wallet_default(data: Data<Box<ServerData>>, wallet_id: web::Path<i64>) -> HttpResponse {
    let wallet = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(set_default_wallet(&mut db_conn, *wallet_id).await)
    };
    HttpResponse::Ok().json(json!({
        "wallet": wallet,
    }))
}

pub async fn wallet_balance(
    data: Data<Box<ServerData>>,
    wallet_id: web::Path<i64>,
    request: web::Json<BalanceRequest>,
) -> HttpResponse {
    let wallet = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(set_wallet_balance(&mut db_conn, *wallet_id, request.balance).await)
    };
    HttpResponse::Ok().json(json!({
        "wallet": wallet,
    }))
}

pub async fn wallet_withdraw(
    data: Data<Box<ServerData>>,
    wallet_id: web::Path<i64>,
    request: web::Json<WithdrawRequest>,
) -> HttpResponse {
    let chain_setup = return_on_error!(data.setup.get_chain_setup());
    let tx = return_on_error!(
        withdraw(
            &data.db_connection,
            &data.shared_state,
            data.chain.as_ref(),
            chain_setup,
            *wallet_id,
            &request
        )
        .await
    );
    HttpResponse::Ok().json(json!({
        "transaction": tx,
    }))
}

pub async fn wallet_delete(data: Data<Box<ServerData>>, wallet_id: web::Path<i64>) -> HttpResponse {
    {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(remove_wallet(&mut db_conn, *wallet_id).await)
    };
    HttpResponse::Ok().json(json!({
        "deleted": *wallet_id,
    }))
}

pub async fn transactions(
    data: Data<Box<ServerData>>,
    query: web::Query<TransactionsQuery>,
) -> HttpResponse {
    let transaction_type = query.transaction_type.map(|t| t.as_str());
    let txs = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(get_transactions(&mut db_conn, None, transaction_type, query.limit)
            .await
            .map_err(err_from!()))
    };
    HttpResponse::Ok().json(json!({
        "transactions": txs,
    }))
}

pub async fn transaction_details(data: Data<Box<ServerData>>, tx_id: web::Path<i64>) -> HttpResponse {
    let tx = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(get_transaction_or_err(&mut db_conn, *tx_id).await)
    };
    HttpResponse::Ok().json(json!({
        "transaction": tx,
    }))
}

pub async fn transaction_status(
    data: Data<Box<ServerData>>,
    tx_id: web::Path<i64>,
    request: web::Json<TransactionStatusRequest>,
) -> HttpResponse {
    let tx = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(
            set_transaction_status(&mut db_conn, *tx_id, request.status, request.error.as_deref())
                .await
        )
    };
    HttpResponse::Ok().json(json!({
        "transaction": tx,
    }))
}

pub async fn analytics(data: Data<Box<ServerData>>) -> HttpResponse {
    let (invoices, txs) = {
        let mut db_conn = data.db_connection.lock().await;
        let invoices = return_on_error!(get_invoices(&mut db_conn, None, None, None)
            .await
            .map_err(err_from!()));
        let txs = return_on_error!(get_transactions(
            &mut db_conn,
            Some(TX_FILTER_CONFIRMED),
            None,
            None
        )
        .await
        .map_err(err_from!()));
        (invoices, txs)
    };
    let analytics = return_on_error!(compute_analytics(&invoices, &txs, chrono::Utc::now()));
    HttpResponse::Ok().json(json!({
        "analytics": analytics,
    }))
}

fn attachment(content_type: &str, file_name: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{file_name}\""),
        ))
        .body(body)
}

pub async fn export_invoices_csv_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let invoices = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_invoices(&mut db_conn, &InvoiceFilter::default()).await)
    };
    let body = return_on_error!(export_invoices_csv(&invoices));
    attachment("text/csv", "invoices.csv", body)
}

pub async fn export_invoices_json_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let invoices = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(list_invoices(&mut db_conn, &InvoiceFilter::default()).await)
    };
    let body = return_on_error!(export_json(&invoices));
    attachment("application/json", "invoices.json", body)
}

pub async fn export_transactions_csv_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let txs = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(get_transactions(&mut db_conn, None, None, None)
            .await
            .map_err(err_from!()))
    };
    let body = return_on_error!(export_transactions_csv(&txs));
    attachment("text/csv", "transactions.csv", body)
}

pub async fn export_transactions_json_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let txs = {
        let mut db_conn = data.db_connection.lock().await;
        return_on_error!(get_transactions(&mut db_conn, None, None, None)
            .await
            .map_err(err_from!()))
    };
    let body = return_on_error!(export_json(&txs));
    attachment("application/json", "transactions.json", body)
}

pub async fn config_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let chain_setup = return_on_error!(data.setup.get_chain_setup());
    HttpResponse::Ok().json(json!({
        "config": chain_setup,
        "serviceAddress": data.setup.service_address(),
    }))
}

pub async fn debug_endpoint(data: Data<Box<ServerData>>) -> HttpResponse {
    let shared_state = data.shared_state.lock().await.clone();
    let (all, open, settled) = {
        let mut db_conn = data.db_connection.lock().await;
        (
            return_on_error!(get_invoice_count(&mut db_conn, None)
                .await
                .map_err(err_from!())),
            return_on_error!(get_invoice_count(&mut db_conn, Some(INVOICE_FILTER_OPEN))
                .await
                .map_err(err_from!())),
            return_on_error!(get_invoice_count(&mut db_conn, Some(INVOICE_FILTER_SETTLED))
                .await
                .map_err(err_from!())),
        )
    };
    HttpResponse::Ok().json(json!({
        "sharedState": shared_state,
        "invoiceCounts": {
            "all": all,
            "open": open,
            "settled": settled,
        },
    }))
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| extractor_error(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| extractor_error(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _req| extractor_error(err)));
    cfg.route("/invoices", web::get().to(invoices))
        .route("/invoices", web::post().to(invoice_create))
        .route("/invoices/{id}", web::get().to(invoice_details))
        .route("/invoices/{id}", web::delete().to(invoice_delete))
        .route("/invoices/{id}/status", web::post().to(invoice_status))
        .route("/invoices/{id}/payment", web::post().to(invoice_payment))
        .route(
            "/invoices/{id}/escrow/deposit",
            web::post().to(invoice_escrow_deposit),
        )
        .route(
            "/invoices/{id}/escrow/release",
            web::post().to(invoice_escrow_release),
        )
        .route("/clients", web::get().to(clients))
        .route("/clients", web::post().to(client_create))
        .route("/clients/{id}", web::get().to(client_details))
        .route("/clients/{id}", web::put().to(client_update))
        .route("/clients/{id}", web::delete().to(client_delete))
        .route("/wallets", web::get().to(wallets))
        .route("/wallets/connect", web::post().to(wallet_connect))
        .route("/wallets/{id}/default", web::post().to(wallet_default))
        .route("/wallets/{id}/balance", web::post().to(wallet_balance))
        .route("/wallets/{id}/withdraw", web::post().to(wallet_withdraw))
        .route("/wallets/{id}", web::delete().to(wallet_delete))
        .route("/transactions", web::get().to(transactions))
        .route("/transactions/{id}", web::get().to(transaction_details))
        .route("/transactions/{id}/status", web::post().to(transaction_status))
        .route("/analytics", web::get().to(analytics))
        .route(
            "/export/invoices.csv",
            web::get().to(export_invoices_csv_endpoint),
        )
        .route(
            "/export/invoices.json",
            web::get().to(export_invoices_json_endpoint),
        )
        .route(
            "/export/transactions.csv",
            web::get().to(export_transactions_csv_endpoint),
        )
        .route(
            "/export/transactions.json",
            web::get().to(export_transactions_json_endpoint),
        )
        .route("/config", web::get().to(config_endpoint))
        .route("/debug", web::get().to(debug_endpoint));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::db::create_sqlite_connection;
    use crate::setup::test_chain_setup;
    use actix_web::{test, App};
    use std::collections::BTreeMap;

    async fn server_data() -> Data<Box<ServerData>> {
        let conn = create_sqlite_connection(None, true).await.unwrap();
        let mut chain_setup = BTreeMap::new();
        chain_setup.insert(5, test_chain_setup());
        Data::new(Box::new(ServerData {
            shared_state: Arc::new(Mutex::new(SharedState::default())),
            db_connection: Arc::new(Mutex::new(conn)),
            chain: Arc::new(MockChainClient::new()),
            setup: InvoiceSetup {
                chain_setup,
                secret_key: None,
                chain_id: 5,
            },
        }))
    }

    #[actix_web::test]
    async fn test_invoice_endpoints() {
        let app = test::init_service(
            App::new()
                .app_data(server_data().await)
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/invoices")
            .set_json(json!({
                "title": "Consulting",
                "amount": "120.5",
                "currency": "USD",
                "cryptoCurrency": "USDC",
                "escrowEnabled": true,
                "escrowDays": 7
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["invoice"]["invoiceNumber"], "INV-00001");
        assert_eq!(body["invoice"]["amount"], "120.50");
        assert_eq!(body["invoice"]["statusLabel"], "Draft");

        let req = test::TestRequest::get()
            .uri("/invoices?search=consult&status=draft")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["invoices"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri("/invoices/1/escrow/deposit")
            .set_json(json!({
                "recipient": "0x00000000000000000000000000000000000000b0"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["invoice"]["status"], "escrow_held");

        let req = test::TestRequest::get().uri("/analytics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["analytics"]["heldInEscrow"], "120.50");

        let req = test::TestRequest::get().uri("/debug").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["invoiceCounts"]["all"], 1);
        assert_eq!(body["invoiceCounts"]["open"], 1);
        assert_eq!(body["invoiceCounts"]["settled"], 0);
        assert_eq!(body["sharedState"]["invoicesInFlight"], json!([]));
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let app = test::init_service(
            App::new()
                .app_data(server_data().await)
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/invoices")
            .set_json(json!({
                "title": "",
                "amount": "1",
                "currency": "USD",
                "cryptoCurrency": "ETH"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid title: is required");

        let req = test::TestRequest::get().uri("/clients/42").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/export/transactions.csv").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_malformed_requests_use_error_body() {
        let app = test::init_service(
            App::new()
                .app_data(server_data().await)
                .configure(configure_api),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/invoices/1/status")
            .set_json(json!({ "status": "bogus" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("unknown variant"));

        let req = test::TestRequest::get()
            .uri("/invoices?status=bogus")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());

        let req = test::TestRequest::get().uri("/invoices/abc").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }
}
