use crate::chain::{ChainClient, Web3ChainClient};
use crate::config;
use crate::db::create_sqlite_connection;
use crate::err_create;
use crate::error::{AlreadyProcessingError, InvoiceError};
use crate::setup::InvoiceSetup;
use secp256k1::SecretKey;
use serde::{Serialize, Serializer};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::Mutex;

/// Ids with a chain operation in flight. Clones share one set.
#[derive(Debug, Clone)]
pub struct InFlight {
    entity: &'static str,
    ids: Arc<std::sync::Mutex<BTreeSet<i64>>>,
}

impl InFlight {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            ids: Default::default(),
        }
    }

    fn ids(&self) -> MutexGuard<'_, BTreeSet<i64>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, id: i64) -> Result<InFlightSlot, InvoiceError> {
        if !self.ids().insert(id) {
            return Err(err_create!(AlreadyProcessingError {
                entity: self.entity,
                id
            }));
        }
        Ok(InFlightSlot {
            ids: self.ids.clone(),
            id,
        })
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids().contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

impl Serialize for InFlight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ids: Vec<i64> = self.ids().iter().copied().collect();
        serializer.collect_seq(ids)
    }
}

/// Frees its id on drop, including when the owning future is cancelled.
#[derive(Debug)]
pub struct InFlightSlot {
    ids: Arc<std::sync::Mutex<BTreeSet<i64>>>,
    id: i64,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    /// Invoices with an escrow or payment call in flight.
    pub invoices_in_flight: InFlight,
    /// Wallets with a withdrawal in flight.
    pub wallets_in_flight: InFlight,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            invoices_in_flight: InFlight::new("Invoice"),
            wallets_in_flight: InFlight::new("Wallet"),
        }
    }
}

impl SharedState {
    pub fn begin_chain_operation(&self, invoice_id: i64) -> Result<InFlightSlot, InvoiceError> {
        self.invoices_in_flight.begin(invoice_id)
    }

    pub fn begin_withdrawal(&self, wallet_id: i64) -> Result<InFlightSlot, InvoiceError> {
        self.wallets_in_flight.begin(wallet_id)
    }
}

/// Runs `operation` while holding the in-flight slot of `invoice_id`.
pub async fn with_invoice_guard<T, F>(
    shared_state: &Mutex<SharedState>,
    invoice_id: i64,
    operation: F,
) -> Result<T, InvoiceError>
where
    F: Future<Output = Result<T, InvoiceError>>,
{
    let _slot = shared_state.lock().await.begin_chain_operation(invoice_id)?;
    operation.await
}

/// Runs `operation` while holding the withdrawal slot of `wallet_id`.
pub async fn with_wallet_guard<T, F>(
    shared_state: &Mutex<SharedState>,
    wallet_id: i64,
    operation: F,
) -> Result<T, InvoiceError>
where
    F: Future<Output = Result<T, InvoiceError>>,
{
    let _slot = shared_state.lock().await.begin_withdrawal(wallet_id)?;
    operation.await
}

pub struct InvoiceRuntime {
    pub setup: InvoiceSetup,
    pub shared_state: Arc<Mutex<SharedState>>,
    pub conn: Arc<Mutex<SqliteConnection>>,
    pub chain: Arc<dyn ChainClient>,
}

pub async fn start_invoice_engine(
    db_filename: Option<&str>,
    secret_key: Option<SecretKey>,
    config: config::Config,
    chain_id: i64,
) -> Result<InvoiceRuntime, InvoiceError> {
    let setup = InvoiceSetup::new(&config, secret_key, chain_id)?;
    log::debug!("Starting invoice engine: {:#?}", setup.chain_setup);

    match db_filename {
        Some(file) => log::info!("connecting to sqlite file db: {}", file),
        None => log::warn!("using in-memory db, data is lost on exit"),
    }
    let conn = create_sqlite_connection(db_filename, true).await?;

    let chain_setup = setup.get_chain_setup()?.clone();
    if let Some(addr) = setup.service_address() {
        log::info!(
            "Service account {:#x} on chain {} ({})",
            addr,
            chain_setup.chain_id,
            chain_setup.currency_symbol
        );
    } else {
        log::warn!("No signing key loaded, escrow and withdrawals are disabled");
    }
    let chain = Arc::new(Web3ChainClient::new(chain_setup, setup.secret_key));

    Ok(InvoiceRuntime {
        setup,
        shared_state: Arc::new(Mutex::new(SharedState::default())),
        conn: Arc::new(Mutex::new(conn)),
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBag;
    use std::time::Duration;

    #[test]
    fn test_in_flight_guard() {
        let state = SharedState::default();
        let slot = state.begin_chain_operation(1).unwrap();
        assert!(state.begin_chain_operation(1).is_err());
        let _other = state.begin_chain_operation(2).unwrap();
        assert!(state.begin_withdrawal(1).is_ok());
        drop(slot);
        assert!(!state.invoices_in_flight.contains(1));
        assert!(state.begin_chain_operation(1).is_ok());
        assert_eq!(
            serde_json::to_value(&state).unwrap()["invoicesInFlight"],
            serde_json::json!([2])
        );
    }

    #[tokio::test]
    async fn test_guard_released_after_error() {
        let state = Mutex::new(SharedState::default());
        let res: Result<(), InvoiceError> = with_invoice_guard(&state, 7, async {
            Err(crate::err_custom_create!("boom"))
        })
        .await;
        assert!(res.is_err());
        assert!(state.lock().await.invoices_in_flight.is_empty());

        let _slot = state.lock().await.begin_chain_operation(7).unwrap();
        let res = with_invoice_guard(&state, 7, async { Ok(()) }).await;
        let err = res.unwrap_err();
        assert_eq!(
            err.inner.to_string(),
            "Invoice 7 already has a chain operation in progress"
        );
        assert!(matches!(err.inner, ErrorBag::AlreadyProcessingError(_)));
    }

    #[tokio::test]
    async fn test_guard_released_when_cancelled() {
        let state = Mutex::new(SharedState::default());
        let res = tokio::time::timeout(
            Duration::from_millis(50),
            with_invoice_guard(&state, 7, async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }),
        )
        .await;
        assert!(res.is_err());
        assert!(state.lock().await.invoices_in_flight.is_empty());
        assert!(with_invoice_guard(&state, 7, async { Ok(()) }).await.is_ok());

        let res = tokio::time::timeout(
            Duration::from_millis(50),
            with_wallet_guard(&state, 3, async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }),
        )
        .await;
        assert!(res.is_err());
        assert!(state.lock().await.wallets_in_flight.is_empty());
    }
}
