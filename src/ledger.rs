//! Caller-side view of billable transactions.
//!
//! Reconciliation needs the caller's current list of billable transactions, ordered
//! by creation time ascending. The lookup is injected through [`BillableTransactions`]
//! so the submitter never depends on a storage layer. Any async closure returning
//! `Result<Vec<T>, E>` is accepted; [`JsonRideLedger`] is a file-backed implementation
//! used by the `ride-payment-submitter` binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LocalDataSource;

/// Source of the caller's billable transactions.
///
/// Invoked at most once per submission attempt, and only when the gateway did not
/// confirm the payment outright. Implementations may hit a database each time.
pub trait BillableTransactions {
    type Transaction;

    fn ordered_by_creation_asc(
        &self,
    ) -> impl Future<Output = Result<Vec<Self::Transaction>, LocalDataSource>> + Send;
}

impl<F, Fut, T, E> BillableTransactions for F
where
    F: Fn() -> Fut + Sync,
    Fut: Future<Output = Result<Vec<T>, E>> + Send,
    T: Send,
    E: Into<LocalDataSource>,
{
    type Transaction = T;

    fn ordered_by_creation_asc(
        &self,
    ) -> impl Future<Output = Result<Vec<T>, LocalDataSource>> + Send {
        let fut = (self)();
        async move { fut.await.map_err(Into::into) }
    }
}

/// A completed ride that is expected to be paid exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
    pub id: String,
    pub user_id: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to read ride ledger at {0}: {1}")]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse ride ledger at {0}: {1}")]
    JsonParse(PathBuf, #[source] serde_json::Error),
}

/// Rides kept as a JSON array in a file, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct JsonRideLedger {
    path: PathBuf,
    user_id: Option<String>,
}

impl JsonRideLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            user_id: None,
        }
    }

    /// Restricts the ledger to rides of one payer.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the rides, filtered by payer and sorted by `created_at` then `id`.
    pub async fn load(&self) -> Result<Vec<Ride>, LedgerError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LedgerError::FileRead(self.path.clone(), e))?;
        let mut rides: Vec<Ride> = serde_json::from_slice(&content)
            .map_err(|e| LedgerError::JsonParse(self.path.clone(), e))?;
        if let Some(user_id) = &self.user_id {
            rides.retain(|ride| &ride.user_id == user_id);
        }
        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rides)
    }
}

impl BillableTransactions for JsonRideLedger {
    type Transaction = Ride;

    fn ordered_by_creation_asc(
        &self,
    ) -> impl Future<Output = Result<Vec<Ride>, LocalDataSource>> + Send {
        async move { self.load().await.map_err(Into::into) }
    }
}
