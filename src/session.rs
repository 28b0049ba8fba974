//! Scoped transactions over the connection pool.
//!
//! [`with_transaction`] begins a transaction, hands the connection to the
//! operation, and commits only if it returns `Ok`. An `Err` rolls back
//! explicitly; a panic or a dropped future rolls back through
//! `sqlx::Transaction`'s drop.

use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};

use emissions_core::{Error, Result};

/// Maps a driver error to [`Error::StorageUnavailable`].
pub fn storage_error(err: sqlx::Error) -> Error {
    tracing::error!(error = %err, "storage operation failed");
    Error::storage(err.to_string())
}

/// Runs `op` inside one transaction.
///
/// The closure must own what it needs, since the future it returns borrows
/// only the connection:
///
/// ```rust,no_run
/// # use emissions_api::session::with_transaction;
/// # async fn demo(pool: &sqlx::SqlitePool) -> emissions_core::Result<()> {
/// let name = String::from("a.csv");
/// with_transaction(pool, move |conn| {
///     Box::pin(async move {
///         sqlx::query("INSERT INTO imported_files (filename, imported_at) VALUES (?, 0)")
///             .bind(&name)
///             .execute(&mut *conn)
///             .await
///             .map_err(emissions_api::session::storage_error)?;
///         Ok(())
///     })
/// })
/// .await
/// # }
/// ```
pub async fn with_transaction<T, F>(pool: &SqlitePool, op: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut tx = pool.begin().await.map_err(storage_error)?;
    match op(&mut *tx).await {
        Ok(value) => {
            tx.commit().await.map_err(storage_error)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
