//! Operation-level deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::error::CoreError;

/// Run `fut` under a deadline, converting its error into [`CoreError`].
///
/// Expiry yields [`CoreError::Timeout`] naming `operation`.
pub async fn with_deadline<T, E, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<CoreError>,
{
    match timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(operation, ?limit, "Operation timed out");
            Err(CoreError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}
