use std::future::Future;

use mirrorsync_config::shared::RetryConfig;
use tracing::{error, info, warn};

use crate::error::{ErrorKind, SyncResult};

/// Error kinds that fail a run immediately, since repeating it cannot change the outcome.
const NON_RETRYABLE_KINDS: [ErrorKind; 4] = [
    ErrorKind::UnknownDataset,
    ErrorKind::CatalogLookupFailed,
    ErrorKind::InvalidTemplate,
    ErrorKind::ValidationAbort,
];

fn is_retryable(kinds: &[ErrorKind]) -> bool {
    !kinds.iter().any(|kind| NON_RETRYABLE_KINDS.contains(kind))
}

/// Runs `operation` up to `retry.max_attempts` times with a fixed delay between attempts.
///
/// The last error is logged and returned once the attempts are exhausted.
pub async fn run_with_retry<F, Fut, T>(
    retry: RetryConfig,
    task_name: &str,
    mut operation: F,
) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(task_name, attempt, "run succeeded after retrying");
                }

                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !is_retryable(&err.kinds()) {
            error!(task_name, attempt, max_attempts, error = %err, "run failed");

            return Err(err);
        }

        warn!(
            task_name,
            attempt,
            max_attempts,
            error = %err,
            "run failed, retrying"
        );
        tokio::time::sleep(retry.delay()).await;
        attempt += 1;
    }
}
