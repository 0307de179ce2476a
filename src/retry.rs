//! Retry logic with exponential backoff
//!
//! Used for filesystem operations that fail transiently while another process
//! still holds a handle (browser, antivirus, indexer), most notably deleting a
//! file that was just moved or extracted.
//!
//! # Example
//!
//! ```no_run
//! use mod_ingest::retry::with_retry;
//! use mod_ingest::config::RetryConfig;
//!
//! # async fn example() -> std::io::Result<()> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async {
//!     tokio::fs::remove_file("/downloads/old.zip").await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (file locked, permission temporarily denied, interrupted)
/// should return `true`. Permanent failures (not found, invalid archive) should
/// return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
#[cfg(windows)]
const WINDOWS_LOCK_ERRORS: [i32; 2] = [32, 33];

impl IsRetryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        #[cfg(windows)]
        {
            if self
                .raw_os_error()
                .is_some_and(|code| WINDOWS_LOCK_ERRORS.contains(&code))
            {
                return true;
            }
        }

        matches!(
            self.kind(),
            std::io::ErrorKind::PermissionDenied
                | std::io::ErrorKind::ResourceBusy
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        )
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Io(e) => e.is_retryable(),
            // Moving a file can fail while the source is still locked
            Error::Extraction(crate::error::ExtractionError::MoveFailed { .. }) => true,
            Error::Extraction(_) => false,
            // A file that is not an archive will not become one
            Error::InvalidArchive { .. } => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::FolderWatch(_) => false,
            Error::Cancelled | Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs once plus up to `config.max_attempts` retries. The delay
/// starts at `initial_delay` and is multiplied by `backoff_multiplier` after
/// every failed attempt, capped at `max_delay`.
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                // Negative or NaN products fall back to the cap
                let next_delay =
                    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                        .unwrap_or(config.max_delay);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
