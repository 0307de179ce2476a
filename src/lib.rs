//! # mod-ingest
//!
//! Download-folder ingestion and archive extraction pipeline for game mod files.
//!
//! Files landing in a watched download directory are queued, probed until the
//! browser has finished writing them, then classified:
//! - **Mod files** (`.pmp`, `.ttmp`, `.ttmp2`) are moved into the mod folder
//! - **Archives** (`.zip`, `.7z`, `.rar`) are inspected; the user picks which
//!   mod files to extract (or everything is extracted when auto-install is on)
//!
//! The queue survives restarts through a JSON snapshot. Consumers subscribe to
//! [`Event`]s and map them onto UI messages with [`Event::to_outbound`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use mod_ingest::{Config, IngestService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.watch.directories = vec!["/home/me/Downloads".into()];
//!     config.install.mod_destination = Some("/home/me/Mods".into());
//!
//!     let service = IngestService::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Some(outbound) = event.to_outbound() {
//!                 println!("{} <- {:?}", outbound.endpoint, outbound.message);
//!             }
//!         }
//!     });
//!
//!     service.start()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// File classification and relocation
pub mod classifier;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive inspection and extraction
pub mod extraction;
/// Download directory watching
pub mod folder_watcher;
/// UI message contract
pub mod messages;
/// Persistent ingestion queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Archive selection handshake
pub mod selection;
/// Service composition root
pub mod service;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use classifier::{Classification, Classifier};
pub use config::{Config, FileCollisionAction};
pub use error::{Error, ExtractionError, Result};
pub use extraction::Extractor;
pub use folder_watcher::DirectoryWatcher;
pub use messages::{Endpoint, OutboundMessage, StatusMessage, TaskStatus};
pub use queue::{FileProcessor, IgnoreList, IngestQueue};
pub use selection::SelectionCoordinator;
pub use service::IngestService;
pub use types::{ArchiveEntryInfo, Event, QueueEntry, TaskId};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use mod_ingest::{IngestService, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::from_json_file("mod-ingest.json".as_ref())?;
///     let service = IngestService::new(config).await?;
///     service.start()?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: IngestService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
