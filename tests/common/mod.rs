//! Shared fixtures for end-to-end pipeline tests

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use mod_ingest::{Config, Event, IngestService};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Directory layout used by every end-to-end test
pub struct Harness {
    pub temp_dir: TempDir,
    pub downloads: PathBuf,
    pub mods: PathBuf,
    pub staging: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let downloads = temp_dir.path().join("downloads");
        let mods = temp_dir.path().join("mods");
        let staging = temp_dir.path().join("staging");
        for dir in [&downloads, &mods, &staging] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Self {
            temp_dir,
            downloads,
            mods,
            staging,
        }
    }

    /// Fast-polling configuration pointing at this harness
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.watch.directories = vec![self.downloads.clone()];
        config.watch.poll_interval = Duration::from_millis(20);
        config.install.mod_destination = Some(self.mods.clone());
        config.readiness.sample_delay = Duration::from_millis(10);
        config.extraction.auto_delete_delay = Duration::from_millis(10);
        config.persistence.snapshot_path = self.temp_dir.path().join("queue.json");
        config
    }

    /// Build a service, subscribe to it and start it
    pub async fn start(&self, config: Config) -> (IngestService, broadcast::Receiver<Event>) {
        let service = IngestService::new(config).await.unwrap();
        let events = service.subscribe();
        service.start().unwrap();
        (service, events)
    }

    /// Write a file in staging and move it into the downloads folder, like a
    /// browser finishing a download
    pub fn deliver(&self, name: &str, content: &[u8]) -> PathBuf {
        let staged = self.staging.join(name);
        std::fs::write(&staged, content).unwrap();
        let target = self.downloads.join(name);
        std::fs::rename(&staged, &target).unwrap();
        target
    }

    /// Build a ZIP in staging and move it into the downloads folder
    pub fn deliver_zip(&self, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let staged = self.staging.join(name);
        write_zip(&staged, files);
        let target = self.downloads.join(name);
        std::fs::rename(&staged, &target).unwrap();
        target
    }
}

/// Create a ZIP archive containing the given files
pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
