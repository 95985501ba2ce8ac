//! Configuration file watcher for hot reload.
//!
//! Watches the file's parent directory, so editors that save by renaming a
//! temp file over the original are still seen. Each valid config that differs
//! from the previously sent one is forwarded once.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;

/// Watches one configuration file and sends reloaded configs.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServiceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServiceConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned watcher stops when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);

        let mut reloader = Reloader {
            path: self.path.clone(),
            file_name,
            update_tx: self.update_tx,
            last_sent: None,
        };
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| reloader.handle(res),
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

struct Reloader {
    path: PathBuf,
    file_name: Option<OsString>,
    update_tx: mpsc::UnboundedSender<ServiceConfig>,
    last_sent: Option<ServiceConfig>,
}

impl Reloader {
    fn handle(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Config watch error");
                return;
            }
        };
        if !(event.kind.is_modify() || event.kind.is_create()) || !self.concerns_file(&event) {
            return;
        }

        match load_config(&self.path) {
            Ok(config) if self.last_sent.as_ref() == Some(&config) => {}
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "Config file changed, reloading");
                if self.update_tx.send(config.clone()).is_ok() {
                    self.last_sent = Some(config);
                }
            }
            // Partial writes show up as parse errors until the writer finishes.
            Err(e) => tracing::error!(
                error = %e,
                "Failed to reload config, keeping current configuration"
            ),
        }
    }

    fn concerns_file(&self, event: &Event) -> bool {
        event
            .paths
            .iter()
            .any(|path| path.file_name().map(OsString::from) == self.file_name)
    }
}
