//! Configuration file watcher for hot reload.
//!
//! Editors often emit several notify events for one save. Events are
//! coalesced over a short settle window, then the file is loaded once, and
//! the config is forwarded only if its route table actually changed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{GatewayConfig, RouteConfig};

const SETTLE: Duration = Duration::from_millis(250);

/// A watcher that monitors the configuration file for changes.
///
/// Only configs that parse and validate are forwarded; a broken edit keeps
/// the running route table in place.
pub struct ConfigWatcher {
    path: PathBuf,
    current_routes: Vec<RouteConfig>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the routes already in service.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(
        path: &Path,
        current_routes: Vec<RouteConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current_routes,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned handle must be kept alive.
    ///
    /// Must be called inside a Tokio runtime; reloads run on a spawned task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");

        tokio::spawn(reload_loop(
            self.path,
            self.current_routes,
            event_rx,
            self.update_tx,
        ));
        Ok(watcher)
    }
}

async fn reload_loop(
    path: PathBuf,
    mut current_routes: Vec<RouteConfig>,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<GatewayConfig>,
) {
    while events.recv().await.is_some() {
        tokio::time::sleep(SETTLE).await;
        while events.try_recv().is_ok() {}

        tracing::info!(path = ?path, "Config file change detected, reloading");
        match load_config(&path) {
            Ok(config) if config.routes == current_routes => {
                tracing::debug!("Route table unchanged, nothing to apply");
            }
            Ok(config) => {
                current_routes = config.routes.clone();
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current route table");
            }
        }
    }
}
