//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::provider::SharedConfig;
use crate::config::schema::RefinerConfig;

/// Watches a configuration file and publishes every valid reload.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RefinerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its reloads.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RefinerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Reloads stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &target) => reload(&target, &update_tx),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn is_relevant(event: &Event, target: &Path) -> bool {
    let touches_file = event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|p| p.ends_with(target) || target.ends_with(p));
    touches_file && (event.kind.is_modify() || event.kind.is_create())
}

/// Load and validate `path`; publish it only if it is valid. A rejected file
/// leaves the current configuration in place.
fn reload(path: &Path, tx: &mpsc::UnboundedSender<RefinerConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Config file changed, reloaded");
            if tx.send(config).is_err() {
                tracing::debug!("Config update receiver dropped");
            }
        }
        Err(e) => tracing::error!(
            path = %path.display(),
            error = %e,
            "Rejected config reload, keeping current configuration"
        ),
    }
}

/// Swap each received configuration into `shared` until shutdown or until
/// the sending side closes.
pub async fn apply_updates(
    shared: Arc<SharedConfig>,
    mut updates: mpsc::UnboundedReceiver<RefinerConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    tracing::info!(
                        active_backend = %config.backend.active,
                        model = %config.backend.model,
                        "Applying reloaded configuration"
                    );
                    shared.store(config);
                }
                None => break,
            },
            _ = shutdown.recv() => {
                tracing::info!("Config reload task received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
