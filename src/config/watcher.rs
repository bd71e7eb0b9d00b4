//! Configuration file watcher for hot reload of region descriptors.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use crate::config::loader::load_config;
use crate::uptime::rebalance::RegionSource;

/// Watches the configuration file and swaps reloaded region descriptors
/// into a [`RegionSource`].
pub struct ConfigWatcher {
    path: PathBuf,
    regions: RegionSource,
}

impl ConfigWatcher {
    pub fn new(path: &Path, regions: RegionSource) -> Self {
        Self {
            path: path.to_path_buf(),
            regions,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let regions = self.regions.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(config) => {
                            let enabled = config.enabled_regions().count();
                            regions.replace(config.regions);
                            tracing::info!(enabled_regions = enabled, "Region configuration reloaded");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current regions");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
