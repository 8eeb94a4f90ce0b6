//! Hot-reload coordinator.
//!
//! Polls the spec file's mtime from a background task. On change the spec is
//! re-read and recompiled into a brand-new router which replaces the active
//! one in a single swap; a failed recompile keeps the previous router and
//! route set untouched.

use crate::config::Config;
use crate::server::router::{CompiledRouter, RouterHandle};
use crate::spec;
use crate::store::MockStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Added/removed route labels by set difference, sorted for stable output.
pub fn diff_routes(
    prev: &HashSet<String>,
    next: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut added: Vec<String> = next.difference(prev).cloned().collect();
    let mut removed: Vec<String> = prev.difference(next).cloned().collect();
    added.sort();
    removed.sort();
    (added, removed)
}

pub struct ReloadCoordinator {
    config: Arc<Config>,
    router: Arc<RouterHandle>,
    store: Arc<MockStore>,
    current_routes: Mutex<HashSet<String>>,
}

impl ReloadCoordinator {
    pub fn new(
        config: Arc<Config>,
        router: Arc<RouterHandle>,
        store: Arc<MockStore>,
        initial_routes: HashSet<String>,
    ) -> Self {
        Self {
            config,
            router,
            store,
            current_routes: Mutex::new(initial_routes),
        }
    }

    /// Recompile from disk and publish. Nothing is applied unless the whole
    /// rebuild succeeds.
    pub fn reload(&self) -> Result<(Vec<String>, Vec<String>), anyhow::Error> {
        let doc = spec::load_document(self.config.spec_path())?;
        let router = CompiledRouter::compile(&doc)?;
        let next = router.labels();

        let (added, removed) = {
            let mut current = self.current_routes.lock();
            let diff = diff_routes(&current, &next);
            *current = next;
            diff
        };
        self.router.swap(router);

        if !self.config.preserve_state_on_reload {
            self.store.reset();
        }
        Ok((added, removed))
    }

    /// Watch loop; runs until the server task is dropped.
    pub async fn watch(self: Arc<Self>) {
        let mut last_modified = file_mtime(self.config.spec_path()).await;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let modified = file_mtime(self.config.spec_path()).await;
            if modified.is_none() || modified == last_modified {
                continue;
            }
            last_modified = modified;

            match self.reload() {
                Ok((added, removed)) => {
                    info!("spec updated, routes reloaded");
                    for route in &added {
                        info!("  + {route}");
                    }
                    for route in &removed {
                        info!("  - {route}");
                    }
                }
                Err(e) => {
                    // Previous router stays active.
                    error!("failed to reload spec: {e:#}");
                }
            }
        }
    }
}

async fn file_mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
