//! Process-wide context constructed on the lifecycle-enter callback and torn down on exit.
//! Modeled on `main.rs`'s bootstrap plus `ServiceManager::shutdown` for graceful teardown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::manager::BundleManager;

pub struct AppContext {
    pub manager: Arc<BundleManager>,
    cleanup_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let cancel = CancellationToken::new();
        let manager = Arc::new(BundleManager::new(settings));

        if manager.settings().cleanup_orphaned {
            let bin = manager.settings().serve_tool_bin.clone();
            tokio::spawn(async move {
                crate::supervisor::reap_orphans(&bin, None).await;
            });
        }

        let cleanup_task = if manager.settings().periodic_cleanup {
            let manager = manager.clone();
            let interval = manager.settings().cleanup_interval;
            let bin = manager.settings().serve_tool_bin.clone();
            let cancel = cancel.clone();
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            crate::supervisor::reap_orphans(&bin, None).await;
                            manager.sweep_stale_extraction_dirs(interval * 2).await;
                        }
                    }
                }
            }))
        } else {
            None
        };

        AppContext {
            manager,
            cleanup_task,
            cancel,
        }
    }

    /// Cancel background tasks and tear down the active bundle, if any.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.cancel.cancel();
        if let Some(task) = &self.cleanup_task {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
                while !task.is_finished() {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                }
            })
            .await;
        }
        self.manager.shutdown().await;
    }
}
