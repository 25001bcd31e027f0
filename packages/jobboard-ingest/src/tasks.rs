//! Named units of work and the worker pool that executes them.
//!
//! Tasks arrive over a plain message channel rather than a specific
//! broker; the queue in front of it only needs at-least-once delivery
//! because every handler bottoms out in idempotent upserts and the
//! atomic claim step.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::discovery::DiscoveryCrawler;
use crate::dispatch::Dispatcher;
use crate::error::{IngestError, Result};
use crate::sync::CategorySynchronizer;
use crate::traits::{PlatformAdapter, Storage};
use crate::types::Platform;

/// A named unit of work, safe to redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Synchronize one platform's category tree
    SyncCategories { platform: Platform },
    /// Discover listing URLs for one category
    CrawlCategory {
        platform: Platform,
        category_id: String,
    },
    /// Claim and process one batch of discovered URLs
    ProcessUrls { platform: Platform },
}

/// Create the task channel the worker pool consumes.
pub fn task_channel(capacity: usize) -> (mpsc::Sender<Task>, mpsc::Receiver<Task>) {
    mpsc::channel(capacity)
}

/// Routes tasks to the right component for their platform.
///
/// Holds one adapter (and optional root-category map) per registered
/// platform; components are built per task from shared handles, so the
/// engine itself carries no mutable state.
pub struct IngestEngine<S> {
    storage: Arc<S>,
    config: IngestConfig,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    root_maps: HashMap<Platform, HashMap<String, String>>,
}

impl<S: Storage> IngestEngine<S> {
    pub fn new(storage: Arc<S>, config: IngestConfig) -> Self {
        Self {
            storage,
            config,
            adapters: HashMap::new(),
            root_maps: HashMap::new(),
        }
    }

    /// Register a platform adapter.
    pub fn register(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    /// Register a platform adapter with a root-category mapping for its
    /// category sync.
    pub fn register_with_root_map(
        mut self,
        adapter: Arc<dyn PlatformAdapter>,
        root_map: HashMap<String, String>,
    ) -> Self {
        self.root_maps.insert(adapter.platform(), root_map);
        self.register(adapter)
    }

    fn adapter(&self, platform: &Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(platform)
            .cloned()
            .ok_or_else(|| IngestError::UnknownPlatform(platform.to_string()))
    }

    /// Execute one task to completion.
    pub async fn handle(&self, task: Task, cancel: &CancellationToken) -> Result<()> {
        match task {
            Task::SyncCategories { platform } => {
                let adapter = self.adapter(&platform)?;
                let mut sync = CategorySynchronizer::new(self.storage.clone());
                if let Some(root_map) = self.root_maps.get(&platform) {
                    sync = sync.with_root_map(root_map.clone());
                }
                sync.run(adapter.as_ref()).await?;
                Ok(())
            }
            Task::CrawlCategory {
                platform,
                category_id,
            } => {
                let adapter = self.adapter(&platform)?;
                let crawler =
                    DiscoveryCrawler::new(adapter, self.storage.clone(), self.config.clone());
                crawler.crawl_category(&category_id, cancel).await?;
                Ok(())
            }
            Task::ProcessUrls { platform } => {
                let adapter = self.adapter(&platform)?;
                let dispatcher =
                    Dispatcher::new(adapter, self.storage.clone(), self.config.clone());
                dispatcher.run_batch(cancel).await?;
                Ok(())
            }
        }
    }
}

/// A pool of workers draining the task channel.
///
/// Workers stop when the channel closes or the token cancels. A failed
/// task is logged and dropped here — redelivery is the queue's job, and
/// handlers are idempotent under it.
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub async fn run<S>(
        &self,
        engine: Arc<IngestEngine<S>>,
        receiver: mpsc::Receiver<Task>,
        cancel: CancellationToken,
    ) where
        S: Storage + 'static,
    {
        let pool_id = uuid::Uuid::new_v4();
        info!(pool_id = %pool_id, workers = self.workers, "Worker pool starting");

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.workers {
            let engine = Arc::clone(&engine);
            let receiver = Arc::clone(&receiver);
            let cancel = cancel.clone();
            workers.spawn(async move {
                loop {
                    let task = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { break };

                    if let Err(err) = engine.handle(task.clone(), &cancel).await {
                        warn!(
                            worker_id,
                            task = ?task,
                            error = %err,
                            "Task failed; redelivery will retry it"
                        );
                    }
                }
                info!(worker_id, "Worker stopped");
            });
        }

        while workers.join_next().await.is_some() {}
    }
}
