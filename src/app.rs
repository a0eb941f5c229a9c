//! Wiring of the dispatcher, the snapshot lifecycle and the notifier into
//! one process-wide bundle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{AppConfig, InMemoryConfigStore};
use crate::dispatch::VmWorkJobDispatcher;
use crate::events::{EventBus, EventDistributor, ResourceStateNotifier, WebhookDistributor};
use crate::fsm::SnapshotStateMachine;
use crate::handlers::simulated_handlers;
use crate::job::{CompletionLog, JobCompletion, JobRecord};
use crate::work::WorkTypeRegistry;

const HANDLER_LATENCY: Duration = Duration::from_millis(50);

pub struct App {
    pub config_store: Arc<InMemoryConfigStore>,
    pub bus: Arc<EventBus>,
    pub notifier: Arc<ResourceStateNotifier>,
    pub lifecycle: Arc<SnapshotStateMachine>,
    pub completions: Arc<CompletionLog>,
    pub dispatcher: Arc<VmWorkJobDispatcher>,
    webhook: Option<Arc<WebhookDistributor>>,
    flush_timeout: Duration,
}

impl App {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_latency(config, HANDLER_LATENCY)
    }

    pub fn with_latency(config: &AppConfig, latency: Duration) -> Self {
        let config_store = Arc::new(config.config_store());
        let bus = Arc::new(EventBus::new(config.event_bus_capacity));

        // Events go to the webhook when one is configured, otherwise to the
        // in-process bus. A webhook that cannot be built drops events.
        let webhook = config.webhook_url.as_ref().and_then(|url| {
            match WebhookDistributor::new(url.clone(), config.webhook_timeout()) {
                Ok(distributor) => Some(Arc::new(distributor)),
                Err(err) => {
                    warn!(url = %url, "cannot build webhook distributor: {err}");
                    None
                }
            }
        });
        let use_webhook = config.webhook_url.is_some();
        let remote = webhook.clone();
        let local = bus.clone();
        let provider = move || -> Option<Arc<dyn EventDistributor>> {
            if !use_webhook {
                return Some(local.clone() as Arc<dyn EventDistributor>);
            }
            let distributor = remote.clone()?;
            info!(url = distributor.url(), "publishing resource state events to webhook");
            Some(distributor as Arc<dyn EventDistributor>)
        };
        let notifier = Arc::new(
            ResourceStateNotifier::new(config_store.clone()).with_provider(Arc::new(provider)),
        );

        let mut lifecycle = SnapshotStateMachine::snapshot_lifecycle();
        lifecycle.register_listener(notifier.clone());
        let lifecycle = Arc::new(lifecycle);

        let completions = Arc::new(CompletionLog::new());
        let dispatcher = VmWorkJobDispatcher::new(
            Arc::new(WorkTypeRegistry::standard()),
            completions.clone(),
        )
        .with_handlers(Arc::new(simulated_handlers(lifecycle.clone(), latency)));

        Self {
            config_store,
            bus,
            notifier,
            lifecycle,
            completions,
            dispatcher: Arc::new(dispatcher),
            webhook,
            flush_timeout: config.webhook_timeout(),
        }
    }

    /// Wait for outstanding webhook deliveries. Returns how many were
    /// abandoned.
    pub async fn shutdown(&self) -> usize {
        match &self.webhook {
            Some(webhook) => webhook.flush(self.flush_timeout).await,
            None => 0,
        }
    }

    /// Dispatch `jobs` with at most `concurrency` running at once and return
    /// their completions ordered by job id.
    pub async fn dispatch_all(
        &self,
        jobs: Vec<JobRecord>,
        concurrency: usize,
    ) -> Result<Vec<JobCompletion>> {
        let limit = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut running = JoinSet::new();

        for job in jobs {
            let permit = limit.clone().acquire_owned().await?;
            let dispatcher = self.dispatcher.clone();
            running.spawn(async move {
                let _permit = permit;
                dispatcher.dispatch(&job).await
            });
        }

        let mut completions = Vec::with_capacity(running.len());
        while let Some(joined) = running.join_next().await {
            completions.push(joined?);
        }
        completions.sort_by_key(|c| c.job_id);
        Ok(completions)
    }
}
