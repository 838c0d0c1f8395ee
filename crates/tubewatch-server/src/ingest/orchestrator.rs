//! Wires the pipeline together and runs it in background tasks

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    config::{IngestConfig, QueueBackend, QueueConfig},
    credentials::CredentialRotator,
    fetcher::Fetcher,
    ingestor::{IngestError, IngestStats, Ingestor},
    scheduler::{FetchScheduler, ScheduleError},
    storage::PgIngestStore,
    youtube::YoutubeClient,
};
use crate::queue::{AmqpQueue, InMemoryQueue, MessageQueue, QueueError};

/// Publisher and consumer ends of the queue.
///
/// AMQP uses one connection per role. The in-memory backend shares a single
/// broker between both.
pub struct QueuePair {
    pub publisher: Arc<dyn MessageQueue>,
    pub consumer: Arc<dyn MessageQueue>,
}

impl QueuePair {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        match config.backend {
            QueueBackend::Memory => {
                let queue = InMemoryQueue::new();
                Ok(Self {
                    publisher: Arc::new(queue.clone()),
                    consumer: Arc::new(queue),
                })
            },
            QueueBackend::Amqp => {
                let settings = config.amqp_settings();
                info!(url = %settings.redacted_url(), queue = %settings.queue_name, "Connecting to AMQP broker");
                let publisher = AmqpQueue::connect(settings.clone()).await?;
                let consumer = AmqpQueue::connect(settings).await?;
                Ok(Self {
                    publisher: Arc::new(publisher),
                    consumer: Arc::new(consumer),
                })
            },
        }
    }

    pub async fn close(&self) {
        for (role, queue) in [("publisher", &self.publisher), ("consumer", &self.consumer)] {
            if let Err(e) = queue.close().await {
                tracing::warn!(role, error = %e, "Failed to close queue");
            }
        }
    }
}

/// Running pipeline tasks.
pub struct IngestHandles {
    scheduler: Option<JoinHandle<Result<(), ScheduleError>>>,
    cancel: CancellationToken,
    /// Cancelled once the scheduler task has exited, however it exited
    scheduler_stopped: CancellationToken,
    ingestor: JoinHandle<Result<IngestStats, IngestError>>,
    queues: QueuePair,
}

impl IngestHandles {
    /// Take the scheduler task to watch for a fatal stop. It is still
    /// stopped by [`IngestHandles::shutdown`].
    pub fn take_scheduler(&mut self) -> Option<JoinHandle<Result<(), ScheduleError>>> {
        self.scheduler.take()
    }

    /// Stop the scheduler and abort any fetch cycle in flight, then close the
    /// queues and let the ingestor drain out.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.scheduler_stopped.cancelled().await;
        self.queues.close().await;

        match self.ingestor.await {
            Ok(Ok(stats)) => info!(?stats, "Ingestor stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Ingestor stopped with error"),
            Err(e) if e.is_cancelled() => {},
            Err(e) => tracing::error!(error = %e, "Ingestor task panicked"),
        }
    }
}

pub struct IngestOrchestrator {
    config: IngestConfig,
    pool: PgPool,
}

impl IngestOrchestrator {
    pub fn new(config: IngestConfig, pool: PgPool) -> Self {
        Self { config, pool }
    }

    /// Connect the queues and spawn the ingestor and the fetch scheduler.
    pub async fn start(self) -> Result<IngestHandles> {
        let config = self.config;
        config.validate()?;

        let queues = QueuePair::connect(&config.queue).await?;
        let store = Arc::new(PgIngestStore::new(self.pool));

        let credentials = Arc::new(CredentialRotator::new(
            config.api_keys.clone(),
            config.exhaustion_policy,
        )?);
        let search = Arc::new(YoutubeClient::new(
            config.api_base_url.clone(),
            config.request_timeout(),
        )?);

        let fetcher = Fetcher::new(
            store.clone(),
            search,
            Arc::clone(&queues.publisher),
            credentials,
            config.fetcher_settings(),
        );
        let scheduler =
            FetchScheduler::new(fetcher, &config.cron_schedule, config.prevent_overlap)?;

        let ingestor = Ingestor::new(store, Arc::clone(&queues.consumer));
        let ingestor = tokio::spawn(async move { ingestor.run_forever().await });
        let cancel = CancellationToken::new();
        let scheduler_stopped = CancellationToken::new();
        let scheduler = tokio::spawn({
            let cancel = cancel.clone();
            let stopped = scheduler_stopped.clone().drop_guard();
            async move {
                let _stopped = stopped;
                scheduler.run(cancel).await
            }
        });

        info!(
            keyword = %config.keyword,
            keys = config.api_keys.len(),
            policy = %config.exhaustion_policy,
            "Ingestion pipeline started"
        );

        Ok(IngestHandles {
            scheduler: Some(scheduler),
            cancel,
            scheduler_stopped,
            ingestor,
            queues,
        })
    }
}
