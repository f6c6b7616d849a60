// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ticketflow serve` command implementation.
//!
//! Opens storage, connects the bridge adapters, registers the periodic jobs
//! and runs the worker until a shutdown signal arrives. The gateway is
//! started alongside when enabled.

use std::sync::Arc;
use std::time::Instant;

use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ticketflow_automation::{
    BusinessHoursGate, Handlers, InboundPipeline, IntegrationDispatcher, SessionReaper,
};
use ticketflow_bridge::{BridgeClient, HttpChannel, RemoteHandlers};
use ticketflow_config::model::TicketflowConfig;
use ticketflow_core::{
    ChannelAdapter, Clock, EventBus, HealthStatus, PluginAdapter, StorageAdapter, SystemClock,
    TicketflowError,
};
use ticketflow_gateway::GatewayState;
use ticketflow_queue::{
    CLAIM_SCHEDULED_MESSAGES, QueueHandle, QueueRegistry, REAP_EXPIRED_SESSIONS,
    RECOVER_STALLED_JOBS, RecoverStalledJobs, SEND_SCHEDULED_MESSAGE, WorkQueue, Worker,
    WorkerOptions, periodic_jobs, publish, register_periodic_jobs,
};
use ticketflow_schedule::{
    ClaimSettings, PlaceholderRenderer, ScheduleClaimer, ScheduleService, ScheduledSendJob,
};
use ticketflow_storage::SqliteStorage;

use crate::shutdown;

/// Collaborators shared by the worker jobs and the gateway.
struct Services {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    clock: Arc<dyn Clock>,
    handlers: Handlers,
    bus: EventBus,
}

/// Runs the `ticketflow serve` command.
pub async fn run_serve(config: TicketflowConfig) -> Result<(), TicketflowError> {
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "starting ticketflow serve");

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

    let bridge = BridgeClient::new(&config.bridge)?;
    let http_channel = HttpChannel::new(bridge.clone());
    log_bridge_health(&http_channel).await;
    let remote = RemoteHandlers::new(bridge);

    let services = Services {
        storage: storage.clone(),
        channel: Arc::new(http_channel),
        clock: Arc::new(SystemClock),
        handlers: Handlers {
            flow: Arc::new(remote.clone()),
            bot_platform: Arc::new(remote.clone()),
            assistant: Arc::new(remote),
        },
        bus: EventBus::default(),
    };

    let queue = Arc::new(WorkQueue::new(
        config.queue.name.clone(),
        services.storage.clone(),
        services.clock.clone(),
    ));
    let registry = Arc::new(QueueRegistry::new());
    publish(queue.clone(), &registry);

    register_periodic_jobs(&queue, &periodic_jobs(&config)).await?;

    let worker = build_worker(&config, &services, queue.clone(), registry)?;

    let cancel = shutdown::install_signal_handler();
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let gateway_task = if config.gateway.enabled {
        Some(spawn_gateway(&config, &services, cancel.clone())?)
    } else {
        info!("gateway disabled");
        None
    };

    cancel.cancelled().await;
    info!("shutting down");

    if let Err(e) = worker_task.await {
        warn!(error = %e, "worker task ended abnormally");
    }
    if let Some(task) = gateway_task {
        if let Err(e) = task.await {
            warn!(error = %e, "gateway task ended abnormally");
        }
    }

    storage.close().await?;
    info!("ticketflow stopped");
    Ok(())
}

/// A worker with every job of the service registered.
fn build_worker(
    config: &TicketflowConfig,
    services: &Services,
    queue: Arc<WorkQueue>,
    registry: Arc<QueueRegistry>,
) -> Result<Worker, TicketflowError> {
    let timezone = parse_timezone(&config.business_hours.timezone)?;
    let queue_handle = Arc::new(QueueHandle::with_queue(queue.clone(), registry));

    let claimer = ScheduleClaimer::new(
        services.storage.clone(),
        services.clock.clone(),
        queue_handle,
        ClaimSettings::from(&config.schedules),
    );
    let reaper = SessionReaper::new(
        services.storage.clone(),
        services.channel.clone(),
        services.clock.clone(),
        config.sessions.expiry_notice.clone(),
    );
    let sender = ScheduledSendJob::new(
        services.storage.clone(),
        services.channel.clone(),
        Arc::new(PlaceholderRenderer::new(services.clock.clone(), timezone)),
        services.clock.clone(),
        config.schedules.media_dir.clone(),
    );

    Ok(Worker::new(queue.clone(), WorkerOptions::from(&config.queue))
        .register(CLAIM_SCHEDULED_MESSAGES, Arc::new(claimer), 1)
        .register(REAP_EXPIRED_SESSIONS, Arc::new(reaper), 1)
        .register(
            RECOVER_STALLED_JOBS,
            Arc::new(RecoverStalledJobs::new(queue)),
            1,
        )
        .register(
            SEND_SCHEDULED_MESSAGE,
            Arc::new(sender),
            config.queue.send_concurrency,
        ))
}

/// Starts the gateway in the background. A gateway that fails to serve
/// brings the whole service down.
fn spawn_gateway(
    config: &TicketflowConfig,
    services: &Services,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, TicketflowError> {
    let gate = BusinessHoursGate::new(
        &config.business_hours,
        services.storage.clone(),
        services.channel.clone(),
        services.clock.clone(),
    )?;
    let dispatcher = IntegrationDispatcher::new(
        &config.automation,
        services.storage.clone(),
        services.channel.clone(),
        services.handlers.clone(),
    )?;
    let publisher = Arc::new(services.bus.clone());

    let state = GatewayState {
        pipeline: Arc::new(InboundPipeline::new(
            services.storage.clone(),
            gate,
            dispatcher,
            publisher.clone(),
        )),
        schedules: Arc::new(ScheduleService::new(
            services.storage.clone(),
            services.clock.clone(),
            publisher,
        )),
        bus: services.bus.clone(),
        start_time: Instant::now(),
    };

    let gateway_config = config.gateway.clone();
    Ok(tokio::spawn(async move {
        if let Err(e) = ticketflow_gateway::start_server(&gateway_config, state, cancel.clone()).await
        {
            error!(error = %e, "gateway failed");
            cancel.cancel();
        }
    }))
}

async fn log_bridge_health(channel: &HttpChannel) {
    match channel.health_check().await {
        Ok(HealthStatus::Healthy) => info!("bridge reachable"),
        Ok(HealthStatus::Degraded(reason)) => warn!(%reason, "bridge degraded"),
        Ok(HealthStatus::Unhealthy(reason)) => warn!(%reason, "bridge unhealthy; sends will fail until it recovers"),
        Err(e) => warn!(error = %e, "bridge health check failed"),
    }
}

fn parse_timezone(name: &str) -> Result<Tz, TicketflowError> {
    name.parse()
        .map_err(|e| TicketflowError::Config(format!("invalid timezone '{name}': {e}")))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ticketflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
