//! Spawns the three roles on a shared bus.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::info;

use tierscale_channel::{ChannelResult, MessageBus};
use tierscale_core::{InstanceController, MetricSource, Settings};
use tierscale_decider::Decider;
use tierscale_executor::{Clock, CostReport, Executor};
use tierscale_monitor::Monitor;

/// Handles to a running control loop.
pub struct ControlLoop {
    bus: MessageBus,
    monitor: JoinHandle<()>,
    decider: JoinHandle<()>,
    executor: JoinHandle<CostReport>,
}

/// Register the decider and executor endpoints, then start all three roles.
///
/// Mailboxes exist before any role runs, so the monitor's first metrics are
/// never sent to a missing endpoint. The executor charges cost against `clock`.
pub async fn spawn_control_loop(
    settings: &Settings,
    source: Arc<dyn MetricSource>,
    controller: Arc<dyn InstanceController>,
    clock: Clock,
    shutdown: watch::Receiver<bool>,
) -> ChannelResult<ControlLoop> {
    let bus = MessageBus::new();
    let endpoints = &settings.endpoints;

    let decider_mailbox = bus.register(&endpoints.decider).await?;
    let executor_mailbox = bus.register(&endpoints.executor).await?;

    let mut executor = Executor::with_clock(settings, controller.clone(), executor_mailbox, clock);
    let mut decider = Decider::new(settings, decider_mailbox, bus.sender(&endpoints.decider));
    let mut monitor = Monitor::new(settings, source, controller, bus.sender(&endpoints.monitor));

    let executor_shutdown = shutdown.clone();
    let executor = tokio::spawn(async move { executor.run(executor_shutdown).await });

    let decider_shutdown = shutdown.clone();
    let decider = tokio::spawn(async move { decider.run(decider_shutdown).await });

    let monitor = tokio::spawn(async move { monitor.run(shutdown).await });

    info!(
        instances = settings.instances.len(),
        tiers = settings.tiers.len(),
        interval_secs = settings.interval.as_secs(),
        "control loop started"
    );

    Ok(ControlLoop {
        bus,
        monitor,
        decider,
        executor,
    })
}

impl ControlLoop {
    /// The bus the roles talk over.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Wait for every role to stop and return the executor's final costs.
    pub async fn wait(self) -> Result<CostReport, JoinError> {
        self.monitor.await?;
        self.decider.await?;
        let report = self.executor.await?;
        info!("control loop stopped");
        Ok(report)
    }
}
