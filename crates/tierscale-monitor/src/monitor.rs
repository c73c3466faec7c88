//! Monitor role — pulls telemetry per instance and sends metric messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tierscale_channel::BusSender;
use tierscale_core::config::ManagedInstance;
use tierscale_core::protocol::encode_metrics;
use tierscale_core::{
    Cycle, InstanceController, InstanceId, MetricSample, MetricSource, OutboundMessage, Settings,
    StepError, TierTable,
};

use crate::telemetry::to_sample;

/// What happened to one instance in one monitor cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorReport {
    Sent {
        instance_id: InstanceId,
        cycle: Cycle,
        sample: MetricSample,
    },
    Skipped {
        instance_id: InstanceId,
        error: StepError,
    },
}

/// Periodically samples every managed instance.
pub struct Monitor {
    source: Arc<dyn MetricSource>,
    controller: Arc<dyn InstanceController>,
    sender: BusSender,
    decider_endpoint: String,
    tiers: TierTable,
    instances: Vec<ManagedInstance>,
    /// Last known tier index per instance.
    sizes: HashMap<InstanceId, usize>,
    interval: Duration,
    lookback: Duration,
    cycle: Cycle,
}

impl Monitor {
    pub fn new(
        settings: &Settings,
        source: Arc<dyn MetricSource>,
        controller: Arc<dyn InstanceController>,
        sender: BusSender,
    ) -> Self {
        Self {
            source,
            controller,
            sender,
            decider_endpoint: settings.endpoints.decider.clone(),
            tiers: settings.tiers.clone(),
            sizes: settings
                .instances
                .iter()
                .map(|i| (i.id.clone(), i.initial_tier))
                .collect(),
            instances: settings.instances.clone(),
            interval: settings.interval,
            lookback: settings.lookback,
            cycle: 0,
        }
    }

    /// Ask the controller which tier each instance runs at.
    ///
    /// On failure the last known tier is kept, which at startup is the
    /// configured initial tier.
    pub async fn discover_sizes(&mut self) {
        for inst in &self.instances {
            let known = self.sizes.get(&inst.id).copied().unwrap_or(inst.initial_tier);
            let resolved = match self.controller.get_current_tier(&inst.id).await {
                Ok(name) => match self.tiers.index_of(&name) {
                    Some(index) => index,
                    None => {
                        warn!(instance = %inst.id, tier = %name, "controller reported unknown tier");
                        known
                    }
                },
                Err(e) => {
                    warn!(
                        instance = %inst.id,
                        kind = "external_call_failure",
                        error = %e,
                        fallback = %self.tiers.name(known),
                        "failed to fetch instance size"
                    );
                    known
                }
            };
            if resolved != known {
                debug!(instance = %inst.id, tier = %self.tiers.name(resolved), "instance size changed");
            }
            self.sizes.insert(inst.id.clone(), resolved);
        }
    }

    /// Tier index the monitor currently assumes for `instance_id`.
    pub fn size_of(&self, instance_id: &str) -> Option<usize> {
        self.sizes.get(instance_id).copied()
    }

    /// Sample every instance once and send its metric message.
    pub async fn run_cycle(&mut self) -> Vec<MonitorReport> {
        self.cycle += 1;
        let cycle = self.cycle;
        self.discover_sizes().await;

        let mut reports = Vec::with_capacity(self.instances.len());
        for inst in &self.instances {
            let report = self.collect(&inst.id, cycle).await;
            match &report {
                MonitorReport::Sent { sample, .. } => {
                    info!(
                        instance = %inst.id,
                        cycle,
                        cpu = sample.cpu_pct,
                        mem = sample.mem_pct,
                        disk_read_mb = sample.disk_read_mb,
                        net_in_mb = sample.net_in_mb,
                        "metrics sent"
                    );
                }
                MonitorReport::Skipped { error, .. } => {
                    warn!(instance = %inst.id, cycle, kind = error.kind(), error = %error, "metrics not sent");
                }
            }
            reports.push(report);
        }
        reports
    }

    async fn collect(&self, instance_id: &str, cycle: Cycle) -> MonitorReport {
        let skipped = |error: StepError| MonitorReport::Skipped {
            instance_id: instance_id.to_string(),
            error,
        };

        let raw = match self.source.fetch(instance_id, self.lookback).await {
            Ok(raw) => raw,
            Err(e) => return skipped(e.into()),
        };
        let index = self.sizes.get(instance_id).copied().unwrap_or(0);
        let tier = self.tiers.get(index).unwrap_or(self.tiers.smallest());
        let sample = to_sample(instance_id, &raw, tier);

        let message = OutboundMessage {
            to: self.decider_endpoint.clone(),
            instance_id: instance_id.to_string(),
            cycle,
            body: encode_metrics(&sample),
        };
        match self.sender.send(message).await {
            Ok(()) => MonitorReport::Sent {
                instance_id: instance_id.to_string(),
                cycle,
                sample,
            },
            Err(e) => skipped(e.into_send_failure(&self.decider_endpoint)),
        }
    }

    /// Run the sampling loop until shutdown signal.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            instances = self.instances.len(),
            "monitor started"
        );

        while !*shutdown.borrow() {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(cycles = self.cycle, "monitor shutting down");
    }
}
