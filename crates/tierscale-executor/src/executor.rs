//! Executor role — the mailbox loop around [`TransitionEngine`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tierscale_channel::{Delivery, Mailbox};
use tierscale_core::{Cycle, InstanceController, Settings};

use crate::clock::{Clock, system_clock};
use crate::engine::{ExecutorReport, HoldReason, TransitionEngine};
use crate::report::CostReport;

pub struct Executor {
    engine: TransitionEngine,
    mailbox: Mailbox,
    receive_timeout: Duration,
    cycle: Cycle,
}

impl Executor {
    pub fn new(
        settings: &Settings,
        controller: Arc<dyn InstanceController>,
        mailbox: Mailbox,
    ) -> Self {
        Self::with_clock(settings, controller, mailbox, system_clock())
    }

    pub fn with_clock(
        settings: &Settings,
        controller: Arc<dyn InstanceController>,
        mailbox: Mailbox,
        clock: Clock,
    ) -> Self {
        Self {
            engine: TransitionEngine::new(settings, controller, clock),
            mailbox,
            receive_timeout: settings.receive_timeout,
            cycle: 0,
        }
    }

    pub fn engine(&self) -> &TransitionEngine {
        &self.engine
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Accrue, wait for one decision, then apply anything else already queued.
    ///
    /// At most one decision per instance is taken from the queue in a cycle.
    /// Returns `None` if shutdown interrupted the wait.
    pub async fn run_cycle(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Vec<ExecutorReport>> {
        self.cycle += 1;
        let cycle = self.cycle;

        self.engine.accrue(self.engine.now());
        info!(cycle, total_cost = self.engine.state().total_cost(), "cost updated");

        debug!(cycle, "waiting for decision");
        let first = match self
            .mailbox
            .recv_or_shutdown(self.receive_timeout, shutdown)
            .await
        {
            Delivery::Message(envelope) => Some(envelope),
            Delivery::TimedOut => None,
            Delivery::Shutdown => return None,
        };

        let mut reports = Vec::new();
        let got_message = first.is_some();
        let report = self.engine.step(first).await;
        log_report(cycle, &report);
        reports.push(report);

        if got_message {
            let limit = self.engine.state().instances().len();
            while reports.len() < limit {
                let Some(envelope) = self.mailbox.try_recv() else {
                    break;
                };
                let report = self.engine.step(Some(envelope)).await;
                log_report(cycle, &report);
                reports.push(report);
            }
        }

        Some(reports)
    }

    /// Run cycles until shutdown, then charge the final interval.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> CostReport {
        self.engine.discover_tiers().await;
        info!(
            instances = self.engine.state().instances().len(),
            timeout_secs = self.receive_timeout.as_secs(),
            "executor started"
        );

        while !*shutdown.borrow() {
            if self.run_cycle(&mut shutdown).await.is_none() {
                break;
            }
        }

        self.engine.accrue(self.engine.now());
        let report = self.engine.cost_report();
        for inst in &report.instances {
            info!(
                instance = %inst.instance_id,
                tier = %inst.tier,
                cost = inst.accrued_cost,
                "final cost"
            );
        }
        info!(cycles = self.cycle, total_cost = report.total_cost, "executor shutting down");
        report
    }
}

fn log_report(cycle: Cycle, report: &ExecutorReport) {
    match report {
        ExecutorReport::Applied {
            instance_id,
            cycle: decision_cycle,
            action,
            from,
            to,
        } => {
            info!(instance = %instance_id, cycle, decision_cycle, %action, from, to, "tier changed");
        }
        ExecutorReport::Held {
            instance_id,
            tier,
            reason: HoldReason::NoAction,
            ..
        } => {
            debug!(instance = %instance_id, cycle, tier, "no action");
        }
        ExecutorReport::Held {
            instance_id,
            tier,
            reason,
            ..
        } => {
            info!(instance = %instance_id, cycle, tier, ?reason, "already at tier limit");
        }
        ExecutorReport::Skipped { error, .. } if error.is_timeout() => {
            info!(cycle, kind = error.kind(), "no decision received within timeout");
        }
        ExecutorReport::Skipped { instance_id, error } => {
            warn!(
                instance = instance_id.as_deref().unwrap_or("-"),
                cycle,
                kind = error.kind(),
                error = %error,
                "decision skipped"
            );
        }
    }
}
