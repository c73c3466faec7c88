//! Decider role — waits for metric messages and emits scaling decisions.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tierscale_channel::{BusSender, Delivery, Mailbox};
use tierscale_core::protocol::{decode_metrics, encode_decision};
use tierscale_core::{
    Cycle, Envelope, InstanceId, MetricSample, OutboundMessage, ScalingAction, ScalingDecision,
    Settings, StepError, ThresholdPolicy,
};

use crate::policy::evaluate;

/// What happened to one instance in one decider cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DeciderReport {
    /// A decision was produced and handed to the bus.
    Decided {
        instance_id: InstanceId,
        cycle: Cycle,
        sample: MetricSample,
        action: ScalingAction,
    },
    /// A decision was produced but could not be sent.
    SendFailed {
        instance_id: InstanceId,
        action: ScalingAction,
        error: StepError,
    },
    /// No decision this cycle.
    Skipped {
        instance_id: InstanceId,
        error: StepError,
    },
}

impl DeciderReport {
    pub fn instance_id(&self) -> &str {
        match self {
            DeciderReport::Decided { instance_id, .. }
            | DeciderReport::SendFailed { instance_id, .. }
            | DeciderReport::Skipped { instance_id, .. } => instance_id,
        }
    }

    pub fn action(&self) -> Option<ScalingAction> {
        match self {
            DeciderReport::Decided { action, .. } | DeciderReport::SendFailed { action, .. } => {
                Some(*action)
            }
            DeciderReport::Skipped { .. } => None,
        }
    }
}

/// Result of feeding one (possibly missing) message to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DeciderStep {
    pub outgoing: Option<OutboundMessage>,
    pub report: DeciderReport,
}

/// Transport-free decision logic.
///
/// Tracks the newest metric cycle seen per instance so that replayed or
/// reordered messages from an older cycle are dropped.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: ThresholdPolicy,
    executor_endpoint: String,
    receive_timeout: Duration,
    latest_cycle: HashMap<InstanceId, Cycle>,
}

impl DecisionEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            policy: settings.policy,
            executor_endpoint: settings.endpoints.executor.clone(),
            receive_timeout: settings.receive_timeout,
            latest_cycle: settings
                .instances
                .iter()
                .map(|i| (i.id.clone(), 0))
                .collect(),
        }
    }

    /// Handle the outcome of waiting for `expected`'s metrics.
    ///
    /// `None` means the wait timed out. A message is attributed to the
    /// instance named on its envelope, which is normally `expected`.
    pub fn step(&mut self, expected: &str, incoming: Option<Envelope>) -> DeciderStep {
        let Some(envelope) = incoming else {
            return skipped(expected, StepError::ReceiveTimeout(self.receive_timeout));
        };

        let instance_id = envelope.instance_id;
        if instance_id != expected {
            debug!(%expected, received = %instance_id, "metrics arrived out of list order");
        }

        let Some(latest) = self.latest_cycle.get_mut(&instance_id) else {
            return skipped(&instance_id, StepError::UnknownInstance(instance_id.clone()));
        };
        if envelope.cycle <= *latest {
            let error = StepError::StaleMessage {
                instance_id: instance_id.clone(),
                cycle: envelope.cycle,
                latest: *latest,
            };
            return skipped(&instance_id, error);
        }
        *latest = envelope.cycle;

        let sample = match decode_metrics(&instance_id, &envelope.body) {
            Ok(sample) => sample,
            Err(e) => return skipped(&instance_id, e.into()),
        };

        let action = evaluate(&self.policy, &sample);
        let body = encode_decision(&ScalingDecision {
            instance_id: instance_id.clone(),
            action,
        });

        DeciderStep {
            outgoing: Some(OutboundMessage {
                to: self.executor_endpoint.clone(),
                instance_id: instance_id.clone(),
                cycle: envelope.cycle,
                body,
            }),
            report: DeciderReport::Decided {
                instance_id,
                cycle: envelope.cycle,
                sample,
                action,
            },
        }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }
}

fn skipped(instance_id: &str, error: StepError) -> DeciderStep {
    DeciderStep {
        outgoing: None,
        report: DeciderReport::Skipped {
            instance_id: instance_id.to_string(),
            error,
        },
    }
}

/// The decider role: one bounded wait per managed instance per cycle.
pub struct Decider {
    engine: DecisionEngine,
    instances: Vec<InstanceId>,
    receive_timeout: Duration,
    mailbox: Mailbox,
    sender: BusSender,
    cycle: Cycle,
}

impl Decider {
    pub fn new(settings: &Settings, mailbox: Mailbox, sender: BusSender) -> Self {
        Self {
            engine: DecisionEngine::new(settings),
            instances: settings.instance_ids(),
            receive_timeout: settings.receive_timeout,
            mailbox,
            sender,
            cycle: 0,
        }
    }

    /// Run one cycle over all instances, in list order.
    ///
    /// Returns `None` if shutdown interrupted a wait; reports gathered so
    /// far in that cycle are logged but dropped.
    pub async fn run_cycle(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Vec<DeciderReport>> {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut reports = Vec::with_capacity(self.instances.len());

        for idx in 0..self.instances.len() {
            let expected = self.instances[idx].clone();
            debug!(instance = %expected, cycle, "waiting for metrics");

            let incoming = match self
                .mailbox
                .recv_or_shutdown(self.receive_timeout, shutdown)
                .await
            {
                Delivery::Message(envelope) => Some(envelope),
                Delivery::TimedOut => None,
                Delivery::Shutdown => return None,
            };

            let DeciderStep { outgoing, mut report } = self.engine.step(&expected, incoming);

            if let Some(message) = outgoing {
                let to = message.to.clone();
                if let Err(e) = self.sender.send(message).await {
                    report = DeciderReport::SendFailed {
                        instance_id: report.instance_id().to_string(),
                        action: report.action().unwrap_or(ScalingAction::NoAction),
                        error: e.into_send_failure(&to),
                    };
                }
            }

            log_report(cycle, &report);
            reports.push(report);
        }

        Some(reports)
    }

    /// Run cycles until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            instances = self.instances.len(),
            timeout_secs = self.receive_timeout.as_secs(),
            "decider started"
        );

        while !*shutdown.borrow() {
            if self.run_cycle(&mut shutdown).await.is_none() {
                break;
            }
        }

        info!(cycles = self.cycle, "decider shutting down");
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }
}

fn log_report(cycle: Cycle, report: &DeciderReport) {
    match report {
        DeciderReport::Decided {
            instance_id,
            cycle: metric_cycle,
            sample,
            action,
        } => {
            info!(
                instance = %instance_id,
                cycle,
                metric_cycle,
                cpu = sample.cpu_pct,
                mem = sample.mem_pct,
                disk_read_mb = sample.disk_read_mb,
                net_in_mb = sample.net_in_mb,
                %action,
                "decision sent"
            );
        }
        DeciderReport::SendFailed {
            instance_id,
            action,
            error,
        } => {
            warn!(instance = %instance_id, cycle, %action, kind = error.kind(), error = %error, "failed to send decision");
        }
        DeciderReport::Skipped { instance_id, error } if error.is_timeout() => {
            info!(instance = %instance_id, cycle, kind = error.kind(), "no metrics received within timeout");
        }
        DeciderReport::Skipped { instance_id, error } => {
            warn!(instance = %instance_id, cycle, kind = error.kind(), error = %error, "metrics skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierscale_channel::MessageBus;
    use tierscale_core::Config;

    fn settings() -> Settings {
        let mut config = Config::default();
        config.instances.truncate(1);
        config.instances[0].id = "A".to_string();
        config.control.receive_timeout = "5s".to_string();
        config.resolve().unwrap()
    }

    fn envelope(instance: &str, cycle: Cycle, body: &str) -> Envelope {
        Envelope {
            from: "monitor".to_string(),
            to: "decider".to_string(),
            instance_id: instance.to_string(),
            cycle,
            body: body.to_string(),
        }
    }

    #[test]
    fn overload_emits_scale_up_message() {
        let mut engine = DecisionEngine::new(&settings());
        let step = engine.step(
            "A",
            Some(envelope("A", 1, "cpu:90,memory:30,disk_read:5,network_in:50")),
        );

        let out = step.outgoing.unwrap();
        assert_eq!(out.to, "executor");
        assert_eq!(out.body, "A:scale_up");
        assert_eq!(out.cycle, 1);
        assert_eq!(step.report.action(), Some(ScalingAction::ScaleUp));
    }

    #[test]
    fn idle_emits_scale_down_message() {
        let mut engine = DecisionEngine::new(&settings());
        let step = engine.step(
            "A",
            Some(envelope("A", 1, "cpu:5,memory:5,disk_read:1,network_in:1")),
        );
        assert_eq!(step.outgoing.unwrap().body, "A:scale_down");
    }

    #[test]
    fn timeout_emits_nothing() {
        let mut engine = DecisionEngine::new(&settings());
        let step = engine.step("A", None);
        assert!(step.outgoing.is_none());
        assert!(matches!(
            step.report,
            DeciderReport::Skipped { error: StepError::ReceiveTimeout(d), .. } if d == Duration::from_secs(5)
        ));
    }

    #[test]
    fn malformed_metrics_emit_nothing() {
        let mut engine = DecisionEngine::new(&settings());
        let step = engine.step("A", Some(envelope("A", 1, "cpu:90,memory:30,disk_read:5")));
        assert!(step.outgoing.is_none());
        match step.report {
            DeciderReport::Skipped { instance_id, error } => {
                assert_eq!(instance_id, "A");
                assert_eq!(error.kind(), "malformed_message");
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn unknown_instance_emits_nothing() {
        let mut engine = DecisionEngine::new(&settings());
        let step = engine.step(
            "A",
            Some(envelope("ghost", 1, "cpu:90,memory:30,disk_read:5,network_in:50")),
        );
        assert!(step.outgoing.is_none());
        assert!(matches!(
            step.report,
            DeciderReport::Skipped { error: StepError::UnknownInstance(_), .. }
        ));
    }

    #[test]
    fn stale_and_duplicate_cycles_are_dropped() {
        let mut engine = DecisionEngine::new(&settings());
        let body = "cpu:50,memory:50,disk_read:20,network_in:200";

        assert!(engine.step("A", Some(envelope("A", 2, body))).outgoing.is_some());
        // Same cycle again.
        let dup = engine.step("A", Some(envelope("A", 2, body)));
        assert!(dup.outgoing.is_none());
        // Older cycle arriving late.
        let late = engine.step("A", Some(envelope("A", 1, body)));
        assert!(matches!(
            late.report,
            DeciderReport::Skipped { error: StepError::StaleMessage { cycle: 1, latest: 2, .. }, .. }
        ));
        // Newer cycle is accepted again.
        assert!(engine.step("A", Some(envelope("A", 3, body))).outgoing.is_some());
    }

    #[test]
    fn malformed_message_still_consumes_its_cycle() {
        let mut engine = DecisionEngine::new(&settings());
        engine.step("A", Some(envelope("A", 1, "garbage")));
        let replay = engine.step(
            "A",
            Some(envelope("A", 1, "cpu:90,memory:30,disk_read:5,network_in:50")),
        );
        assert!(replay.outgoing.is_none());
    }

    #[tokio::test]
    async fn run_cycle_forwards_decision_to_executor() {
        let settings = settings();
        let bus = MessageBus::new();
        let mailbox = bus.register("decider").await.unwrap();
        let mut executor = bus.register("executor").await.unwrap();
        let monitor = bus.sender("monitor");
        let mut decider = Decider::new(&settings, mailbox, bus.sender("decider"));

        monitor
            .send(OutboundMessage {
                to: "decider".to_string(),
                instance_id: "A".to_string(),
                cycle: 1,
                body: "cpu:90,memory:30,disk_read:5,network_in:50".to_string(),
            })
            .await
            .unwrap();

        let (_tx, mut shutdown) = watch::channel(false);
        let reports = decider.run_cycle(&mut shutdown).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].action(), Some(ScalingAction::ScaleUp));

        let env = executor.try_recv().unwrap();
        assert_eq!(env.from, "decider");
        assert_eq!(env.body, "A:scale_up");
    }

    #[tokio::test]
    async fn send_failure_does_not_abort_cycle() {
        let mut config = Config::default();
        config.control.receive_timeout = "5s".to_string();
        let settings = config.resolve().unwrap();

        let bus = MessageBus::new();
        let mailbox = bus.register("decider").await.unwrap();
        // No executor endpoint registered.
        let monitor = bus.sender("monitor");
        let mut decider = Decider::new(&settings, mailbox, bus.sender("decider"));

        for id in ["vm-initiale", "vm-secondary"] {
            monitor
                .send(OutboundMessage {
                    to: "decider".to_string(),
                    instance_id: id.to_string(),
                    cycle: 1,
                    body: "cpu:50,memory:50,disk_read:20,network_in:200".to_string(),
                })
                .await
                .unwrap();
        }

        let (_tx, mut shutdown) = watch::channel(false);
        let reports = decider.run_cycle(&mut shutdown).await.unwrap();
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(matches!(
                report,
                DeciderReport::SendFailed { error: StepError::SendFailure { .. }, .. }
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_cycle_times_out_per_instance() {
        let mut config = Config::default();
        config.control.receive_timeout = "60s".to_string();
        let settings = config.resolve().unwrap();

        let bus = MessageBus::new();
        let mailbox = bus.register("decider").await.unwrap();
        let _executor = bus.register("executor").await.unwrap();
        let mut decider = Decider::new(&settings, mailbox, bus.sender("decider"));

        let (_tx, mut shutdown) = watch::channel(false);
        let start = tokio::time::Instant::now();
        let reports = decider.run_cycle(&mut shutdown).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.action().is_none()));
        assert!(start.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_on_shutdown() {
        let settings = settings();
        let bus = MessageBus::new();
        let mailbox = bus.register("decider").await.unwrap();
        let mut decider = Decider::new(&settings, mailbox, bus.sender("decider"));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            decider.run(rx).await;
            decider
        });
        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send(true).unwrap();

        let decider = handle.await.unwrap();
        assert!(decider.cycle >= 2);
    }
}
