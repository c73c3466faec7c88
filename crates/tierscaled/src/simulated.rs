//! Stand-in collaborators for running without a cloud provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

use tierscale_core::{
    CollaboratorError, CollaboratorFuture, InstanceController, InstanceId, MetricSource,
    RawTelemetry, Settings, TierTable,
};

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * MIB;

/// Load on one simulated instance, independent of its size.
#[derive(Debug, Clone)]
struct Workload {
    tier: usize,
    /// CPU demand as a percentage of the smallest tier's capacity.
    cpu_demand: f64,
    mem_used_gb: f64,
    disk_read_mb: f64,
    net_in_mb: f64,
}

impl Workload {
    fn wander(&mut self, rng: &mut StdRng) {
        self.cpu_demand = step(rng, self.cpu_demand, 15.0, 0.0, 400.0);
        self.mem_used_gb = step(rng, self.mem_used_gb, 0.2, 0.1, 3.0);
        self.disk_read_mb = step(rng, self.disk_read_mb, 8.0, 0.0, 120.0);
        self.net_in_mb = step(rng, self.net_in_mb, 60.0, 0.0, 1200.0);
    }
}

fn step(rng: &mut StdRng, value: f64, by: f64, lo: f64, hi: f64) -> f64 {
    (value + rng.gen_range(-by..=by)).clamp(lo, hi)
}

/// A fake cloud: telemetry that random-walks per instance and reacts to the
/// instance's current size, plus a controller that resizes instantly.
///
/// Implements both [`MetricSource`] and [`InstanceController`] so one value
/// can be shared by every role.
pub struct SimulatedCloud {
    tiers: TierTable,
    workloads: Mutex<HashMap<InstanceId, Workload>>,
    failing: Mutex<HashSet<InstanceId>>,
    resizes: Mutex<Vec<(InstanceId, String)>>,
    rng: Mutex<StdRng>,
}

impl SimulatedCloud {
    /// Every configured instance starts at its initial tier.
    pub fn new(settings: &Settings, seed: u64) -> Self {
        let workloads = settings
            .instances
            .iter()
            .map(|i| {
                (
                    i.id.clone(),
                    Workload {
                        tier: i.initial_tier,
                        cpu_demand: 50.0,
                        mem_used_gb: 0.5,
                        disk_read_mb: 20.0,
                        net_in_mb: 200.0,
                    },
                )
            })
            .collect();

        Self {
            tiers: settings.tiers.clone(),
            workloads: Mutex::new(workloads),
            failing: Mutex::new(HashSet::new()),
            resizes: Mutex::new(Vec::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Make resizes of `instance_id` fail until turned off again.
    pub async fn fail_resizes(&self, instance_id: &str, failing: bool) {
        let mut set = self.failing.lock().await;
        if failing {
            set.insert(instance_id.to_string());
        } else {
            set.remove(instance_id);
        }
    }

    pub async fn tier_of(&self, instance_id: &str) -> Option<String> {
        self.workloads
            .lock()
            .await
            .get(instance_id)
            .map(|w| self.tiers.name(w.tier).to_string())
    }

    /// Every successful resize so far, in order.
    pub async fn resizes(&self) -> Vec<(InstanceId, String)> {
        self.resizes.lock().await.clone()
    }

    fn unknown(instance_id: &str) -> CollaboratorError {
        CollaboratorError::Controller {
            instance_id: instance_id.to_string(),
            reason: "no such instance".to_string(),
        }
    }
}

impl MetricSource for SimulatedCloud {
    fn fetch<'a>(
        &'a self,
        instance_id: &'a str,
        _window: Duration,
    ) -> CollaboratorFuture<'a, RawTelemetry> {
        Box::pin(async move {
            let mut workloads = self.workloads.lock().await;
            let Some(workload) = workloads.get_mut(instance_id) else {
                return Err(CollaboratorError::MetricSource {
                    instance_id: instance_id.to_string(),
                    reason: "no such instance".to_string(),
                });
            };
            workload.wander(&mut *self.rng.lock().await);

            let smallest = self.tiers.smallest().memory_gb;
            let memory_gb = self
                .tiers
                .get(workload.tier)
                .map(|t| t.memory_gb)
                .unwrap_or(smallest);
            let capacity = memory_gb / smallest;

            Ok(RawTelemetry {
                cpu_pct: Some((workload.cpu_demand / capacity).min(100.0)),
                available_memory_bytes: Some(((memory_gb - workload.mem_used_gb) * GIB).max(0.0)),
                disk_read_bytes: Some(workload.disk_read_mb * MIB),
                network_in_bytes: Some(workload.net_in_mb * MIB),
            })
        })
    }
}

impl InstanceController for SimulatedCloud {
    fn get_current_tier<'a>(&'a self, instance_id: &'a str) -> CollaboratorFuture<'a, String> {
        Box::pin(async move {
            self.tier_of(instance_id)
                .await
                .ok_or_else(|| Self::unknown(instance_id))
        })
    }

    fn set_tier<'a>(&'a self, instance_id: &'a str, tier: &'a str) -> CollaboratorFuture<'a, ()> {
        Box::pin(async move {
            if self.failing.lock().await.contains(instance_id) {
                return Err(CollaboratorError::Controller {
                    instance_id: instance_id.to_string(),
                    reason: "simulated resize failure".to_string(),
                });
            }
            let index = self
                .tiers
                .index_of(tier)
                .ok_or_else(|| CollaboratorError::Controller {
                    instance_id: instance_id.to_string(),
                    reason: format!("unknown tier {tier:?}"),
                })?;

            let mut workloads = self.workloads.lock().await;
            let workload = workloads
                .get_mut(instance_id)
                .ok_or_else(|| Self::unknown(instance_id))?;
            workload.tier = index;
            drop(workloads);

            debug!(instance = %instance_id, %tier, "simulated resize");
            self.resizes
                .lock()
                .await
                .push((instance_id.to_string(), tier.to_string()));
            Ok(())
        })
    }
}

/// Replays fixed telemetry per instance.
///
/// Each fetch takes the next sample; the last one repeats forever.
#[derive(Default)]
pub struct ScriptedMetricSource {
    scripts: Mutex<HashMap<InstanceId, VecDeque<RawTelemetry>>>,
}

impl ScriptedMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(
        mut self,
        instance_id: &str,
        samples: impl IntoIterator<Item = RawTelemetry>,
    ) -> Self {
        self.scripts
            .get_mut()
            .insert(instance_id.to_string(), samples.into_iter().collect());
        self
    }
}

impl MetricSource for ScriptedMetricSource {
    fn fetch<'a>(
        &'a self,
        instance_id: &'a str,
        _window: Duration,
    ) -> CollaboratorFuture<'a, RawTelemetry> {
        Box::pin(async move {
            let mut scripts = self.scripts.lock().await;
            let script = scripts.get_mut(instance_id).filter(|s| !s.is_empty());
            let Some(script) = script else {
                return Err(CollaboratorError::MetricSource {
                    instance_id: instance_id.to_string(),
                    reason: "no telemetry scripted".to_string(),
                });
            };
            if script.len() > 1 {
                Ok(script.pop_front().unwrap_or_default())
            } else {
                Ok(script.front().cloned().unwrap_or_default())
            }
        })
    }
}
