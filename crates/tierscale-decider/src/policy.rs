//! Threshold evaluation.

use tierscale_core::{MetricSample, ScalingAction, ThresholdPolicy};

/// Decide what to do with an instance given one sample.
///
/// Scale-up wins over scale-down; comparisons are strict, so a value equal
/// to a cutoff counts as inside the band.
pub fn evaluate(policy: &ThresholdPolicy, sample: &MetricSample) -> ScalingAction {
    let up = &policy.upper;
    let lo = &policy.lower;

    if sample.cpu_pct > up.cpu_pct
        || sample.mem_pct > up.mem_pct
        || sample.disk_read_mb > up.disk_read_mb
        || sample.net_in_mb > up.net_in_mb
    {
        return ScalingAction::ScaleUp;
    }

    if sample.cpu_pct < lo.cpu_pct
        && sample.mem_pct < lo.mem_pct
        && sample.disk_read_mb < lo.disk_read_mb
        && sample.net_in_mb < lo.net_in_mb
    {
        return ScalingAction::ScaleDown;
    }

    ScalingAction::NoAction
}
