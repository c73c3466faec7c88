//! Conversion of raw provider telemetry into metric samples.

use tierscale_core::{MetricSample, RawTelemetry, SizeTier};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Build a sample for an instance running at `tier`.
///
/// Missing series yield zero. For memory that means zero available bytes,
/// so an instance with no available-memory series reads as fully used.
/// Memory use is derived from the tier's total memory and clamped to be
/// non-negative.
pub fn to_sample(instance_id: &str, raw: &RawTelemetry, tier: &SizeTier) -> MetricSample {
    let total_memory = tier.memory_gb * BYTES_PER_GB;
    let available = non_negative(raw.available_memory_bytes);
    let mem_pct = if total_memory > 0.0 {
        ((total_memory - available) / total_memory * 100.0).max(0.0)
    } else {
        0.0
    };

    MetricSample {
        instance_id: instance_id.to_string(),
        cpu_pct: non_negative(raw.cpu_pct),
        mem_pct,
        disk_read_mb: non_negative(raw.disk_read_bytes) / BYTES_PER_MB,
        net_in_mb: non_negative(raw.network_in_bytes) / BYTES_PER_MB,
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(memory_gb: f64) -> SizeTier {
        SizeTier {
            name: "t".to_string(),
            hourly_rate: 0.02,
            memory_gb,
        }
    }

    #[test]
    fn converts_units() {
        let raw = RawTelemetry {
            cpu_pct: Some(42.5),
            available_memory_bytes: Some(0.25 * BYTES_PER_GB),
            disk_read_bytes: Some(20.0 * BYTES_PER_MB),
            network_in_bytes: Some(300.0 * BYTES_PER_MB),
        };
        let s = to_sample("vm-a", &raw, &tier(1.0));
        assert_eq!(s.instance_id, "vm-a");
        assert_eq!(s.cpu_pct, 42.5);
        assert_eq!(s.mem_pct, 75.0);
        assert_eq!(s.disk_read_mb, 20.0);
        assert_eq!(s.net_in_mb, 300.0);
    }

    #[test]
    fn memory_uses_tier_size() {
        let raw = RawTelemetry {
            available_memory_bytes: Some(2.0 * BYTES_PER_GB),
            ..Default::default()
        };
        assert_eq!(to_sample("vm-a", &raw, &tier(4.0)).mem_pct, 50.0);
        assert_eq!(to_sample("vm-a", &raw, &tier(16.0)).mem_pct, 87.5);
    }

    #[test]
    fn missing_series_are_zero() {
        let s = to_sample("vm-a", &RawTelemetry::default(), &tier(1.0));
        assert_eq!(s.cpu_pct, 0.0);
        assert_eq!(s.disk_read_mb, 0.0);
        assert_eq!(s.net_in_mb, 0.0);
        // No available memory reported: the whole tier counts as used.
        assert_eq!(s.mem_pct, 100.0);
    }

    #[test]
    fn available_above_total_clamps_to_zero() {
        let raw = RawTelemetry {
            available_memory_bytes: Some(3.0 * BYTES_PER_GB),
            ..Default::default()
        };
        assert_eq!(to_sample("vm-a", &raw, &tier(1.0)).mem_pct, 0.0);
    }

    #[test]
    fn garbage_values_become_zero() {
        let raw = RawTelemetry {
            cpu_pct: Some(f64::NAN),
            disk_read_bytes: Some(-5.0),
            available_memory_bytes: Some(f64::NAN),
            ..Default::default()
        };
        let s = to_sample("vm-a", &raw, &tier(1.0));
        assert_eq!(s.cpu_pct, 0.0);
        assert_eq!(s.disk_read_mb, 0.0);
        assert_eq!(s.mem_pct, 100.0);
    }
}
