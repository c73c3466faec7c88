//! tierscale.toml configuration parser.
//!
//! Every section is optional; omitted values fall back to the defaults of
//! the reference deployment (two managed VMs, three burstable tiers, 60s
//! cycles). [`Config::resolve`] validates the file and produces the
//! [`Settings`] handed to each role at construction.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{InstanceId, SizeTier, ThresholdPolicy, Thresholds, TierTable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub thresholds: ThresholdPolicy,
    pub tiers: Vec<SizeTier>,
    pub instances: Vec<InstanceConfig>,
    pub endpoints: EndpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Pause between monitor cycles (e.g. "60s").
    pub interval: String,
    /// How long the decider and executor wait for each message (e.g. "60s").
    pub receive_timeout: String,
    /// Telemetry lookback window (e.g. "1m").
    pub lookback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: InstanceId,
    /// Tier assumed until the controller reports the real one.
    pub initial_tier: Option<String>,
}

/// Names under which the roles register on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub monitor: String,
    pub decider: String,
    pub executor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            thresholds: ThresholdPolicy::default(),
            tiers: vec![
                SizeTier {
                    name: "Standard_B1s".to_string(),
                    hourly_rate: 0.02,
                    memory_gb: 1.0,
                },
                SizeTier {
                    name: "Standard_B2s".to_string(),
                    hourly_rate: 0.04,
                    memory_gb: 4.0,
                },
                SizeTier {
                    name: "Standard_B4ms".to_string(),
                    hourly_rate: 0.08,
                    memory_gb: 16.0,
                },
            ],
            instances: vec![
                InstanceConfig {
                    id: "vm-initiale".to_string(),
                    initial_tier: None,
                },
                InstanceConfig {
                    id: "vm-secondary".to_string(),
                    initial_tier: None,
                },
            ],
            endpoints: EndpointsConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            receive_timeout: "60s".to_string(),
            lookback: "1m".to_string(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            monitor: "monitor".to_string(),
            decider: "decider".to_string(),
            executor: "executor".to_string(),
        }
    }
}

/// An instance under management, with its starting tier resolved to an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedInstance {
    pub id: InstanceId,
    pub initial_tier: usize,
}

/// Validated configuration passed into each role.
#[derive(Debug, Clone)]
pub struct Settings {
    pub interval: Duration,
    pub receive_timeout: Duration,
    pub lookback: Duration,
    pub policy: ThresholdPolicy,
    pub tiers: TierTable,
    pub instances: Vec<ManagedInstance>,
    pub endpoints: EndpointsConfig,
}

impl Settings {
    /// Managed instance ids, in processing order.
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }
}

impl Config {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and validate a config file in one go.
    pub fn load(path: &Path) -> ConfigResult<Settings> {
        Self::from_file(path)?.resolve()
    }

    /// Validate the config and resolve durations and tier names.
    pub fn resolve(&self) -> ConfigResult<Settings> {
        let interval = parse_duration(&self.control.interval)?;
        let receive_timeout = parse_duration(&self.control.receive_timeout)?;
        let lookback = parse_duration(&self.control.lookback)?;
        for (name, value) in [
            ("interval", interval),
            ("receive_timeout", receive_timeout),
            ("lookback", lookback),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("control.{name} must be positive")));
            }
        }

        validate_thresholds(&self.thresholds)?;
        let tiers = TierTable::new(self.tiers.clone())?;

        if self.instances.is_empty() {
            return Err(ConfigError::Invalid("no instances to manage".to_string()));
        }
        let mut seen = HashSet::new();
        let mut instances = Vec::with_capacity(self.instances.len());
        for inst in &self.instances {
            if inst.id.is_empty() {
                return Err(ConfigError::Invalid("instance id is empty".to_string()));
            }
            if !seen.insert(inst.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate instance {}", inst.id)));
            }
            let initial_tier = match &inst.initial_tier {
                Some(name) => tiers.index_of(name).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "instance {} starts at unknown tier {name}",
                        inst.id
                    ))
                })?,
                None => 0,
            };
            instances.push(ManagedInstance {
                id: inst.id.clone(),
                initial_tier,
            });
        }

        let ep = &self.endpoints;
        let names = [&ep.monitor, &ep.decider, &ep.executor];
        if names.iter().any(|n| n.is_empty()) {
            return Err(ConfigError::Invalid("endpoint names must not be empty".to_string()));
        }
        if ep.monitor == ep.decider || ep.monitor == ep.executor || ep.decider == ep.executor {
            return Err(ConfigError::Invalid("endpoint names must be distinct".to_string()));
        }

        Ok(Settings {
            interval,
            receive_timeout,
            lookback,
            policy: self.thresholds,
            tiers,
            instances,
            endpoints: self.endpoints.clone(),
        })
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn validate_thresholds(policy: &ThresholdPolicy) -> ConfigResult<()> {
    let pairs = |t: &Thresholds| {
        [
            ("cpu_pct", t.cpu_pct),
            ("mem_pct", t.mem_pct),
            ("disk_read_mb", t.disk_read_mb),
            ("net_in_mb", t.net_in_mb),
        ]
    };
    for ((name, lower), (_, upper)) in pairs(&policy.lower).into_iter().zip(pairs(&policy.upper)) {
        if !lower.is_finite() || !upper.is_finite() || lower < 0.0 || upper < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold {name} must be finite and non-negative"
            )));
        }
        if lower > upper {
            return Err(ConfigError::Invalid(format!(
                "lower {name} threshold {lower} exceeds upper threshold {upper}"
            )));
        }
    }
    Ok(())
}

/// Parse a duration string like "500ms", "30s", "5m", "1h" or bare seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    let secs = value.checked_mul(secs_per_unit).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_resolve() {
        let settings = Config::default().resolve().unwrap();
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.receive_timeout, Duration::from_secs(60));
        assert_eq!(settings.lookback, Duration::from_secs(60));
        assert_eq!(settings.tiers.len(), 3);
        assert_eq!(settings.tiers.rate(0), 0.02);
        assert_eq!(settings.instance_ids(), vec!["vm-initiale", "vm-secondary"]);
        assert!(settings.instances.iter().all(|i| i.initial_tier == 0));
    }

    #[test]
    fn parse_minimal() {
        let config = Config::from_toml_str(
            r#"
[[instances]]
id = "web-1"
initial_tier = "Standard_B2s"
"#,
        )
        .unwrap();
        let settings = config.resolve().unwrap();
        assert_eq!(settings.instances.len(), 1);
        assert_eq!(settings.instances[0].initial_tier, 1);
        // Unspecified sections keep their defaults.
        assert_eq!(settings.policy, ThresholdPolicy::default());
    }

    #[test]
    fn parse_full() {
        let config = Config::from_toml_str(
            r#"
[control]
interval = "30s"
receive_timeout = "45s"
lookback = "5m"

[thresholds.upper]
cpu_pct = 90.0
mem_pct = 85.0
disk_read_mb = 60.0
net_in_mb = 600.0

[thresholds.lower]
cpu_pct = 10.0
mem_pct = 15.0
disk_read_mb = 5.0
net_in_mb = 50.0

[[tiers]]
name = "small"
hourly_rate = 0.01
memory_gb = 2.0

[[tiers]]
name = "large"
hourly_rate = 0.1
memory_gb = 8.0

[[instances]]
id = "a"

[endpoints]
monitor = "mon"
decider = "dec"
executor = "exe"
"#,
        )
        .unwrap();
        let settings = config.resolve().unwrap();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.receive_timeout, Duration::from_secs(45));
        assert_eq!(settings.lookback, Duration::from_secs(300));
        assert_eq!(settings.policy.upper.cpu_pct, 90.0);
        assert_eq!(settings.policy.lower.net_in_mb, 50.0);
        assert_eq!(settings.tiers.max_index(), 1);
        assert_eq!(settings.endpoints.decider, "dec");
    }

    #[test]
    fn rejects_duplicate_instances() {
        let mut config = Config::default();
        config.instances.push(InstanceConfig {
            id: "vm-initiale".to_string(),
            initial_tier: None,
        });
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("duplicate instance"));
    }

    #[test]
    fn rejects_unknown_initial_tier() {
        let mut config = Config::default();
        config.instances[0].initial_tier = Some("Standard_X99".to_string());
        assert!(config.resolve().is_err());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.thresholds.lower.cpu_pct = 95.0;
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("cpu_pct"));
    }

    #[test]
    fn rejects_empty_tiers_and_instances() {
        let mut config = Config::default();
        config.tiers.clear();
        assert!(config.resolve().is_err());

        let mut config = Config::default();
        config.instances.clear();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn rejects_shared_endpoint_names() {
        let mut config = Config::default();
        config.endpoints.executor = "decider".to_string();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = Config::default();
        config.control.receive_timeout = "0s".to_string();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert!(matches!(
            parse_duration("307445734561825861m"),
            Err(ConfigError::Duration(_))
        ));
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());

        let mut config = Config::default();
        config.control.interval = "5124095576030432h".to_string();
        assert!(matches!(config.resolve(), Err(ConfigError::Duration(_))));
    }

    #[test]
    fn roundtrips_through_toml() {
        let text = Config::default().to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed.tiers, Config::default().tiers);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[control]\ninterval = \"10s\"").unwrap();

        let settings = Config::load(file.path()).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(10));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/tierscale.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
