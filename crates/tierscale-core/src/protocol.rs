//! Wire format of the messages exchanged between roles.
//!
//! Two text bodies travel over the bus:
//!
//! ```text
//! metric   (monitor → decider)   cpu:<f64>,memory:<f64>,disk_read:<f64>,network_in:<f64>
//! decision (decider → executor)  <instance_id>:<scale_up|scale_down|no_action>
//! ```
//!
//! Bodies are wrapped in an [`Envelope`] that carries addressing and the
//! sender's cycle number, so receivers can tell which instance a metric body
//! belongs to and drop messages from a superseded cycle.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Cycle, InstanceId, MetricSample, ScalingAction, ScalingDecision};

/// Field keys of a metric body, in their mandatory order.
pub const METRIC_KEYS: [&str; 4] = ["cpu", "memory", "disk_read", "network_in"];

/// A message as delivered to a mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Endpoint name of the sender.
    pub from: String,
    /// Endpoint name of the receiver.
    pub to: String,
    /// Instance the body refers to.
    pub instance_id: InstanceId,
    /// Cycle of the sender in which the body was produced.
    pub cycle: Cycle,
    pub body: String,
}

/// A message a role wants sent; the bus fills in the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to: String,
    pub instance_id: InstanceId,
    pub cycle: Cycle,
    pub body: String,
}

/// Render a sample as a metric body.
pub fn encode_metrics(sample: &MetricSample) -> String {
    format!(
        "cpu:{},memory:{},disk_read:{},network_in:{}",
        sample.cpu_pct, sample.mem_pct, sample.disk_read_mb, sample.net_in_mb
    )
}

/// Parse a metric body for `instance_id`.
///
/// Exactly four `key:value` fields are accepted, in the order of
/// [`METRIC_KEYS`], with finite non-negative values and no whitespace.
pub fn decode_metrics(instance_id: &str, body: &str) -> ProtocolResult<MetricSample> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != METRIC_KEYS.len() {
        return Err(ProtocolError::malformed(
            body,
            format!("expected {} fields, found {}", METRIC_KEYS.len(), fields.len()),
        ));
    }

    let mut values = [0.0_f64; 4];
    for (i, (field, expected)) in fields.iter().zip(METRIC_KEYS).enumerate() {
        let (key, raw) = field
            .split_once(':')
            .ok_or_else(|| ProtocolError::malformed(body, format!("field {field:?} has no ':'")))?;
        if key != expected {
            return Err(ProtocolError::malformed(
                body,
                format!("expected key {expected:?} at position {i}, found {key:?}"),
            ));
        }
        let value: f64 = raw
            .parse()
            .map_err(|_| ProtocolError::malformed(body, format!("{key} is not a number: {raw:?}")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ProtocolError::malformed(
                body,
                format!("{key} must be finite and non-negative, got {value}"),
            ));
        }
        values[i] = value;
    }

    Ok(MetricSample {
        instance_id: instance_id.to_string(),
        cpu_pct: values[0],
        mem_pct: values[1],
        disk_read_mb: values[2],
        net_in_mb: values[3],
    })
}

/// Render a decision body.
pub fn encode_decision(decision: &ScalingDecision) -> String {
    format!("{}:{}", decision.instance_id, decision.action)
}

/// Parse a decision body.
///
/// The action is taken after the last `:`, so instance ids may themselves
/// contain colons.
pub fn decode_decision(body: &str) -> ProtocolResult<ScalingDecision> {
    let (instance_id, action) = body
        .rsplit_once(':')
        .ok_or_else(|| ProtocolError::malformed(body, "missing ':' separator"))?;
    if instance_id.is_empty() {
        return Err(ProtocolError::malformed(body, "empty instance id"));
    }
    let action: ScalingAction = action.parse()?;
    Ok(ScalingDecision {
        instance_id: instance_id.to_string(),
        action,
    })
}
