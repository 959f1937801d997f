//! Experiment schedule entries
//!
//! Only the presence of the schedule is validated at load time. Entries keep
//! their raw tree and decode `time`, `action` and `parameters` on access.

use serde::Serialize;

use crate::error::ManifestError;
use crate::node::{Node, Scalar};

/// When a scheduled action fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSpec {
    /// At the start of the experiment
    Origin,
    /// As soon as the previous action completes
    OnLastEventCompletion,
    /// A delay in seconds
    After(f64),
}

impl TimeSpec {
    pub fn from_node(node: &Node) -> Option<Self> {
        match node.as_scalar()? {
            Scalar::String(s) => match s.trim() {
                "origin" => Some(Self::Origin),
                "on-last-event-completion" => Some(Self::OnLastEventCompletion),
                other => other.parse::<f64>().ok().map(Self::After),
            },
            Scalar::Int(i) => Some(Self::After(*i as f64)),
            Scalar::Float(f) => Some(Self::After(*f)),
            _ => None,
        }
    }
}

/// One entry of an experiment schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScheduleEntry {
    raw: Node,
}

impl ScheduleEntry {
    pub fn new(raw: Node) -> Self {
        Self { raw }
    }

    /// Decode the schedule section. Null is an empty schedule.
    pub fn list(schedule: &Node) -> Result<Vec<ScheduleEntry>, ManifestError> {
        if schedule.is_null() {
            return Ok(Vec::new());
        }
        let items = schedule
            .as_sequence()
            .ok_or_else(|| ManifestError::invalid_field("schedule", "a sequence of schedule entries"))?;
        Ok(items.iter().cloned().map(Self::new).collect())
    }

    pub fn time(&self) -> Option<TimeSpec> {
        self.raw.get("time").and_then(TimeSpec::from_node)
    }

    pub fn action(&self) -> Option<&str> {
        self.raw.get("action").and_then(Node::as_str)
    }

    pub fn parameters(&self) -> Option<&Node> {
        self.raw.get("parameters")
    }

    pub fn raw(&self) -> &Node {
        &self.raw
    }
}
