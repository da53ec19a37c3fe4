//! Cost accounting records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Provider capability a cost was incurred for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Analysis,
    Image,
    Speech,
    Composition,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Analysis => "analysis",
            Capability::Image => "image",
            Capability::Speech => "speech",
            Capability::Composition => "composition",
        }
    }
}

/// Estimated cost of one completed provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostEntry {
    pub provider: String,
    pub capability: Capability,
    pub amount: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(provider: impl Into<String>, capability: Capability, amount: f64) -> Self {
        Self {
            provider: provider.into(),
            capability,
            amount,
            recorded_at: Utc::now(),
        }
    }
}
