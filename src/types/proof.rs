use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Blockchain;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Pending,
    Verified,
    Failed,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Pending => "pending",
            ProofStatus::Verified => "verified",
            ProofStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ProofStatus::Pending),
            "verified" => Ok(ProofStatus::Verified),
            "failed" => Ok(ProofStatus::Failed),
            other => Err(format!("unknown proof status `{other}`")),
        }
    }
}

/// A simulated verification result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_id: Option<u64>,
    #[serde(rename = "type")]
    pub proof_type: String,
    pub status: ProofStatus,
    pub chain: Blockchain,
    pub proof_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProof {
    #[serde(default)]
    pub circuit_id: Option<u64>,
    #[serde(rename = "type")]
    pub proof_type: String,
    pub status: ProofStatus,
    pub chain: Blockchain,
    pub proof_hash: String,
    #[serde(default)]
    pub verification_time: Option<f64>,
    #[serde(default)]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

/// Body of `PATCH /api/proofs/:id/status`; parsed leniently so an unknown
/// status yields a validation error instead of a decode failure.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}
