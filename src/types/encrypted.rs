use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ALGORITHM: &str = "poseidon";

/// A submitted plaintext in its obfuscated form. Nothing here is encrypted in
/// any cryptographic sense.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    pub id: u64,
    pub original_hash: String,
    pub encrypted_data: String,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    pub plain_data: String,
    #[serde(default)]
    pub algorithm: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationProof {
    pub input_hash: String,
    pub output_hash: String,
    pub proof_hash: String,
}
