//! Presentation-only stand-ins for cryptographic operations.
//!
//! Every "hash", "encryption" and "proof" produced here is a deterministic
//! checksum or a character shuffle. None of it is collision resistant,
//! confidential, or binding; the values exist so the dashboard has stable
//! identifiers to display. Never rely on them for integrity or secrecy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;
use tracing::info;

use crate::errors::{ComputeError, ComputeResult, Entity};
use crate::storage::Storage;
use crate::types::{
    ComputationProof, EncryptRequest, EncryptedData, Proof, ProofStatus, DEFAULT_ALGORITHM,
};

const ENVELOPE_HEADER: &str = "-----BEGIN ENCRYPTED DATA-----";
const ENVELOPE_FOOTER: &str = "-----END ENCRYPTED DATA-----";
const ENVELOPE_LINE_WIDTH: usize = 32;

/// 32-bit rolling `hash * 31 + unit` over the UTF-16 units of
/// `input ‖ seed`, rendered as `0x` plus 64 zero-padded hex digits.
///
/// Not a cryptographic hash: collisions are trivial to find.
pub fn deterministic_hash(input: &str, seed: &str) -> String {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16().chain(seed.encode_utf16()) {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    format!("0x{:064x}", hash.unsigned_abs())
}

/// Base64-encodes `plain`, shifts every character by its position modulo 26
/// relative to `A`, and wraps the result in a PEM-like envelope.
///
/// The remainder is truncating, so characters below `A` (digits, `+`, `/`,
/// `=`) can land below `A` as well. Output stays printable ASCII.
pub fn obfuscate(plain: &str) -> String {
    let encoded = BASE64.encode(plain.as_bytes());
    let shifted: Vec<char> = encoded
        .bytes()
        .enumerate()
        .map(|(index, byte)| {
            let code = (i64::from(byte) - 65 + index as i64) % 26 + 65;
            char::from(code as u8)
        })
        .collect();

    let mut envelope = String::from(ENVELOPE_HEADER);
    for line in shifted.chunks(ENVELOPE_LINE_WIDTH) {
        envelope.push('\n');
        envelope.extend(line.iter());
    }
    envelope.push('\n');
    envelope.push_str(ENVELOPE_FOOTER);
    envelope
}

/// Verification time and gas figures derived from a checksum of the proof
/// type. A display convenience, not a measurement.
pub fn derive_verification_metrics(proof_type: &str) -> (f64, u64) {
    let checksum: u64 = proof_type.encode_utf16().map(u64::from).sum();
    let verification_time = (checksum % 200) as f64 / 100.0 + 0.5;
    let gas_used = checksum % 200_000 + 100_000;
    (verification_time, gas_used)
}

/// Random `0x`-prefixed 64-hex-digit identifier for execution proofs.
pub fn random_proof_hash() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    format!("0x{}", hex::encode(bytes))
}

/// Persists and transitions the simulated encryption and proof records.
#[derive(Clone)]
pub struct ProofSimulator {
    storage: Storage,
}

impl ProofSimulator {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn encrypt(&self, request: EncryptRequest) -> ComputeResult<EncryptedData> {
        let algorithm = request
            .algorithm
            .filter(|algorithm| !algorithm.is_empty())
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string());
        let original_hash = deterministic_hash(&request.plain_data, "");
        let encrypted = obfuscate(&request.plain_data);
        let record = self
            .storage
            .insert_encrypted(original_hash, encrypted, algorithm)?;
        info!(id = record.id, algorithm = %record.algorithm, "stored encrypted payload");
        Ok(record)
    }

    /// Marks the record verified, computing its output and proof hashes on
    /// first use. Later calls return the stored hashes untouched.
    pub fn verify_computation(&self, id: u64) -> ComputeResult<ComputationProof> {
        let mut record = self
            .storage
            .get_encrypted(id)?
            .ok_or(ComputeError::NotFound(Entity::EncryptedData))?;

        if record.verified {
            if let (Some(output_hash), Some(proof_hash)) = (&record.output_hash, &record.proof_hash)
            {
                return Ok(ComputationProof {
                    input_hash: record.original_hash.clone(),
                    output_hash: output_hash.clone(),
                    proof_hash: proof_hash.clone(),
                });
            }
        }

        let output_hash = deterministic_hash(&record.encrypted_data, "output");
        let proof_hash = deterministic_hash(
            &format!("{}{}", record.original_hash, record.encrypted_data),
            "proof",
        );
        record.verified = true;
        record.output_hash = Some(output_hash.clone());
        record.proof_hash = Some(proof_hash.clone());
        self.storage.put_encrypted(&record)?;
        info!(id, "computation verified");

        Ok(ComputationProof {
            input_hash: record.original_hash,
            output_hash,
            proof_hash,
        })
    }

    /// Applies a status transition. Moving to `verified` fills in any missing
    /// timing and gas figures from the proof type.
    pub fn update_proof_status(&self, id: u64, status: ProofStatus) -> ComputeResult<Proof> {
        let mut proof = self
            .storage
            .get_proof(id)?
            .ok_or(ComputeError::NotFound(Entity::Proof))?;
        proof.status = status;
        if status == ProofStatus::Verified {
            let (verification_time, gas_used) = derive_verification_metrics(&proof.proof_type);
            proof.verification_time.get_or_insert(verification_time);
            proof.gas_used.get_or_insert(gas_used);
        }
        self.storage.put_proof(&proof)?;
        info!(id, status = %status, "proof status updated");
        Ok(proof)
    }
}
