use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info};

use crate::chains::ChainMonitor;
use crate::codegen::{self, CodeFormat};
use crate::config::{ComputeConfig, ExecutionConfig};
use crate::errors::{ComputeError, ComputeResult, Entity};
use crate::metrics::{self, DashboardStats, PerformanceMetrics};
use crate::notifier::{EventKind, Notification, Notifier};
use crate::simulator::{random_proof_hash, ProofSimulator};
use crate::storage::Storage;
use crate::types::{
    module_catalog, ChainStatus, Circuit, CircuitPatch, CircuitVersion, ComputationProof,
    EncryptRequest, EncryptedData, ModuleTemplate, NewCircuit, NewProof, Proof, ProofStatus,
};
use crate::versioning::{CircuitLocks, VersionEngine};

const CONSTRAINTS_PER_NODE: usize = 1024;

/// Result of a simulated circuit run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub circuit_id: u64,
    pub proof: Proof,
    pub success: bool,
}

struct ServiceInner {
    storage: Storage,
    locks: CircuitLocks,
    versions: VersionEngine,
    simulator: ProofSimulator,
    chains: ChainMonitor,
    notifier: Notifier,
    execution: ExecutionConfig,
}

/// Cloneable handle over every operation the HTTP surface exposes. Each
/// successful mutation is announced on the realtime channel.
#[derive(Clone)]
pub struct ComputeService {
    inner: Arc<ServiceInner>,
}

impl ComputeService {
    pub fn open(config: &ComputeConfig) -> ComputeResult<Self> {
        config.ensure_directories()?;
        let storage = Storage::open(&config.db_path())?;
        info!(path = %config.db_path().display(), "opened entity store");
        Ok(Self::with_storage(
            storage,
            config.execution.clone(),
            Notifier::new(config.realtime.channel_capacity),
        ))
    }

    pub fn with_storage(storage: Storage, execution: ExecutionConfig, notifier: Notifier) -> Self {
        let locks = CircuitLocks::default();
        let inner = ServiceInner {
            versions: VersionEngine::new(storage.clone(), locks.clone()),
            simulator: ProofSimulator::new(storage.clone()),
            chains: ChainMonitor::new(),
            storage,
            locks,
            notifier,
            execution,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    fn publish<T: Serialize>(&self, kind: EventKind, data: &T) {
        self.inner.notifier.publish(kind, data);
    }

    pub fn stats(&self) -> ComputeResult<DashboardStats> {
        let counts = self.inner.storage.counts()?;
        let proofs = self.inner.storage.list_proofs()?;
        Ok(metrics::dashboard_stats(counts, &proofs))
    }

    pub fn performance_metrics(&self) -> ComputeResult<PerformanceMetrics> {
        let proofs = self.inner.storage.list_proofs()?;
        let circuits = self.inner.storage.list_circuits()?;
        Ok(metrics::performance_metrics(
            &proofs,
            &circuits,
            Utc::now().date_naive(),
        ))
    }

    /// Per-instance chain telemetry; only verification counts are persisted
    /// data.
    pub fn chain_status(&self) -> ComputeResult<Vec<ChainStatus>> {
        let proofs = self.inner.storage.list_proofs()?;
        Ok(self.inner.chains.snapshot(&proofs))
    }

    pub fn module_catalog(&self) -> Vec<ModuleTemplate> {
        module_catalog()
    }

    pub fn list_circuits(&self) -> ComputeResult<Vec<Circuit>> {
        self.inner.storage.list_circuits()
    }

    pub fn get_circuit(&self, id: u64) -> ComputeResult<Circuit> {
        self.inner
            .storage
            .get_circuit(id)?
            .ok_or(ComputeError::NotFound(Entity::Circuit))
    }

    pub fn create_circuit(&self, draft: NewCircuit) -> ComputeResult<Circuit> {
        draft.validate()?;
        let circuit = self.inner.storage.insert_circuit(draft)?;
        info!(id = circuit.id, name = %circuit.name, "circuit created");
        self.publish(EventKind::CircuitCreated, &circuit);
        Ok(circuit)
    }

    pub fn update_circuit(&self, id: u64, patch: CircuitPatch) -> ComputeResult<Circuit> {
        let circuit = self.inner.locks.with(id, || {
            let mut circuit = self.get_circuit(id)?;
            patch.apply_to(&mut circuit)?;
            circuit.updated_at = Utc::now();
            self.inner.storage.put_circuit(&circuit)?;
            Ok::<_, ComputeError>(circuit)
        })?;
        info!(id, "circuit updated");
        self.publish(EventKind::CircuitUpdated, &circuit);
        Ok(circuit)
    }

    /// Removes the circuit and its snapshots. Proofs referencing it are kept.
    pub fn delete_circuit(&self, id: u64) -> ComputeResult<()> {
        let removed = self
            .inner
            .locks
            .with(id, || self.inner.storage.delete_circuit(id))?;
        if !removed {
            return Err(ComputeError::NotFound(Entity::Circuit));
        }
        info!(id, "circuit deleted");
        self.publish(EventKind::CircuitDeleted, &json!({ "id": id }));
        Ok(())
    }

    pub fn list_versions(&self, circuit_id: u64) -> ComputeResult<Vec<CircuitVersion>> {
        self.inner.versions.list_versions(circuit_id)
    }

    pub fn get_version(&self, circuit_id: u64, version: u32) -> ComputeResult<CircuitVersion> {
        self.inner.versions.get_version(circuit_id, version)
    }

    pub fn create_version(
        &self,
        circuit_id: u64,
        changelog: Option<String>,
    ) -> ComputeResult<CircuitVersion> {
        let version = self.inner.versions.create_version(circuit_id, changelog)?;
        self.publish(
            EventKind::VersionCreated,
            &json!({ "circuitId": circuit_id, "version": version.version }),
        );
        Ok(version)
    }

    pub fn restore_version(&self, circuit_id: u64, version: u32) -> ComputeResult<Circuit> {
        let circuit = self.inner.versions.restore_version(circuit_id, version)?;
        self.publish(
            EventKind::VersionRestored,
            &json!({ "circuitId": circuit_id, "version": version, "circuit": circuit }),
        );
        Ok(circuit)
    }

    pub fn list_proofs(&self) -> ComputeResult<Vec<Proof>> {
        self.inner.storage.list_proofs()
    }

    pub fn get_proof(&self, id: u64) -> ComputeResult<Proof> {
        self.inner
            .storage
            .get_proof(id)?
            .ok_or(ComputeError::NotFound(Entity::Proof))
    }

    pub fn create_proof(&self, draft: NewProof) -> ComputeResult<Proof> {
        let proof = self.inner.storage.insert_proof(draft)?;
        info!(id = proof.id, chain = %proof.chain, "proof recorded");
        self.publish(EventKind::ProofCreated, &proof);
        Ok(proof)
    }

    /// `status` arrives as free text so an unknown value is a validation
    /// error rather than a decode failure.
    pub fn update_proof_status(&self, id: u64, status: Option<&str>) -> ComputeResult<Proof> {
        let status = status
            .and_then(|value| value.parse::<ProofStatus>().ok())
            .ok_or_else(|| {
                ComputeError::validation(
                    "Invalid status",
                    vec!["status: expected one of pending, verified, failed".to_string()],
                )
            })?;
        let proof = self.inner.simulator.update_proof_status(id, status)?;
        self.publish(EventKind::ProofUpdated, &proof);
        Ok(proof)
    }

    pub fn encrypt(&self, request: EncryptRequest) -> ComputeResult<EncryptedData> {
        let record = self.inner.simulator.encrypt(request)?;
        self.publish(EventKind::DataEncrypted, &json!({ "id": record.id }));
        Ok(record)
    }

    pub fn get_encrypted(&self, id: u64) -> ComputeResult<EncryptedData> {
        self.inner
            .storage
            .get_encrypted(id)?
            .ok_or(ComputeError::NotFound(Entity::EncryptedData))
    }

    pub fn verify_computation(&self, id: u64) -> ComputeResult<ComputationProof> {
        let proof = self.inner.simulator.verify_computation(id)?;
        self.publish(
            EventKind::ComputationVerified,
            &json!({
                "id": id,
                "inputHash": proof.input_hash,
                "outputHash": proof.output_hash,
                "proofHash": proof.proof_hash,
            }),
        );
        Ok(proof)
    }

    pub fn render_code(&self, id: u64, format: CodeFormat) -> ComputeResult<String> {
        let circuit = self.get_circuit(id)?;
        debug!(id, format = format.as_str(), "rendering circuit code");
        Ok(codegen::render(&circuit, format))
    }

    /// Walks the circuit's nodes with an artificial delay per node, then
    /// records a verified proof for the run.
    pub async fn execute(&self, id: u64) -> ComputeResult<ExecutionReport> {
        let circuit = self.get_circuit(id)?;
        let execution_id = {
            let mut rng = rand::thread_rng();
            format!(
                "exec-{}-{:04x}",
                Utc::now().timestamp_millis(),
                rng.gen::<u16>()
            )
        };
        info!(circuit_id = id, %execution_id, nodes = circuit.nodes.len(), "circuit execution started");
        self.publish(
            EventKind::ExecutionStart,
            &json!({ "circuitId": id, "executionId": execution_id }),
        );

        let delay = Duration::from_millis(self.inner.execution.step_delay_ms);
        for (step, node) in circuit.nodes.iter().enumerate() {
            time::sleep(delay).await;
            debug!(circuit_id = id, %execution_id, step, node = %node.name, "execution step");
            self.publish(
                EventKind::ExecutionStep,
                &json!({
                    "circuitId": id,
                    "executionId": execution_id,
                    "step": step,
                    "node": node.name,
                }),
            );
        }

        let (verification_time, gas_used) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0.5..2.5), rng.gen_range(100_000..300_000))
        };
        let mut details = Map::new();
        details.insert("inputs".into(), Value::from(circuit.nodes.len()));
        details.insert(
            "constraints".into(),
            Value::from(circuit.nodes.len() * CONSTRAINTS_PER_NODE),
        );
        let proof = self.inner.storage.insert_proof(NewProof {
            circuit_id: Some(id),
            proof_type: format!("Circuit: {}", circuit.name),
            status: ProofStatus::Verified,
            chain: self.inner.execution.default_chain,
            proof_hash: random_proof_hash(),
            verification_time: Some(verification_time),
            gas_used: Some(gas_used),
            details: Some(details),
        })?;

        info!(circuit_id = id, %execution_id, proof_id = proof.id, "circuit execution complete");
        self.publish(
            EventKind::ExecutionComplete,
            &json!({ "circuitId": id, "executionId": execution_id, "proof": proof }),
        );
        Ok(ExecutionReport {
            execution_id,
            circuit_id: id,
            proof,
            success: true,
        })
    }
}
