use std::convert::TryInto;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{ComputeError, ComputeResult};
use crate::types::{Circuit, CircuitVersion, EncryptedData, NewCircuit, NewProof, Proof};

pub const STORAGE_SCHEMA_VERSION: u32 = 1;

pub(crate) const CF_CIRCUITS: &str = "circuits";
pub(crate) const CF_VERSIONS: &str = "circuit_versions";
pub(crate) const CF_PROOFS: &str = "proofs";
pub(crate) const CF_ENCRYPTED: &str = "encrypted_data";
pub(crate) const CF_METADATA: &str = "metadata";
const COLUMN_FAMILIES: [&str; 5] = [CF_CIRCUITS, CF_VERSIONS, CF_PROOFS, CF_ENCRYPTED, CF_METADATA];

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const SEQ_CIRCUITS: &[u8] = b"seq:circuits";
const SEQ_VERSIONS: &[u8] = b"seq:circuit_versions";
const SEQ_PROOFS: &[u8] = b"seq:proofs";
const SEQ_ENCRYPTED: &[u8] = b"seq:encrypted_data";

type Db = DBWithThreadMode<MultiThreaded>;

/// Row counts used by the dashboard summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub circuits: u64,
    pub proofs: u64,
    pub encrypted: u64,
}

/// RocksDB-backed entity store. Each relational table lives in its own column
/// family; rows are JSON documents keyed by big-endian surrogate ids.
pub struct Storage {
    db: Arc<Db>,
    sequences: Arc<Mutex<()>>,
}

impl Storage {
    pub fn open(path: &Path) -> ComputeResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = Db::open_cf_descriptors(&opts, path, cf_descriptors)?;
        let storage = Self {
            db: Arc::new(db),
            sequences: Arc::new(Mutex::new(())),
        };
        storage.ensure_schema_supported()?;
        Ok(storage)
    }

    fn cf(&self, name: &str) -> ComputeResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ComputeError::Config(format!("missing {name} column family")))
    }

    fn ensure_schema_supported(&self) -> ComputeResult<()> {
        match self.read_schema_version()? {
            Some(version) if version > STORAGE_SCHEMA_VERSION => Err(ComputeError::Config(format!(
                "database schema version {version} is newer than supported {STORAGE_SCHEMA_VERSION}"
            ))),
            Some(version) if version < STORAGE_SCHEMA_VERSION => {
                Err(ComputeError::MigrationRequired {
                    found: version,
                    required: STORAGE_SCHEMA_VERSION,
                })
            }
            Some(_) => Ok(()),
            None => {
                if self.is_empty()? {
                    let metadata = self.cf(CF_METADATA)?;
                    self.db.put_cf(
                        &metadata,
                        SCHEMA_VERSION_KEY,
                        STORAGE_SCHEMA_VERSION.to_be_bytes(),
                    )?;
                    Ok(())
                } else {
                    Err(ComputeError::MigrationRequired {
                        found: 0,
                        required: STORAGE_SCHEMA_VERSION,
                    })
                }
            }
        }
    }

    fn is_empty(&self) -> ComputeResult<bool> {
        for name in [CF_CIRCUITS, CF_VERSIONS, CF_PROOFS, CF_ENCRYPTED] {
            let cf = self.cf(name)?;
            let mut iter = self.db.iterator_cf(&cf, IteratorMode::Start);
            if iter.next().transpose()?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read_schema_version(&self) -> ComputeResult<Option<u32>> {
        let metadata = self.cf(CF_METADATA)?;
        match self.db.get_cf(&metadata, SCHEMA_VERSION_KEY)? {
            Some(bytes) => {
                let bytes: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| ComputeError::Config("invalid schema version encoding".into()))?;
                Ok(Some(u32::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn schema_version(&self) -> ComputeResult<u32> {
        Ok(self
            .read_schema_version()?
            .unwrap_or(STORAGE_SCHEMA_VERSION))
    }

    /// Next value of a surrogate-key sequence. Callers must hold `sequences`
    /// until the batch persisting the new value is written.
    fn next_id(&self, sequence: &[u8]) -> ComputeResult<u64> {
        let metadata = self.cf(CF_METADATA)?;
        let current = match self.db.get_cf(&metadata, sequence)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        Ok(current + 1)
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> ComputeResult<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], record: &T) -> ComputeResult<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(&cf, key, serde_json::to_vec(record)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> ComputeResult<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn count(&self, cf_name: &str) -> ComputeResult<u64> {
        let cf = self.cf(cf_name)?;
        let mut total = 0;
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            entry?;
            total += 1;
        }
        Ok(total)
    }

    fn insert_row<T: Serialize>(
        &self,
        cf_name: &str,
        sequence: &[u8],
        build: impl FnOnce(u64) -> T,
    ) -> ComputeResult<T> {
        let _guard = self.sequences.lock();
        let id = self.next_id(sequence)?;
        let record = build(id);
        let cf = self.cf(cf_name)?;
        let metadata = self.cf(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf, id_key(id), serde_json::to_vec(&record)?);
        batch.put_cf(&metadata, sequence, id.to_be_bytes());
        self.db.write(batch)?;
        Ok(record)
    }

    /// All circuits, most recently updated first.
    pub fn list_circuits(&self) -> ComputeResult<Vec<Circuit>> {
        let mut circuits: Vec<Circuit> = self.scan(CF_CIRCUITS)?;
        circuits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(circuits)
    }

    pub fn get_circuit(&self, id: u64) -> ComputeResult<Option<Circuit>> {
        self.read(CF_CIRCUITS, &id_key(id))
    }

    pub fn insert_circuit(&self, draft: NewCircuit) -> ComputeResult<Circuit> {
        let now = Utc::now();
        self.insert_row(CF_CIRCUITS, SEQ_CIRCUITS, |id| Circuit {
            id,
            name: draft.name,
            description: draft.description,
            nodes: draft.nodes,
            connections: draft.connections,
            current_version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn put_circuit(&self, circuit: &Circuit) -> ComputeResult<()> {
        self.write(CF_CIRCUITS, &id_key(circuit.id), circuit)
    }

    /// Removes a circuit together with every snapshot it owns in one batch.
    /// Returns `false` when the circuit does not exist.
    pub fn delete_circuit(&self, id: u64) -> ComputeResult<bool> {
        let circuits = self.cf(CF_CIRCUITS)?;
        if self.db.get_cf(&circuits, id_key(id))?.is_none() {
            return Ok(false);
        }
        let versions = self.cf(CF_VERSIONS)?;
        let mut batch = WriteBatch::default();
        for (key, _) in self.version_rows(id)? {
            batch.delete_cf(&versions, key);
        }
        batch.delete_cf(&circuits, id_key(id));
        self.db.write(batch)?;
        Ok(true)
    }

    fn version_rows(&self, circuit_id: u64) -> ComputeResult<Vec<(Box<[u8]>, CircuitVersion)>> {
        let cf = self.cf(CF_VERSIONS)?;
        let prefix = id_key(circuit_id);
        let mut rows = Vec::new();
        for entry in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            let version: CircuitVersion = serde_json::from_slice(&value)?;
            rows.push((key, version));
        }
        Ok(rows)
    }

    /// Snapshots of one circuit ordered by version number, newest first.
    pub fn list_versions(&self, circuit_id: u64) -> ComputeResult<Vec<CircuitVersion>> {
        let mut versions: Vec<CircuitVersion> = self
            .version_rows(circuit_id)?
            .into_iter()
            .map(|(_, version)| version)
            .collect();
        versions.reverse();
        Ok(versions)
    }

    pub fn get_version(
        &self,
        circuit_id: u64,
        version: u32,
    ) -> ComputeResult<Option<CircuitVersion>> {
        self.read(CF_VERSIONS, &version_key(circuit_id, version))
    }

    pub fn max_version(&self, circuit_id: u64) -> ComputeResult<Option<u32>> {
        let cf = self.cf(CF_VERSIONS)?;
        let upper = version_key(circuit_id, u32::MAX);
        let mut iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));
        match iter.next().transpose()? {
            Some((key, _)) if key.starts_with(&id_key(circuit_id)) => {
                Ok(Some(decode_version(&key)?))
            }
            _ => Ok(None),
        }
    }

    /// Writes a snapshot of `circuit` as `version` and moves the circuit's
    /// version pointer to it in a single batch. Refuses to overwrite an
    /// existing `(circuit, version)` row.
    pub fn commit_version(
        &self,
        circuit: &Circuit,
        version: u32,
        changelog: String,
    ) -> ComputeResult<(CircuitVersion, Circuit)> {
        let _guard = self.sequences.lock();
        let versions = self.cf(CF_VERSIONS)?;
        let key = version_key(circuit.id, version);
        if self.db.get_cf(&versions, key)?.is_some() {
            return Err(ComputeError::Conflict(format!(
                "circuit {} already has version {version}",
                circuit.id
            )));
        }
        let id = self.next_id(SEQ_VERSIONS)?;
        let snapshot = CircuitVersion::snapshot(id, circuit, version, changelog, Utc::now());
        let mut updated = circuit.clone();
        updated.current_version = version;

        let circuits = self.cf(CF_CIRCUITS)?;
        let metadata = self.cf(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&versions, key, serde_json::to_vec(&snapshot)?);
        batch.put_cf(&circuits, id_key(circuit.id), serde_json::to_vec(&updated)?);
        batch.put_cf(&metadata, SEQ_VERSIONS, id.to_be_bytes());
        self.db.write(batch)?;
        Ok((snapshot, updated))
    }

    /// All proofs, newest first.
    pub fn list_proofs(&self) -> ComputeResult<Vec<Proof>> {
        let mut proofs: Vec<Proof> = self.scan(CF_PROOFS)?;
        proofs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(proofs)
    }

    pub fn get_proof(&self, id: u64) -> ComputeResult<Option<Proof>> {
        self.read(CF_PROOFS, &id_key(id))
    }

    pub fn insert_proof(&self, draft: NewProof) -> ComputeResult<Proof> {
        let now = Utc::now();
        self.insert_row(CF_PROOFS, SEQ_PROOFS, |id| Proof {
            id,
            circuit_id: draft.circuit_id,
            proof_type: draft.proof_type,
            status: draft.status,
            chain: draft.chain,
            proof_hash: draft.proof_hash,
            verification_time: draft.verification_time,
            gas_used: draft.gas_used,
            timestamp: now,
            details: draft.details,
        })
    }

    pub fn put_proof(&self, proof: &Proof) -> ComputeResult<()> {
        self.write(CF_PROOFS, &id_key(proof.id), proof)
    }

    pub fn insert_encrypted(
        &self,
        original_hash: String,
        encrypted_data: String,
        algorithm: String,
    ) -> ComputeResult<EncryptedData> {
        let now = Utc::now();
        self.insert_row(CF_ENCRYPTED, SEQ_ENCRYPTED, |id| EncryptedData {
            id,
            original_hash,
            encrypted_data,
            algorithm,
            output_hash: None,
            proof_hash: None,
            timestamp: now,
            verified: false,
        })
    }

    pub fn get_encrypted(&self, id: u64) -> ComputeResult<Option<EncryptedData>> {
        self.read(CF_ENCRYPTED, &id_key(id))
    }

    pub fn put_encrypted(&self, record: &EncryptedData) -> ComputeResult<()> {
        self.write(CF_ENCRYPTED, &id_key(record.id), record)
    }

    pub fn counts(&self) -> ComputeResult<EntityCounts> {
        Ok(EntityCounts {
            circuits: self.count(CF_CIRCUITS)?,
            proofs: self.count(CF_PROOFS)?,
            encrypted: self.count(CF_ENCRYPTED)?,
        })
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            sequences: self.sequences.clone(),
        }
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn version_key(circuit_id: u64, version: u32) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&circuit_id.to_be_bytes());
    key[8..].copy_from_slice(&version.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> ComputeResult<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ComputeError::Config("invalid sequence encoding".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode_version(key: &[u8]) -> ComputeResult<u32> {
    let bytes: [u8; 4] = key
        .get(8..12)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| ComputeError::Config("invalid version key encoding".into()))?;
    Ok(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Blockchain, ProofStatus};
    use tempfile::tempdir;

    fn draft(name: &str) -> NewCircuit {
        NewCircuit {
            name: name.to_string(),
            description: Some("test circuit".into()),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    #[test]
    fn sequences_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        {
            let storage = Storage::open(dir.path()).expect("open storage");
            assert_eq!(storage.insert_circuit(draft("a")).expect("insert").id, 1);
            assert_eq!(storage.insert_circuit(draft("b")).expect("insert").id, 2);
        }
        let storage = Storage::open(dir.path()).expect("reopen storage");
        assert_eq!(storage.schema_version().expect("schema"), STORAGE_SCHEMA_VERSION);
        assert_eq!(storage.insert_circuit(draft("c")).expect("insert").id, 3);
        assert_eq!(storage.counts().expect("counts").circuits, 3);
    }

    #[test]
    fn versions_are_scoped_per_circuit() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open storage");
        let first = storage.insert_circuit(draft("first")).expect("insert");
        let second = storage.insert_circuit(draft("second")).expect("insert");

        storage
            .commit_version(&first, 1, "Version 1".into())
            .expect("v1");
        storage
            .commit_version(&first, 2, "Version 2".into())
            .expect("v2");
        storage
            .commit_version(&second, 1, "Version 1".into())
            .expect("other v1");

        assert_eq!(storage.max_version(first.id).expect("max"), Some(2));
        assert_eq!(storage.max_version(second.id).expect("max"), Some(1));
        assert_eq!(storage.max_version(99).expect("max"), None);

        let listed: Vec<u32> = storage
            .list_versions(first.id)
            .expect("list")
            .iter()
            .map(|version| version.version)
            .collect();
        assert_eq!(listed, vec![2, 1]);
    }

    #[test]
    fn duplicate_version_is_a_conflict() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open storage");
        let circuit = storage.insert_circuit(draft("demo")).expect("insert");
        storage
            .commit_version(&circuit, 1, "Version 1".into())
            .expect("v1");
        let err = storage
            .commit_version(&circuit, 1, "again".into())
            .expect_err("duplicate");
        assert!(matches!(err, ComputeError::Conflict(_)));
    }

    #[test]
    fn delete_cascades_to_versions() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open storage");
        let doomed = storage.insert_circuit(draft("doomed")).expect("insert");
        let kept = storage.insert_circuit(draft("kept")).expect("insert");
        for version in 1..=3 {
            storage
                .commit_version(&doomed, version, format!("Version {version}"))
                .expect("commit");
        }
        storage
            .commit_version(&kept, 1, "Version 1".into())
            .expect("commit");

        assert!(storage.delete_circuit(doomed.id).expect("delete"));
        assert!(!storage.delete_circuit(doomed.id).expect("second delete"));
        assert!(storage.get_circuit(doomed.id).expect("get").is_none());
        assert!(storage.list_versions(doomed.id).expect("list").is_empty());
        assert_eq!(storage.list_versions(kept.id).expect("list").len(), 1);
    }

    #[test]
    fn proofs_are_listed_newest_first() {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open storage");
        for label in ["first", "second"] {
            storage
                .insert_proof(NewProof {
                    circuit_id: None,
                    proof_type: label.into(),
                    status: ProofStatus::Pending,
                    chain: Blockchain::Solana,
                    proof_hash: "0x00".into(),
                    verification_time: None,
                    gas_used: None,
                    details: None,
                })
                .expect("insert proof");
        }
        let proofs = storage.list_proofs().expect("list");
        assert_eq!(proofs[0].proof_type, "second");
        assert_eq!(proofs[1].proof_type, "first");
    }
}
