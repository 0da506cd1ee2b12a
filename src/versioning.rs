//! Snapshot and restore of circuit state.
//!
//! Version numbers follow snapshot creation order, not a linear history:
//! restoring to an old version and snapshotting again yields
//! `max(existing) + 1`, never a reused number.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::errors::{ComputeError, ComputeResult, Entity};
use crate::storage::Storage;
use crate::types::{Circuit, CircuitVersion};

/// Per-circuit mutual exclusion for read-modify-write sequences on a circuit
/// row (version allocation, restore, patch, delete). Entries exist only while
/// some caller holds or waits on them.
#[derive(Clone, Default)]
pub struct CircuitLocks {
    locks: Arc<Mutex<HashMap<u64, Arc<Mutex<()>>>>>,
}

impl CircuitLocks {
    fn handle(&self, circuit_id: u64) -> Arc<Mutex<()>> {
        self.locks.lock().entry(circuit_id).or_default().clone()
    }

    /// Runs `f` while holding the lock for `circuit_id`.
    pub fn with<T>(&self, circuit_id: u64, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(circuit_id);
        let result = {
            let _guard: MutexGuard<'_, ()> = handle.lock();
            f()
        };
        // Handles are only cloned under the map lock, so a count of two (map
        // plus ours) means nobody else is waiting.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&handle) == 2 {
            locks.remove(&circuit_id);
        }
        result
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

#[derive(Clone)]
pub struct VersionEngine {
    storage: Storage,
    locks: CircuitLocks,
}

impl VersionEngine {
    pub fn new(storage: Storage, locks: CircuitLocks) -> Self {
        Self { storage, locks }
    }

    /// Snapshots the circuit's current editable state as the next version
    /// and points `currentVersion` at it.
    pub fn create_version(
        &self,
        circuit_id: u64,
        changelog: Option<String>,
    ) -> ComputeResult<CircuitVersion> {
        self.locks.with(circuit_id, || {
            let circuit = self
                .storage
                .get_circuit(circuit_id)?
                .ok_or(ComputeError::NotFound(Entity::Circuit))?;
            let next = self
                .storage
                .max_version(circuit_id)?
                .map_or(1, |max| max + 1);
            let changelog = changelog
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| format!("Version {next}"));
            let (snapshot, _) = self.storage.commit_version(&circuit, next, changelog)?;
            info!(circuit_id, version = next, "circuit version created");
            Ok(snapshot)
        })
    }

    /// Copies a snapshot back onto the live circuit. Newer snapshots are
    /// kept, and no new snapshot is written.
    pub fn restore_version(&self, circuit_id: u64, version: u32) -> ComputeResult<Circuit> {
        self.locks.with(circuit_id, || {
            let snapshot = self
                .storage
                .get_version(circuit_id, version)?
                .ok_or(ComputeError::NotFound(Entity::Version))?;
            let mut circuit = self
                .storage
                .get_circuit(circuit_id)?
                .ok_or(ComputeError::NotFound(Entity::Version))?;
            circuit.name = snapshot.name;
            circuit.description = snapshot.description;
            circuit.nodes = snapshot.nodes;
            circuit.connections = snapshot.connections;
            circuit.current_version = version;
            circuit.updated_at = Utc::now();
            self.storage.put_circuit(&circuit)?;
            info!(circuit_id, version, "circuit restored to version");
            Ok(circuit)
        })
    }

    pub fn list_versions(&self, circuit_id: u64) -> ComputeResult<Vec<CircuitVersion>> {
        self.storage.list_versions(circuit_id)
    }

    pub fn get_version(&self, circuit_id: u64, version: u32) -> ComputeResult<CircuitVersion> {
        self.storage
            .get_version(circuit_id, version)?
            .ok_or(ComputeError::NotFound(Entity::Version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CircuitNode, CircuitPatch, ModuleType, NewCircuit, Position};
    use serde_json::Map;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Storage, VersionEngine) {
        let dir = tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open storage");
        let engine = VersionEngine::new(storage.clone(), CircuitLocks::default());
        (dir, storage, engine)
    }

    fn node(id: &str, module_type: ModuleType) -> CircuitNode {
        CircuitNode {
            id: id.to_string(),
            module_type,
            name: format!("Module {id}"),
            position: Position { x: 1.0, y: 2.0 },
            config: Map::new(),
            inputs: vec!["data".into()],
            outputs: vec!["commitment".into()],
        }
    }

    fn edit(storage: &Storage, circuit_id: u64, patch: CircuitPatch) -> Circuit {
        let mut circuit = storage
            .get_circuit(circuit_id)
            .expect("get")
            .expect("present");
        patch.apply_to(&mut circuit).expect("valid patch");
        circuit.updated_at = Utc::now();
        storage.put_circuit(&circuit).expect("put");
        circuit
    }

    fn create(storage: &Storage) -> Circuit {
        storage
            .insert_circuit(NewCircuit {
                name: "Demo".into(),
                description: None,
                nodes: Vec::new(),
                connections: Vec::new(),
            })
            .expect("insert circuit")
    }

    #[test]
    fn snapshot_copies_state_and_moves_pointer() {
        let (_dir, storage, engine) = setup();
        let circuit = create(&storage);
        let circuit = edit(
            &storage,
            circuit.id,
            CircuitPatch {
                nodes: Some(vec![node("a", ModuleType::Storage)]),
                description: Some("first draft".into()),
                ..CircuitPatch::default()
            },
        );

        let version = engine.create_version(circuit.id, None).expect("snapshot");
        assert_eq!(version.version, 1);
        assert_eq!(version.changelog.as_deref(), Some("Version 1"));
        assert_eq!(version.name, circuit.name);
        assert_eq!(version.description, circuit.description);
        assert_eq!(version.nodes, circuit.nodes);
        assert_eq!(version.connections, circuit.connections);

        let stored = storage
            .get_circuit(circuit.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.current_version, 1);
    }

    #[test]
    fn version_numbers_are_never_reused_across_restores() {
        let (_dir, storage, engine) = setup();
        let circuit = create(&storage);

        assert_eq!(engine.create_version(circuit.id, None).expect("v1").version, 1);
        edit(
            &storage,
            circuit.id,
            CircuitPatch {
                name: Some("Edited".into()),
                ..CircuitPatch::default()
            },
        );
        assert_eq!(
            engine
                .create_version(circuit.id, Some("rename".into()))
                .expect("v2")
                .version,
            2
        );

        let restored = engine.restore_version(circuit.id, 1).expect("restore");
        assert_eq!(restored.name, "Demo");
        assert_eq!(restored.current_version, 1);

        edit(
            &storage,
            circuit.id,
            CircuitPatch {
                nodes: Some(vec![node("b", ModuleType::Identity)]),
                ..CircuitPatch::default()
            },
        );
        let third = engine.create_version(circuit.id, None).expect("v3");
        assert_eq!(third.version, 3);
        assert_eq!(third.name, "Demo");

        let versions: Vec<u32> = engine
            .list_versions(circuit.id)
            .expect("list")
            .iter()
            .map(|version| version.version)
            .collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[test]
    fn restore_is_idempotent() {
        let (_dir, storage, engine) = setup();
        let circuit = create(&storage);
        edit(
            &storage,
            circuit.id,
            CircuitPatch {
                nodes: Some(vec![node("a", ModuleType::Transfer)]),
                ..CircuitPatch::default()
            },
        );
        engine.create_version(circuit.id, None).expect("v1");
        edit(
            &storage,
            circuit.id,
            CircuitPatch {
                nodes: Some(Vec::new()),
                ..CircuitPatch::default()
            },
        );

        let first = engine.restore_version(circuit.id, 1).expect("restore");
        let second = engine.restore_version(circuit.id, 1).expect("restore again");
        assert_eq!(first.name, second.name);
        assert_eq!(first.description, second.description);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.connections, second.connections);
        assert_eq!(first.current_version, second.current_version);
        assert_eq!(second.nodes.len(), 1);
    }

    #[test]
    fn missing_entities_are_not_found() {
        let (_dir, storage, engine) = setup();
        assert!(matches!(
            engine.create_version(404, None),
            Err(ComputeError::NotFound(Entity::Circuit))
        ));
        let circuit = create(&storage);
        assert!(matches!(
            engine.restore_version(circuit.id, 9),
            Err(ComputeError::NotFound(Entity::Version))
        ));
        assert!(matches!(
            engine.get_version(circuit.id, 1),
            Err(ComputeError::NotFound(Entity::Version))
        ));
    }

    #[test]
    fn lock_entries_are_released_after_use() {
        let (_dir, storage, _) = setup();
        let locks = CircuitLocks::default();
        let engine = VersionEngine::new(storage.clone(), locks.clone());

        for id in 1_000..1_050 {
            assert!(engine.create_version(id, None).is_err());
            assert!(engine.restore_version(id, 1).is_err());
        }
        assert_eq!(locks.tracked(), 0);

        let circuit = create(&storage);
        engine.create_version(circuit.id, None).expect("snapshot");
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn concurrent_snapshots_get_distinct_numbers() {
        let (_dir, storage, engine) = setup();
        let circuit = create(&storage);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || engine.create_version(circuit.id, None))
            })
            .collect();
        let mut numbers: Vec<u32> = workers
            .into_iter()
            .map(|worker| worker.join().expect("join").expect("snapshot").version)
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());

        let stored = storage
            .get_circuit(circuit.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.current_version, 8);
    }
}
