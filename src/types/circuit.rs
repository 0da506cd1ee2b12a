use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ComputeError, ComputeResult};

/// Closed set of module kinds a node can be built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Identity,
    Transfer,
    Storage,
    AiInference,
    Validation,
    Custom,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Identity => "identity",
            ModuleType::Transfer => "transfer",
            ModuleType::Storage => "storage",
            ModuleType::AiInference => "ai_inference",
            ModuleType::Validation => "validation",
            ModuleType::Custom => "custom",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitNode {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitConnection {
    pub id: String,
    pub source_node_id: String,
    pub source_output: String,
    pub target_node_id: String,
    pub target_input: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<CircuitNode>,
    pub connections: Vec<CircuitConnection>,
    pub current_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a circuit creation request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCircuit {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<CircuitNode>,
    pub connections: Vec<CircuitConnection>,
}

impl NewCircuit {
    pub fn validate(&self) -> ComputeResult<()> {
        let mut details = Vec::new();
        if self.name.trim().is_empty() {
            details.push("name: must not be empty".to_string());
        }
        details.extend(graph_violations(&self.nodes, &self.connections));
        reject_if_any("Invalid circuit data", details)
    }
}

/// Partial update applied by `PATCH /api/circuits/:id`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Option<Vec<CircuitNode>>,
    #[serde(default)]
    pub connections: Option<Vec<CircuitConnection>>,
}

impl CircuitPatch {
    /// Applies the patch to `circuit`, validating the resulting graph as a whole.
    pub fn apply_to(self, circuit: &mut Circuit) -> ComputeResult<()> {
        let mut details = Vec::new();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                details.push("name: must not be empty".to_string());
            }
        }
        let nodes = self.nodes.as_ref().unwrap_or(&circuit.nodes);
        let connections = self.connections.as_ref().unwrap_or(&circuit.connections);
        details.extend(graph_violations(nodes, connections));
        reject_if_any("Invalid circuit data", details)?;

        if let Some(name) = self.name {
            circuit.name = name;
        }
        if let Some(description) = self.description {
            circuit.description = Some(description);
        }
        if let Some(nodes) = self.nodes {
            circuit.nodes = nodes;
        }
        if let Some(connections) = self.connections {
            circuit.connections = connections;
        }
        Ok(())
    }
}

/// Immutable snapshot of a circuit's editable fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitVersion {
    pub id: u64,
    pub circuit_id: u64,
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<CircuitNode>,
    pub connections: Vec<CircuitConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CircuitVersion {
    pub fn snapshot(
        id: u64,
        circuit: &Circuit,
        version: u32,
        changelog: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            circuit_id: circuit.id,
            version,
            name: circuit.name.clone(),
            description: circuit.description.clone(),
            nodes: circuit.nodes.clone(),
            connections: circuit.connections.clone(),
            changelog: Some(changelog),
            created_at,
        }
    }
}

fn graph_violations(nodes: &[CircuitNode], connections: &[CircuitConnection]) -> Vec<String> {
    let mut details = Vec::new();
    let mut node_ids = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        if !node_ids.insert(node.id.as_str()) {
            details.push(format!("nodes[{index}].id: duplicate node id `{}`", node.id));
        }
    }
    for (index, connection) in connections.iter().enumerate() {
        if !node_ids.contains(connection.source_node_id.as_str()) {
            details.push(format!(
                "connections[{index}].sourceNodeId: unknown node `{}`",
                connection.source_node_id
            ));
        }
        if !node_ids.contains(connection.target_node_id.as_str()) {
            details.push(format!(
                "connections[{index}].targetNodeId: unknown node `{}`",
                connection.target_node_id
            ));
        }
    }
    details
}

fn reject_if_any(message: &str, details: Vec<String>) -> ComputeResult<()> {
    if details.is_empty() {
        Ok(())
    } else {
        Err(ComputeError::validation(message, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> CircuitNode {
        CircuitNode {
            id: id.to_string(),
            module_type: ModuleType::Validation,
            name: format!("Node {id}"),
            position: Position::default(),
            config: Map::new(),
            inputs: vec!["value".into()],
            outputs: vec!["in_range".into()],
        }
    }

    fn connection(source: &str, target: &str) -> CircuitConnection {
        CircuitConnection {
            id: format!("{source}-{target}"),
            source_node_id: source.to_string(),
            source_output: "in_range".into(),
            target_node_id: target.to_string(),
            target_input: "value".into(),
        }
    }

    #[test]
    fn dangling_connection_is_rejected() {
        let draft = NewCircuit {
            name: "Demo".into(),
            description: None,
            nodes: vec![node("a")],
            connections: vec![connection("a", "missing")],
        };
        let err = draft.validate().expect_err("dangling target");
        match err {
            ComputeError::Validation { details, .. } => {
                assert_eq!(details.len(), 1);
                assert!(details[0].contains("targetNodeId"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let draft = NewCircuit {
            name: "Demo".into(),
            description: None,
            nodes: vec![node("a"), node("a")],
            connections: Vec::new(),
        };
        assert!(draft.validate().is_err());
    }

    #[test]
    fn patch_validates_against_existing_nodes() {
        let now = Utc::now();
        let mut circuit = Circuit {
            id: 1,
            name: "Demo".into(),
            description: None,
            nodes: vec![node("a"), node("b")],
            connections: Vec::new(),
            current_version: 1,
            created_at: now,
            updated_at: now,
        };

        let patch = CircuitPatch {
            connections: Some(vec![connection("a", "b")]),
            ..CircuitPatch::default()
        };
        patch.apply_to(&mut circuit).expect("valid patch");
        assert_eq!(circuit.connections.len(), 1);

        let shrink = CircuitPatch {
            nodes: Some(vec![node("a")]),
            ..CircuitPatch::default()
        };
        assert!(shrink.apply_to(&mut circuit).is_err());
        assert_eq!(circuit.nodes.len(), 2, "failed patch must not mutate");
    }

    #[test]
    fn node_json_uses_wire_names() {
        let json = serde_json::json!({
            "id": "n1",
            "type": "ai_inference",
            "name": "Private ML Inference",
            "position": { "x": 10.0, "y": 20.0 }
        });
        let node: CircuitNode = serde_json::from_value(json).expect("decode node");
        assert_eq!(node.module_type, ModuleType::AiInference);
        assert!(node.inputs.is_empty());
    }
}
