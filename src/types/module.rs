use serde::{Deserialize, Serialize};

use super::ModuleType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
}

/// Palette entry offered by the circuit builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTemplate {
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub inputs: Vec<PortSchema>,
    pub outputs: Vec<PortSchema>,
}

struct TemplateSeed {
    id: &'static str,
    module_type: ModuleType,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    inputs: &'static [(&'static str, &'static str)],
    outputs: &'static [(&'static str, &'static str)],
}

const CATALOG: &[TemplateSeed] = &[
    TemplateSeed {
        id: "identity-verify",
        module_type: ModuleType::Identity,
        name: "Identity Verify",
        description: "Verify identity without revealing personal data",
        icon: "User",
        inputs: &[("credential", "bytes")],
        outputs: &[("verified", "bool")],
    },
    TemplateSeed {
        id: "identity-age",
        module_type: ModuleType::Identity,
        name: "Age Proof",
        description: "Prove age threshold without revealing actual age",
        icon: "User",
        inputs: &[("birthdate", "bytes"), ("threshold", "uint")],
        outputs: &[("above_threshold", "bool")],
    },
    TemplateSeed {
        id: "transfer-private",
        module_type: ModuleType::Transfer,
        name: "Private Transfer",
        description: "Transfer assets with hidden amounts and parties",
        icon: "ArrowRightLeft",
        inputs: &[
            ("sender", "address"),
            ("receiver", "address"),
            ("amount", "uint256"),
        ],
        outputs: &[("proof", "bytes")],
    },
    TemplateSeed {
        id: "transfer-batch",
        module_type: ModuleType::Transfer,
        name: "Batch Transfer",
        description: "Multiple private transfers in one proof",
        icon: "ArrowRightLeft",
        inputs: &[("transfers", "bytes[]")],
        outputs: &[("proof", "bytes")],
    },
    TemplateSeed {
        id: "storage-commit",
        module_type: ModuleType::Storage,
        name: "Data Commit",
        description: "Commit data with cryptographic hash",
        icon: "Database",
        inputs: &[("data", "bytes")],
        outputs: &[("commitment", "bytes32")],
    },
    TemplateSeed {
        id: "storage-retrieve",
        module_type: ModuleType::Storage,
        name: "Private Retrieve",
        description: "Retrieve data with ZK access proof",
        icon: "Database",
        inputs: &[("commitment", "bytes32"), ("proof", "bytes")],
        outputs: &[("data", "bytes")],
    },
    TemplateSeed {
        id: "ai-inference",
        module_type: ModuleType::AiInference,
        name: "Private ML Inference",
        description: "Run ML model on encrypted input",
        icon: "Brain",
        inputs: &[("model_id", "bytes32"), ("input", "bytes")],
        outputs: &[("result", "bytes"), ("proof", "bytes")],
    },
    TemplateSeed {
        id: "ai-classify",
        module_type: ModuleType::AiInference,
        name: "Private Classification",
        description: "Classify data without exposing model or input",
        icon: "Brain",
        inputs: &[("input", "bytes")],
        outputs: &[("class", "uint"), ("confidence", "uint")],
    },
    TemplateSeed {
        id: "validation-range",
        module_type: ModuleType::Validation,
        name: "Range Proof",
        description: "Prove value is within range without revealing it",
        icon: "CheckSquare",
        inputs: &[("value", "uint256"), ("min", "uint256"), ("max", "uint256")],
        outputs: &[("in_range", "bool")],
    },
    TemplateSeed {
        id: "validation-merkle",
        module_type: ModuleType::Validation,
        name: "Merkle Proof",
        description: "Prove membership in a set without revealing element",
        icon: "CheckSquare",
        inputs: &[("element", "bytes32"), ("root", "bytes32")],
        outputs: &[("is_member", "bool")],
    },
];

fn ports(seed: &[(&str, &str)]) -> Vec<PortSchema> {
    seed.iter()
        .map(|(name, port_type)| PortSchema {
            name: (*name).to_string(),
            port_type: (*port_type).to_string(),
        })
        .collect()
}

/// The fixed palette of module templates.
pub fn module_catalog() -> Vec<ModuleTemplate> {
    CATALOG
        .iter()
        .map(|seed| ModuleTemplate {
            id: seed.id.to_string(),
            module_type: seed.module_type,
            name: seed.name.to_string(),
            description: seed.description.to_string(),
            icon: seed.icon.to_string(),
            inputs: ports(seed.inputs),
            outputs: ports(seed.outputs),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique_and_cover_builtin_types() {
        let catalog = module_catalog();
        assert_eq!(catalog.len(), 10);
        let ids: HashSet<_> = catalog.iter().map(|template| template.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
        let types: HashSet<_> = catalog.iter().map(|template| template.module_type).collect();
        assert!(!types.contains(&ModuleType::Custom));
        assert_eq!(types.len(), 5);
    }
}
