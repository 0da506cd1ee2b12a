mod chain;
mod circuit;
mod encrypted;
mod module;
mod proof;

pub use chain::{Blockchain, ChainHealth, ChainStatus};
pub use circuit::{
    Circuit, CircuitConnection, CircuitNode, CircuitPatch, CircuitVersion, ModuleType, NewCircuit,
    Position,
};
pub use encrypted::{ComputationProof, EncryptRequest, EncryptedData, DEFAULT_ALGORITHM};
pub use module::{module_catalog, ModuleTemplate, PortSchema};
pub use proof::{NewProof, Proof, ProofStatus, StatusUpdate};
