//! Visual zero-knowledge circuit workbench backend.
//!
//! Circuits are graphs of typed modules persisted in [`storage`], with
//! append-only snapshots managed by [`versioning`]. The [`simulator`] stands
//! in for encryption and proof verification; none of its output is
//! cryptographic. [`metrics`] and [`chains`] feed the dashboard, [`codegen`]
//! renders circuits as proving-system source text, and [`notifier`] fans
//! entity changes out to realtime viewers.
//!
//! [`service::ComputeService`] bundles these for the HTTP and WebSocket
//! surface in [`api`], configured through [`config::ComputeConfig`].

pub mod api;
pub mod chains;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod notifier;
pub mod service;
pub mod simulator;
pub mod storage;
pub mod types;
pub mod versioning;
