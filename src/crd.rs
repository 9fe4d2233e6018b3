//! `ManagedCluster` CRD type definition.

pub mod spec;
pub mod status;

pub use spec::{ManagedCluster, Worker, WorkerKubernetes};
pub use status::OperationState;
