//! Domain models for the control plane.
//!
//! Tenants own instances; instances own at most one set of client
//! credentials; credentials carry an ordered list of secret versions.
//! The whole registry lives in a single [`snapshot::ControlPlaneSnapshot`].

pub mod audit;
pub mod enrollment;
pub mod instance;
pub mod reason;
pub mod scope;
pub mod snapshot;
pub mod tenant;
