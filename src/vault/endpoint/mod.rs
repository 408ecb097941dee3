//! # Endpoints
//!
//! Backend access layers, one per resource family. The generic endpoint
//! carries the read-compare-write protocol; the specialized endpoints
//! compose it with the family's quirks (mount listings and accessors, the
//! PKI provisioning state machine, disable-then-enable audit updates).

pub mod audit;
pub mod engine;
pub mod generic;
pub mod pki;

pub use audit::{AuditEndpoint, AuditResource};
pub use engine::{EngineEndpoint, EngineResource};
pub use generic::{GenericEndpoint, WriteOutcome};
pub use pki::{PkiEndpoint, PkiProvisioningState, PkiResource};
