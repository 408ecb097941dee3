//! # Vault Backend Layer
//!
//! Everything that talks to the Vault HTTP API: the session/login
//! exchange, the typed error taxonomy, the [`api::VaultApi`] seam, the
//! Resource Contract, and the per-family endpoints built on top of it.

pub mod api;
pub mod client;
pub mod contract;
pub mod duration;
pub mod endpoint;
pub mod error;
pub mod session;

pub use api::{Payload, VaultApi};
pub use client::HttpVaultClient;
pub use contract::{CollaboratorReader, ReconcileContext, VaultResource};
pub use error::VaultError;
pub use session::{establish, AuthStrategy, JwtSource, KubernetesJwtLogin, VaultConnection};
