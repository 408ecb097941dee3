//! # Vault Resource Controller Library
//!
//! A Kubernetes controller that keeps a Vault server synchronized with
//! declarative resources: engine mounts, PKI hierarchies, audit devices,
//! ACL policies, auth roles, generated secrets, and database connections.
//!
//! The core is the generic reconciliation engine in [`vault`] (Resource
//! Contract + endpoints) and [`controller`] (lifecycle state machine,
//! scheduling predicates, rotation clock); each resource kind contributes
//! a thin reconciler module that plugs into it.

pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod vault;
