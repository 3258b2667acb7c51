//! Models consumed by the mmg instance graph.
//!
//! Provides the schema model ([`schema::Schema`], type definitions, import
//! registry), the validated-instance model ([`instance::ValidatedInstance`]),
//! and the diagnostics model ([`diag::Collector`], [`diag::Issue`]). The
//! validator and loaders that produce these values live upstream; the graph
//! consumes them without re-validating.

pub mod diag;
pub mod instance;
pub mod schema;
