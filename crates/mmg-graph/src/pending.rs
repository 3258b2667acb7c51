//! Forward-reference tracking: associations blocked on targets that have
//! not arrived, plus records for absent/empty required fields.

use crate::node::NodeId;
use crate::record::UnresolvedReason;
use mmg_model::instance::PropertyMap;
use mmg_model::schema::TypeIdentity;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An association whose target is not resident, or whose required field
/// was absent or empty.
#[derive(Debug, Clone)]
pub(crate) struct PendingEdge {
    pub source: NodeId,
    pub relation: String,
    pub json_field: String,
    pub target_tag: String,
    /// Canonical key string of the awaited target; empty for absent/empty
    /// records, which can never match a real arrival.
    pub target_key: String,
    pub properties: Arc<PropertyMap>,
    pub required: bool,
    pub reason: UnresolvedReason,
}

/// Pending edges keyed by (target type, target key string). Multiple
/// sources may await the same target; all are stored. Iteration order is
/// deterministic.
#[derive(Debug, Default)]
pub(crate) struct PendingIndex {
    entries: BTreeMap<(TypeIdentity, String), Vec<PendingEdge>>,
}

impl PendingIndex {
    pub fn append(&mut self, target: TypeIdentity, key: String, pending: PendingEdge) {
        self.entries.entry((target, key)).or_default().push(pending);
    }

    /// Remove and return every pending edge awaiting the given target.
    pub fn drain(&mut self, target: &TypeIdentity, key: &str) -> Vec<PendingEdge> {
        self.entries
            .remove(&(target.clone(), key.to_string()))
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEdge> {
        self.entries.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
