//! Instance nodes.
//!
//! A node splits into an immutable payload (type identity, key,
//! properties, provenance) and a composition tree. The payload is shared
//! by reference between the live store and every snapshot clone; only the
//! composed-children map is deep-copied at snapshot time.

use mmg_model::instance::{CanonicalKey, KeyValue, PropertyMap, Provenance};
use mmg_model::schema::TypeIdentity;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle into the live node arena. Every referential link in the live
/// store (children, edges, pending, duplicate conflicts) goes through one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub usize);

/// The immutable half of a node.
#[derive(Debug)]
pub(crate) struct NodePayload {
    pub type_tag: String,
    pub type_id: TypeIdentity,
    pub key: CanonicalKey,
    pub key_string: String,
    pub properties: Arc<PropertyMap>,
    pub provenance: Option<Provenance>,
}

/// A node in the live (mutable) store. Children may be appended while the
/// owning graph holds its write lock; nothing else ever mutates.
#[derive(Debug)]
pub(crate) struct LiveNode {
    pub payload: Arc<NodePayload>,
    pub children: BTreeMap<String, Vec<NodeId>>,
}

impl LiveNode {
    pub fn childless(payload: Arc<NodePayload>) -> Self {
        Self {
            payload,
            children: BTreeMap::new(),
        }
    }
}

/// A node of a snapshot: frozen payload handle plus a frozen composition
/// tree. All reads are total; unknown relations yield empty slices.
#[derive(Debug)]
pub struct InstanceNode {
    pub(crate) payload: Arc<NodePayload>,
    pub(crate) children: BTreeMap<String, Vec<Arc<InstanceNode>>>,
}

impl InstanceNode {
    /// Instance-tag form: unqualified for local types, `alias.Name` for
    /// imported ones.
    pub fn type_tag(&self) -> &str {
        &self.payload.type_tag
    }

    pub fn type_identity(&self) -> &TypeIdentity {
        &self.payload.type_id
    }

    /// Primary-key components. Empty for key-less composed parts.
    pub fn key(&self) -> &[KeyValue] {
        &self.payload.key
    }

    /// Canonical key string, the form used for indexing and lookup.
    pub fn key_string(&self) -> &str {
        &self.payload.key_string
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.properties.get(name)
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.payload.properties
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.payload.provenance.as_ref()
    }

    /// Composed relation names present on this node, sorted.
    pub fn relation_names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }

    /// Children under a relation, in insertion order.
    pub fn composed(&self, relation: &str) -> &[Arc<InstanceNode>] {
        self.children.get(relation).map_or(&[], Vec::as_slice)
    }
}
