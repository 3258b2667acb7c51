//! Immutable snapshots of the live graph.
//!
//! A snapshot deep-clones the composition trees through a clone map, so
//! structural sharing is preserved and every reference in the snapshot —
//! edge endpoints, duplicate conflicts, unresolved sources, the key index —
//! points at the same clones. Immutable payloads are shared by reference;
//! post-snapshot mutation of the live graph cannot be observed.

use crate::graph::{GraphInner, GraphStats, InstanceGraph};
use crate::node::{InstanceNode, NodeId};
use crate::record::{DuplicateRecord, EdgeRecord, UnresolvedRecord};
use chrono::{DateTime, Utc};
use mmg_model::diag::DiagnosticResult;
use mmg_model::schema::Schema;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// An immutable, deterministically sorted view of the graph at a logical
/// point in time. Safe to hand across threads without further locking.
#[derive(Debug)]
pub struct Snapshot {
    schema: Arc<Schema>,
    taken_at: DateTime<Utc>,
    type_tags: Vec<String>,
    instances: BTreeMap<String, Vec<Arc<InstanceNode>>>,
    index: BTreeMap<String, BTreeMap<String, Arc<InstanceNode>>>,
    edges: Vec<EdgeRecord>,
    duplicates: Vec<DuplicateRecord>,
    unresolved: Vec<UnresolvedRecord>,
    diagnostics: DiagnosticResult,
    stats: GraphStats,
}

impl Snapshot {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Type tags with at least one resident instance, sorted.
    pub fn type_tags(&self) -> &[String] {
        &self.type_tags
    }

    /// Resident instances of a type, sorted by key string. Empty for
    /// unknown tags.
    pub fn instances_of(&self, tag: &str) -> &[Arc<InstanceNode>] {
        self.instances.get(tag).map_or(&[], Vec::as_slice)
    }

    /// Look up a resident instance by tag and canonical key string.
    pub fn instance_by_key(&self, tag: &str, key_string: &str) -> Option<&Arc<InstanceNode>> {
        self.index.get(tag)?.get(key_string)
    }

    /// Resolved edges, sorted by (source type, source key, relation,
    /// target type, target key).
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Rejected duplicate submissions, sorted by (type, key).
    pub fn duplicates(&self) -> &[DuplicateRecord] {
        &self.duplicates
    }

    /// Associations without a resolved target, sorted by (source type,
    /// source key, relation, target type, target key).
    pub fn unresolved(&self) -> &[UnresolvedRecord] {
        &self.unresolved
    }

    /// Frozen cumulative construction diagnostics.
    pub fn diagnostics(&self) -> &DiagnosticResult {
        &self.diagnostics
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }
}

impl InstanceGraph {
    /// Produce an immutable snapshot under the shared lock.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        let mut clones: HashMap<NodeId, Arc<InstanceNode>> = HashMap::new();

        let mut instances: BTreeMap<String, Vec<Arc<InstanceNode>>> = BTreeMap::new();
        let mut index: BTreeMap<String, BTreeMap<String, Arc<InstanceNode>>> = BTreeMap::new();
        for (type_id, by_key) in &inner.index {
            let tag = self.schema.tag_for(type_id);
            for (key_string, id) in by_key {
                let node = clone_node(&inner, *id, &mut clones);
                instances
                    .entry(tag.clone())
                    .or_default()
                    .push(Arc::clone(&node));
                index
                    .entry(tag.clone())
                    .or_default()
                    .insert(key_string.clone(), node);
            }
        }
        for nodes in instances.values_mut() {
            nodes.sort_by(|a, b| a.key_string().cmp(b.key_string()));
        }
        let type_tags: Vec<String> = instances.keys().cloned().collect();

        let mut edges: Vec<EdgeRecord> = inner
            .edges
            .iter()
            .map(|e| EdgeRecord {
                relation: e.relation.clone(),
                source: clone_node(&inner, e.source, &mut clones),
                target: clone_node(&inner, e.target, &mut clones),
                properties: Arc::clone(&e.properties),
            })
            .collect();
        edges.sort_by(edge_order);

        let mut duplicates: Vec<DuplicateRecord> = inner
            .duplicates
            .iter()
            .map(|d| DuplicateRecord {
                // Rejected nodes stay childless; detection precedes extraction.
                rejected: Arc::new(InstanceNode {
                    payload: Arc::clone(&d.rejected.payload),
                    children: BTreeMap::new(),
                }),
                conflict: clone_node(&inner, d.conflict, &mut clones),
                issue: d.issue.clone(),
            })
            .collect();
        duplicates.sort_by(|a, b| {
            (a.rejected.type_tag(), a.rejected.key_string())
                .cmp(&(b.rejected.type_tag(), b.rejected.key_string()))
        });

        let mut unresolved: Vec<UnresolvedRecord> = inner
            .pending
            .iter()
            .map(|pe| UnresolvedRecord {
                source: clone_node(&inner, pe.source, &mut clones),
                relation: pe.relation.clone(),
                target_type_tag: pe.target_tag.clone(),
                target_key: pe.target_key.clone(),
                required: pe.required,
                reason: pe.reason,
            })
            .collect();
        unresolved.sort_by(|a, b| {
            (
                a.source.type_tag(),
                a.source.key_string(),
                a.relation.as_str(),
                a.target_type_tag.as_str(),
                a.target_key.as_str(),
            )
                .cmp(&(
                    b.source.type_tag(),
                    b.source.key_string(),
                    b.relation.as_str(),
                    b.target_type_tag.as_str(),
                    b.target_key.as_str(),
                ))
        });

        let stats = GraphStats {
            types: inner.index.len(),
            instances: inner.index.values().map(BTreeMap::len).sum(),
            edges: edges.len(),
            pending: inner.pending.len(),
            duplicates: duplicates.len(),
        };
        tracing::debug!(
            instances = stats.instances,
            edges = stats.edges,
            pending = stats.pending,
            "snapshot taken"
        );

        Snapshot {
            schema: Arc::clone(&self.schema),
            taken_at: Utc::now(),
            type_tags,
            instances,
            index,
            edges,
            duplicates,
            unresolved,
            diagnostics: inner.diagnostics.result(),
            stats,
        }
    }
}

/// Clone a node and its composition subtree, reusing clones already made
/// for this snapshot so shared references stay shared.
fn clone_node(
    inner: &GraphInner,
    id: NodeId,
    clones: &mut HashMap<NodeId, Arc<InstanceNode>>,
) -> Arc<InstanceNode> {
    if let Some(existing) = clones.get(&id) {
        return Arc::clone(existing);
    }
    let live = &inner.nodes[id.0];
    let children: BTreeMap<String, Vec<Arc<InstanceNode>>> = live
        .children
        .iter()
        .map(|(relation, ids)| {
            (
                relation.clone(),
                ids.iter()
                    .map(|child| clone_node(inner, *child, clones))
                    .collect(),
            )
        })
        .collect();
    let node = Arc::new(InstanceNode {
        payload: Arc::clone(&live.payload),
        children,
    });
    clones.insert(id, Arc::clone(&node));
    node
}

fn edge_order(a: &EdgeRecord, b: &EdgeRecord) -> Ordering {
    (
        a.source.type_tag(),
        a.source.key_string(),
        a.relation.as_str(),
        a.target.type_tag(),
        a.target.key_string(),
    )
        .cmp(&(
            b.source.type_tag(),
            b.source.key_string(),
            b.relation.as_str(),
            b.target.type_tag(),
            b.target.key_string(),
        ))
}
