//! Graph construction: the mutable store and its add operations.
//!
//! All mutation happens under a single writer lock; argument and
//! cancellation checks run before acquisition, so a fault never leaves
//! partial state behind. Data problems surface as diagnostics in the
//! per-call result, never as `Err` values.

use crate::cancel::CancelToken;
use crate::key;
use crate::node::{LiveNode, NodeId, NodePayload};
use crate::pending::{PendingEdge, PendingIndex};
use crate::record::UnresolvedReason;
use chrono::{DateTime, Utc};
use mmg_model::diag::{Collector, DiagnosticCode, DiagnosticResult, Issue};
use mmg_model::instance::{ComposedValue, PropertyMap, Span, ValidatedInstance};
use mmg_model::schema::{Schema, SchemaId, TypeDef, TypeIdentity};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Contract violations by the caller. Everything about the *data* is a
/// diagnostic, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The instance was validated under a schema that is neither the bound
    /// schema nor one of its transitive imports.
    #[error("instance schema {instance} is not {bound} or one of its imports")]
    SchemaMismatch { instance: SchemaId, bound: SchemaId },
    /// The cancellation token fired before the critical section.
    #[error("operation canceled")]
    Canceled,
}

/// Construction-time options.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Issues retained by the cumulative diagnostics collector, oldest
    /// first. 0 means unlimited.
    pub issue_limit: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { issue_limit: 100 }
    }
}

/// Counters over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Distinct types with at least one resident instance.
    pub types: usize,
    /// Resident top-level instances.
    pub instances: usize,
    pub edges: usize,
    pub pending: usize,
    pub duplicates: usize,
}

/// The in-memory instance graph, bound to one schema and its imports.
///
/// Writers ([`add`](InstanceGraph::add),
/// [`add_composed`](InstanceGraph::add_composed)) take the exclusive lock
/// for the full operation; readers (`check`, `snapshot`) share it. The
/// graph grows monotonically until dropped.
#[derive(Debug)]
pub struct InstanceGraph {
    pub(crate) schema: Arc<Schema>,
    created_at: DateTime<Utc>,
    pub(crate) inner: RwLock<GraphInner>,
}

#[derive(Debug)]
pub(crate) struct GraphInner {
    /// Arena holding every node, top-level and composed.
    pub nodes: Vec<LiveNode>,
    /// Resident top-level instances: type → key string → node.
    pub index: BTreeMap<TypeIdentity, BTreeMap<String, NodeId>>,
    pub edges: Vec<LiveEdge>,
    pub pending: PendingIndex,
    pub duplicates: Vec<LiveDuplicate>,
    /// Cumulative construction diagnostics.
    pub diagnostics: Collector,
}

#[derive(Debug)]
pub(crate) struct LiveEdge {
    pub relation: String,
    pub source: NodeId,
    pub target: NodeId,
    pub properties: Arc<PropertyMap>,
}

#[derive(Debug)]
pub(crate) struct LiveDuplicate {
    /// Childless, never resident, not in the arena.
    pub rejected: LiveNode,
    pub conflict: NodeId,
    pub issue: Issue,
}

impl GraphInner {
    fn alloc(&mut self, node: LiveNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn resident(&self, type_id: &TypeIdentity, key_string: &str) -> Option<NodeId> {
        self.index.get(type_id)?.get(key_string).copied()
    }
}

impl InstanceGraph {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_options(schema, GraphOptions::default())
    }

    pub fn with_options(schema: Arc<Schema>, options: GraphOptions) -> Self {
        Self {
            schema,
            created_at: Utc::now(),
            inner: RwLock::new(GraphInner {
                nodes: Vec::new(),
                index: BTreeMap::new(),
                edges: Vec::new(),
                pending: PendingIndex::default(),
                duplicates: Vec::new(),
                diagnostics: Collector::with_limit(options.issue_limit),
            }),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Frozen copy of the cumulative construction diagnostics.
    pub fn diagnostics(&self) -> DiagnosticResult {
        self.inner.read().diagnostics.result()
    }

    pub fn stats(&self) -> GraphStats {
        let inner = self.inner.read();
        GraphStats {
            types: inner.index.len(),
            instances: inner.index.values().map(BTreeMap::len).sum(),
            edges: inner.edges.len(),
            pending: inner.pending.len(),
            duplicates: inner.duplicates.len(),
        }
    }

    /// Add a validated top-level instance.
    ///
    /// Returns the diagnostics produced by this call; the same issues are
    /// accumulated into the cumulative collector. Faults short-circuit
    /// before any mutation.
    pub fn add(
        &self,
        ctx: &CancelToken,
        instance: ValidatedInstance,
    ) -> Result<DiagnosticResult, GraphError> {
        if ctx.is_canceled() {
            return Err(GraphError::Canceled);
        }
        self.check_membership(&instance.type_id)?;

        let mut call = Collector::new();
        let mut inner = self.inner.write();
        self.add_locked(&mut inner, instance, &mut call);
        inner.diagnostics.extend(call.issues().iter().cloned());
        drop(inner);
        Ok(call.into_result())
    }

    /// Attach a validated child under a resident parent's composition.
    ///
    /// `parent_tag` uses instance-tag form; `parent_key` is the canonical
    /// key string ([`key::format_key`]). Only top-level parents can be
    /// addressed; to build deeper trees, nest children inline in the
    /// streamed child's composed values.
    pub fn add_composed(
        &self,
        ctx: &CancelToken,
        parent_tag: &str,
        parent_key: &str,
        relation: &str,
        child: ValidatedInstance,
    ) -> Result<DiagnosticResult, GraphError> {
        if ctx.is_canceled() {
            return Err(GraphError::Canceled);
        }
        self.check_membership(&child.type_id)?;

        let mut call = Collector::new();
        let mut inner = self.inner.write();
        self.add_composed_locked(&mut inner, parent_tag, parent_key, relation, child, &mut call);
        inner.diagnostics.extend(call.issues().iter().cloned());
        drop(inner);
        Ok(call.into_result())
    }

    fn check_membership(&self, type_id: &TypeIdentity) -> Result<(), GraphError> {
        if self.schema.contains_schema(&type_id.schema) {
            Ok(())
        } else {
            Err(GraphError::SchemaMismatch {
                instance: type_id.schema.clone(),
                bound: self.schema.id().clone(),
            })
        }
    }

    fn add_locked(
        &self,
        inner: &mut GraphInner,
        instance: ValidatedInstance,
        call: &mut Collector,
    ) {
        let span = provenance_span(&instance);

        let Some(def) = self.schema.type_by_identity(&instance.type_id) else {
            let mut issue = Issue::error(
                DiagnosticCode::TypeNotFound,
                format!("unknown type {}", instance.type_tag),
            )
            .with_detail("type", &instance.type_tag)
            .with_detail("type_schema", instance.type_id.schema.as_str())
            .with_span(span);
            if instance.type_tag.contains('.') {
                issue = issue.with_hint(format!(
                    "{} is a qualified tag; the schema that declares it must be a direct import",
                    instance.type_tag
                ));
            }
            call.push(issue);
            return;
        };

        if !def.has_primary_key() {
            call.push(
                Issue::error(
                    DiagnosticCode::MissingPk,
                    format!(
                        "type {} has no primary key; top-level instances must be keyed",
                        instance.type_tag
                    ),
                )
                .with_detail("type", &instance.type_tag)
                .with_span(span),
            );
            return;
        }
        if def.is_part() {
            call.push(
                Issue::error(
                    DiagnosticCode::InvalidComposition,
                    format!(
                        "{} is a part type; parts must be added via add_composed",
                        instance.type_tag
                    ),
                )
                .with_detail("type", &instance.type_tag)
                .with_span(span),
            );
            return;
        }

        let tag = self.schema.tag_for(&instance.type_id);
        let key_string = key::format_key(&instance.key);
        let ValidatedInstance {
            type_id,
            key,
            properties,
            associations,
            compositions,
            provenance,
            ..
        } = instance;

        let payload = Arc::new(NodePayload {
            type_tag: tag.clone(),
            type_id: type_id.clone(),
            key,
            key_string: key_string.clone(),
            properties,
            provenance,
        });

        if let Some(conflict) = inner.resident(&type_id, &key_string) {
            let issue = Issue::error(
                DiagnosticCode::DuplicatePk,
                format!("duplicate primary key {key_string} for type {tag}"),
            )
            .with_detail("type", &tag)
            .with_detail("pk", &key_string)
            .with_span(span);
            tracing::debug!(type_tag = %tag, pk = %key_string, "duplicate primary key rejected");
            inner.duplicates.push(LiveDuplicate {
                rejected: LiveNode::childless(payload),
                conflict,
                issue: issue.clone(),
            });
            call.push(issue);
            return;
        }

        let id = inner.alloc(LiveNode::childless(payload));
        inner
            .index
            .entry(type_id.clone())
            .or_default()
            .insert(key_string.clone(), id);
        tracing::debug!(type_tag = %tag, pk = %key_string, "instance added");

        // Declared associations: resolve now or park as forward references.
        for assoc in &def.associations {
            let target_tag = self.schema.tag_for(&assoc.target);
            match associations.get(&assoc.name) {
                Some(entries) if !entries.is_empty() => {
                    for entry in entries {
                        let target_key = key::format_key(&entry.target_key);
                        if let Some(target) = inner.resident(&assoc.target, &target_key) {
                            tracing::trace!(
                                relation = %assoc.name,
                                target_tag = %target_tag,
                                target_pk = %target_key,
                                "association resolved"
                            );
                            inner.edges.push(LiveEdge {
                                relation: assoc.name.clone(),
                                source: id,
                                target,
                                properties: Arc::clone(&entry.properties),
                            });
                        } else {
                            tracing::trace!(
                                relation = %assoc.name,
                                target_tag = %target_tag,
                                target_pk = %target_key,
                                "forward reference recorded"
                            );
                            inner.pending.append(
                                assoc.target.clone(),
                                target_key.clone(),
                                PendingEdge {
                                    source: id,
                                    relation: assoc.name.clone(),
                                    json_field: assoc.json_field.clone(),
                                    target_tag: target_tag.clone(),
                                    target_key,
                                    properties: Arc::clone(&entry.properties),
                                    required: assoc.required(),
                                    reason: UnresolvedReason::TargetMissing,
                                },
                            );
                        }
                    }
                }
                Some(_) if assoc.required() => {
                    inner.pending.append(
                        assoc.target.clone(),
                        String::new(),
                        PendingEdge {
                            source: id,
                            relation: assoc.name.clone(),
                            json_field: assoc.json_field.clone(),
                            target_tag,
                            target_key: String::new(),
                            properties: Arc::new(PropertyMap::new()),
                            required: true,
                            reason: UnresolvedReason::Empty,
                        },
                    );
                }
                _ => {}
            }
        }

        // Required associations whose field never appeared.
        for assoc in def.required_associations() {
            if !associations.contains_key(&assoc.name) {
                inner.pending.append(
                    assoc.target.clone(),
                    String::new(),
                    PendingEdge {
                        source: id,
                        relation: assoc.name.clone(),
                        json_field: assoc.json_field.clone(),
                        target_tag: self.schema.tag_for(&assoc.target),
                        target_key: String::new(),
                        properties: Arc::new(PropertyMap::new()),
                        required: true,
                        reason: UnresolvedReason::Absent,
                    },
                );
            }
        }

        // Back-fill: everyone who was waiting for this instance.
        let drained = inner.pending.drain(&type_id, &key_string);
        for pe in drained {
            tracing::trace!(
                relation = %pe.relation,
                target_tag = %tag,
                target_pk = %key_string,
                "forward reference resolved"
            );
            inner.edges.push(LiveEdge {
                relation: pe.relation,
                source: pe.source,
                target: id,
                properties: pe.properties,
            });
        }

        self.extract_compositions(inner, id, Some(def), compositions, call);
    }

    /// Inline composition extraction: build child nodes for every composed
    /// value carried on the instance, recursively. Sibling uniqueness is
    /// the upstream validator's guarantee here; streamed attachment
    /// (`add_composed`) enforces it instead.
    fn extract_compositions(
        &self,
        inner: &mut GraphInner,
        parent: NodeId,
        parent_def: Option<&TypeDef>,
        compositions: BTreeMap<String, ComposedValue>,
        call: &mut Collector,
    ) {
        for (relation, value) in compositions {
            // Unknown relations default to many.
            let many = parent_def
                .and_then(|d| d.composition(&relation))
                .is_none_or(|c| c.many);
            let mut items = value.into_items();
            if !many && items.len() > 1 {
                let parent_tag = inner.nodes[parent.0].payload.type_tag.clone();
                call.push(
                    Issue::error(
                        DiagnosticCode::DuplicateComposedPk,
                        format!(
                            "composition {relation} admits a single child, got {}; keeping the first",
                            items.len()
                        ),
                    )
                    .with_detail("type", parent_tag)
                    .with_detail("relation", &relation),
                );
                items.truncate(1);
            }
            for item in items {
                let child = self.create_child_node(inner, item, call);
                inner.nodes[parent.0]
                    .children
                    .entry(relation.clone())
                    .or_default()
                    .push(child);
            }
        }
    }

    fn create_child_node(
        &self,
        inner: &mut GraphInner,
        instance: ValidatedInstance,
        call: &mut Collector,
    ) -> NodeId {
        let tag = self.schema.tag_for(&instance.type_id);
        let key_string = key::format_key(&instance.key);
        let ValidatedInstance {
            type_id,
            key,
            properties,
            compositions,
            provenance,
            ..
        } = instance;

        let def = self.schema.type_by_identity(&type_id);
        let payload = Arc::new(NodePayload {
            type_tag: tag,
            type_id,
            key,
            key_string,
            properties,
            provenance,
        });
        let id = inner.alloc(LiveNode::childless(payload));
        self.extract_compositions(inner, id, def, compositions, call);
        id
    }

    fn add_composed_locked(
        &self,
        inner: &mut GraphInner,
        parent_tag: &str,
        parent_key: &str,
        relation: &str,
        child: ValidatedInstance,
        call: &mut Collector,
    ) {
        let span = provenance_span(&child);

        let Some(parent_type) = self.schema.resolve_tag(parent_tag) else {
            call.push(
                Issue::error(
                    DiagnosticCode::TypeNotFound,
                    format!("unknown parent type {parent_tag}"),
                )
                .with_detail("type", parent_tag)
                .with_span(span),
            );
            return;
        };
        let Some(parent_id) = inner.resident(&parent_type, parent_key) else {
            call.push(
                Issue::error(
                    DiagnosticCode::ParentNotFound,
                    format!("no resident {parent_tag} with key {parent_key}"),
                )
                .with_detail("type", parent_tag)
                .with_detail("pk", parent_key)
                .with_span(span),
            );
            return;
        };
        // resolve_tag only returns identities whose type exists.
        let Some(parent_def) = self.schema.type_by_identity(&parent_type) else {
            return;
        };
        let Some(comp) = parent_def.composition(relation) else {
            call.push(
                Issue::error(
                    DiagnosticCode::InvalidComposition,
                    format!("type {parent_tag} declares no composition {relation}"),
                )
                .with_detail("type", parent_tag)
                .with_detail("relation", relation)
                .with_span(span),
            );
            return;
        };
        if child.type_id != comp.target {
            call.push(
                Issue::error(
                    DiagnosticCode::InvalidComposition,
                    format!("composed child type does not match the target of {relation}"),
                )
                .with_detail("relation", relation)
                .with_detail("expected", self.schema.tag_for(&comp.target))
                .with_detail("got", self.schema.tag_for(&child.type_id))
                .with_span(span),
            );
            return;
        }

        let child_key = key::format_key(&child.key);
        let child_has_pk = self
            .schema
            .type_by_identity(&comp.target)
            .is_some_and(TypeDef::has_primary_key);
        let conflict = {
            let siblings = inner.nodes[parent_id.0]
                .children
                .get(relation)
                .map_or(&[] as &[NodeId], Vec::as_slice);
            if !comp.many {
                siblings.first().copied()
            } else if child_has_pk {
                siblings
                    .iter()
                    .copied()
                    .find(|sib| inner.nodes[sib.0].payload.key_string == child_key)
            } else {
                // Key-less children have positional identity; always append.
                None
            }
        };

        if let Some(conflict) = conflict {
            let message = if comp.many {
                format!("duplicate composed primary key {child_key} under {relation}")
            } else {
                format!("composition {relation} admits a single child")
            };
            let issue = Issue::error(DiagnosticCode::DuplicateComposedPk, message)
                .with_detail("type", parent_tag)
                .with_detail("pk", &child_key)
                .with_detail("relation", relation)
                .with_span(span);
            tracing::debug!(
                type_tag = %parent_tag,
                relation = %relation,
                pk = %child_key,
                "composed child rejected"
            );
            let rejected_payload = Arc::new(NodePayload {
                type_tag: self.schema.tag_for(&child.type_id),
                type_id: child.type_id.clone(),
                key: child.key.clone(),
                key_string: child_key,
                properties: Arc::clone(&child.properties),
                provenance: child.provenance.clone(),
            });
            inner.duplicates.push(LiveDuplicate {
                rejected: LiveNode::childless(rejected_payload),
                conflict,
                issue: issue.clone(),
            });
            call.push(issue);
            return;
        }

        let child_id = self.create_child_node(inner, child, call);
        inner.nodes[parent_id.0]
            .children
            .entry(relation.to_string())
            .or_default()
            .push(child_id);
        tracing::debug!(
            type_tag = %parent_tag,
            pk = %parent_key,
            relation = %relation,
            "composed child attached"
        );
    }
}

fn provenance_span(instance: &ValidatedInstance) -> Option<Span> {
    instance.provenance.as_ref().and_then(|p| p.span)
}
