//! Edge, duplicate, and unresolved records exposed on snapshots.

use crate::node::InstanceNode;
use mmg_model::diag::Issue;
use mmg_model::instance::PropertyMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A resolved association. Source and target are always resident nodes of
/// the snapshot the edge appears in; edges never dangle.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub(crate) relation: String,
    pub(crate) source: Arc<InstanceNode>,
    pub(crate) target: Arc<InstanceNode>,
    pub(crate) properties: Arc<PropertyMap>,
}

impl EdgeRecord {
    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn source(&self) -> &Arc<InstanceNode> {
        &self.source
    }

    pub fn target(&self) -> &Arc<InstanceNode> {
        &self.target
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

/// A rejected submission whose (type, key) collided with a resident node.
/// The rejected node never carries composed children; rejection happens
/// before extraction.
#[derive(Debug, Clone)]
pub struct DuplicateRecord {
    pub(crate) rejected: Arc<InstanceNode>,
    pub(crate) conflict: Arc<InstanceNode>,
    pub(crate) issue: Issue,
}

impl DuplicateRecord {
    /// The submission that lost the contest. Not resident.
    pub fn rejected(&self) -> &Arc<InstanceNode> {
        &self.rejected
    }

    /// The resident node it collided with.
    pub fn conflict(&self) -> &Arc<InstanceNode> {
        &self.conflict
    }

    pub fn issue(&self) -> &Issue {
        &self.issue
    }
}

/// Why a pending association is unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The association field did not appear at all.
    Absent,
    /// The association field appeared as an empty array.
    Empty,
    /// Targets were named but no resident instance matches.
    TargetMissing,
}

impl UnresolvedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnresolvedReason::Absent => "absent",
            UnresolvedReason::Empty => "empty",
            UnresolvedReason::TargetMissing => "target_missing",
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared association with no resolved target at snapshot time.
#[derive(Debug, Clone)]
pub struct UnresolvedRecord {
    pub(crate) source: Arc<InstanceNode>,
    pub(crate) relation: String,
    pub(crate) target_type_tag: String,
    /// Canonical key string of the missing target; empty for
    /// absent/empty-field records.
    pub(crate) target_key: String,
    pub(crate) required: bool,
    pub(crate) reason: UnresolvedReason,
}

impl UnresolvedRecord {
    pub fn source(&self) -> &Arc<InstanceNode> {
        &self.source
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn target_type_tag(&self) -> &str {
        &self.target_type_tag
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn reason(&self) -> UnresolvedReason {
        self.reason
    }
}
