//! Completeness check: report required associations that never resolved.

use crate::cancel::CancelToken;
use crate::graph::{GraphError, InstanceGraph};
use crate::record::UnresolvedReason;
use mmg_model::diag::{Collector, DiagnosticCode, DiagnosticResult, Issue};

impl InstanceGraph {
    /// Report every required association that is still unresolved, one
    /// UNRESOLVED_REQUIRED issue per pending edge.
    ///
    /// Read-only and idempotent: issues go into a per-call collector, the
    /// cumulative construction diagnostics are untouched, and repeated
    /// calls on unchanged state return equal results.
    pub fn check(&self, ctx: &CancelToken) -> Result<DiagnosticResult, GraphError> {
        if ctx.is_canceled() {
            return Err(GraphError::Canceled);
        }

        let inner = self.inner.read();
        let mut call = Collector::new();
        for pe in inner.pending.iter() {
            if !pe.required {
                continue;
            }
            let source = &inner.nodes[pe.source.0].payload;
            let message = match pe.reason {
                UnresolvedReason::Absent => {
                    format!("required association {} is absent", pe.relation)
                }
                UnresolvedReason::Empty => {
                    format!("required association {} is empty", pe.relation)
                }
                UnresolvedReason::TargetMissing => format!(
                    "required association {} references a missing {}",
                    pe.relation, pe.target_tag
                ),
            };
            let mut issue = Issue::error(DiagnosticCode::UnresolvedRequired, message)
                .with_detail("type", &source.type_tag)
                .with_detail("pk", &source.key_string)
                .with_detail("relation", &pe.relation)
                .with_detail("json_field", &pe.json_field)
                .with_detail("reason", pe.reason.as_str())
                .with_span(source.provenance.as_ref().and_then(|p| p.span));
            if pe.reason == UnresolvedReason::TargetMissing {
                issue = issue.with_detail("target_type", &pe.target_tag);
                if !pe.target_key.is_empty() {
                    issue = issue.with_detail("target_pk", &pe.target_key);
                }
            }
            call.push(issue);
        }
        tracing::trace!(unresolved = call.len(), "completeness check");
        Ok(call.into_result())
    }
}
