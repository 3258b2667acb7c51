//! Diagnostics: issues, collectors, and frozen result views.
//!
//! Issues describe problems with the *data* being ingested; they are
//! ordinary values, never `Err` returns. Contract violations by the caller
//! are a separate error channel owned by the consumer of this model.

use crate::instance::Span;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic codes surfaced during graph construction and checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    TypeNotFound,
    MissingPk,
    DuplicatePk,
    InvalidComposition,
    ParentNotFound,
    DuplicateComposedPk,
    UnresolvedRequired,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::TypeNotFound => "TYPE_NOT_FOUND",
            DiagnosticCode::MissingPk => "MISSING_PK",
            DiagnosticCode::DuplicatePk => "DUPLICATE_PK",
            DiagnosticCode::InvalidComposition => "INVALID_COMPOSITION",
            DiagnosticCode::ParentNotFound => "PARENT_NOT_FOUND",
            DiagnosticCode::DuplicateComposedPk => "DUPLICATE_COMPOSED_PK",
            DiagnosticCode::UnresolvedRequired => "UNRESOLVED_REQUIRED",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional context attached to an issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedInfo {
    pub message: String,
    pub span: Option<Span>,
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    /// Structured key/value details (`type`, `pk`, `relation`, ...).
    pub details: BTreeMap<String, String>,
    pub span: Option<Span>,
    pub related: Vec<RelatedInfo>,
    pub hints: Vec<String>,
}

impl Issue {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            details: BTreeMap::new(),
            span: None,
            related: Vec::new(),
            hints: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<Option<Span>>) -> Self {
        self.span = span.into();
        self
    }

    pub fn with_related(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.related.push(RelatedInfo {
            message: message.into(),
            span,
        });
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

/// Accumulates issues, optionally bounded.
///
/// A non-zero limit keeps the oldest `limit` issues and counts the rest
/// as dropped; insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    issues: Vec<Issue>,
    limit: usize,
    dropped: usize,
}

impl Collector {
    /// Unbounded collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded collector; 0 means unlimited.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            issues: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    pub fn push(&mut self, issue: Issue) {
        if self.limit > 0 && self.issues.len() >= self.limit {
            self.dropped += 1;
            return;
        }
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues rejected because the limit was reached.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Frozen copy of the current state.
    pub fn result(&self) -> DiagnosticResult {
        DiagnosticResult {
            issues: self.issues.clone(),
            dropped: self.dropped,
        }
    }

    pub fn into_result(self) -> DiagnosticResult {
        DiagnosticResult {
            issues: self.issues,
            dropped: self.dropped,
        }
    }
}

/// Frozen view over collected issues.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiagnosticResult {
    issues: Vec<Issue>,
    dropped: usize,
}

impl DiagnosticResult {
    pub fn ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
