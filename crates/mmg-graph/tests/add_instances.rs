use mmg_graph::cancel::CancelToken;
use mmg_graph::graph::{GraphError, GraphOptions, InstanceGraph};
use mmg_graph::key;
use mmg_model::diag::DiagnosticCode;
use mmg_model::instance::ValidatedInstance;
use mmg_model::schema::{Schema, TypeDef, TypeIdentity};
use std::sync::Arc;

fn app_schema() -> Arc<Schema> {
    let hr = Arc::new(Schema::new("hr").add_type(TypeDef::new("Company").with_primary_key(["name"])));
    Arc::new(
        Schema::new("app")
            .add_type(TypeDef::new("Person").with_primary_key(["id"]))
            .add_type(TypeDef::new("Company").with_primary_key(["name"]))
            .add_type(TypeDef::new("Ghost"))
            .add_type(TypeDef::new("Wheel").with_primary_key(["serial"]).as_part())
            .add_import("hr", hr),
    )
}

fn person(id: &str) -> ValidatedInstance {
    ValidatedInstance::new(TypeIdentity::new("app", "Person"), vec![id.into()])
}

#[test]
fn test_add_and_lookup() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let result = graph.add(&ctx, person("alice")).unwrap();
    assert!(result.ok());
    assert!(result.is_empty());

    let snap = graph.snapshot();
    assert_eq!(snap.type_tags(), ["Person"]);
    let key = key::format_key(&["alice".into()]);
    let node = snap.instance_by_key("Person", &key).unwrap();
    assert_eq!(node.type_tag(), "Person");
    assert_eq!(node.key_string(), r#"["alice"]"#);
}

#[test]
fn test_add_duplicate_pk() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    assert!(graph.add(&ctx, person("alice")).unwrap().ok());
    let second = graph.add(&ctx, person("alice")).unwrap();
    assert!(second.has_errors());
    let issue = &second.issues()[0];
    assert_eq!(issue.code, DiagnosticCode::DuplicatePk);
    assert_eq!(issue.detail("type"), Some("Person"));
    assert_eq!(issue.detail("pk"), Some(r#"["alice"]"#));

    let snap = graph.snapshot();
    assert_eq!(snap.instances_of("Person").len(), 1);
    assert_eq!(snap.duplicates().len(), 1);
    let dup = &snap.duplicates()[0];
    assert_eq!(dup.rejected().key_string(), dup.conflict().key_string());
    assert!(!Arc::ptr_eq(dup.rejected(), dup.conflict()));
}

#[test]
fn test_same_key_different_types_is_not_a_duplicate() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let shared = ValidatedInstance::new(TypeIdentity::new("app", "Person"), vec!["x".into()]);
    let other = ValidatedInstance::new(TypeIdentity::new("app", "Company"), vec!["x".into()]);
    assert!(graph.add(&ctx, shared).unwrap().ok());
    assert!(graph.add(&ctx, other).unwrap().ok());

    let snap = graph.snapshot();
    assert!(snap.duplicates().is_empty());
    assert_eq!(snap.instances_of("Person").len(), 1);
    assert_eq!(snap.instances_of("Company").len(), 1);
}

#[test]
fn test_unknown_type_is_a_diagnostic() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("app", "Unknown"), vec!["k".into()]);
    let result = graph.add(&ctx, instance).unwrap();
    assert!(result.has_errors());
    assert_eq!(result.issues()[0].code, DiagnosticCode::TypeNotFound);
    assert!(result.issues()[0].hints.is_empty());
    assert_eq!(graph.stats().instances, 0);
}

#[test]
fn test_unknown_qualified_type_gets_import_hint() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("hr", "Widget"), vec!["k".into()])
        .with_tag("hr.Widget");
    let result = graph.add(&ctx, instance).unwrap();
    assert_eq!(result.issues()[0].code, DiagnosticCode::TypeNotFound);
    assert_eq!(result.issues()[0].hints.len(), 1);
    assert!(result.issues()[0].hints[0].contains("direct import"));
}

#[test]
fn test_top_level_requires_primary_key() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("app", "Ghost"), vec![]);
    let result = graph.add(&ctx, instance).unwrap();
    assert_eq!(result.issues()[0].code, DiagnosticCode::MissingPk);
    assert_eq!(graph.stats().instances, 0);
}

#[test]
fn test_part_type_rejected_at_top_level() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("app", "Wheel"), vec!["w1".into()]);
    let result = graph.add(&ctx, instance).unwrap();
    assert_eq!(result.issues()[0].code, DiagnosticCode::InvalidComposition);
    assert!(result.issues()[0].message.contains("add_composed"));
    assert_eq!(graph.stats().instances, 0);
}

#[test]
fn test_foreign_schema_is_a_fault() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("other", "Person"), vec!["a".into()]);
    let err = graph.add(&ctx, instance).unwrap_err();
    assert!(matches!(err, GraphError::SchemaMismatch { .. }));
    assert_eq!(graph.stats().instances, 0);
    assert!(graph.diagnostics().is_empty());
}

#[test]
fn test_imported_schema_instance_is_accepted() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    let instance = ValidatedInstance::new(TypeIdentity::new("hr", "Company"), vec!["acme".into()]);
    assert!(graph.add(&ctx, instance).unwrap().ok());
    let snap = graph.snapshot();
    assert_eq!(snap.type_tags(), ["hr.Company"]);
    assert_eq!(snap.instances_of("hr.Company").len(), 1);
}

#[test]
fn test_canceled_token_is_a_fault() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();
    ctx.cancel();

    let err = graph.add(&ctx, person("alice")).unwrap_err();
    assert!(matches!(err, GraphError::Canceled));
    assert_eq!(graph.stats().instances, 0);
}

#[test]
fn test_per_call_diagnostics_stay_per_call() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();
    assert!(graph.add(&ctx, person("alice")).unwrap().has_errors());

    // A later successful add returns an empty per-call result even though
    // the cumulative collector is non-empty.
    let result = graph.add(&ctx, person("bob")).unwrap();
    assert!(result.is_empty());
    assert_eq!(graph.diagnostics().len(), 1);
    assert_eq!(graph.snapshot().diagnostics().len(), 1);
}

#[test]
fn test_issue_limit_bounds_cumulative_collector() {
    let graph = InstanceGraph::with_options(app_schema(), GraphOptions { issue_limit: 2 });
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();
    for _ in 0..3 {
        graph.add(&ctx, person("alice")).unwrap();
    }

    let diagnostics = graph.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics.dropped(), 1);
    // The store itself is not bounded by the limit.
    assert_eq!(graph.stats().duplicates, 3);
}

#[test]
fn test_stats_counters() {
    let graph = InstanceGraph::new(app_schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();
    graph.add(&ctx, person("bob")).unwrap();
    graph.add(&ctx, person("alice")).unwrap();

    let stats = graph.stats();
    assert_eq!(stats.types, 1);
    assert_eq!(stats.instances, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.edges, 0);
    assert_eq!(stats.pending, 0);
}
