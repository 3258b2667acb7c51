use mmg_graph::cancel::CancelToken;
use mmg_graph::graph::{GraphError, InstanceGraph};
use mmg_model::diag::DiagnosticCode;
use mmg_model::instance::{EdgeData, Provenance, Span, ValidatedInstance};
use mmg_model::schema::{AssociationDef, Schema, TypeDef, TypeIdentity};
use std::sync::Arc;

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new("app")
            .add_type(
                TypeDef::new("Person")
                    .with_primary_key(["id"])
                    .with_association(AssociationDef::new(
                        "worksFor",
                        TypeIdentity::new("app", "Company"),
                    ))
                    .with_association(
                        AssociationDef::new("mentor", TypeIdentity::new("app", "Person"))
                            .optional(),
                    ),
            )
            .add_type(TypeDef::new("Company").with_primary_key(["name"])),
    )
}

fn person(id: &str) -> ValidatedInstance {
    ValidatedInstance::new(TypeIdentity::new("app", "Person"), vec![id.into()])
}

#[test]
fn test_absent_required_reported_once() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.len(), 1);
    let issue = &result.issues()[0];
    assert_eq!(issue.code, DiagnosticCode::UnresolvedRequired);
    assert_eq!(issue.detail("type"), Some("Person"));
    assert_eq!(issue.detail("pk"), Some(r#"["alice"]"#));
    assert_eq!(issue.detail("relation"), Some("worksFor"));
    assert_eq!(issue.detail("json_field"), Some("works_for"));
    assert_eq!(issue.detail("reason"), Some("absent"));
    assert_eq!(issue.detail("target_type"), None);
    assert_eq!(issue.detail("target_pk"), None);
}

#[test]
fn test_empty_required_reported_once() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph
        .add(&ctx, person("alice").with_association("worksFor", vec![]))
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.issues()[0].detail("reason"), Some("empty"));
}

#[test]
fn test_target_missing_carries_target_details() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph
        .add(
            &ctx,
            person("alice")
                .with_association("worksFor", vec![EdgeData::new(vec!["acme".into()])]),
        )
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.len(), 1);
    let issue = &result.issues()[0];
    assert_eq!(issue.detail("reason"), Some("target_missing"));
    assert_eq!(issue.detail("target_type"), Some("Company"));
    assert_eq!(issue.detail("target_pk"), Some(r#"["acme"]"#));
}

#[test]
fn test_one_issue_per_source_relation_target() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph
        .add(
            &ctx,
            person("alice").with_association(
                "worksFor",
                vec![
                    EdgeData::new(vec!["acme".into()]),
                    EdgeData::new(vec!["initech".into()]),
                ],
            ),
        )
        .unwrap();
    graph
        .add(
            &ctx,
            person("bob").with_association("worksFor", vec![EdgeData::new(vec!["acme".into()])]),
        )
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.len(), 3);
}

#[test]
fn test_optional_unresolved_is_not_reported() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();
    graph
        .add(
            &ctx,
            person("bob").with_association("mentor", vec![EdgeData::new(vec!["ghost".into()])]),
        )
        .unwrap();
    graph
        .add(
            &ctx,
            ValidatedInstance::new(TypeIdentity::new("app", "Company"), vec!["acme".into()]),
        )
        .unwrap();
    graph
        .add(
            &ctx,
            person("carol")
                .with_association("worksFor", vec![EdgeData::new(vec!["acme".into()])]),
        )
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    // alice and bob still miss worksFor; bob's dangling optional mentor is
    // not reported.
    assert_eq!(result.len(), 2);
    assert!(result
        .issues()
        .iter()
        .all(|i| i.detail("relation") == Some("worksFor")));
}

#[test]
fn test_check_is_idempotent() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();

    let first = graph.check(&ctx).unwrap();
    let second = graph.check(&ctx).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_check_never_touches_cumulative_diagnostics() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph.add(&ctx, person("alice")).unwrap();
    assert!(graph.diagnostics().is_empty());

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.len(), 1);
    assert!(graph.diagnostics().is_empty());
    assert!(graph.snapshot().diagnostics().is_empty());
}

#[test]
fn test_check_ok_when_everything_resolved() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    graph
        .add(
            &ctx,
            ValidatedInstance::new(TypeIdentity::new("app", "Company"), vec!["acme".into()]),
        )
        .unwrap();
    graph
        .add(
            &ctx,
            person("alice")
                .with_association("worksFor", vec![EdgeData::new(vec!["acme".into()])]),
        )
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    assert!(result.ok());
    assert!(result.is_empty());
}

#[test]
fn test_check_canceled_is_a_fault() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();
    ctx.cancel();

    assert!(matches!(graph.check(&ctx), Err(GraphError::Canceled)));
}

#[test]
fn test_check_attaches_source_span() {
    let graph = InstanceGraph::new(schema());
    let ctx = CancelToken::new();

    let span = Span::new(4, 2, 9, 1);
    graph
        .add(
            &ctx,
            person("alice")
                .with_provenance(Provenance::new("loader", "people.json").with_span(span)),
        )
        .unwrap();

    let result = graph.check(&ctx).unwrap();
    assert_eq!(result.issues()[0].span, Some(span));
}
