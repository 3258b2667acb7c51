//! Schema model: type definitions, associations, compositions, and imports.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unique identifier of a schema within a federation of imports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SchemaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Names a type across the federation: (schema identifier, type name).
/// Equality is structural; two schemas may each declare a `Person`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TypeIdentity {
    pub schema: SchemaId,
    pub name: String,
}

impl TypeIdentity {
    pub fn new(schema: impl Into<SchemaId>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A declared association: a directed reference to a target type's
/// instances by primary key.
#[derive(Debug, Clone, Serialize)]
pub struct AssociationDef {
    pub name: String,
    /// Wire-level field name, lower-snake form.
    pub json_field: String,
    pub optional: bool,
    pub many: bool,
    pub target: TypeIdentity,
}

impl AssociationDef {
    pub fn new(name: impl Into<String>, target: TypeIdentity) -> Self {
        let name = name.into();
        let json_field = lower_snake(&name);
        Self {
            name,
            json_field,
            optional: false,
            many: false,
            target,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn with_json_field(mut self, field: impl Into<String>) -> Self {
        self.json_field = field.into();
        self
    }

    pub fn required(&self) -> bool {
        !self.optional
    }
}

/// A declared composition: parent-child ownership. The child's lifecycle
/// is subordinate to the parent's.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionDef {
    pub name: String,
    /// Wire-level field name, lower-snake form.
    pub json_field: String,
    pub optional: bool,
    pub many: bool,
    pub target: TypeIdentity,
}

impl CompositionDef {
    pub fn new(name: impl Into<String>, target: TypeIdentity) -> Self {
        let name = name.into();
        let json_field = lower_snake(&name);
        Self {
            name,
            json_field,
            optional: false,
            many: false,
            target,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }
}

/// A type definition within a schema.
#[derive(Debug, Clone, Serialize)]
pub struct TypeDef {
    pub name: String,
    /// Property names forming the primary key, in declaration order.
    /// Empty means the type has no primary key.
    pub primary_key: Vec<String>,
    /// Part types may only enter a graph as composed children.
    pub part: bool,
    pub is_abstract: bool,
    /// Declared property names.
    pub properties: Vec<String>,
    pub associations: Vec<AssociationDef>,
    pub compositions: Vec<CompositionDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: Vec::new(),
            part: false,
            is_abstract: false,
            properties: Vec::new(),
            associations: Vec::new(),
            compositions: Vec::new(),
        }
    }

    pub fn with_primary_key<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = props.into_iter().map(Into::into).collect();
        self
    }

    pub fn as_part(mut self) -> Self {
        self.part = true;
        self
    }

    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    pub fn with_association(mut self, association: AssociationDef) -> Self {
        self.associations.push(association);
        self
    }

    pub fn with_composition(mut self, composition: CompositionDef) -> Self {
        self.compositions.push(composition);
        self
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn is_part(&self) -> bool {
        self.part
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn composition(&self, name: &str) -> Option<&CompositionDef> {
        self.compositions.iter().find(|c| c.name == name)
    }

    /// Associations whose targets must resolve for the instance to be complete.
    pub fn required_associations(&self) -> impl Iterator<Item = &AssociationDef> {
        self.associations.iter().filter(|a| a.required())
    }
}

/// A schema: an identity, a set of type definitions, and an import
/// registry mapping aliases to other schemas.
#[derive(Debug, Clone)]
pub struct Schema {
    id: SchemaId,
    types: BTreeMap<String, TypeDef>,
    imports: BTreeMap<String, Arc<Schema>>,
}

impl Schema {
    pub fn new(id: impl Into<SchemaId>) -> Self {
        Self {
            id: id.into(),
            types: BTreeMap::new(),
            imports: BTreeMap::new(),
        }
    }

    pub fn add_type(mut self, def: TypeDef) -> Self {
        self.types.insert(def.name.clone(), def);
        self
    }

    pub fn add_import(mut self, alias: impl Into<String>, schema: Arc<Schema>) -> Self {
        self.imports.insert(alias.into(), schema);
        self
    }

    pub fn id(&self) -> &SchemaId {
        &self.id
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn import(&self, alias: &str) -> Option<&Arc<Schema>> {
        self.imports.get(alias)
    }

    pub fn imports(&self) -> impl Iterator<Item = (&str, &Arc<Schema>)> {
        self.imports.iter().map(|(alias, s)| (alias.as_str(), s))
    }

    /// Whether `id` names this schema or one of its transitive imports.
    pub fn contains_schema(&self, id: &SchemaId) -> bool {
        self.resolve_schema(id).is_some()
    }

    /// Resolve a schema identity to this schema or a transitive import.
    /// Imports form a DAG by construction, so the walk terminates.
    pub fn resolve_schema(&self, id: &SchemaId) -> Option<&Schema> {
        if &self.id == id {
            return Some(self);
        }
        self.imports
            .values()
            .find_map(|imported| imported.resolve_schema(id))
    }

    /// Resolve a type identity through the import registry.
    pub fn type_by_identity(&self, identity: &TypeIdentity) -> Option<&TypeDef> {
        self.resolve_schema(&identity.schema)?.type_def(&identity.name)
    }

    /// Instance-tag rendering of a type identity: unqualified for local
    /// types, `alias.Name` for directly imported ones. Identities only
    /// reachable transitively fall back to the stable `schema.Name` form.
    pub fn tag_for(&self, identity: &TypeIdentity) -> String {
        if identity.schema == self.id {
            return identity.name.clone();
        }
        for (alias, imported) in &self.imports {
            if *imported.id() == identity.schema {
                return format!("{alias}.{}", identity.name);
            }
        }
        identity.to_string()
    }

    /// Inverse of [`Schema::tag_for`]: unqualified tags match local types
    /// only; `alias.Name` resolves the alias through the import registry.
    /// Returns `None` when the tag does not name a known type.
    pub fn resolve_tag(&self, tag: &str) -> Option<TypeIdentity> {
        match tag.split_once('.') {
            None => self
                .types
                .contains_key(tag)
                .then(|| TypeIdentity::new(self.id.clone(), tag)),
            Some((alias, name)) => {
                let imported = self.imports.get(alias)?;
                imported.type_def(name)?;
                Some(TypeIdentity::new(imported.id().clone(), name))
            }
        }
    }
}

/// Normalize a relation or field name to lower-snake form.
pub fn lower_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hr_schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("hr").add_type(TypeDef::new("Company").with_primary_key(["name"])),
        )
    }

    #[test]
    fn test_tag_for_local_type() {
        let schema = Schema::new("app").add_type(TypeDef::new("Person").with_primary_key(["id"]));
        let ident = TypeIdentity::new("app", "Person");
        assert_eq!(schema.tag_for(&ident), "Person");
    }

    #[test]
    fn test_tag_for_imported_type() {
        let schema = Schema::new("app").add_import("hr", hr_schema());
        let ident = TypeIdentity::new("hr", "Company");
        assert_eq!(schema.tag_for(&ident), "hr.Company");
    }

    #[test]
    fn test_resolve_tag_round_trip() {
        let schema = Schema::new("app")
            .add_type(TypeDef::new("Person").with_primary_key(["id"]))
            .add_import("hr", hr_schema());

        let local = schema.resolve_tag("Person").unwrap();
        assert_eq!(local, TypeIdentity::new("app", "Person"));
        assert_eq!(schema.tag_for(&local), "Person");

        let imported = schema.resolve_tag("hr.Company").unwrap();
        assert_eq!(imported, TypeIdentity::new("hr", "Company"));
        assert_eq!(schema.tag_for(&imported), "hr.Company");
    }

    #[test]
    fn test_resolve_tag_unknown() {
        let schema = Schema::new("app");
        assert!(schema.resolve_tag("Person").is_none());
        assert!(schema.resolve_tag("hr.Company").is_none());
    }

    #[test]
    fn test_unqualified_tag_never_matches_import() {
        let schema = Schema::new("app").add_import("hr", hr_schema());
        assert!(schema.resolve_tag("Company").is_none());
    }

    #[test]
    fn test_contains_schema_transitive() {
        let base = hr_schema();
        let mid = Arc::new(Schema::new("mid").add_import("hr", base));
        let top = Schema::new("top").add_import("mid", mid);

        assert!(top.contains_schema(&SchemaId::new("top")));
        assert!(top.contains_schema(&SchemaId::new("mid")));
        assert!(top.contains_schema(&SchemaId::new("hr")));
        assert!(!top.contains_schema(&SchemaId::new("other")));
    }

    #[test]
    fn test_type_by_identity_transitive() {
        let base = hr_schema();
        let mid = Arc::new(Schema::new("mid").add_import("hr", base));
        let top = Schema::new("top").add_import("mid", mid);

        let def = top.type_by_identity(&TypeIdentity::new("hr", "Company"));
        assert_eq!(def.unwrap().name, "Company");
    }

    #[test]
    fn test_lower_snake() {
        assert_eq!(lower_snake("employer"), "employer");
        assert_eq!(lower_snake("WorksFor"), "works_for");
        assert_eq!(lower_snake("ownedBy"), "owned_by");
        assert_eq!(lower_snake("line-items"), "line_items");
    }

    #[test]
    fn test_required_associations() {
        let def = TypeDef::new("Person")
            .with_primary_key(["id"])
            .with_association(AssociationDef::new("employer", TypeIdentity::new("app", "Company")))
            .with_association(
                AssociationDef::new("mentor", TypeIdentity::new("app", "Person")).optional(),
            );

        let required: Vec<_> = def.required_associations().map(|a| a.name.as_str()).collect();
        assert_eq!(required, ["employer"]);
    }
}
