//! Types and resolvers the execution walks through.

use std::{fmt, sync::Arc};

use arcstr::ArcStr;
use derive_more::with_trait::Display;
use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::{executor::Executor, resolve::Resolved, value::Value};

/// Type of a field, as far as value completion cares.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum FieldType {
    /// Leaf value, passed through as is.
    #[display("Scalar")]
    Scalar,

    /// Object of the named [`ObjectType`], completed by executing the
    /// sub-selection against it.
    #[display("{_0}")]
    Object(ArcStr),

    /// List of the inner type.
    #[display("[{_0}]")]
    List(Box<FieldType>),

    /// Inner type that must not be null.
    #[display("{_0}!")]
    NonNull(Box<FieldType>),
}

impl FieldType {
    /// Object of the type named `name`.
    pub fn object(name: impl Into<ArcStr>) -> Self {
        Self::Object(name.into())
    }

    /// List of `of`.
    pub fn list(of: Self) -> Self {
        Self::List(Box::new(of))
    }

    /// Non-null `of`.
    pub fn non_null(of: Self) -> Self {
        Self::NonNull(Box::new(of))
    }

    /// Indicates whether a null in this position has to propagate to the
    /// parent.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

/// Produces the value of a field.
pub trait Resolver: Send + Sync + 'static {
    /// Resolves the field `executor` was created for.
    fn resolve(&self, executor: &Executor<'_>) -> Resolved<Value>;
}

impl<F> Resolver for F
where
    F: Fn(&Executor<'_>) -> Resolved<Value> + Send + Sync + 'static,
{
    fn resolve(&self, executor: &Executor<'_>) -> Resolved<Value> {
        self(executor)
    }
}

/// Field of an [`ObjectType`].
#[derive(Clone)]
pub struct FieldDefinition {
    name: ArcStr,
    field_type: FieldType,
    resolver: Option<Arc<dyn Resolver>>,
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl FieldDefinition {
    /// Defines the field `name` of type `field_type`.
    ///
    /// Without a resolver, the field reads the same-named property of the
    /// parent object value.
    pub fn new(name: impl Into<ArcStr>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            resolver: None,
        }
    }

    /// Resolves the field with `resolver`.
    #[must_use]
    pub fn resolver(mut self, resolver: impl Resolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Resolves the field with the closure `f`.
    #[must_use]
    pub fn resolve_with<F>(self, f: F) -> Self
    where
        F: Fn(&Executor<'_>) -> Resolved<Value> + Send + Sync + 'static,
    {
        self.resolver(f)
    }

    /// Name of this field.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Type of this field.
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Resolves this field for `executor`.
    pub fn resolve(&self, executor: &Executor<'_>) -> Resolved<Value> {
        match &self.resolver {
            Some(resolver) => resolver.resolve(executor),
            None => Resolved::ok(
                executor
                    .source()
                    .as_object_value()
                    .and_then(|o| o.get_field_value(&self.name))
                    .cloned()
                    .unwrap_or_default(),
            ),
        }
    }
}

/// Named type with fields.
#[derive(Clone, Debug)]
pub struct ObjectType {
    name: ArcStr,
    fields: IndexMap<ArcStr, FieldDefinition>,
}

impl ObjectType {
    /// Defines the type `name` without any fields.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Adds `field`, replacing a same-named one.
    #[must_use]
    pub fn field(mut self, field: FieldDefinition) -> Self {
        _ = self.fields.insert(field.name.clone(), field);
        self
    }

    /// Name of this type.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Looks up the field `name`.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Fields in definition order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }
}

/// Object types reachable from a query root.
#[derive(Clone, Debug)]
pub struct Schema {
    query_type: Arc<ObjectType>,
    types: FnvHashMap<ArcStr, Arc<ObjectType>>,
}

impl Schema {
    /// Creates a schema executing queries against `query`.
    pub fn new(query: ObjectType) -> Self {
        let query = Arc::new(query);
        let mut types = FnvHashMap::default();
        _ = types.insert(query.name.clone(), Arc::clone(&query));
        Self {
            query_type: query,
            types,
        }
    }

    /// Adds the object type `ty`.
    #[must_use]
    pub fn with_type(mut self, ty: ObjectType) -> Self {
        _ = self.types.insert(ty.name.clone(), Arc::new(ty));
        self
    }

    /// Root type of queries.
    pub fn query_type(&self) -> &Arc<ObjectType> {
        &self.query_type
    }

    /// Looks up the object type `name`.
    pub fn object_type(&self, name: &str) -> Option<&Arc<ObjectType>> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldDefinition, FieldType, ObjectType, Schema};

    #[test]
    fn renders_field_types() {
        let ty = FieldType::non_null(FieldType::list(FieldType::non_null(FieldType::object(
            "User",
        ))));

        assert_eq!(ty.to_string(), "[User!]!");
        assert!(ty.is_non_null());
        assert!(!FieldType::Scalar.is_non_null());
    }

    #[test]
    fn registers_query_type() {
        let schema = Schema::new(
            ObjectType::new("Query").field(FieldDefinition::new("version", FieldType::Scalar)),
        )
        .with_type(ObjectType::new("User"));

        assert_eq!(schema.query_type().name(), "Query");
        assert!(schema.object_type("Query").is_some());
        assert!(schema.object_type("User").is_some());
        assert!(schema.object_type("Post").is_none());
        assert_eq!(
            schema
                .query_type()
                .fields()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>(),
            ["version"],
        );
    }
}
