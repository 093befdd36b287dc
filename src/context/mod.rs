//! Per-evaluation resolver inputs — parent value, arguments, execution context
//! and query metadata.
//!
//! The execution engine builds one [`ResolveParams`] per field evaluation and
//! hands it to the field's resolver. The caching layer reads `parent`, `args`
//! and `info.variables` to compile a key and passes the rest through untouched.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use serde_json::Value;

/// Type-erased execution context map — carries per-operation state (auth
/// principal, data loaders, tenant ids) to resolvers without the caching layer
/// knowing any of those types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        return Self {
            map: HashMap::new(),
        };
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Insert a value, builder style
    #[must_use]
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.insert(value);
        self
    }

    /// Get a value by type
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Remove a value by type
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Metadata about the field being evaluated and the enclosing operation.
#[derive(Debug, Clone, Default)]
pub struct QueryInfo {
    /// Name of the field being resolved.
    pub field_name: String,
    /// Name of the object type that declares the field.
    pub parent_type: String,
    /// Variable values of the operation, as a JSON object.
    pub variables: Value,
}

impl QueryInfo {
    pub fn new(parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            variables: Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }
}

/// The four inputs of one field evaluation.
#[derive(Debug, Clone)]
pub struct ResolveParams {
    /// Value produced by the parent field.
    pub parent: Value,
    /// Field arguments, as a JSON object.
    pub args: Value,
    /// Opaque execution context, shared across the operation.
    pub context: Arc<Extensions>,
    /// Field and operation metadata.
    pub info: QueryInfo,
}

impl ResolveParams {
    /// Creates params with empty arguments and an empty execution context.
    ///
    /// # Examples
    ///
    /// ```
    /// use fieldcache::context::{QueryInfo, ResolveParams};
    /// use serde_json::json;
    ///
    /// let info = QueryInfo::new("Product", "reviews");
    /// let params = ResolveParams::new(json!({"id": "12345"}), info).with_args(json!({"first": 5}));
    /// assert_eq!(params.args["first"], 5);
    /// assert_eq!(params.info.field_name, "reviews");
    /// ```
    pub fn new(parent: Value, info: QueryInfo) -> Self {
        Self {
            parent,
            args: Value::Object(Default::default()),
            context: Arc::new(Extensions::new()),
            info,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Arc<Extensions>) -> Self {
        self.context = context;
        self
    }

    /// The operation's variables.
    pub fn variables(&self) -> &Value {
        &self.info.variables
    }
}
