//! Dependency container for query-handle bindings
//!
//! Repositories resolve a fresh query handle for their model on every
//! terminal operation. By default that is `Query::for_model::<M>()`; an
//! application can override it by binding a factory under the model's
//! binding name, for instance to bake in a default scope.
//!
//! ```rust
//! use acton_repository::container::Container;
//! use acton_repository::model::Model;
//! use acton_repository::query::{Filterable, Query};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize)]
//! # struct Post { id: Option<i64> }
//! # impl Model for Post { const TABLE: &'static str = "posts"; }
//!
//! let mut container = Container::new();
//! container.bind_query::<Post>(|| Query::for_model::<Post>().where_eq("published", true));
//! assert!(container.has(&Container::binding_name::<Post>()));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::query::Query;

type Factory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Named factories producing type-erased values
#[derive(Clone, Default)]
pub struct Container {
    bindings: HashMap<String, Factory>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Container").field("bindings", &names).finish()
    }
}

impl Container {
    /// Empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding name of a model
    pub fn binding_name<M: Model>() -> String {
        std::any::type_name::<M>().to_string()
    }

    /// Bind a factory under a name, replacing any previous binding
    pub fn bind<T, F>(&mut self, name: impl Into<String>, factory: F)
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(binding = %name, "Registering container binding");
        self.bindings
            .insert(name, Arc::new(move || Box::new(factory()) as Box<dyn Any + Send>));
    }

    /// Bind the query handle factory for a model
    pub fn bind_query<M: Model>(&mut self, factory: impl Fn() -> Query + Send + Sync + 'static) {
        self.bind(Self::binding_name::<M>(), factory);
    }

    /// Whether a binding exists
    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Build the value bound under `name`
    pub fn make(&self, name: &str) -> Result<Box<dyn Any + Send>> {
        let factory = self
            .bindings
            .get(name)
            .ok_or_else(|| Error::BindingResolution(format!("Target [{}] is not bound", name)))?;
        Ok(factory())
    }

    /// Fresh query handle for a model
    ///
    /// Unbound models get `Query::for_model::<M>()`. A binding that builds
    /// anything other than a query for `M`'s table is an
    /// [`Error::EntityType`].
    pub fn resolve_query<M: Model>(&self) -> Result<Query> {
        let name = Self::binding_name::<M>();
        if !self.has(&name) {
            return Ok(Query::for_model::<M>());
        }
        let query = self
            .make(&name)?
            .downcast::<Query>()
            .map_err(|_| Error::EntityType(name.clone()))?;
        if query.table().table != M::TABLE {
            return Err(Error::EntityType(name));
        }
        Ok(*query)
    }
}
