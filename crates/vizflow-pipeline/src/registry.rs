//! Stage registry
//!
//! Provides [`StageRegistry`], a process-scoped map from type names to stage
//! factories. Build one at startup and pass it by reference to whatever
//! constructs pipelines; there is no global instance.

use crate::error::RegistryError;
use crate::stage::Stage;
use crate::stages::{Clip, ExtractBlocks, Group, PassThrough, SyntheticImage, TemporalShift};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a stage from JSON parameters
pub type StageFactory = Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Stage>, RegistryError> + Send + Sync>;

/// Registry of constructible stage types
#[derive(Default, Clone)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl StageRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with the built-in stages
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_params("synthetic_image", SyntheticImage::from_params);
        registry.register_params("pass_through", PassThrough::from_params);
        registry.register_params("clip", Clip::from_params);
        registry.register_params("temporal_shift", TemporalShift::from_params);
        registry.register_params("extract_blocks", ExtractBlocks::from_params);
        registry.register_params("group", |()| Ok(Group::new()));
        registry
    }

    /// Register a factory, replacing any previous one under `name`
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Stage>, RegistryError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a stage built from typed, `serde`-deserialized parameters
    ///
    /// A `null` parameter value deserializes as an empty object, so
    /// parameter structs with defaults can be created without arguments.
    pub fn register_params<P, S, F>(&mut self, name: &str, build: F)
    where
        P: DeserializeOwned,
        S: Stage,
        F: Fn(P) -> Result<S, String> + Send + Sync + 'static,
    {
        let type_name = name.to_string();
        self.register(name, move |value| {
            let invalid = |reason: String| RegistryError::InvalidParams {
                type_name: type_name.clone(),
                reason,
            };
            let value = if value.is_null() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                value.clone()
            };
            let params = serde_json::from_value::<P>(value.clone())
                .or_else(|err| {
                    // Unit parameters accept `{}` as well as `null`.
                    if value.as_object().is_some_and(serde_json::Map::is_empty) {
                        serde_json::from_value::<P>(serde_json::Value::Null)
                    } else {
                        Err(err)
                    }
                })
                .map_err(|err| invalid(err.to_string()))?;
            let stage = build(params).map_err(invalid)?;
            Ok(Box::new(stage) as Box<dyn Stage>)
        });
    }

    /// Check if a type is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Remove a type
    #[inline]
    pub fn remove(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    /// Registered type names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Get number of registered types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build a stage
    ///
    /// # Errors
    /// [`RegistryError::UnknownType`] for unregistered names, otherwise
    /// whatever the factory reports.
    pub fn create(&self, name: &str, params: &serde_json::Value) -> Result<Box<dyn Stage>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))?;
        factory(params)
    }
}
