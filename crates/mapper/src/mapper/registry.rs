//! Mapper registry
//!
//! The lookup table relations use to find their target mappers by name.
//! Mappers keep only a weak handle to it, so dropping the registry does not
//! leak the mappers that point at each other.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::builder::MapperBuilder;
use super::{Mapper, MapperTable};
use crate::error::{ModelError, ModelResult};

#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: Arc<MapperTable>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self {
            mappers: Arc::new(DashMap::new()),
        }
    }

    /// Build a mapper bound to this registry and add it
    pub fn register(&self, mut builder: MapperBuilder) -> ModelResult<Mapper> {
        builder.registry = Arc::downgrade(&self.mappers);
        let mapper = builder.build()?;

        if self.mappers.contains_key(mapper.name()) {
            return Err(ModelError::Configuration(format!(
                "mapper '{}' is already registered",
                mapper.name()
            )));
        }

        debug!("Registered mapper '{}'", mapper.name());
        self.mappers
            .insert(mapper.name().to_string(), mapper.clone());
        Ok(mapper)
    }

    pub fn get(&self, name: &str) -> Option<Mapper> {
        self.mappers.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    /// Registered mapper names in alphabetical order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mappers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("mappers", &self.names())
            .finish()
    }
}
