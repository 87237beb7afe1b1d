use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::fetcher::Fetcher;
use crate::types::SourceInfo;

/// A registered source: its id, display metadata and fetcher.
pub struct SourceDescriptor {
    pub id: String,
    pub display_name: String,
    pub icon: String,
    pub fetcher: Arc<dyn Fetcher>,
}

impl SourceDescriptor {
    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            route_name: self.id.clone(),
            name: self.display_name.clone(),
            icon: self.icon.clone(),
        }
    }
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Static map from source id to fetcher, built once at startup.
///
/// Registration order is preserved for enumeration. Aliases resolve to a
/// registered id and are never listed or fanned out on their own.
#[derive(Default)]
pub struct FetcherRegistry {
    sources: Vec<Arc<SourceDescriptor>>,
    index: HashMap<String, usize>,
    aliases: HashMap<String, String>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. A duplicate id (or an id already used as an alias)
    /// is a programming error and should abort startup.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        display_name: impl Into<String>,
        icon: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.index.contains_key(&id) || self.aliases.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.index.insert(id.clone(), self.sources.len());
        self.sources.push(Arc::new(SourceDescriptor {
            id,
            display_name: display_name.into(),
            icon: icon.into(),
            fetcher,
        }));
        Ok(())
    }

    /// Make `alias` resolve to the already-registered `target`.
    pub fn alias(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let alias = alias.into();
        let target = target.into();
        if self.index.contains_key(&alias) || self.aliases.contains_key(&alias) {
            return Err(RegistryError::Duplicate(alias));
        }
        if !self.index.contains_key(&target) {
            return Err(RegistryError::UnknownTarget { alias, target });
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    /// Canonical id for `id`, following aliases. `None` if unknown.
    pub fn resolve<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.index.contains_key(id) {
            return Some(id);
        }
        self.aliases.get(id).map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<Arc<SourceDescriptor>> {
        let canonical = self.resolve(id)?;
        self.index
            .get(canonical)
            .map(|&i| Arc::clone(&self.sources[i]))
    }

    /// Registered ids in registration order, aliases excluded.
    pub fn list_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources.iter().map(|s| s.info()).collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<SourceDescriptor>> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
