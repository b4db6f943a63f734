//! Provider registry and factory
//!
//! [`ProviderFactory`] maps provider-type tags to constructors. A
//! [`ProviderRegistry`] holds constructed providers by name, which is what
//! virtual providers resolve their children against.

pub mod factory;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::LlmError;
use crate::traits::Provider;

pub use factory::{ProviderConstructor, ProviderFactory, global_factory};

/// Constructed providers indexed by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    by_name: BTreeMap<String, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its display name, replacing any previous entry.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.register_as(provider.name(), provider);
    }

    pub fn register_as(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.by_name.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.by_name.get(name).cloned()
    }

    /// Look up `name`, failing with a configuration error when absent.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>, LlmError> {
        self.get(name).ok_or_else(|| {
            LlmError::configuration(format!("provider '{name}' is not in the registry"))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Provider>)> {
        self.by_name.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve the children of every virtual provider in the registry.
    pub fn resolve_virtual_providers(&self) -> Result<(), LlmError> {
        for (name, provider) in &self.by_name {
            if let Some(virtual_provider) = provider.as_virtual() {
                virtual_provider
                    .set_providers(self)
                    .map_err(|e| e.in_context(name, "set_providers"))?;
            }
        }
        Ok(())
    }
}
