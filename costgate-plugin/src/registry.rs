use crate::plugin::{Plugin, PluginInstance};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Plugin registry.
///
/// Built once at startup, immutable thereafter.
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin factory.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();
        tracing::info!(plugin = %name, "Registered plugin");
        self.plugins.insert(name, plugin);
    }

    /// Get a plugin factory by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name)
    }

    /// Build an instance of the named plugin.
    pub fn configure(&self, name: &str, config: &Value) -> anyhow::Result<Arc<dyn PluginInstance>> {
        let plugin = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown plugin: {name}"))?;
        let instance = plugin.configure(config)?;
        Ok(Arc::from(instance))
    }

    /// List all registered plugin names.
    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
