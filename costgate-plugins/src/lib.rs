pub mod analysis;

pub use analysis::query_complexity::{
    QueryComplexityError, QueryComplexityGate, QueryComplexityOptions, QueryComplexityPlugin,
    query_complexity,
};

use costgate_plugin::registry::PluginRegistry;
use std::sync::Arc;

/// Register all built-in plugins.
pub fn register_all(registry: &mut PluginRegistry) {
    // Query analysis plugins
    registry.register(Arc::new(analysis::query_complexity::QueryComplexityPlugin));
}
