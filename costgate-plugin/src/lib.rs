pub mod pipeline;
pub mod plugin;
pub mod registry;

pub use pipeline::PluginPipeline;
pub use plugin::{Phase, Plugin, PluginInstance, PluginResult, RequestContext, ResolvedOperation};
pub use registry::PluginRegistry;
