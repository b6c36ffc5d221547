use costgate_core::document::Operation;
use costgate_core::{GraphQLError, GraphQLResponse, QueryDocument, Schema};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Request lifecycle phases, in the order a request passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Before the query is parsed
    RequestDidStart = 0,
    /// After parsing and operation selection, before execution
    DidResolveOperation = 1,
    /// Just before the response leaves the host
    WillSendResponse = 2,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::RequestDidStart => "request_did_start",
            Phase::DidResolveOperation => "did_resolve_operation",
            Phase::WillSendResponse => "will_send_response",
        }
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::RequestDidStart,
            Phase::DidResolveOperation,
            Phase::WillSendResponse,
        ]
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of running a plugin hook.
#[derive(Debug)]
pub enum PluginResult {
    /// Continue to the next plugin / phase
    Continue,

    /// Stop the request; the error is returned to the client and no
    /// resolver runs.
    Abort(GraphQLError),
}

/// Well-known keys in [`RequestContext::vars`].
pub mod vars {
    /// Estimated complexity of the request, set by the query-complexity gate.
    pub const COMPLEXITY: &str = "complexity";
}

/// Mutable per-request state passed through the pipeline.
pub struct RequestContext {
    pub request_id: String,

    // --- Request data ---
    pub query: String,
    /// Operation name as supplied by the client
    pub operation_name: Option<String>,
    pub variables: Map<String, Value>,

    // --- Plugin data ---
    /// Shared context between plugins (key-value store)
    pub vars: HashMap<String, Value>,

    // --- Timing ---
    pub request_start: std::time::Instant,
}

impl RequestContext {
    pub fn new(query: String, operation_name: Option<String>, variables: Map<String, Value>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            query,
            operation_name,
            variables,
            vars: HashMap::new(),
            request_start: std::time::Instant::now(),
        }
    }

    /// Get elapsed time since request start.
    pub fn elapsed_ms(&self) -> f64 {
        self.request_start.elapsed().as_secs_f64() * 1000.0
    }

    /// Set a context variable (shared between plugins).
    pub fn set_var(&mut self, key: String, value: Value) {
        self.vars.insert(key, value);
    }

    /// Get a context variable.
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }
}

/// What the host knows once an operation has been selected.
#[derive(Clone, Copy)]
pub struct ResolvedOperation<'a> {
    pub schema: &'a Schema,
    /// The full parsed document, fragments included.
    pub document: &'a QueryDocument,
    /// Operation name as supplied with the request; `None` when the client
    /// sent none.
    pub operation_name: Option<&'a str>,
    /// The operation that will execute.
    pub operation: &'a Operation,
}

/// Plugin factory. Validates configuration and produces instances.
pub trait Plugin: Send + Sync {
    /// Plugin name (must be unique)
    fn name(&self) -> &str;

    /// Plugin priority (higher = executed first within a phase)
    fn priority(&self) -> i32 {
        0
    }

    /// Which phases instances participate in
    fn phases(&self) -> &[Phase];

    /// Build an instance bound to `config`. Invalid configuration is an error.
    fn configure(&self, config: &Value) -> anyhow::Result<Box<dyn PluginInstance>>;
}

/// A configured plugin. Hooks default to no-ops.
pub trait PluginInstance: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn phases(&self) -> &[Phase] {
        Phase::all()
    }

    fn request_did_start(&self, _ctx: &mut RequestContext) -> PluginResult {
        PluginResult::Continue
    }

    fn did_resolve_operation(
        &self,
        _ctx: &mut RequestContext,
        _operation: &ResolvedOperation<'_>,
    ) -> PluginResult {
        PluginResult::Continue
    }

    /// Runs for every response, aborted ones included.
    fn will_send_response(&self, _ctx: &RequestContext, _response: &mut GraphQLResponse) {}
}
