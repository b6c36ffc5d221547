use crate::plugin::{Phase, PluginInstance, PluginResult, RequestContext, ResolvedOperation};
use costgate_core::GraphQLResponse;
use std::sync::Arc;

/// Pre-built plugin pipeline.
///
/// Instances are bucketed by the phases they declare and sorted by priority
/// (descending) at build time. Execution is a linear scan.
pub struct PluginPipeline {
    request_did_start: Vec<Arc<dyn PluginInstance>>,
    did_resolve_operation: Vec<Arc<dyn PluginInstance>>,
    will_send_response: Vec<Arc<dyn PluginInstance>>,
    len: usize,
}

impl PluginPipeline {
    /// Build a pipeline from a list of plugin instances.
    pub fn build(instances: Vec<Arc<dyn PluginInstance>>) -> Self {
        let mut request_did_start = Vec::new();
        let mut did_resolve_operation = Vec::new();
        let mut will_send_response = Vec::new();

        for inst in &instances {
            for phase in inst.phases() {
                match phase {
                    Phase::RequestDidStart => request_did_start.push(Arc::clone(inst)),
                    Phase::DidResolveOperation => did_resolve_operation.push(Arc::clone(inst)),
                    Phase::WillSendResponse => will_send_response.push(Arc::clone(inst)),
                }
            }
        }

        // Higher priority first
        let sort_fn = |a: &Arc<dyn PluginInstance>, b: &Arc<dyn PluginInstance>| {
            b.priority().cmp(&a.priority())
        };
        request_did_start.sort_by(sort_fn);
        did_resolve_operation.sort_by(sort_fn);
        will_send_response.sort_by(sort_fn);

        Self {
            request_did_start,
            did_resolve_operation,
            will_send_response,
            len: instances.len(),
        }
    }

    /// Run `request_did_start` hooks. Returns early on abort.
    pub fn request_did_start(&self, ctx: &mut RequestContext) -> PluginResult {
        for plugin in &self.request_did_start {
            if let PluginResult::Abort(err) = plugin.request_did_start(ctx) {
                tracing::debug!(plugin = %plugin.name(), phase = %Phase::RequestDidStart, "Plugin aborted request");
                return PluginResult::Abort(err);
            }
        }
        PluginResult::Continue
    }

    /// Run `did_resolve_operation` hooks. Returns early on abort.
    pub fn did_resolve_operation(
        &self,
        ctx: &mut RequestContext,
        operation: &ResolvedOperation<'_>,
    ) -> PluginResult {
        for plugin in &self.did_resolve_operation {
            if let PluginResult::Abort(err) = plugin.did_resolve_operation(ctx, operation) {
                tracing::debug!(plugin = %plugin.name(), phase = %Phase::DidResolveOperation, "Plugin aborted request");
                return PluginResult::Abort(err);
            }
        }
        PluginResult::Continue
    }

    /// Run every `will_send_response` hook.
    pub fn will_send_response(&self, ctx: &RequestContext, response: &mut GraphQLResponse) {
        for plugin in &self.will_send_response {
            plugin.will_send_response(ctx, response);
        }
    }

    /// Total number of plugin instances.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgate_core::GraphQLError;
    use serde_json::{Map, json};
    use std::sync::Mutex;

    fn make_ctx() -> RequestContext {
        RequestContext::new("{ a }".into(), None, Map::new())
    }

    /// Declares no phases, so joins all of them.
    struct TagPlugin;
    impl PluginInstance for TagPlugin {
        fn name(&self) -> &str { "tag" }
        fn will_send_response(&self, _ctx: &RequestContext, response: &mut GraphQLResponse) {
            response.extensions.insert("tagged".into(), json!(true));
        }
    }

    /// Implements `will_send_response` but only declares `RequestDidStart`.
    struct NarrowPlugin;
    impl PluginInstance for NarrowPlugin {
        fn name(&self) -> &str { "narrow" }
        fn phases(&self) -> &[Phase] { &[Phase::RequestDidStart] }
        fn will_send_response(&self, _ctx: &RequestContext, response: &mut GraphQLResponse) {
            response.extensions.insert("narrow".into(), json!(true));
        }
    }

    struct BlockPlugin { priority: i32 }
    impl PluginInstance for BlockPlugin {
        fn name(&self) -> &str { "block" }
        fn priority(&self) -> i32 { self.priority }
        fn phases(&self) -> &[Phase] { &[Phase::RequestDidStart] }
        fn request_did_start(&self, _ctx: &mut RequestContext) -> PluginResult {
            PluginResult::Abort(GraphQLError::new("blocked").with_code("BLOCKED"))
        }
    }

    struct MarkPlugin { priority: i32, seen: Arc<Mutex<Vec<i32>>> }
    impl PluginInstance for MarkPlugin {
        fn name(&self) -> &str { "mark" }
        fn priority(&self) -> i32 { self.priority }
        fn phases(&self) -> &[Phase] { &[Phase::RequestDidStart, Phase::WillSendResponse] }
        fn request_did_start(&self, ctx: &mut RequestContext) -> PluginResult {
            self.seen.lock().unwrap().push(self.priority);
            ctx.set_var(format!("mark-{}", self.priority), json!(true));
            PluginResult::Continue
        }
        fn will_send_response(&self, _ctx: &RequestContext, response: &mut GraphQLResponse) {
            response.extensions.insert("marked".into(), json!(self.priority));
        }
    }

    #[test]
    fn test_empty_pipeline_continue() {
        let pipeline = PluginPipeline::build(vec![]);
        let mut ctx = make_ctx();
        let result = pipeline.request_did_start(&mut ctx);
        assert!(matches!(result, PluginResult::Continue));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_default_phases_join_every_phase() {
        let plugin: Arc<dyn PluginInstance> = Arc::new(TagPlugin);
        let pipeline = PluginPipeline::build(vec![plugin]);
        assert_eq!(pipeline.len(), 1);

        let mut ctx = make_ctx();
        assert!(matches!(pipeline.request_did_start(&mut ctx), PluginResult::Continue));
        let mut response = GraphQLResponse::from_data(json!({"a": 1}));
        pipeline.will_send_response(&ctx, &mut response);
        assert_eq!(response.extensions["tagged"], json!(true));
    }

    #[test]
    fn test_block_plugin_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PluginPipeline::build(vec![
            Arc::new(MarkPlugin { priority: 1, seen: Arc::clone(&seen) }),
            Arc::new(BlockPlugin { priority: 10 }),
        ]);
        let mut ctx = make_ctx();
        match pipeline.request_did_start(&mut ctx) {
            PluginResult::Abort(err) => assert_eq!(err.code(), Some("BLOCKED")),
            PluginResult::Continue => panic!("Expected Abort from block plugin"),
        }
        // Lower priority plugin never ran
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_priority_order_descending() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PluginPipeline::build(vec![
            Arc::new(MarkPlugin { priority: 1, seen: Arc::clone(&seen) }),
            Arc::new(MarkPlugin { priority: 50, seen: Arc::clone(&seen) }),
            Arc::new(MarkPlugin { priority: 5, seen: Arc::clone(&seen) }),
        ]);
        let mut ctx = make_ctx();
        assert!(matches!(pipeline.request_did_start(&mut ctx), PluginResult::Continue));
        assert_eq!(*seen.lock().unwrap(), vec![50, 5, 1]);
        assert_eq!(ctx.get_var("mark-5"), Some(&json!(true)));
    }

    #[test]
    fn test_phases_limit_membership() {
        let pipeline = PluginPipeline::build(vec![Arc::new(NarrowPlugin)]);
        let ctx = make_ctx();
        let mut response = GraphQLResponse::from_data(json!({"a": 1}));
        pipeline.will_send_response(&ctx, &mut response);
        assert!(!response.extensions.contains_key("narrow"));
    }

    #[test]
    fn test_will_send_response_runs_all_lowest_last() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PluginPipeline::build(vec![
            Arc::new(MarkPlugin { priority: 1, seen: Arc::clone(&seen) }),
            Arc::new(MarkPlugin { priority: 9, seen: Arc::clone(&seen) }),
        ]);
        let ctx = make_ctx();
        let mut response = GraphQLResponse::from_data(json!({"a": 1}));
        pipeline.will_send_response(&ctx, &mut response);
        assert_eq!(response.extensions["marked"], json!(1));
    }
}
