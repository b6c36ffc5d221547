use crate::execution::{Executor, Nulled};
use crate::request::GraphQLRequest;
use crate::resolver::{Resolver, RootField, StaticResolver};
use costgate_core::document::{
    find_operation, fragments, operation_kind, parse_query, selection_set, variable_definitions,
};
use costgate_core::response::{PathSegment, codes};
use costgate_core::value::{argument_values, coerce_variable_values};
use costgate_core::{CostgateError, FormattedError, GraphQLError, GraphQLResponse, Schema};
use costgate_observability::{MetricsCollector, Outcome};
use costgate_plugin::pipeline::PluginPipeline;
use costgate_plugin::plugin::{PluginInstance, PluginResult, RequestContext, ResolvedOperation, vars};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Rewrites an error on its way to the client. Receives the formatted error
/// and the original, whose source can be recovered with `downcast_ref`.
pub type ErrorFormatter = dyn Fn(FormattedError, &GraphQLError) -> FormattedError + Send + Sync;

/// Result of running a request up to (not including) formatting.
struct Execution {
    data: Option<Value>,
    errors: Vec<GraphQLError>,
    outcome: Outcome,
}

impl Execution {
    fn failed(error: GraphQLError, outcome: Outcome) -> Self {
        Self {
            data: None,
            errors: vec![error],
            outcome,
        }
    }
}

/// A GraphQL request lifecycle host.
///
/// Shared read-only across requests; all per-request state lives in the
/// `RequestContext` created by [`GraphQLServer::execute_operation`].
pub struct GraphQLServer {
    schema: Arc<Schema>,
    pipeline: Arc<PluginPipeline>,
    resolver: Arc<dyn Resolver>,
    format_error: Option<Arc<ErrorFormatter>>,
    metrics: Arc<MetricsCollector>,
}

impl GraphQLServer {
    pub fn builder() -> GraphQLServerBuilder {
        GraphQLServerBuilder::default()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run one request through the full lifecycle.
    pub async fn execute_operation(&self, request: GraphQLRequest) -> GraphQLResponse {
        let mut ctx = RequestContext::new(request.query, request.operation_name, request.variables);
        let execution = self.process(&mut ctx).await;

        let mut response = GraphQLResponse {
            data: execution.data,
            errors: execution.errors.iter().map(|e| self.format(e)).collect(),
            extensions: Map::new(),
        };
        self.pipeline.will_send_response(&ctx, &mut response);

        let complexity = ctx.get_var(vars::COMPLEXITY).and_then(Value::as_f64);
        if let Some(score) = complexity {
            self.metrics.observe_complexity(score);
        }
        let elapsed_ms = ctx.elapsed_ms();
        self.metrics.record_request(execution.outcome, elapsed_ms / 1000.0);

        tracing::info!(
            request_id = %ctx.request_id,
            operation = ctx.operation_name.as_deref().unwrap_or(""),
            outcome = execution.outcome.as_str(),
            complexity = complexity.unwrap_or_default(),
            errors = response.errors.len(),
            elapsed_ms,
            "GraphQL request completed"
        );
        response
    }

    async fn process(&self, ctx: &mut RequestContext) -> Execution {
        if let PluginResult::Abort(err) = self.pipeline.request_did_start(ctx) {
            return Execution::failed(err, Outcome::Rejected);
        }

        let document = match parse_query(&ctx.query) {
            Ok(document) => document,
            Err(err) => {
                let error = GraphQLError::new(err.to_string())
                    .with_code(err.code())
                    .with_source(err);
                return Execution::failed(error, Outcome::Invalid);
            }
        };

        let operation_name = ctx.operation_name.clone();
        let operation = match find_operation(&document, operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(err) => {
                let error = GraphQLError::new(err.to_string())
                    .with_code(codes::OPERATION_RESOLUTION_FAILURE)
                    .with_source(err);
                return Execution::failed(error, Outcome::Invalid);
            }
        };

        let resolved = ResolvedOperation {
            schema: &self.schema,
            document: &document,
            operation_name: operation_name.as_deref(),
            operation,
        };
        if let PluginResult::Abort(err) = self.pipeline.did_resolve_operation(ctx, &resolved) {
            return Execution::failed(err, Outcome::Rejected);
        }

        let variables = match coerce_variable_values(&self.schema, variable_definitions(operation), &ctx.variables) {
            Ok(variables) => variables,
            Err(messages) => {
                return Execution {
                    data: None,
                    errors: messages
                        .into_iter()
                        .map(|m| GraphQLError::new(m).with_code(codes::BAD_USER_INPUT))
                        .collect(),
                    outcome: Outcome::Invalid,
                };
            }
        };

        let kind = operation_kind(operation);
        let Some(root) = self.schema.root_type(kind) else {
            let error = GraphQLError::new(format!("Schema is not configured to execute {kind} operation."))
                .with_code(codes::GRAPHQL_VALIDATION_FAILED);
            return Execution::failed(error, Outcome::Invalid);
        };

        let mut executor = Executor::new(&self.schema, fragments(&document), &variables);
        let grouped = executor.collect_fields(root, selection_set(operation));
        let mut data = Map::new();
        let mut nulled = false;

        // Root fields resolve one at a time, in document order.
        for (key, fields) in &grouped {
            let field = fields[0];
            if field.name == "__typename" {
                data.insert(key.clone(), Value::String(root.name.clone()));
                continue;
            }
            let Some(def) = root.field(&field.name) else {
                continue;
            };
            let mut path = vec![PathSegment::Field(key.clone())];
            let label = format!("{}.{}", root.name, def.name);

            let arguments = match argument_values(&self.schema, def, &field.arguments, executor.variables()) {
                Ok(arguments) => Some(arguments),
                Err(message) => {
                    executor.push_error(
                        GraphQLError::new(message)
                            .with_code(codes::BAD_USER_INPUT)
                            .with_path(path.clone()),
                    );
                    None
                }
            };

            let completed = match arguments {
                None => Err(Nulled),
                Some(arguments) => {
                    let root_field = RootField {
                        operation: kind,
                        parent_type: &root.name,
                        field_name: &def.name,
                        response_key: key,
                        arguments: &arguments,
                    };
                    match self.resolver.resolve(&root_field).await {
                        Ok(value) => executor.complete(&def.ty, fields, &value, &mut path, &label),
                        Err(err) => {
                            executor.push_error(resolver_error(err).with_path(path.clone()));
                            Err(Nulled)
                        }
                    }
                }
            };

            match completed {
                Ok(value) => {
                    data.insert(key.clone(), value);
                }
                Err(_) if !def.ty.is_non_null() => {
                    data.insert(key.clone(), Value::Null);
                }
                Err(_) => {
                    nulled = true;
                    break;
                }
            }
        }

        let errors = executor.into_errors();
        let outcome = if errors.is_empty() { Outcome::Success } else { Outcome::Partial };
        Execution {
            data: Some(if nulled { Value::Null } else { Value::Object(data) }),
            errors,
            outcome,
        }
    }

    fn format(&self, error: &GraphQLError) -> FormattedError {
        let mut formatted = error.to_formatted();
        if formatted.code().is_none() {
            formatted
                .extensions
                .insert("code".into(), Value::from(codes::INTERNAL_SERVER_ERROR));
        }
        match &self.format_error {
            Some(format_error) => format_error(formatted, error),
            None => formatted,
        }
    }
}

fn resolver_error(err: anyhow::Error) -> GraphQLError {
    match err.downcast::<GraphQLError>() {
        Ok(error) => error,
        Err(other) => GraphQLError::new(other.to_string())
            .with_code(codes::INTERNAL_SERVER_ERROR)
            .with_boxed_source(other.into()),
    }
}

// ── Builder ───────────────────────────────────────────────────

#[derive(Default)]
pub struct GraphQLServerBuilder {
    schema: Option<Arc<Schema>>,
    plugins: Vec<Arc<dyn PluginInstance>>,
    resolver: Option<Arc<dyn Resolver>>,
    format_error: Option<Arc<ErrorFormatter>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl GraphQLServerBuilder {
    pub fn schema(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn PluginInstance>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Arc<dyn PluginInstance>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn format_error<F>(mut self, format_error: F) -> Self
    where
        F: Fn(FormattedError, &GraphQLError) -> FormattedError + Send + Sync + 'static,
    {
        self.format_error = Some(Arc::new(format_error));
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<GraphQLServer, CostgateError> {
        let schema = self
            .schema
            .ok_or_else(|| CostgateError::Config("a schema is required".into()))?;
        let pipeline = PluginPipeline::build(self.plugins);
        tracing::debug!(plugins = pipeline.len(), types = schema.len(), "Building GraphQL server");
        Ok(GraphQLServer {
            schema,
            pipeline: Arc::new(pipeline),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(StaticResolver::default())),
            format_error: self.format_error,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(MetricsCollector::disabled())),
        })
    }
}
