use thiserror::Error;

/// Unified error type for costgate.
#[derive(Error, Debug)]
pub enum CostgateError {
    #[error("{0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Syntax Error: {0}")]
    Parse(String),

}

impl CostgateError {
    /// Map to the GraphQL `extensions.code` reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CostgateError::Parse(_) => "GRAPHQL_PARSE_FAILED",
            CostgateError::Schema(_) => "GRAPHQL_VALIDATION_FAILED",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, CostgateError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_message_verbatim() {
        let err = CostgateError::Config("options is required".into());
        assert_eq!(err.to_string(), "options is required");
        assert!(err.is_config());
    }

    #[test]
    fn parse_error_maps_to_parse_failed_code() {
        let err = CostgateError::Parse("Unexpected `}`".into());
        assert_eq!(err.code(), "GRAPHQL_PARSE_FAILED");
        assert!(err.to_string().starts_with("Syntax Error:"));
    }

    #[test]
    fn schema_and_config_error_codes() {
        let err = CostgateError::Schema("Query root type must be provided.".into());
        assert_eq!(err.code(), "GRAPHQL_VALIDATION_FAILED");
        assert!(!err.is_config());
        assert_eq!(CostgateError::Config("bad".into()).code(), "INTERNAL_SERVER_ERROR");
    }
}
