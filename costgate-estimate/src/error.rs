use thiserror::Error;

/// Errors raised while computing a complexity score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Request variables do not satisfy the operation's definitions.
    #[error("{0}")]
    Variable(String),

    /// A field argument could not be coerced.
    #[error("{0}")]
    Argument(String),

    /// The cost directive on a schema field carries invalid arguments.
    #[error("{0}")]
    Directive(String),

    #[error(
        "No complexity could be calculated for field {type_name}.{field_name}. \
         At least one complexity estimator has to return a complexity score."
    )]
    NoEstimate {
        type_name: String,
        field_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_estimate_message_names_the_field() {
        let err = EstimateError::NoEstimate {
            type_name: "Query".into(),
            field_name: "a".into(),
        };
        assert_eq!(
            err.to_string(),
            "No complexity could be calculated for field Query.a. \
             At least one complexity estimator has to return a complexity score."
        );
    }

    #[test]
    fn message_errors_display_verbatim() {
        let err = EstimateError::Variable("Variable \"$n\" of required type \"Int!\" was not provided.".into());
        assert_eq!(err.to_string(), "Variable \"$n\" of required type \"Int!\" was not provided.");
        let err = EstimateError::Directive("Argument \"value\" has invalid value 1.5.".into());
        assert_eq!(err.to_string(), "Argument \"value\" has invalid value 1.5.");
    }
}
