pub mod complexity;
pub mod engine;
pub mod error;
pub mod estimator;

pub use complexity::{ComplexityOptions, ScoringTarget, get_complexity};
pub use engine::{ComplexityEngine, DefaultEngine, ScoringRequest};
pub use error::EstimateError;
pub use estimator::{
    ComplexityEstimator, Estimator, EstimatorArgs, FieldCost, FieldCostTable, directive_estimator,
    field_cost_estimator, simple_estimator,
};
