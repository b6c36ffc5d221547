pub mod config;
pub mod document;
pub mod error;
pub mod response;
pub mod schema;
pub mod value;

pub use config::CostgateConfig;
pub use document::QueryDocument;
pub use error::CostgateError;
pub use response::{FormattedError, GraphQLError, GraphQLResponse};
pub use schema::Schema;
