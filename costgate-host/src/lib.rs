pub mod execution;
pub mod request;
pub mod resolver;
pub mod server;

pub use request::GraphQLRequest;
pub use resolver::{Resolver, RootField, StaticResolver};
pub use server::{ErrorFormatter, GraphQLServer, GraphQLServerBuilder};
