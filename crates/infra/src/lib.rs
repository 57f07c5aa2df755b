//! Infrastructure layer: store boundary, diffing, queries, persistence.

pub mod batch;
pub mod config;
pub mod query;
pub mod session;
pub mod store;
pub mod triples;

mod integration_tests;

pub use config::{ConfigError, MapperConfig};
pub use query::Query;
pub use session::{BringSpec, DeleteOptions, SaveOptions, Session};
pub use store::{InMemoryTripleStore, TripleStore};
pub use triples::{DefaultTripleBuilder, TripleBuilder};
