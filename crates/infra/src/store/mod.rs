//! Triple store boundary.
//!
//! This module defines the infrastructure-facing abstraction the mapper uses
//! to reach a graph store through query/update calls, without making any
//! assumptions about the protocol behind it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryTripleStore, StoreCall, StoreOp};
pub use r#trait::{LoadRequest, LoadedSubjects, NestedDelete, StoreExistence, SubjectQuery, TripleStore};
