//! `triplebind-core` — object-to-graph mapping primitives.
//!
//! This crate contains the **pure mapping** layer: terms, schema
//! declarations, resource lifecycle state, identity, validation and
//! attribute reconciliation. Store access lives in `triplebind-infra`.

pub mod cache;
pub mod error;
pub mod mapping;
pub mod naming;
pub mod resource;
pub mod schema;
pub mod term;
pub mod validation;
pub mod value;

pub use cache::{CacheLookup, InstanceCache};
pub use error::{MapperError, MapperResult, StoreError};
pub use mapping::{map_attributes, EquivalentPredicates, MapOptions, MapTarget, Projection};
pub use naming::{IdGenerator, NameWith};
pub use resource::{AggregateValue, Resource, Unmapped, UnmappedValues};
pub use schema::{AttributeDef, Namespaces, Range, ResourceClass, Rule, ScalarKind, Schema};
pub use term::{Iri, Literal, Term, Triple};
pub use validation::{Enforce, ExistenceCheck, RuleEnforcer, ValidationErrors};
pub use value::{AttributeValue, Language, Value};
