use std::collections::BTreeMap;
use std::sync::Arc;

use triplebind_core::validation::ExistenceCheck;
use triplebind_core::{Iri, ResourceClass, StoreError, Term, Triple, Unmapped};

/// Raw predicate data per subject, as returned by a load.
pub type LoadedSubjects = BTreeMap<Iri, Unmapped>;

/// Scoped attribute load for a set of subjects.
///
/// Only subjects with at least one triple in `graph` appear in the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub graph: Iri,
    pub ids: Vec<Iri>,
    /// Predicates to fetch. `None` fetches every predicate except `rdf:type`;
    /// an empty list only reports which subjects exist.
    pub predicates: Option<Vec<Iri>>,
}

/// Subjects of `rdf_type` in `graph` matching every `(predicate, object)`
/// filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectQuery {
    pub graph: Iri,
    pub rdf_type: Iri,
    pub filters: Vec<(Iri, Term)>,
}

/// Removes the anonymous sub-graphs hanging off `subject` through
/// `predicate`: every blank node reachable from it, transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedDelete {
    pub graph: Iri,
    pub subject: Iri,
    pub predicate: Iri,
}

/// Query/update client for a graph store.
///
/// Every call is a synchronous request/response. Failures are reported as
/// [`StoreError`] and are never retried by callers in this crate.
pub trait TripleStore: Send + Sync {
    /// Whether `(id rdf:type class)` holds in any graph.
    fn exists(&self, class: &ResourceClass, id: &Iri) -> Result<bool, StoreError>;

    fn load_attributes(&self, request: &LoadRequest) -> Result<LoadedSubjects, StoreError>;

    /// Subject ids matching a query, in a stable order.
    fn subjects(&self, query: &SubjectQuery) -> Result<Vec<Iri>, StoreError>;

    fn insert(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError>;

    fn delete(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError>;

    fn delete_nested(&self, request: &NestedDelete) -> Result<(), StoreError>;
}

impl<S> TripleStore for Arc<S>
where
    S: TripleStore + ?Sized,
{
    fn exists(&self, class: &ResourceClass, id: &Iri) -> Result<bool, StoreError> {
        (**self).exists(class, id)
    }

    fn load_attributes(&self, request: &LoadRequest) -> Result<LoadedSubjects, StoreError> {
        (**self).load_attributes(request)
    }

    fn subjects(&self, query: &SubjectQuery) -> Result<Vec<Iri>, StoreError> {
        (**self).subjects(query)
    }

    fn insert(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError> {
        (**self).insert(triples, graph)
    }

    fn delete(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError> {
        (**self).delete(triples, graph)
    }

    fn delete_nested(&self, request: &NestedDelete) -> Result<(), StoreError> {
        (**self).delete_nested(request)
    }
}

/// Adapts a [`TripleStore`] to the validation-time uniqueness probe.
pub struct StoreExistence<'a, S: ?Sized>(pub &'a S);

impl<S> ExistenceCheck for StoreExistence<'_, S>
where
    S: TripleStore + ?Sized,
{
    fn exists(&self, class: &ResourceClass, id: &Iri) -> Result<bool, StoreError> {
        self.0.exists(class, id)
    }
}
