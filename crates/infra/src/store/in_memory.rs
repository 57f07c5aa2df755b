use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use triplebind_core::term::vocab;
use triplebind_core::{Iri, ResourceClass, StoreError, Term, Triple, Unmapped};

use super::r#trait::{LoadRequest, LoadedSubjects, NestedDelete, SubjectQuery, TripleStore};

/// Store operation kinds, used for fault injection and journal filtering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Load,
    Subjects,
    Insert,
    Delete,
    DeleteNested,
}

/// One recorded round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists { id: Iri },
    Load { graph: Iri, ids: Vec<Iri>, predicates: Option<Vec<Iri>> },
    Subjects { graph: Iri },
    Insert { graph: Iri, triples: usize },
    Delete { graph: Iri, triples: usize },
    DeleteNested { graph: Iri, subject: Iri, predicate: Iri },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Exists { .. } => StoreOp::Exists,
            StoreCall::Load { .. } => StoreOp::Load,
            StoreCall::Subjects { .. } => StoreOp::Subjects,
            StoreCall::Insert { .. } => StoreOp::Insert,
            StoreCall::Delete { .. } => StoreOp::Delete,
            StoreCall::DeleteNested { .. } => StoreOp::DeleteNested,
        }
    }
}

/// In-memory quad store.
///
/// Intended for tests/dev. Every call is journaled (including failed ones),
/// and a single failure per operation kind can be armed with
/// [`InMemoryTripleStore::fail_next`].
#[derive(Debug, Default)]
pub struct InMemoryTripleStore {
    graphs: RwLock<HashMap<Iri, BTreeSet<Triple>>>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<HashMap<StoreOp, StoreError>>,
}

impl InMemoryTripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add triples directly, bypassing the journal.
    pub fn seed(&self, graph: &Iri, triples: impl IntoIterator<Item = Triple>) -> Result<(), StoreError> {
        let mut graphs = self.graphs.write().map_err(|_| StoreError::LockPoisoned)?;
        graphs.entry(graph.clone()).or_default().extend(triples);
        Ok(())
    }

    pub fn triples(&self, graph: &Iri) -> Result<Vec<Triple>, StoreError> {
        let graphs = self.graphs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(graphs
            .get(graph)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn contains(&self, graph: &Iri, triple: &Triple) -> Result<bool, StoreError> {
        let graphs = self.graphs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(graphs.get(graph).is_some_and(|set| set.contains(triple)))
    }

    /// Arm a one-shot failure for the next call of kind `op`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| StoreError::LockPoisoned)?;
        faults.insert(op, error);
        Ok(())
    }

    pub fn calls(&self) -> Result<Vec<StoreCall>, StoreError> {
        let calls = self.calls.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(calls.clone())
    }

    pub fn call_count(&self) -> Result<usize, StoreError> {
        Ok(self.calls()?.len())
    }

    pub fn count_of(&self, op: StoreOp) -> Result<usize, StoreError> {
        Ok(self.calls()?.iter().filter(|c| c.op() == op).count())
    }

    pub fn clear_calls(&self) -> Result<(), StoreError> {
        let mut calls = self.calls.lock().map_err(|_| StoreError::LockPoisoned)?;
        calls.clear();
        Ok(())
    }

    fn record(&self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op();
        self.calls.lock().map_err(|_| StoreError::LockPoisoned)?.push(call);
        let mut faults = self.faults.lock().map_err(|_| StoreError::LockPoisoned)?;
        match faults.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn blank_closure(triples: &BTreeSet<Triple>, roots: Vec<Term>) -> BTreeSet<Term> {
        let mut seen = BTreeSet::new();
        let mut pending = roots;
        while let Some(node) = pending.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            pending.extend(
                triples
                    .iter()
                    .filter(|t| t.subject == node && matches!(t.object, Term::Blank(_)))
                    .map(|t| t.object.clone()),
            );
        }
        seen
    }
}

impl TripleStore for InMemoryTripleStore {
    fn exists(&self, class: &ResourceClass, id: &Iri) -> Result<bool, StoreError> {
        self.record(StoreCall::Exists { id: id.clone() })?;
        let probe = Triple::new(id.clone(), Iri::new(vocab::RDF_TYPE), class.rdf_type().clone());
        let graphs = self.graphs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(graphs.values().any(|set| set.contains(&probe)))
    }

    fn load_attributes(&self, request: &LoadRequest) -> Result<LoadedSubjects, StoreError> {
        self.record(StoreCall::Load {
            graph: request.graph.clone(),
            ids: request.ids.clone(),
            predicates: request.predicates.clone(),
        })?;

        let graphs = self.graphs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut out = LoadedSubjects::new();
        let Some(triples) = graphs.get(&request.graph) else {
            return Ok(out);
        };

        for id in &request.ids {
            let subject = Term::Iri(id.clone());
            let mut found = false;
            let mut raw = Unmapped::new();
            for t in triples.iter().filter(|t| t.subject == subject) {
                found = true;
                let wanted = match &request.predicates {
                    None => t.predicate.as_str() != vocab::RDF_TYPE,
                    Some(predicates) => predicates.contains(&t.predicate),
                };
                if wanted {
                    raw.entry(t.predicate.clone()).or_default().push(t.object.clone());
                }
            }
            if found {
                out.insert(id.clone(), raw);
            }
        }
        Ok(out)
    }

    fn subjects(&self, query: &SubjectQuery) -> Result<Vec<Iri>, StoreError> {
        self.record(StoreCall::Subjects {
            graph: query.graph.clone(),
        })?;

        let graphs = self.graphs.read().map_err(|_| StoreError::LockPoisoned)?;
        let Some(triples) = graphs.get(&query.graph) else {
            return Ok(Vec::new());
        };
        let rdf_type = Iri::new(vocab::RDF_TYPE);
        let type_term = Term::Iri(query.rdf_type.clone());

        Ok(triples
            .iter()
            .filter(|t| t.predicate == rdf_type && t.object == type_term)
            .filter_map(|t| match &t.subject {
                Term::Iri(id) => Some(id.clone()),
                _ => None,
            })
            .filter(|id| {
                query.filters.iter().all(|(predicate, object)| {
                    triples.contains(&Triple::new(id.clone(), predicate.clone(), object.clone()))
                })
            })
            .collect())
    }

    fn insert(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError> {
        self.record(StoreCall::Insert {
            graph: graph.clone(),
            triples: triples.len(),
        })?;
        let mut graphs = self.graphs.write().map_err(|_| StoreError::LockPoisoned)?;
        graphs.entry(graph.clone()).or_default().extend(triples.iter().cloned());
        Ok(())
    }

    fn delete(&self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError> {
        self.record(StoreCall::Delete {
            graph: graph.clone(),
            triples: triples.len(),
        })?;
        let mut graphs = self.graphs.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(set) = graphs.get_mut(graph) {
            for t in triples {
                set.remove(t);
            }
        }
        Ok(())
    }

    fn delete_nested(&self, request: &NestedDelete) -> Result<(), StoreError> {
        self.record(StoreCall::DeleteNested {
            graph: request.graph.clone(),
            subject: request.subject.clone(),
            predicate: request.predicate.clone(),
        })?;
        let mut graphs = self.graphs.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(set) = graphs.get_mut(&request.graph) else {
            return Ok(());
        };

        let subject = Term::Iri(request.subject.clone());
        let roots: Vec<Term> = set
            .iter()
            .filter(|t| t.subject == subject && t.predicate == request.predicate)
            .filter(|t| matches!(t.object, Term::Blank(_)))
            .map(|t| t.object.clone())
            .collect();
        let nodes = Self::blank_closure(set, roots);
        set.retain(|t| !nodes.contains(&t.subject));
        Ok(())
    }
}
