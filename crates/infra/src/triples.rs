//! Triple-diff computation for save and delete.

use triplebind_core::term::vocab;
use triplebind_core::{AttributeValue, Iri, MapperError, MapperResult, Resource, Triple, Value};

use crate::store::NestedDelete;

/// Store mutations needed to move a resource from its previous state to the
/// current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTriples {
    pub graph: Iri,
    pub insert: Vec<Triple>,
    pub delete: Vec<Triple>,
}

/// Store mutations needed to remove a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTriples {
    pub graph: Iri,
    pub delete: Vec<Triple>,
    /// Anonymous sub-structures, removed before `delete`.
    pub nested: Vec<NestedDelete>,
}

/// Computes triple diffs. The resource must already carry an id.
pub trait TripleBuilder: Send + Sync {
    fn update_triples(&self, resource: &Resource) -> MapperResult<UpdateTriples>;

    fn delete_triples(&self, resource: &Resource) -> MapperResult<DeleteTriples>;
}

/// Diff builder driven by the class declaration.
///
/// New resources insert their type triple and every stored attribute value.
/// Persistent resources only touch modified attributes: the recorded
/// previous value is deleted and the current value inserted. Computed
/// attributes are never written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTripleBuilder;

impl DefaultTripleBuilder {
    fn subject(resource: &Resource) -> MapperResult<Iri> {
        resource.peek_id().cloned().ok_or_else(|| {
            MapperError::configuration(format!(
                "`{}` resource has no id to build triples for",
                resource.class().name()
            ))
        })
    }

    fn value_triples(
        subject: &Iri,
        predicate: &Iri,
        value: &AttributeValue,
        out: &mut Vec<Triple>,
    ) -> MapperResult<()> {
        for (language, v) in value.tagged_values() {
            let object = v.to_term(language)?;
            out.push(Triple::new(subject.clone(), predicate.clone(), object));
        }
        Ok(())
    }
}

impl TripleBuilder for DefaultTripleBuilder {
    fn update_triples(&self, resource: &Resource) -> MapperResult<UpdateTriples> {
        let class = resource.class();
        let subject = Self::subject(resource)?;
        let graph = resource.graph()?;
        let scope = resource.collection_scope();
        let mut diff = UpdateTriples {
            graph,
            insert: Vec::new(),
            delete: Vec::new(),
        };

        if !resource.is_persistent() {
            diff.insert.push(Triple::new(
                subject.clone(),
                Iri::new(vocab::RDF_TYPE),
                class.rdf_type().clone(),
            ));
        }

        for def in class.attribute_defs().filter(|d| !d.is_computed()) {
            let name = def.name();
            if resource.is_persistent() && !resource.modified_attributes().contains(name) {
                continue;
            }
            let predicate = def.predicate(scope.as_ref());

            if resource.is_persistent() {
                let previous = resource
                    .previous_values()
                    .and_then(|p| p.get(name))
                    .and_then(Option::as_ref);
                if let Some(previous) = previous {
                    Self::value_triples(&subject, &predicate, previous, &mut diff.delete)?;
                }
            }
            if let Some(current) = resource.get(name) {
                Self::value_triples(&subject, &predicate, current, &mut diff.insert)?;
            }
        }

        // Values present both before and after need no round trip.
        let unchanged: Vec<Triple> = diff
            .delete
            .iter()
            .filter(|t| diff.insert.contains(t))
            .cloned()
            .collect();
        diff.delete.retain(|t| !unchanged.contains(t));
        diff.insert.retain(|t| !unchanged.contains(t));

        Ok(diff)
    }

    fn delete_triples(&self, resource: &Resource) -> MapperResult<DeleteTriples> {
        let class = resource.class();
        let subject = Self::subject(resource)?;
        let graph = resource.graph()?;
        let scope = resource.collection_scope();
        let mut diff = DeleteTriples {
            graph: graph.clone(),
            delete: Vec::new(),
            nested: Vec::new(),
        };

        diff.delete.push(Triple::new(
            subject.clone(),
            Iri::new(vocab::RDF_TYPE),
            class.rdf_type().clone(),
        ));

        for def in class.attribute_defs().filter(|d| !d.is_computed()) {
            let Some(value) = resource.get(def.name()) else {
                continue;
            };
            let predicate = def.predicate(scope.as_ref());
            if value.values().iter().any(|v| matches!(v, Value::Blank(_))) {
                diff.nested.push(NestedDelete {
                    graph: graph.clone(),
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                });
            }
            Self::value_triples(&subject, &predicate, value, &mut diff.delete)?;
        }

        Ok(diff)
    }
}
