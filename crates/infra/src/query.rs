//! Restartable query cursor over one resource class.
//!
//! A [`Query`] is a plain description until a terminal (`all`, `first`,
//! `projections`) runs it; terminals borrow the query, so the same cursor can
//! be executed again.

use std::sync::Arc;

use tracing::debug;

use triplebind_core::{
    map_attributes, AttributeValue, CacheLookup, Iri, MapperError, MapperResult, Projection, Resource,
    ResourceClass, Term, Unmapped, Value,
};

use crate::session::{check_loadable, Session};
use crate::store::{LoadRequest, SubjectQuery, TripleStore};
use crate::triples::TripleBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Include {
    /// Only ids: results are unloaded stubs.
    Nothing,
    All,
    Attributes(Vec<String>),
}

pub struct Query<'s, S, B> {
    session: &'s Session<S, B>,
    class: Arc<ResourceClass>,
    ids: Option<Vec<Iri>>,
    filters: Vec<(String, AttributeValue)>,
    collection: Option<Iri>,
    include: Include,
    include_languages: bool,
}

impl<'s, S, B> Query<'s, S, B>
where
    S: TripleStore,
    B: TripleBuilder,
{
    pub(crate) fn new(session: &'s Session<S, B>, class: Arc<ResourceClass>) -> Self {
        Self {
            session,
            class,
            ids: None,
            filters: Vec::new(),
            collection: None,
            include: Include::Nothing,
            include_languages: false,
        }
    }

    pub(crate) fn with_ids(mut self, ids: Vec<Iri>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Require `attr` to hold `value`. List and language-partitioned values
    /// require every element.
    pub fn filter(mut self, attr: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.filters.push((attr.into(), value.into()));
        self
    }

    /// Scope the query into a collection graph.
    pub fn in_collection(mut self, collection: Iri) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Load these attributes on every result.
    pub fn include<I, A>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let mut list = match self.include {
            Include::Attributes(list) => list,
            _ => Vec::new(),
        };
        list.extend(attrs.into_iter().map(Into::into));
        self.include = Include::Attributes(list);
        self
    }

    pub fn include_all(mut self) -> Self {
        self.include = Include::All;
        self
    }

    /// Partition language-tagged values by language when mapping.
    pub fn include_languages(mut self) -> Self {
        self.include_languages = true;
        self
    }

    pub fn all(&self) -> MapperResult<Vec<Resource>> {
        let graph = self.graph()?;
        if let Some(cached) = self.from_cache()? {
            return Ok(cached);
        }

        let collection_value = self.collection_value(&graph)?;
        let include = self.include_list()?;
        let mut out = Vec::new();
        for (id, raw) in self.fetch(&graph, include.as_deref())? {
            let mut resource = Resource::stub(self.class.clone(), id);
            if let (Some(attr), Some(value)) = (self.class.collection_attribute(), &collection_value) {
                resource.load_value(attr, Some(value.clone()));
            }
            if let Some(raw) = raw {
                resource.set_unmapped(Some(raw));
                let options = self.session.map_options(include.as_deref(), self.include_languages);
                map_attributes(&mut resource, self.session.schema(), &options)?;
            }
            out.push(resource);
        }
        Ok(out)
    }

    pub fn first(&self) -> MapperResult<Option<Resource>> {
        Ok(self.all()?.into_iter().next())
    }

    /// Lightweight read-only results: ids and mapped values, no lifecycle
    /// state, and no instance-cache short-circuit.
    pub fn projections(&self) -> MapperResult<Vec<Projection>> {
        let graph = self.graph()?;
        let include = self.include_list()?;
        let mut out = Vec::new();
        for (id, raw) in self.fetch(&graph, include.as_deref())? {
            let mut projection = Projection::new(self.class.clone(), id, raw.unwrap_or_default());
            if self.class.collection_attribute().is_some() {
                projection = projection.in_collection(graph.clone());
            }
            let options = self.session.map_options(include.as_deref(), self.include_languages);
            map_attributes(&mut projection, self.session.schema(), &options)?;
            out.push(projection);
        }
        Ok(out)
    }

    fn graph(&self) -> MapperResult<Iri> {
        match (&self.collection, self.class.collection_attribute()) {
            (Some(collection), _) => Ok(collection.clone()),
            (None, Some(attr)) => Err(MapperError::configuration(format!(
                "`{}` is scoped by collection `{attr}`; query it with in_collection",
                self.class.name()
            ))),
            (None, None) => Ok(self.class.rdf_type().clone()),
        }
    }

    fn scope(&self) -> Option<&Iri> {
        self.class.collection_attribute()?;
        self.collection.as_ref()
    }

    /// Value assigned to the collection attribute of every result.
    fn collection_value(&self, graph: &Iri) -> MapperResult<Option<AttributeValue>> {
        let Some(attr) = self.class.collection_attribute() else {
            return Ok(None);
        };
        let value = match self
            .session
            .schema()
            .range_object(&self.class, attr, graph.clone())?
        {
            Some(stub) => Value::Resource(Box::new(stub)),
            None => Value::Iri(graph.clone()),
        };
        Ok(Some(value.into()))
    }

    /// Requested attributes, checked against the class and stripped of the
    /// collection attribute. `None` means every attribute.
    fn include_list(&self) -> MapperResult<Option<Vec<String>>> {
        match &self.include {
            Include::All => Ok(None),
            Include::Nothing => Ok(Some(Vec::new())),
            Include::Attributes(attrs) => {
                let mut out: Vec<String> = Vec::new();
                for attr in attrs {
                    check_loadable(&self.class, attr)?;
                    if !self.class.is_collection(attr) && !out.contains(attr) {
                        out.push(attr.clone());
                    }
                }
                Ok(Some(out))
            }
        }
    }

    /// Cached instances for id lookups on immutable cached classes.
    fn from_cache(&self) -> MapperResult<Option<Vec<Resource>>> {
        let Some(ids) = &self.ids else {
            return Ok(None);
        };
        if !self.filters.is_empty() || self.collection.is_some() {
            return Ok(None);
        }
        let Some(cache) = self.session.schema().instance_cache(self.class.name()) else {
            return Ok(None);
        };
        if !cache.is_populated() {
            self.session.rebuild_instance_cache(&self.class)?;
        }

        let mut out = Vec::new();
        for id in ids {
            match cache.lookup(id) {
                CacheLookup::Hit(resource) => out.push(resource),
                CacheLookup::Miss | CacheLookup::Unpopulated => {}
            }
        }
        debug!(class = self.class.name(), hits = out.len(), "served from instance cache");
        Ok(Some(out))
    }

    fn filter_terms(&self) -> MapperResult<Vec<(Iri, Term)>> {
        let mut out = Vec::new();
        for (attr, value) in &self.filters {
            let predicate = self
                .class
                .attribute_predicate(attr, self.scope())
                .filter(|_| self.class.is_declared(attr))
                .ok_or_else(|| {
                    MapperError::configuration(format!(
                        "`{attr}` is not an attribute of `{}`",
                        self.class.name()
                    ))
                })?;
            for (language, v) in value.tagged_values() {
                out.push((predicate.clone(), v.to_term(language)?));
            }
        }
        Ok(out)
    }

    /// Matching subjects with their raw data. Raw data is `None` when no
    /// attributes were requested.
    fn fetch(&self, graph: &Iri, include: Option<&[String]>) -> MapperResult<Vec<(Iri, Option<Unmapped>)>> {
        let store = self.session.store();
        let ids = match &self.ids {
            Some(ids) if self.filters.is_empty() => ids.clone(),
            _ => {
                let mut subjects = store.subjects(&SubjectQuery {
                    graph: graph.clone(),
                    rdf_type: self.class.rdf_type().clone(),
                    filters: self.filter_terms()?,
                })?;
                if let Some(ids) = &self.ids {
                    subjects.retain(|s| ids.contains(s));
                }
                subjects
            }
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let wants_data = include.is_none_or(|attrs| !attrs.is_empty());
        if !wants_data && self.ids.is_none() {
            return Ok(ids.into_iter().map(|id| (id, None)).collect());
        }

        let predicates = include.map(|attrs| self.session.predicates_for(&self.class, attrs, self.scope()));
        let mut loaded = store.load_attributes(&LoadRequest {
            graph: graph.clone(),
            ids: ids.clone(),
            predicates,
        })?;
        debug!(
            class = self.class.name(),
            graph = %graph,
            requested = ids.len(),
            found = loaded.len(),
            "query loaded subjects"
        );

        // Keep the requested order; drop subjects the store does not hold.
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let raw = loaded.remove(&id)?;
                Some((id, wants_data.then_some(raw)))
            })
            .collect())
    }
}
