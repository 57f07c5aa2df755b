//! Persistence orchestration for mapped resources.
//!
//! The `Session` composes a [`TripleStore`], a [`TripleBuilder`] and the
//! [`Schema`] to give resources their lifecycle:
//!
//! ```text
//! save:   enum guard → unmodified? no-op → validate → diff (+ stored values of unloaded edits) → delete → insert → commit
//! delete: persistent? → enum guard → reload missing → nested deletes → delete → commit
//! bring:  unload requested → one scoped load → map (load path, never modified)
//! ```
//!
//! Store failures are never caught or retried here. A failed delete phase
//! means no insert is attempted and the resource keeps its pre-save state;
//! there is no cross-call atomicity.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use triplebind_core::{
    AttributeValue, Enforce, EquivalentPredicates, Iri, MapOptions, MapperError, MapperResult,
    NameWith, Resource, ResourceClass, RuleEnforcer, Schema, Triple, map_attributes,
};

use crate::batch::BatchWriter;
use crate::query::Query;
use crate::store::{LoadRequest, StoreExistence, TripleStore};
use crate::triples::{DefaultTripleBuilder, TripleBuilder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Allow writing instances of an enum class.
    pub init_enum: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Allow deleting instances of an enum class.
    pub init_enum: bool,
}

/// One attribute to bring, optionally with attributes to bring on the
/// resources it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringSpec {
    Attr(String),
    Nested(String, Vec<BringSpec>),
}

impl BringSpec {
    pub fn nested<I, T>(attr: impl Into<String>, inner: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BringSpec>,
    {
        BringSpec::Nested(attr.into(), inner.into_iter().map(Into::into).collect())
    }

    pub fn attribute(&self) -> &str {
        match self {
            BringSpec::Attr(name) | BringSpec::Nested(name, _) => name,
        }
    }
}

impl From<&str> for BringSpec {
    fn from(value: &str) -> Self {
        BringSpec::Attr(value.to_string())
    }
}

impl From<String> for BringSpec {
    fn from(value: String) -> Self {
        BringSpec::Attr(value)
    }
}

/// Attributes that can be fetched from the store: declared and stored.
pub(crate) fn check_loadable(class: &ResourceClass, attr: &str) -> MapperResult<()> {
    if class.is_computed(attr) {
        return Err(MapperError::illegal_mutation(format!(
            "`{attr}` is a computed attribute of `{}` and cannot be loaded",
            class.name()
        )));
    }
    if !class.is_declared(attr) {
        return Err(MapperError::configuration(format!(
            "`{attr}` is not an attribute of `{}`",
            class.name()
        )));
    }
    Ok(())
}

fn check_enum(class: &ResourceClass, init_enum: bool, action: &str) -> MapperResult<()> {
    if class.is_enum() && !init_enum {
        return Err(MapperError::illegal_mutation(format!(
            "`{}` is an enum class; its instances can only be {action} through initialize_enum",
            class.name()
        )));
    }
    Ok(())
}

pub struct Session<S, B = DefaultTripleBuilder> {
    store: S,
    builder: B,
    schema: Arc<Schema>,
    enforcer: Arc<dyn Enforce + Send + Sync>,
    equivalents: EquivalentPredicates,
}

impl<S> Session<S, DefaultTripleBuilder>
where
    S: TripleStore,
{
    pub fn new(store: S, schema: Arc<Schema>) -> Self {
        Self::with_builder(store, DefaultTripleBuilder, schema)
    }
}

impl<S, B> Session<S, B>
where
    S: TripleStore,
    B: TripleBuilder,
{
    pub fn with_builder(store: S, builder: B, schema: Arc<Schema>) -> Self {
        Self {
            store,
            builder,
            schema,
            enforcer: Arc::new(RuleEnforcer),
            equivalents: EquivalentPredicates::new(),
        }
    }

    pub fn with_enforcer(mut self, enforcer: impl Enforce + Send + Sync + 'static) -> Self {
        self.enforcer = Arc::new(enforcer);
        self
    }

    /// Alternate predicates consulted when an attribute's own predicate has
    /// no values.
    pub fn with_equivalent_predicates(mut self, equivalents: EquivalentPredicates) -> Self {
        self.equivalents = equivalents;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Construct a new resource of a registered class.
    pub fn create<K, V>(&self, class_name: &str, attrs: impl IntoIterator<Item = (K, V)>) -> MapperResult<Resource>
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        Resource::with_attributes(self.schema.class(class_name)?, attrs)
    }

    pub fn validate(&self, resource: &mut Resource) -> MapperResult<bool> {
        resource.validate(&*self.enforcer, &StoreExistence(&self.store))
    }

    /// Whether the resource's id is already typed as its class in the store.
    /// Generates (and caches) the id if needed.
    pub fn exists(&self, resource: &mut Resource) -> MapperResult<bool> {
        let id = resource.id()?.clone();
        Ok(self.store.exists(resource.class(), &id)?)
    }

    pub fn save(&self, resource: &mut Resource) -> MapperResult<()> {
        self.save_with(resource, SaveOptions::default())
    }

    /// Save with explicit options.
    ///
    /// For classes with an instance cache the cache is rebuilt after the
    /// write. If that rebuild fails the error is returned while the store
    /// write and the resource commit have already happened:
    /// `resource.is_persistent()` and `!resource.is_modified()` still hold,
    /// and the cache is rebuilt again on the next commit of that class.
    #[instrument(skip(self, resource), fields(class = resource.class().name()))]
    pub fn save_with(&self, resource: &mut Resource, options: SaveOptions) -> MapperResult<()> {
        let class = resource.class().clone();
        check_enum(&class, options.init_enum, "saved")?;

        if !resource.is_modified() {
            debug!("save skipped: nothing modified");
            return Ok(());
        }
        resource.ensure_valid(&*self.enforcer, &StoreExistence(&self.store))?;

        let id = resource.id()?.clone();
        let mut diff = self.builder.update_triples(resource)?;
        for stale in self.unloaded_stored_triples(resource, &id, &diff.graph)? {
            if !diff.insert.contains(&stale) && !diff.delete.contains(&stale) {
                diff.delete.push(stale);
            }
        }
        if !diff.delete.is_empty() {
            self.store.delete(&diff.delete, &diff.graph)?;
        }
        if !diff.insert.is_empty() {
            self.store.insert(&diff.insert, &diff.graph)?;
        }
        resource.commit_saved();
        info!(
            id = %id,
            graph = %diff.graph,
            inserted = diff.insert.len(),
            deleted = diff.delete.len(),
            "resource saved"
        );

        self.after_commit(&class)
    }

    /// Batched write: serialize the insert set to `sink` instead of the
    /// store. Skips the modified and validation checks and has no delete
    /// phase.
    #[instrument(skip(self, resource, sink), fields(class = resource.class().name()))]
    pub fn save_batch<W>(&self, resource: &mut Resource, sink: &mut W, options: SaveOptions) -> MapperResult<()>
    where
        W: Write + ?Sized,
    {
        let class = resource.class().clone();
        check_enum(&class, options.init_enum, "saved")?;

        let id = resource.id()?.clone();
        let diff = self.builder.update_triples(resource)?;
        let mut writer = BatchWriter::new(sink);
        writer.write_triples(&diff.insert, &diff.graph)?;
        resource.commit_saved();
        debug!(id = %id, lines = writer.lines_written(), "resource written to batch sink");

        self.after_commit(&class)
    }

    pub fn delete(&self, resource: &mut Resource) -> MapperResult<()> {
        self.delete_with(resource, DeleteOptions::default())
    }

    /// Delete with explicit options. As with [`save_with`](Self::save_with),
    /// a failed cache rebuild after the store delete is returned with the
    /// resource already marked non-persistent.
    #[instrument(skip(self, resource), fields(class = resource.class().name()))]
    pub fn delete_with(&self, resource: &mut Resource, options: DeleteOptions) -> MapperResult<()> {
        let class = resource.class().clone();
        if !resource.is_persistent() {
            return Err(MapperError::illegal_mutation(
                "Cannot delete a resource that is not persistent",
            ));
        }
        check_enum(&class, options.init_enum, "deleted")?;

        if !resource.is_fully_loaded() {
            let missing: Vec<String> = resource
                .missing_load_attributes()
                .into_iter()
                .filter(|a| !class.is_collection(a))
                .collect();
            if !missing.is_empty() {
                self.load_into(resource, &missing)?;
            }
        }

        let diff = self.builder.delete_triples(resource)?;
        for nested in &diff.nested {
            self.store.delete_nested(nested)?;
        }
        self.store.delete(&diff.delete, &diff.graph)?;
        resource.commit_deleted();
        info!(
            id = ?resource.peek_id(),
            graph = %diff.graph,
            deleted = diff.delete.len(),
            nested = diff.nested.len(),
            "resource deleted"
        );

        self.after_commit(&class)
    }

    /// Reload the given attributes in one scoped load. Nested specs are then
    /// brought on the referenced resources.
    pub fn bring<'r>(&self, resource: &'r mut Resource, specs: &[BringSpec]) -> MapperResult<&'r mut Resource> {
        let class = resource.class().clone();
        let mut attrs: Vec<String> = Vec::new();
        for spec in specs {
            let name = spec.attribute();
            check_loadable(&class, name)?;
            if !class.is_collection(name) && !attrs.iter().any(|a| a == name) {
                attrs.push(name.to_string());
            }
        }
        if !attrs.is_empty() {
            self.load_into(resource, &attrs)?;
        }

        for spec in specs {
            if let BringSpec::Nested(attr, inner) = spec {
                if let Some(value) = resource.get_mut(attr) {
                    for v in value.values_mut() {
                        if let Some(referenced) = v.as_resource_mut() {
                            self.bring(referenced, inner)?;
                        }
                    }
                }
            }
        }
        Ok(resource)
    }

    /// Bring every attribute that is safe to reload, in one call.
    pub fn bring_remaining<'r>(&self, resource: &'r mut Resource) -> MapperResult<&'r mut Resource> {
        let class = resource.class().clone();
        let attrs: Vec<String> = resource
            .remaining_to_bring()
            .into_iter()
            .filter(|a| !class.is_collection(a))
            .collect();
        if !attrs.is_empty() {
            self.load_into(resource, &attrs)?;
        }
        Ok(resource)
    }

    pub fn find(&self, class_name: &str, id: Iri) -> MapperResult<Query<'_, S, B>> {
        Ok(Query::new(self, self.schema.class(class_name)?).with_ids(vec![id]))
    }

    pub fn where_<K, V>(
        &self,
        class_name: &str,
        filters: impl IntoIterator<Item = (K, V)>,
    ) -> MapperResult<Query<'_, S, B>>
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let query = Query::new(self, self.schema.class(class_name)?);
        Ok(filters
            .into_iter()
            .fold(query, |q, (attr, value)| q.filter(attr, value)))
    }

    pub fn all(&self, class_name: &str) -> MapperResult<Query<'_, S, B>> {
        Ok(Query::new(self, self.schema.class(class_name)?))
    }

    /// Create every declared value of an enum class that the store does not
    /// hold yet. Returns the newly saved instances.
    #[instrument(skip(self))]
    pub fn initialize_enum(&self, class_name: &str) -> MapperResult<Vec<Resource>> {
        let class = self.schema.class(class_name)?;
        if !class.is_enum() {
            return Err(MapperError::configuration(format!(
                "`{class_name}` is not an enum class"
            )));
        }
        let NameWith::Attribute(attr) = class.name_with() else {
            return Err(MapperError::configuration(format!(
                "enum class `{class_name}` must be named by an attribute"
            )));
        };

        let mut created = Vec::new();
        for value in class.enum_values() {
            let mut resource =
                Resource::with_attributes(class.clone(), [(attr.as_str(), AttributeValue::from(value.as_str()))])?;
            if self.exists(&mut resource)? {
                debug!(value = value.as_str(), "enum value already present");
                continue;
            }
            self.save_with(&mut resource, SaveOptions { init_enum: true })?;
            created.push(resource);
        }
        info!(created = created.len(), "enum initialized");
        Ok(created)
    }

    /// Reload every instance of an immutable cached class into its
    /// process-wide cache. Returns the number of cached instances, or 0 for
    /// classes without a cache.
    pub fn rebuild_instance_cache(&self, class: &Arc<ResourceClass>) -> MapperResult<usize> {
        let Some(cache) = self.schema.instance_cache(class.name()) else {
            return Ok(0);
        };
        let count = cache.rebuild(|| Query::new(self, class.clone()).include_all().all())?;
        info!(class = class.name(), instances = count, "instance cache rebuilt");
        Ok(count)
    }

    fn after_commit(&self, class: &Arc<ResourceClass>) -> MapperResult<()> {
        if class.caches_instances() {
            if let Err(err) = self.rebuild_instance_cache(class) {
                warn!(class = class.name(), error = %err, "write committed but instance cache rebuild failed");
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn map_options<'a>(&'a self, attributes: Option<&'a [String]>, include_languages: bool) -> MapOptions<'a> {
        MapOptions {
            equivalent_predicates: Some(&self.equivalents),
            include_languages,
            attributes,
        }
    }

    /// Store predicates for `attrs`, including equivalents.
    pub(crate) fn predicates_for(&self, class: &ResourceClass, attrs: &[String], scope: Option<&Iri>) -> Vec<Iri> {
        let mut out: Vec<Iri> = Vec::new();
        for attr in attrs {
            let Some(predicate) = class.attribute_predicate(attr, scope) else {
                continue;
            };
            let alternates = self.equivalents.get(&predicate).cloned().unwrap_or_default();
            for p in std::iter::once(predicate).chain(alternates) {
                if !out.contains(&p) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Stored triples of modified attributes whose prior value was never
    /// loaded, so no recorded previous value can drive their deletion.
    fn unloaded_stored_triples(&self, resource: &Resource, id: &Iri, graph: &Iri) -> MapperResult<Vec<Triple>> {
        if !resource.is_persistent() {
            return Ok(Vec::new());
        }
        let class = resource.class();
        let scope = resource.collection_scope();
        let predicates: Vec<Iri> = resource
            .modified_attributes()
            .iter()
            .filter(|a| !resource.loaded_attributes().contains(*a))
            .filter(|a| !class.is_collection(a) && !class.is_computed(a))
            .filter_map(|a| class.attribute_predicate(a, scope.as_ref()))
            .collect();
        if predicates.is_empty() {
            return Ok(Vec::new());
        }

        let mut loaded = self.store.load_attributes(&LoadRequest {
            graph: graph.clone(),
            ids: vec![id.clone()],
            predicates: Some(predicates),
        })?;
        let mut out = Vec::new();
        for (predicate, objects) in loaded.remove(id).unwrap_or_default() {
            for object in objects {
                out.push(Triple::new(id.clone(), predicate.clone(), object));
            }
        }
        debug!(id = %id, stale = out.len(), "loaded stored values of unloaded modified attributes");
        Ok(out)
    }

    /// Unload `attrs`, fetch them in one scoped load and map them back.
    fn load_into(&self, resource: &mut Resource, attrs: &[String]) -> MapperResult<()> {
        let class = resource.class().clone();
        let id = resource.peek_id().cloned().ok_or_else(|| {
            MapperError::configuration(format!(
                "cannot load attributes of a `{}` resource without an id",
                class.name()
            ))
        })?;
        let graph = resource.graph()?;
        let scope = resource.collection_scope();
        let predicates = self.predicates_for(&class, attrs, scope.as_ref());

        for attr in attrs {
            resource.unload(attr);
        }
        let mut loaded = self.store.load_attributes(&LoadRequest {
            graph: graph.clone(),
            ids: vec![id.clone()],
            predicates: Some(predicates.clone()),
        })?;
        let raw = loaded.remove(&id).unwrap_or_default();

        let mut merged = resource.unmapped().cloned().unwrap_or_default();
        for p in &predicates {
            merged.remove(p);
        }
        merged.extend(raw);
        resource.set_unmapped(Some(merged));

        map_attributes(resource, &self.schema, &self.map_options(Some(attrs), false))?;
        debug!(
            class = class.name(),
            id = %id,
            graph = %graph,
            attributes = ?attrs,
            "attributes loaded"
        );
        Ok(())
    }
}
