//! Resource instances and their attribute state tracking.
//!
//! A [`Resource`] records which attributes reflect the store (`loaded`),
//! which were changed in memory (`modified`), and whether the object has been
//! committed (`persistent`). The state transitions driven by save/delete
//! live here as well so the store-facing layer only decides *when* they
//! happen.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{MapperError, MapperResult};
use crate::naming;
use crate::schema::ResourceClass;
use crate::term::{Iri, Term};
use crate::validation::ValidationErrors;
use crate::value::{AttributeValue, Language, Value};

/// Construction options reserved by the framework; never applied as
/// attributes.
pub const RESERVED_OPTIONS: &[&str] = &["in", "include", "persistent", "on_load"];

/// Raw predicate → objects data not yet reconciled into attributes.
pub type Unmapped = BTreeMap<Iri, Vec<Term>>;

/// Raw objects of one predicate, optionally partitioned by language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmappedValues {
    Flat(Vec<Term>),
    ByLanguage(BTreeMap<Language, Vec<Term>>),
}

/// A computed/query-reported value layered onto a resource. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateValue {
    pub attribute: String,
    pub aggregate: String,
    pub value: Value,
}

/// An in-memory object bound (or bindable) to one subject IRI.
#[derive(Debug, Clone)]
pub struct Resource {
    class: Arc<ResourceClass>,
    id: Option<Iri>,
    values: BTreeMap<String, AttributeValue>,
    loaded: BTreeSet<String>,
    modified: BTreeSet<String>,
    persistent: bool,
    unmapped: Option<Unmapped>,
    errors: ValidationErrors,
    aggregates: Vec<AggregateValue>,
    previous_values: Option<BTreeMap<String, Option<AttributeValue>>>,
}

impl Resource {
    /// A new, empty, non-persistent resource.
    pub fn new(class: Arc<ResourceClass>) -> Self {
        Self {
            class,
            id: None,
            values: BTreeMap::new(),
            loaded: BTreeSet::new(),
            modified: BTreeSet::new(),
            persistent: false,
            unmapped: None,
            errors: ValidationErrors::default(),
            aggregates: Vec::new(),
            previous_values: None,
        }
    }

    /// Construct from an attribute map.
    ///
    /// Reserved options are skipped; an `id` entry must be an IRI and is
    /// assigned as the identifier; every other entry goes through [`set`]
    /// and is therefore marked modified.
    ///
    /// [`set`]: Resource::set
    pub fn with_attributes<K, V>(
        class: Arc<ResourceClass>,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> MapperResult<Self>
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let mut resource = Self::new(class);
        for (name, value) in attributes {
            let name = name.into();
            if RESERVED_OPTIONS.contains(&name.as_str()) {
                continue;
            }
            let value = value.into();
            if name == naming::ID_KEY {
                match value {
                    AttributeValue::Single(Value::Iri(iri)) => resource.set_id(iri)?,
                    _ => return Err(MapperError::configuration("ID must be an IRI")),
                }
                continue;
            }
            resource.set(&name, value)?;
        }
        Ok(resource)
    }

    /// Placeholder for a referenced subject: persistent, nothing loaded.
    pub fn stub(class: Arc<ResourceClass>, id: Iri) -> Self {
        let mut resource = Self::new(class);
        resource.id = Some(id);
        resource.persistent = true;
        resource
    }

    pub fn class(&self) -> &Arc<ResourceClass> {
        &self.class
    }

    /// The identifier, synthesized and cached on first read if absent.
    pub fn id(&mut self) -> MapperResult<&Iri> {
        if self.id.is_none() {
            let generated = naming::generate_id(self)?;
            tracing::debug!(class = self.class.name(), id = %generated, "generated resource id");
            self.id = Some(generated);
        }
        self.id
            .as_ref()
            .ok_or_else(|| MapperError::id_generation("identifier unavailable"))
    }

    /// The identifier if one has been assigned or generated already.
    pub fn peek_id(&self) -> Option<&Iri> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: Iri) -> MapperResult<()> {
        if self.id.is_some() && self.persistent {
            return Err(MapperError::illegal_mutation(
                "The id of a persistent object cannot be changed.",
            ));
        }
        self.id = Some(id);
        Ok(())
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    pub fn modified_attributes(&self) -> &BTreeSet<String> {
        &self.modified
    }

    pub fn loaded_attributes(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    /// Every declared attribute has been loaded.
    pub fn is_fully_loaded(&self) -> bool {
        self.class.declared_attributes().all(|a| self.loaded.contains(a))
    }

    /// Declared attributes not yet loaded, in declaration order.
    pub fn missing_load_attributes(&self) -> Vec<String> {
        self.class
            .declared_attributes()
            .filter(|a| !self.loaded.contains(*a))
            .map(str::to_string)
            .collect()
    }

    /// Whether fetching `attr` from the store is useful and safe: the
    /// resource is persistent, the attribute is not loaded, and it has no
    /// local modification that a reload would clobber.
    pub fn should_bring(&self, attr: &str) -> bool {
        self.persistent && !self.loaded.contains(attr) && !self.modified.contains(attr)
    }

    /// Declared attributes satisfying [`should_bring`](Self::should_bring).
    pub fn remaining_to_bring(&self) -> Vec<String> {
        self.class
            .declared_attributes()
            .filter(|a| self.should_bring(a))
            .map(str::to_string)
            .collect()
    }

    pub fn get(&self, attr: &str) -> Option<&AttributeValue> {
        self.values.get(attr)
    }

    pub fn get_mut(&mut self, attr: &str) -> Option<&mut AttributeValue> {
        self.values.get_mut(attr)
    }

    /// Single value of a scalar attribute.
    pub fn value(&self, attr: &str) -> Option<&Value> {
        self.values.get(attr).and_then(AttributeValue::as_single)
    }

    /// Evaluate a computed (method-backed) attribute.
    pub fn compute(&self, attr: &str) -> MapperResult<Option<AttributeValue>> {
        let def = self.class.attribute(attr).ok_or_else(|| self.unknown_attribute(attr))?;
        match def.computed_value() {
            Some(computed) => Ok(computed.compute(self)),
            None => Err(MapperError::configuration(format!(
                "attribute `{attr}` of `{}` is not computed",
                self.class.name()
            ))),
        }
    }

    /// Assign an attribute and mark it modified.
    ///
    /// List-valued attributes accept a single value and wrap it.
    pub fn set(&mut self, attr: &str, value: impl Into<AttributeValue>) -> MapperResult<()> {
        self.check_settable(attr)?;
        let mut value = value.into();
        if self.class.is_list_valued(attr) {
            if let AttributeValue::Single(v) = value {
                value = AttributeValue::List(vec![v]);
            }
        }
        let previous = self.values.insert(attr.to_string(), value);
        self.record_modification(attr, previous);
        Ok(())
    }

    /// Clear an attribute and mark it modified.
    pub fn unset(&mut self, attr: &str) -> MapperResult<()> {
        self.check_settable(attr)?;
        let previous = self.values.remove(attr);
        self.record_modification(attr, previous);
        Ok(())
    }

    /// Assign a value that came from the store. Marks the attribute loaded,
    /// never modified.
    pub fn load_value(&mut self, attr: &str, value: Option<AttributeValue>) {
        match value {
            Some(v) => {
                self.values.insert(attr.to_string(), v);
            }
            None => {
                self.values.remove(attr);
            }
        }
        self.loaded.insert(attr.to_string());
        self.modified.remove(attr);
    }

    /// Drop the cached in-memory value ahead of a reload.
    pub fn unload(&mut self, attr: &str) {
        self.values.remove(attr);
        self.loaded.remove(attr);
    }

    /// Graph this resource lives in: its collection's IRI when the class is
    /// collection-scoped, otherwise the class IRI.
    pub fn graph(&self) -> MapperResult<Iri> {
        match self.class.collection_attribute() {
            None => Ok(self.class.rdf_type().clone()),
            Some(_) => self.collection(),
        }
    }

    /// The collection IRI, requiring it to be set to exactly one value.
    pub fn collection(&self) -> MapperResult<Iri> {
        let attr = self
            .class
            .collection_attribute()
            .ok_or_else(|| MapperError::configuration(format!("`{}` has no collection", self.class.name())))?;
        if !self.class.is_declared(attr) {
            return Err(MapperError::configuration(format!(
                "Collection `{attr}` is not an attribute"
            )));
        }
        let value = self
            .values
            .get(attr)
            .ok_or_else(|| MapperError::configuration(format!("Collection `{attr}` is nil")))?;
        let single = match value {
            AttributeValue::Single(v) => v,
            AttributeValue::List(vs) if vs.len() == 1 => &vs[0],
            AttributeValue::List(vs) if vs.is_empty() => {
                return Err(MapperError::configuration(format!("Collection `{attr}` is nil")))
            }
            _ => {
                return Err(MapperError::configuration(format!(
                    "collection `{attr}` must hold exactly one value to scope a save"
                )))
            }
        };
        single.reference().cloned().ok_or_else(|| {
            MapperError::configuration(format!("collection `{attr}` value has no IRI"))
        })
    }

    /// The collection IRI if one is resolvable, for predicate scoping.
    pub fn collection_scope(&self) -> Option<Iri> {
        self.class.collection_attribute()?;
        self.collection().ok()
    }

    pub fn unmapped(&self) -> Option<&Unmapped> {
        self.unmapped.as_ref()
    }

    pub fn set_unmapped(&mut self, unmapped: Option<Unmapped>) {
        self.unmapped = unmapped;
    }

    /// Add raw objects for a predicate, keeping set semantics.
    pub fn unmapped_set(&mut self, predicate: Iri, objects: impl IntoIterator<Item = Term>) {
        let entry = self.unmapped.get_or_insert_with(BTreeMap::new).entry(predicate).or_default();
        for term in objects {
            if !entry.contains(&term) {
                entry.push(term);
            }
        }
    }

    pub fn unmapped_get(&self, predicate: &Iri) -> Option<&[Term]> {
        self.unmapped.as_ref()?.get(predicate).map(Vec::as_slice)
    }

    /// Raw data view; with `include_languages`, literal objects are
    /// partitioned by language tag and everything else lands in
    /// [`Language::None`].
    pub fn unmapped_view(&self, include_languages: bool) -> Option<BTreeMap<Iri, UnmappedValues>> {
        let unmapped = self.unmapped.as_ref()?;
        Some(
            unmapped
                .iter()
                .map(|(p, objects)| {
                    let view = if include_languages {
                        let mut by_lang: BTreeMap<Language, Vec<Term>> = BTreeMap::new();
                        for term in objects {
                            let lang = term
                                .as_literal()
                                .and_then(|l| l.language())
                                .map(Language::tag)
                                .unwrap_or(Language::None);
                            by_lang.entry(lang).or_default().push(term.clone());
                        }
                        UnmappedValues::ByLanguage(by_lang)
                    } else {
                        UnmappedValues::Flat(objects.clone())
                    };
                    (p.clone(), view)
                })
                .collect(),
        )
    }

    /// Last computed validation errors (see `validate`).
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub(crate) fn set_errors(&mut self, errors: ValidationErrors) {
        self.errors = errors;
    }

    pub fn add_aggregate(&mut self, attribute: impl Into<String>, aggregate: impl Into<String>, value: Value) {
        self.aggregates.push(AggregateValue {
            attribute: attribute.into(),
            aggregate: aggregate.into(),
            value,
        });
    }

    pub fn aggregates(&self) -> &[AggregateValue] {
        &self.aggregates
    }

    /// Values prior to the pending mutations, per modified attribute.
    pub fn previous_values(&self) -> Option<&BTreeMap<String, Option<AttributeValue>>> {
        self.previous_values.as_ref()
    }

    /// State after a successful save: everything loaded, nothing modified,
    /// persistent.
    pub fn commit_saved(&mut self) {
        self.loaded
            .extend(self.class.declared_attributes().map(str::to_string));
        self.modified.clear();
        self.previous_values = None;
        self.persistent = true;
    }

    /// State after a successful delete.
    pub fn commit_deleted(&mut self) {
        self.persistent = false;
        self.previous_values = None;
    }

    /// Declared attributes, residual unmapped predicates and the id, as a
    /// plain JSON object.
    pub fn to_attribute_map(&self) -> JsonMap<String, JsonValue> {
        let mut out = JsonMap::new();
        for attr in self.class.declared_attributes() {
            if let Some(v) = self.values.get(attr) {
                out.insert(attr.to_string(), v.to_json());
            }
        }
        if let Some(unmapped) = &self.unmapped {
            let scope = self.collection_scope();
            let mapped: BTreeSet<Iri> = self
                .class
                .attribute_defs()
                .map(|a| a.predicate(scope.as_ref()))
                .collect();
            for (predicate, objects) in unmapped {
                if mapped.contains(predicate) {
                    continue;
                }
                let values = objects
                    .iter()
                    .map(|t| JsonValue::String(Value::from_term(t).to_plain_string()))
                    .collect();
                out.insert(predicate.to_string(), JsonValue::Array(values));
            }
        }
        out.insert(
            naming::ID_KEY.to_string(),
            self.id
                .as_ref()
                .map(|id| JsonValue::String(id.to_string()))
                .unwrap_or(JsonValue::Null),
        );
        out
    }

    fn check_settable(&self, attr: &str) -> MapperResult<()> {
        if self.class.is_computed(attr) {
            return Err(MapperError::configuration(format!(
                "attribute `{attr}` of `{}` is computed and cannot be set",
                self.class.name()
            )));
        }
        if !self.class.is_declared(attr) {
            return Err(self.unknown_attribute(attr));
        }
        Ok(())
    }

    fn unknown_attribute(&self, attr: &str) -> MapperError {
        MapperError::configuration(format!(
            "attribute `{attr}` is not declared on `{}`",
            self.class.name()
        ))
    }

    fn record_modification(&mut self, attr: &str, previous: Option<AttributeValue>) {
        if self.persistent {
            self.previous_values
                .get_or_insert_with(BTreeMap::new)
                .entry(attr.to_string())
                .or_insert(previous);
        }
        self.modified.insert(attr.to_string());
    }
}
