//! Reconciliation of raw predicate data into typed attributes.
//!
//! Runs once per loaded subject after a query returns its raw predicate map.
//! For each declared attribute (except the collection attribute, which the
//! loader already set):
//!
//! 1. compute the predicate, scoped by collection;
//! 2. take the objects of that predicate, or failing that, the flattened
//!    objects of every equivalent predicate;
//! 3. no objects: empty default (`[]` for lists, absent otherwise);
//! 4. with `include_languages`, tagged literals partition the values by
//!    language, untagged values going to [`Language::None`];
//! 5. literals unwrap to native values, identifiers stay references;
//! 6. references of class-ranged attributes become placeholder resources;
//! 7. collapse to one value unless list-valued or partitioned;
//! 8. assign through the load path (never marks modified).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{MapperError, MapperResult};
use crate::resource::{Resource, Unmapped};
use crate::schema::{AttributeDef, Range, ResourceClass, Schema};
use crate::term::{Iri, Term};
use crate::value::{AttributeValue, Language, Value};

/// Attribute predicate → alternate predicates carrying the same data.
pub type EquivalentPredicates = HashMap<Iri, Vec<Iri>>;

/// Something attributes can be mapped onto: a full [`Resource`] or a
/// lightweight [`Projection`].
pub trait MapTarget {
    fn declared_class(&self) -> &Arc<ResourceClass>;

    fn unmapped_data(&self) -> Option<&Unmapped>;

    /// Collection IRI used to scope attribute predicates.
    fn collection_scope(&self) -> Option<Iri>;

    fn get(&self, attr: &str) -> Option<&AttributeValue>;

    /// Assign a loaded value, bypassing modification tracking.
    fn set_loaded(&mut self, attr: &str, value: Option<AttributeValue>);
}

impl MapTarget for Resource {
    fn declared_class(&self) -> &Arc<ResourceClass> {
        self.class()
    }

    fn unmapped_data(&self) -> Option<&Unmapped> {
        self.unmapped()
    }

    fn collection_scope(&self) -> Option<Iri> {
        Resource::collection_scope(self)
    }

    fn get(&self, attr: &str) -> Option<&AttributeValue> {
        Resource::get(self, attr)
    }

    fn set_loaded(&mut self, attr: &str, value: Option<AttributeValue>) {
        self.load_value(attr, value);
    }
}

/// Read-only projection record: id plus mapped values, no lifecycle state.
#[derive(Debug, Clone)]
pub struct Projection {
    class: Arc<ResourceClass>,
    id: Iri,
    values: BTreeMap<String, AttributeValue>,
    unmapped: Option<Unmapped>,
    collection: Option<Iri>,
}

impl Projection {
    pub fn new(class: Arc<ResourceClass>, id: Iri, unmapped: Unmapped) -> Self {
        Self {
            class,
            id,
            values: BTreeMap::new(),
            unmapped: Some(unmapped),
            collection: None,
        }
    }

    pub fn in_collection(mut self, collection: Iri) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn id(&self) -> &Iri {
        &self.id
    }

    pub fn values(&self) -> &BTreeMap<String, AttributeValue> {
        &self.values
    }
}

impl MapTarget for Projection {
    fn declared_class(&self) -> &Arc<ResourceClass> {
        &self.class
    }

    fn unmapped_data(&self) -> Option<&Unmapped> {
        self.unmapped.as_ref()
    }

    fn collection_scope(&self) -> Option<Iri> {
        self.collection.clone()
    }

    fn get(&self, attr: &str) -> Option<&AttributeValue> {
        self.values.get(attr)
    }

    fn set_loaded(&mut self, attr: &str, value: Option<AttributeValue>) {
        match value {
            Some(v) => {
                self.values.insert(attr.to_string(), v);
            }
            None => {
                self.values.remove(attr);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions<'a> {
    pub equivalent_predicates: Option<&'a EquivalentPredicates>,
    pub include_languages: bool,
    /// Restrict mapping to these attributes; `None` maps every declared one.
    pub attributes: Option<&'a [String]>,
}

/// Map the target's unmapped data onto its declared attributes.
pub fn map_attributes<T>(target: &mut T, schema: &Schema, options: &MapOptions<'_>) -> MapperResult<()>
where
    T: MapTarget + ?Sized,
{
    let class = target.declared_class().clone();
    let unmapped = target.unmapped_data().ok_or_else(|| {
        MapperError::configuration("map_attributes only works for instances with unmapped data")
    })?;
    let scope = target.collection_scope();

    let mut assignments = Vec::new();
    for def in class.attribute_defs() {
        if class.is_collection(def.name()) {
            continue;
        }
        if let Some(only) = options.attributes {
            if !only.iter().any(|a| a == def.name()) {
                continue;
            }
        }

        let predicate = def.predicate(scope.as_ref());
        let objects = gather_objects(unmapped, &predicate, options.equivalent_predicates);
        let value = if objects.is_empty() {
            empty_default(def)
        } else {
            Some(convert_objects(&objects, def, &class, schema, options.include_languages)?)
        };
        assignments.push((def.name().to_string(), value));
    }

    for (attr, value) in assignments {
        target.set_loaded(&attr, value);
    }
    Ok(())
}

fn gather_objects<'u>(
    unmapped: &'u Unmapped,
    predicate: &Iri,
    equivalents: Option<&EquivalentPredicates>,
) -> Vec<&'u Term> {
    if let Some(objects) = unmapped.get(predicate) {
        return objects.iter().collect();
    }
    let mut out: Vec<&Term> = Vec::new();
    if let Some(alternates) = equivalents.and_then(|eq| eq.get(predicate)) {
        for term in alternates.iter().filter_map(|p| unmapped.get(p)).flatten() {
            if !out.contains(&term) {
                out.push(term);
            }
        }
    }
    out
}

fn empty_default(def: &AttributeDef) -> Option<AttributeValue> {
    if def.is_list() {
        Some(AttributeValue::List(Vec::new()))
    } else {
        None
    }
}

fn convert_objects(
    objects: &[&Term],
    def: &AttributeDef,
    class: &ResourceClass,
    schema: &Schema,
    include_languages: bool,
) -> MapperResult<AttributeValue> {
    let tagged = include_languages
        && objects
            .iter()
            .any(|t| t.as_literal().and_then(|l| l.language()).is_some());

    if tagged {
        let mut by_lang: BTreeMap<Language, Vec<Value>> = BTreeMap::new();
        for term in objects {
            let lang = term
                .as_literal()
                .and_then(|l| l.language())
                .map(Language::tag)
                .unwrap_or(Language::None);
            by_lang.entry(lang).or_default().push(convert_term(term, def, class, schema)?);
        }
        return Ok(AttributeValue::ByLanguage(by_lang));
    }

    let mut values = objects
        .iter()
        .map(|t| convert_term(t, def, class, schema))
        .collect::<MapperResult<Vec<_>>>()?;

    if def.is_list() {
        Ok(AttributeValue::List(values))
    } else {
        Ok(AttributeValue::Single(values.swap_remove(0)))
    }
}

fn convert_term(term: &Term, def: &AttributeDef, class: &ResourceClass, schema: &Schema) -> MapperResult<Value> {
    if let (Range::Class(_), Term::Iri(iri)) = (def.range_of(), term) {
        if let Some(stub) = schema.range_object(class, def.name(), iri.clone())? {
            return Ok(Value::Resource(Box::new(stub)));
        }
    }
    Ok(Value::from_term(term))
}
