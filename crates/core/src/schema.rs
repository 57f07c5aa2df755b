//! Resource class declarations and the schema registry.
//!
//! A [`ResourceClass`] is the static description the mapper works from: the
//! ordered attribute list, per-attribute predicate and range, the identity
//! strategy, optional collection scoping, and immutability. Declarations are
//! plain data built once at startup; nothing is synthesized at runtime.

use core::fmt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache::InstanceCache;
use crate::error::{MapperError, MapperResult};
use crate::naming::NameWith;
use crate::resource::Resource;
use crate::term::Iri;
use crate::value::{AttributeValue, Value};

pub use crate::naming::IdGenerator;

/// Native value kinds for scalar ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Any,
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Iri,
}

impl ScalarKind {
    /// Whether `value` is of this kind. Integers are accepted as floats.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ScalarKind::Any => true,
            ScalarKind::String => matches!(value, Value::String(_)),
            ScalarKind::Integer => matches!(value, Value::Integer(_)),
            ScalarKind::Float => matches!(value, Value::Float(_) | Value::Integer(_)),
            ScalarKind::Boolean => matches!(value, Value::Boolean(_)),
            ScalarKind::DateTime => matches!(value, Value::DateTime(_)),
            ScalarKind::Iri => matches!(value, Value::Iri(_)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScalarKind::Any => "any",
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Float => "float",
            ScalarKind::Boolean => "boolean",
            ScalarKind::DateTime => "dateTime",
            ScalarKind::Iri => "IRI",
        }
    }
}

/// Value range of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Range {
    Scalar(ScalarKind),
    /// Another registered resource class, by name.
    Class(String),
}

/// Declaration-level validation rules, enforced by
/// [`RuleEnforcer`](crate::validation::RuleEnforcer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Value must be present and non-empty.
    Existence,
    /// Value must be list-shaped.
    List,
}

/// How an attribute's predicate IRI is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateSource {
    Fixed(Iri),
    /// `collection_iri + local`, falling back to `fallback` when the resource
    /// has no collection in scope.
    CollectionScoped { local: String, fallback: Iri },
}

type ComputeFn = dyn Fn(&Resource) -> Option<AttributeValue> + Send + Sync;

/// Method-backed attribute value. Never stored, never loaded.
#[derive(Clone)]
pub struct Computed(Arc<ComputeFn>);

impl Computed {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Resource) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn compute(&self, resource: &Resource) -> Option<AttributeValue> {
        (self.0)(resource)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Computed(..)")
    }
}

/// One declared attribute.
#[derive(Debug, Clone)]
pub struct AttributeDef {
    name: String,
    predicate: PredicateSource,
    list: bool,
    range: Range,
    rules: Vec<Rule>,
    computed: Option<Computed>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, predicate: Iri) -> Self {
        Self {
            name: name.into(),
            predicate: PredicateSource::Fixed(predicate),
            list: false,
            range: Range::Scalar(ScalarKind::Any),
            rules: Vec::new(),
            computed: None,
        }
    }

    /// Attribute whose predicate is a `prefix:local` name (or an absolute
    /// IRI) resolved against `namespaces`.
    pub fn prefixed(name: impl Into<String>, predicate: &str, namespaces: &Namespaces) -> MapperResult<Self> {
        Ok(Self::new(name, namespaces.resolve(predicate)?))
    }

    /// Attribute whose predicate lives under the resource's collection IRI.
    pub fn collection_scoped(name: impl Into<String>, local: impl Into<String>, fallback: Iri) -> Self {
        let mut def = Self::new(name, fallback.clone());
        def.predicate = PredicateSource::CollectionScoped {
            local: local.into(),
            fallback,
        };
        def
    }

    /// Method-backed attribute; it has a placeholder predicate and is never
    /// persisted.
    pub fn computed<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Resource) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut def = Self::new(name.clone(), Iri::new(format!("urn:computed:{name}")));
        def.computed = Some(Computed::new(f));
        def
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn range(mut self, kind: ScalarKind) -> Self {
        self.range = Range::Scalar(kind);
        self
    }

    pub fn range_class(mut self, class_name: impl Into<String>) -> Self {
        self.range = Range::Class(class_name.into());
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn range_of(&self) -> &Range {
        &self.range
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn computed_value(&self) -> Option<&Computed> {
        self.computed.as_ref()
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    pub fn predicate(&self, collection_scope: Option<&Iri>) -> Iri {
        match (&self.predicate, collection_scope) {
            (PredicateSource::Fixed(iri), _) => iri.clone(),
            (PredicateSource::CollectionScoped { local, .. }, Some(scope)) => scope.join(local),
            (PredicateSource::CollectionScoped { fallback, .. }, None) => fallback.clone(),
        }
    }
}

/// Static description of a resource class.
#[derive(Debug, Clone)]
pub struct ResourceClass {
    name: String,
    rdf_type: Iri,
    id_prefix: Iri,
    attributes: Vec<AttributeDef>,
    name_with: NameWith,
    collection: Option<String>,
    immutable: bool,
    cache_instances: bool,
    enumeration: Option<Vec<String>>,
}

impl ResourceClass {
    pub fn builder(name: impl Into<String>, rdf_type: Iri) -> ResourceClassBuilder {
        ResourceClassBuilder::new(name.into(), rdf_type)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class IRI; also the default graph of instances without a collection.
    pub fn rdf_type(&self) -> &Iri {
        &self.rdf_type
    }

    pub fn id_prefix(&self) -> &Iri {
        &self.id_prefix
    }

    /// Stored attributes, in declaration order. Computed attributes are
    /// excluded.
    pub fn declared_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| !a.is_computed())
            .map(|a| a.name.as_str())
    }

    pub fn attribute_defs(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter().filter(|a| !a.is_computed())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(|a| !a.is_computed())
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(AttributeDef::is_computed)
    }

    pub fn is_list_valued(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(AttributeDef::is_list)
    }

    pub fn range(&self, name: &str) -> Option<&Range> {
        self.attribute(name).map(AttributeDef::range_of)
    }

    pub fn attribute_predicate(&self, name: &str, collection_scope: Option<&Iri>) -> Option<Iri> {
        self.attribute(name).map(|a| a.predicate(collection_scope))
    }

    pub fn name_with(&self) -> &NameWith {
        &self.name_with
    }

    pub fn collection_attribute(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_collection(&self, name: &str) -> bool {
        self.collection.as_deref() == Some(name)
    }

    /// Whether instances live in the process-wide instance cache.
    pub fn caches_instances(&self) -> bool {
        self.immutable && self.cache_instances
    }

    pub fn is_enum(&self) -> bool {
        self.enumeration.is_some()
    }

    pub fn enum_values(&self) -> &[String] {
        self.enumeration.as_deref().unwrap_or(&[])
    }
}

/// Builder for [`ResourceClass`].
#[derive(Debug)]
pub struct ResourceClassBuilder {
    class: ResourceClass,
}

impl ResourceClassBuilder {
    fn new(name: String, rdf_type: Iri) -> Self {
        let id_prefix = Iri::new(format!("{}/", rdf_type.as_str().trim_end_matches('/')));
        Self {
            class: ResourceClass {
                name,
                rdf_type,
                id_prefix,
                attributes: Vec::new(),
                name_with: NameWith::Id,
                collection: None,
                immutable: false,
                cache_instances: false,
                enumeration: None,
            },
        }
    }

    pub fn id_prefix(mut self, prefix: Iri) -> Self {
        self.class.id_prefix = prefix;
        self
    }

    pub fn attribute(mut self, def: AttributeDef) -> Self {
        self.class.attributes.push(def);
        self
    }

    pub fn name_with(mut self, name_with: NameWith) -> Self {
        self.class.name_with = name_with;
        self
    }

    pub fn collection(mut self, attribute: impl Into<String>) -> Self {
        self.class.collection = Some(attribute.into());
        self
    }

    /// Mark the class immutable; `cache_instances` keeps its full instance
    /// set in the process-wide cache.
    pub fn immutable(mut self, cache_instances: bool) -> Self {
        self.class.immutable = true;
        self.class.cache_instances = cache_instances;
        self
    }

    /// Enum class: a fixed value set, named through `name_with` attribute.
    /// Implies an immutable, cached class.
    pub fn enumeration(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.class.enumeration = Some(values.into_iter().map(Into::into).collect());
        self.class.immutable = true;
        self.class.cache_instances = true;
        self
    }

    pub fn build(self) -> MapperResult<ResourceClass> {
        let class = self.class;

        let mut seen = std::collections::HashSet::new();
        for attr in &class.attributes {
            if attr.name == crate::naming::ID_KEY {
                return Err(MapperError::configuration(format!(
                    "`{}` declares reserved attribute name `id`",
                    class.name
                )));
            }
            if !seen.insert(attr.name.as_str()) {
                return Err(MapperError::configuration(format!(
                    "`{}` declares attribute `{}` twice",
                    class.name, attr.name
                )));
            }
        }

        if let NameWith::Attribute(attr) = &class.name_with {
            if !class.is_declared(attr) {
                return Err(MapperError::configuration(format!(
                    "`{}` is named with undeclared attribute `{attr}`",
                    class.name
                )));
            }
        }

        if let Some(collection) = &class.collection {
            if !class.is_declared(collection) {
                return Err(MapperError::configuration(format!(
                    "Collection `{collection}` is not an attribute of `{}`",
                    class.name
                )));
            }
        }

        if class.enumeration.is_some() && !matches!(class.name_with, NameWith::Attribute(_)) {
            return Err(MapperError::configuration(format!(
                "enum class `{}` must be named with an attribute",
                class.name
            )));
        }

        Ok(class)
    }
}

/// Prefix vocabulary used to resolve `prefix:local` names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, Iri>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prefix: impl Into<String>, iri: Iri) -> Self {
        self.prefixes.insert(prefix.into(), iri);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, iri: Iri) {
        self.prefixes.insert(prefix.into(), iri);
    }

    pub fn get(&self, prefix: &str) -> Option<&Iri> {
        self.prefixes.get(prefix)
    }

    /// Resolve `prefix:local`. Absolute IRIs (containing `://` or starting
    /// with `urn:`) pass through unchanged.
    pub fn resolve(&self, name: &str) -> MapperResult<Iri> {
        if name.contains("://") || name.starts_with("urn:") {
            return Ok(Iri::new(name));
        }
        let (prefix, local) = name.split_once(':').ok_or_else(|| {
            MapperError::configuration(format!("`{name}` is neither an IRI nor a prefixed name"))
        })?;
        self.prefixes
            .get(prefix)
            .map(|ns| ns.join(local))
            .ok_or_else(|| {
                MapperError::configuration(format!("prefix vocabulary `{prefix}` not found"))
            })
    }
}

/// Registry of resource classes plus the instance caches of immutable
/// classes.
///
/// The schema is shared for the lifetime of the process (usually behind an
/// `Arc`), which makes its caches process-wide.
#[derive(Debug, Default)]
pub struct Schema {
    classes: HashMap<String, Arc<ResourceClass>>,
    caches: HashMap<String, InstanceCache>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ResourceClass) -> Arc<ResourceClass> {
        let name = class.name().to_string();
        if class.caches_instances() {
            self.caches.entry(name.clone()).or_default();
        }
        let class = Arc::new(class);
        self.classes.insert(name, class.clone());
        class
    }

    pub fn class(&self, name: &str) -> MapperResult<Arc<ResourceClass>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::configuration(format!("model `{name}` is not registered")))
    }

    pub fn instance_cache(&self, class_name: &str) -> Option<&InstanceCache> {
        self.caches.get(class_name)
    }

    /// Placeholder instance for a reference held by a class-ranged
    /// attribute: id set, persistent, nothing loaded.
    ///
    /// Returns `None` when the attribute is not class-ranged.
    pub fn range_object(
        &self,
        class: &ResourceClass,
        attr: &str,
        id: Iri,
    ) -> MapperResult<Option<Resource>> {
        match class.range(attr) {
            Some(Range::Class(range_name)) => {
                let range_class = self.class(range_name)?;
                Ok(Some(Resource::stub(range_class, id)))
            }
            _ => Ok(None),
        }
    }
}
