//! Validation protocol: per-attribute rule dispatch plus the uniqueness
//! check against the store.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{MapperError, MapperResult, StoreError};
use crate::naming::{self, NameWith};
use crate::resource::Resource;
use crate::schema::{AttributeDef, Range, ResourceClass, Rule};
use crate::term::Iri;
use crate::value::{AttributeValue, Value};

/// Rule name → message, for one attribute.
pub type AttributeErrors = BTreeMap<String, String>;

/// Validation errors keyed by attribute (or `id` / `proc_naming`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, AttributeErrors>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&AttributeErrors> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) {
        self.0
            .entry(key.into())
            .or_default()
            .insert(rule.into(), message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeErrors)> {
        self.0.iter()
    }

    fn merge_attribute(&mut self, key: &str, errors: AttributeErrors) {
        self.0.entry(key.to_string()).or_default().extend(errors);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, errors) in &self.0 {
            for (rule, message) in errors {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{key}.{rule}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Rule enforcement for one attribute value. `None` means valid.
pub trait Enforce {
    fn enforce(
        &self,
        resource: &Resource,
        attribute: &AttributeDef,
        value: Option<&AttributeValue>,
    ) -> Option<AttributeErrors>;
}

impl<F> Enforce for F
where
    F: Fn(&Resource, &AttributeDef, Option<&AttributeValue>) -> Option<AttributeErrors>,
{
    fn enforce(
        &self,
        resource: &Resource,
        attribute: &AttributeDef,
        value: Option<&AttributeValue>,
    ) -> Option<AttributeErrors> {
        self(resource, attribute, value)
    }
}

/// Enforces the [`Rule`]s declared on each attribute, plus range shape:
/// class-ranged attributes only hold references.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEnforcer;

impl Enforce for RuleEnforcer {
    fn enforce(
        &self,
        _resource: &Resource,
        attribute: &AttributeDef,
        value: Option<&AttributeValue>,
    ) -> Option<AttributeErrors> {
        let mut errors = AttributeErrors::new();
        let name = attribute.name();

        for rule in attribute.rules() {
            match rule {
                Rule::Existence => {
                    if value.is_none_or(AttributeValue::is_empty) {
                        errors.insert("existence".into(), format!("`{name}` value cannot be nil"));
                    }
                }
                Rule::List => {
                    if value.is_some_and(|v| !v.is_list()) {
                        errors.insert("list".into(), format!("`{name}` value must be a list"));
                    }
                }
            }
        }

        match (attribute.range_of(), value) {
            (Range::Class(range), Some(v)) => {
                let all_refs = v
                    .values()
                    .iter()
                    .all(|v| matches!(v, Value::Resource(_) | Value::Iri(_)));
                if !all_refs {
                    errors.insert(
                        "range".into(),
                        format!("`{name}` values must be instances of `{range}`"),
                    );
                }
            }
            (Range::Scalar(kind), Some(v)) => {
                if !v.values().iter().all(|v| kind.accepts(v)) {
                    errors.insert(
                        "range".into(),
                        format!("`{name}` values must be of type {}", kind.label()),
                    );
                }
            }
            (_, None) => {}
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }
}

/// Store-backed existence check used for the uniqueness probe.
pub trait ExistenceCheck {
    fn exists(&self, class: &ResourceClass, id: &Iri) -> Result<bool, StoreError>;
}

/// Why an existence probe could not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure(pub String);

/// Candidate id for checking pre-save duplication.
///
/// Derived strategies always compute a fresh candidate (the naming
/// attribute may have changed since the id was cached); nothing is cached.
/// `Ok(None)` means there is nothing to probe.
pub fn probe_id(resource: &Resource) -> Result<Option<Iri>, ProbeFailure> {
    match resource.class().name_with() {
        NameWith::Id => Ok(resource.peek_id().cloned()),
        NameWith::Attribute(_) | NameWith::Custom(_) => naming::generate_id(resource)
            .map(Some)
            .map_err(|err| ProbeFailure(err.to_string())),
    }
}

/// Probe whether a resource with the same identity already exists.
///
/// `Ok(Ok(Some(id)))` names the conflicting subject.
pub fn probe_existence(
    resource: &Resource,
    existence: &impl ExistenceCheck,
) -> MapperResult<Result<Option<Iri>, ProbeFailure>> {
    match probe_id(resource) {
        Ok(Some(id)) => {
            if existence.exists(resource.class(), &id)? {
                Ok(Ok(Some(id)))
            } else {
                Ok(Ok(None))
            }
        }
        Ok(None) => Ok(Ok(None)),
        Err(failure) => Ok(Err(failure)),
    }
}

impl Resource {
    /// Run every declared attribute through `enforcer`, then (for new
    /// resources) the uniqueness probe. Only `errors` is updated.
    ///
    /// Returns whether the resource is valid. Store failures during the
    /// probe propagate; identity misconfiguration is recorded instead.
    pub fn validate(
        &mut self,
        enforcer: &(impl Enforce + ?Sized),
        existence: &impl ExistenceCheck,
    ) -> MapperResult<bool> {
        let mut errors = ValidationErrors::default();
        let class = self.class().clone();

        for def in class.attribute_defs() {
            if let Some(attr_errors) = enforcer.enforce(self, def, self.get(def.name())) {
                errors.merge_attribute(def.name(), attr_errors);
            }
        }

        if !self.is_persistent() {
            let key = class.name_with().identity_key().to_string();
            if !errors.contains_key(&key) {
                match probe_existence(self, existence)? {
                    Ok(Some(id)) => errors.insert(
                        key.clone(),
                        "duplicate",
                        format!("There is already a persistent resource with id `{id}`"),
                    ),
                    Ok(None) => {}
                    Err(ProbeFailure(message)) => errors.insert(key.clone(), "existence", message),
                }
                if matches!(class.name_with(), NameWith::Id) && self.peek_id().is_none() {
                    errors.insert(
                        naming::ID_KEY,
                        "existence",
                        ":id must be set if configured in name_with",
                    );
                }
            }
        }

        let valid = errors.is_empty();
        self.set_errors(errors);
        Ok(valid)
    }

    /// Fail with [`MapperError::Validation`] unless the resource validates.
    pub fn ensure_valid(
        &mut self,
        enforcer: &(impl Enforce + ?Sized),
        existence: &impl ExistenceCheck,
    ) -> MapperResult<()> {
        if self.validate(enforcer, existence)? {
            Ok(())
        } else {
            Err(MapperError::Validation(self.errors().clone()))
        }
    }
}
