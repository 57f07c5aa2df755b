//! Identifier synthesis strategies.
//!
//! A class names its instances in exactly one way:
//!
//! - [`NameWith::Id`]: the caller assigns the id; nothing is synthesized.
//! - [`NameWith::Attribute`]: the id is derived from one attribute's value.
//! - [`NameWith::Custom`]: a user function computes the id from the resource.

use core::fmt;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use crate::error::{MapperError, MapperResult};
use crate::resource::Resource;
use crate::schema::ResourceClass;
use crate::term::Iri;
use crate::value::AttributeValue;

/// Validation error key used when identity comes from a custom function.
pub const PROC_NAMING_KEY: &str = "proc_naming";

/// Validation error key for the literal identifier.
pub const ID_KEY: &str = "id";

type IdFn = dyn Fn(&Resource) -> Result<Iri, String> + Send + Sync;

/// Custom identifier function.
#[derive(Clone)]
pub struct IdGenerator(Arc<IdFn>);

impl IdGenerator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Resource) -> Result<Iri, String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn call(&self, resource: &Resource) -> Result<Iri, String> {
        (self.0)(resource)
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdGenerator(..)")
    }
}

/// Identity strategy of a resource class.
#[derive(Debug, Clone)]
pub enum NameWith {
    Id,
    Attribute(String),
    Custom(IdGenerator),
}

impl NameWith {
    pub fn attribute(name: impl Into<String>) -> Self {
        NameWith::Attribute(name.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Resource) -> Result<Iri, String> + Send + Sync + 'static,
    {
        NameWith::Custom(IdGenerator::new(f))
    }

    /// Time-ordered UUIDs (v7) under `prefix`.
    pub fn uuid(prefix: Iri) -> Self {
        NameWith::custom(move |_| Ok(prefix.join(&Uuid::now_v7().to_string())))
    }

    /// Key under which identity-related validation errors are recorded.
    pub fn identity_key(&self) -> &str {
        match self {
            NameWith::Id => ID_KEY,
            NameWith::Attribute(name) => name,
            NameWith::Custom(_) => PROC_NAMING_KEY,
        }
    }
}

/// Synthesize an identifier for `resource` according to its class strategy.
///
/// Does not cache anything; [`Resource::id`] is the caching entry point.
pub fn generate_id(resource: &Resource) -> MapperResult<Iri> {
    let class = resource.class();
    match class.name_with() {
        NameWith::Id => Err(MapperError::id_generation(
            ":id must be set if configured in name_with",
        )),
        NameWith::Attribute(attr) => match resource.get(attr) {
            Some(value) => id_from_unique_attribute(class, attr, value),
            None => Err(MapperError::id_generation(format!(
                "attribute `{attr}` used for naming `{}` is not set",
                class.name()
            ))),
        },
        NameWith::Custom(generator) => generator.call(resource).map_err(|msg| {
            MapperError::id_generation(format!("Problem with custom id generation: {msg}"))
        }),
    }
}

/// Deterministic id for a unique attribute value: the class id prefix
/// followed by the percent-encoded value.
pub fn id_from_unique_attribute(
    class: &ResourceClass,
    attr: &str,
    value: &AttributeValue,
) -> MapperResult<Iri> {
    let raw = match value {
        AttributeValue::Single(v) => v.to_plain_string(),
        AttributeValue::List(vs) if vs.len() == 1 => vs[0].to_plain_string(),
        _ => {
            return Err(MapperError::id_generation(format!(
                "attribute `{attr}` must hold exactly one value to name `{}`",
                class.name()
            )))
        }
    };
    if raw.is_empty() {
        return Err(MapperError::id_generation(format!(
            "attribute `{attr}` used for naming `{}` is empty",
            class.name()
        )));
    }
    Ok(class.id_prefix().join(&percent_encode(&raw)))
}

/// Unreserved characters pass through; everything else is escaped.
const ID_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Form-style encoding: spaces become `+`.
fn percent_encode(raw: &str) -> String {
    utf8_percent_encode(raw, ID_VALUE).to_string().replace("%20", "+")
}
