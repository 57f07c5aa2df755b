//! Typed attribute values and their conversion to and from RDF terms.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::{MapperError, MapperResult};
use crate::resource::Resource;
use crate::term::{vocab, Iri, Literal, Term};

/// A single attribute value.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// A literal whose datatype has no native representation.
    Typed(Literal),
    /// Opaque reference to another subject.
    Iri(Iri),
    /// Blank node reference (anonymous nested structure).
    Blank(String),
    /// Reference to a resource of a declared range class.
    Resource(Box<Resource>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Typed(a), Value::Typed(b)) => a == b,
            (Value::Iri(a), Value::Iri(b)) => a == b,
            (Value::Blank(a), Value::Blank(b)) => a == b,
            // Resources compare by identity: same class, same subject.
            (Value::Resource(a), Value::Resource(b)) => {
                a.class().name() == b.class().name() && a.peek_id() == b.peek_id()
            }
            _ => false,
        }
    }
}

impl Value {
    /// Unwrap a literal into its native value based on its datatype.
    pub fn from_literal(literal: &Literal) -> Value {
        let lexical = literal.lexical();
        let Some(datatype) = literal.datatype() else {
            return Value::String(lexical.to_string());
        };
        let parsed = match datatype.as_str() {
            vocab::XSD_STRING => Some(Value::String(lexical.to_string())),
            vocab::XSD_INTEGER | vocab::XSD_LONG | vocab::XSD_INT => {
                lexical.trim().parse().ok().map(Value::Integer)
            }
            vocab::XSD_DECIMAL | vocab::XSD_DOUBLE | vocab::XSD_FLOAT => {
                lexical.trim().parse().ok().map(Value::Float)
            }
            vocab::XSD_BOOLEAN => match lexical.trim() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            vocab::XSD_DATE_TIME => DateTime::parse_from_rfc3339(lexical.trim())
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            _ => None,
        };
        parsed.unwrap_or_else(|| Value::Typed(literal.clone()))
    }

    /// Convert a raw object term: literals are unwrapped, identifiers stay
    /// opaque references.
    pub fn from_term(term: &Term) -> Value {
        match term {
            Term::Iri(iri) => Value::Iri(iri.clone()),
            Term::Blank(label) => Value::Blank(label.clone()),
            Term::Literal(lit) => Value::from_literal(lit),
        }
    }

    /// Render as an object term, optionally language-tagged.
    ///
    /// Referenced resources must already carry an id.
    pub fn to_term(&self, language: Option<&str>) -> MapperResult<Term> {
        let term = match self {
            Value::String(s) => match language {
                Some(lang) => Literal::lang(s.clone(), lang).into(),
                None => Literal::string(s.clone()).into(),
            },
            Value::Integer(i) => Literal::typed(i.to_string(), Iri::new(vocab::XSD_INTEGER)).into(),
            Value::Float(f) => Literal::typed(f.to_string(), Iri::new(vocab::XSD_DOUBLE)).into(),
            Value::Boolean(b) => Literal::typed(b.to_string(), Iri::new(vocab::XSD_BOOLEAN)).into(),
            Value::DateTime(dt) => {
                Literal::typed(dt.to_rfc3339(), Iri::new(vocab::XSD_DATE_TIME)).into()
            }
            Value::Typed(lit) => lit.clone().into(),
            Value::Iri(iri) => iri.clone().into(),
            Value::Blank(label) => Term::Blank(label.clone()),
            Value::Resource(r) => match r.peek_id() {
                Some(id) => id.clone().into(),
                None => {
                    return Err(MapperError::configuration(format!(
                        "referenced `{}` resource has no id; save it before referencing it",
                        r.class().name()
                    )))
                }
            },
        };
        Ok(term)
    }

    /// The subject this value refers to, if it is a reference.
    pub fn reference(&self) -> Option<&Iri> {
        match self {
            Value::Iri(iri) => Some(iri),
            Value::Resource(r) => r.peek_id(),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_resource_mut(&mut self) -> Option<&mut Resource> {
        match self {
            Value::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Plain string form used for identifier derivation and attribute maps.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Typed(lit) => lit.lexical().to_string(),
            Value::Iri(iri) => iri.to_string(),
            Value::Blank(label) => format!("_:{label}"),
            Value::Resource(r) => r.peek_id().map(Iri::to_string).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Resource(r) => match r.peek_id() {
                Some(id) => JsonValue::String(id.to_string()),
                None => JsonValue::Null,
            },
            other => JsonValue::String(other.to_plain_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Iri> for Value {
    fn from(value: Iri) -> Self {
        Value::Iri(value)
    }
}

impl From<Resource> for Value {
    fn from(value: Resource) -> Self {
        Value::Resource(Box::new(value))
    }
}

/// Language bucket of a language-partitioned attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    /// Values carrying no language tag (including identifier values).
    None,
    Tag(String),
}

impl Language {
    pub fn tag(tag: impl Into<String>) -> Self {
        Language::Tag(tag.into().to_ascii_lowercase())
    }

    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Language::None => None,
            Language::Tag(t) => Some(t),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Language::None => "none",
            Language::Tag(t) => t,
        }
    }
}

/// The in-memory value of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Single(Value),
    List(Vec<Value>),
    ByLanguage(BTreeMap<Language, Vec<Value>>),
}

impl AttributeValue {
    pub fn list(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Single(_) => false,
            AttributeValue::List(v) => v.is_empty(),
            AttributeValue::ByLanguage(m) => m.values().all(Vec::is_empty),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, AttributeValue::List(_))
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            AttributeValue::Single(v) => Some(v),
            _ => None,
        }
    }

    /// Every value, paired with its language tag when partitioned.
    pub fn tagged_values(&self) -> Vec<(Option<&str>, &Value)> {
        match self {
            AttributeValue::Single(v) => vec![(None, v)],
            AttributeValue::List(vs) => vs.iter().map(|v| (None, v)).collect(),
            AttributeValue::ByLanguage(m) => m
                .iter()
                .flat_map(|(lang, vs)| vs.iter().map(move |v| (lang.as_tag(), v)))
                .collect(),
        }
    }

    pub fn values(&self) -> Vec<&Value> {
        self.tagged_values().into_iter().map(|(_, v)| v).collect()
    }

    pub fn values_mut(&mut self) -> Vec<&mut Value> {
        match self {
            AttributeValue::Single(v) => vec![v],
            AttributeValue::List(vs) => vs.iter_mut().collect(),
            AttributeValue::ByLanguage(m) => m.values_mut().flat_map(|vs| vs.iter_mut()).collect(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            AttributeValue::Single(v) => v.to_json(),
            AttributeValue::List(vs) => JsonValue::Array(vs.iter().map(Value::to_json).collect()),
            AttributeValue::ByLanguage(m) => JsonValue::Object(
                m.iter()
                    .map(|(lang, vs)| {
                        (
                            lang.key().to_string(),
                            JsonValue::Array(vs.iter().map(Value::to_json).collect()),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

macro_rules! impl_single_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(value: $t) -> Self {
                    AttributeValue::Single(value.into())
                }
            }
        )*
    };
}

impl_single_from!(Value, &str, String, i64, bool, f64, DateTime<Utc>, Iri, Resource);

impl From<Vec<Value>> for AttributeValue {
    fn from(value: Vec<Value>) -> Self {
        AttributeValue::List(value)
    }
}
