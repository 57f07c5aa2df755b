//! Mapper configuration loading and representation.
//!
//! Configuration comes from JSON or from environment variables:
//!
//! - `TRIPLEBIND_BASE_IRI`: namespace for class and id IRIs
//!   (default `http://data.example.org/`)
//! - `TRIPLEBIND_PREFIXES`: prefix vocabulary as `prefix=iri,prefix=iri`

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use triplebind_core::{AttributeDef, Iri, MapperResult, Namespaces, ResourceClass};
use triplebind_core::schema::ResourceClassBuilder;

pub const BASE_IRI_VAR: &str = "TRIPLEBIND_BASE_IRI";
pub const PREFIXES_VAR: &str = "TRIPLEBIND_PREFIXES";

const DEFAULT_BASE_IRI: &str = "http://data.example.org/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid prefix entry `{0}`; expected prefix=iri")]
    InvalidPrefix(String),

    #[error("base IRI `{0}` must end with `/` or `#`")]
    InvalidBaseIri(String),

    #[error("invalid JSON configuration: {0}")]
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapperConfig {
    #[serde(default = "default_base_iri")]
    pub base_iri: Iri,
    #[serde(default)]
    pub prefixes: BTreeMap<String, Iri>,
}

fn default_base_iri() -> Iri {
    Iri::new(DEFAULT_BASE_IRI)
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            base_iri: default_base_iri(),
            prefixes: BTreeMap::new(),
        }
    }
}

impl MapperConfig {
    /// Build from `(name, value)` pairs; unrelated variables are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            match name.as_ref() {
                BASE_IRI_VAR => config.base_iri = Iri::new(value.as_ref().trim()),
                PREFIXES_VAR => config.prefixes = parse_prefixes(value.as_ref())?,
                _ => {}
            }
        }
        config.check()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn load_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading mapper config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing mapper config {}", path.display()))
    }

    /// IRI for a class or id namespace under the base IRI.
    pub fn iri(&self, local: &str) -> Iri {
        self.base_iri.join(local)
    }

    pub fn namespaces(&self) -> Namespaces {
        self.prefixes
            .iter()
            .fold(Namespaces::new(), |ns, (prefix, iri)| ns.with(prefix.clone(), iri.clone()))
    }

    /// Resolve a `prefix:local` name, or pass an absolute IRI through.
    pub fn resolve(&self, name: &str) -> MapperResult<Iri> {
        self.namespaces().resolve(name)
    }

    /// Class builder whose type IRI is `local` under the base IRI.
    pub fn class(&self, name: &str, local: &str) -> ResourceClassBuilder {
        ResourceClass::builder(name, self.iri(local))
    }

    /// Attribute whose predicate is resolved through the prefix vocabulary.
    pub fn attribute(&self, name: &str, predicate: &str) -> MapperResult<AttributeDef> {
        AttributeDef::prefixed(name, predicate, &self.namespaces())
    }

    fn check(&self) -> Result<(), ConfigError> {
        let base = self.base_iri.as_str();
        if base.ends_with('/') || base.ends_with('#') {
            Ok(())
        } else {
            Err(ConfigError::InvalidBaseIri(base.to_string()))
        }
    }
}

fn parse_prefixes(raw: &str) -> Result<BTreeMap<String, Iri>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((prefix, iri)) if !prefix.trim().is_empty() && !iri.trim().is_empty() => {
                Ok((prefix.trim().to_string(), Iri::new(iri.trim())))
            }
            _ => Err(ConfigError::InvalidPrefix(entry.to_string())),
        })
        .collect()
}
