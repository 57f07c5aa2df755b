//! RDF terms and triples as exchanged with the graph store.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Well-known vocabulary IRIs.
pub mod vocab {
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

/// An absolute IRI.
///
/// No syntactic validation is performed beyond what callers choose to do; the
/// store is the authority on what it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a local name to this IRI (used as a namespace).
    pub fn join(&self, local: &str) -> Iri {
        Iri(format!("{}{}", self.0, local))
    }

    pub fn to_ntriples(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A literal: lexical form plus optional datatype or language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    lexical: String,
    datatype: Option<Iri>,
    language: Option<String>,
}

impl Literal {
    /// Plain (untagged, untyped) string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: Iri) -> Self {
        Self {
            lexical: value.into(),
            datatype: Some(datatype),
            language: None,
        }
    }

    /// Language-tagged literal. Tags are normalized to lowercase.
    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: value.into(),
            datatype: None,
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub fn datatype(&self) -> Option<&Iri> {
        self.datatype.as_ref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn to_ntriples(&self) -> String {
        let mut out = String::with_capacity(self.lexical.len() + 2);
        out.push('"');
        for c in self.lexical.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        if let Some(lang) = &self.language {
            out.push('@');
            out.push_str(lang);
        } else if let Some(dt) = &self.datatype {
            out.push_str("^^");
            out.push_str(&dt.to_ntriples());
        }
        out
    }
}

/// Any RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(Iri),
    /// Blank node label (without the `_:` prefix).
    Blank(String),
    Literal(Literal),
}

impl Term {
    pub fn is_identifier(&self) -> bool {
        matches!(self, Term::Iri(_) | Term::Blank(_))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn to_ntriples(&self) -> String {
        match self {
            Term::Iri(iri) => iri.to_ntriples(),
            Term::Blank(label) => format!("_:{label}"),
            Term::Literal(lit) => lit.to_ntriples(),
        }
    }
}

impl From<Iri> for Term {
    fn from(value: Iri) -> Self {
        Term::Iri(value)
    }
}

impl From<Literal> for Term {
    fn from(value: Literal) -> Self {
        Term::Literal(value)
    }
}

/// A subject/predicate/object statement. The graph is supplied separately
/// by the store operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Iri,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<Term>, predicate: Iri, object: impl Into<Term>) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }

    /// One N-Quads style line: `subject predicate object graph .` plus newline.
    pub fn to_nquad_line(&self, graph: &Iri) -> String {
        [
            self.subject.to_ntriples(),
            self.predicate.to_ntriples(),
            self.object.to_ntriples(),
            graph.to_ntriples(),
            ".\n".to_string(),
        ]
        .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escapes_quotes_and_newlines() {
        let lit = Literal::string("say \"hi\"\nnow");
        assert_eq!(lit.to_ntriples(), "\"say \\\"hi\\\"\\nnow\"");
    }

    #[test]
    fn language_tag_wins_over_datatype_in_ntriples() {
        let lit = Literal::lang("chat", "FR");
        assert_eq!(lit.language(), Some("fr"));
        assert_eq!(lit.to_ntriples(), "\"chat\"@fr");
    }

    #[test]
    fn nquad_line_has_graph_and_terminator() {
        let t = Triple::new(
            Iri::new("http://ex/s"),
            Iri::new("http://ex/p"),
            Literal::typed("5", Iri::new(vocab::XSD_INTEGER)),
        );
        let line = t.to_nquad_line(&Iri::new("http://ex/g"));
        assert_eq!(
            line,
            "<http://ex/s> <http://ex/p> \"5\"^^<http://www.w3.org/2001/XMLSchema#integer> <http://ex/g> .\n"
        );
    }
}
