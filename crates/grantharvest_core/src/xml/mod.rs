//! Namespace-aware XML element tree.
//!
//! # Responsibility
//! - Parse funder registries and grant records into an owned element tree.
//! - Answer prefixed path queries against a caller-supplied namespace table.
//! - Serialize subtrees back into standalone XML documents.
//!
//! # Invariants
//! - Elements keep their resolved namespace URI; path lookups compare URIs,
//!   never the prefix spelled in the source document.
//! - Whitespace-only text nodes are dropped at parse time.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod tree;

pub use tree::{parse_document, XmlAttribute, XmlElement, XmlNode};

pub type XmlResult<T> = Result<T, XmlError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// Tokenizer or syntax failure reported by the parser.
    Parse(String),
    /// A prefix was used without a matching `xmlns` declaration.
    UnknownPrefix(String),
    /// Input ended while `element` was still open.
    UnexpectedEof { element: String },
    EmptyDocument,
    MultipleRoots,
    Write(String),
}

impl Display for XmlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "xml parse error: {message}"),
            Self::UnknownPrefix(prefix) => write!(f, "undeclared xml prefix `{prefix}`"),
            Self::UnexpectedEof { element } => {
                write!(f, "xml input ended inside element `{element}`")
            }
            Self::EmptyDocument => write!(f, "xml document has no root element"),
            Self::MultipleRoots => write!(f, "xml document has more than one root element"),
            Self::Write(message) => write!(f, "xml write error: {message}"),
        }
    }
}

impl Error for XmlError {}
