//! Funder and grant readers and normalizers.
//!
//! # Responsibility
//! - Read funder registries and grant feeds from local files, SQLite grant
//!   stores and remote endpoints.
//! - Convert raw records into canonical `FunderRecord`/`GrantRecord` values.
//!
//! # Invariants
//! - Every reader yields records lazily, in source order, one at a time.
//! - Each `iter_*` call starts a fresh traversal with its own handle; the
//!   handle is released when the iterator ends or is dropped.
//! - Only `LoaderError::FunderNotFound` is recoverable; feed readers skip
//!   and log it, single conversions return it.

use crate::db::DbError;
use crate::repo::record_repo::RepoError;
use crate::resolver::{CountryLookupError, CountryTableError};
use crate::xml::XmlError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub mod funder;
pub mod grant;
pub mod grant_jsonl;
pub mod grant_local;
pub mod grant_remote;
pub mod source;

pub use crate::model::grant::GrantRecord;

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Lazy sequence of grant items produced by one traversal.
pub type GrantIter<'s> = Box<dyn Iterator<Item = LoaderResult<GrantItem>> + 's>;

/// Shape requested from a grant reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutput {
    /// Normalized `GrantRecord`s.
    Canonical,
    /// Raw grant XML, untouched.
    RawXml,
}

impl GrantOutput {
    /// Row format tag used by the SQLite grant store.
    pub fn format_tag(self) -> &'static str {
        match self {
            Self::Canonical => "json",
            Self::RawXml => "xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantItem {
    Canonical(GrantRecord),
    RawXml(String),
}

impl GrantItem {
    pub fn into_canonical(self) -> Option<GrantRecord> {
        match self {
            Self::Canonical(grant) => Some(grant),
            Self::RawXml(_) => None,
        }
    }
}

/// Diagnostics for a feed item dropped because its funder did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGrant {
    pub oai_id: Option<String>,
    pub funder_id: Option<String>,
    pub subfunder_id: Option<String>,
}

/// A source of grant records.
pub trait GrantSource {
    /// Starts a new traversal of the source.
    fn iter_grants(&self, output: GrantOutput) -> LoaderResult<GrantIter<'_>>;

    /// Items skipped during the most recent traversal.
    fn skipped(&self) -> Vec<SkippedGrant> {
        Vec::new()
    }
}

#[derive(Debug)]
pub enum LoaderError {
    Io {
        context: String,
        source: std::io::Error,
    },
    /// Transport failure; never retried at this layer.
    Http {
        url: String,
        message: String,
    },
    Xml(XmlError),
    Json(serde_json::Error),
    Db(DbError),
    /// Persisted-funder lookup failed.
    Repo(RepoError),
    CountryTable(CountryTableError),
    MissingCountry {
        funder_doi: String,
    },
    Country {
        funder_doi: String,
        source: CountryLookupError,
    },
    /// All funder resolution strategies missed.
    FunderNotFound {
        oai_id: Option<String>,
        funder_id: Option<String>,
        subfunder_id: Option<String>,
    },
    /// The grant names no funder and the funder record is not stored yet.
    FundersNotLoaded {
        funder_doi: String,
    },
    /// A JSON row or source cannot produce raw XML.
    FormatMismatch {
        format: String,
    },
    /// Grant XML root matched no registered layout.
    UnknownLayout {
        root: String,
    },
    MalformedRecord(String),
    InvalidSource(String),
    /// OAI-PMH error response other than `noRecordsMatch`.
    Protocol {
        code: String,
        message: String,
    },
}

impl LoaderError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context: path.display().to_string(),
            source,
        }
    }

    /// Whether a feed reader may skip the item and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FunderNotFound { .. })
    }

    pub(crate) fn skipped_grant(&self) -> Option<SkippedGrant> {
        match self {
            Self::FunderNotFound {
                oai_id,
                funder_id,
                subfunder_id,
            } => Some(SkippedGrant {
                oai_id: oai_id.clone(),
                funder_id: funder_id.clone(),
                subfunder_id: subfunder_id.clone(),
            }),
            _ => None,
        }
    }
}

impl Display for LoaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { context, source } => write!(f, "i/o error on `{context}`: {source}"),
            Self::Http { url, message } => write!(f, "fetch of `{url}` failed: {message}"),
            Self::Xml(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "invalid json: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::CountryTable(err) => write!(f, "{err}"),
            Self::MissingCountry { funder_doi } => {
                write!(f, "funder `{funder_doi}` has no country reference")
            }
            Self::Country { funder_doi, source } => {
                write!(f, "funder `{funder_doi}`: {source}")
            }
            Self::FunderNotFound {
                oai_id,
                funder_id,
                subfunder_id,
            } => write!(
                f,
                "funder not found for grant (oai_id={}, funder_id={}, subfunder_id={})",
                oai_id.as_deref().unwrap_or("-"),
                funder_id.as_deref().unwrap_or("-"),
                subfunder_id.as_deref().unwrap_or("-")
            ),
            Self::FundersNotLoaded { funder_doi } => write!(
                f,
                "funder `{funder_doi}` is not loaded; load funders before loading grants"
            ),
            Self::FormatMismatch { format } => {
                write!(f, "cannot produce raw xml from a `{format}` grant row")
            }
            Self::UnknownLayout { root } => {
                write!(f, "unrecognized grant xml layout with root `{root}`")
            }
            Self::MalformedRecord(message) => write!(f, "malformed record: {message}"),
            Self::InvalidSource(message) => write!(f, "invalid source: {message}"),
            Self::Protocol { code, message } => {
                write!(f, "oai-pmh error `{code}`: {message}")
            }
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Xml(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::CountryTable(err) => Some(err),
            Self::Country { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<XmlError> for LoaderError {
    fn from(value: XmlError) -> Self {
        Self::Xml(value)
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<DbError> for LoaderError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LoaderError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RepoError> for LoaderError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CountryTableError> for LoaderError {
    fn from(value: CountryTableError) -> Self {
        Self::CountryTable(value)
    }
}
