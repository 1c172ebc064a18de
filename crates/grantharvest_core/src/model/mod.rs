//! Canonical funder and grant records.
//!
//! # Responsibility
//! - Define the JSON shapes stored for funders and grants.
//! - Expose the natural key and change marker used by reconciliation.
//!
//! # Invariants
//! - `FunderRecord::doi` and `GrantRecord::internal_id` are natural keys.
//! - A `GrantRecord` always carries a resolved funder reference.
//! - `identifiers` is an open map; `None` entries are never minted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod funder;
pub mod grant;

/// Auxiliary identifier scheme -> value. Keys depend on the source.
pub type Identifiers = BTreeMap<String, Option<String>>;

/// JSON reference (`{"$ref": "<uri>"}`) to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRef {
    #[serde(rename = "$ref")]
    pub uri: String,
}

impl JsonRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Record kinds that can be reconciled against the record store.
pub trait HarvestedRecord: Serialize {
    /// PID type bound to the natural key.
    const PID_TYPE: &'static str;
    /// JSON field holding the natural key.
    const NATURAL_KEY_FIELD: &'static str;

    fn natural_key(&self) -> &str;
    fn remote_modified(&self) -> Option<&str>;
    fn identifiers(&self) -> &Identifiers;
    fn validate(&self) -> Result<(), RecordValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    EmptyNaturalKey { field: &'static str },
    EmptyField { field: &'static str },
    /// `internal_id` does not match `<funder_doi>::<code>`.
    InternalIdMismatch { expected: String, actual: String },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyNaturalKey { field } => write!(f, "natural key `{field}` is empty"),
            Self::EmptyField { field } => write!(f, "required field `{field}` is empty"),
            Self::InternalIdMismatch { expected, actual } => write!(
                f,
                "internal_id `{actual}` does not match funder and code (`{expected}`)"
            ),
        }
    }
}

impl Error for RecordValidationError {}
