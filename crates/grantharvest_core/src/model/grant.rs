//! Grant record model.

use super::{HarvestedRecord, Identifiers, JsonRef, RecordValidationError};
use crate::resolver::strip_doi_host;
use serde::{Deserialize, Serialize};

/// Canonical funded project, keyed by `<funder_doi>::<code>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub internal_id: String,
    /// `oaf`, `eurepo` and `purl` for harvested grants.
    #[serde(default)]
    pub identifiers: Identifiers,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub acronym: Option<String>,
    #[serde(default)]
    pub startdate: Option<String>,
    #[serde(default)]
    pub enddate: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Funding stream / sub-programme name.
    #[serde(default)]
    pub program: Option<String>,
    pub funder: JsonRef,
    #[serde(default)]
    pub remote_modified: Option<String>,
}

impl GrantRecord {
    /// Builds the natural key shared by every grant source.
    pub fn make_internal_id(funder_doi: &str, code: &str) -> String {
        format!("{funder_doi}::{code}")
    }

    pub fn funder_doi(&self) -> String {
        strip_doi_host(&self.funder.uri)
    }
}

impl HarvestedRecord for GrantRecord {
    const PID_TYPE: &'static str = "grant";
    const NATURAL_KEY_FIELD: &'static str = "internal_id";

    fn natural_key(&self) -> &str {
        &self.internal_id
    }

    fn remote_modified(&self) -> Option<&str> {
        self.remote_modified.as_deref()
    }

    fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        if self.internal_id.trim().is_empty() {
            return Err(RecordValidationError::EmptyNaturalKey {
                field: "internal_id",
            });
        }
        if self.funder.uri.trim().is_empty() {
            return Err(RecordValidationError::EmptyField { field: "funder" });
        }
        let expected = Self::make_internal_id(&self.funder_doi(), &self.code);
        if expected != self.internal_id {
            return Err(RecordValidationError::InternalIdMismatch {
                expected,
                actual: self.internal_id.clone(),
            });
        }
        Ok(())
    }
}
