//! Funder record model.

use super::{HarvestedRecord, Identifiers, JsonRef, RecordValidationError};
use serde::{Deserialize, Serialize};

/// Canonical funding organization, keyed by its FundRef DOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunderRecord {
    #[serde(rename = "$schema")]
    pub schema: String,
    /// Bare DOI, e.g. `10.13039/501100000780`.
    pub doi: String,
    #[serde(default)]
    pub identifiers: Identifiers,
    pub name: String,
    /// Abbreviated names only; may be empty.
    #[serde(default)]
    pub acronyms: Vec<String>,
    /// Broader funder. May point at a funder not harvested yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<JsonRef>,
    /// ISO-3166 alpha-2.
    pub country: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub remote_created: Option<String>,
    #[serde(default)]
    pub remote_modified: Option<String>,
}

impl FunderRecord {
    /// First acronym, used as the funder's display name in grant identifiers.
    pub fn primary_acronym(&self) -> Option<&str> {
        self.acronyms.first().map(String::as_str)
    }
}

impl HarvestedRecord for FunderRecord {
    const PID_TYPE: &'static str = "frdoi";
    const NATURAL_KEY_FIELD: &'static str = "doi";

    fn natural_key(&self) -> &str {
        &self.doi
    }

    fn remote_modified(&self) -> Option<&str> {
        self.remote_modified.as_deref()
    }

    fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        if self.doi.trim().is_empty() {
            return Err(RecordValidationError::EmptyNaturalKey { field: "doi" });
        }
        if self.name.trim().is_empty() {
            return Err(RecordValidationError::EmptyField { field: "name" });
        }
        Ok(())
    }
}
