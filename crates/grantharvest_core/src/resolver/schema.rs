//! `$schema` URL formatting for canonical records.

use crate::config::HarvestConfig;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Host, endpoint and relative file of a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaParts<'a> {
    pub host: &'a str,
    pub endpoint: &'a str,
    pub file: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaUrlError {
    /// Both an absolute URL and schema parts were given.
    Ambiguous,
    /// Neither form was given.
    Missing,
}

impl Display for SchemaUrlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ambiguous => write!(f, "give either a schema file or a schema url, not both"),
            Self::Missing => write!(f, "a schema file or a schema url is required"),
        }
    }
}

impl Error for SchemaUrlError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaUrlFormatter {
    schema_url: String,
}

impl SchemaUrlFormatter {
    /// Builds the formatter from exactly one of the two accepted forms.
    pub fn try_new(
        parts: Option<SchemaParts<'_>>,
        schema_url: Option<&str>,
    ) -> Result<Self, SchemaUrlError> {
        match (parts, schema_url) {
            (Some(_), Some(_)) => Err(SchemaUrlError::Ambiguous),
            (None, None) => Err(SchemaUrlError::Missing),
            (Some(parts), None) => Ok(Self::from_parts(parts)),
            (None, Some(url)) => Ok(Self::from_url(url)),
        }
    }

    pub fn from_parts(parts: SchemaParts<'_>) -> Self {
        Self {
            schema_url: format!("http://{}{}/{}", parts.host, parts.endpoint, parts.file),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            schema_url: url.into(),
        }
    }

    pub fn funder(config: &HarvestConfig) -> Self {
        Self::from_parts(SchemaParts {
            host: &config.schemas_host,
            endpoint: &config.schemas_endpoint,
            file: &config.funder_schema_file,
        })
    }

    pub fn grant(config: &HarvestConfig) -> Self {
        Self::from_parts(SchemaParts {
            host: &config.schemas_host,
            endpoint: &config.schemas_endpoint,
            file: &config.grant_schema_file,
        })
    }

    pub fn schema_url(&self) -> &str {
        &self.schema_url
    }
}
