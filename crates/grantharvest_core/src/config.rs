//! Harvest configuration.
//!
//! # Responsibility
//! - Hold every static input the pipeline needs: namespace tables, the fixed
//!   funder table, schema location and default sources.
//! - Load overrides from a JSON file.
//!
//! # Invariants
//! - One `HarvestConfig` is built per process and passed by reference.
//! - Values are never mutated by pipeline components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Prefix -> namespace URI table used for XML path lookups.
pub type NamespaceTable = BTreeMap<String, String>;

const FUNDREF_NAMESPACES: &[(&str, &str)] = &[
    ("dct", "http://purl.org/dc/terms/"),
    ("fref", "http://data.crossref.org/fundingdata/terms"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("skosxl", "http://www.w3.org/2008/05/skos-xl#"),
    (
        "svf",
        "http://data.crossref.org/fundingdata/xml/schema/grant/grant-1.2/",
    ),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
];

const OAIPMH_NAMESPACES: &[(&str, &str)] = &[
    ("dri", "http://www.driver-repository.eu/namespace/dri"),
    ("oaf", "http://namespace.openaire.eu/oaf"),
    ("oai", "http://www.openarchives.org/OAI/2.0/"),
];

const FIXED_FUNDERS: &[(&str, &str)] = &[
    ("aka_________::AKA", "http://dx.doi.org/10.13039/501100002341"),
    ("arc_________::ARC", "http://dx.doi.org/10.13039/501100000923"),
    ("ec__________::EC", "http://dx.doi.org/10.13039/501100000780"),
    ("ec__________::EC::FP7", "http://dx.doi.org/10.13039/501100004963"),
    (
        "ec__________::EC::H2020",
        "http://dx.doi.org/10.13039/501100007601",
    ),
    ("fct_________::FCT", "http://dx.doi.org/10.13039/501100001871"),
    ("fwf_________::FWF", "http://dx.doi.org/10.13039/501100002428"),
    ("irb_hr______::MSES", "http://dx.doi.org/10.13039/501100006588"),
    ("mestd_______::MESTD", "http://dx.doi.org/10.13039/501100004564"),
    ("nhmrc_______::NHMRC", "http://dx.doi.org/10.13039/501100000925"),
    ("nih_________::NIH", "http://dx.doi.org/10.13039/100000002"),
    ("nsf_________::NSF", "http://dx.doi.org/10.13039/100000001"),
    ("nwo_________::NWO", "http://dx.doi.org/10.13039/501100003246"),
    ("rcuk________::RCUK", "http://dx.doi.org/10.13039/501100000690"),
    ("sfi_________::SFI", "http://dx.doi.org/10.13039/501100001602"),
    ("snsf________::SNSF", "http://dx.doi.org/10.13039/501100001711"),
    (
        "tubitakf____::tubitak",
        "http://dx.doi.org/10.13039/501100004410",
    ),
    ("wt__________::WT", "http://dx.doi.org/10.13039/100004440"),
];

const GRANT_SETS: &[&str] = &[
    "ARCProjects",
    "ECProjects",
    "FCTProjects",
    "FWFProjects",
    "NHMRCProjects",
    "NSFProjects",
    "NWOProjects",
    "SFIProjects",
    "SNSFProjects",
    "WTProjects",
];

/// Static configuration for funder and grant harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Namespaces of the FundRef RDF/XML registry.
    pub fundref_namespaces: NamespaceTable,
    /// Namespaces of OpenAIRE OAI-PMH and DRI grant documents.
    pub oaipmh_namespaces: NamespaceTable,
    /// OpenAIRE funder code -> canonical funder DOI URL.
    pub fixed_funders: BTreeMap<String, String>,
    pub schemas_host: String,
    pub schemas_endpoint: String,
    pub funder_schema_file: String,
    pub grant_schema_file: String,
    /// Local FundRef registry file (`.rdf` or `.rdf.gz`).
    pub fundref_local_source: Option<PathBuf>,
    pub fundref_endpoint: String,
    /// Two-column `geonames_id,iso_code` file. Built-in table when `None`.
    pub country_code_source: Option<PathBuf>,
    /// Local SQLite grant store produced by the dumper.
    pub oai_local_source: Option<PathBuf>,
    pub oaipmh_endpoint: String,
    pub oaipmh_metadata_prefix: String,
    /// Set harvested by a single remote grant run.
    pub grants_set: String,
    /// Sets harvested, in order, by a harvest-all run.
    pub grants_sets: Vec<String>,
    /// Local JSON-lines grant dump (`.json`, `.jsonl` or gzip variants).
    pub jsonl_local_source: Option<PathBuf>,
    pub http_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            fundref_namespaces: table(FUNDREF_NAMESPACES),
            oaipmh_namespaces: table(OAIPMH_NAMESPACES),
            fixed_funders: table(FIXED_FUNDERS),
            schemas_host: "inveniosoftware.org".to_string(),
            schemas_endpoint: "/schemas".to_string(),
            funder_schema_file: "funders/funder-v1.0.0.json".to_string(),
            grant_schema_file: "grants/grant-v1.0.0.json".to_string(),
            fundref_local_source: None,
            fundref_endpoint: "http://dx.doi.org/10.13039/fundref_registry".to_string(),
            country_code_source: None,
            oai_local_source: None,
            oaipmh_endpoint: "http://api.openaire.eu/oai_pmh".to_string(),
            oaipmh_metadata_prefix: "oaf".to_string(),
            grants_set: "projects".to_string(),
            grants_sets: GRANT_SETS.iter().map(|set| (*set).to_string()).collect(),
            jsonl_local_source: None,
            http_timeout_secs: 60,
        }
    }
}

impl HarvestConfig {
    /// Loads configuration from a JSON file.
    ///
    /// Keys missing from the file keep their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::Json)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid config JSON: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
        }
    }
}

fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::HarvestConfig;

    #[test]
    fn default_holds_fixed_funder_table() {
        let config = HarvestConfig::default();
        assert_eq!(
            config.fixed_funders.get("ec__________::EC").map(String::as_str),
            Some("http://dx.doi.org/10.13039/501100000780")
        );
        assert_eq!(config.grants_set, "projects");
        assert!(config.oaipmh_namespaces.contains_key("dri"));
    }

    #[test]
    fn json_overrides_keep_missing_keys_at_default() {
        let config = HarvestConfig::from_json_str(
            r#"{"schemas_host": "example.org", "grants_sets": ["WTProjects"]}"#,
        )
        .unwrap();
        assert_eq!(config.schemas_host, "example.org");
        assert_eq!(config.grants_sets, vec!["WTProjects".to_string()]);
        assert_eq!(config.schemas_endpoint, "/schemas");
        assert!(!config.fixed_funders.is_empty());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(HarvestConfig::from_json_str("{not json").is_err());
    }
}
