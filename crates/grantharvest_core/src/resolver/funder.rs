//! OpenAIRE funder code <-> FundRef DOI resolution.

use crate::config::HarvestConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

const DOI_URL_PREFIX: &str = "http://dx.doi.org/";
const OAI_DNET_PREFIX: &str = "oai:dnet:";

static DOI_HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://(dx\.)?doi\.org/").expect("valid doi host regex"));

/// Strips the resolver host from a DOI URL, leaving the bare DOI.
pub fn strip_doi_host(uri: &str) -> String {
    DOI_HOST_RE.replace(uri.trim(), "").into_owned()
}

/// Canonical funder URI for a bare DOI.
pub fn doi_url(doi: &str) -> String {
    format!("{DOI_URL_PREFIX}{}", strip_doi_host(doi))
}

/// Fixed table of funder codes to canonical funder URIs, with its inverse.
#[derive(Debug, Clone, Default)]
pub struct FunderIdentityResolver {
    by_code: BTreeMap<String, String>,
    by_doi: HashMap<String, String>,
}

impl FunderIdentityResolver {
    pub fn new(table: BTreeMap<String, String>) -> Self {
        let mut by_doi = HashMap::new();
        // BTreeMap order makes the inverse deterministic when URIs repeat.
        for (code, uri) in &table {
            by_doi
                .entry(strip_doi_host(uri))
                .or_insert_with(|| code.clone());
        }
        Self {
            by_code: table,
            by_doi,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.fixed_funders.clone())
    }

    /// Funder URI for an OpenAIRE funder or funding-stream id.
    pub fn resolve_by_id(&self, funder_id: &str) -> Option<&str> {
        self.by_code.get(funder_id).map(String::as_str)
    }

    /// Funder URI guessed from an OAI record id.
    ///
    /// `oai:dnet:nhmrc_______::abc` -> `nhmrc_______::NHMRC`. Used when a
    /// record carries no funding tree.
    pub fn resolve_by_oai_record_id(&self, oai_id: &str) -> Option<&str> {
        let oai_id = oai_id.strip_prefix(OAI_DNET_PREFIX).unwrap_or(oai_id);
        let prefix = oai_id.split("::").next()?;
        if prefix.is_empty() {
            return None;
        }
        let suffix = prefix.replace('_', "").to_uppercase();
        self.resolve_by_id(&format!("{prefix}::{suffix}"))
    }

    /// Funder code for a funder URI or bare DOI.
    pub fn resolve_by_doi(&self, uri: &str) -> Option<&str> {
        self.by_doi.get(&strip_doi_host(uri)).map(String::as_str)
    }

    /// `(code, uri)` of the top-level funder whose code ends in `::<short_name>`.
    ///
    /// Case-insensitive; funding-stream codes (`EC::FP7`) never match.
    pub fn resolve_by_short_name(&self, short_name: &str) -> Option<(&str, &str)> {
        let short_name = short_name.trim();
        if short_name.is_empty() {
            return None;
        }
        self.by_code
            .iter()
            .find(|(code, _)| {
                code.split_once("::")
                    .is_some_and(|(_, rest)| rest.eq_ignore_ascii_case(short_name))
            })
            .map(|(code, uri)| (code.as_str(), uri.as_str()))
    }
}
