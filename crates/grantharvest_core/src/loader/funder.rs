//! FundRef registry reading and funder normalization.
//!
//! # Responsibility
//! - Load the FundRef RDF/XML registry from a local file or a remote URL.
//! - Convert each `skos:Concept` into a canonical `FunderRecord`.
//!
//! # Invariants
//! - Only labels flagged as abbreviated names become acronyms.
//! - Country resolution failures are hard failures; traversal stops after
//!   the first error.

use super::source::{read_local_to_string, HttpFetch, ReqwestFetcher};
use super::{LoaderError, LoaderResult};
use crate::config::{HarvestConfig, NamespaceTable};
use crate::model::funder::FunderRecord;
use crate::model::{Identifiers, JsonRef};
use crate::resolver::{
    strip_doi_host, CountryCodeResolver, FunderIdentityResolver, SchemaUrlFormatter,
};
use crate::xml::{parse_document, XmlElement};
use log::{error, info};
use std::path::Path;
use std::time::Instant;

/// `fref:usageFlag` value marking an abbreviated-name label.
pub const ABBREV_NAME_FLAG: &str = "http://data.crossref.org/fundingdata/vocabulary/abbrevName";

const RDF_ACCEPT: &str = "application/rdf+xml";

/// Parsed FundRef registry document.
#[derive(Debug, Clone)]
pub struct FunderDocument {
    root: XmlElement,
    origin: String,
}

impl FunderDocument {
    pub fn from_xml_str(xml: &str, origin: impl Into<String>) -> LoaderResult<Self> {
        Ok(Self {
            root: parse_document(xml)?,
            origin: origin.into(),
        })
    }

    /// Reads a local registry file; `.gz` files are decompressed.
    pub fn open_local(path: &Path) -> LoaderResult<Self> {
        let started_at = Instant::now();
        let xml = read_local_to_string(path)?;
        let document = Self::from_xml_str(&xml, path.display().to_string())?;
        info!(
            "event=funder_source_open module=loader status=ok source=local path={} duration_ms={}",
            path.display(),
            started_at.elapsed().as_millis()
        );
        Ok(document)
    }

    /// Fetches the registry over HTTP, asking for RDF/XML.
    pub fn fetch_remote(fetcher: &dyn HttpFetch, url: &str) -> LoaderResult<Self> {
        let started_at = Instant::now();
        let xml = fetcher.get_text(url, RDF_ACCEPT).inspect_err(|err| {
            error!(
                "event=funder_source_open module=loader status=error source=remote url={url} error={err}"
            );
        })?;
        let document = Self::from_xml_str(&xml, url)?;
        info!(
            "event=funder_source_open module=loader status=ok source=remote url={url} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(document)
    }

    /// Local source when configured, remote endpoint otherwise.
    pub fn open_default(config: &HarvestConfig) -> LoaderResult<Self> {
        match &config.fundref_local_source {
            Some(path) => Self::open_local(path),
            None => {
                let fetcher = ReqwestFetcher::from_config(config)?;
                Self::fetch_remote(&fetcher, &config.fundref_endpoint)
            }
        }
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Converts FundRef concepts into funder records.
pub struct FunderNormalizer<'a> {
    namespaces: &'a NamespaceTable,
    countries: &'a CountryCodeResolver,
    identities: FunderIdentityResolver,
    schema: SchemaUrlFormatter,
}

impl<'a> FunderNormalizer<'a> {
    pub fn new(config: &'a HarvestConfig, countries: &'a CountryCodeResolver) -> Self {
        Self {
            namespaces: &config.fundref_namespaces,
            countries,
            identities: FunderIdentityResolver::from_config(config),
            schema: SchemaUrlFormatter::funder(config),
        }
    }

    /// Lazily converts every top-level concept of `document`, in order.
    pub fn iter_funders<'s>(&'s self, document: &'s FunderDocument) -> FunderIter<'s> {
        let concepts = document.root().find_all("skos:Concept", self.namespaces);
        info!(
            "event=funder_load module=loader status=start origin={} concepts={}",
            document.origin(),
            concepts.len()
        );
        FunderIter {
            normalizer: self,
            concepts: concepts.into_iter(),
            stopped: false,
        }
    }

    /// Converts one `skos:Concept` element.
    pub fn concept_to_funder(&self, node: &XmlElement) -> LoaderResult<FunderRecord> {
        let ns = self.namespaces;
        let about = node.attribute("rdf:about", ns).ok_or_else(|| {
            LoaderError::MalformedRecord("funder concept has no rdf:about".to_string())
        })?;
        let doi = strip_doi_host(about);

        let name = node
            .text_at("skosxl:prefLabel/skosxl:Label/skosxl:literalForm", ns)
            .ok_or_else(|| {
                LoaderError::MalformedRecord(format!("funder `{doi}` has no preferred label"))
            })?;

        let acronyms = node
            .find_all("skosxl:altLabel/skosxl:Label", ns)
            .into_iter()
            .filter(|label| {
                label
                    .find_all("fref:usageFlag", ns)
                    .iter()
                    .any(|flag| flag.attribute("rdf:resource", ns) == Some(ABBREV_NAME_FLAG))
            })
            .filter_map(|label| label.text_at("skosxl:literalForm", ns))
            .collect();

        let parent = node
            .find("skos:broader", ns)
            .and_then(|broader| broader.attribute("rdf:resource", ns))
            .map(JsonRef::new);

        let country_url = node
            .find("svf:country", ns)
            .and_then(|country| country.attribute("rdf:resource", ns))
            .ok_or_else(|| LoaderError::MissingCountry {
                funder_doi: doi.clone(),
            })?;
        let country = self
            .countries
            .resolve_by_url(country_url)
            .map_err(|source| LoaderError::Country {
                funder_doi: doi.clone(),
                source,
            })?
            .to_string();

        let mut identifiers = Identifiers::new();
        identifiers.insert(
            "oaf".to_string(),
            self.identities.resolve_by_doi(&doi).map(str::to_string),
        );

        Ok(FunderRecord {
            schema: self.schema.schema_url().to_string(),
            doi,
            identifiers,
            name,
            acronyms,
            parent,
            country,
            kind: node.text_at("svf:fundingBodyType", ns),
            subtype: node
                .text_at("svf:fundingBodySubType", ns)
                .map(|subtype| subtype.to_lowercase()),
            remote_created: node.text_at("dct:created", ns),
            remote_modified: node.text_at("dct:modified", ns),
        })
    }
}

/// Lazy funder traversal. Yields nothing after the first error.
pub struct FunderIter<'s> {
    normalizer: &'s FunderNormalizer<'s>,
    concepts: std::vec::IntoIter<&'s XmlElement>,
    stopped: bool,
}

impl Iterator for FunderIter<'_> {
    type Item = LoaderResult<FunderRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        let node = self.concepts.next()?;
        let result = self.normalizer.concept_to_funder(node);
        if let Err(err) = &result {
            self.stopped = true;
            error!("event=funder_load module=loader status=error error={err}");
        }
        Some(result)
    }
}
