//! Grant normalization from OpenAIRE XML and JSON-lines rows.
//!
//! # Responsibility
//! - Detect the XML layout of a grant record and extract its fields.
//! - Resolve the grant's funder and derive `internal_id` and identifiers.
//!
//! # Invariants
//! - Funder resolution order: funding-stream id, funder id, OAI record id.
//! - `internal_id` is always `<funder_doi>::<code>`.
//! - When the record names no funder, the persisted funder's primary acronym
//!   is used; a missing funder record is `FundersNotLoaded`.

use super::{LoaderError, LoaderResult};
use crate::config::{HarvestConfig, NamespaceTable};
use crate::model::funder::FunderRecord;
use crate::model::grant::GrantRecord;
use crate::model::{Identifiers, JsonRef};
use crate::repo::record_repo::RepoError;
use crate::resolver::{strip_doi_host, FunderIdentityResolver, SchemaUrlFormatter};
use crate::xml::{parse_document, XmlElement};
use serde::Deserialize;

const PURL_PREFIX: &str = "http://purl.org/";

/// Read access to funders that have already been stored.
pub trait FunderLookup {
    fn funder_by_doi(&self, doi: &str) -> Result<Option<FunderRecord>, RepoError>;
}

/// Where the fields of one grant XML layout live.
#[derive(Clone)]
pub struct GrantXmlLayout {
    pub name: String,
    /// Returns whether a document root uses this layout.
    pub sniff: fn(&XmlElement, &NamespaceTable) -> bool,
    /// Record id candidates, first non-empty wins.
    pub identifier_paths: Vec<String>,
    pub modified_path: String,
    pub project_path: String,
}

impl std::fmt::Debug for GrantXmlLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantXmlLayout")
            .field("name", &self.name)
            .field("project_path", &self.project_path)
            .finish_non_exhaustive()
    }
}

impl GrantXmlLayout {
    /// OAI-PMH `record` root, as served by the OpenAIRE endpoint.
    pub fn oai_pmh() -> Self {
        Self {
            name: "oai".to_string(),
            sniff: |root, ns| root.matches("oai:record", ns),
            identifier_paths: vec![
                "oai:header/dri:objIdentifier".to_string(),
                "oai:header/oai:identifier".to_string(),
            ],
            modified_path: "oai:header/dri:dateOfTransformation".to_string(),
            project_path: "oai:metadata/oaf:entity/oaf:project".to_string(),
        }
    }

    /// Namespace-less `record` root used by the OpenAIRE search API.
    pub fn dri_result() -> Self {
        Self {
            name: "dri".to_string(),
            sniff: |root, ns| root.matches("record", ns),
            identifier_paths: vec!["result/header/dri:objIdentifier".to_string()],
            modified_path: "result/header/dri:dateOfTransformation".to_string(),
            project_path: "result/metadata/oaf:entity/oaf:project".to_string(),
        }
    }
}

/// Ordered set of known layouts; the first sniffer that accepts a root wins.
#[derive(Debug, Clone)]
pub struct GrantLayoutRegistry {
    layouts: Vec<GrantXmlLayout>,
}

impl Default for GrantLayoutRegistry {
    fn default() -> Self {
        Self {
            layouts: vec![GrantXmlLayout::oai_pmh(), GrantXmlLayout::dri_result()],
        }
    }
}

impl GrantLayoutRegistry {
    pub fn register(&mut self, layout: GrantXmlLayout) {
        self.layouts.push(layout);
    }

    pub fn detect(
        &self,
        root: &XmlElement,
        namespaces: &NamespaceTable,
    ) -> Option<&GrantXmlLayout> {
        self.layouts
            .iter()
            .find(|layout| (layout.sniff)(root, namespaces))
    }
}

/// Fields shared by every grant source before funder-dependent derivation.
struct GrantFields {
    oai_id: Option<String>,
    code: String,
    title: String,
    acronym: Option<String>,
    startdate: Option<String>,
    enddate: Option<String>,
    url: Option<String>,
    program: Option<String>,
    funder_name: Option<String>,
    remote_modified: Option<String>,
}

/// Converts raw grant records into `GrantRecord`s.
pub struct GrantNormalizer<'a> {
    namespaces: &'a NamespaceTable,
    identities: FunderIdentityResolver,
    schema: SchemaUrlFormatter,
    layouts: GrantLayoutRegistry,
    funders: Option<&'a dyn FunderLookup>,
}

impl<'a> GrantNormalizer<'a> {
    pub fn new(config: &'a HarvestConfig) -> Self {
        Self {
            namespaces: &config.oaipmh_namespaces,
            identities: FunderIdentityResolver::from_config(config),
            schema: SchemaUrlFormatter::grant(config),
            layouts: GrantLayoutRegistry::default(),
            funders: None,
        }
    }

    /// Enables the persisted-funder fallback for records without a funder
    /// short name.
    pub fn with_funder_lookup(mut self, funders: &'a dyn FunderLookup) -> Self {
        self.funders = Some(funders);
        self
    }

    pub fn with_layouts(mut self, layouts: GrantLayoutRegistry) -> Self {
        self.layouts = layouts;
        self
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        self.namespaces
    }

    /// Parses and converts one grant XML document.
    pub fn xml_to_grant(&self, raw_xml: &str) -> LoaderResult<GrantRecord> {
        let root = parse_document(raw_xml)?;
        self.element_to_grant(&root)
    }

    /// Converts an already parsed grant record element.
    pub fn element_to_grant(&self, root: &XmlElement) -> LoaderResult<GrantRecord> {
        let ns = self.namespaces;
        let layout = self
            .layouts
            .detect(root, ns)
            .ok_or_else(|| LoaderError::UnknownLayout {
                root: root.qualified_name(),
            })?;
        let project = root.find(&layout.project_path, ns).ok_or_else(|| {
            LoaderError::MalformedRecord(format!(
                "{} grant record has no project element",
                layout.name
            ))
        })?;

        let oai_id = layout
            .identifier_paths
            .iter()
            .find_map(|path| root.text_at(path, ns));
        let code = project.text_at("code", ns).ok_or_else(|| {
            LoaderError::MalformedRecord(format!(
                "grant `{}` has no code",
                oai_id.as_deref().unwrap_or("-")
            ))
        })?;

        let funder_node = project.find("fundingtree/funder", ns);
        let stream_node = project.find("fundingtree/funding_level_0", ns);
        let funder_id = funder_node.and_then(|node| node.text_at("id", ns));
        let subfunder_id = stream_node.and_then(|node| node.text_at("id", ns));

        let funder_uri = self.resolve_funder_uri(
            oai_id.as_deref(),
            funder_id.as_deref(),
            subfunder_id.as_deref(),
        )?;

        let fields = GrantFields {
            code,
            title: project.text_at("title", ns).unwrap_or_default(),
            acronym: project.text_at("acronym", ns),
            startdate: project.text_at("startdate", ns),
            enddate: project.text_at("enddate", ns),
            url: project.text_at("websiteurl", ns),
            program: stream_node.and_then(|node| node.text_at("name", ns)),
            funder_name: funder_node.and_then(|node| node.text_at("shortname", ns)),
            remote_modified: root.text_at(&layout.modified_path, ns),
            oai_id,
        };
        self.build_record(fields, funder_uri)
    }

    /// Converts one JSON-lines grant row.
    ///
    /// The funder is derived per row from `funding[0].shortName`.
    pub fn json_to_grant(&self, line: &str) -> LoaderResult<GrantRecord> {
        let row: JsonGrantRow = serde_json::from_str(line)?;
        let funding = row.funding.into_iter().next().unwrap_or_default();
        let stream = funding.funding_stream.unwrap_or_default();
        let short_name = funding.short_name.filter(|name| !name.trim().is_empty());

        let funder_uri = short_name
            .as_deref()
            .and_then(|name| self.identities.resolve_by_short_name(name))
            .map(|(_, uri)| uri.to_string())
            .ok_or_else(|| LoaderError::FunderNotFound {
                oai_id: row.id.clone(),
                funder_id: short_name.clone(),
                subfunder_id: stream.id.clone(),
            })?;

        let fields = GrantFields {
            oai_id: row.id,
            code: row
                .code
                .filter(|code| !code.trim().is_empty())
                .ok_or_else(|| LoaderError::MalformedRecord("grant row has no code".to_string()))?,
            title: row.title.unwrap_or_default(),
            acronym: non_empty(row.acronym),
            startdate: non_empty(row.startdate),
            enddate: non_empty(row.enddate),
            url: non_empty(row.websiteurl),
            program: non_empty(stream.description),
            funder_name: short_name,
            remote_modified: row.lastupdatetimestamp.and_then(json_scalar_to_string),
        };
        self.build_record(fields, funder_uri)
    }

    fn resolve_funder_uri(
        &self,
        oai_id: Option<&str>,
        funder_id: Option<&str>,
        subfunder_id: Option<&str>,
    ) -> LoaderResult<String> {
        subfunder_id
            .and_then(|id| self.identities.resolve_by_id(id))
            .or_else(|| funder_id.and_then(|id| self.identities.resolve_by_id(id)))
            .or_else(|| oai_id.and_then(|id| self.identities.resolve_by_oai_record_id(id)))
            .map(str::to_string)
            .ok_or_else(|| LoaderError::FunderNotFound {
                oai_id: oai_id.map(str::to_string),
                funder_id: funder_id.map(str::to_string),
                subfunder_id: subfunder_id.map(str::to_string),
            })
    }

    /// Display name of a funder the record itself does not name.
    fn stored_funder_name(&self, funder_doi: &str) -> LoaderResult<String> {
        let not_loaded = || LoaderError::FundersNotLoaded {
            funder_doi: funder_doi.to_string(),
        };
        let funders = self.funders.ok_or_else(not_loaded)?;
        let funder = funders.funder_by_doi(funder_doi)?.ok_or_else(not_loaded)?;
        Ok(funder
            .primary_acronym()
            .map(str::to_string)
            .unwrap_or(funder.name))
    }

    fn build_record(&self, fields: GrantFields, funder_uri: String) -> LoaderResult<GrantRecord> {
        let funder_doi = strip_doi_host(&funder_uri);
        let funder_name = match fields.funder_name {
            Some(name) => name,
            None => self.stored_funder_name(&funder_doi)?,
        };

        let eurepo = eurepo_identifier(
            &funder_name,
            fields.program.as_deref().unwrap_or_default(),
            &fields.code,
        );
        let purl = fields
            .url
            .as_deref()
            .filter(|url| url.starts_with(PURL_PREFIX))
            .map(str::to_string);

        let mut identifiers = Identifiers::new();
        identifiers.insert("oaf".to_string(), fields.oai_id);
        identifiers.insert("eurepo".to_string(), Some(eurepo));
        identifiers.insert("purl".to_string(), purl);

        Ok(GrantRecord {
            schema: self.schema.schema_url().to_string(),
            internal_id: GrantRecord::make_internal_id(&funder_doi, &fields.code),
            identifiers,
            code: fields.code,
            title: fields.title,
            acronym: fields.acronym,
            startdate: fields.startdate,
            enddate: fields.enddate,
            url: fields.url,
            program: fields.program,
            funder: JsonRef::new(funder_uri),
            remote_modified: fields.remote_modified,
        })
    }
}

/// `info:eu-repo/grantAgreement/<funder>/<program>/<code>/`, each component
/// form-encoded.
pub fn eurepo_identifier(funder: &str, program: &str, code: &str) -> String {
    format!(
        "info:eu-repo/grantAgreement/{}/{}/{}/",
        quote_plus(funder),
        quote_plus(program),
        quote_plus(code)
    )
}

fn quote_plus(component: &str) -> String {
    urlencoding::encode(component).replace("%20", "+")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn json_scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => non_empty(Some(text)),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct JsonGrantRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    acronym: Option<String>,
    #[serde(default)]
    startdate: Option<String>,
    #[serde(default)]
    enddate: Option<String>,
    #[serde(default)]
    websiteurl: Option<String>,
    #[serde(default)]
    lastupdatetimestamp: Option<serde_json::Value>,
    #[serde(default)]
    funding: Vec<JsonFunding>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonFunding {
    #[serde(default, rename = "shortName")]
    short_name: Option<String>,
    #[serde(default)]
    funding_stream: Option<JsonFundingStream>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonFundingStream {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: Option<String>,
}
