//! Grant reader over a remote OAI-PMH endpoint.
//!
//! # Responsibility
//! - Page through `ListRecords` for one set, following resumption tokens.
//! - Normalize each record or hand it back as standalone raw XML.
//!
//! # Invariants
//! - Pages are fetched on demand; a page is requested only after the
//!   previous one is drained.
//! - `FunderNotFound` items are logged, recorded in `skipped()` and dropped.
//! - Deleted records are ignored.

use super::grant::GrantNormalizer;
use super::source::{HttpFetch, ReqwestFetcher};
use super::{
    GrantItem, GrantIter, GrantOutput, GrantSource, LoaderError, LoaderResult, SkippedGrant,
};
use crate::config::HarvestConfig;
use crate::xml::{parse_document, XmlElement};
use log::{debug, info, warn};
use reqwest::Url;
use std::cell::RefCell;
use std::collections::VecDeque;

const OAI_ACCEPT: &str = "text/xml";
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// Reads grants from an OpenAIRE OAI-PMH endpoint.
pub struct OaiPmhGrantSource<'a> {
    fetcher: Box<dyn HttpFetch + 'a>,
    endpoint: String,
    metadata_prefix: String,
    set: String,
    normalizer: GrantNormalizer<'a>,
    skipped: RefCell<Vec<SkippedGrant>>,
}

impl<'a> OaiPmhGrantSource<'a> {
    pub fn new(
        fetcher: Box<dyn HttpFetch + 'a>,
        endpoint: impl Into<String>,
        set: impl Into<String>,
        normalizer: GrantNormalizer<'a>,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            metadata_prefix: "oaf".to_string(),
            set: set.into(),
            normalizer,
            skipped: RefCell::new(Vec::new()),
        }
    }

    /// Configured endpoint and default set, over a `reqwest` client.
    pub fn from_config(
        config: &HarvestConfig,
        normalizer: GrantNormalizer<'a>,
    ) -> LoaderResult<Self> {
        let fetcher = ReqwestFetcher::from_config(config)?;
        Ok(Self::new(
            Box::new(fetcher),
            config.oaipmh_endpoint.clone(),
            config.grants_set.clone(),
            normalizer,
        )
        .with_metadata_prefix(config.oaipmh_metadata_prefix.clone()))
    }

    pub fn with_metadata_prefix(mut self, metadata_prefix: impl Into<String>) -> Self {
        self.metadata_prefix = metadata_prefix.into();
        self
    }

    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = set.into();
        self
    }

    pub fn set(&self) -> &str {
        &self.set
    }

    fn list_records_url(&self, resumption_token: Option<&str>) -> LoaderResult<String> {
        let url = match resumption_token {
            Some(token) => Url::parse_with_params(
                &self.endpoint,
                &[("verb", "ListRecords"), ("resumptionToken", token)],
            ),
            None => Url::parse_with_params(
                &self.endpoint,
                &[
                    ("verb", "ListRecords"),
                    ("metadataPrefix", self.metadata_prefix.as_str()),
                    ("set", self.set.as_str()),
                ],
            ),
        };
        url.map(String::from).map_err(|err| LoaderError::Http {
            url: self.endpoint.clone(),
            message: err.to_string(),
        })
    }

    fn record_skip(&self, err: &LoaderError) {
        warn!(
            "event=grant_skipped module=loader status=skip source=oai_pmh set={} error={err}",
            self.set
        );
        if let Some(skipped) = err.skipped_grant() {
            self.skipped.borrow_mut().push(skipped);
        }
    }
}

impl GrantSource for OaiPmhGrantSource<'_> {
    fn iter_grants(&self, output: GrantOutput) -> LoaderResult<GrantIter<'_>> {
        self.skipped.borrow_mut().clear();
        info!(
            "event=grant_source_open module=loader status=ok source=oai_pmh endpoint={} set={}",
            self.endpoint, self.set
        );
        Ok(Box::new(OaiPmhIter {
            source: self,
            output,
            page: VecDeque::new(),
            resumption_token: None,
            pages_fetched: 0,
            exhausted: false,
        }))
    }

    fn skipped(&self) -> Vec<SkippedGrant> {
        self.skipped.borrow().clone()
    }
}

struct OaiPmhIter<'s> {
    source: &'s OaiPmhGrantSource<'s>,
    output: GrantOutput,
    page: VecDeque<XmlElement>,
    resumption_token: Option<String>,
    pages_fetched: u32,
    exhausted: bool,
}

impl OaiPmhIter<'_> {
    fn fetch_page(&mut self) -> LoaderResult<()> {
        let url = self
            .source
            .list_records_url(self.resumption_token.as_deref())?;
        let body = self.source.fetcher.get_text(&url, OAI_ACCEPT)?;
        let root = parse_document(&body)?;
        let ns = self.source.normalizer.namespaces();
        self.pages_fetched += 1;

        if let Some(error) = root.find("oai:error", ns) {
            let code = error.attribute("code", ns).unwrap_or_default().to_string();
            self.exhausted = true;
            if code == NO_RECORDS_MATCH {
                return Ok(());
            }
            return Err(LoaderError::Protocol {
                code,
                message: error.text(),
            });
        }

        let records: Vec<XmlElement> = root
            .find_all("oai:ListRecords/oai:record", ns)
            .into_iter()
            .cloned()
            .collect();
        self.resumption_token = root.text_at("oai:ListRecords/oai:resumptionToken", ns);
        self.exhausted = self.resumption_token.is_none();
        debug!(
            "event=oai_page module=loader status=ok page={} records={} has_more={}",
            self.pages_fetched,
            records.len(),
            !self.exhausted
        );
        self.page.extend(records);
        Ok(())
    }

    /// `None` when the record is dropped.
    fn convert(&self, record: &XmlElement) -> Option<LoaderResult<GrantItem>> {
        let ns = self.source.normalizer.namespaces();
        let deleted = record
            .find("oai:header", ns)
            .and_then(|header| header.attribute("status", ns))
            == Some("deleted");
        if deleted {
            return None;
        }

        match self.output {
            GrantOutput::RawXml => Some(
                record
                    .to_xml_string()
                    .map(GrantItem::RawXml)
                    .map_err(LoaderError::from),
            ),
            GrantOutput::Canonical => match self.source.normalizer.element_to_grant(record) {
                Ok(grant) => Some(Ok(GrantItem::Canonical(grant))),
                Err(err) if err.is_recoverable() => {
                    self.source.record_skip(&err);
                    None
                }
                Err(err) => Some(Err(err)),
            },
        }
    }
}

impl Iterator for OaiPmhIter<'_> {
    type Item = LoaderResult<GrantItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.page.pop_front() {
                match self.convert(&record) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}
