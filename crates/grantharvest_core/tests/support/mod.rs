#![allow(dead_code)]

use grantharvest_core::{HttpFetch, LoaderError, LoaderResult};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const OAI_ENDPOINT: &str = "http://oai.test/oai_pmh";

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Canned OAI-PMH responses keyed by a URL fragment.
pub struct FakeFeed {
    pages: Vec<(String, String)>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The two-page `projects` feed from the fixtures.
    pub fn projects() -> Self {
        Self::new()
            .with_page("resumptionToken=page-2", fixture("oai_page_2.xml"))
            .with_page("set=projects", fixture("oai_page_1.xml"))
    }

    pub fn with_page(mut self, url_fragment: &str, body: impl Into<String>) -> Self {
        self.pages.push((url_fragment.to_string(), body.into()));
        self
    }

    /// Shared log of requested URLs; stays readable after the feed is boxed.
    pub fn requests(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.requests)
    }
}

impl HttpFetch for FakeFeed {
    fn get_text(&self, url: &str, _accept: &str) -> LoaderResult<String> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| LoaderError::Http {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            })
    }
}

/// Standalone OAI record for an EC H2020 project.
pub fn h2020_record(code: &str) -> String {
    funded_record(code, "ec__________::EC", "EC", Some("ec__________::EC::H2020"))
}

pub fn funded_record(
    code: &str,
    funder_id: &str,
    short_name: &str,
    stream_id: Option<&str>,
) -> String {
    let stream = stream_id
        .map(|id| format!("<funding_level_0><id>{id}</id><name>H2020</name></funding_level_0>"))
        .unwrap_or_default();
    format!(
        r#"<oai:record xmlns:oai="http://www.openarchives.org/OAI/2.0/" xmlns:dri="http://www.driver-repository.eu/namespace/dri" xmlns:oaf="http://namespace.openaire.eu/oaf">
  <oai:header>
    <oai:identifier>oai:dnet:corda__h2020::{code}</oai:identifier>
    <dri:objIdentifier>corda__h2020::{code}</dri:objIdentifier>
    <dri:dateOfTransformation>2017-01-01T00:00:00Z</dri:dateOfTransformation>
  </oai:header>
  <oai:metadata>
    <oaf:entity>
      <oaf:project>
        <code>{code}</code>
        <title>Project {code}</title>
        <fundingtree>
          <funder><id>{funder_id}</id><shortname>{short_name}</shortname></funder>
          {stream}
        </fundingtree>
      </oaf:project>
    </oaf:entity>
  </oai:metadata>
</oai:record>"#
    )
}
