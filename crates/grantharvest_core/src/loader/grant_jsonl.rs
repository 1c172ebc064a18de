//! Grant reader over a JSON-lines project dump.
//!
//! # Invariants
//! - One grant per non-blank line; `.gz` files are read compressed.
//! - Rows whose funder does not resolve are logged and skipped.
//! - Raw XML output is not available from this source.

use super::grant::GrantNormalizer;
use super::source::open_local;
use super::{
    GrantItem, GrantIter, GrantOutput, GrantSource, LoaderError, LoaderResult, SkippedGrant,
};
use crate::config::HarvestConfig;
use log::{info, warn};
use std::cell::RefCell;
use std::io::{BufRead, Lines};
use std::path::PathBuf;

pub struct JsonLinesGrantSource<'a> {
    path: PathBuf,
    normalizer: GrantNormalizer<'a>,
    skipped: RefCell<Vec<SkippedGrant>>,
}

impl<'a> JsonLinesGrantSource<'a> {
    pub fn new(path: impl Into<PathBuf>, normalizer: GrantNormalizer<'a>) -> Self {
        Self {
            path: path.into(),
            normalizer,
            skipped: RefCell::new(Vec::new()),
        }
    }

    pub fn from_config(
        config: &HarvestConfig,
        normalizer: GrantNormalizer<'a>,
    ) -> LoaderResult<Self> {
        let path = config.jsonl_local_source.as_ref().ok_or_else(|| {
            LoaderError::InvalidSource("jsonl_local_source is not configured".to_string())
        })?;
        Ok(Self::new(path, normalizer))
    }
}

impl GrantSource for JsonLinesGrantSource<'_> {
    fn iter_grants(&self, output: GrantOutput) -> LoaderResult<GrantIter<'_>> {
        if output == GrantOutput::RawXml {
            return Err(LoaderError::FormatMismatch {
                format: "json".to_string(),
            });
        }
        self.skipped.borrow_mut().clear();
        let lines = open_local(&self.path)?.lines();
        info!(
            "event=grant_source_open module=loader status=ok source=jsonl path={}",
            self.path.display()
        );
        Ok(Box::new(JsonLinesIter {
            source: self,
            lines,
            line_number: 0,
        }))
    }

    fn skipped(&self) -> Vec<SkippedGrant> {
        self.skipped.borrow().clone()
    }
}

struct JsonLinesIter<'s> {
    source: &'s JsonLinesGrantSource<'s>,
    lines: Lines<Box<dyn BufRead>>,
    line_number: u64,
}

impl Iterator for JsonLinesIter<'_> {
    type Item = LoaderResult<GrantItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(LoaderError::io(&self.source.path, err))),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            match self.source.normalizer.json_to_grant(&line) {
                Ok(grant) => return Some(Ok(GrantItem::Canonical(grant))),
                Err(err) if err.is_recoverable() => {
                    warn!(
                        "event=grant_skipped module=loader status=skip source=jsonl line={} error={err}",
                        self.line_number
                    );
                    if let Some(skipped) = err.skipped_grant() {
                        self.source.skipped.borrow_mut().push(skipped);
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
