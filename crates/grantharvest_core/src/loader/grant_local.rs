//! Grant reader over a local SQLite grant store.
//!
//! # Responsibility
//! - Stream rows of the `grants(data, format)` table in insertion order.
//! - Normalize `xml` rows or hand them back raw; decode `json` rows.
//!
//! # Invariants
//! - The store is opened read-only, once per traversal, and closed when the
//!   traversal ends or the iterator is dropped.
//! - Conversion errors, `FunderNotFound` included, are yielded to the caller.

use super::grant::GrantNormalizer;
use super::{GrantItem, GrantIter, GrantOutput, GrantSource, LoaderError, LoaderResult};
use crate::config::HarvestConfig;
use crate::model::grant::GrantRecord;
use log::{info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// Table written by the dumper and read back here.
pub const GRANT_STORE_TABLE: &str = "grants";
const GRANT_STORE_COLUMNS: [&str; 2] = ["data", "format"];
const NEXT_ROW_SQL: &str =
    "SELECT rowid, data, format FROM grants WHERE rowid > ?1 ORDER BY rowid ASC LIMIT 1;";

/// Shape of the grant table in an existing SQLite file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTableState {
    Missing,
    Compatible,
    /// Table exists with other columns.
    Conflicting { columns: Vec<String> },
}

pub fn inspect_grant_table(conn: &Connection) -> rusqlite::Result<GrantTableState> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({GRANT_STORE_TABLE});"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Ok(GrantTableState::Missing);
    }
    if columns.len() == GRANT_STORE_COLUMNS.len()
        && GRANT_STORE_COLUMNS
            .iter()
            .all(|expected| columns.iter().any(|column| column == expected))
    {
        return Ok(GrantTableState::Compatible);
    }
    Ok(GrantTableState::Conflicting { columns })
}

/// Reads grants from a file produced by `GrantDumper`.
pub struct SqliteGrantSource<'a> {
    path: PathBuf,
    normalizer: GrantNormalizer<'a>,
}

impl<'a> SqliteGrantSource<'a> {
    pub fn new(path: impl Into<PathBuf>, normalizer: GrantNormalizer<'a>) -> Self {
        Self {
            path: path.into(),
            normalizer,
        }
    }

    pub fn from_config(
        config: &HarvestConfig,
        normalizer: GrantNormalizer<'a>,
    ) -> LoaderResult<Self> {
        let path = config.oai_local_source.as_ref().ok_or_else(|| {
            LoaderError::InvalidSource("oai_local_source is not configured".to_string())
        })?;
        Ok(Self::new(path, normalizer))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GrantSource for SqliteGrantSource<'_> {
    fn iter_grants(&self, output: GrantOutput) -> LoaderResult<GrantIter<'_>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        match inspect_grant_table(&conn)? {
            GrantTableState::Compatible => {}
            GrantTableState::Missing => {
                return Err(LoaderError::InvalidSource(format!(
                    "{} has no `{GRANT_STORE_TABLE}` table",
                    self.path.display()
                )));
            }
            GrantTableState::Conflicting { columns } => {
                return Err(LoaderError::InvalidSource(format!(
                    "{} has an incompatible `{GRANT_STORE_TABLE}` table ({})",
                    self.path.display(),
                    columns.join(", ")
                )));
            }
        }

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(1) FROM {GRANT_STORE_TABLE};"),
            [],
            |row| row.get(0),
        )?;
        info!(
            "event=grant_source_open module=loader status=ok source=sqlite path={} rows={total}",
            self.path.display()
        );

        Ok(Box::new(SqliteGrantIter {
            conn: Some(conn),
            normalizer: &self.normalizer,
            output,
            last_rowid: i64::MIN,
            remaining: total.max(0) as u64,
        }))
    }
}

struct SqliteGrantIter<'s> {
    conn: Option<Connection>,
    normalizer: &'s GrantNormalizer<'s>,
    output: GrantOutput,
    last_rowid: i64,
    remaining: u64,
}

impl SqliteGrantIter<'_> {
    fn next_row(&self) -> rusqlite::Result<Option<(i64, String, String)>> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(None);
        };
        let mut stmt = conn.prepare_cached(NEXT_ROW_SQL)?;
        let row = stmt
            .query_row([self.last_rowid], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()?;
        Ok(row)
    }

    fn convert(&self, data: String, format: &str) -> LoaderResult<GrantItem> {
        match (format, self.output) {
            ("xml", GrantOutput::RawXml) => Ok(GrantItem::RawXml(data)),
            ("xml", GrantOutput::Canonical) => {
                self.normalizer.xml_to_grant(&data).map(GrantItem::Canonical)
            }
            ("json", GrantOutput::Canonical) => {
                let grant: GrantRecord = serde_json::from_str(&data)?;
                Ok(GrantItem::Canonical(grant))
            }
            ("json", GrantOutput::RawXml) => Err(LoaderError::FormatMismatch {
                format: "json".to_string(),
            }),
            (other, _) => Err(LoaderError::InvalidSource(format!(
                "unknown grant row format `{other}`"
            ))),
        }
    }

    fn close(&mut self) {
        if self.conn.take().is_some() && self.remaining > 0 {
            warn!(
                "event=grant_source_close module=loader status=skip source=sqlite unread_rows={}",
                self.remaining
            );
        }
    }
}

impl Iterator for SqliteGrantIter<'_> {
    type Item = LoaderResult<GrantItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            self.conn = None;
            return None;
        }
        match self.next_row() {
            Ok(Some((rowid, data, format))) => {
                self.last_rowid = rowid;
                self.remaining -= 1;
                Some(self.convert(data, &format))
            }
            Ok(None) => {
                self.close();
                None
            }
            Err(err) => {
                self.close();
                Some(Err(err.into()))
            }
        }
    }
}
