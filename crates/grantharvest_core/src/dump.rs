//! Grant dump into a local SQLite grant store.
//!
//! # Responsibility
//! - Copy one traversal of a grant source into `grants(data, format)` rows.
//! - Commit in batches so an interrupted dump keeps its committed prefix.
//!
//! # Invariants
//! - The destination table is created only when absent; an existing table
//!   with another shape is `DumpError::DestinationConflict`.
//! - `commits == ceil(rows / batch_size)`.
//! - The dumper is the only writer of the destination during a run.

use crate::loader::grant_local::{inspect_grant_table, GrantTableState, GRANT_STORE_TABLE};
use crate::loader::{GrantItem, GrantOutput, GrantSource, LoaderError};
use log::{error, info};
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type DumpResult<T> = Result<T, DumpError>;

#[derive(Debug)]
pub enum DumpError {
    Loader(LoaderError),
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
    /// Destination already holds a `grants` table with other columns.
    DestinationConflict { path: PathBuf, columns: Vec<String> },
}

impl Display for DumpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loader(err) => write!(f, "{err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "grant serialization failed: {err}"),
            Self::DestinationConflict { path, columns } => write!(
                f,
                "{} already has a `{GRANT_STORE_TABLE}` table with columns ({})",
                path.display(),
                columns.join(", ")
            ),
        }
    }
}

impl Error for DumpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Loader(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::DestinationConflict { .. } => None,
        }
    }
}

impl From<LoaderError> for DumpError {
    fn from(value: LoaderError) -> Self {
        Self::Loader(value)
    }
}

impl From<rusqlite::Error> for DumpError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpReport {
    pub rows: usize,
    pub commits: usize,
}

/// Writes grants from `source` into the SQLite file at `destination`.
pub struct GrantDumper<'s> {
    destination: PathBuf,
    source: &'s dyn GrantSource,
}

impl<'s> GrantDumper<'s> {
    pub fn new(destination: impl Into<PathBuf>, source: &'s dyn GrantSource) -> Self {
        Self {
            destination: destination.into(),
            source,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Dumps one traversal of the source.
    ///
    /// # Contract
    /// - `as_json`: rows hold canonical grant JSON tagged `json`; otherwise
    ///   raw record XML tagged `xml`.
    /// - Commits after every `commit_batch_size` rows and once more for a
    ///   trailing partial batch. A batch size of 0 is treated as 1.
    /// - On error, rows of already committed batches remain.
    pub fn dump(&self, as_json: bool, commit_batch_size: usize) -> DumpResult<DumpReport> {
        let started_at = Instant::now();
        let output = if as_json {
            GrantOutput::Canonical
        } else {
            GrantOutput::RawXml
        };
        let batch_size = commit_batch_size.max(1);
        info!(
            "event=grant_dump module=dump status=start path={} format={} batch_size={batch_size}",
            self.destination.display(),
            output.format_tag()
        );

        let result = self.dump_rows(output, batch_size);
        match &result {
            Ok(report) => info!(
                "event=grant_dump module=dump status=ok path={} rows={} commits={} duration_ms={}",
                self.destination.display(),
                report.rows,
                report.commits,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=grant_dump module=dump status=error path={} error={err}",
                self.destination.display()
            ),
        }
        result
    }

    fn dump_rows(&self, output: GrantOutput, batch_size: usize) -> DumpResult<DumpReport> {
        let mut conn = Connection::open(&self.destination)?;
        self.prepare_destination(&conn)?;

        let insert_sql = format!("INSERT INTO {GRANT_STORE_TABLE} (data, format) VALUES (?1, ?2);");
        let mut report = DumpReport::default();
        let mut tx = conn.transaction()?;
        let mut pending = 0usize;

        for item in self.source.iter_grants(output)? {
            let (data, format) = match item? {
                GrantItem::Canonical(grant) => (serde_json::to_string(&grant)?, "json"),
                GrantItem::RawXml(xml) => (xml, "xml"),
            };
            tx.execute(&insert_sql, params![data, format])?;
            report.rows += 1;
            pending += 1;

            if pending == batch_size {
                tx.commit()?;
                report.commits += 1;
                pending = 0;
                tx = conn.transaction()?;
            }
        }

        if pending > 0 {
            tx.commit()?;
            report.commits += 1;
        }
        Ok(report)
    }

    fn prepare_destination(&self, conn: &Connection) -> DumpResult<()> {
        match inspect_grant_table(conn)? {
            GrantTableState::Compatible => Ok(()),
            GrantTableState::Missing => {
                conn.execute_batch(&format!(
                    "CREATE TABLE {GRANT_STORE_TABLE} (data TEXT, format TEXT);"
                ))?;
                Ok(())
            }
            GrantTableState::Conflicting { columns } => Err(DumpError::DestinationConflict {
                path: self.destination.clone(),
                columns,
            }),
        }
    }
}
