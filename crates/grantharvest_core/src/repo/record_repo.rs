//! Record and PID repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store canonical record JSON with a version counter.
//! - Bind persistent identifiers `(pid_type, pid_value)` to records.
//!
//! # Invariants
//! - A `(pid_type, pid_value)` pair is bound to at most one record; a second
//!   bind is `RepoError::DuplicatePid`, never a silent overwrite.
//! - Replacing a record bumps `version_id` by one.
//! - Read paths reject unparsable persisted JSON instead of masking it.

use crate::db::DbError;
use crate::loader::grant::FunderLookup;
use crate::model::funder::FunderRecord;
use crate::model::HarvestedRecord;
use crate::model::RecordValidationError;
use crate::resolver::strip_doi_host;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    json,
    version_id
FROM records";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    Json(serde_json::Error),
    NotFound(String),
    DuplicatePid {
        pid_type: String,
        pid_value: String,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "record json error: {err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::DuplicatePid {
                pid_type,
                pid_value,
            } => write!(f, "pid {pid_type}:{pid_value} is already registered"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::NotFound(_) | Self::DuplicatePid { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Persisted record row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub json: Value,
    pub version_id: i64,
}

impl StoredRecord {
    pub fn decode<T: DeserializeOwned>(&self) -> RepoResult<T> {
        Ok(serde_json::from_value(self.json.clone())?)
    }
}

/// PID row bound to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidEntry {
    pub pid_type: String,
    pub pid_value: String,
    pub object_uuid: String,
    pub status: String,
}

/// Repository interface for records and their persistent identifiers.
pub trait RecordRepository {
    fn get_record(&self, id: &str) -> RepoResult<Option<StoredRecord>>;
    fn get_by_pid(&self, pid_type: &str, pid_value: &str) -> RepoResult<Option<StoredRecord>>;
    fn create_record(&self, id: &str, json: &Value) -> RepoResult<()>;
    /// Replaces the whole JSON document and returns the new version.
    fn replace_record(&self, id: &str, json: &Value) -> RepoResult<i64>;
    fn create_pid(&self, pid_type: &str, pid_value: &str, object_uuid: &str) -> RepoResult<()>;
    fn list_pids_for_record(&self, object_uuid: &str) -> RepoResult<Vec<PidEntry>>;
    fn count_records(&self) -> RepoResult<u64>;
    /// Counts PIDs, optionally of one type only.
    fn count_pids(&self, pid_type: Option<&str>) -> RepoResult<u64>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Typed lookup by natural key.
    pub fn get_harvested<T>(&self, natural_key: &str) -> RepoResult<Option<T>>
    where
        T: HarvestedRecord + DeserializeOwned,
    {
        self.get_by_pid(T::PID_TYPE, natural_key)?
            .map(|record| record.decode())
            .transpose()
    }

    /// Follows a funder `$ref` URI to the stored funder, if any.
    pub fn resolve_funder_ref(&self, uri: &str) -> RepoResult<Option<FunderRecord>> {
        self.get_harvested::<FunderRecord>(&strip_doi_host(uri))
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn get_record(&self, id: &str) -> RepoResult<Option<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
        let record = stmt.query_row([id], parse_record_row).optional()?;
        record.transpose()
    }

    fn get_by_pid(&self, pid_type: &str, pid_value: &str) -> RepoResult<Option<StoredRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL}
             WHERE id = (
                SELECT object_uuid
                FROM pids
                WHERE pid_type = ?1 AND pid_value = ?2 AND status = 'R'
             );"
        ))?;
        let record = stmt
            .query_row(params![pid_type, pid_value], parse_record_row)
            .optional()?;
        record.transpose()
    }

    fn create_record(&self, id: &str, json: &Value) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO records (id, json, version_id) VALUES (?1, ?2, 1);",
            params![id, serde_json::to_string(json)?],
        )?;
        Ok(())
    }

    fn replace_record(&self, id: &str, json: &Value) -> RepoResult<i64> {
        let changed = self.conn.execute(
            "UPDATE records
             SET
                json = ?1,
                version_id = version_id + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![serde_json::to_string(json)?, id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }

        let version = self.conn.query_row(
            "SELECT version_id FROM records WHERE id = ?1;",
            [id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(version)
    }

    fn create_pid(&self, pid_type: &str, pid_value: &str, object_uuid: &str) -> RepoResult<()> {
        let result = self.conn.execute(
            "INSERT INTO pids (pid_type, pid_value, object_uuid, status)
             VALUES (?1, ?2, ?3, 'R');",
            params![pid_type, pid_value, object_uuid],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && self.pid_exists(pid_type, pid_value)? =>
            {
                Err(RepoError::DuplicatePid {
                    pid_type: pid_type.to_string(),
                    pid_value: pid_value.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn list_pids_for_record(&self, object_uuid: &str) -> RepoResult<Vec<PidEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT pid_type, pid_value, object_uuid, status
             FROM pids
             WHERE object_uuid = ?1
             ORDER BY pid_type ASC, pid_value ASC;",
        )?;
        let rows = stmt.query_map([object_uuid], |row| {
            Ok(PidEntry {
                pid_type: row.get(0)?,
                pid_value: row.get(1)?,
                object_uuid: row.get(2)?,
                status: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_records(&self) -> RepoResult<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(1) FROM records;", [], |row| row.get::<_, i64>(0))?;
        Ok(count.max(0) as u64)
    }

    fn count_pids(&self, pid_type: Option<&str>) -> RepoResult<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM pids WHERE ?1 IS NULL OR pid_type = ?1;",
            [pid_type],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl SqliteRecordRepository<'_> {
    fn pid_exists(&self, pid_type: &str, pid_value: &str) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM pids WHERE pid_type = ?1 AND pid_value = ?2
            );",
            params![pid_type, pid_value],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl FunderLookup for SqliteRecordRepository<'_> {
    fn funder_by_doi(&self, doi: &str) -> RepoResult<Option<FunderRecord>> {
        self.get_harvested::<FunderRecord>(doi)
    }
}

fn parse_record_row(row: &Row<'_>) -> rusqlite::Result<RepoResult<StoredRecord>> {
    let id: String = row.get(0)?;
    let raw: String = row.get(1)?;
    let version_id: i64 = row.get(2)?;
    Ok(serde_json::from_str(&raw)
        .map(|json| StoredRecord {
            id: id.clone(),
            json,
            version_id,
        })
        .map_err(|err| RepoError::InvalidData(format!("record {id}: {err}"))))
}

#[cfg(test)]
mod tests {
    use super::{RecordRepository, RepoError, SqliteRecordRepository};
    use crate::db::open_db_in_memory;
    use serde_json::json;

    #[test]
    fn replace_bumps_version_and_keeps_id() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(&conn);

        repo.create_record("r1", &json!({"doi": "10.1/a"})).unwrap();
        repo.create_pid("frdoi", "10.1/a", "r1").unwrap();
        let version = repo
            .replace_record("r1", &json!({"doi": "10.1/a", "name": "x"}))
            .unwrap();

        assert_eq!(version, 2);
        let stored = repo.get_by_pid("frdoi", "10.1/a").unwrap().unwrap();
        assert_eq!(stored.id, "r1");
        assert_eq!(stored.json["name"], "x");
    }

    #[test]
    fn second_bind_of_same_pid_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(&conn);
        repo.create_record("r1", &json!({})).unwrap();
        repo.create_record("r2", &json!({})).unwrap();
        repo.create_pid("grant", "10.1/a::1", "r1").unwrap();

        let err = repo.create_pid("grant", "10.1/a::1", "r2").unwrap_err();
        assert!(matches!(err, RepoError::DuplicatePid { .. }));
        assert_eq!(repo.count_pids(Some("grant")).unwrap(), 1);
    }

    #[test]
    fn replace_of_missing_record_is_not_found() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(&conn);
        assert!(matches!(
            repo.replace_record("missing", &json!({})),
            Err(RepoError::NotFound(_))
        ));
    }
}
