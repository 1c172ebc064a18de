//! Idempotent create-or-update of harvested records.
//!
//! # Responsibility
//! - Reconcile one incoming record against the store by natural key.
//! - Mint PIDs for newly created records.
//!
//! # Invariants
//! - Each registration runs in its own transaction; a failure leaves no
//!   partial record or PID behind.
//! - An unchanged `remote_modified` is a no-op; any change replaces the whole
//!   stored document.
//! - Natural-key PIDs are bound exactly once.

use super::minter::{fetch_pid, funder_minter, grant_minter, Minter};
use crate::model::funder::FunderRecord;
use crate::model::grant::GrantRecord;
use crate::model::HarvestedRecord;
use crate::repo::record_repo::{RecordRepository, RepoResult, SqliteRecordRepository};
use log::{debug, error};
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

const REMOTE_MODIFIED_FIELD: &str = "remote_modified";

/// What a registration did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created { id: String },
    Updated { id: String, version_id: i64 },
    Unchanged { id: String },
}

impl RegisterOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            Self::Created { id } | Self::Updated { id, .. } | Self::Unchanged { id } => id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged { .. } => "unchanged",
        }
    }
}

/// Registration entry points over one record store connection.
pub struct RegisterService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> RegisterService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates or updates a funder keyed by its DOI.
    pub fn register_funder(&self, funder: &FunderRecord) -> RepoResult<RegisterOutcome> {
        self.register_harvested(funder, funder_minter)
    }

    /// Creates or updates a grant keyed by its `internal_id`.
    pub fn register_grant(&self, grant: &GrantRecord) -> RepoResult<RegisterOutcome> {
        self.register_harvested(grant, grant_minter)
    }

    /// Validates and registers a typed record.
    pub fn register_harvested<T: HarvestedRecord>(
        &self,
        record: &T,
        minter: Minter,
    ) -> RepoResult<RegisterOutcome> {
        record.validate()?;
        let data = serde_json::to_value(record)?;
        self.register(&data, T::PID_TYPE, T::NATURAL_KEY_FIELD, minter)
    }

    /// Creates or updates a raw JSON record.
    ///
    /// # Contract
    /// - Not found by `(pid_type, data[key_field])`: creates the record and
    ///   calls `minter`.
    /// - Found with equal `remote_modified`: returns `Unchanged`.
    /// - Found otherwise: replaces the stored document and bumps its version.
    pub fn register(
        &self,
        data: &Value,
        pid_type: &'static str,
        key_field: &'static str,
        minter: Minter,
    ) -> RepoResult<RegisterOutcome> {
        let pid = fetch_pid(data, pid_type, key_field)?;
        let tx = self.conn.unchecked_transaction()?;
        let repo = SqliteRecordRepository::new(&tx);

        let outcome = match reconcile(&repo, data, pid_type, &pid.pid_value, minter) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "event=record_register module=service status=error pid_type={pid_type} pid_value={} error={err}",
                    pid.pid_value
                );
                return Err(err);
            }
        };
        tx.commit()?;

        debug!(
            "event=record_register module=service status=ok outcome={} pid_type={pid_type} pid_value={} record_id={}",
            outcome.label(),
            pid.pid_value,
            outcome.record_id()
        );
        Ok(outcome)
    }
}

/// Storage-agnostic reconciliation step.
pub fn reconcile(
    repo: &dyn RecordRepository,
    data: &Value,
    pid_type: &str,
    pid_value: &str,
    minter: Minter,
) -> RepoResult<RegisterOutcome> {
    match repo.get_by_pid(pid_type, pid_value)? {
        Some(existing) if is_unchanged(&existing.json, data) => {
            Ok(RegisterOutcome::Unchanged { id: existing.id })
        }
        Some(existing) => {
            let version_id = repo.replace_record(&existing.id, data)?;
            Ok(RegisterOutcome::Updated {
                id: existing.id,
                version_id,
            })
        }
        None => {
            let id = Uuid::new_v4().to_string();
            repo.create_record(&id, data)?;
            minter(repo, &id, data)?;
            Ok(RegisterOutcome::Created { id })
        }
    }
}

/// Compares change markers; records without one compare by content.
fn is_unchanged(stored: &Value, incoming: &Value) -> bool {
    match incoming.get(REMOTE_MODIFIED_FIELD).filter(|value| !value.is_null()) {
        Some(modified) => stored.get(REMOTE_MODIFIED_FIELD) == Some(modified),
        None => stored == incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::{RegisterOutcome, RegisterService};
    use crate::db::open_db_in_memory;
    use crate::repo::record_repo::{RecordRepository, RepoError, SqliteRecordRepository};
    use crate::service::minter::{funder_minter, grant_minter};
    use serde_json::json;

    #[test]
    fn equal_change_marker_is_a_no_op() {
        let conn = open_db_in_memory().unwrap();
        let service = RegisterService::new(&conn);
        let data = json!({"doi": "10.13039/1", "name": "A", "remote_modified": "2020", "identifiers": {}});

        let created = service.register(&data, "frdoi", "doi", funder_minter).unwrap();
        assert!(matches!(created, RegisterOutcome::Created { .. }));

        let mut renamed = data.clone();
        renamed["name"] = json!("B");
        let again = service.register(&renamed, "frdoi", "doi", funder_minter).unwrap();
        assert_eq!(
            again,
            RegisterOutcome::Unchanged {
                id: created.record_id().to_string()
            }
        );

        let repo = SqliteRecordRepository::new(&conn);
        let stored = repo.get_by_pid("frdoi", "10.13039/1").unwrap().unwrap();
        assert_eq!(stored.json["name"], "A");
        assert_eq!(stored.version_id, 1);
    }

    #[test]
    fn changed_marker_replaces_whole_document() {
        let conn = open_db_in_memory().unwrap();
        let service = RegisterService::new(&conn);
        let data = json!({"doi": "10.13039/1", "name": "A", "country": "US", "remote_modified": "2020", "identifiers": {}});
        service.register(&data, "frdoi", "doi", funder_minter).unwrap();

        let newer = json!({"doi": "10.13039/1", "name": "B", "remote_modified": "2021", "identifiers": {}});
        let outcome = service.register(&newer, "frdoi", "doi", funder_minter).unwrap();
        assert!(matches!(outcome, RegisterOutcome::Updated { version_id: 2, .. }));

        let repo = SqliteRecordRepository::new(&conn);
        let stored = repo.get_by_pid("frdoi", "10.13039/1").unwrap().unwrap();
        assert_eq!(stored.json, newer);
        assert_eq!(repo.count_records().unwrap(), 1);
    }

    #[test]
    fn failed_mint_rolls_back_the_record() {
        let conn = open_db_in_memory().unwrap();
        let service = RegisterService::new(&conn);
        let first = json!({"internal_id": "10.1/a::1", "identifiers": {"eurepo": "shared"}});
        let second = json!({"internal_id": "10.1/a::2", "identifiers": {"eurepo": "shared"}});

        service.register(&first, "grant", "internal_id", grant_minter).unwrap();
        let err = service
            .register(&second, "grant", "internal_id", grant_minter)
            .unwrap_err();

        assert!(matches!(err, RepoError::DuplicatePid { .. }));
        let repo = SqliteRecordRepository::new(&conn);
        assert_eq!(repo.count_records().unwrap(), 1);
        assert!(repo.get_by_pid("grant", "10.1/a::2").unwrap().is_none());
    }
}
