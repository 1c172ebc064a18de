//! PID minters and fetchers for funder and grant records.

use crate::model::RecordValidationError;
use crate::repo::record_repo::{RecordRepository, RepoError, RepoResult};
use serde_json::Value;

/// Binds a freshly created record's PIDs.
pub type Minter = fn(&dyn RecordRepository, &str, &Value) -> RepoResult<FetchedPid>;

/// `(pid_type, pid_value)` naming a record by its natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPid {
    pub pid_type: String,
    pub pid_value: String,
}

pub fn funder_minter(
    repo: &dyn RecordRepository,
    record_id: &str,
    data: &Value,
) -> RepoResult<FetchedPid> {
    mint_pids(repo, record_id, data, "frdoi", "doi")
}

pub fn grant_minter(
    repo: &dyn RecordRepository,
    record_id: &str,
    data: &Value,
) -> RepoResult<FetchedPid> {
    mint_pids(repo, record_id, data, "grant", "internal_id")
}

/// Binds the natural key PID plus one PID per non-null identifier.
///
/// Identifier schemes become PID types, e.g. `eurepo` or `oaf`.
pub fn mint_pids(
    repo: &dyn RecordRepository,
    record_id: &str,
    data: &Value,
    pid_type: &'static str,
    key_field: &'static str,
) -> RepoResult<FetchedPid> {
    let pid = fetch_pid(data, pid_type, key_field)?;
    repo.create_pid(&pid.pid_type, &pid.pid_value, record_id)?;

    if let Some(identifiers) = data.get("identifiers").and_then(Value::as_object) {
        for (scheme, identifier) in identifiers {
            if let Some(identifier) = identifier.as_str().filter(|value| !value.is_empty()) {
                repo.create_pid(scheme, identifier, record_id)?;
            }
        }
    }
    Ok(pid)
}

pub fn funder_fetcher(data: &Value) -> RepoResult<FetchedPid> {
    fetch_pid(data, "frdoi", "doi")
}

pub fn grant_fetcher(data: &Value) -> RepoResult<FetchedPid> {
    fetch_pid(data, "grant", "internal_id")
}

/// Reads the natural key PID without touching storage.
pub fn fetch_pid(
    data: &Value,
    pid_type: &'static str,
    key_field: &'static str,
) -> RepoResult<FetchedPid> {
    let pid_value = data
        .get(key_field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or(RepoError::Validation(
            RecordValidationError::EmptyNaturalKey { field: key_field },
        ))?;
    Ok(FetchedPid {
        pid_type: pid_type.to_string(),
        pid_value: pid_value.to_string(),
    })
}
