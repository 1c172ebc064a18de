//! Funder and grant harvesting for research-output repositories.
//!
//! Reads the FundRef funder registry and OpenAIRE grant feeds, normalizes
//! them into canonical records and reconciles those into a SQLite record
//! store keyed by natural identifiers.

pub mod config;
pub mod db;
pub mod dump;
pub mod loader;
pub mod logging;
pub mod model;
pub mod repo;
pub mod resolver;
pub mod service;
pub mod xml;

pub use config::{ConfigError, HarvestConfig, NamespaceTable};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use dump::{DumpError, DumpReport, DumpResult, GrantDumper};
pub use loader::funder::{FunderDocument, FunderIter, FunderNormalizer};
pub use loader::grant::{FunderLookup, GrantLayoutRegistry, GrantNormalizer, GrantXmlLayout};
pub use loader::grant_jsonl::JsonLinesGrantSource;
pub use loader::grant_local::SqliteGrantSource;
pub use loader::grant_remote::OaiPmhGrantSource;
pub use loader::source::{HttpFetch, ReqwestFetcher};
pub use loader::{
    GrantItem, GrantIter, GrantOutput, GrantSource, LoaderError, LoaderResult, SkippedGrant,
};
pub use logging::{default_log_level, init_logging, LoggingError};
pub use model::funder::FunderRecord;
pub use model::grant::GrantRecord;
pub use model::{HarvestedRecord, Identifiers, JsonRef, RecordValidationError};
pub use repo::record_repo::{
    PidEntry, RecordRepository, RepoError, RepoResult, SqliteRecordRepository, StoredRecord,
};
pub use resolver::{
    CountryCodeResolver, CountryLookupError, CountryTableError, FunderIdentityResolver,
    SchemaUrlError, SchemaUrlFormatter,
};
pub use service::harvest_service::{
    harvest_funders, harvest_grant_sets, harvest_grants, HarvestError, HarvestReport,
    HarvestResult,
};
pub use service::minter::{
    funder_fetcher, funder_minter, grant_fetcher, grant_minter, mint_pids, FetchedPid, Minter,
};
pub use service::register_service::{RegisterOutcome, RegisterService};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
