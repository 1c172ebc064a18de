//! Harvest orchestration: readers driven into registration.
//!
//! # Responsibility
//! - Pull records one at a time from a reader and register each one.
//! - Summarize a run as a `HarvestReport`.
//!
//! # Invariants
//! - Every record is registered in its own transaction; records registered
//!   before a failure stay committed.
//! - The first non-recoverable reader or registration error ends the run.

use super::register_service::{RegisterOutcome, RegisterService};
use crate::loader::grant_remote::OaiPmhGrantSource;
use crate::loader::{GrantItem, GrantOutput, GrantSource, LoaderError, LoaderResult};
use crate::model::funder::FunderRecord;
use crate::repo::record_repo::RepoError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type HarvestResult<T> = Result<T, HarvestError>;

#[derive(Debug)]
pub enum HarvestError {
    Loader(LoaderError),
    Repo(RepoError),
}

impl Display for HarvestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loader(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HarvestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Loader(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<LoaderError> for HarvestError {
    fn from(value: LoaderError) -> Self {
        Self::Loader(value)
    }
}

impl From<RepoError> for HarvestError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Counters for one harvest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl HarvestReport {
    fn record(&mut self, outcome: &RegisterOutcome) {
        self.seen += 1;
        match outcome {
            RegisterOutcome::Created { .. } => self.created += 1,
            RegisterOutcome::Updated { .. } => self.updated += 1,
            RegisterOutcome::Unchanged { .. } => self.unchanged += 1,
        }
    }

    fn merge(&mut self, other: HarvestReport) {
        self.seen += other.seen;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Registers every funder yielded by `funders`, in order.
pub fn harvest_funders<I>(
    funders: I,
    register: &RegisterService<'_>,
) -> HarvestResult<HarvestReport>
where
    I: IntoIterator<Item = LoaderResult<FunderRecord>>,
{
    let started_at = Instant::now();
    let mut report = HarvestReport::default();
    for funder in funders {
        let funder = funder.inspect_err(|err| {
            error!("event=harvest_funders module=service status=error error={err}");
        })?;
        report.record(&register.register_funder(&funder)?);
    }
    info!(
        "event=harvest_funders module=service status=ok seen={} created={} updated={} unchanged={} duration_ms={}",
        report.seen,
        report.created,
        report.updated,
        report.unchanged,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

/// Registers every canonical grant of one traversal of `source`.
pub fn harvest_grants(
    source: &dyn GrantSource,
    register: &RegisterService<'_>,
) -> HarvestResult<HarvestReport> {
    let started_at = Instant::now();
    let mut report = HarvestReport::default();
    for item in source.iter_grants(GrantOutput::Canonical)? {
        let item = item.inspect_err(|err| {
            error!("event=harvest_grants module=service status=error error={err}");
        })?;
        if let GrantItem::Canonical(grant) = item {
            report.record(&register.register_grant(&grant)?);
        }
    }
    report.skipped = source.skipped().len();
    info!(
        "event=harvest_grants module=service status=ok seen={} created={} updated={} unchanged={} skipped={} duration_ms={}",
        report.seen,
        report.created,
        report.updated,
        report.unchanged,
        report.skipped,
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

/// Harvests each OAI-PMH set in order and returns the combined report.
pub fn harvest_grant_sets<'a>(
    mut source: OaiPmhGrantSource<'a>,
    sets: &[String],
    register: &RegisterService<'_>,
) -> HarvestResult<HarvestReport> {
    let mut total = HarvestReport::default();
    for set in sets {
        source = source.with_set(set.clone());
        info!("event=harvest_grant_set module=service status=start set={set}");
        total.merge(harvest_grants(&source, register)?);
    }
    Ok(total)
}
