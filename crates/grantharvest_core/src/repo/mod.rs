//! Repository layer for the record store.
//!
//! # Responsibility
//! - Define record and PID data access contracts.
//! - Keep SQLite query details out of registration and harvesting.
//!
//! # Invariants
//! - PID binds fail loudly on conflict.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicatePid`) in
//!   addition to DB transport errors.

pub mod record_repo;
