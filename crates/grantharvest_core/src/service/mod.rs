//! Registration and harvest services.
//!
//! # Responsibility
//! - Turn canonical records into idempotent record store writes.
//! - Drive readers into registration one record at a time.

pub mod harvest_service;
pub mod minter;
pub mod register_service;
