//! Identity resolvers consulted during normalization.
//!
//! # Responsibility
//! - Map GeoNames references to ISO-3166 country codes.
//! - Map OpenAIRE funder codes and record ids to canonical funder URIs.
//! - Build the `$schema` URL attached to canonical records.
//!
//! # Invariants
//! - Chained resolvers (`FunderIdentityResolver`) return `None` on a miss.
//! - Terminal resolvers (`CountryCodeResolver`) return an error on a miss.
//! - Resolver tables are read-only after construction.

pub mod country;
pub mod funder;
pub mod schema;

pub use country::{CountryCodeResolver, CountryLookupError, CountryTableError};
pub use funder::{doi_url, strip_doi_host, FunderIdentityResolver};
pub use schema::{SchemaParts, SchemaUrlError, SchemaUrlFormatter};
