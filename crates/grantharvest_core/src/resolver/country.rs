//! GeoNames -> ISO-3166 alpha-2 country code lookup.

use crate::config::HarvestConfig;
use log::error;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::path::{Path, PathBuf};

const BUILTIN_TABLE_CSV: &str = include_str!("../../data/geonames2countrycodes_iso_3166.txt");

static BUILTIN_TABLE: Lazy<HashMap<String, String>> = Lazy::new(|| {
    parse_table(BUILTIN_TABLE_CSV.as_bytes()).unwrap_or_else(|err| {
        error!("event=country_table_load module=resolver status=error source=builtin error={err}");
        HashMap::new()
    })
});

/// The GeoNames id is not present in the loaded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryLookupError {
    pub geo_id: String,
}

impl Display for CountryLookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "no country code for GeoNames id `{}`", self.geo_id)
    }
}

impl Error for CountryLookupError {}

#[derive(Debug)]
pub enum CountryTableError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Csv(csv::Error),
    /// A row did not have exactly two columns.
    InvalidRow { line: u64 },
}

impl Display for CountryTableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(
                f,
                "cannot read country code table `{}`: {source}",
                path.display()
            ),
            Self::Csv(err) => write!(f, "invalid country code table: {err}"),
            Self::InvalidRow { line } => {
                write!(f, "country code table row {line} must have two columns")
            }
        }
    }
}

impl Error for CountryTableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv(err) => Some(err),
            Self::InvalidRow { .. } => None,
        }
    }
}

impl From<csv::Error> for CountryTableError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Static GeoNames id -> country code table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryCodeResolver {
    table: HashMap<String, String>,
}

impl CountryCodeResolver {
    pub fn from_table(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    /// Loads a `geonames_id,code` file fully into memory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CountryTableError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| CountryTableError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CountryTableError> {
        Ok(Self {
            table: parse_table(reader)?,
        })
    }

    /// Table shipped with the crate. Covers the country-level GeoNames ids.
    pub fn builtin() -> Self {
        Self {
            table: BUILTIN_TABLE.clone(),
        }
    }

    /// Uses `country_code_source` when configured, the built-in table otherwise.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, CountryTableError> {
        match config.country_code_source.as_ref() {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn resolve_by_id(&self, geo_id: &str) -> Result<&str, CountryLookupError> {
        self.table
            .get(geo_id)
            .map(String::as_str)
            .ok_or_else(|| CountryLookupError {
                geo_id: geo_id.to_string(),
            })
    }

    /// Resolves `http://sws.geonames.org/<id>/` style URLs.
    ///
    /// The id is the second-to-last `/` segment, so the trailing slash is
    /// significant.
    pub fn resolve_by_url(&self, url: &str) -> Result<&str, CountryLookupError> {
        let geo_id = url.split('/').rev().nth(1).unwrap_or(url);
        self.resolve_by_id(geo_id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn parse_table(reader: impl Read) -> Result<HashMap<String, String>, CountryTableError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut table = HashMap::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.len() != 2 {
            let line = record.position().map_or(0, |position| position.line());
            return Err(CountryTableError::InvalidRow { line });
        }
        table.insert(record[0].to_string(), record[1].to_string());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::{parse_table, CountryCodeResolver, CountryTableError, BUILTIN_TABLE_CSV};
    use std::collections::HashMap;

    #[test]
    fn builtin_table_resolves_ids_and_urls() {
        let resolver = CountryCodeResolver::builtin();
        assert!(!resolver.is_empty());
        assert_eq!(resolver.resolve_by_id("8502121").unwrap(), "US");
        assert_eq!(resolver.resolve_by_id("8740971").unwrap(), "CH");
        assert_eq!(
            resolver
                .resolve_by_url("http://sws.geonames.org/6252001/")
                .unwrap(),
            "US"
        );
    }

    #[test]
    fn bundled_table_parses_every_row() {
        let parsed = parse_table(BUILTIN_TABLE_CSV.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 22);
        assert_eq!(CountryCodeResolver::builtin().len(), 22);
    }

    #[test]
    fn url_and_embedded_id_resolve_identically() {
        let resolver = CountryCodeResolver::builtin();
        for (url, id) in [
            ("http://sws.geonames.org/2658434/", "2658434"),
            ("http://sws.geonames.org/660013/", "660013"),
        ] {
            assert_eq!(
                resolver.resolve_by_url(url).unwrap(),
                resolver.resolve_by_id(id).unwrap()
            );
        }
    }

    #[test]
    fn unknown_id_is_an_error() {
        let resolver = CountryCodeResolver::from_table(HashMap::from([(
            "1".to_string(),
            "US".to_string(),
        )]));
        assert_eq!(resolver.resolve_by_id("1").unwrap(), "US");
        let err = resolver.resolve_by_id("2").unwrap_err();
        assert_eq!(err.geo_id, "2");
        assert!(resolver.resolve_by_url("no-slashes").is_err());
    }

    #[test]
    fn reader_rejects_rows_without_two_columns() {
        let loaded = CountryCodeResolver::from_reader("1,US\n2, CH \n".as_bytes()).unwrap();
        assert_eq!(loaded.resolve_by_id("2").unwrap(), "CH");

        let err = CountryCodeResolver::from_reader("1,US\n2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CountryTableError::InvalidRow { line: 2 }));
    }
}
