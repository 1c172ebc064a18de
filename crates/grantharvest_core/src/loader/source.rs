//! Local file and HTTP access shared by the readers.

use super::{LoaderError, LoaderResult};
use crate::config::HarvestConfig;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;

/// Opens a local file, transparently decompressing `.gz` files.
pub fn open_local(path: &Path) -> LoaderResult<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|err| LoaderError::io(path, err))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn read_local_to_string(path: &Path) -> LoaderResult<String> {
    let mut reader = open_local(path)?;
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|err| LoaderError::io(path, err))?;
    Ok(content)
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("gz"))
}

/// Blocking HTTP GET returning the fully buffered body.
pub trait HttpFetch {
    /// Fetches `url`, sending `accept` as the `Accept` header.
    fn get_text(&self, url: &str, accept: &str) -> LoaderResult<String>;
}

/// `reqwest` implementation of [`HttpFetch`].
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> LoaderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("grantharvest/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| LoaderError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &HarvestConfig) -> LoaderResult<Self> {
        Self::new(Duration::from_secs(config.http_timeout_secs))
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get_text(&self, url: &str, accept: &str) -> LoaderResult<String> {
        let http_error = |err: reqwest::Error| LoaderError::Http {
            url: url.to_string(),
            message: err.to_string(),
        };
        self.client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(http_error)?
            .text()
            .map_err(http_error)
    }
}

#[cfg(test)]
mod tests {
    use super::{open_local, read_local_to_string};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{BufRead, Write};

    #[test]
    fn reads_plain_and_gzip_files_alike() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("data.jsonl");
        std::fs::write(&plain, "a\nb\n").unwrap();

        let gzipped = dir.path().join("data.jsonl.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"a\nb\n").unwrap();
        std::fs::write(&gzipped, encoder.finish().unwrap()).unwrap();

        assert_eq!(read_local_to_string(&plain).unwrap(), "a\nb\n");
        let lines: Vec<String> = open_local(&gzipped)
            .unwrap()
            .lines()
            .map(Result::unwrap)
            .collect();
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_local(&dir.path().join("missing.rdf")).err().unwrap();
        assert!(err.to_string().contains("missing.rdf"));
    }
}
