use std::fs;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::error::RetrievalError;
use crate::fs_util::{extract_zip, gunzip};

/// Everything a [`Fetcher`] needs to materialise the raw files of a dataset.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub urls: &'a [String],
    /// Relative destinations, order-correlated with `urls`. When absent the
    /// last path segment of each url is used.
    pub destination_paths: Option<&'a [Utf8PathBuf]>,
    pub target_dir: &'a Utf8Path,
    pub auto_extract: bool,
    pub use_cache: bool,
}

impl FetchRequest<'_> {
    pub fn destinations(&self) -> Result<Vec<Utf8PathBuf>, RetrievalError> {
        match self.destination_paths {
            Some(paths) => Ok(paths.iter().map(|path| self.target_dir.join(path)).collect()),
            None => self
                .urls
                .iter()
                .map(|url| Ok(self.target_dir.join(file_name_from_url(url)?)))
                .collect(),
        }
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), RetrievalError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, RetrievalError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("graph-retrieval/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RetrievalError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| RetrievalError::Http {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            max_retries: 3,
        })
    }

    fn download(&self, url: &str, destination: &Utf8Path) -> Result<(), RetrievalError> {
        let mut response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(RetrievalError::HttpStatus {
                url: url.to_string(),
                status,
                message,
            });
        }

        let parent = destination
            .parent()
            .ok_or_else(|| RetrievalError::Filesystem(format!("invalid destination {destination}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".download")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut()).map_err(|err| RetrievalError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        temp.persist(destination.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, RetrievalError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(url, status, delay, "retrying download");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(url, error = %err, delay, "retrying download");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(RetrievalError::Http {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), RetrievalError> {
        let destinations = request.destinations()?;
        for (url, destination) in request.urls.iter().zip(&destinations) {
            if request.use_cache && destination.as_std_path().exists() {
                debug!(%destination, "raw file already cached");
            } else {
                info!(url, %destination, "downloading");
                self.download(url, destination)?;
            }
            if request.auto_extract {
                extract(destination, request.use_cache)?;
            }
        }
        Ok(())
    }
}

/// Unpacks `.zip` archives into their directory and decompresses `.gz` files
/// next to themselves. A marker file records completed zip extractions.
pub fn extract(path: &Utf8Path, use_cache: bool) -> Result<(), RetrievalError> {
    let parent = path
        .parent()
        .ok_or_else(|| RetrievalError::Filesystem(format!("invalid archive path {path}")))?;
    match path.extension() {
        Some("zip") => {
            let marker = parent.join(format!(".{}.extracted", path.file_name().unwrap_or("archive")));
            if use_cache && marker.as_std_path().exists() {
                return Ok(());
            }
            extract_zip(path.as_std_path(), parent.as_std_path())?;
            fs::write(marker.as_std_path(), b"")
                .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        }
        Some("gz") => {
            let target = path.with_extension("");
            if use_cache && target.as_std_path().exists() {
                return Ok(());
            }
            gunzip(path.as_std_path(), target.as_std_path())?;
        }
        _ => {}
    }
    Ok(())
}

pub fn file_name_from_url(url: &str) -> Result<String, RetrievalError> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let name = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .ok_or_else(|| {
            RetrievalError::InvalidRecipe(format!(
                "cannot derive a file name from {url}; declare explicit paths"
            ))
        })?;
    Ok(name.to_string())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_from_urls() {
        assert_eq!(
            file_name_from_url("https://example.org/data/cora.zip?download=1").unwrap(),
            "cora.zip"
        );
        assert_eq!(
            file_name_from_url("https://example.org/data/edges.tsv.gz").unwrap(),
            "edges.tsv.gz"
        );
        assert!(file_name_from_url("https://").is_err());
    }

    #[test]
    fn explicit_destinations_are_joined() {
        let urls = vec!["https://example.org/x".to_string()];
        let paths = vec![Utf8PathBuf::from("raw/edges.tsv")];
        let request = FetchRequest {
            urls: &urls,
            destination_paths: Some(&paths),
            target_dir: Utf8Path::new("/cache/ns/g/v1"),
            auto_extract: false,
            use_cache: true,
        };
        assert_eq!(
            request.destinations().unwrap(),
            vec![Utf8PathBuf::from("/cache/ns/g/v1/raw/edges.tsv")]
        );
    }
}
