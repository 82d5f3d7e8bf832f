//! Raw source access
//!
//! A dataset's rows come either from a file shipped with the deployment or
//! from an HTTP(S) endpoint. [`SourceFetcher`] hides the difference for
//! whole-document sources; [`socrata`] adds paging for datos.gov.co APIs.

pub mod socrata;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::debug;
use url::Url;

use crate::error::LoadTaskError;

/// Where a dataset is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl From<&str> for SourceLocation {
    /// `http://` and `https://` values are remote, anything else is a path.
    fn from(value: &str) -> Self {
        let value = value.trim();
        let lowered = value.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            if let Ok(url) = Url::parse(value) {
                return SourceLocation::Remote(url);
            }
        }
        SourceLocation::Local(PathBuf::from(value))
    }
}

impl From<String> for SourceLocation {
    fn from(value: String) -> Self {
        SourceLocation::from(value.as_str())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Remote(url) => write!(f, "{}", url),
            SourceLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for SourceLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reads whole source documents
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("alcaldia-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch a document as text.
    pub async fn fetch_text(&self, location: &SourceLocation) -> Result<String, LoadTaskError> {
        let bytes = self.fetch_bytes(location).await?;
        debug!(source = %location, bytes = bytes.len(), "Fetched source document");
        Ok(decode_text(&bytes))
    }

    pub async fn fetch_bytes(&self, location: &SourceLocation) -> Result<Vec<u8>, LoadTaskError> {
        match location {
            SourceLocation::Local(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| LoadTaskError::SourceIo {
                        location: location.to_string(),
                        source,
                    })
            },
            SourceLocation::Remote(url) => {
                let http_error = |source| LoadTaskError::Http {
                    location: location.to_string(),
                    source,
                };
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(http_error)?;
                let bytes = response.bytes().await.map_err(http_error)?;
                Ok(bytes.to_vec())
            },
        }
    }
}

/// Decode UTF-8, falling back to Latin-1 (common in spreadsheet exports).
/// A leading byte-order mark is dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> SourceFetcher {
        SourceFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_location_kind() {
        assert!(matches!(
            SourceLocation::from("https://www.datos.gov.co/resource/jbjy-vk9h.json"),
            SourceLocation::Remote(_)
        ));
        assert_eq!(
            SourceLocation::from(" data/paa_dacp.csv "),
            SourceLocation::Local(PathBuf::from("data/paa_dacp.csv"))
        );
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        // "Descripción" encoded as ISO-8859-1
        let latin1 = b"Descripci\xf3n";
        assert_eq!(decode_text(latin1), "Descripción");
    }

    #[test]
    fn test_decode_text_strips_bom() {
        assert_eq!(decode_text("\u{feff}a;b".as_bytes()), "a;b");
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "uno;dos").unwrap();

        let location = SourceLocation::Local(file.path().to_path_buf());
        assert_eq!(fetcher().fetch_text(&location).await.unwrap(), "uno;dos");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_source_error() {
        let location = SourceLocation::from("/definitely/not/here.csv");
        let err = fetcher().fetch_text(&location).await.unwrap_err();
        assert!(matches!(err, LoadTaskError::SourceIo { .. }));
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }

    #[tokio::test]
    async fn test_fetch_remote_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paa.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
            .mount(&server)
            .await;

        let location = SourceLocation::from(format!("{}/paa.csv", server.uri()));
        assert_eq!(fetcher().fetch_text(&location).await.unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_remote_error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let location = SourceLocation::from(format!("{}/paa.csv", server.uri()));
        let err = fetcher().fetch_text(&location).await.unwrap_err();
        assert!(matches!(err, LoadTaskError::Http { .. }));
    }
}
