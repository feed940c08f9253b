use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::FetchError;
use crate::models::House;

/// Raw transcript bytes plus where they came from
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source_id: String,
    pub bytes: Vec<u8>,
    /// Markup version announced by the source, if any
    pub format_version: Option<String>,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source_id: source_id.into(),
            bytes,
            format_version: None,
        }
    }

    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = Some(version.into());
        self
    }
}

/// Read a transcript from a local file
pub fn read_document_file(path: &Path) -> Result<SourceDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    Ok(SourceDocument::new(path.display().to_string(), bytes))
}

/// Supplies the raw transcript for one sitting day
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, house: House, date: NaiveDate) -> Result<SourceDocument, FetchError>;
}

/// Reads `{root}/{house}/hansard-{date}.xml`
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, house: House, date: NaiveDate) -> PathBuf {
        self.root
            .join(house.as_str())
            .join(format!("hansard-{}.xml", date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl DocumentFetcher for DirectoryFetcher {
    async fn fetch(&self, house: House, date: NaiveDate) -> Result<SourceDocument, FetchError> {
        let path = self.path_for(house, date);
        debug!("Reading transcript {:?}", path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(SourceDocument::new(path.display().to_string(), bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(format!("{} {}", house, date)))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

/// Configuration for the HTTP transcript source
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// URL template with `{house}` and `{date}` placeholders
    pub url_template: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl HttpFetcherConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let url_template = std::env::var("HANSARD_SOURCE_URL")
            .context("HANSARD_SOURCE_URL environment variable not set")?;
        Ok(Self::new(url_template))
    }

    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            request_timeout_secs: 60,
        }
    }

    pub fn url_for(&self, house: House, date: NaiveDate) -> String {
        self.url_template
            .replace("{house}", house.as_str())
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }
}

/// Fetches transcripts over HTTP
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, house: House, date: NaiveDate) -> Result<SourceDocument, FetchError> {
        let url = self.config.url_for(house, date);
        debug!("Fetching transcript {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(format!("{} {}", house, date)));
        }
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let version = response
            .headers()
            .get("x-hansard-version")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?.to_vec();

        let document = SourceDocument::new(url, bytes);
        Ok(match version {
            Some(v) => document.with_format_version(v),
            None => document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 6).unwrap()
    }

    #[test]
    fn test_url_template() {
        let config = HttpFetcherConfig::new("https://example.org/{house}/{date}.xml");
        assert_eq!(
            config.url_for(House::Senate, date()),
            "https://example.org/senate/2024-02-06.xml"
        );
    }

    #[tokio::test]
    async fn test_directory_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        let path = fetcher.path_for(House::Hor, date());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"<hansard/>").unwrap();

        let doc = fetcher.fetch(House::Hor, date()).await.unwrap();
        assert_eq!(doc.bytes, b"<hansard/>");
        assert!(doc.source_id.ends_with("hansard-2024-02-06.xml"));

        let missing = fetcher.fetch(House::Senate, date()).await.unwrap_err();
        assert!(matches!(missing, FetchError::NotFound(_)));
    }
}
