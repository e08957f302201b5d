use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::format::{DocumentFormat, UnsupportedFormat};

/// Where document bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        if let Ok(url) = Url::parse(raw) {
            match url.scheme() {
                "http" | "https" => return SourceLocation::Remote(url),
                "file" => {
                    if let Ok(path) = url.to_file_path() {
                        return SourceLocation::Local(path);
                    }
                }
                _ => {}
            }
        }
        SourceLocation::Local(PathBuf::from(raw))
    }

    /// Last path segment, used for display and download names.
    pub fn file_name(&self) -> String {
        let name = match self {
            SourceLocation::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    urlencoding::decode(segment)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| segment.to_string())
                }),
            SourceLocation::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        };
        name.unwrap_or_else(|| "document".to_string())
    }

    fn extension_hint(&self) -> Option<DocumentFormat> {
        DocumentFormat::from_path(Path::new(&self.file_name()))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Remote(url) => write!(f, "{url}"),
            SourceLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Inputs for mounting one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSource {
    pub location: SourceLocation,
    pub format: DocumentFormat,
    pub initial_page: Option<u32>,
    pub initial_query: Option<String>,
}

impl DocumentSource {
    /// Uses the explicit tag when given, otherwise the file extension.
    pub fn new(raw: &str, format: Option<DocumentFormat>) -> Result<Self, UnsupportedFormat> {
        let location = SourceLocation::parse(raw);
        let format = match format.or_else(|| location.extension_hint()) {
            Some(format) => format,
            None => return Err(UnsupportedFormat(raw.to_string())),
        };
        Ok(Self {
            location,
            format,
            initial_page: None,
            initial_query: None,
        })
    }

    pub fn with_initial_page(mut self, page: Option<u32>) -> Self {
        self.initial_page = page;
        self
    }

    pub fn with_initial_query(mut self, query: Option<String>) -> Self {
        self.initial_query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn file_name(&self) -> String {
        self.location.file_name()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not signed in or session expired while fetching {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },
    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn from_status(url: String, status: u16) -> Self {
        match status {
            401 | 403 => FetchError::Unauthorized { url, status },
            _ => FetchError::Status { url, status },
        }
    }
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes, FetchError>;
}

/// Fetches remote documents with an optional bearer token and reads local files.
pub struct DocumentFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl DocumentFetcher {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kbview/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, token })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl ByteSource for DocumentFetcher {
    #[instrument(skip(self, location), fields(location = %location))]
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes, FetchError> {
        match location {
            SourceLocation::Remote(url) => {
                let mut request = self.client.get(url.clone());
                if let Some(token) = &self.token {
                    request = request.bearer_auth(token);
                }
                let transport = |err: reqwest::Error| FetchError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                };
                let response = request.send().await.map_err(transport)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::from_status(url.to_string(), status.as_u16()));
                }
                let bytes = response.bytes().await.map_err(transport)?;
                debug!(len = bytes.len(), "fetched document");
                Ok(bytes)
            }
            SourceLocation::Local(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Persistent client-side storage holding the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read token file {:?}", self.path))?;
        let token = raw.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.lock() = token;
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().clone())
    }
}
