//! Configuration tree fetchers.
//!
//! The comparator is pure; these collaborators supply its two inputs. One
//! source is keyed by device id (the source of truth), the other by device
//! address (the observed state).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::error::SourceError;

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the configuration tree stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Value, SourceError>;
}

/// Reads `<dir>/<key>.json`, `<dir>/<key>.yaml` or `<dir>/<key>.yml`.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ConfigSource for DirectorySource {
    async fn fetch(&self, key: &str) -> Result<Value, SourceError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(SourceError::NotFound {
                key: key.to_string(),
                location: self.dir.display().to_string(),
            });
        }

        for ext in ["json", "yaml", "yml"] {
            let path = self.dir.join(format!("{key}.{ext}"));
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(SourceError::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            };
            debug!(path = %path.display(), "loaded configuration tree");
            return parse_tree(key, ext, &content);
        }

        Err(SourceError::NotFound {
            key: key.to_string(),
            location: self.dir.display().to_string(),
        })
    }
}

/// Parse a configuration tree document. YAML is a superset of JSON, but JSON
/// files go through serde_json for exact number handling.
pub fn parse_tree(key: &str, ext: &str, content: &str) -> Result<Value, SourceError> {
    let parsed = if ext == "json" {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str::<Value>(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| SourceError::Parse {
        key: key.to_string(),
        reason,
    })
}

/// GETs a JSON tree from a URL template; `{key}` is replaced by the
/// percent-encoded key, so a key can never leave its URL component.
pub struct HttpSource {
    client: reqwest::Client,
    url_template: String,
}

impl HttpSource {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    fn url_for(&self, key: &str) -> Result<String, SourceError> {
        if matches!(key, "" | "." | "..") {
            return Err(SourceError::NotFound {
                key: key.to_string(),
                location: self.url_template.clone(),
            });
        }
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        Ok(self.url_template.replace("{key}", &encoded.replace('+', "%20")))
    }
}

#[async_trait]
impl ConfigSource for HttpSource {
    async fn fetch(&self, key: &str) -> Result<Value, SourceError> {
        let url = self.url_for(key)?;
        debug!(url = %url, "fetching configuration tree");
        let http_error = |source| SourceError::Http {
            url: url.clone(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(http_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                key: key.to_string(),
                location: url.clone(),
            });
        }
        let response = response.error_for_status().map_err(http_error)?;
        response.json().await.map_err(http_error)
    }
}

/// Placeholder used when a side has no configured source; every fetch fails.
pub struct UnconfiguredSource(pub &'static str);

#[async_trait]
impl ConfigSource for UnconfiguredSource {
    async fn fetch(&self, _key: &str) -> Result<Value, SourceError> {
        Err(SourceError::Unconfigured(self.0))
    }
}
