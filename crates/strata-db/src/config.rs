//! Backend selection configuration
//!
//! One opaque URL chooses the storage implementation at construction
//! time: `postgres://` / `postgresql://` for the relational backend,
//! `document://` for the embedded document store. Anything else fails
//! construction with a configuration error.

use url::Url;

use crate::error::{DataError, DataResult};

/// Storage flavors the engine can be constructed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Document,
}

/// Connection configuration for the data access engine
#[derive(Debug, Clone)]
pub struct DataConfig {
    url: String,
}

impl DataConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The raw connection URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve the backend the URL selects
    pub fn backend_kind(&self) -> DataResult<BackendKind> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| DataError::Configuration(format!("invalid connection URL: {e}")))?;
        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            "document" => Ok(BackendKind::Document),
            other => Err(DataError::Configuration(format!(
                "unknown backend selection '{other}'"
            ))),
        }
    }
}
