//! Pipeline configuration
//!
//! Built once per run (from the environment or by hand) and passed into the
//! [`Pipeline`](crate::pipeline::Pipeline). Nothing here is global.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use zipenrich_common::{Result, ZipEnrichError};

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

// ============================================================================
// Defaults
// ============================================================================

/// Default FTP port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default MongoDB connection string for local development.
pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017/";

/// Default collection holding one document per user.
pub const DEFAULT_MONGO_COLLECTION: &str = "users";

/// Default identifier column (CSV) and field (MongoDB).
pub const DEFAULT_ID_COLUMN: &str = "userid";

/// Suffix of the archives picked up from the source directory.
pub const DEFAULT_ARCHIVE_SUFFIX: &str = ".zip";

/// Suffix of the tabular payload inside each archive.
pub const DEFAULT_PAYLOAD_SUFFIX: &str = ".csv";

/// Prefix added to every uploaded file name.
pub const DEFAULT_OUTPUT_PREFIX: &str = "updated_";

/// Marker in an archive name that limits enrichment to the date of birth.
pub const DEFAULT_RESTRICTED_MARKER: &str = "_dob_only_";

/// Complete configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub reference: ReferenceConfig,
    pub archive: ArchiveConfig,
    pub enrich: EnrichConfig,
    pub retry: RetryPolicy,
}

/// Remote file store (FTP) connection and directories
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Directory the archives are read from
    pub source_dir: String,
    /// Directory the enriched tables are written to (may equal `source_dir`)
    pub output_dir: String,
}

/// Reference document store (MongoDB)
#[derive(Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Field holding the identifier in each document
    pub id_field: String,
}

/// Archive matching and decryption
#[derive(Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Passphrase shared by every archive in a run
    pub password: String,
    pub archive_suffix: String,
    pub payload_suffix: String,
}

/// Table enrichment and output naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Identifier column in the CSV payload
    pub id_column: String,
    pub restricted_marker: String,
    pub output_prefix: String,
}

impl PipelineConfig {
    /// Load configuration from environment variables (and `.env` if present)
    ///
    /// Required: `FTP_HOST`, `FTP_USER`, `FTP_PASSWORD`, `FTP_SOURCE_DIR`,
    /// `ZIP_PASSWORD`, `MONGO_DB`.
    ///
    /// Optional: `FTP_PORT`, `FTP_OUTPUT_DIR` (defaults to the source directory),
    /// `MONGO_URI`, `MONGO_COLLECTION`, `ID_COLUMN`, `RETRY_MAX_ATTEMPTS`,
    /// `RETRY_BASE_DELAY_MS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let source_dir = required("FTP_SOURCE_DIR")?;
        let id_column = optional("ID_COLUMN", DEFAULT_ID_COLUMN);

        let config = Self {
            store: StoreConfig {
                host: required("FTP_HOST")?,
                port: parsed("FTP_PORT", DEFAULT_FTP_PORT)?,
                username: required("FTP_USER")?,
                password: required("FTP_PASSWORD")?,
                output_dir: optional("FTP_OUTPUT_DIR", &source_dir),
                source_dir,
            },
            reference: ReferenceConfig {
                uri: optional("MONGO_URI", DEFAULT_MONGO_URI),
                database: required("MONGO_DB")?,
                collection: optional("MONGO_COLLECTION", DEFAULT_MONGO_COLLECTION),
                id_field: id_column.clone(),
            },
            archive: ArchiveConfig {
                password: required("ZIP_PASSWORD")?,
                ..ArchiveConfig::default()
            },
            enrich: EnrichConfig {
                id_column,
                ..EnrichConfig::default()
            },
            retry: RetryPolicy::new(
                parsed("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
                Duration::from_millis(parsed("RETRY_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS)?),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly produce a working run
    pub fn validate(&self) -> Result<()> {
        if self.store.host.trim().is_empty() {
            return Err(ZipEnrichError::config("FTP host must not be empty"));
        }
        if self.store.source_dir.trim().is_empty() || self.store.output_dir.trim().is_empty() {
            return Err(ZipEnrichError::config("FTP source and output directories must be set"));
        }
        if self.archive.password.is_empty() {
            return Err(ZipEnrichError::config("ZIP_PASSWORD must not be empty"));
        }
        if self.enrich.id_column.trim().is_empty() {
            return Err(ZipEnrichError::config("ID_COLUMN must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ZipEnrichError::config("RETRY_MAX_ATTEMPTS must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_FTP_PORT,
            username: "anonymous".to_string(),
            password: String::new(),
            source_dir: "/".to_string(),
            output_dir: "/".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(host: impl Into<String>, source_dir: impl Into<String>) -> Self {
        let source_dir = source_dir.into();
        Self {
            host: host.into(),
            output_dir: source_dir.clone(),
            source_dir,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// `host:port` as passed to the FTP client
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source_dir", &self.source_dir)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MONGO_URI.to_string(),
            database: String::new(),
            collection: DEFAULT_MONGO_COLLECTION.to_string(),
            id_field: DEFAULT_ID_COLUMN.to_string(),
        }
    }
}

impl ReferenceConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

impl std::fmt::Debug for ReferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URI may embed credentials
        f.debug_struct("ReferenceConfig")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("id_field", &self.id_field)
            .finish()
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
            payload_suffix: DEFAULT_PAYLOAD_SUFFIX.to_string(),
        }
    }
}

impl ArchiveConfig {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..Self::default()
        }
    }

    /// Payload file name derived from an archive name: `grp1_a.zip` -> `grp1_a.csv`
    pub fn payload_name(&self, archive_name: &str) -> String {
        let stem = std::path::Path::new(archive_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(archive_name);
        format!("{}{}", stem, self.payload_suffix)
    }
}

impl std::fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("password", &"<redacted>")
            .field("archive_suffix", &self.archive_suffix)
            .field("payload_suffix", &self.payload_suffix)
            .finish()
    }
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            id_column: DEFAULT_ID_COLUMN.to_string(),
            restricted_marker: DEFAULT_RESTRICTED_MARKER.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl EnrichConfig {
    /// Whether `file_name` carries the restricted-mode marker (case-insensitive)
    pub fn is_restricted(&self, file_name: &str) -> bool {
        file_name
            .to_lowercase()
            .contains(&self.restricted_marker.to_lowercase())
    }
}

fn required(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| ZipEnrichError::config(format!("{} must be set", var)))
}

fn optional(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(var: &str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ZipEnrichError::invalid_value(var, raw)),
        Err(_) => Ok(default),
    }
}
