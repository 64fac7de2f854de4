/*!
 * Configuration types for orbit-cloud
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{BackendKind, ClientOptions, StorageConnection};
use crate::core::transfer::FailurePolicy;
use crate::error::{CloudError, Result};

/// Top-level configuration file
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [engine]
/// batch_size = 50
///
/// [[connections]]
/// id = "minio"
/// name = "Local MinIO"
/// kind = "s3-compatible"
/// endpoint = "http://localhost:9000"
/// access_key_id = "minioadmin"
/// secret_access_key = "minioadmin"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Write JSON logs to this file instead of stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Verbose logging (forces debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Tunables of the listing, tree and transfer engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent primitive operations per tree-operation batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bytes per ranged download request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Uploads above this size use multipart
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Bytes per multipart part
    #[serde(default = "default_part_size")]
    pub multipart_part_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// What a folder transfer does after a file fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            multipart_threshold: default_multipart_threshold(),
            multipart_part_size: default_part_size(),
            request_timeout_secs: default_request_timeout(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Options handed to the client factory
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            multipart_threshold: self.multipart_threshold,
            part_size: self.multipart_part_size,
        }
    }
}

// Default value functions for serde
fn default_batch_size() -> usize {
    crate::core::tree::DEFAULT_BATCH_SIZE
}

fn default_chunk_size() -> u64 {
    crate::core::transfer::DEFAULT_CHUNK_SIZE
}

fn default_multipart_threshold() -> u64 {
    5 * 1024 * 1024
}

fn default_part_size() -> usize {
    5 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    300
}

/// One `[[connections]]` entry
///
/// Secrets are read as plain strings and wrapped as soon as the entry is
/// turned into a [`StorageConnection`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Path to a service account key file, or the key JSON itself
    #[serde(default, skip_serializing)]
    pub service_account_key: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("force_path_style", &self.force_path_style)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl From<&ConnectionConfig> for StorageConnection {
    fn from(config: &ConnectionConfig) -> Self {
        let mut connection = StorageConnection::new(config.id.clone(), config.name.clone(), config.kind);
        connection.region = config.region.clone();
        connection.endpoint = config.endpoint.clone();
        connection.access_key_id = config.access_key_id.clone();
        connection.secret_access_key = config.secret_access_key.clone().map(secret);
        connection.session_token = config.session_token.clone().map(secret);
        connection.force_path_style = config.force_path_style;
        connection.project_id = config.project_id.clone();
        connection.service_account_key = config.service_account_key.clone().map(secret);
        connection
    }
}

fn secret(value: String) -> secrecy::SecretString {
    secrecy::SecretString::new(value.into_boxed_str())
}

impl CloudConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: CloudConfig = toml::from_str(&contents).map_err(|source| CloudError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file; secrets are never written back
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check engine bounds, connection ids and every connection definition
    pub fn validate(&self) -> Result<()> {
        if self.engine.batch_size == 0 {
            return Err(CloudError::Config("engine.batch_size must be at least 1".to_string()));
        }
        if self.engine.chunk_size == 0 {
            return Err(CloudError::Config("engine.chunk_size must be at least 1".to_string()));
        }
        if self.engine.multipart_part_size == 0 {
            return Err(CloudError::Config(
                "engine.multipart_part_size must be at least 1".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for connection in &self.connections {
            if !seen.insert(connection.id.as_str()) {
                return Err(CloudError::Config(format!(
                    "duplicate connection id '{}'",
                    connection.id
                )));
            }
            StorageConnection::from(connection).validate()?;
        }
        Ok(())
    }

    /// Connection with the given id
    pub fn connection(&self, id: &str) -> Result<StorageConnection> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .map(StorageConnection::from)
            .ok_or_else(|| CloudError::UnknownConnection(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
        [logging]
        level = "debug"

        [engine]
        batch_size = 25
        failure_policy = "continue"

        [[connections]]
        id = "aws"
        name = "Production"
        kind = "aws-s3"
        region = "eu-west-1"
        access_key_id = "AKIA123"
        secret_access_key = "shh"

        [[connections]]
        id = "gcs"
        name = "Analytics"
        kind = "google-cloud-storage"
        project_id = "analytics-prod"
        service_account_key = "/etc/keys/sa.json"
    "#;

    #[test]
    fn test_default_config() {
        let config = CloudConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.engine.batch_size, 100);
        assert_eq!(config.engine.chunk_size, 1024 * 1024);
        assert_eq!(config.engine.failure_policy, FailurePolicy::StopOnFirstFailure);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config: CloudConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.engine.batch_size, 25);
        assert_eq!(config.engine.chunk_size, 1024 * 1024);
        assert_eq!(config.engine.failure_policy, FailurePolicy::Continue);

        let aws = config.connection("aws").unwrap();
        assert_eq!(aws.kind, BackendKind::AwsS3);
        assert_eq!(aws.region.as_deref(), Some("eu-west-1"));
        assert_eq!(aws.secret_access_key.unwrap().expose_secret(), "shh");

        let gcs = config.connection("gcs").unwrap();
        assert_eq!(gcs.project_id.as_deref(), Some("analytics-prod"));
        assert!(gcs.service_account_key.is_some());
    }

    #[test]
    fn test_unknown_connection() {
        let config: CloudConfig = toml::from_str(SAMPLE).unwrap();
        assert!(matches!(
            config.connection("nope"),
            Err(CloudError::UnknownConnection(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_validate_rejects_incomplete_connection() {
        let config: CloudConfig = toml::from_str(
            r#"
            [[connections]]
            id = "minio"
            name = "MinIO"
            kind = "s3-compatible"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(CloudError::Backend(_))));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_batch() {
        let mut config: CloudConfig = toml::from_str(SAMPLE).unwrap();
        config.connections.push(config.connections[0].clone());
        assert!(matches!(config.validate(), Err(CloudError::Config(_))));

        let mut config = CloudConfig::default();
        config.engine.batch_size = 0;
        assert!(matches!(config.validate(), Err(CloudError::Config(_))));
    }

    #[test]
    fn test_to_file_omits_secrets() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orbit-cloud.toml");
        let config: CloudConfig = toml::from_str(SAMPLE).unwrap();
        config.to_file(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("AKIA123"));
        assert!(!written.contains("shh"));
        assert!(!written.contains("sa.json"));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[engine\nbatch_size = ").unwrap();
        assert!(matches!(CloudConfig::from_file(&path), Err(CloudError::Toml { .. })));
    }

    #[test]
    fn test_client_options_follow_engine() {
        let engine = EngineConfig {
            request_timeout_secs: 30,
            ..Default::default()
        };
        let options = engine.client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.part_size, 5 * 1024 * 1024);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config: CloudConfig = toml::from_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config.connections[0]);
        assert!(!debug.contains("shh"));
    }
}
