//! C10 — configuration types and the YAML loader.
//!
//! Mirrors `spec.md` §6's configuration interfaces one-to-one:
//! `EnvironmentConfig`, `EndpointConfig`, `HostConfig`, `CacheConfig`,
//! `PoolConfig`. The core only ever consumes the parsed [`Config`] snapshot
//! — *how* it reaches the process (file, env var, secret store) is left to
//! the embedding binary, per `spec.md` §1's "file-based configuration
//! discovery" Non-goal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{EndpointKind, HttpMethod};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
	pub name: String,
	pub connection_string: String,
	pub server_name: String,
	#[serde(default)]
	pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
	pub environment: String,
	pub name: String,
	#[serde(flatten)]
	pub kind: EndpointKind,
	pub allowed_methods: Vec<HttpMethod>,
	#[serde(default)]
	pub allowed_columns: Vec<String>,
	#[serde(default)]
	pub primary_key: Option<String>,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	/// Overrides which environments may invoke this endpoint; same
	/// wildcard grammar as `AuthToken::allowed_environments`. Absent means
	/// "whatever the token allows" — this field only ever narrows further.
	#[serde(default)]
	pub allowed_environments: Option<String>,
	#[serde(default)]
	pub is_private: bool,
}

fn default_page_size() -> u32 {
	50
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
	#[serde(default)]
	pub allowed_hosts: Vec<String>,
	#[serde(default)]
	pub blocked_ip_ranges: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheProviderType {
	InMemory,
	Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCacheConfig {
	pub connection_string: String,
	pub instance_name: String,
	#[serde(default)]
	pub use_ssl: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
	pub provider_type: CacheProviderType,
	#[serde(default)]
	pub remote: Option<RemoteCacheConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
	#[serde(default = "default_min_pool_size")]
	pub min_pool_size: u32,
	#[serde(default = "default_max_pool_size")]
	pub max_pool_size: u32,
	#[serde(default = "default_connect_timeout_secs")]
	pub connection_timeout_secs: u64,
	#[serde(default = "default_command_timeout_secs")]
	pub command_timeout_secs: u64,
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub application_name: String,
}

fn default_min_pool_size() -> u32 {
	1
}
fn default_max_pool_size() -> u32 {
	10
}
fn default_connect_timeout_secs() -> u64 {
	15
}
fn default_command_timeout_secs() -> u64 {
	30
}
fn default_true() -> bool {
	true
}

impl PoolConfig {
	pub fn connection_timeout(&self) -> Duration {
		Duration::from_secs(self.connection_timeout_secs)
	}
	pub fn command_timeout(&self) -> Duration {
		Duration::from_secs(self.command_timeout_secs)
	}
}

/// Raw, on-the-wire shape of the configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
	pub environments: Vec<EnvironmentConfig>,
	#[serde(default)]
	pub endpoints: Vec<EndpointConfig>,
	#[serde(default)]
	pub host_config: HostConfig,
	pub cache_config: CacheConfig,
	pub pool_config: PoolConfig,
	#[serde(default = "default_listen_addr")]
	pub listen_addr: String,
	#[serde(default = "default_admin_addr")]
	pub admin_addr: String,
}

fn default_listen_addr() -> String {
	"0.0.0.0:8080".to_string()
}
fn default_admin_addr() -> String {
	"0.0.0.0:8081".to_string()
}

impl Default for HostConfig {
	fn default() -> Self {
		HostConfig {
			allowed_hosts: vec![],
			blocked_ip_ranges: vec![],
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to parse configuration: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("failed to read configuration file {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("endpoint {environment}/{name} references unknown environment {environment}")]
	UnknownEnvironment { environment: String, name: String },
	#[error("duplicate endpoint {environment}/{name}")]
	DuplicateEndpoint { environment: String, name: String },
	#[error("pool_config.max_pool_size must be >= min_pool_size")]
	InvalidPoolSizes,
}

/// The validated, process-wide configuration snapshot. Cheap to clone
/// (everything of substance lives behind the outer `Arc` the caller holds).
#[derive(Debug, Clone)]
pub struct Config {
	pub environments: HashMap<String, EnvironmentConfig>,
	pub endpoints: HashMap<(String, String), EndpointConfig>,
	pub host_config: HostConfig,
	pub cache_config: CacheConfig,
	pub pool_config: PoolConfig,
	pub listen_addr: String,
	pub admin_addr: String,
}

impl Config {
	pub fn load_from_str(yaml: &str) -> Result<Arc<Config>, ConfigError> {
		let doc: ConfigDocument = serde_yaml::from_str(yaml)?;
		Self::from_document(doc)
	}

	pub async fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Arc<Config>, ConfigError> {
		let path_ref = path.as_ref();
		let contents = fs_err::tokio::read_to_string(path_ref)
			.await
			.map_err(|source| ConfigError::Read {
				path: path_ref.display().to_string(),
				source,
			})?;
		Self::load_from_str(&contents)
	}

	fn from_document(doc: ConfigDocument) -> Result<Arc<Config>, ConfigError> {
		if doc.pool_config.max_pool_size < doc.pool_config.min_pool_size {
			return Err(ConfigError::InvalidPoolSizes);
		}

		let environments: HashMap<String, EnvironmentConfig> = doc
			.environments
			.into_iter()
			.map(|e| (e.name.clone(), e))
			.collect();

		let mut endpoints = HashMap::new();
		for ep in doc.endpoints {
			if !environments.contains_key(&ep.environment) {
				return Err(ConfigError::UnknownEnvironment {
					environment: ep.environment,
					name: ep.name,
				});
			}
			let key = (ep.environment.clone(), ep.name.clone());
			if endpoints.insert(key, ep.clone()).is_some() {
				return Err(ConfigError::DuplicateEndpoint {
					environment: ep.environment,
					name: ep.name,
				});
			}
		}

		Ok(Arc::new(Config {
			environments,
			endpoints,
			host_config: doc.host_config,
			cache_config: doc.cache_config,
			pool_config: doc.pool_config,
			listen_addr: doc.listen_addr,
			admin_addr: doc.admin_addr,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
environments:
  - name: "600"
    connectionString: "Server=db;Database=erp;"
    serverName: "erp-600"
cacheConfig:
  providerType: inMemory
poolConfig:
  applicationName: "gateway"
endpoints:
  - environment: "600"
    name: Products
    kind: sql
    target: "dbo.Products"
    allowedMethods: [GET]
    allowedColumns: ["ItemCode;ProductNumber", "Description"]
    primaryKey: ProductNumber
"#;

	#[test]
	fn loads_minimal_document() {
		let cfg = Config::load_from_str(MINIMAL).expect("parses");
		assert_eq!(cfg.environments.len(), 1);
		assert_eq!(cfg.pool_config.min_pool_size, 1);
		assert_eq!(cfg.pool_config.max_pool_size, 10);
		let ep = cfg
			.endpoints
			.get(&("600".to_string(), "Products".to_string()))
			.expect("endpoint present");
		assert_eq!(ep.page_size, 50);
	}

	#[test]
	fn rejects_endpoint_with_unknown_environment() {
		let doc = MINIMAL.replace(r#"environment: "600""#, r#"environment: "700""#);
		let err = Config::load_from_str(&doc).unwrap_err();
		assert!(matches!(err, ConfigError::UnknownEnvironment { .. }));
	}
}
