//! C7 — environment settings resolver (`spec.md` §4.7).
//!
//! Thin lookup over the validated [`crate::config::Config`] snapshot: a
//! resolved environment's connection string, server name and header bag.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::GatewayError;

use crate::config::Config;

/// What C7 hands back to the router: everything downstream handlers need to
/// talk to this tenant's backend, without borrowing from [`Config`].
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
	pub connection_string: String,
	pub server_name: String,
	pub headers: HashMap<String, String>,
}

/// `load(env) → (connectionString, serverName, headers)`. Distinguishes
/// "not listed at all" from "listed but missing connection data" per
/// `spec.md` §4.7, even though the current `EnvironmentConfig` always
/// carries a connection string — the latter case covers a future config
/// shape where the field is optional.
pub fn load(config: &Config, env: &str) -> Result<ResolvedEnvironment, GatewayError> {
	let entry = config
		.environments
		.get(env)
		.ok_or_else(|| GatewayError::EnvironmentNotAllowed(env.to_string()))?;

	if entry.connection_string.trim().is_empty() {
		return Err(GatewayError::EnvironmentNotConfigured(env.to_string()));
	}

	Ok(ResolvedEnvironment {
		connection_string: entry.connection_string.clone(),
		server_name: entry.server_name.clone(),
		headers: entry.headers.clone(),
	})
}

/// Same contract, for callers already holding an `Arc<Config>` snapshot —
/// the shape the router passes around per `spec.md` §5 "each request sees a
/// snapshot of configuration captured at start".
pub fn load_arc(config: &Arc<Config>, env: &str) -> Result<ResolvedEnvironment, GatewayError> {
	load(config, env)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config_with_env(name: &str, conn: &str) -> Arc<Config> {
		let yaml = format!(
			"environments:\n  - name: \"{name}\"\n    connectionString: \"{conn}\"\n    serverName: \"srv-{name}\"\n\
			 cacheConfig:\n  providerType: inMemory\npoolConfig:\n  applicationName: \"gateway\"\n"
		);
		Config::load_from_str(&yaml).expect("parses")
	}

	#[test]
	fn unknown_environment_is_not_allowed() {
		let config = config_with_env("600", "Server=db;");
		let err = load_arc(&config, "700").unwrap_err();
		assert!(matches!(err, GatewayError::EnvironmentNotAllowed(e) if e == "700"));
	}

	#[test]
	fn known_environment_resolves_connection_and_headers() {
		let config = config_with_env("600", "Server=db;Database=erp;");
		let resolved = load_arc(&config, "600").expect("resolves");
		assert_eq!(resolved.connection_string, "Server=db;Database=erp;");
		assert_eq!(resolved.server_name, "srv-600");
		assert!(resolved.headers.is_empty());
	}

	#[test]
	fn blank_connection_string_is_not_configured() {
		let config = config_with_env("600", "");
		let err = load_arc(&config, "600").unwrap_err();
		assert!(matches!(err, GatewayError::EnvironmentNotConfigured(e) if e == "600"));
	}
}
