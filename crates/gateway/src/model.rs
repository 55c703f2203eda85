//! Shared data-model types referenced by more than one component.
//!
//! Per-component types that only one module cares about (e.g. `ColumnMap`
//! in [`crate::odata`], `LockHandle` in [`crate::cache`]) live there instead.

use serde::{Deserialize, Serialize};

/// `GET | POST | PUT | DELETE | MERGE`, per `spec.md` §3 `EndpointDefinition.allowedMethods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	Get,
	Post,
	Put,
	Delete,
	Merge,
}

impl HttpMethod {
	pub fn from_http(method: &http::Method) -> Option<Self> {
		match method.as_str() {
			"GET" => Some(Self::Get),
			"POST" => Some(Self::Post),
			"PUT" => Some(Self::Put),
			"DELETE" => Some(Self::Delete),
			"MERGE" => Some(Self::Merge),
			_ => None,
		}
	}
}

/// What kind of backend an endpoint dispatches to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EndpointKind {
	Sql {
		/// `schema.table` or `schema.procedure`.
		target: String,
	},
	Proxy {
		/// Upstream URL template; may reference `{id}` and env headers.
		url_template: String,
	},
	Composite {
		/// Sub-calls fanned out to, by endpoint name within the same environment.
		calls: Vec<String>,
	},
}

/// A persisted bearer token row (`spec.md` §3 `AuthToken`).
///
/// `token_hash`/`token_salt` are opaque to everything except
/// [`crate::token`], which owns hashing and constant-time comparison.
#[derive(Debug, Clone)]
pub struct AuthToken {
	pub id: uuid::Uuid,
	pub username: String,
	pub token_hash: String,
	pub token_salt: String,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
	pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
	/// Comma list, or `*`; entries may end in `*` for a prefix wildcard.
	pub allowed_scopes: String,
	pub allowed_environments: String,
	pub description: Option<String>,
}

impl AuthToken {
	/// `spec.md` §3: "validity requires revokedAt IS NULL ∧ (expiresAt IS NULL ∨ expiresAt > now)".
	pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
		self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
	}
}

/// Matches a comma-separated allow-list entry against a candidate, honouring
/// `*` (universal) and a trailing `*` (prefix wildcard). Shared by the
/// environment and scope checks in [`crate::token`].
pub fn matches_wildcard_list(list: &str, candidate: &str) -> bool {
	list.split(',').map(str::trim).any(|entry| {
		if entry == "*" {
			true
		} else if let Some(prefix) = entry.strip_suffix('*') {
			candidate.starts_with(prefix)
		} else {
			entry == candidate
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_list_matches() {
		assert!(matches_wildcard_list("*", "anything"));
		assert!(matches_wildcard_list("A,B*", "A"));
		assert!(matches_wildcard_list("A,B*", "Banana"));
		assert!(!matches_wildcard_list("A,B*", "C"));
		assert!(matches_wildcard_list(" A , B* ", "A"));
	}
}
