//! Gateway-wide error taxonomy.
//!
//! One enum for every error kind the core can produce, matching the
//! propagation policy: input/authorisation errors are client-visible,
//! configuration/internal errors are flattened to a generic 500 so nothing
//! about the backend leaks onto the wire.

use http::StatusCode;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
	// --- Input ---
	#[error("malformed route: {0}")]
	MalformedRoute(String),
	#[error("malformed OData query: {0}")]
	MalformedODataQuery(String),
	#[error("method not allowed")]
	MethodNotAllowed,
	#[error("unknown endpoint: {env}/{endpoint}")]
	UnknownEndpoint { env: String, endpoint: String },
	#[error("unknown columns: {0:?}")]
	UnknownColumns(Vec<String>),
	#[error("invalid input: {0}")]
	Input(String),

	// --- Authorisation ---
	#[error("missing bearer token")]
	MissingToken,
	#[error("unknown token")]
	UnknownToken,
	#[error("token revoked or expired")]
	RevokedOrExpired,
	#[error("environment forbidden for this token")]
	EnvironmentForbidden,
	#[error("scope forbidden for this token")]
	ScopeForbidden,

	// --- Configuration ---
	#[error("environment not allowed: {0}")]
	EnvironmentNotAllowed(String),
	#[error("environment not configured: {0}")]
	EnvironmentNotConfigured(String),
	#[error("missing column map for endpoint")]
	MissingColumnMap,
	#[error("missing primary key for endpoint")]
	MissingPrimaryKey,
	#[error("configuration error: {0}")]
	Configuration(String),

	// --- Upstream ---
	#[error("sql connection failure: {0}")]
	SqlConnection(String),
	#[error("sql command failure: {0}")]
	SqlCommand(String),
	#[error("upstream http error: {0}")]
	UpstreamHttp(String),
	#[error("destination blocked by allow-list: {0}")]
	DestinationBlocked(String),

	// --- Resource ---
	#[error("operation timed out")]
	Timeout,
	#[error("request cancelled")]
	Cancelled,
	#[error("lock acquisition timed out")]
	LockTimeout,

	// --- Internal ---
	#[error("internal assertion violated: {0}")]
	Assertion(String),
	#[error("edm build failure: {0}")]
	EdmBuild(String),
}

impl GatewayError {
	pub fn input(msg: impl Into<String>) -> Self {
		Self::Input(msg.into())
	}
	pub fn configuration(msg: impl Into<String>) -> Self {
		Self::Configuration(msg.into())
	}
	pub fn upstream(msg: impl Into<String>) -> Self {
		Self::UpstreamHttp(msg.into())
	}
	pub fn internal(msg: impl Into<String>) -> Self {
		Self::Assertion(msg.into())
	}
}

/// The stable wire body for client-visible errors: `{error, code, detail?}`.
#[derive(Serialize)]
pub struct ErrorBody {
	pub error: String,
	pub code: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detail: Option<serde_json::Value>,
}

impl GatewayError {
	/// `None` means "produce no response" — client disconnect / cancellation.
	pub fn status_code(&self) -> Option<StatusCode> {
		use GatewayError::*;
		Some(match self {
			MalformedRoute(_) | MalformedODataQuery(_) | UnknownColumns(_) | Input(_) => {
				StatusCode::BAD_REQUEST
			},
			MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
			UnknownEndpoint { .. } => StatusCode::NOT_FOUND,
			MissingToken | UnknownToken => StatusCode::UNAUTHORIZED,
			RevokedOrExpired | EnvironmentForbidden | ScopeForbidden => StatusCode::FORBIDDEN,
			EnvironmentNotAllowed(_) => StatusCode::BAD_REQUEST,
			EnvironmentNotConfigured(_) | MissingColumnMap | MissingPrimaryKey | Assertion(_)
			| EdmBuild(_) | Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
			SqlConnection(_) | SqlCommand(_) | UpstreamHttp(_) | DestinationBlocked(_) => {
				StatusCode::BAD_GATEWAY
			},
			Timeout | LockTimeout => StatusCode::GATEWAY_TIMEOUT,
			Cancelled => return None,
		})
	}

	pub fn code(&self) -> &'static str {
		use GatewayError::*;
		match self {
			MalformedRoute(_) => "malformed_route",
			MalformedODataQuery(_) => "malformed_odata_query",
			MethodNotAllowed => "method_not_allowed",
			UnknownEndpoint { .. } => "unknown_endpoint",
			UnknownColumns(_) => "unknown_columns",
			Input(_) => "invalid_input",
			MissingToken => "missing_token",
			UnknownToken => "unknown_token",
			RevokedOrExpired => "revoked_or_expired",
			EnvironmentForbidden => "environment_forbidden",
			ScopeForbidden => "scope_forbidden",
			EnvironmentNotAllowed(_) => "environment_not_allowed",
			EnvironmentNotConfigured(_) => "environment_not_configured",
			MissingColumnMap => "missing_column_map",
			MissingPrimaryKey => "missing_primary_key",
			Configuration(_) => "internal_error",
			SqlConnection(_) => "sql_connection_error",
			SqlCommand(_) => "sql_command_error",
			UpstreamHttp(_) => "upstream_http_error",
			DestinationBlocked(_) => "destination_blocked",
			Timeout => "timeout",
			Cancelled => "cancelled",
			LockTimeout => "lock_timeout",
			Assertion(_) => "internal_error",
			EdmBuild(_) => "internal_error",
		}
	}

	/// Detail leaked onto the wire. `None` for configuration/internal kinds —
	/// those only ever log the real cause.
	pub fn detail(&self) -> Option<serde_json::Value> {
		use GatewayError::*;
		match self {
			UnknownColumns(cols) => Some(serde_json::json!({ "columns": cols })),
			UnknownEndpoint { env, endpoint } => {
				Some(serde_json::json!({ "environment": env, "endpoint": endpoint }))
			},
			MalformedRoute(msg) | MalformedODataQuery(msg) => {
				Some(serde_json::json!({ "message": msg }))
			},
			_ => None,
		}
	}

	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			GatewayError::EnvironmentNotConfigured(_)
				| GatewayError::MissingColumnMap
				| GatewayError::MissingPrimaryKey
				| GatewayError::Assertion(_)
				| GatewayError::EdmBuild(_)
		)
	}

	pub fn to_body(&self) -> ErrorBody {
		ErrorBody {
			error: self.to_string(),
			code: self.code(),
			detail: self.detail(),
		}
	}
}
