//! C8 — request admission and routing (`spec.md` §4.8).
//!
//! State machine per request:
//!
//! ```text
//! ACCEPT → PARSE_ROUTE → CHECK_METHOD → AUTHZ → RESOLVE_ENV → DISPATCH → RESPOND
//!         \______________ any step may fail → RESPOND(error) ______________/
//! ```
//!
//! `AppState` is the process-wide composition root: every long-lived
//! dependency (C1-C7, C10) a request might touch, assembled once at startup
//! and cheaply cloned per request via the `Arc`s it holds — the same
//! `Arc<Config>`-snapshot shape the teacher uses for its own listener state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use parking_lot::RwLock as SyncRwLock;
use sqlx::PgPool;

use gateway_core::GatewayError;

use crate::cache::CacheProvider;
use crate::config::Config;
use crate::edm::EdmRegistry;
use crate::model::HttpMethod;
use crate::sql::SqlPool;
use crate::token::{AuditContext, TokenGuard};
use crate::urlallowlist::UrlAllowList;
use crate::{Body, Response};

/// Everything a request might need, assembled once at process start.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub sql_pool: Arc<SqlPool>,
	pub cache: Arc<dyn CacheProvider>,
	pub edm: Arc<EdmRegistry>,
	pub allow_list: Arc<UrlAllowList>,
	pub token_guard: Arc<TokenGuard>,
	pub http_client: reqwest::Client,
	env_pools: Arc<SyncRwLock<HashMap<String, PgPool>>>,
}

impl AppState {
	pub fn new(
		config: Arc<Config>,
		sql_pool: Arc<SqlPool>,
		cache: Arc<dyn CacheProvider>,
		edm: Arc<EdmRegistry>,
		allow_list: Arc<UrlAllowList>,
		token_guard: Arc<TokenGuard>,
	) -> Self {
		AppState {
			config,
			sql_pool,
			cache,
			edm,
			allow_list,
			token_guard,
			http_client: reqwest::Client::new(),
			env_pools: Arc::new(SyncRwLock::new(HashMap::new())),
		}
	}

	/// Returns the live `PgPool` for an already-optimised connection string,
	/// creating (and caching) it on first use. Separate from `SqlPool`'s own
	/// keep-alive map (`spec.md` §5 "keep-alive connections are exclusively
	/// owned by the maintenance task and never handed to request handlers").
	pub async fn pool_for_env(&self, connection_string: &str) -> Result<PgPool, GatewayError> {
		if let Some(pool) = self.env_pools.read().get(connection_string) {
			return Ok(pool.clone());
		}
		let pool = self.sql_pool.create(connection_string).await?;
		self.env_pools.write().insert(connection_string.to_string(), pool.clone());
		Ok(pool)
	}
}

/// Builds the data-plane router: `/api/{env}/{endpoint}` and
/// `/api/{env}/{endpoint}/{id}`, both open to every method — `CHECK_METHOD`
/// is enforced inside the state machine, not by axum's route table, so a
/// disallowed method produces the spec's 405 rather than axum's own 404.
pub fn build_router(state: AppState) -> axum::Router {
	axum::Router::new()
		.route("/api/{env}/{endpoint}", axum::routing::any(handle_collection))
		.route("/api/{env}/{endpoint}/{id}", axum::routing::any(handle_item))
		.with_state(state)
}

async fn handle_collection(
	State(state): State<AppState>,
	Path((env, endpoint)): Path<(String, String)>,
	method: Method,
	headers: HeaderMap,
	RawQuery(query): RawQuery,
	body: Bytes,
) -> Response {
	admit_and_dispatch(state, env, endpoint, None, method, headers, query, body).await
}

async fn handle_item(
	State(state): State<AppState>,
	Path((env, endpoint, id)): Path<(String, String, String)>,
	method: Method,
	headers: HeaderMap,
	RawQuery(query): RawQuery,
	body: Bytes,
) -> Response {
	admit_and_dispatch(state, env, endpoint, Some(id), method, headers, query, body).await
}

/// Runs the full `spec.md` §4.8 state machine for one request. Every
/// fallible step short-circuits straight to `RESPOND(error)`; nothing after
/// a failed step executes.
async fn admit_and_dispatch(
	state: AppState,
	env_name: String,
	endpoint_name: String,
	id: Option<String>,
	method: Method,
	headers: HeaderMap,
	query: Option<String>,
	body: Bytes,
) -> Response {
	let span = tracing::info_span!("request", env = %env_name, endpoint = %endpoint_name, method = %method);
	let _enter = span.enter();

	match run_pipeline(&state, &env_name, &endpoint_name, id.as_deref(), &method, &headers, query.as_deref(), body).await {
		Ok(response) => response,
		Err(e) => error_response(e),
	}
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
	state: &AppState,
	env_name: &str,
	endpoint_name: &str,
	id: Option<&str>,
	method: &Method,
	headers: &HeaderMap,
	query: Option<&str>,
	body: Bytes,
) -> Result<Response, GatewayError> {
	// PARSE_ROUTE already happened via axum's path extraction. An unconfigured
	// environment is rejected here, before the endpoint lookup, so `spec.md`
	// §8 scenario 5 (unknown environment) yields `EnvironmentNotAllowed`
	// rather than being shadowed by `UnknownEndpoint`.
	if !state.config.environments.contains_key(env_name) {
		return Err(GatewayError::EnvironmentNotAllowed(env_name.to_string()));
	}

	let endpoint = state
		.config
		.endpoints
		.get(&(env_name.to_string(), endpoint_name.to_string()))
		.ok_or_else(|| GatewayError::UnknownEndpoint {
			env: env_name.to_string(),
			endpoint: endpoint_name.to_string(),
		})?
		.clone();

	// CHECK_METHOD
	let requested = HttpMethod::from_http(method).ok_or(GatewayError::MethodNotAllowed)?;
	if !endpoint.allowed_methods.contains(&requested) {
		return Err(GatewayError::MethodNotAllowed);
	}

	// AUTHZ
	let bearer = bearer_token(headers);
	let ctx = AuditContext {
		operation: method.as_str(),
		source: env_name,
		ip: None,
		user_agent: headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok()),
	};
	let effective_scope_list = endpoint.allowed_environments.as_deref();
	let _principal = state
		.token_guard
		.authorise(bearer.as_deref(), env_name, endpoint_name, ctx)
		.await
		.map_err(GatewayError::from)?;
	if let Some(allowed) = effective_scope_list
		&& !crate::model::matches_wildcard_list(allowed, env_name)
	{
		return Err(GatewayError::EnvironmentForbidden);
	}

	// RESOLVE_ENV
	let resolved_env = crate::env::load(&state.config, env_name)?;

	// DISPATCH
	crate::handlers::dispatch(state, env_name, &resolved_env, &endpoint, id, method, query, body).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
	let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
	value.strip_prefix("Bearer ").map(str::to_string)
}

fn error_response(e: GatewayError) -> Response {
	let Some(status) = e.status_code() else {
		// `None` means "produce no response" (client disconnect/cancellation);
		// axum still needs *something*, so the connection is simply dropped
		// by the caller observing the future cancelled — this path is only
		// reached if the error somehow escaped that cancellation handling.
		return StatusCode::NO_CONTENT.into_response();
	};
	if e.is_internal() {
		tracing::error!(error = %e, "internal error");
	}
	let body = e.to_body();
	(status, axum::Json(body)).into_response()
}

/// Builds the admin router: `/health/live` (no auth) and `/health`,
/// `/health/details` (auth required, per `spec.md` §6). Content of the
/// health checks themselves is out of scope (`spec.md` §1); this only wires
/// the hook the embedding process (`gateway-app`) mounts.
pub fn build_admin_router(state: AppState) -> axum::Router {
	axum::Router::new()
		.route("/health/live", axum::routing::get(|| async { "Alive" }))
		.route("/health", axum::routing::get(health_details))
		.route("/health/details", axum::routing::get(health_details))
		.with_state(state)
}

async fn health_details(State(state): State<AppState>, headers: HeaderMap) -> Response {
	let bearer = bearer_token(&headers);
	let ctx = AuditContext {
		operation: "health",
		source: "admin",
		ip: None,
		user_agent: None,
	};
	if state.token_guard.authorise(bearer.as_deref(), "*", "health", ctx).await.is_err() {
		return error_response(GatewayError::MissingToken);
	}
	let body = serde_json::json!({
		"status": "Healthy",
		"timestamp": chrono::Utc::now().to_rfc3339(),
		"checks": {
			"cache": format!("{:?}", state.cache.provider_kind()),
			"cacheConnected": state.cache.is_connected(),
		},
	});
	(StatusCode::OK, axum::Json(body)).into_response()
}

/// Pulled out of `lib.rs`'s `Response`/`Body` aliases so handlers can build
/// framework-agnostic values; kept here since it's only ever constructed by
/// the router/handlers pair.
pub fn json_response(status: StatusCode, value: serde_json::Value) -> Response {
	let bytes = serde_json::to_vec(&value).unwrap_or_default();
	axum::http::Response::builder()
		.status(status)
		.header(axum::http::header::CONTENT_TYPE, "application/json")
		.body(Body::from(bytes))
		.expect("valid response")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_token_strips_prefix() {
		let mut headers = HeaderMap::new();
		headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
		assert_eq!(bearer_token(&headers), Some("abc123".to_string()));
	}

	#[test]
	fn missing_authorization_header_yields_none() {
		let headers = HeaderMap::new();
		assert_eq!(bearer_token(&headers), None);
	}

	/// `spec.md` §8 scenario 5: an unconfigured environment is rejected with
	/// 400 (`EnvironmentNotAllowed`), not 404 — `run_pipeline` checks
	/// environment existence before it ever looks the endpoint up.
	#[test]
	fn unknown_environment_maps_to_bad_request() {
		let err = GatewayError::EnvironmentNotAllowed("invalid".to_string());
		assert_eq!(err.status_code(), Some(StatusCode::BAD_REQUEST));
	}

	/// A known environment with no matching endpoint is still a plain 404.
	#[test]
	fn unknown_endpoint_maps_to_not_found() {
		let err = GatewayError::UnknownEndpoint {
			env: "600".to_string(),
			endpoint: "NoSuchEndpoint".to_string(),
		};
		assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
	}

	/// `spec.md` §8 scenario 6: missing bearer token → 401.
	#[test]
	fn missing_token_maps_to_unauthorized() {
		assert_eq!(GatewayError::MissingToken.status_code(), Some(StatusCode::UNAUTHORIZED));
	}
}
