//! C6 — bearer token validation and scope/environment matching, plus C13 the
//! token-management storage layer it depends on (`spec.md` §4.6, `AuthToken`
//! in §3). The external token-management CLI itself is out of scope
//! (`spec.md` §1) but the store and hashing routine it would call into are
//! in scope, grounded in the teacher's `http/pat.rs` Argon2id token design.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use chrono::{DateTime, Utc};
use rand::Rng as _;
use rand::distr::Alphanumeric;
use sqlx::PgPool;

use gateway_core::GatewayError;

use crate::audit::{AuditRecord, AuditSink};
use crate::model::{AuthToken, matches_wildcard_list};

const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// Length of the plaintext index prefix stored alongside each token's hash,
/// matching the teacher's `PREFIX_LEN` in `http/pat.rs`.
const PREFIX_LEN: usize = 24;

fn token_prefix(raw: &str) -> String {
	raw.chars().take(PREFIX_LEN).collect()
}

fn argon2() -> Argon2<'static> {
	let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, None).expect("valid argon2 params");
	Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Why a request was rejected, per `spec.md` §4.6 — collapsed to 401 for
/// `MissingToken`/`UnknownToken`, 403 for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
	MissingToken,
	UnknownToken,
	RevokedOrExpired,
	EnvironmentForbidden,
	ScopeForbidden,
}

impl From<RejectReason> for GatewayError {
	fn from(reason: RejectReason) -> Self {
		match reason {
			RejectReason::MissingToken => GatewayError::MissingToken,
			RejectReason::UnknownToken => GatewayError::UnknownToken,
			RejectReason::RevokedOrExpired => GatewayError::RevokedOrExpired,
			RejectReason::EnvironmentForbidden => GatewayError::EnvironmentForbidden,
			RejectReason::ScopeForbidden => GatewayError::ScopeForbidden,
		}
	}
}

/// The authorised principal handed back to the router on success.
#[derive(Debug, Clone)]
pub struct Principal {
	pub token_id: uuid::Uuid,
	pub username: String,
}

/// `TokenStore` backs both C6's lookup path and C13's CRUD surface.
/// Generic over the pool type isn't worth it here: the teacher's own token
/// store (`http/pat.rs::TokenRepo`) is a thin wrapper around `PgPool`, and
/// `spec.md` §6 only promises "SQLite-like semantics", not a specific vendor.
#[derive(Clone)]
pub struct TokenStore {
	pool: PgPool,
}

impl TokenStore {
	pub fn new(pool: PgPool) -> Self {
		TokenStore { pool }
	}

	/// Looks a candidate token up by its indexed prefix (the leading
	/// [`PREFIX_LEN`] characters of the raw bearer value, stored in
	/// plaintext alongside the hash — the same shape as the teacher's
	/// `token_prefix` index). The prefix alone never authenticates
	/// anything; it only narrows the row set before [`verify_token`] runs
	/// the real, constant-time Argon2 comparison against the full bearer.
	pub async fn find_by_prefix(&self, prefix: &str) -> Result<Option<AuthToken>, GatewayError> {
		sqlx::query_as::<_, AuthTokenRow>(
			"SELECT id, username, token_hash, token_salt, created_at, revoked_at, expires_at, allowed_scopes, \
			 allowed_environments, description FROM tokens WHERE token_prefix = $1 LIMIT 1",
		)
		.bind(prefix)
		.fetch_optional(&self.pool)
		.await
		.map(|row| row.map(Into::into))
		.map_err(|e| GatewayError::SqlCommand(e.to_string()))
	}

	/// Creates a new token, returning the raw bearer value exactly once.
	/// Mirrors the teacher's `TokenRepo::create`: a random token is
	/// generated, hashed with Argon2id alongside a per-token salt, and only
	/// the hash (plus an unguessable-prefix index) is persisted.
	pub async fn create_token(
		&self,
		username: &str,
		allowed_scopes: &str,
		allowed_environments: &str,
		description: Option<&str>,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<(RawToken, AuthToken), GatewayError> {
		let raw: String = {
			let mut rng = rand::rng();
			(0..40).map(|_| rng.sample(Alphanumeric) as char).collect()
		};
		let prefix = token_prefix(&raw);
		let salt = SaltString::generate(&mut OsRng);
		let hash = argon2()
			.hash_password(raw.as_bytes(), &salt)
			.map_err(|e| GatewayError::internal(format!("argon2 hash error: {e}")))?
			.to_string();

		let row: AuthTokenRow = sqlx::query_as(
			"INSERT INTO tokens (username, token_prefix, token_hash, token_salt, allowed_scopes, allowed_environments, \
			 description, expires_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING id, username, token_hash, token_salt, \
			 created_at, revoked_at, expires_at, allowed_scopes, allowed_environments, description",
		)
		.bind(username)
		.bind(&prefix)
		.bind(&hash)
		.bind(salt.as_str())
		.bind(allowed_scopes)
		.bind(allowed_environments)
		.bind(description)
		.bind(expires_at)
		.fetch_one(&self.pool)
		.await
		.map_err(|e| GatewayError::SqlCommand(e.to_string()))?;

		Ok((RawToken(raw), row.into()))
	}

	pub async fn list_tokens(&self, username: &str) -> Result<Vec<AuthToken>, GatewayError> {
		sqlx::query_as::<_, AuthTokenRow>(
			"SELECT id, username, token_hash, token_salt, created_at, revoked_at, expires_at, allowed_scopes, \
			 allowed_environments, description FROM tokens WHERE username = $1 ORDER BY created_at DESC",
		)
		.bind(username)
		.fetch_all(&self.pool)
		.await
		.map(|rows| rows.into_iter().map(Into::into).collect())
		.map_err(|e| GatewayError::SqlCommand(e.to_string()))
	}

	pub async fn revoke_token(&self, id: uuid::Uuid) -> Result<bool, GatewayError> {
		let result = sqlx::query("UPDATE tokens SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
			.bind(id)
			.execute(&self.pool)
			.await
			.map_err(|e| GatewayError::SqlCommand(e.to_string()))?;
		Ok(result.rows_affected() > 0)
	}
}

/// A freshly minted bearer token. Redacts itself in `Debug` so it can't leak
/// into logs by accident, the same shape as the teacher's `ZeroToken`.
pub struct RawToken(String);

impl RawToken {
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Debug for RawToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "<redacted>")
	}
}

#[derive(sqlx::FromRow)]
struct AuthTokenRow {
	id: uuid::Uuid,
	username: String,
	token_hash: String,
	token_salt: String,
	created_at: DateTime<Utc>,
	revoked_at: Option<DateTime<Utc>>,
	expires_at: Option<DateTime<Utc>>,
	allowed_scopes: String,
	allowed_environments: String,
	description: Option<String>,
}

impl From<AuthTokenRow> for AuthToken {
	fn from(row: AuthTokenRow) -> Self {
		AuthToken {
			id: row.id,
			username: row.username,
			token_hash: row.token_hash,
			token_salt: row.token_salt,
			created_at: row.created_at,
			revoked_at: row.revoked_at,
			expires_at: row.expires_at,
			allowed_scopes: row.allowed_scopes,
			allowed_environments: row.allowed_environments,
			description: row.description,
		}
	}
}

/// Request-scoped metadata carried into the audit log alongside the
/// authorisation outcome (`spec.md` §4.6).
pub struct AuditContext<'a> {
	pub operation: &'a str,
	pub source: &'a str,
	pub ip: Option<std::net::IpAddr>,
	pub user_agent: Option<&'a str>,
}

/// C6's entry point: `authorise(bearer, env, endpoint) → {principal} |
/// reject(reason)`. Every outcome is audited best-effort regardless of
/// result (`spec.md` §4.6).
pub struct TokenGuard {
	store: TokenStore,
	audit: AuditSink,
}

impl TokenGuard {
	pub fn new(store: TokenStore, audit: AuditSink) -> Self {
		TokenGuard { store, audit }
	}

	pub async fn authorise(
		&self,
		bearer: Option<&str>,
		env: &str,
		endpoint: &str,
		ctx: AuditContext<'_>,
	) -> Result<Principal, RejectReason> {
		let outcome = self.authorise_inner(bearer, env, endpoint).await;

		let (token_id, username) = match &outcome {
			Ok(p) => (Some(p.token_id), p.username.clone()),
			Err(_) => (None, "<unknown>".to_string()),
		};
		self
			.audit
			.record(AuditRecord {
				token_id,
				username,
				operation: ctx.operation.to_string(),
				timestamp: Utc::now(),
				source: ctx.source.to_string(),
				ip: ctx.ip,
				user_agent: ctx.user_agent.map(str::to_string),
			})
			.await;

		outcome
	}

	async fn authorise_inner(&self, bearer: Option<&str>, env: &str, endpoint: &str) -> Result<Principal, RejectReason> {
		let bearer = bearer.ok_or(RejectReason::MissingToken)?;
		let candidate = self.store.find_by_prefix(&token_prefix(bearer)).await.map_err(|e| {
			tracing::error!(error = %e, "token lookup failed");
			RejectReason::UnknownToken
		})?;
		let token = candidate.ok_or(RejectReason::UnknownToken)?;

		if !verify_token(bearer, &token.token_hash) {
			return Err(RejectReason::UnknownToken);
		}
		if !token.is_valid(Utc::now()) {
			return Err(RejectReason::RevokedOrExpired);
		}
		if !matches_wildcard_list(&token.allowed_environments, env) {
			return Err(RejectReason::EnvironmentForbidden);
		}
		if !matches_wildcard_list(&token.allowed_scopes, endpoint) {
			return Err(RejectReason::ScopeForbidden);
		}

		Ok(Principal {
			token_id: token.id,
			username: token.username.clone(),
		})
	}
}

/// Constant-time verification via Argon2's own `verify_password`, which
/// compares the full PHC-format hash rather than handling comparison itself
/// — matching `spec.md` §4.6 "constant-time compare".
fn verify_token(bearer: &str, stored_hash: &str) -> bool {
	let Ok(parsed) = PasswordHash::new(stored_hash) else {
		return false;
	};
	argon2().verify_password(bearer.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn token(scopes: &str, envs: &str, revoked: bool, expired: bool) -> AuthToken {
		let now = Utc::now();
		AuthToken {
			id: uuid::Uuid::new_v4(),
			username: "svc".to_string(),
			token_hash: "unused-in-these-tests".to_string(),
			token_salt: "unused".to_string(),
			created_at: now,
			revoked_at: revoked.then_some(now),
			expires_at: expired.then(|| now - chrono::Duration::seconds(1)),
			allowed_scopes: scopes.to_string(),
			allowed_environments: envs.to_string(),
			description: None,
		}
	}

	/// `spec.md` §8 P6.
	#[test]
	fn scope_matching_honours_exact_and_prefix_wildcard() {
		let t = token("A,B*", "600", false, false);
		assert!(matches_wildcard_list(&t.allowed_scopes, "A"));
		assert!(matches_wildcard_list(&t.allowed_scopes, "Banana"));
		assert!(!matches_wildcard_list(&t.allowed_scopes, "C"));
	}

	#[test]
	fn revoked_token_is_invalid() {
		let t = token("*", "*", true, false);
		assert!(!t.is_valid(Utc::now()));
	}

	#[test]
	fn expired_token_is_invalid() {
		let t = token("*", "*", false, true);
		assert!(!t.is_valid(Utc::now()));
	}

	#[test]
	fn non_expiring_token_is_valid() {
		let t = token("*", "*", false, false);
		assert!(t.is_valid(Utc::now()));
	}

	#[test]
	fn hash_round_trips_through_verify() {
		let salt = SaltString::generate(&mut OsRng);
		let hash = argon2().hash_password(b"super-secret-token", &salt).unwrap().to_string();
		assert!(verify_token("super-secret-token", &hash));
		assert!(!verify_token("wrong-token", &hash));
	}
}
