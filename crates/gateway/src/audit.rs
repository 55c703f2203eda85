//! C12 — audit log emission (`spec.md` §4.6, `SPEC_FULL.md` §4.12).
//!
//! Every authorisation outcome is recorded regardless of success or
//! rejection reason. The record always reaches `tracing` on a dedicated
//! `"audit"` target — so it rides whatever sink the embedding process wires
//! up — and is persisted best-effort to the `audits` table; a persistence
//! failure is logged and otherwise swallowed, never surfaced to the caller,
//! since an audit-log outage must not block the request path.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// One authorisation attempt, successful or not.
#[derive(Debug, Clone)]
pub struct AuditRecord {
	pub token_id: Option<uuid::Uuid>,
	pub username: String,
	pub operation: String,
	pub timestamp: DateTime<Utc>,
	pub source: String,
	pub ip: Option<IpAddr>,
	pub user_agent: Option<String>,
}

/// Where audit records go. Persistence is optional — a sink built without a
/// pool (e.g. in tests, or a deployment that only wants log-based audit)
/// still emits the `tracing` event.
#[derive(Clone)]
pub struct AuditSink {
	pool: Option<PgPool>,
}

impl AuditSink {
	pub fn new(pool: PgPool) -> Self {
		AuditSink { pool: Some(pool) }
	}

	/// A sink that only ever logs, never persists. Useful for tests and for
	/// deployments that route audit purely through the `tracing` sink.
	pub fn log_only() -> Self {
		AuditSink { pool: None }
	}

	pub async fn record(&self, record: AuditRecord) {
		tracing::info!(
			target: "audit",
			token_id = ?record.token_id,
			username = %record.username,
			operation = %record.operation,
			timestamp = %record.timestamp,
			source = %record.source,
			ip = ?record.ip,
			user_agent = ?record.user_agent,
			"audit"
		);

		let Some(pool) = &self.pool else { return };
		let result = sqlx::query(
			"INSERT INTO audits (token_id, username, operation, timestamp, source, ip, user_agent) \
			 VALUES ($1,$2,$3,$4,$5,$6,$7)",
		)
		.bind(record.token_id)
		.bind(&record.username)
		.bind(&record.operation)
		.bind(record.timestamp)
		.bind(&record.source)
		.bind(record.ip.map(|ip| ip.to_string()))
		.bind(&record.user_agent)
		.execute(pool)
		.await;

		if let Err(e) = result {
			tracing::warn!(error = %e, "failed to persist audit record, log entry above is authoritative");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn log_only_sink_never_panics() {
		let sink = AuditSink::log_only();
		sink
			.record(AuditRecord {
				token_id: Some(uuid::Uuid::new_v4()),
				username: "svc".to_string(),
				operation: "GET /api/env/endpoint".to_string(),
				timestamp: Utc::now(),
				source: "127.0.0.1".to_string(),
				ip: Some("127.0.0.1".parse().unwrap()),
				user_agent: Some("test-agent".to_string()),
			})
			.await;
	}
}
