//! C9 — handlers: pure consumers of C2/C3/C5 that execute the translated
//! operation and shape the response (`spec.md` §4.9).
//!
//! Three kinds, one per [`EndpointKind`] variant. Each returns a complete
//! `Response` or a [`GatewayError`] — never a partial body: if the
//! underlying stream errors mid-flight, the `?` short-circuit means no
//! `value` array is ever written (`spec.md` §4.9 "partial results are never
//! returned").

use axum::http::{Method, StatusCode};
use bytes::Bytes;
use sqlx::Row;
use sqlx::postgres::PgRow;

use gateway_core::GatewayError;

use crate::config::EndpointConfig;
use crate::edm;
use crate::env::ResolvedEnvironment;
use crate::model::EndpointKind;
use crate::odata::{self, ColumnMap, ODataParams, TranslateOptions};
use crate::router::{AppState, json_response};
use crate::{Body, Response};

/// `DISPATCH`: selects a handler by `endpoint.kind` (`spec.md` §4.8).
pub async fn dispatch(
	state: &AppState,
	env_name: &str,
	resolved_env: &ResolvedEnvironment,
	endpoint: &EndpointConfig,
	id: Option<&str>,
	method: &Method,
	query: Option<&str>,
	body: Bytes,
) -> Result<Response, GatewayError> {
	match &endpoint.kind {
		EndpointKind::Sql { target } => handle_sql(state, env_name, resolved_env, endpoint, target, id, method, query).await,
		EndpointKind::Proxy { url_template } => handle_proxy(state, resolved_env, url_template, id, method, query, body).await,
		EndpointKind::Composite { calls } => handle_composite(state, env_name, resolved_env, calls, method, query, body).await,
	}
}

fn parse_query(query: &str) -> Vec<(String, String)> {
	url::form_urlencoded::parse(query.as_bytes())
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect()
}

/// Converts the emitted `[bracket]`/`@pN` SQL (`spec.md` §4.5's literal
/// output shape) into the dialect the live pool understands. `OFFSET ...
/// ROWS FETCH NEXT ... ROWS ONLY` is ISO SQL and needs no rewriting;
/// bracket quoting becomes double-quote quoting and `@pN` becomes `$N+1`,
/// mirroring `crate::sql`'s own `ado_to_postgres_url` adapter-at-the-boundary
/// pattern.
fn to_postgres_sql(sql: &str, param_count: usize) -> String {
	let mut out = sql.replace('[', "\"").replace(']', "\"");
	for i in (0..param_count).rev() {
		out = out.replace(&format!("@p{i}"), &format!("${}", i + 1));
	}
	out
}

/// `SQL` dispatch: build the OData map from the query string, translate via
/// C5, acquire a connection via C2/the env pool cache, execute, stream rows
/// (`spec.md` §4.8). For `{id}` paths, `primaryKey eq '{id}'` is AND-combined
/// into any user-supplied filter.
async fn handle_sql(
	state: &AppState,
	env_name: &str,
	resolved_env: &ResolvedEnvironment,
	endpoint: &EndpointConfig,
	target: &str,
	id: Option<&str>,
	method: &Method,
	query: Option<&str>,
) -> Result<Response, GatewayError> {
	if *method != Method::GET {
		// Write paths through stored procedures are explicitly out of scope
		// (`spec.md` §1 "the specific SQL dialect of stored procedures").
		return Err(GatewayError::MethodNotAllowed);
	}

	let _model = state.edm.get_model(target);
	let (schema, table) = edm::split_entity_name(target);
	let column_map = ColumnMap::parse(&endpoint.allowed_columns);

	let pairs = query.map(parse_query).unwrap_or_default();
	let mut params = ODataParams::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

	if let Some(id) = id {
		let pk = endpoint.primary_key.as_deref().ok_or(GatewayError::MissingPrimaryKey)?;
		let pk_alias = column_map.db_to_alias.get(pk).cloned().unwrap_or_else(|| pk.to_string());
		let escaped_id = id.replace('\'', "''");
		let id_filter = format!("{pk_alias} eq '{escaped_id}'");
		params.filter = Some(match params.filter.take() {
			Some(existing) => format!("({existing}) and ({id_filter})"),
			None => id_filter,
		});
	}

	let opts = TranslateOptions {
		entity_schema: &schema,
		entity_table: &table,
		column_map: &column_map,
		primary_key: endpoint.primary_key.as_deref(),
		page_size: endpoint.page_size,
		strict: false,
	};
	let translated = odata::translate(&params, &opts)?;

	let pool = state.pool_for_env(&resolved_env.connection_string).await?;
	let command_timeout = state.config.pool_config.command_timeout();

	let pg_sql = to_postgres_sql(&translated.sql, translated.params.len());
	let mut q = sqlx::query(&pg_sql);
	for p in &translated.params {
		q = q.bind(p.value.clone());
	}
	let rows: Vec<PgRow> = tokio::time::timeout(command_timeout, q.fetch_all(&pool))
		.await
		.map_err(|_| GatewayError::Timeout)?
		.map_err(|e| GatewayError::SqlCommand(e.to_string()))?;

	let values: Vec<serde_json::Value> = rows.iter().map(pg_row_to_json).collect();
	let mut body = serde_json::json!({ "value": values });

	if params.count
		&& let Some(count_sql) = &translated.count_sql
	{
		let pg_count_sql = to_postgres_sql(count_sql, translated.params.len());
		let mut cq = sqlx::query_scalar::<_, i64>(&pg_count_sql);
		for p in &translated.params {
			cq = cq.bind(p.value.clone());
		}
		let count = tokio::time::timeout(command_timeout, cq.fetch_one(&pool))
			.await
			.map_err(|_| GatewayError::Timeout)?
			.map_err(|e| GatewayError::SqlCommand(e.to_string()))?;
		body["@odata.count"] = serde_json::json!(count);
	}

	let top = params.top.unwrap_or(endpoint.page_size).min(endpoint.page_size);
	if id.is_none() && values.len() as u32 == top && top > 0 {
		let next_skip = params.skip.unwrap_or(0) + top;
		body["@odata.nextLink"] = serde_json::json!(format!("/api/{env_name}/{}?$skip={next_skip}&$top={top}", endpoint.name));
	}

	Ok(json_response(StatusCode::OK, body))
}

/// Dynamic row→JSON conversion: tries the handful of Postgres types this
/// core's synthetic schema can produce, in order, falling back to `null`
/// for anything unrecognised. There is no static schema to drive exhaustive
/// decoding from, since `spec.md` §4.4 deliberately carries no column list.
fn pg_row_to_json(row: &PgRow) -> serde_json::Value {
	use sqlx::Column;
	let mut obj = serde_json::Map::new();
	for (idx, col) in row.columns().iter().enumerate() {
		obj.insert(col.name().to_string(), decode_pg_value(row, idx));
	}
	serde_json::Value::Object(obj)
}

fn decode_pg_value(row: &PgRow, idx: usize) -> serde_json::Value {
	if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
		return v.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
		return v.map(|n| serde_json::json!(n)).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
		return v.map(|n| serde_json::json!(n)).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
		return v.map(|n| serde_json::json!(n)).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
		return v.map(serde_json::Value::Bool).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
		return v.map(|u| serde_json::json!(u.to_string())).unwrap_or(serde_json::Value::Null);
	}
	if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
		return v.map(|d| serde_json::json!(d.to_rfc3339())).unwrap_or(serde_json::Value::Null);
	}
	serde_json::Value::Null
}

/// `Proxy` dispatch: expand the URL template with env headers, validate via
/// C1, forward the request, stream the response back (`spec.md` §4.8). A
/// C1 rejection is a 502 `DestinationBlocked`, never a silent pass-through.
async fn handle_proxy(
	state: &AppState,
	resolved_env: &ResolvedEnvironment,
	url_template: &str,
	id: Option<&str>,
	method: &Method,
	query: Option<&str>,
	body: Bytes,
) -> Result<Response, GatewayError> {
	let mut url = url_template.to_string();
	if let Some(id) = id {
		url = url.replace("{id}", id);
	}
	for (key, value) in &resolved_env.headers {
		url = url.replace(&format!("{{{key}}}"), value);
	}
	if let Some(q) = query
		&& !q.is_empty()
	{
		url = format!("{url}?{q}");
	}

	if !state.allow_list.is_url_safe(&url).await? {
		return Err(GatewayError::DestinationBlocked(url));
	}

	let mut request = state.http_client.request(method.clone(), &url);
	for (key, value) in &resolved_env.headers {
		request = request.header(key, value);
	}
	let upstream = request
		.body(body)
		.send()
		.await
		.map_err(|e| GatewayError::UpstreamHttp(e.to_string()))?;

	let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
	let upstream_bytes = upstream.bytes().await.map_err(|e| GatewayError::UpstreamHttp(e.to_string()))?;

	Ok(axum::http::Response::builder()
		.status(status)
		.body(Body::from(upstream_bytes))
		.expect("valid response"))
}

/// `Composite` dispatch: fan out to the declared sub-calls within the same
/// environment, aggregate into one JSON object keyed by sub-call name; any
/// required sub-call failing fails the whole composite (`spec.md` §4.8).
async fn handle_composite(
	state: &AppState,
	env_name: &str,
	resolved_env: &ResolvedEnvironment,
	calls: &[String],
	method: &Method,
	query: Option<&str>,
	body: Bytes,
) -> Result<Response, GatewayError> {
	let mut aggregate = serde_json::Map::new();
	for name in calls {
		let sub_endpoint = state
			.config
			.endpoints
			.get(&(env_name.to_string(), name.clone()))
			.ok_or_else(|| GatewayError::UnknownEndpoint {
				env: env_name.to_string(),
				endpoint: name.clone(),
			})?
			.clone();

		let response = Box::pin(dispatch(state, env_name, resolved_env, &sub_endpoint, None, method, query, body.clone())).await?;
		let (parts, sub_body) = response.into_parts();
		if !parts.status.is_success() {
			return Err(GatewayError::UpstreamHttp(format!("composite sub-call {name} failed with status {}", parts.status)));
		}
		let bytes = axum::body::to_bytes(sub_body, usize::MAX)
			.await
			.map_err(|e| GatewayError::internal(format!("failed to read composite sub-call response: {e}")))?;
		let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
		aggregate.insert(name.clone(), value);
	}
	Ok(json_response(StatusCode::OK, serde_json::Value::Object(aggregate)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn postgres_sql_rewrites_brackets_and_placeholders() {
		let sql = "SELECT * FROM [dbo].[Items] WHERE [ItemCode] = @p0";
		assert_eq!(to_postgres_sql(sql, 1), "SELECT * FROM \"dbo\".\"Items\" WHERE \"ItemCode\" = $1");
	}

	#[test]
	fn postgres_sql_rewrites_multiple_placeholders_highest_first() {
		let sql = "WHERE [A] = @p0 AND [B] = @p1 AND [C] = @p10";
		let rewritten = to_postgres_sql(sql, 11);
		assert!(rewritten.contains("$1"));
		assert!(rewritten.contains("$2"));
		assert!(rewritten.contains("$11"));
		assert!(!rewritten.contains("@p"));
	}

	#[test]
	fn parse_query_decodes_form_encoded_pairs() {
		let pairs = parse_query("%24filter=A%20eq%20%27x%27&%24top=5");
		assert!(pairs.contains(&("$filter".to_string(), "A eq 'x'".to_string())));
		assert!(pairs.contains(&("$top".to_string(), "5".to_string())));
	}
}
