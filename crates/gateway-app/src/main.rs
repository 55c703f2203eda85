//! Process wiring for the gateway: reads a config file and a control-plane
//! database URL, assembles the `gateway` crate's components into an
//! `AppState`, and serves the data-plane and admin listeners side by side.
//!
//! Everything that decides *how* configuration reaches the process (file
//! path, env var) lives here, never in `gateway` itself, per `spec.md` §1's
//! "file-based configuration discovery" Non-goal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use gateway::cache;
use gateway::edm::EdmRegistry;
use gateway::router::{AppState, build_admin_router, build_router};
use gateway::sql::SqlPool;
use gateway::token::{AuditSink, TokenGuard, TokenStore};
use gateway::urlallowlist::UrlAllowList;

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Multi-tenant OData->SQL API gateway")]
struct Cli {
	/// Path to the YAML configuration document (environments, endpoints, pool/cache/host config).
	#[arg(long, env = "GATEWAY_CONFIG")]
	config: PathBuf,

	/// Connection string for the control-plane database holding `tokens`/`audits`.
	#[arg(long, env = "GATEWAY_TOKEN_DATABASE_URL")]
	token_database_url: String,

	/// Emit logs as JSON instead of the default human-readable format.
	#[arg(long, env = "GATEWAY_JSON_LOGS", default_value_t = false)]
	json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	gateway_core::telemetry::init(cli.json_logs);

	if let Err(e) = run(cli).await {
		tracing::error!(error = %e, "gateway exited with an error");
		return Err(e);
	}
	Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let config = gateway::config::Config::load_from_file(&cli.config)
		.await
		.with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

	let token_pool = sqlx::PgPool::connect(&cli.token_database_url)
		.await
		.context("failed to connect to the control-plane database")?;
	let token_store = TokenStore::new(token_pool.clone());
	let audit = AuditSink::new(token_pool);
	let token_guard = Arc::new(TokenGuard::new(token_store, audit));

	let cache_provider = cache::build_provider(&config.cache_config)
		.await
		.context("failed to build cache provider")?;

	let edm = Arc::new(EdmRegistry::new());

	let allow_list = Arc::new(
		UrlAllowList::new(config.host_config.allowed_hosts.clone(), config.host_config.blocked_ip_ranges.clone())
			.context("failed to build URL allow-list")?,
	);

	let sql_pool = Arc::new(SqlPool::new(config.pool_config.clone()));
	sql_pool.spawn_maintenance();
	if config.pool_config.enabled {
		for env in config.environments.values() {
			if let Err(e) = sql_pool.prewarm(&env.connection_string).await {
				tracing::warn!(error = %e, environment = %env.name, "failed to prewarm keep-alive connection");
			}
		}
	}

	let state = AppState::new(config.clone(), sql_pool.clone(), cache_provider, edm, allow_list, token_guard);

	let (shutdown_trigger, mut data_plane_watcher) = gateway_core::signal::new();
	let mut admin_watcher = data_plane_watcher.clone();

	let data_plane = build_router(state.clone());
	let admin = build_admin_router(state);

	let data_plane_listener = tokio::net::TcpListener::bind(&config.listen_addr)
		.await
		.with_context(|| format!("failed to bind data-plane listener on {}", config.listen_addr))?;
	let admin_listener = tokio::net::TcpListener::bind(&config.admin_addr)
		.await
		.with_context(|| format!("failed to bind admin listener on {}", config.admin_addr))?;

	tracing::info!(data_plane = %config.listen_addr, admin = %config.admin_addr, "gateway listening");

	let data_plane_server = axum::serve(data_plane_listener, data_plane)
		.with_graceful_shutdown(async move { data_plane_watcher.signalled().await });
	let admin_server = axum::serve(admin_listener, admin).with_graceful_shutdown(async move { admin_watcher.signalled().await });

	tokio::spawn(async move {
		gateway_core::signal::shutdown_signal().await;
		shutdown_trigger.fire();
	});

	let (data_plane_result, admin_result) = tokio::join!(data_plane_server, admin_server);
	data_plane_result.context("data-plane server failed")?;
	admin_result.context("admin server failed")?;

	sql_pool.shutdown().await;
	Ok(())
}
