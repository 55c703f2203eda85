//! Process-wide logging setup.
//!
//! The core never chooses a logging *backend* — it only configures
//! `tracing`'s dispatcher once, the way the embedding binary (`gateway-app`)
//! asks it to. Audit records (see `gateway::audit`) ride the same
//! dispatcher on a dedicated `target = "audit"` so they can be routed
//! independently by whatever `tracing_subscriber::Layer` the operator adds.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialise the global `tracing` subscriber. Safe to call more than once —
/// only the first call takes effect, matching the process-wide "init once,
/// no teardown" shape of the other global caches in this crate.
pub fn init(json: bool) {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
		let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
		if json {
			subscriber.json().init();
		} else {
			subscriber.init();
		}
	});
}

pub mod testing {
	/// Install a logger suitable for `cargo test` output; cheap to call from
	/// every test since it's idempotent.
	pub fn setup_test_logging() {
		super::init(false);
	}
}
