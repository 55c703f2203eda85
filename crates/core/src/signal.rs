//! Process shutdown signalling.
//!
//! `ShutdownTrigger` is handed to every long-running task (the C2 keep-alive
//! maintenance timer, the admin server, the data-plane server); `fire()`
//! is called once, from `gateway-app::main`, on SIGTERM/SIGINT. Tasks that
//! only care about drain (stop accepting new work, let in-flight requests
//! finish) read a cloned `ShutdownWatcher`.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownTrigger(watch::Sender<bool>);

#[derive(Clone)]
pub struct ShutdownWatcher(watch::Receiver<bool>);

pub fn new() -> (ShutdownTrigger, ShutdownWatcher) {
	let (tx, rx) = watch::channel(false);
	(ShutdownTrigger(tx), ShutdownWatcher(rx))
}

impl ShutdownTrigger {
	/// Signal every watcher. Idempotent.
	pub fn fire(&self) {
		let _ = self.0.send(true);
	}
}

impl ShutdownWatcher {
	pub fn is_shutdown(&self) -> bool {
		*self.0.borrow()
	}

	/// Resolves once `fire()` has been called. Cancel-safe: usable directly
	/// inside a `tokio::select!` alongside request I/O.
	pub async fn signalled(&mut self) {
		// watch::Receiver::changed() only resolves on a *new* value, so if
		// shutdown already fired before this watcher was polled we must not
		// block forever waiting for another change.
		if *self.0.borrow() {
			return;
		}
		while self.0.changed().await.is_ok() {
			if *self.0.borrow() {
				return;
			}
		}
	}
}

/// Waits for either SIGINT (ctrl-c) or, on unix, SIGTERM.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler");
		sig.recv().await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
