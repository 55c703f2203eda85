//! Shared utilities used by the `gateway` crate and the `gateway-app` binary.
//!
//! Kept deliberately small: a process-wide `Atomic`/`AtomicOption` alias for
//! the monotonic caches (EDM registry, connection-string cache, DNS/host
//! caches), the gateway-wide error taxonomy, telemetry bootstrap, and
//! shutdown-signal plumbing.

pub mod arc;
pub mod error;
pub mod signal;
pub mod telemetry;

pub use arc::{Atomic, AtomicOption};
pub use error::GatewayError;
