//! Core of a multi-tenant API gateway: OData→SQL translation, request
//! admission/routing, and the stateful support fabric (cache, SQL pool,
//! URL allow-list) it all leans on.
//!
//! Module map, matching the component table in `SPEC_FULL.md` §2:
//!
//! - [`urlallowlist`] — C1, egress safety (host patterns + CIDR block-list + DNS cache).
//! - [`sql`] — C2, the per-environment SQL connection pool.
//! - [`cache`] — C3, the pluggable cache provider (in-memory / remote) with distributed locks.
//! - [`edm`] — C4, the per-entity EDM registry.
//! - [`odata`] — C5, the OData→SQL translator.
//! - [`token`] — C6, bearer token validation and scope/environment matching.
//! - [`env`] — C7, environment settings resolution.
//! - [`router`] — C8, the request admission/routing state machine.
//! - [`handlers`] — C9, the SQL/Proxy/Composite handlers.
//! - [`config`] — C10, configuration types and the YAML loader.
//! - [`audit`] — C12 audit-log emission.

pub mod audit;
pub mod cache;
pub mod config;
pub mod edm;
pub mod env;
pub mod handlers;
pub mod model;
pub mod odata;
pub mod router;
pub mod sql;
pub mod token;
pub mod urlallowlist;

pub use gateway_core::GatewayError;

pub type Body = axum::body::Body;
pub type Request = http::Request<Body>;
pub type Response = http::Response<Body>;
