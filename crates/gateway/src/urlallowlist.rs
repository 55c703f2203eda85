//! C1 — egress safety: which upstream hosts a `Proxy`/`Composite` endpoint
//! is allowed to call.
//!
//! Three independent checks, all of which must pass:
//! 1. the host matches one of the configured `allowedHosts` patterns
//!    (`*` stands for exactly one DNS label, matched case-insensitively);
//! 2. none of the host's resolved IP addresses fall inside a blocked CIDR
//!    range (defaults to the RFC1918 + link-local ranges, per `spec.md` §4.1);
//! 3. the URL scheme is `http` or `https`.
//!
//! Host pattern compilation is memoised (`moka`-free here — a plain
//! `RwLock<HashMap>` suffices since entries are small and never evicted,
//! following the teacher's `http/pat.rs` table-compilation style) because
//! turning a glob into a `Regex` is the expensive part of this path and the
//! same handful of patterns are checked on every proxied request.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

use hickory_resolver::TokioResolver;
use ipnet::IpNet;
use regex::Regex;
use url::Url;

use gateway_core::GatewayError;

/// `spec.md` §4.1: exactly these four ranges, and no others — `127.0.0.1` is
/// a default *allowed* host (health checks, local upstreams) and must stay
/// reachable, so it is deliberately absent here.
const DEFAULT_BLOCKED_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "169.254.0.0/16"];

fn compile_pattern(pattern: &str) -> Regex {
	let mut anchored = String::from("(?i)^");
	for (i, label) in pattern.split('.').enumerate() {
		if i > 0 {
			anchored.push_str("\\.");
		}
		if label == "*" {
			anchored.push_str("[^.]+");
		} else {
			anchored.push_str(&regex::escape(label));
		}
	}
	anchored.push('$');
	// Patterns are validated at config-load time; a bad one here is a bug,
	// not a runtime condition callers need to handle.
	Regex::new(&anchored).expect("host pattern compiles to a valid regex")
}

pub struct UrlAllowList {
	patterns: RwLock<HashMap<String, Regex>>,
	raw_patterns: Vec<String>,
	blocked_ranges: Vec<IpNet>,
	resolver: TokioResolver,
}

impl UrlAllowList {
	pub fn new(allowed_hosts: Vec<String>, blocked_ip_ranges: Vec<String>) -> Result<Self, GatewayError> {
		let mut blocked_ranges: Vec<IpNet> = DEFAULT_BLOCKED_RANGES
			.iter()
			.map(|s| s.parse().expect("built-in CIDR literal is valid"))
			.collect();
		for range in &blocked_ip_ranges {
			let net: IpNet = range
				.parse()
				.map_err(|e| GatewayError::configuration(format!("invalid blocked CIDR range {range}: {e}")))?;
			blocked_ranges.push(net);
		}

		let resolver = hickory_resolver::Resolver::builder_tokio()
			.map_err(|e| GatewayError::internal(format!("failed to initialise DNS resolver: {e}")))?
			.build();

		let raw_patterns = if allowed_hosts.is_empty() {
			default_allowed_hosts()
		} else {
			allowed_hosts
		};

		Ok(UrlAllowList {
			patterns: RwLock::new(HashMap::new()),
			raw_patterns,
			blocked_ranges,
			resolver,
		})
	}

	fn host_pattern_matches(&self, host: &str) -> bool {
		for pattern in &self.raw_patterns {
			if let Some(re) = self.patterns.read().unwrap().get(pattern) {
				if re.is_match(host) {
					return true;
				}
				continue;
			}
			let compiled = compile_pattern(pattern);
			let matched = compiled.is_match(host);
			self.patterns.write().unwrap().insert(pattern.clone(), compiled);
			if matched {
				return true;
			}
		}
		false
	}

	fn ip_is_blocked(&self, ip: IpAddr) -> bool {
		self.blocked_ranges.iter().any(|net| net.contains(&ip))
	}

	/// Resolves `host` and checks every returned address against the
	/// blocked-range list; a host with even one blocked address is rejected.
	async fn resolve_is_safe(&self, host: &str) -> Result<bool, GatewayError> {
		if let Ok(ip) = host.parse::<IpAddr>() {
			return Ok(!self.ip_is_blocked(ip));
		}
		let response = self
			.resolver
			.lookup_ip(host)
			.await
			.map_err(|e| GatewayError::upstream(format!("DNS resolution failed for {host}: {e}")))?;
		for ip in response.iter() {
			if self.ip_is_blocked(ip) {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// `isUrlSafe(url)`, per `spec.md` §4.1.
	pub async fn is_url_safe(&self, url: &str) -> Result<bool, GatewayError> {
		let parsed = Url::parse(url).map_err(|e| GatewayError::input(format!("invalid upstream URL {url}: {e}")))?;
		if parsed.scheme() != "http" && parsed.scheme() != "https" {
			return Ok(false);
		}
		let Some(host) = parsed.host_str() else {
			return Ok(false);
		};
		if !self.host_pattern_matches(host) {
			return Ok(false);
		}
		self.resolve_is_safe(host).await
	}

	/// `isHostAllowed(host)`: the pattern check alone, without a DNS round trip.
	pub fn is_host_allowed(&self, host: &str) -> bool {
		self.host_pattern_matches(host)
	}
}

/// `spec.md` §4.1 bootstrapping: when no hosts are configured, default to
/// `localhost`, `127.0.0.1`, and whatever operational addresses this process
/// can see. Full multi-interface enumeration plus reverse-DNS (the original's
/// `NetworkInterface.GetAllNetworkInterfaces()` sweep) needs a platform crate
/// outside this stack's dependency set; the primary outbound-facing address —
/// found the standard connect-a-UDP-socket-and-read-it-back way, no packets
/// sent — covers the common single-homed case without adding one.
fn default_allowed_hosts() -> Vec<String> {
	let mut hosts = vec!["localhost".to_string(), "127.0.0.1".to_string()];
	if let Some(ip) = local_outbound_address() {
		hosts.push(ip.to_string());
	}
	hosts
}

fn local_outbound_address() -> Option<IpAddr> {
	let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
	socket.connect("8.8.8.8:80").ok()?;
	socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_label_wildcard_matches_exactly_one_label() {
		let re = compile_pattern("*.example.com");
		assert!(re.is_match("api.example.com"));
		assert!(!re.is_match("a.b.example.com"));
		assert!(!re.is_match("example.com"));
	}

	#[test]
	fn pattern_matching_is_case_insensitive() {
		let re = compile_pattern("*.Example.com");
		assert!(re.is_match("API.EXAMPLE.COM"));
	}

	#[test]
	fn literal_pattern_requires_exact_match() {
		let re = compile_pattern("api.example.com");
		assert!(re.is_match("api.example.com"));
		assert!(!re.is_match("other.example.com"));
	}

	#[tokio::test]
	async fn rejects_non_http_scheme() {
		let list = UrlAllowList::new(vec!["*.example.com".into()], vec![]).unwrap();
		let safe = list.is_url_safe("ftp://api.example.com/file").await.unwrap();
		assert!(!safe);
	}

	#[tokio::test]
	async fn rejects_host_outside_allow_list() {
		let list = UrlAllowList::new(vec!["*.example.com".into()], vec![]).unwrap();
		let safe = list.is_url_safe("https://evil.test/x").await.unwrap();
		assert!(!safe);
	}

	#[test]
	fn private_ip_ranges_blocked_by_default() {
		let list = UrlAllowList::new(vec!["*".into()], vec![]).unwrap();
		assert!(list.ip_is_blocked("10.1.2.3".parse().unwrap()));
		assert!(list.ip_is_blocked("192.168.1.1".parse().unwrap()));
		assert!(!list.ip_is_blocked("8.8.8.8".parse().unwrap()));
	}

	/// `127.0.0.0/8` must stay reachable: it's a default *allowed* host, and
	/// is deliberately absent from the default blocked ranges (`spec.md` §4.1).
	#[test]
	fn loopback_is_not_blocked_by_default() {
		let list = UrlAllowList::new(vec!["*".into()], vec![]).unwrap();
		assert!(!list.ip_is_blocked("127.0.0.1".parse().unwrap()));
	}

	#[test]
	fn empty_allowed_hosts_bootstraps_localhost() {
		let list = UrlAllowList::new(vec![], vec![]).unwrap();
		assert!(list.is_host_allowed("localhost"));
		assert!(list.is_host_allowed("127.0.0.1"));
	}
}
