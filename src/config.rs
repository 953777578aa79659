//! Scanner configuration.
//!
//! [`Config`] can be built programmatically or read from the process environment with
//! [`Config::from_env`].

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// The resolver used for live queries when none is configured.
pub const DEFAULT_RESOLVER: &str = "1.1.1.1:53";
/// The port the policy cache listens on when `PORT` is unset.
pub const DEFAULT_CACHE_PORT: u16 = 8080;
/// The per-query timeout when `DNS_TIMEOUT_SECS` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// An environment variable held a value we couldn't parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
	/// `RESOLVER` was not a socket address.
	#[error("invalid RESOLVER address: {0}")]
	Resolver(String),
	/// `DNS_TIMEOUT_SECS` was not a positive integer.
	#[error("invalid DNS_TIMEOUT_SECS: {0}")]
	Timeout(String),
	/// `PORT` was not a port number.
	#[error("invalid PORT: {0}")]
	Port(String),
}

/// Library configuration for the resolver gateway and DNSSEC verification.
///
/// ```
/// use dns_posture::config::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     timeout: Duration::from_secs(2),
///     no_server: true,
///     ..Default::default()
/// };
/// assert!(config.policy_cache.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// The recursive resolver live queries are sent to.
	pub resolver: SocketAddr,
	/// The upper bound on any single exchange.
	pub timeout: Duration,
	/// `host:port` of the HTTP policy/record cache, if any.
	pub policy_cache: Option<String>,
	/// Bypass every external service (the record cache) and only query the resolver.
	pub no_server: bool,
	/// Require the root zone's keys to match the IANA trust anchors.
	pub require_root_anchor: bool,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			resolver: SocketAddr::from(([1, 1, 1, 1], 53)),
			timeout: DEFAULT_TIMEOUT,
			policy_cache: Some(format!("0.0.0.0:{}", DEFAULT_CACHE_PORT)),
			no_server: false,
			require_root_anchor: false,
		}
	}
}

fn truthy(value: &str) -> bool {
	matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
	/// Reads `RESOLVER`, `DNS_TIMEOUT_SECS`, `PORT` and `NO_SERVER` from the environment.
	pub fn from_env() -> Result<Config, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Builds a config from an arbitrary variable lookup, falling back to defaults for unset
	/// variables.
	pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Config, ConfigError> {
		let mut config = Config::default();
		if let Some(resolver) = lookup("RESOLVER") {
			config.resolver = resolver.trim().parse().map_err(|_| ConfigError::Resolver(resolver))?;
		}
		if let Some(secs) = lookup("DNS_TIMEOUT_SECS") {
			match secs.trim().parse::<u64>() {
				Ok(s) if s > 0 => config.timeout = Duration::from_secs(s),
				_ => return Err(ConfigError::Timeout(secs)),
			}
		}
		if let Some(port) = lookup("PORT") {
			let port_num: u16 = port.trim().parse().map_err(|_| ConfigError::Port(port.clone()))?;
			config.policy_cache = Some(format!("0.0.0.0:{}", port_num));
		}
		if let Some(no_server) = lookup("NO_SERVER") {
			config.no_server = truthy(&no_server);
		}
		Ok(config)
	}
}
