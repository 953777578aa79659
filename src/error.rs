//! Error types surfaced by the resolver gateway and the DNSSEC chain.

use thiserror::Error;

/// An error returned by the resolver gateway while exchanging a query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnsError {
	/// The queried name was empty or not a valid domain name.
	#[error("invalid query input")]
	InvalidQuery,
	/// The name does not exist (NXDOMAIN) or the answer was otherwise unusable.
	#[error("requested RR not found")]
	NoResult,
	/// The record cache answered with a non-200 status code.
	#[error("http status code is not 200: {0}")]
	HttpStatus(u16),
	/// The record cache could not be reached.
	#[error("unable to connect to http server: {0}")]
	HttpConnect(String),
	/// The record cache had no entry for the query.
	#[error("cache miss")]
	CacheMiss,
	/// External services were disabled for this resolver.
	#[error("noserver boolean set")]
	CacheDisabled,
	/// The query did not complete before its timeout or deadline.
	#[error("dns query timed out")]
	Timeout,
	/// The live query failed at the transport layer.
	#[error("dns transport error: {0}")]
	Transport(String),
	/// The response could not be parsed or did not match the query.
	#[error("malformed dns response")]
	MalformedResponse,
}

impl From<std::io::Error> for DnsError {
	fn from(e: std::io::Error) -> Self {
		match e.kind() {
			std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => DnsError::Timeout,
			_ => DnsError::Transport(e.to_string()),
		}
	}
}

/// An error building or verifying a DNSSEC authentication chain.
///
/// The `Display` form of each variant is the `reason` recorded in a
/// [`DnssecRecord`](crate::chain::DnssecRecord).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnssecError {
	/// The answer carried no RRSIG.
	#[error("resource is not signed with RRSIG")]
	ResourceNotSigned,
	/// The answer's RRSIG did not verify against the leaf zone's keys.
	#[error("invalid RRSIG")]
	InvalidRRsig,
	/// A DNSKEY or DS RRSIG did not verify.
	#[error("RR doesn't validate against RRSIG")]
	RrsigValidationError,
	/// The current time is outside a signature's inception/expiration window.
	#[error("invalid RRSIG validity period")]
	RrsigValidityPeriod,
	/// A non-root zone had no DS records in its parent.
	#[error("DS RR does not exist")]
	DsNotAvailable,
	/// No DS digest matched the zone's keys.
	#[error("DS RR does not match DNSKEY")]
	DsInvalid,
	/// None of the DS records used a digest type we know.
	#[error("unknown DS digest type")]
	UnknownDsDigestType,
	/// A zone had no DNSKEY records.
	#[error("DNSKEY RR does not exist")]
	DnskeyNotAvailable,
	/// The chain had no zones in it.
	#[error("AuthChain has no Delegations")]
	DelegationChain,
	/// A query made while building the chain failed.
	#[error(transparent)]
	Dns(#[from] DnsError),
}
