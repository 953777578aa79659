//! Builds and verifies the DNSSEC authentication chain for a name.
//!
//! An [`AuthenticationChain`] holds one [`SignedZone`] per label suffix of the queried zone, from
//! the zone itself (index 0) up to the root (the last index). Each zone's `parent` is the index of
//! the next entry. Verification walks the chain in that order and stops at the first failure.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::Serialize;

use crate::error::{DnsError, DnssecError};
use crate::query::Exchanger;
use crate::rr::*;
use crate::rrset::{query_rrset, RRSet};
use crate::validation::{self, ValidationError};

/// One zone in an [`AuthenticationChain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedZone {
	/// The zone's name.
	pub zone: Name,
	/// The zone's DNSKEY records and their signature.
	pub dnskey: RRSet,
	/// The DS records the parent publishes for this zone, empty for the root.
	pub ds: RRSet,
	/// Index of the parent zone in the owning chain, `None` for the last entry.
	#[serde(skip)]
	pub parent: Option<usize>,
	/// The zone's keys by key tag.
	#[serde(rename = "pkLookup")]
	pub pubkey_lookup: BTreeMap<u16, DnsKey>,
}

impl SignedZone {
	/// Builds a zone entry, indexing its keys by tag. The entry starts without a parent.
	pub fn new(zone: Name, dnskey: RRSet, ds: RRSet) -> SignedZone {
		let pubkey_lookup = dnskey.dnskeys().map(|key| (key.key_tag(), key.clone())).collect();
		SignedZone { zone, dnskey, ds, parent: None, pubkey_lookup }
	}

	/// Looks up one of this zone's keys by its tag.
	pub fn key(&self, key_tag: u16) -> Option<&DnsKey> {
		self.pubkey_lookup.get(&key_tag)
	}

	fn has_keys(&self) -> bool {
		self.dnskey.dnskeys().next().is_some()
	}
}

/// The chain of zones from a queried zone up to the root.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationChain {
	zones: Vec<SignedZone>,
	require_root_anchor: bool,
}

fn unix_now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn signature_error(e: ValidationError) -> DnssecError {
	match e {
		ValidationError::OutsideValidityPeriod => DnssecError::RrsigValidityPeriod,
		_ => DnssecError::RrsigValidationError,
	}
}

fn ds_error(e: ValidationError) -> DnssecError {
	match e {
		ValidationError::UnsupportedAlgorithm => DnssecError::UnknownDsDigestType,
		_ => DnssecError::DsInvalid,
	}
}

/// Splits a domain into the zone names from itself up to and including the root.
fn zone_names(domain: &str) -> Result<Vec<Name>, DnsError> {
	let domain = domain.trim();
	if domain.is_empty() { return Err(DnsError::InvalidQuery); }
	let trimmed = domain.strip_suffix('.').unwrap_or(domain);
	if trimmed.is_empty() { return Ok(vec![Name::root()]); }

	let labels = trimmed.split('.').collect::<Vec<_>>();
	if labels.iter().any(|label| label.is_empty()) { return Err(DnsError::InvalidQuery); }
	let mut zones = Vec::with_capacity(labels.len() + 1);
	for i in 0..labels.len() {
		let zone = labels[i..].join(".") + ".";
		zones.push(Name::try_from(zone).map_err(|()| DnsError::InvalidQuery)?);
	}
	zones.push(Name::root());
	Ok(zones)
}

impl AuthenticationChain {
	/// An empty chain.
	pub fn new() -> Self { Self::default() }

	/// When set, [`Self::verify`] also requires the root zone's keys to match the IANA root
	/// trust anchors.
	pub fn require_root_anchor(mut self, require: bool) -> Self {
		self.require_root_anchor = require;
		self
	}

	/// The zones in this chain, leaf first.
	pub fn zones(&self) -> &[SignedZone] { &self.zones }

	/// True if no zones have been added.
	pub fn is_empty(&self) -> bool { self.zones.is_empty() }

	/// Appends `zone` as the parent of the current last entry.
	pub fn push_zone(&mut self, mut zone: SignedZone) {
		zone.parent = None;
		let idx = self.zones.len();
		if let Some(last) = self.zones.last_mut() {
			last.parent = Some(idx);
		}
		self.zones.push(zone);
	}

	/// Queries the DNSKEY (and, for all but the root, DS) records of every zone from `domain` up
	/// to the root, appending a [`SignedZone`] for each.
	///
	/// Whether the record cache is consulted is up to `exchanger` (see
	/// [`Config::no_server`](crate::config::Config::no_server)). The first failed query aborts
	/// construction; the zones fetched before it stay in the chain for diagnostics.
	pub fn populate<E: Exchanger + ?Sized>(&mut self, exchanger: &E, domain: &str) -> Result<(), DnssecError> {
		self.zones.clear();
		for zone in zone_names(domain)? {
			debug!("Fetching DNSKEY and DS records for {}", zone);
			let dnskey = query_rrset(exchanger, &zone, DnsKey::TYPE)?;
			let ds = if zone.is_root() {
				RRSet::default()
			} else {
				query_rrset(exchanger, &zone, DS::TYPE)?
			};
			self.push_zone(SignedZone::new(zone, dnskey, ds));
		}
		Ok(())
	}

	/// Verifies `answer` and every link of the chain at the current time.
	pub fn verify(&self, answer: &RRSet) -> Result<(), DnssecError> {
		self.verify_at(answer, unix_now())
	}

	/// Verifies `answer` and every link of the chain as of UNIX time `now`.
	///
	/// `answer` must be signed by a key of the first zone. Then, for each zone in order, its
	/// DNSKEY set must be signed by one of its own keys and, unless it is the last zone, its DS
	/// set must be signed by the parent's keys and match the key which signed the DNSKEY set.
	pub fn verify_at(&self, answer: &RRSet, now: u64) -> Result<(), DnssecError> {
		let res = self.verify_inner(answer, now);
		if let Err(e) = &res {
			warn!("DNSSEC verification failed for {}: {}",
				self.zones.first().map(|z| z.zone.as_str()).unwrap_or("<empty chain>"), e);
		}
		res
	}

	fn verify_inner(&self, answer: &RRSet, now: u64) -> Result<(), DnssecError> {
		let leaf = self.zones.first().ok_or(DnssecError::DelegationChain)?;
		if self.zones.iter().any(|zone| !zone.has_keys()) {
			return Err(DnssecError::DnskeyNotAvailable);
		}

		let answer_sig = answer.signature.as_ref().ok_or(DnssecError::InvalidRRsig)?;
		if answer_sig.key_name != leaf.zone { return Err(DnssecError::InvalidRRsig); }
		validation::verify_rrsig(answer_sig, leaf.dnskey.dnskeys(), &answer.signed_records(), now)
			.map_err(|_| DnssecError::InvalidRRsig)?;

		for zone in self.zones.iter() {
			debug!("Verifying zone {}", zone.zone);
			if !zone.has_keys() { return Err(DnssecError::DnskeyNotAvailable); }
			let key_sig = zone.dnskey.signature.as_ref().ok_or(DnssecError::RrsigValidationError)?;
			if key_sig.key_name != zone.zone { return Err(DnssecError::RrsigValidationError); }

			validation::verify_rrsig(key_sig, zone.dnskey.dnskeys(), &zone.dnskey.signed_records(), now)
				.map_err(signature_error)?;

			match zone.parent {
				Some(parent_idx) => {
					let parent = self.zones.get(parent_idx).ok_or(DnssecError::DelegationChain)?;
					if zone.ds.dses().next().is_none() { return Err(DnssecError::DsNotAvailable); }
					if !parent.has_keys() { return Err(DnssecError::DnskeyNotAvailable); }
					let ds_sig = zone.ds.signature.as_ref().ok_or(DnssecError::RrsigValidationError)?;
					if ds_sig.key_name != parent.zone { return Err(DnssecError::RrsigValidationError); }
					validation::verify_rrsig(ds_sig, parent.dnskey.dnskeys(), &zone.ds.signed_records(), now)
						.map_err(signature_error)?;
					let vouched_keys = validation::verify_ds(zone.dnskey.dnskeys(), zone.ds.dses()).map_err(ds_error)?;
					// The key which signed the DNSKEY set has to be one the parent vouched for
					validation::verify_rrsig(key_sig, vouched_keys, &zone.dnskey.signed_records(), now)
						.map_err(signature_error)?;
				},
				None if self.require_root_anchor => {
					let anchors = validation::root_hints();
					let anchored_keys = validation::verify_ds(zone.dnskey.dnskeys(), &anchors)
						.map_err(|_| DnssecError::DsInvalid)?;
					validation::verify_rrsig(key_sig, anchored_keys, &zone.dnskey.signed_records(), now)
						.map_err(signature_error)?;
				},
				None => {},
			}
		}
		Ok(())
	}

	/// The zones of this chain in order, for serialization alongside a [`DnssecRecord`].
	pub fn export_for_diagnostics(&self) -> Vec<SignedZone> {
		self.zones.clone()
	}
}

/// Queries `hostname` for records of type `ty`, builds the chain for the zone that signed the
/// answer and verifies it as of UNIX time `now`.
///
/// The chain is returned whenever one was (even partially) built, alongside the verified answer
/// or the first error.
pub fn strict_query<E: Exchanger + ?Sized>(exchanger: &E, hostname: &str, ty: u16,
	require_root_anchor: bool, now: u64)
-> (Option<AuthenticationChain>, Result<RRSet, DnssecError>) {
	let name = match Name::from_domain(hostname) {
		Ok(name) => name,
		Err(()) => return (None, Err(DnsError::InvalidQuery.into())),
	};
	let answer = match query_rrset(exchanger, &name, ty) {
		Ok(answer) => answer,
		Err(e) => return (None, Err(e.into())),
	};
	if answer.is_empty() { return (None, Err(DnsError::NoResult.into())); }
	let signer = match &answer.signature {
		Some(sig) => sig.key_name.clone(),
		None => return (None, Err(DnssecError::ResourceNotSigned)),
	};

	let mut chain = AuthenticationChain::new().require_root_anchor(require_root_anchor);
	if let Err(e) = chain.populate(exchanger, &signer) {
		return (Some(chain), Err(e));
	}
	let res = chain.verify_at(&answer, now).map(|()| answer);
	(Some(chain), res)
}

/// The DNSSEC posture of one (hostname, type) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnssecRecord {
	/// The answer was signed (whether or not the chain verified).
	#[serde(rename = "dnssecExists")]
	pub exists: bool,
	/// The answer and its whole chain verified.
	#[serde(rename = "dnssecValid")]
	pub valid: bool,
	/// Why verification failed, empty on success.
	pub reason: String,
	/// The zones of the chain, as far as it was built.
	#[serde(rename = "signedZones")]
	pub signed_zones: Vec<SignedZone>,
}

/// Runs [`strict_query`] at the current time and classifies the outcome.
pub fn measure<E: Exchanger + ?Sized>(exchanger: &E, hostname: &str, ty: u16, require_root_anchor: bool)
-> DnssecRecord {
	measure_at(exchanger, hostname, ty, require_root_anchor, unix_now())
}

/// Runs [`strict_query`] as of UNIX time `now` and classifies the outcome.
///
/// Query failures, invalid names and unsigned answers mean DNSSEC does not exist for the name.
/// Any verification failure means it exists but is invalid.
pub fn measure_at<E: Exchanger + ?Sized>(exchanger: &E, hostname: &str, ty: u16,
	require_root_anchor: bool, now: u64)
-> DnssecRecord {
	let (chain, res) = strict_query(exchanger, hostname, ty, require_root_anchor, now);
	let mut record = DnssecRecord::default();
	match res {
		Ok(_) => {
			record.exists = true;
			record.valid = true;
		},
		Err(e) => {
			record.exists = !matches!(e, DnssecError::Dns(_) | DnssecError::ResourceNotSigned);
			record.reason = e.to_string();
		},
	}
	if let Some(chain) = chain {
		record.signed_zones = chain.export_for_diagnostics();
	}
	record
}
