//! Recursive evaluation of a domain's SPF record.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;
use log::{debug, warn};

use crate::error::DnsError;
use crate::query::{lookup_ips, lookup_mx, lookup_txt, Exchanger};
use crate::rr::Name;

use super::*;

/// The most DNS-consuming terms one evaluation may use, across every nested record.
pub const MAX_LOOKUPS: usize = 10;

/// State shared by every level of a single [`check_host`] evaluation.
///
/// A fresh state is built for each top-level evaluation, so the lookup budget of one domain never
/// leaks into another.
#[derive(Debug, Default)]
pub struct EvaluationState {
	lookups: usize,
	max_depth: usize,
}

impl EvaluationState {
	/// A state with the whole budget available.
	pub fn new() -> Self { Self::default() }

	/// The number of DNS-consuming terms charged so far, including any over the budget.
	pub fn lookups(&self) -> usize { self.lookups }

	/// The deepest `include`/`redirect` level reached so far.
	pub fn max_depth(&self) -> usize { self.max_depth }

	/// Charges `count` lookups, returning false if the budget is now exceeded.
	fn charge(&mut self, count: usize) -> bool {
		self.lookups += count;
		self.lookups <= MAX_LOOKUPS
	}
}

/// Addresses and errors collected across the whole tree.
#[derive(Default)]
struct Findings {
	ips: BTreeSet<String>,
	errors: BTreeSet<SpfError>,
}

/// Evaluates the SPF policy published at `domain`.
///
/// This never fails: every problem is recorded as an [`SpfError`] in the returned record, next to
/// whatever could still be resolved.
pub fn check_host<E: Exchanger + ?Sized>(exchanger: &E, domain: &str) -> CombinedSpfRecord {
	let mut state = EvaluationState::new();
	let mut findings = Findings::default();
	let result = evaluate(exchanger, &mut state, &mut findings, domain, 0);
	CombinedSpfRecord::new(result, findings.ips, findings.errors, state.max_depth)
}

/// Fetches the single `v=spf1` TXT record at `domain`, lower-cased.
fn lookup_spf<E: Exchanger + ?Sized>(exchanger: &E, domain: &str) -> Result<String, SpfError> {
	let name = Name::from_domain(domain).map_err(|()| SpfError::TempError)?;
	let texts = match lookup_txt(exchanger, &name) {
		Ok(texts) => texts,
		Err(DnsError::NoResult) => return Err(SpfError::NoRecord),
		Err(e) => {
			warn!("Failed to fetch SPF record for {}: {}", domain, e);
			return Err(SpfError::TempError);
		},
	};

	let mut records = texts.into_iter()
		.map(|text| text.to_ascii_lowercase())
		.filter(|text| text == "v=spf1" || text.starts_with("v=spf1 "));
	match (records.next(), records.next()) {
		(None, _) => Err(SpfError::NoRecord),
		(Some(record), None) => Ok(record),
		(Some(_), Some(_)) => Err(SpfError::PermError),
	}
}

fn evaluate<E: Exchanger + ?Sized>(
	exchanger: &E, state: &mut EvaluationState, findings: &mut Findings, domain: &str, depth: usize,
) -> SpfResult {
	state.max_depth = state.max_depth.max(depth);
	let mut result = SpfResult::default();

	let text = match lookup_spf(exchanger, domain) {
		Ok(text) => text,
		Err(e) => {
			result.error = Some(e);
			findings.errors.insert(e);
			return result;
		},
	};
	let terms = parse(&text);
	result.text = text;

	for term in terms {
		let directive = match term {
			Term::Directive(directive) => directive,
			Term::Modifier(modifier) if modifier.name == "redirect" => {
				let nested = if state.charge(1) {
					let mut nested = evaluate(exchanger, state, findings, &modifier.value, depth + 1);
					nested.recursion = RecursionType::Redirect;
					nested
				} else {
					warn!("SPF lookup budget exhausted at redirect={} in {}", modifier.value, domain);
					findings.errors.insert(SpfError::LookupCount);
					SpfResult {
						recursion: RecursionType::Redirect,
						error: Some(SpfError::LookupCount),
						..SpfResult::default()
					}
				};
				result.recursive_lookups.insert(modifier.value, nested);
				return result;
			},
			// exp= and unknown modifiers don't affect which addresses are authorized
			Term::Modifier(_) => continue,
		};

		if directive.mechanism.consumes_lookup() && !state.charge(1) {
			warn!("SPF lookup budget exhausted at {:?}:{} in {}", directive.mechanism, directive.parameter, domain);
			findings.errors.insert(SpfError::LookupCount);
			result.simple_lookups.push(SimpleLookup {
				mechanism: directive.mechanism,
				parameter: directive.parameter,
				ips: Vec::new(),
				pointer: String::new(),
				qualifier: directive.qualifier,
				error: Some(SpfError::LookupCount),
			});
			continue;
		}

		let mut lookup = SimpleLookup {
			mechanism: directive.mechanism,
			parameter: String::new(),
			ips: Vec::new(),
			pointer: String::new(),
			qualifier: directive.qualifier,
			error: None,
		};
		match directive.mechanism {
			Mechanism::A => {
				let target = directive.domain(domain);
				match resolve(exchanger, target) {
					Ok(ips) => lookup.ips = to_cidrs(&ips, directive.cidr_lengths()),
					Err(e) => {
						debug!("SPF a:{} in {} failed: {}", target, domain, e);
						lookup.error = Some(SpfError::TempError);
					},
				}
				lookup.parameter = target.to_owned();
			},
			Mechanism::Mx => {
				let target = directive.domain(domain);
				let (ips, error) = resolve_mx(exchanger, state, target);
				lookup.ips = to_cidrs(&ips, directive.cidr_lengths());
				lookup.error = error;
				lookup.parameter = target.to_owned();
			},
			Mechanism::Include => {
				let target = directive.domain(domain).to_owned();
				let mut nested = evaluate(exchanger, state, findings, &target, depth + 1);
				nested.recursion = RecursionType::Include;
				result.recursive_lookups.insert(target, nested);
				continue;
			},
			Mechanism::Ptr => {
				lookup.error = Some(SpfError::PermError);
				lookup.pointer = directive.parameter.clone();
				lookup.parameter = directive.parameter;
			},
			Mechanism::Ip4 | Mechanism::Ip6 => {
				let mut cidr = directive.parameter;
				if !cidr.contains('/') {
					cidr += if directive.mechanism == Mechanism::Ip4 { "/32" } else { "/128" };
				}
				lookup.ips.push(cidr.clone());
				lookup.parameter = cidr;
			},
			Mechanism::Exists => lookup.parameter = directive.parameter,
			Mechanism::All => {
				result.all_qualifier = Some(directive.qualifier);
				break;
			},
		}

		if let Some(e) = lookup.error { findings.errors.insert(e); }
		findings.ips.extend(lookup.ips.iter().cloned());
		result.simple_lookup_ips.extend(lookup.ips.iter().cloned());
		result.simple_lookups.push(lookup);
	}
	result
}

fn resolve<E: Exchanger + ?Sized>(exchanger: &E, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
	let name = Name::from_domain(domain).map_err(|()| DnsError::InvalidQuery)?;
	lookup_ips(exchanger, &name)
}

/// Resolves every exchange host of `domain`, charging one extra lookup per host beyond the first.
fn resolve_mx<E: Exchanger + ?Sized>(
	exchanger: &E, state: &mut EvaluationState, domain: &str,
) -> (Vec<IpAddr>, Option<SpfError>) {
	let hosts = match Name::from_domain(domain).map_err(|()| DnsError::InvalidQuery)
		.and_then(|name| lookup_mx(exchanger, &name))
	{
		Ok(hosts) => hosts,
		Err(DnsError::NoResult) => Vec::new(),
		Err(e) => {
			debug!("SPF mx:{} failed: {}", domain, e);
			return (Vec::new(), Some(SpfError::TempError));
		},
	};

	let mut ips = Vec::new();
	let mut error = None;
	let mut resolved = hosts.len();
	for (idx, host) in hosts.iter().enumerate() {
		match lookup_ips(exchanger, host) {
			Ok(found) => ips.extend(found),
			Err(e) => {
				debug!("SPF mx:{} host {} failed: {}", domain, host, e);
				ips.clear();
				resolved = idx;
				error = Some(SpfError::TempError);
				break;
			},
		}
	}
	if !state.charge(resolved.saturating_sub(1)) {
		warn!("SPF lookup budget exhausted by the exchange hosts of {}", domain);
		error = Some(SpfError::LookupCount);
	}
	(ips, error)
}

/// Formats resolved addresses as networks, applying the term's prefix lengths if it gave any.
fn to_cidrs(ips: &[IpAddr], (v4_len, v6_len): (Option<u8>, Option<u8>)) -> Vec<String> {
	ips.iter().map(|ip| {
		let len = match ip {
			IpAddr::V4(_) => v4_len.unwrap_or(32),
			IpAddr::V6(_) => v6_len.unwrap_or(128),
		};
		match IpNet::new(*ip, len) {
			Ok(net) => net.trunc().to_string(),
			Err(_) => IpNet::from(*ip).to_string(),
		}
	}).collect()
}
