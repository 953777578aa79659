//! The resolver gateway: exchanges a single (name, type) question for a parsed [`Message`].
//!
//! Queries are first tried against the HTTP record cache (unless external services are disabled)
//! and then sent to a recursive resolver over TCP with the DNSSEC OK bit set, so that RRSIGs are
//! included in the answer.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, TcpStream};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::Config;
use crate::error::DnsError;
use crate::rr::*;
use crate::ser::*;

// We don't care about transaction IDs as we're only going to accept signed data, and we make one
// query per connection.
const TXID: u16 = 0;

/// The response code for a name which does not exist.
pub const RCODE_NXDOMAIN: u8 = 3;

pub(crate) fn build_query(domain: &Name, ty: u16) -> Vec<u8> {
	let mut query = Vec::with_capacity(64);
	query.extend_from_slice(&TXID.to_be_bytes());
	query.extend_from_slice(&[0x01, 0x20]); // Flags: Recursive, Authenticated Data
	query.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 1]); // One question, One additional
	write_name(&mut query, domain);
	query.extend_from_slice(&ty.to_be_bytes());
	query.extend_from_slice(&1u16.to_be_bytes()); // INternet class
	query.extend_from_slice(&[0, 0, 0x29]); // . OPT
	query.extend_from_slice(&0u16.to_be_bytes()); // 0 UDP payload size
	query.extend_from_slice(&[0, 0]); // EDNS version 0
	query.extend_from_slice(&0x8000u16.to_be_bytes()); // Accept DNSSEC RRs
	query.extend_from_slice(&0u16.to_be_bytes()); // No additional data
	query
}

/// A parsed DNS response.
///
/// Only the answer section is retained, and only records of the types in [`RR`]; anything else
/// is skipped while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	/// The transaction ID of the response.
	pub id: u16,
	/// The response code from the low four bits of the flags.
	pub rcode: u8,
	/// The supported records from the answer section, in the order they appeared.
	pub answers: Vec<RR>,
}

impl Message {
	/// Parses a response message in DNS wire format.
	pub fn from_wire(resp: &[u8]) -> Result<Message, DnsError> {
		Self::parse(resp).map_err(|()| DnsError::MalformedResponse)
	}

	fn parse(resp: &[u8]) -> Result<Message, ()> {
		let mut read: &[u8] = resp;
		let id = read_u16(&mut read)?;
		let flags = read_u16(&mut read)?;
		// Must be a response
		if flags & 0b1000_0000_0000_0000 == 0 { return Err(()); }
		let rcode = (flags & 0b1111) as u8;
		let questions = read_u16(&mut read)?;
		let answers = read_u16(&mut read)?;
		let _authorities = read_u16(&mut read)?;
		let _additional = read_u16(&mut read)?;

		for _ in 0..questions {
			read_wire_packet_name(&mut read, resp)?;
			read_u16(&mut read)?; // type
			read_u16(&mut read)?; // class
		}

		let mut records = Vec::with_capacity(answers as usize);
		for _ in 0..answers {
			if let Some(rr) = parse_wire_packet_rr(&mut read, resp)? {
				records.push(rr);
			}
		}
		Ok(Message { id, rcode, answers: records })
	}

	/// Writes this message as a question-less response in DNS wire format.
	///
	/// This is the format the record cache serves and [`Self::from_wire`] reads.
	pub fn to_wire(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(512);
		out.extend_from_slice(&self.id.to_be_bytes());
		let flags = 0x8000u16 | 0x0100 | 0x0080 | u16::from(self.rcode & 0b1111);
		out.extend_from_slice(&flags.to_be_bytes());
		out.extend_from_slice(&0u16.to_be_bytes());
		out.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
		out.extend_from_slice(&[0, 0, 0, 0]);
		for rr in self.answers.iter() {
			let ttl = if let RR::RRSig(sig) = rr { sig.orig_ttl } else { 300 };
			write_rr(rr, ttl, &mut out);
		}
		out
	}
}

/// Something which can answer a single DNS question.
///
/// [`Resolver`] is the live implementation; anything else (e.g. a fixed set of records) can be
/// plugged into the chain builder and SPF evaluator through this trait.
pub trait Exchanger {
	/// Asks for records of type `ty` at `name`.
	///
	/// A name which does not exist must be reported as [`DnsError::NoResult`].
	fn exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError>;
}

impl<E: Exchanger + ?Sized> Exchanger for &E {
	fn exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError> {
		(**self).exchange(name, ty)
	}
}

/// The live resolver gateway.
#[derive(Debug, Clone)]
pub struct Resolver {
	config: Config,
	deadline: Option<Instant>,
}

fn send_query(stream: &mut TcpStream, query: &[u8]) -> Result<(), std::io::Error> {
	stream.write_all(&(query.len() as u16).to_be_bytes())?;
	stream.write_all(&query)?;
	Ok(())
}

fn read_response(stream: &mut TcpStream) -> Result<Vec<u8>, std::io::Error> {
	let mut len_bytes = [0; 2];
	stream.read_exact(&mut len_bytes)?;
	let mut buf = vec![0; u16::from_be_bytes(len_bytes) as usize];
	stream.read_exact(&mut buf)?;
	Ok(buf)
}

impl Resolver {
	/// Builds a resolver from the given configuration.
	pub fn new(config: Config) -> Self {
		Resolver { config, deadline: None }
	}

	/// Bounds every subsequent exchange by `deadline` as well as the configured timeout.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);
		self
	}

	/// The configuration this resolver was built with.
	pub fn config(&self) -> &Config { &self.config }

	fn remaining(&self) -> Result<Duration, DnsError> {
		match self.deadline {
			None => Ok(self.config.timeout),
			Some(deadline) => {
				let left = deadline.checked_duration_since(Instant::now())
					.filter(|left| !left.is_zero())
					.ok_or(DnsError::Timeout)?;
				Ok(core::cmp::min(left, self.config.timeout))
			}
		}
	}

	/// Looks the question up in the HTTP record cache.
	pub fn cached_exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError> {
		if self.config.no_server { return Err(DnsError::CacheDisabled); }
		let cache = self.config.policy_cache.as_ref().ok_or(DnsError::CacheDisabled)?;
		let timeout = self.remaining()?;

		let url = format!("http://{}/get-msg?tld={}&type={}", cache, name, ty);
		let resp = minreq::get(url)
			.with_timeout(core::cmp::max(timeout.as_secs(), 1))
			.send()
			.map_err(|e| DnsError::HttpConnect(e.to_string()))?;
		if resp.status_code != 200 {
			return Err(DnsError::HttpStatus(u16::try_from(resp.status_code).unwrap_or(0)));
		}
		let body = resp.as_bytes();
		if body.is_empty() { return Err(DnsError::CacheMiss); }
		Message::from_wire(body)
	}

	/// Sends the question to the configured recursive resolver over TCP.
	pub fn live_exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError> {
		let timeout = self.remaining()?;
		let mut stream = TcpStream::connect_timeout(&self.config.resolver, timeout)?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		send_query(&mut stream, &build_query(name, ty))?;
		let resp = read_response(&mut stream)?;
		let msg = Message::from_wire(&resp)?;
		if msg.id != TXID { return Err(DnsError::MalformedResponse); }
		Ok(msg)
	}
}

impl Exchanger for Resolver {
	fn exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError> {
		let msg = match self.cached_exchange(name, ty) {
			Ok(msg) => msg,
			Err(DnsError::CacheDisabled) => self.live_exchange(name, ty)?,
			Err(e) => {
				debug!("Record cache failed for {} type {} ({}), querying {}", name, ty, e, self.config.resolver);
				self.live_exchange(name, ty).map_err(|e| {
					warn!("Query for {} type {} failed: {}", name, ty, e);
					e
				})?
			},
		};
		if msg.rcode == RCODE_NXDOMAIN { return Err(DnsError::NoResult); }
		Ok(msg)
	}
}

/// Fetches the text of every TXT record answering `name`.
pub fn lookup_txt<E: Exchanger + ?Sized>(exchanger: &E, name: &Name) -> Result<Vec<String>, DnsError> {
	let msg = exchanger.exchange(name, Txt::TYPE)?;
	Ok(msg.answers.iter()
		.filter_map(|rr| if let RR::Txt(txt) = rr { Some(txt.text()) } else { None })
		.collect())
}

/// Resolves `name` to its IPv4 and IPv6 addresses.
///
/// Fails only if both the A and AAAA lookups fail, with the error from the A lookup.
pub fn lookup_ips<E: Exchanger + ?Sized>(exchanger: &E, name: &Name) -> Result<Vec<IpAddr>, DnsError> {
	let v4 = exchanger.exchange(name, A::TYPE);
	let v6 = exchanger.exchange(name, AAAA::TYPE);
	if let (Err(e), Err(_)) = (&v4, &v6) { return Err(e.clone()); }

	let mut ips = Vec::new();
	for msg in [v4, v6].into_iter().flatten() {
		for rr in msg.answers {
			match rr {
				RR::A(a) => ips.push(IpAddr::V4(Ipv4Addr::from(a.address))),
				RR::AAAA(aaaa) => ips.push(IpAddr::V6(Ipv6Addr::from(aaaa.address))),
				_ => {},
			}
		}
	}
	Ok(ips)
}

/// Fetches the exchange hosts of every MX record answering `name`, in answer order.
pub fn lookup_mx<E: Exchanger + ?Sized>(exchanger: &E, name: &Name) -> Result<Vec<Name>, DnsError> {
	let msg = exchanger.exchange(name, MX::TYPE)?;
	Ok(msg.answers.into_iter()
		.filter_map(|rr| if let RR::MX(mx) = rr { Some(mx.exchange) } else { None })
		.collect())
}

/// An [`Exchanger`] answering from a fixed table, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) mod fake {
	use super::*;
	use std::cell::RefCell;
	use std::collections::HashMap;

	#[derive(Default)]
	pub(crate) struct StaticExchanger {
		answers: HashMap<(String, u16), Result<Vec<RR>, DnsError>>,
		pub(crate) queries: RefCell<Vec<(String, u16)>>,
	}

	impl StaticExchanger {
		pub(crate) fn new() -> Self { Self::default() }

		pub(crate) fn add(&mut self, name: &str, ty: u16, rrs: Vec<RR>) {
			self.answers.insert((name.to_ascii_lowercase(), ty), Ok(rrs));
		}

		pub(crate) fn fail(&mut self, name: &str, ty: u16, err: DnsError) {
			self.answers.insert((name.to_ascii_lowercase(), ty), Err(err));
		}

		pub(crate) fn add_txt(&mut self, name: &str, texts: &[&str]) {
			let rrs = texts.iter().map(|t| RR::Txt(Txt {
				name: Name::from_domain(name).unwrap(), data: t.as_bytes().to_vec(),
			})).collect();
			self.add(&Name::from_domain(name).unwrap(), Txt::TYPE, rrs);
		}

		pub(crate) fn add_a(&mut self, name: &str, addrs: &[[u8; 4]]) {
			let rrs = addrs.iter().map(|address| RR::A(A {
				name: Name::from_domain(name).unwrap(), address: *address,
			})).collect();
			self.add(&Name::from_domain(name).unwrap(), A::TYPE, rrs);
		}

		pub(crate) fn add_mx(&mut self, name: &str, hosts: &[&str]) {
			let rrs = hosts.iter().enumerate().map(|(i, host)| RR::MX(MX {
				name: Name::from_domain(name).unwrap(), preference: (i as u16 + 1) * 10,
				exchange: Name::from_domain(host).unwrap(),
			})).collect();
			self.add(&Name::from_domain(name).unwrap(), MX::TYPE, rrs);
		}

		pub(crate) fn query_count(&self, name: &str, ty: u16) -> usize {
			let name = Name::from_domain(name).unwrap().to_ascii_lowercase();
			self.queries.borrow().iter().filter(|(n, t)| *n == name && *t == ty).count()
		}
	}

	impl Exchanger for StaticExchanger {
		fn exchange(&self, name: &Name, ty: u16) -> Result<Message, DnsError> {
			let key = (name.to_ascii_lowercase(), ty);
			self.queries.borrow_mut().push(key.clone());
			match self.answers.get(&key) {
				Some(Ok(answers)) => Ok(Message { id: 0, rcode: 0, answers: answers.clone() }),
				Some(Err(e)) => Err(e.clone()),
				None => Err(DnsError::NoResult),
			}
		}
	}
}
