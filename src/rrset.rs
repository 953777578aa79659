//! Splits an answer section into the data records and the signature covering them.

use serde::Serialize;

use crate::error::DnsError;
use crate::query::{Exchanger, Message};
use crate::rr::*;

/// A set of records of one type at one name, plus the [`RRSig`] over them if there was one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RRSet {
	/// The data records, in answer order.
	#[serde(rename = "RrSet")]
	pub records: Vec<RR>,
	/// The signature covering [`Self::records`].
	#[serde(rename = "RrSig")]
	pub signature: Option<RRSig>,
}

impl RRSet {
	/// Builds an [`RRSet`] from the answer section of `msg`, which answered a query for `ty`.
	///
	/// Every non-[`RRSig`] record is kept. The signature is the first [`RRSig`] covering `ty`, or
	/// the first [`RRSig`] at all if none cover it.
	pub fn from_message(msg: &Message, ty: u16) -> RRSet {
		let records = msg.answers.iter()
			.filter(|rr| !matches!(rr, RR::RRSig(_)))
			.cloned()
			.collect();
		let mut sigs = msg.answers.iter()
			.filter_map(|rr| if let RR::RRSig(sig) = rr { Some(sig) } else { None });
		let signature = sigs.clone().find(|sig| sig.ty == ty).or_else(|| sigs.next()).cloned();
		RRSet { records, signature }
	}

	/// True if a signature was present.
	pub fn is_signed(&self) -> bool { self.signature.is_some() }

	/// True if there are no data records.
	pub fn is_empty(&self) -> bool { self.records.is_empty() }

	/// The records of the signed type, i.e. the ones the signature should cover.
	pub(crate) fn signed_records(&self) -> Vec<&RR> {
		let ty = match &self.signature {
			Some(sig) => sig.ty,
			None => return self.records.iter().collect(),
		};
		self.records.iter().filter(|rr| rr.ty() == ty).collect()
	}

	/// The [`DnsKey`] records in this set.
	pub fn dnskeys(&self) -> impl Iterator<Item = &DnsKey> {
		self.records.iter().filter_map(|rr| if let RR::DnsKey(key) = rr { Some(key) } else { None })
	}

	/// The [`DS`] records in this set.
	pub fn dses(&self) -> impl Iterator<Item = &DS> {
		self.records.iter().filter_map(|rr| if let RR::DS(ds) = rr { Some(ds) } else { None })
	}
}

/// Queries `name` for records of type `ty` and splits the answer into an [`RRSet`].
///
/// A name which doesn't exist is reported as [`DnsError::NoResult`].
pub fn query_rrset<E: Exchanger + ?Sized>(exchanger: &E, name: &Name, ty: u16) -> Result<RRSet, DnsError> {
	let msg = exchanger.exchange(name, ty)?;
	if msg.rcode == crate::query::RCODE_NXDOMAIN { return Err(DnsError::NoResult); }
	Ok(RRSet::from_message(&msg, ty))
}
