//! Resource Records are the fundamental type in the DNS - individual records mapping a name to
//! some data.
//!
//! This module holds structs and utilities for the Resource Records the scanner understands:
//! address and mail-exchanger records used by SPF evaluation, TXT records carrying policies, and
//! the DNSSEC [`DnsKey`], [`DS`] and [`RRSig`] records used to walk the chain of trust.

use serde::Serialize;

use crate::ser::*;

/// A fully-qualified domain name, as it appears in queries and records.
///
/// Names always carry their trailing `.`, are at most 255 bytes of printable ASCII and have no
/// empty or over-long (more than 63 byte) labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Name(String);
impl Name {
	/// The name as text, including the trailing `.`.
	pub fn as_str(&self) -> &str { &self.0 }

	/// The root zone, `.`.
	pub fn root() -> Name { Name(".".to_owned()) }

	/// Builds a fully-qualified [`Name`] from a hostname which may or may not carry the trailing
	/// dot.
	pub fn from_domain(domain: &str) -> Result<Name, ()> {
		let domain = domain.trim();
		if domain.is_empty() { return Err(()); }
		if domain.ends_with('.') { domain.try_into() } else { Name::try_from(domain.to_owned() + ".") }
	}

	/// Returns true if this is the root zone.
	pub fn is_root(&self) -> bool { self.0 == "." }

	/// The number of labels in this name, not counting the root label.
	pub fn label_count(&self) -> usize {
		if self.is_root() { 0 } else { self.0.split('.').filter(|l| !l.is_empty()).count() }
	}
}
impl core::ops::Deref for Name {
	type Target = str;
	fn deref(&self) -> &str { &self.0 }
}
impl core::fmt::Display for Name {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result { f.write_str(&self.0) }
}
impl TryFrom<String> for Name {
	type Error = ();
	fn try_from(s: String) -> Result<Name, ()> {
		if !s.ends_with('.') || s.len() > 255 { return Err(()); }
		if !s.chars().all(|c| c.is_ascii_graphic()) { return Err(()); }
		// Every label but the trailing root label must be 1 to 63 bytes
		if s != "." && s[..s.len() - 1].split('.').any(|label| label.is_empty() || label.len() > 63) {
			return Err(());
		}
		Ok(Name(s))
	}
}
impl TryFrom<&str> for Name {
	type Error = ();
	fn try_from(s: &str) -> Result<Name, ()> {
		Self::try_from(s.to_owned())
	}
}

/// A record of one of the types the scanner understands.
///
/// Records of other types which appear in an answer section are skipped while parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "type")]
pub enum RR {
	/// An IPv4 address
	A(A),
	/// An IPv6 address
	AAAA(AAAA),
	/// A mail exchanger
	MX(MX),
	/// Free-form text, e.g. an SPF policy
	Txt(Txt),
	/// An alias
	CName(CName),
	/// A zone signing key
	DnsKey(DnsKey),
	/// A delegation signer, published by the parent zone
	DS(DS),
	/// A signature over a record set
	RRSig(RRSig),
}
impl RR {
	/// The owner name of this record.
	pub fn name(&self) -> &Name {
		match self {
			RR::A(a) => &a.name,
			RR::AAAA(aaaa) => &aaaa.name,
			RR::MX(mx) => &mx.name,
			RR::Txt(txt) => &txt.name,
			RR::CName(cname) => &cname.name,
			RR::DnsKey(key) => &key.name,
			RR::DS(ds) => &ds.name,
			RR::RRSig(sig) => &sig.name,
		}
	}
	/// The IANA type code of this record.
	pub fn ty(&self) -> u16 {
		match self {
			RR::A(_) => types::A,
			RR::AAAA(_) => types::AAAA,
			RR::MX(_) => types::MX,
			RR::Txt(_) => types::TXT,
			RR::CName(_) => types::CNAME,
			RR::DnsKey(_) => types::DNSKEY,
			RR::DS(_) => types::DS,
			RR::RRSig(_) => types::RRSIG,
		}
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		match self {
			RR::A(a) => a.write_data(out),
			RR::AAAA(aaaa) => aaaa.write_data(out),
			RR::MX(mx) => mx.write_data(out),
			RR::Txt(txt) => txt.write_data(out),
			RR::CName(cname) => cname.write_data(out),
			RR::DnsKey(key) => key.write_data(out),
			RR::DS(ds) => ds.write_data(out),
			RR::RRSig(sig) => sig.write_data(out),
		}
	}
}
impl From<A> for RR { fn from(rr: A) -> RR { RR::A(rr) } }
impl From<AAAA> for RR { fn from(rr: AAAA) -> RR { RR::AAAA(rr) } }
impl From<MX> for RR { fn from(rr: MX) -> RR { RR::MX(rr) } }
impl From<Txt> for RR { fn from(rr: Txt) -> RR { RR::Txt(rr) } }
impl From<CName> for RR { fn from(rr: CName) -> RR { RR::CName(rr) } }
impl From<DnsKey> for RR { fn from(rr: DnsKey) -> RR { RR::DnsKey(rr) } }
impl From<DS> for RR { fn from(rr: DS) -> RR { RR::DS(rr) } }
impl From<RRSig> for RR { fn from(rr: RRSig) -> RR { RR::RRSig(rr) } }

/// A concrete record type with a fixed IANA type code.
pub(crate) trait StaticRecord : Ord + Sized {
	const TYPE: u16;
	fn name(&self) -> &Name;
	/// Writes the RDATA, without its length prefix.
	fn write_data(&self, out: &mut Vec<u8>);
	/// Parses the RDATA in `data`. Compressed names in it point into `wire_packet`.
	fn read_from_data(name: Name, data: &[u8], wire_packet: &[u8]) -> Result<Self, ()>;
}
/// Anything which can be signed and verified as part of a record set, including the [`RR`] enum.
pub trait Record : Ord {
	/// The IANA type code.
	fn ty(&self) -> u16;
	/// The owner name.
	fn name(&self) -> &Name;
	/// Appends the RDATA in wire format, prefixed by its length as a u16.
	fn write_u16_len_prefixed_data(&self, out: &mut Vec<u8>);
}
impl<R: StaticRecord> Record for R {
	fn ty(&self) -> u16 { R::TYPE }
	fn name(&self) -> &Name { StaticRecord::name(self) }
	fn write_u16_len_prefixed_data(&self, out: &mut Vec<u8>) {
		write_u16_len_prefixed(out, |out| self.write_data(out))
	}
}
impl Record for RR {
	fn ty(&self) -> u16 { RR::ty(self) }
	fn name(&self) -> &Name { RR::name(self) }
	fn write_u16_len_prefixed_data(&self, out: &mut Vec<u8>) {
		write_u16_len_prefixed(out, |out| self.write_data(out))
	}
}

/// Record type constants for the types queried by the scanner.
pub mod types {
	/// IPv4 address
	pub const A: u16 = 1;
	/// Canonical name
	pub const CNAME: u16 = 5;
	/// Mail exchanger
	pub const MX: u16 = 15;
	/// Text
	pub const TXT: u16 = 16;
	/// IPv6 address
	pub const AAAA: u16 = 28;
	/// Delegation signer
	pub const DS: u16 = 43;
	/// Resource record signature
	pub const RRSIG: u16 = 46;
	/// DNSSEC public key
	pub const DNSKEY: u16 = 48;
}

/// A TXT record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Txt {
	/// The owner name.
	pub name: Name,
	/// The record's character-strings, joined.
	///
	/// TXT data carries no encoding, so this is kept as bytes. SPF and most other policies are
	/// ASCII in practice; see [`Txt::text`].
	#[serde(serialize_with = "serialize_lossy_str")]
	pub data: Vec<u8>,
}
impl StaticRecord for Txt {
	const TYPE: u16 = types::TXT;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], _wire_packet: &[u8]) -> Result<Self, ()> {
		let mut text = Vec::with_capacity(data.len());
		while let Some((&len, rest)) = data.split_first() {
			let len = len as usize;
			if rest.len() < len { return Err(()); }
			text.extend_from_slice(&rest[..len]);
			data = &rest[len..];
		}
		Ok(Txt { name, data: text })
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		// Empty text is still one (empty) character-string
		if self.data.is_empty() { out.push(0); }
		for chunk in self.data.chunks(255) {
			out.push(chunk.len() as u8);
			out.extend_from_slice(chunk);
		}
	}
}
impl Txt {
	/// The text of this record, with any invalid UTF-8 replaced.
	pub fn text(&self) -> String { String::from_utf8_lossy(&self.data).into_owned() }
}

/// A CNAME record, aliasing [`Self::name`] to [`Self::canonical_name`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CName {
	/// The alias.
	pub name: Name,
	/// The name the alias points to.
	pub canonical_name: Name,
}
impl StaticRecord for CName {
	const TYPE: u16 = types::CNAME;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], wire_packet: &[u8]) -> Result<Self, ()> {
		let canonical_name = read_wire_packet_name(&mut data, wire_packet)?;
		Ok(CName { name, canonical_name })
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		write_name(out, &self.canonical_name);
	}
}

/// An MX record, naming a host which accepts mail for [`Self::name`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MX {
	/// The mail domain.
	pub name: Name,
	/// The preference of this exchanger, lower values being preferred.
	pub preference: u16,
	/// The host name of the mail exchanger.
	pub exchange: Name,
}
impl StaticRecord for MX {
	const TYPE: u16 = types::MX;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], wire_packet: &[u8]) -> Result<Self, ()> {
		let preference = read_u16(&mut data)?;
		let exchange = read_wire_packet_name(&mut data, wire_packet)?;
		Ok(MX { name, preference, exchange })
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.preference.to_be_bytes());
		write_name(out, &self.exchange);
	}
}

/// A DNSKEY record: one of the public keys a zone signs its records with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DnsKey {
	/// The zone this key belongs to.
	pub name: Name,
	/// Key flags. Bit 7 (`0x0100`) marks a zone key, bit 15 (`0x0001`) a key-signing key.
	pub flags: u16,
	/// Always `3` for DNSSEC keys.
	pub protocol: u8,
	/// The signature algorithm this key is used with.
	pub alg: u8,
	/// The public key, in the algorithm's DNSSEC encoding.
	#[serde(serialize_with = "serialize_base64")]
	pub pubkey: Vec<u8>,
}
impl StaticRecord for DnsKey {
	const TYPE: u16 = types::DNSKEY;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], _wire_packet: &[u8]) -> Result<Self, ()> {
		let flags = read_u16(&mut data)?;
		let protocol = read_u8(&mut data)?;
		let alg = read_u8(&mut data)?;
		Ok(DnsKey { name, flags, protocol, alg, pubkey: data.to_vec() })
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.flags.to_be_bytes());
		out.push(self.protocol);
		out.push(self.alg);
		out.extend_from_slice(&self.pubkey);
	}
}
impl DnsKey {
	/// The RFC 4034 Appendix B key tag, which [`DS`] and [`RRSig`] records use to refer to this
	/// key. Tags are not unique.
	pub fn key_tag(&self) -> u16 {
		let mut rdata = Vec::with_capacity(4 + self.pubkey.len());
		self.write_data(&mut rdata);
		let mut sum = rdata.chunks(2)
			.map(|pair| (u32::from(pair[0]) << 8) | u32::from(pair.get(1).copied().unwrap_or(0)))
			.fold(0u32, u32::wrapping_add);
		sum += (sum >> 16) & 0xffff;
		(sum & 0xffff) as u16
	}
}

/// A DS record, published by a parent zone to vouch for one of its child's [`DnsKey`]s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DS {
	/// The child zone, i.e. the [`DnsKey::name`] of the key this refers to.
	pub name: Name,
	/// The [`DnsKey::key_tag`] of the key this refers to.
	pub key_tag: u16,
	/// The [`DnsKey::alg`] of the key this refers to.
	pub alg: u8,
	/// How [`Self::digest`] was computed: 1 for SHA-1, 2 for SHA-256, 4 for SHA-384.
	pub digest_type: u8,
	/// The digest of the key's owner name and RDATA.
	#[serde(serialize_with = "serialize_upper_hex")]
	pub digest: Vec<u8>,
}
impl StaticRecord for DS {
	const TYPE: u16 = types::DS;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], _wire_packet: &[u8]) -> Result<Self, ()> {
		let key_tag = read_u16(&mut data)?;
		let alg = read_u8(&mut data)?;
		let digest_type = read_u8(&mut data)?;
		Ok(DS { name, key_tag, alg, digest_type, digest: data.to_vec() })
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		out.extend_from_slice(&self.key_tag.to_be_bytes());
		out.push(self.alg);
		out.push(self.digest_type);
		out.extend_from_slice(&self.digest);
	}
}

/// An RRSIG record: a signature over every record of type [`Self::ty`] at [`Self::name`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RRSig {
	/// The owner name of the signed records (or the name a wildcard was expanded to).
	pub name: Name,
	/// The type of the signed records.
	pub ty: u16,
	/// The signature algorithm, matching the signing key's [`DnsKey::alg`].
	pub alg: u8,
	/// The number of labels in the owner name of the signed records, not counting the root label
	/// or a leading wildcard label.
	pub labels: u8,
	/// The TTL the signed records were published with.
	pub orig_ttl: u32,
	/// When the signature stops being valid, as a UNIX time modulo 2^32.
	pub expiration: u32,
	/// When the signature starts being valid, as a UNIX time modulo 2^32.
	pub inception: u32,
	/// The [`DnsKey::key_tag`] of the signing key.
	pub key_tag: u16,
	/// The zone of the signing key. Must be the owner name or one of its ancestors.
	pub key_name: Name,
	/// The signature bytes.
	#[serde(serialize_with = "serialize_base64")]
	pub signature: Vec<u8>,
}
impl StaticRecord for RRSig {
	const TYPE: u16 = types::RRSIG;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, mut data: &[u8], wire_packet: &[u8]) -> Result<Self, ()> {
		let ty = read_u16(&mut data)?;
		let alg = read_u8(&mut data)?;
		let labels = read_u8(&mut data)?;
		let orig_ttl = read_u32(&mut data)?;
		let expiration = read_u32(&mut data)?;
		let inception = read_u32(&mut data)?;
		let key_tag = read_u16(&mut data)?;
		let key_name = read_wire_packet_name(&mut data, wire_packet)?;
		Ok(RRSig {
			name, ty, alg, labels, orig_ttl, expiration, inception, key_tag, key_name,
			signature: data.to_vec(),
		})
	}
	fn write_data(&self, out: &mut Vec<u8>) {
		self.write_signed_fields(out);
		out.extend_from_slice(&self.signature);
	}
}
impl RRSig {
	/// Writes every RDATA field but the signature itself, which is the prefix of the data the
	/// signature covers.
	pub(crate) fn write_signed_fields<W: Writer>(&self, out: &mut W) {
		out.write(&self.ty.to_be_bytes());
		out.write(&[self.alg, self.labels]);
		out.write(&self.orig_ttl.to_be_bytes());
		out.write(&self.expiration.to_be_bytes());
		out.write(&self.inception.to_be_bytes());
		out.write(&self.key_tag.to_be_bytes());
		write_name(out, &self.key_name);
	}
}

/// An A record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct A {
	/// The owner name.
	pub name: Name,
	/// The address, in network order.
	pub address: [u8; 4],
}
impl StaticRecord for A {
	const TYPE: u16 = types::A;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, data: &[u8], _wire_packet: &[u8]) -> Result<Self, ()> {
		let address = data.try_into().map_err(|_| ())?;
		Ok(A { name, address })
	}
	fn write_data(&self, out: &mut Vec<u8>) { out.extend_from_slice(&self.address); }
}

/// An AAAA record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AAAA {
	/// The owner name.
	pub name: Name,
	/// The address, in network order.
	pub address: [u8; 16],
}
impl StaticRecord for AAAA {
	const TYPE: u16 = types::AAAA;
	fn name(&self) -> &Name { &self.name }
	fn read_from_data(name: Name, data: &[u8], _wire_packet: &[u8]) -> Result<Self, ()> {
		let address = data.try_into().map_err(|_| ())?;
		Ok(AAAA { name, address })
	}
	fn write_data(&self, out: &mut Vec<u8>) { out.extend_from_slice(&self.address); }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn name_validation() {
		assert!(Name::try_from("example.com.").is_ok());
		assert!(Name::try_from(".").is_ok());
		assert!(Name::try_from("example.com").is_err());
		assert!(Name::try_from("").is_err());
		assert!(Name::try_from("a..b.").is_err());
		assert!(Name::try_from("exa mple.com.").is_err());
		let long_label = "a".repeat(64) + ".com.";
		assert!(Name::try_from(long_label).is_err());

		assert_eq!(Name::from_domain("example.com").unwrap().as_str(), "example.com.");
		assert_eq!(Name::from_domain("example.com.").unwrap().as_str(), "example.com.");
		assert_eq!(Name::from_domain("").unwrap_err(), ());
		assert!(Name::from_domain("  ").is_err());
		assert!(Name::from_domain(".").unwrap().is_root());
	}

	#[test]
	fn label_counts() {
		assert_eq!(Name::root().label_count(), 0);
		assert_eq!(Name::try_from("com.").unwrap().label_count(), 1);
		assert_eq!(Name::try_from("mail.example.com.").unwrap().label_count(), 3);
	}

	#[test]
	fn txt_data_round_trips_long_strings() {
		let txt = Txt { name: "example.com.".try_into().unwrap(), data: vec![b'a'; 300] };
		let mut out = Vec::new();
		Record::write_u16_len_prefixed_data(&txt, &mut out);
		let len = u16::from_be_bytes([out[0], out[1]]) as usize;
		assert_eq!(len, out.len() - 2);
		// Two character-strings: 255 bytes then 45 bytes
		assert_eq!(out[2], 255);
		assert_eq!(out[2 + 1 + 255], 45);
		let parsed = Txt::read_from_data(txt.name.clone(), &out[2..], &[]).unwrap();
		assert_eq!(parsed, txt);
	}

	#[test]
	fn empty_txt_rdata() {
		let parsed = Txt::read_from_data("example.com.".try_into().unwrap(), &[], &[]).unwrap();
		assert!(parsed.data.is_empty());
		let mut out = Vec::new();
		Record::write_u16_len_prefixed_data(&parsed, &mut out);
		assert_eq!(out, vec![0, 1, 0]);

		let mut exact = Vec::new();
		let txt = Txt { name: "example.com.".try_into().unwrap(), data: vec![b'a'; 255] };
		Record::write_u16_len_prefixed_data(&txt, &mut exact);
		assert_eq!(exact.len(), 2 + 1 + 255);
	}

	#[test]
	fn address_rdata_length() {
		let name: Name = "example.com.".try_into().unwrap();
		assert!(A::read_from_data(name.clone(), &[192, 0, 2], &[]).is_err());
		assert_eq!(A::read_from_data(name.clone(), &[192, 0, 2, 1], &[]).unwrap().address, [192, 0, 2, 1]);
		assert!(AAAA::read_from_data(name, &[0; 4], &[]).is_err());
	}

	#[test]
	fn rr_enum_matches_inner_encoding() {
		let mx = MX {
			name: "example.com.".try_into().unwrap(), preference: 10,
			exchange: "mail.example.com.".try_into().unwrap(),
		};
		let (mut inner, mut outer) = (Vec::new(), Vec::new());
		Record::write_u16_len_prefixed_data(&mx, &mut inner);
		Record::write_u16_len_prefixed_data(&RR::from(mx.clone()), &mut outer);
		assert_eq!(inner, outer);
		assert_eq!(inner, b"\x00\x14\x00\x0a\x04mail\x07example\x03com\x00".to_vec());
		assert_eq!(RR::from(mx).ty(), MX::TYPE);
	}

	#[test]
	fn root_key_tag() {
		let key = DnsKey {
			name: Name::root(), flags: 257, protocol: 3, alg: 8,
			pubkey: base64::Engine::decode(&base64::engine::general_purpose::STANDARD, "AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3+/4RgWOq7HrxRixHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kvArMtNROxVQuCaSnIDdD5LKyWbRd2n9WGe2R8PzgCmr3EgVLrjyBxWezF0jLHwVN8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sqqls3eNbuv7pr+eoZG+SrDK6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfdRUfhHdY6+cn8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwNR1AkUTV74bU=").unwrap(),
		};
		assert_eq!(key.key_tag(), 20326);
	}
}
