//! Wire-format reading and writing, plus the serde helpers for binary record fields.

use base64::Engine;
use hex_conservative::DisplayHex;
use serde::Serializer;

use crate::rr::*;

/// The maximum number of compression pointers we'll follow while reading a single name.
const MAX_POINTER_HOPS: usize = 64;

pub(crate) fn read_u8(inp: &mut &[u8]) -> Result<u8, ()> {
	let res = *inp.get(0).ok_or(())?;
	*inp = &inp[1..];
	Ok(res)
}
pub(crate) fn read_u16(inp: &mut &[u8]) -> Result<u16, ()> {
	if inp.len() < 2 { return Err(()); }
	let mut bytes = [0; 2];
	bytes.copy_from_slice(&inp[..2]);
	*inp = &inp[2..];
	Ok(u16::from_be_bytes(bytes))
}
pub(crate) fn read_u32(inp: &mut &[u8]) -> Result<u32, ()> {
	if inp.len() < 4 { return Err(()); }
	let mut bytes = [0; 4];
	bytes.copy_from_slice(&inp[..4]);
	*inp = &inp[4..];
	Ok(u32::from_be_bytes(bytes))
}

/// Reads a name from `inp`, following compression pointers into `wire_packet`.
///
/// `inp` is only advanced past the bytes of the name as they appear at its position, i.e. up to
/// and including the first compression pointer.
pub(crate) fn read_wire_packet_name(inp: &mut &[u8], wire_packet: &[u8]) -> Result<Name, ()> {
	let mut name = String::with_capacity(256);
	let orig: &[u8] = *inp;
	let mut cursor = orig;
	// Bytes of `inp` taken up by the name, known once we hit its end or first pointer
	let mut consumed = None;
	let mut hops = 0;
	loop {
		let len = read_u8(&mut cursor)? as usize;
		if len & 0xc0 == 0xc0 {
			let low = read_u8(&mut cursor)? as usize;
			if consumed.is_none() { consumed = Some(orig.len() - cursor.len()); }
			hops += 1;
			if hops > MAX_POINTER_HOPS { return Err(()); }
			let offset = ((len & 0x3f) << 8) | low;
			cursor = wire_packet.get(offset..).ok_or(())?;
			continue;
		}
		if len & 0xc0 != 0 { return Err(()); }
		if len == 0 {
			if name.is_empty() { name += "."; }
			break;
		}
		if cursor.len() < len { return Err(()); }
		name += core::str::from_utf8(&cursor[..len]).map_err(|_| ())?;
		name += ".";
		cursor = &cursor[len..];
		if name.len() > 255 { return Err(()); }
	}
	let consumed = consumed.unwrap_or(orig.len() - cursor.len());
	*inp = &orig[consumed..];
	name.try_into()
}

pub(crate) trait Writer { fn write(&mut self, buf: &[u8]); }
impl Writer for Vec<u8> { fn write(&mut self, buf: &[u8]) { self.extend_from_slice(buf); } }
impl Writer for ring::digest::Context { fn write(&mut self, buf: &[u8]) { self.update(buf); } }
pub(crate) fn write_name<W: Writer>(out: &mut W, name: &str) {
	let canonical_name = name.to_ascii_lowercase();
	if canonical_name == "." {
		out.write(&[0]);
	} else {
		for label in canonical_name.split(".") {
			out.write(&(label.len() as u8).to_be_bytes());
			out.write(label.as_bytes());
		}
	}
}
/// Runs `write_data`, then prefixes whatever it wrote with its length as a big-endian u16.
pub(crate) fn write_u16_len_prefixed<F: FnOnce(&mut Vec<u8>)>(out: &mut Vec<u8>, write_data: F) {
	let start = out.len();
	out.extend_from_slice(&[0, 0]);
	write_data(out);
	let len = (out.len() - start - 2) as u16;
	out[start..start + 2].copy_from_slice(&len.to_be_bytes());
}

/// Parses a single resource record from `inp`, which points into `wire_packet`.
///
/// Records of types we don't understand (and records outside the INternet class) are consumed
/// and `Ok(None)` is returned.
pub(crate) fn parse_wire_packet_rr(inp: &mut &[u8], wire_packet: &[u8]) -> Result<Option<RR>, ()> {
	let name = read_wire_packet_name(inp, wire_packet)?;
	let ty = read_u16(inp)?;
	let class = read_u16(inp)?;
	let _ttl = read_u32(inp)?;
	let data_len = read_u16(inp)? as usize;
	if inp.len() < data_len { return Err(()); }
	let data = &inp[..data_len];
	*inp = &inp[data_len..];

	if class != 1 { return Ok(None); } // We only support the INternet

	let rr = match ty {
		A::TYPE => RR::A(A::read_from_data(name, data, wire_packet)?),
		AAAA::TYPE => RR::AAAA(AAAA::read_from_data(name, data, wire_packet)?),
		MX::TYPE => RR::MX(MX::read_from_data(name, data, wire_packet)?),
		Txt::TYPE => RR::Txt(Txt::read_from_data(name, data, wire_packet)?),
		CName::TYPE => RR::CName(CName::read_from_data(name, data, wire_packet)?),
		DnsKey::TYPE => RR::DnsKey(DnsKey::read_from_data(name, data, wire_packet)?),
		DS::TYPE => RR::DS(DS::read_from_data(name, data, wire_packet)?),
		RRSig::TYPE => RR::RRSig(RRSig::read_from_data(name, data, wire_packet)?),
		_ => return Ok(None),
	};
	Ok(Some(rr))
}

/// Writes the given resource record in its wire format to the given `Vec`.
///
/// An [`RRSig`] is written with its `orig_ttl` as the record TTL.
pub(crate) fn write_rr<RR: Record>(rr: &RR, ttl: u32, out: &mut Vec<u8>) {
	write_name(out, rr.name());
	out.extend_from_slice(&rr.ty().to_be_bytes());
	out.extend_from_slice(&1u16.to_be_bytes()); // The INternet class
	out.extend_from_slice(&ttl.to_be_bytes());
	rr.write_u16_len_prefixed_data(out);
}

pub(crate) fn serialize_base64<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
	s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

pub(crate) fn serialize_upper_hex<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
	s.serialize_str(&data.to_upper_hex_string())
}

pub(crate) fn serialize_lossy_str<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
	s.serialize_str(&String::from_utf8_lossy(data))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_compressed_names() {
		// A fake message header followed by "example.com." and a pointer back to it
		let mut packet = vec![0; 12];
		packet.extend_from_slice(b"\x07example\x03com\x00");
		packet.extend_from_slice(b"\x04mail\xc0\x0c");
		packet.push(0xff);

		let mut inp = &packet[12..];
		let name = read_wire_packet_name(&mut inp, &packet).unwrap();
		assert_eq!(name.as_str(), "example.com.");
		let name = read_wire_packet_name(&mut inp, &packet).unwrap();
		assert_eq!(name.as_str(), "mail.example.com.");
		assert_eq!(inp, &[0xff]);
	}

	#[test]
	fn name_input_outside_packet() {
		// RDATA copied out of the message, with a pointer back into it
		let packet = b"\x07example\x03com\x00".to_vec();
		let rdata = b"\x03www\xc0\x00\x2a".to_vec();
		let mut inp = &rdata[..];
		let name = read_wire_packet_name(&mut inp, &packet).unwrap();
		assert_eq!(name.as_str(), "www.example.com.");
		assert_eq!(inp, &[0x2a]);
	}

	#[test]
	fn rejects_pointer_loops() {
		let mut packet = vec![0; 12];
		packet.extend_from_slice(b"\xc0\x0c");
		let mut inp = &packet[12..];
		assert!(read_wire_packet_name(&mut inp, &packet).is_err());
	}

	#[test]
	fn rejects_truncated_labels() {
		let packet = b"\x07exam";
		let mut inp = &packet[..];
		assert!(read_wire_packet_name(&mut inp, packet).is_err());
	}

	#[test]
	fn skips_unknown_record_types() {
		let mut packet = Vec::new();
		write_name(&mut packet, "example.com.");
		packet.extend_from_slice(&2u16.to_be_bytes()); // NS
		packet.extend_from_slice(&1u16.to_be_bytes());
		packet.extend_from_slice(&300u32.to_be_bytes());
		packet.extend_from_slice(&3u16.to_be_bytes());
		packet.extend_from_slice(b"\x01a\x00");
		let txt = Txt { name: "example.com.".try_into().unwrap(), data: b"v=spf1 -all".to_vec() };
		write_rr(&txt, 300, &mut packet);

		let mut inp = &packet[..];
		assert_eq!(parse_wire_packet_rr(&mut inp, &packet).unwrap(), None);
		assert_eq!(parse_wire_packet_rr(&mut inp, &packet).unwrap(), Some(RR::Txt(txt)));
		assert!(inp.is_empty());
	}

	#[test]
	fn parses_mx_with_compressed_exchange() {
		let mut packet = vec![0; 12];
		packet.extend_from_slice(b"\x07example\x03com\x00");
		let rr_start = packet.len();
		packet.extend_from_slice(b"\xc0\x0c");
		packet.extend_from_slice(&MX::TYPE.to_be_bytes());
		packet.extend_from_slice(&1u16.to_be_bytes());
		packet.extend_from_slice(&300u32.to_be_bytes());
		packet.extend_from_slice(&9u16.to_be_bytes());
		packet.extend_from_slice(&10u16.to_be_bytes());
		packet.extend_from_slice(b"\x04mail\xc0\x0c");

		let mut inp = &packet[rr_start..];
		let rr = parse_wire_packet_rr(&mut inp, &packet).unwrap().unwrap();
		if let RR::MX(mx) = rr {
			assert_eq!(mx.name.as_str(), "example.com.");
			assert_eq!(mx.preference, 10);
			assert_eq!(mx.exchange.as_str(), "mail.example.com.");
		} else { panic!(); }
	}

	#[test]
	fn ds_digests_serialize_upper_hex() {
		let ds = DS {
			name: "com.".try_into().unwrap(), key_tag: 19718, alg: 13, digest_type: 2,
			digest: vec![0x8a, 0xcb, 0x01],
		};
		let json = serde_json::to_value(&ds).unwrap();
		assert_eq!(json["digest"], "8ACB01");
		assert_eq!(json["name"], "com.");
	}
}
