//! Cryptographic checks on DNSSEC records: RRSIG verification (RFC 4034 §3.1.8.1), signature
//! validity windows (RFC 4034 §3.1.5) and DS digests (RFC 4034 §5.1.4, RFC 4509).

use ring::signature;

use crate::rr::*;
use crate::ser::write_name;

/// The IANA root zone trust anchors (KSK-2017 and KSK-2024), as DS records.
///
/// Published at <https://data.iana.org/root-anchors/root-anchors.xml>
pub fn root_hints() -> Vec<DS> {
	vec![DS {
		name: Name::root(), key_tag: 19036, alg: 8, digest_type: 2,
		digest: hex_lit::hex!("49AAC11D7B6F6446702E54A1607371607A1A41855200FD2CE1CDDE32F24E8FB5").to_vec(),
	}, DS {
		name: Name::root(), key_tag: 20326, alg: 8, digest_type: 2,
		digest: hex_lit::hex!("E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D").to_vec(),
	}]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a signature or DS check failed.
pub enum ValidationError {
	/// An algorithm (signature or digest) was not supported.
	UnsupportedAlgorithm,
	/// The data was malformed or no signature or digest matched.
	Invalid,
	/// The signature validated but the given time is outside its inception/expiration window.
	OutsideValidityPeriod,
}

/// Splits an RFC 3110 RSA public key into its modulus and exponent.
pub(crate) fn bytes_to_rsa_pk(pubkey: &[u8]) -> Result<signature::RsaPublicKeyComponents<&[u8]>, ()> {
	// A zero first byte means the exponent length follows as a u16
	let (exponent_len, rest) = match pubkey {
		[0, hi, lo, rest @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, rest),
		[len, rest @ ..] => (*len as usize, rest),
		[] => return Err(()),
	};
	if exponent_len == 0 || rest.len() <= exponent_len { return Err(()); }
	let (e, n) = rest.split_at(exponent_len);
	Ok(signature::RsaPublicKeyComponents { n, e })
}

/// Returns true if `a` is at or before `b` in RFC 1982 serial number arithmetic.
fn serial_le(a: u32, b: u32) -> bool {
	b.wrapping_sub(a) < 1 << 31
}

/// Checks that `now` (a UNIX timestamp) lies within `[sig.inception, sig.expiration]`.
///
/// Both fields are 32-bit timestamps which wrap every 136 years, so they're compared using serial
/// number arithmetic against `now` modulo 2^32.
pub fn is_within_validity_period(sig: &RRSig, now: u64) -> bool {
	let now = now as u32;
	serial_le(sig.inception, now) && serial_le(now, sig.expiration)
}

/// The owner name a signature covers `name` under: `name` itself, or `*.` followed by the
/// closest encloser if the record was expanded from a wildcard.
fn signed_owner(name: &Name, labels: u8) -> Result<(bool, &str), ValidationError> {
	let labels = usize::from(labels);
	let count = name.label_count();
	if count == labels { return Ok((false, name.as_str())); }
	if count < labels { return Err(ValidationError::Invalid); }
	let encloser = name.as_str().splitn(count - labels + 1, '.').last().ok_or(ValidationError::Invalid)?;
	Ok((true, encloser))
}

pub(crate) fn write_signed_data<RR: Record>(sig: &RRSig, records: &[&RR]) -> Result<Vec<u8>, ValidationError> {
	let mut signed_data = Vec::with_capacity(2048);
	sig.write_signed_fields(&mut signed_data);

	// Canonical order compares RDATA without its length prefix. Duplicates are only signed once.
	let mut canonical = Vec::with_capacity(records.len());
	for record in records {
		let mut rdata = Vec::new();
		record.write_u16_len_prefixed_data(&mut rdata);
		canonical.push((rdata, *record));
	}
	canonical.sort_unstable_by(|(a, _), (b, _)| a[2..].cmp(&b[2..]));
	canonical.dedup_by(|(a, _), (b, _)| a == b);

	for (rdata, record) in canonical {
		match signed_owner(record.name(), sig.labels)? {
			(true, encloser) => {
				signed_data.extend_from_slice(b"\x01*");
				write_name(&mut signed_data, encloser);
			},
			(false, owner) => write_name(&mut signed_data, owner),
		}
		signed_data.extend_from_slice(&record.ty().to_be_bytes());
		signed_data.extend_from_slice(&1u16.to_be_bytes());
		signed_data.extend_from_slice(&sig.orig_ttl.to_be_bytes());
		signed_data.extend_from_slice(&rdata);
	}
	Ok(signed_data)
}

fn verify_with_key(sig: &RRSig, dnskey: &DnsKey, signed_data: &[u8]) -> Result<(), ValidationError> {
	match sig.alg {
		8|10 => {
			let alg = if sig.alg == 8 {
				&signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY
			} else {
				&signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY
			};
			bytes_to_rsa_pk(&dnskey.pubkey).map_err(|_| ValidationError::Invalid)?
				.verify(alg, signed_data, &sig.signature)
				.map_err(|_| ValidationError::Invalid)
		},
		13|14 => {
			let alg = if sig.alg == 13 {
				&signature::ECDSA_P256_SHA256_FIXED
			} else {
				&signature::ECDSA_P384_SHA384_FIXED
			};

			// ring wants an uncompressed SEC1 point
			let mut key = Vec::with_capacity(dnskey.pubkey.len() + 1);
			key.push(0x4);
			key.extend_from_slice(&dnskey.pubkey);

			signature::UnparsedPublicKey::new(alg, &key)
				.verify(signed_data, &sig.signature)
				.map_err(|_| ValidationError::Invalid)
		},
		15 => {
			signature::UnparsedPublicKey::new(&signature::ED25519, &dnskey.pubkey)
				.verify(signed_data, &sig.signature)
				.map_err(|_| ValidationError::Invalid)
		},
		_ => Err(ValidationError::UnsupportedAlgorithm),
	}
}

/// Verifies that `sig` is a valid signature over `records` by one of `dnskeys`, at UNIX time
/// `now`.
///
/// Every record must be of the type `sig` covers. Keys are matched on key tag and algorithm and
/// must be DNSSEC zone keys. If the signature verifies but `now` is outside its validity window,
/// [`ValidationError::OutsideValidityPeriod`] is returned.
pub fn verify_rrsig<'a, RR: Record, Keys>(sig: &RRSig, dnskeys: Keys, records: &[&RR], now: u64)
-> Result<(), ValidationError>
where Keys: IntoIterator<Item = &'a DnsKey> {
	if records.is_empty() { return Err(ValidationError::Invalid); }
	for record in records.iter() {
		if sig.ty != record.ty() { return Err(ValidationError::Invalid); }
	}
	let mut found_unsupported_alg = false;
	for dnskey in dnskeys.into_iter() {
		if dnskey.key_tag() != sig.key_tag { continue; }
		// Non-DNSSEC key
		if dnskey.protocol != 3 { continue; }
		// Not a zone key
		if dnskey.flags & 0b1_0000_0000 == 0 { continue; }
		if dnskey.alg != sig.alg { continue; }

		let signed_data = write_signed_data(sig, records)?;
		match verify_with_key(sig, dnskey, &signed_data) {
			Ok(()) => {
				if !is_within_validity_period(sig, now) {
					return Err(ValidationError::OutsideValidityPeriod);
				}
				return Ok(());
			},
			Err(ValidationError::UnsupportedAlgorithm) => found_unsupported_alg = true,
			// Key tags can collide, so try any other matching key
			Err(_) => {},
		}
	}
	if found_unsupported_alg {
		Err(ValidationError::UnsupportedAlgorithm)
	} else {
		Err(ValidationError::Invalid)
	}
}

/// Checks the DS records for a zone against that zone's DNSKEY set, returning the keys which
/// matched a DS digest.
///
/// SHA-1 digests are only trusted if no SHA-256 or SHA-384 DS records are present. If none of the
/// DS records use a known digest type, [`ValidationError::UnsupportedAlgorithm`] is returned.
pub fn verify_ds<'a, 'b, Keys, Dses>(dnskeys: Keys, dses: Dses)
-> Result<Vec<&'a DnsKey>, ValidationError>
where Keys: IntoIterator<Item = &'a DnsKey>, Dses: IntoIterator<Item = &'b DS> {
	let dses: Vec<&DS> = dses.into_iter().collect();
	if dses.is_empty() { return Err(ValidationError::Invalid); }
	if !dses.iter().any(|ds| ds.digest_type == 1 || ds.digest_type == 2 || ds.digest_type == 4) {
		return Err(ValidationError::UnsupportedAlgorithm);
	}

	// SHA-1 only counts when it's all the parent published
	let sha1_only = dses.iter().all(|ds| ds.digest_type != 2 && ds.digest_type != 4);
	let digest_alg = |ty: u8| match ty {
		1 if sha1_only => Some(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY),
		2 => Some(&ring::digest::SHA256),
		4 => Some(&ring::digest::SHA384),
		_ => None,
	};
	let mut validated_dnskeys = Vec::new();
	for dnskey in dnskeys {
		let key_tag = dnskey.key_tag();
		let mut owner_and_rdata = Vec::new();
		write_name(&mut owner_and_rdata, &dnskey.name);
		dnskey.write_data(&mut owner_and_rdata);
		let matched = dses.iter()
			.filter(|ds| ds.alg == dnskey.alg && ds.key_tag == key_tag)
			.filter_map(|ds| digest_alg(ds.digest_type).map(|alg| (ds, alg)))
			.any(|(ds, alg)| ring::digest::digest(alg, &owner_and_rdata).as_ref() == &ds.digest[..]);
		if matched { validated_dnskeys.push(dnskey); }
	}
	if validated_dnskeys.is_empty() {
		Err(ValidationError::Invalid)
	} else {
		Ok(validated_dnskeys)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use super::fixtures::*;

	use rand::seq::SliceRandom;

	#[test]
	fn check_txt_record_a() {
		let dnskeys = mattcorallo_dnskey().dnskeys;
		let (txt, txt_rrsig) = mattcorallo_txt_record();
		verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], VALID_AT).unwrap();
	}

	#[test]
	fn check_txt_record_b() {
		let dnskeys = bitcoin_ninja_dnskey().dnskeys;
		let (txt, txt_rrsig) = bitcoin_ninja_txt_record();
		verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], VALID_AT).unwrap();
	}

	#[test]
	fn check_cname_record() {
		let dnskeys = bitcoin_ninja_dnskey().dnskeys;
		let (cname, cname_rrsig) = bitcoin_ninja_cname_record();
		verify_rrsig(&cname_rrsig, &dnskeys, &[&cname], VALID_AT).unwrap();
	}

	#[test]
	fn check_wildcard_record() {
		let dnskeys = bitcoin_ninja_dnskey().dnskeys;
		let (txt, txt_rrsig) = bitcoin_ninja_wildcard_record();
		verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], VALID_AT).unwrap();

		let (cname, cname_rrsig, txt, txt_rrsig) = bitcoin_ninja_cname_wildcard_record();
		verify_rrsig(&cname_rrsig, &dnskeys, &[&cname], VALID_AT).unwrap();
		verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], VALID_AT).unwrap();
	}

	#[test]
	fn check_txt_sort_order() {
		let dnskeys = bitcoin_ninja_dnskey().dnskeys;
		let (txts, rrsig) = bitcoin_ninja_txt_sort_edge_cases_records();
		let mut records = txts.iter().collect::<Vec<_>>();
		records.shuffle(&mut rand::rngs::OsRng);
		verify_rrsig(&rrsig, &dnskeys, &records, VALID_AT).unwrap();

		// Duplicates are dropped before signing
		records.push(&txts[0]);
		verify_rrsig(&rrsig, &dnskeys, &records, VALID_AT).unwrap();
	}

	#[test]
	fn enum_records_verify() {
		let dnskeys = mattcorallo_dnskey().dnskeys;
		let (txt, txt_rrsig) = mattcorallo_txt_record();
		let rr = RR::Txt(txt);
		verify_rrsig(&txt_rrsig, &dnskeys, &[&rr], VALID_AT).unwrap();
	}

	#[test]
	fn signature_outside_window() {
		let dnskeys = mattcorallo_dnskey().dnskeys;
		let (txt, txt_rrsig) = mattcorallo_txt_record();
		assert_eq!(verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], 1708700000),
			Err(ValidationError::OutsideValidityPeriod));
		assert_eq!(verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], 1707400000),
			Err(ValidationError::OutsideValidityPeriod));
	}

	#[test]
	fn tampered_records_fail() {
		let dnskeys = mattcorallo_dnskey().dnskeys;
		let (mut txt, txt_rrsig) = mattcorallo_txt_record();
		txt.data.push(b'!');
		assert_eq!(verify_rrsig(&txt_rrsig, &dnskeys, &[&txt], VALID_AT), Err(ValidationError::Invalid));

		// Keys from another zone never match
		let (txt, _) = mattcorallo_txt_record();
		let other_keys = bitcoin_ninja_dnskey().dnskeys;
		assert_eq!(verify_rrsig(&txt_rrsig, &other_keys, &[&txt], VALID_AT), Err(ValidationError::Invalid));

		// Nor do records of the wrong type
		let (cname, _) = bitcoin_ninja_cname_record();
		assert_eq!(verify_rrsig(&txt_rrsig, &dnskeys, &[&cname], VALID_AT), Err(ValidationError::Invalid));

		let no_records: [&Txt; 0] = [];
		assert_eq!(verify_rrsig(&txt_rrsig, &dnskeys, &no_records, VALID_AT), Err(ValidationError::Invalid));
	}

	#[test]
	fn unknown_signature_algorithm() {
		let key = DnsKey {
			name: "example.com.".try_into().unwrap(), flags: 256, protocol: 3, alg: 253,
			pubkey: vec![1, 2, 3, 4],
		};
		let txt = Txt { name: "example.com.".try_into().unwrap(), data: b"hi".to_vec() };
		let sig = RRSig {
			name: "example.com.".try_into().unwrap(), ty: Txt::TYPE, alg: 253, labels: 2,
			orig_ttl: 300, expiration: 1708000000, inception: 1707000000, key_tag: key.key_tag(),
			key_name: "example.com.".try_into().unwrap(), signature: vec![0; 64],
		};
		assert_eq!(verify_rrsig(&sig, [&key], &[&txt], VALID_AT), Err(ValidationError::UnsupportedAlgorithm));
	}

	#[test]
	fn serial_number_windows() {
		let (_, mut sig) = mattcorallo_txt_record();
		sig.inception = u32::MAX - 10;
		sig.expiration = 100;
		assert!(is_within_validity_period(&sig, (1 << 32) + 50));
		assert!(is_within_validity_period(&sig, u32::MAX as u64));
		assert!(!is_within_validity_period(&sig, (1 << 32) + 101));
		assert!(!is_within_validity_period(&sig, u32::MAX as u64 - 11));
	}

	#[test]
	fn ds_matches_ksk() {
		let com = com_dnskey();
		let validated = verify_ds(&com.dnskeys, &com.ds).unwrap();
		assert_eq!(validated.len(), 1);
		assert_eq!(validated[0].flags, 257);
		assert_eq!(validated[0].key_tag(), 19718);
	}

	#[test]
	fn ds_mismatch() {
		let com = com_dnskey();
		let mut ds = com.ds.clone();
		ds[0].digest[0] ^= 1;
		assert_eq!(verify_ds(&com.dnskeys, &ds), Err(ValidationError::Invalid));

		// A DS for some other zone's key
		let ninja = ninja_dnskey();
		assert_eq!(verify_ds(&com.dnskeys, &ninja.ds), Err(ValidationError::Invalid));
		assert_eq!(verify_ds(&com.dnskeys, &Vec::<DS>::new()), Err(ValidationError::Invalid));
	}

	#[test]
	fn ds_unknown_digest_type() {
		let com = com_dnskey();
		let mut ds = com.ds.clone();
		ds[0].digest_type = 3;
		assert_eq!(verify_ds(&com.dnskeys, &ds), Err(ValidationError::UnsupportedAlgorithm));
	}

	#[test]
	fn sha1_ds_only_trusted_alone() {
		let com = com_dnskey();
		let ksk = com.dnskeys.iter().find(|k| k.flags == 257).unwrap();
		let mut ctx = ring::digest::Context::new(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY);
		write_name(&mut ctx, &ksk.name);
		ctx.update(&ksk.flags.to_be_bytes());
		ctx.update(&ksk.protocol.to_be_bytes());
		ctx.update(&ksk.alg.to_be_bytes());
		ctx.update(&ksk.pubkey);
		let sha1_ds = DS {
			name: "com.".try_into().unwrap(), key_tag: ksk.key_tag(), alg: ksk.alg, digest_type: 1,
			digest: ctx.finish().as_ref().to_vec(),
		};
		assert!(verify_ds(&com.dnskeys, [&sha1_ds]).is_ok());

		let mut bad_sha256 = com.ds[0].clone();
		bad_sha256.digest[0] ^= 1;
		assert_eq!(verify_ds(&com.dnskeys, [&sha1_ds, &bad_sha256]), Err(ValidationError::Invalid));
	}

	#[test]
	fn root_anchor() {
		let root = root_dnskey();
		let anchored = verify_ds(&root.dnskeys, &root_hints()).unwrap();
		assert_eq!(anchored.iter().map(|key| key.key_tag()).collect::<Vec<_>>(), vec![20326]);
		assert_eq!(verify_ds(&com_dnskey().dnskeys, &root_hints()), Err(ValidationError::Invalid));
	}
}
