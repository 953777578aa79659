//! Splits SPF record text into terms.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::Qualifier;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([+\-?~])?(all|include|a|mx|ptr|ip4|ip6|exists)(?::(.*)|(/.*))?$").unwrap()
});
static MODIFIER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([a-z0-9\-_.]+)=(.*)$").unwrap()
});

/// An SPF mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Mechanism { All, Include, A, Mx, Ptr, Ip4, Ip6, Exists }

impl Mechanism {
	fn from_name(s: &str) -> Option<Mechanism> {
		Some(match s {
			"all" => Mechanism::All,
			"include" => Mechanism::Include,
			"a" => Mechanism::A,
			"mx" => Mechanism::Mx,
			"ptr" => Mechanism::Ptr,
			"ip4" => Mechanism::Ip4,
			"ip6" => Mechanism::Ip6,
			"exists" => Mechanism::Exists,
			_ => return None,
		})
	}

	/// True for mechanisms which cost a DNS lookup.
	pub fn consumes_lookup(&self) -> bool {
		matches!(self, Mechanism::Include | Mechanism::A | Mechanism::Mx | Mechanism::Ptr | Mechanism::Exists)
	}
}

/// A `[qualifier]mechanism[:parameter]` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
	/// The outcome when the mechanism matches.
	pub qualifier: Qualifier,
	/// The mechanism.
	pub mechanism: Mechanism,
	/// Everything after the mechanism, without the `:` separator. A parameter which starts with
	/// `/` (as in `a/24`) keeps its slash.
	pub parameter: String,
}

impl Directive {
	/// The domain the mechanism looks up: the parameter up to any `/`, or `current` if that is
	/// empty.
	pub fn domain<'a>(&'a self, current: &'a str) -> &'a str {
		match self.parameter.split('/').next() {
			Some(domain) if !domain.is_empty() => domain,
			_ => current,
		}
	}

	/// The IPv4 and IPv6 prefix lengths given after the domain, as in `a:example.com/24//64`.
	///
	/// Missing or unparsable lengths are `None`.
	pub fn cidr_lengths(&self) -> (Option<u8>, Option<u8>) {
		let cidr = match self.parameter.find('/') {
			Some(idx) => &self.parameter[idx..],
			None => return (None, None),
		};
		let (v4, v6) = match cidr.find("//") {
			Some(idx) => (&cidr[..idx], Some(&cidr[idx + 2..])),
			None => (cidr, None),
		};
		let v4 = v4.strip_prefix('/').and_then(|len| len.parse().ok()).filter(|len| *len <= 32);
		let v6 = v6.and_then(|len| len.parse().ok()).filter(|len| *len <= 128);
		(v4, v6)
	}
}

/// A `name=value` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
	/// The modifier name, e.g. `redirect`.
	pub name: String,
	/// Everything after the `=`.
	pub value: String,
}

/// One term of an SPF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
	/// A mechanism with its qualifier.
	Directive(Directive),
	/// A `name=value` modifier.
	Modifier(Modifier),
}

/// Parses the text of an SPF record into its terms, in record order.
///
/// The record is lower-cased and a leading `v=spf1` is stripped. Tokens which are neither a
/// directive nor a modifier are dropped, so parsing never fails.
pub fn parse(record: &str) -> Vec<Term> {
	let record = record.to_ascii_lowercase();
	let record = record.strip_prefix("v=spf1").unwrap_or(&record);

	let mut terms = Vec::new();
	for token in record.split_whitespace() {
		if let Some(caps) = DIRECTIVE.captures(token) {
			let mechanism = match Mechanism::from_name(&caps[2]) {
				Some(mechanism) => mechanism,
				None => continue,
			};
			let parameter = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
			terms.push(Term::Directive(Directive {
				qualifier: Qualifier::from_char(caps.get(1).and_then(|q| q.as_str().chars().next())),
				mechanism,
				parameter: parameter.to_owned(),
			}));
		} else if let Some(caps) = MODIFIER.captures(token) {
			terms.push(Term::Modifier(Modifier { name: caps[1].to_owned(), value: caps[2].to_owned() }));
		}
	}
	terms
}

#[cfg(test)]
mod tests {
	use super::*;

	fn directive(qualifier: Qualifier, mechanism: Mechanism, parameter: &str) -> Term {
		Term::Directive(Directive { qualifier, mechanism, parameter: parameter.to_owned() })
	}

	#[test]
	fn parses_directives_and_modifiers() {
		let terms = parse("v=spf1 ip4:192.0.2.0/24 ~include:_spf.example.net ?mx a/24 redirect=other.example -all");
		assert_eq!(terms, vec![
			directive(Qualifier::Pass, Mechanism::Ip4, "192.0.2.0/24"),
			directive(Qualifier::Softfail, Mechanism::Include, "_spf.example.net"),
			directive(Qualifier::Neutral, Mechanism::Mx, ""),
			directive(Qualifier::Pass, Mechanism::A, "/24"),
			Term::Modifier(Modifier { name: "redirect".to_owned(), value: "other.example".to_owned() }),
			directive(Qualifier::Fail, Mechanism::All, ""),
		]);
	}

	#[test]
	fn drops_malformed_tokens() {
		let terms = parse("v=spf1 +bogus ip4 aaa: ~all");
		assert_eq!(terms, vec![
			directive(Qualifier::Pass, Mechanism::Ip4, ""),
			directive(Qualifier::Softfail, Mechanism::All, ""),
		]);
		assert!(parse("").is_empty());
		assert!(parse("v=spf1").is_empty());
	}

	#[test]
	fn lowercases_record() {
		let terms = parse("V=SPF1 Include:Example.COM -ALL");
		assert_eq!(terms, vec![
			directive(Qualifier::Pass, Mechanism::Include, "example.com"),
			directive(Qualifier::Fail, Mechanism::All, ""),
		]);
	}

	#[test]
	fn ip6_parameters_keep_colons() {
		let terms = parse("v=spf1 ip6:2001:db8::/32");
		assert_eq!(terms, vec![directive(Qualifier::Pass, Mechanism::Ip6, "2001:db8::/32")]);
	}

	#[test]
	fn directive_domain_and_cidr() {
		let d = Directive { qualifier: Qualifier::Pass, mechanism: Mechanism::A, parameter: "example.com/24//64".to_owned() };
		assert_eq!(d.domain("current.example"), "example.com");
		assert_eq!(d.cidr_lengths(), (Some(24), Some(64)));

		let d = Directive { qualifier: Qualifier::Pass, mechanism: Mechanism::Mx, parameter: "/26".to_owned() };
		assert_eq!(d.domain("current.example"), "current.example");
		assert_eq!(d.cidr_lengths(), (Some(26), None));

		let d = Directive { qualifier: Qualifier::Pass, mechanism: Mechanism::A, parameter: "//48".to_owned() };
		assert_eq!(d.cidr_lengths(), (None, Some(48)));

		let d = Directive { qualifier: Qualifier::Pass, mechanism: Mechanism::A, parameter: "/99".to_owned() };
		assert_eq!(d.cidr_lengths(), (None, None));

		let d = Directive { qualifier: Qualifier::Pass, mechanism: Mechanism::A, parameter: String::new() };
		assert_eq!(d.domain("current.example"), "current.example");
		assert_eq!(d.cidr_lengths(), (None, None));
	}

	#[test]
	fn lookup_consuming_mechanisms() {
		for m in [Mechanism::Include, Mechanism::A, Mechanism::Mx, Mechanism::Ptr, Mechanism::Exists] {
			assert!(m.consumes_lookup());
		}
		for m in [Mechanism::All, Mechanism::Ip4, Mechanism::Ip6] {
			assert!(!m.consumes_lookup());
		}
	}
}
