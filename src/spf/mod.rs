//! Sender Policy Framework (RFC 7208) record evaluation.
//!
//! [`check_host`] fetches a domain's SPF record, walks every `include` and `redirect` it
//! references under the RFC's budget of ten DNS-consuming terms, and flattens the result into a
//! [`CombinedSpfRecord`]: the full tree of lookups plus the union of every address the policy
//! authorizes and every error met along the way.
//!
//! Evaluation never fails. Problems are recorded as [`SpfError`] codes on the lookup where they
//! happened, so a partially broken policy still yields every address that could be resolved.
//!
//! [`CombinedSpfRecord::validate_policy`] then checks observed mail-server addresses against the
//! authorized set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

mod eval;
mod parse;
mod policy;

pub use eval::{check_host, EvaluationState, MAX_LOOKUPS};
pub use parse::{parse, Directive, Mechanism, Modifier, Term};
pub use policy::PrefixTree;

/// The outcome a matching term assigns to a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Qualifier {
	/// `+`, or no qualifier at all.
	Pass,
	/// `-`
	Fail,
	/// `~`
	Softfail,
	/// `?`
	Neutral,
}

impl Qualifier {
	/// Maps a qualifier character to its outcome. Anything but `-`, `~` or `?` is a pass.
	pub fn from_char(c: Option<char>) -> Qualifier {
		match c {
			Some('-') => Qualifier::Fail,
			Some('~') => Qualifier::Softfail,
			Some('?') => Qualifier::Neutral,
			_ => Qualifier::Pass,
		}
	}

	/// The upper-case name this outcome is reported under.
	pub fn as_str(&self) -> &'static str {
		match self {
			Qualifier::Pass => "PASS",
			Qualifier::Fail => "FAIL",
			Qualifier::Softfail => "SOFTFAIL",
			Qualifier::Neutral => "NEUTRAL",
		}
	}
}

impl fmt::Display for Qualifier {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str(self.as_str()) }
}

/// An error code recorded against an SPF lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SpfError {
	/// The domain publishes no SPF record.
	#[serde(rename = "NONE")]
	NoRecord,
	/// A DNS lookup failed in a way which may succeed later.
	#[serde(rename = "TEMPERROR")]
	TempError,
	/// The policy is broken: several records, or an unsupported term.
	#[serde(rename = "PERMERROR")]
	PermError,
	/// The policy needs more than [`MAX_LOOKUPS`] DNS-consuming terms.
	#[serde(rename = "PERMERROR_LookupCount")]
	LookupCount,
}

impl SpfError {
	/// The code this error is reported under.
	pub fn as_str(&self) -> &'static str {
		match self {
			SpfError::NoRecord => "NONE",
			SpfError::TempError => "TEMPERROR",
			SpfError::PermError => "PERMERROR",
			SpfError::LookupCount => "PERMERROR_LookupCount",
		}
	}
}

impl fmt::Display for SpfError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str(self.as_str()) }
}

/// How a nested [`SpfResult`] was reached from its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RecursionType {
	/// The top-level record.
	#[default]
	#[serde(rename = "")]
	Root,
	/// Reached through an `include` mechanism.
	#[serde(rename = "include")]
	Include,
	/// Reached through a `redirect` modifier.
	#[serde(rename = "redirect")]
	Redirect,
}

/// Writes an unset code as the empty string.
fn serialize_code<S: Serializer, T: Serialize>(code: &Option<T>, s: S) -> Result<S::Ok, S::Error> {
	match code {
		Some(code) => code.serialize(s),
		None => s.serialize_str(""),
	}
}

/// A single non-recursive term: an address mechanism, `exists`, `ptr`, or a term skipped for
/// exceeding the lookup budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleLookup {
	/// The term's mechanism.
	#[serde(rename = "lookupType")]
	pub mechanism: Mechanism,
	/// The domain looked up, or the term's literal parameter.
	pub parameter: String,
	/// The addresses the term authorizes, as CIDR strings.
	pub ips: Vec<String>,
	/// The target of a `ptr` term.
	#[serde(rename = "ptr")]
	pub pointer: String,
	/// The term's qualifier.
	#[serde(rename = "lookupQualifier")]
	pub qualifier: Qualifier,
	/// What went wrong evaluating the term, if anything.
	#[serde(rename = "lookupError", serialize_with = "serialize_code")]
	pub error: Option<SpfError>,
}

/// The evaluation of one SPF record, with the records it includes or redirects to nested under
/// [`Self::recursive_lookups`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpfResult {
	/// How this record was reached.
	#[serde(rename = "type")]
	pub recursion: RecursionType,
	/// The record text, lower-cased.
	#[serde(rename = "spfText")]
	pub text: String,
	/// Every address authorized by this record's own simple lookups.
	#[serde(rename = "simpleLookupIPs")]
	pub simple_lookup_ips: Vec<String>,
	/// This record's non-recursive terms, in evaluation order.
	#[serde(rename = "simpleLookups")]
	pub simple_lookups: Vec<SimpleLookup>,
	/// The records reached through `include` and `redirect`, by domain.
	#[serde(rename = "recursiveLookups")]
	pub recursive_lookups: BTreeMap<String, SpfResult>,
	/// The qualifier of the record's `all` term, if one was reached.
	#[serde(rename = "allQualifier", serialize_with = "serialize_code")]
	pub all_qualifier: Option<Qualifier>,
	/// Why the record itself couldn't be fetched, if it couldn't.
	#[serde(rename = "lookupError", serialize_with = "serialize_code")]
	pub error: Option<SpfError>,
}

/// The flattened evaluation of a domain's SPF policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedSpfRecord {
	/// Always `spf1`.
	#[serde(rename = "spfVersion")]
	pub version: String,
	/// Every distinct error recorded anywhere in the tree.
	#[serde(rename = "lookupErrors")]
	pub errors: BTreeSet<SpfError>,
	/// Every distinct address authorized anywhere in the tree, as CIDR strings.
	#[serde(rename = "spfIPs")]
	pub ips: BTreeSet<String>,
	/// The deepest level of `include`/`redirect` nesting reached.
	pub depth: usize,
	/// The evaluation tree.
	#[serde(rename = "spfResult")]
	pub result: SpfResult,
	/// For each observed mail server, whether each of its addresses is authorized. Filled in by
	/// [`Self::validate_policy`].
	#[serde(rename = "spfPolicyCheck")]
	pub policy_check: BTreeMap<String, BTreeMap<String, bool>>,
	/// True if any observed address is authorized.
	#[serde(rename = "permissiveSPFPolicyCheck")]
	pub permissive_enforcement: bool,
	/// True if every observed address is authorized.
	#[serde(rename = "strictSPFPolicyCheck")]
	pub strict_enforcement: bool,
}

impl CombinedSpfRecord {
	pub(crate) fn new(result: SpfResult, ips: BTreeSet<String>, errors: BTreeSet<SpfError>, depth: usize) -> Self {
		CombinedSpfRecord {
			version: "spf1".to_owned(), errors, ips, depth, result,
			policy_check: BTreeMap::new(), permissive_enforcement: false, strict_enforcement: false,
		}
	}
}
