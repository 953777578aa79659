//! Checks observed mail-server addresses against the networks an SPF policy authorizes.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use ipnet::IpNet;

use super::CombinedSpfRecord;

#[derive(Default)]
struct Node {
	children: [Option<Box<Node>>; 2],
	/// A network ends here.
	terminal: bool,
}

impl Node {
	fn insert(&mut self, bits: u128, width: u32, prefix_len: u8) {
		let mut node = self;
		for i in 0..u32::from(prefix_len) {
			let bit = ((bits >> (width - 1 - i)) & 1) as usize;
			node = &mut **node.children[bit].get_or_insert_with(Box::default);
		}
		node.terminal = true;
	}

	fn covers(&self, bits: u128, width: u32) -> bool {
		let mut node = self;
		for i in 0..width {
			if node.terminal { return true; }
			let bit = ((bits >> (width - 1 - i)) & 1) as usize;
			node = match &node.children[bit] {
				Some(child) => &**child,
				None => return false,
			};
		}
		node.terminal
	}
}

/// A binary prefix trie over IPv4 and IPv6 networks.
#[derive(Default)]
pub struct PrefixTree {
	v4: Node,
	v6: Node,
}

impl PrefixTree {
	/// An empty tree, covering nothing.
	pub fn new() -> Self { Self::default() }

	/// Adds `net` to the tree.
	pub fn insert(&mut self, net: IpNet) {
		match net {
			IpNet::V4(net) => self.v4.insert(u32::from(net.addr()).into(), 32, net.prefix_len()),
			IpNet::V6(net) => self.v6.insert(u128::from(net.addr()), 128, net.prefix_len()),
		}
	}

	/// Builds a tree from CIDR strings, skipping any which don't parse. A bare address is taken as
	/// a single-host network.
	pub fn from_cidrs<'a, I: IntoIterator<Item = &'a str>>(cidrs: I) -> Self {
		let mut tree = Self::new();
		for cidr in cidrs {
			let net = cidr.parse::<IpNet>().ok().or_else(|| cidr.parse::<IpAddr>().ok().map(IpNet::from));
			if let Some(net) = net { tree.insert(net); }
		}
		tree
	}

	/// True if `ip` lies within any network in the tree.
	pub fn contains(&self, ip: IpAddr) -> bool {
		match ip {
			IpAddr::V4(ip) => self.v4.covers(u32::from(ip).into(), 32),
			IpAddr::V6(ip) => self.v6.covers(u128::from(ip), 128),
		}
	}
}

impl CombinedSpfRecord {
	/// Checks every address each observed mail server resolves to against the addresses this
	/// policy authorizes.
	///
	/// Fills in [`Self::policy_check`] per host and per address, then sets
	/// [`Self::permissive_enforcement`] if any address is authorized and
	/// [`Self::strict_enforcement`] if all of them are. Both are false when nothing was observed.
	///
	/// Mail exchangers stand in for the sending hosts here, as outbound servers can't be observed
	/// without receiving a message.
	pub fn validate_policy(&mut self, observed: &HashMap<String, Vec<IpAddr>>) {
		let tree = PrefixTree::from_cidrs(self.ips.iter().map(|ip| ip.as_str()));

		self.policy_check = observed.iter().map(|(host, ips)| {
			let checks = ips.iter().map(|ip| (ip.to_string(), tree.contains(*ip))).collect::<BTreeMap<_, _>>();
			(host.clone(), checks)
		}).collect();

		let mut verdicts = self.policy_check.values().flat_map(|checks| checks.values().copied()).peekable();
		if verdicts.peek().is_none() {
			self.permissive_enforcement = false;
			self.strict_enforcement = false;
			return;
		}
		let (mut any, mut all) = (false, true);
		for verdict in verdicts {
			any |= verdict;
			all &= verdict;
		}
		self.permissive_enforcement = any;
		self.strict_enforcement = all;
	}
}
