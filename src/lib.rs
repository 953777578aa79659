//! The DNS provides a single, global, hierarchical namespace with (when DNSSEC is used)
//! cryptographic guarantees on all of its data. Mail security leans on the same namespace: SPF
//! policies are published as TXT records and name the hosts allowed to send for a domain.
//!
//! This crate measures both halves of a domain's DNS posture:
//!  * The [`chain`] module walks a name's delegation path from its zone up to the root, fetching
//!    DNSKEY and DS records for each level, and verifies the resulting chain of trust with `ring`
//!    through the [`validation`] module.
//!  * The [`spf`] module parses and recursively evaluates a domain's SPF record under RFC 7208's
//!    lookup budget, and checks observed mail-server addresses against the result.
//!
//! Both sit on the [`query`] module's resolver gateway, which answers from an HTTP record cache
//! when one is configured and falls back to querying a recursive resolver over TCP. Anything
//! implementing [`query::Exchanger`] can stand in for it.
//!
//! [`config::Config`] gathers the resolver, timeout and cache settings, and can be read from the
//! environment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod config;
pub mod error;
pub mod rr;
mod ser;
pub mod query;
pub mod rrset;
pub mod validation;
pub mod chain;
pub mod spf;
