// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The zone management core of an authoritative DNS server.
//!
//! This crate implements the pieces of an authoritative nameserver that
//! live between the wire and the disk: the in-memory namespace holding
//! every hosted zone, the algorithms that answer questions against it,
//! and the bookkeeping that keeps zones consistent across persistence,
//! zone transfer, and DNSSEC signing.
//!
//! The major components are:
//!
//! * the [`tree`] module, a label-indexed tree over the entire hosted
//!   namespace, implementing the lookup semantics of [RFC 1034 § 4.3.2]
//!   as clarified by [RFC 4592];
//! * the [`zone`] module, which models the four apex-zone variants
//!   (primary, secondary, stub, and forwarder), their refresh state
//!   machines, and the per-zone change journal;
//! * the [`query`] module, which resolves a question into a referral,
//!   answer, NODATA, or NXDOMAIN response, chasing CNAME and DNAME
//!   aliases and attaching DNSSEC proofs where requested;
//! * the [`xfr`] module, which produces and applies full (AXFR) and
//!   incremental (IXFR) zone transfers;
//! * the [`dnssec`] module, which maintains NSEC/NSEC3 chains and
//!   invokes signing through the [`dnssec::Signer`] trait; and
//! * the [`catalog`] module, the administrative surface: zone lifecycle,
//!   the sorted zone index, and debounced persistence to the binary
//!   snapshot format implemented by the [`zone_file`] module.
//!
//! Everything that talks to the network (datagram codecs, transports,
//! outbound transfer connections) is an external collaborator reached
//! through the types in [`message`] and the [`xfr::XfrClient`] trait.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
//! [RFC 4592]: https://datatracker.ietf.org/doc/html/rfc4592

pub mod catalog;
pub mod class;
pub mod dnssec;
pub mod message;
pub mod name;
pub mod query;
pub mod rr;
pub mod tree;
pub mod xfr;
pub mod zone;
pub mod zone_file;

mod util;

pub use class::Class;
