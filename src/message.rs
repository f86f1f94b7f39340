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

//! The datagram contract between the zone core and the wire layer.
//!
//! Parsing and serializing DNS datagrams is the transport layer's
//! concern. The zone core consumes a decoded [`Request`] and produces a
//! [`Response`] whose sections are plain record lists; the wire layer
//! is responsible for encoding them (applying name compression,
//! truncation, and EDNS framing as it sees fit).
//!
//! Flag semantics set by this core: AA is set when the answer is
//! authoritative, TC is never set (truncation is a wire concern), RA
//! mirrors whether the embedding server allows recursion, and AD is
//! never set.

use std::fmt;

use crate::class::Class;
use crate::name::Name;
use crate::rr::{Record, Type};

////////////////////////////////////////////////////////////////////////
// QUESTIONS AND REQUESTS                                             //
////////////////////////////////////////////////////////////////////////

/// The question section of a DNS query.
#[derive(Clone, Debug)]
pub struct Question {
    pub qname: Box<Name>,
    pub qtype: Type,
    pub qclass: Class,
}

/// A decoded DNS query, as handed to the query engine by the wire
/// layer.
#[derive(Clone, Debug)]
pub struct Request {
    pub question: Question,

    /// The RD flag of the query.
    pub recursion_desired: bool,

    /// The DO bit of the query's EDNS OPT record (or `false` when no
    /// OPT record was present).
    pub dnssec_ok: bool,
}

impl Request {
    /// Convenience constructor for a plain query.
    pub fn new(qname: Box<Name>, qtype: Type) -> Self {
        Self {
            question: Question {
                qname,
                qtype,
                qclass: Class::IN,
            },
            recursion_desired: false,
            dnssec_ok: false,
        }
    }

    /// Returns a copy of this request with the DO bit set.
    pub fn with_dnssec_ok(mut self) -> Self {
        self.dnssec_ok = true;
        self
    }
}

////////////////////////////////////////////////////////////////////////
// RESPONSES                                                          //
////////////////////////////////////////////////////////////////////////

/// A DNS response produced by the query engine.
#[derive(Clone, Debug)]
pub struct Response {
    pub rcode: Rcode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_available: bool,
    pub answer: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Response {
    /// Creates an empty NOERROR response.
    pub fn new(recursion_available: bool) -> Self {
        Self {
            rcode: Rcode::NOERROR,
            authoritative: false,
            truncated: false,
            recursion_available,
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Creates an empty response with the given RCODE.
    pub fn with_rcode(rcode: Rcode, recursion_available: bool) -> Self {
        Self {
            rcode,
            ..Self::new(recursion_available)
        }
    }
}

/// A DNS response code.
///
/// An RCODE is a small integer; this is a wrapper with constants for
/// the codes this core produces, in the style of
/// [`Type`](crate::rr::Type).
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Rcode(u8);

impl Rcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NXDOMAIN: Self = Self(3);
    pub const NOTIMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);
}

impl From<Rcode> for u8 {
    fn from(rcode: Rcode) -> Self {
        rcode.0
    }
}

impl fmt::Debug for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NOERROR => f.write_str("NOERROR"),
            Self::FORMERR => f.write_str("FORMERR"),
            Self::SERVFAIL => f.write_str("SERVFAIL"),
            Self::NXDOMAIN => f.write_str("NXDOMAIN"),
            Self::NOTIMP => f.write_str("NOTIMP"),
            Self::REFUSED => f.write_str("REFUSED"),
            Self(value) => write!(f, "RCODE{}", value),
        }
    }
}
