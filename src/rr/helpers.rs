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

//! Readers and writers for the RDATA field layouts the zone core must
//! interpret itself.
//!
//! RDATA is stored opaquely (see [`Rdata`]), but a handful of
//! operations need to see inside: serial bumps rewrite SOA fields,
//! additional-section processing extracts embedded domain names, DNAME
//! substitution reads the target, forwarder zones read FWD addresses,
//! and SVCB processing distinguishes AliasMode from ServiceMode.

use std::convert::TryFrom;

use crate::name::Name;

use super::{Rdata, RdataBuf, Serial, Type};

////////////////////////////////////////////////////////////////////////
// SOA FIELDS                                                         //
////////////////////////////////////////////////////////////////////////

/// The decoded fields of an SOA record ([RFC 1035 § 3.3.13]).
///
/// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
#[derive(Clone, Debug)]
pub struct SoaFields {
    pub mname: Box<Name>,
    pub rname: Box<Name>,
    pub serial: Serial,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SoaFields {
    /// Decodes SOA RDATA. Returns `None` if the RDATA is malformed.
    pub fn read(rdata: &Rdata) -> Option<SoaFields> {
        let (mname, mname_len) = Name::try_from_uncompressed(rdata.octets()).ok()?;
        let (rname, rname_len) = Name::try_from_uncompressed(&rdata.octets()[mname_len..]).ok()?;
        let fixed = rdata.octets().get(mname_len + rname_len..)?;
        if fixed.len() != 20 {
            return None;
        }
        let field = |i: usize| u32::from_be_bytes(fixed[i * 4..i * 4 + 4].try_into().unwrap());
        Some(SoaFields {
            mname,
            rname,
            serial: Serial::from(field(0)),
            refresh: field(1),
            retry: field(2),
            expire: field(3),
            minimum: field(4),
        })
    }

    /// Encodes these fields back into SOA RDATA.
    pub fn to_rdata(&self) -> RdataBuf {
        let mut buf = Vec::with_capacity(
            self.mname.wire_repr().len() + self.rname.wire_repr().len() + 20,
        );
        buf.extend_from_slice(self.mname.wire_repr());
        buf.extend_from_slice(self.rname.wire_repr());
        buf.extend_from_slice(&u32::from(self.serial).to_be_bytes());
        buf.extend_from_slice(&self.refresh.to_be_bytes());
        buf.extend_from_slice(&self.retry.to_be_bytes());
        buf.extend_from_slice(&self.expire.to_be_bytes());
        buf.extend_from_slice(&self.minimum.to_be_bytes());
        // An SOA record can't exceed the RDATA length limit: two names
        // of at most 255 octets plus 20 fixed octets.
        RdataBuf::try_from(buf).unwrap()
    }
}

////////////////////////////////////////////////////////////////////////
// EMBEDDED DOMAIN NAMES                                              //
////////////////////////////////////////////////////////////////////////

/// Reads a serialized domain name from `rdata`, starting at `start`.
/// Unlike the name field of e.g. an NS record, the name need not run to
/// the end of the RDATA (SVCB RDATA continues with service parameters).
pub fn read_name(rdata: &Rdata, start: usize) -> Option<Box<Name>> {
    rdata
        .octets()
        .get(start..)
        .and_then(|octets| Name::try_from_uncompressed(octets).ok())
        .map(|(name, _)| name)
}

/// Returns the offset of the embedded domain name that drives
/// additional-section processing for the given RR type, or `None` if
/// the type embeds no such name.
pub fn additional_name_offset(rr_type: Type) -> Option<usize> {
    match rr_type {
        Type::NS => Some(0),
        Type::MX => Some(2),
        Type::SRV => Some(6),
        Type::SVCB | Type::HTTPS => Some(2),
        _ => None,
    }
}

/// Encodes a domain name as the complete RDATA of a name-valued record
/// (NS, CNAME, DNAME, PTR).
pub fn name_rdata(name: &Name) -> RdataBuf {
    RdataBuf::try_from(name.wire_repr()).unwrap()
}

////////////////////////////////////////////////////////////////////////
// SVCB/HTTPS                                                         //
////////////////////////////////////////////////////////////////////////

/// Reads the SvcPriority field of SVCB/HTTPS RDATA ([RFC 9460 § 2.2]).
/// A priority of zero is AliasMode.
///
/// [RFC 9460 § 2.2]: https://datatracker.ietf.org/doc/html/rfc9460#section-2.2
pub fn svcb_priority(rdata: &Rdata) -> Option<u16> {
    rdata
        .octets()
        .get(0..2)
        .map(|octets| u16::from_be_bytes(octets.try_into().unwrap()))
}

/// Reads the TargetName field of SVCB/HTTPS RDATA.
pub fn svcb_target(rdata: &Rdata) -> Option<Box<Name>> {
    read_name(rdata, 2)
}

////////////////////////////////////////////////////////////////////////
// FWD                                                                //
////////////////////////////////////////////////////////////////////////

/// Encodes a forwarder address as FWD RDATA: one length octet followed
/// by the address in ASCII.
pub fn fwd_rdata(forwarder: &str) -> Option<RdataBuf> {
    if forwarder.is_empty() || forwarder.len() > 255 || !forwarder.is_ascii() {
        return None;
    }
    let mut buf = Vec::with_capacity(1 + forwarder.len());
    buf.push(forwarder.len() as u8);
    buf.extend_from_slice(forwarder.as_bytes());
    Some(RdataBuf::try_from(buf).unwrap())
}

/// Decodes the forwarder address from FWD RDATA.
pub fn read_fwd(rdata: &Rdata) -> Option<String> {
    let len = *rdata.octets().first()? as usize;
    let octets = rdata.octets().get(1..1 + len)?;
    std::str::from_utf8(octets).ok().map(str::to_owned)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
