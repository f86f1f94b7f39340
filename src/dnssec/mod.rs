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

//! DNSSEC integration: signing hooks, key bookkeeping, NSEC/NSEC3
//! chain maintenance, and denial-of-existence proof lookup.
//!
//! The cryptography itself lives behind the [`Signer`] trait; this
//! module owns everything that does not require a private key: the
//! record formats (type bitmaps, NSEC/NSEC3 RDATA, DS digests), the
//! hashed-name machinery of [RFC 5155], and the selection of the
//! minimal proof records for each denial case.
//!
//! [RFC 5155]: https://datatracker.ietf.org/doc/html/rfc5155

use std::convert::TryFrom;
use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::name::Name;
use crate::rr::{Rdata, RdataBuf, Rrset, Type};

mod chain;

pub use chain::{
    nsec3_hash_name, nsec3_proof_of_nodata, nsec3_proof_of_nxdomain, nsec3_proof_of_wildcard,
    nsec_proof_of_nodata, nsec_proof_of_nxdomain, nsec_proof_of_wildcard, rebuild_nsec3_chain,
    rebuild_nsec_chain, resign_zone, strip_chain, Nsec3Params,
};

////////////////////////////////////////////////////////////////////////
// STATUS                                                             //
////////////////////////////////////////////////////////////////////////

/// The DNSSEC status of a zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DnssecStatus {
    Unsigned,
    SignedWithNsec,
    SignedWithNsec3,
}

impl fmt::Display for DnssecStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unsigned => f.write_str("unsigned"),
            Self::SignedWithNsec => f.write_str("signed (NSEC)"),
            Self::SignedWithNsec3 => f.write_str("signed (NSEC3)"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// KEYS AND THE SIGNER                                                //
////////////////////////////////////////////////////////////////////////

/// A zone signing key held by a primary zone.
///
/// The public half is the DNSKEY RDATA published in the zone. The
/// private half is an opaque blob owned by the [`Signer`]; this core
/// stores and round-trips it through zone snapshots without ever
/// interpreting it.
#[derive(Clone, Debug)]
pub struct ZoneKey {
    pub tag: u16,
    pub algorithm: u8,
    pub flags: u16,
    pub public_rdata: RdataBuf,
    pub secret: Vec<u8>,
    pub retired: bool,
}

impl ZoneKey {
    /// Returns whether this is a key-signing key (the SEP flag of
    /// [RFC 4034 § 2.1.1] is set).
    ///
    /// [RFC 4034 § 2.1.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-2.1.1
    pub fn is_ksk(&self) -> bool {
        self.flags & 0x0001 != 0
    }
}

/// The signing interface a primary zone invokes.
///
/// Implementations supply key generation and RRSIG production; the
/// zone core supplies canonical owner names and RRsets and stores the
/// results. Signing a secondary, stub, or forwarder zone is never
/// requested.
pub trait Signer: Send + Sync {
    /// Generates a new key for the given zone. `ksk` selects a
    /// key-signing key (SEP flag set).
    fn generate_key(&self, zone: &Name, algorithm: u8, ksk: bool) -> Result<ZoneKey, SignError>;

    /// Produces the RRSIG RDATA covering `rrset` at `owner` in the
    /// zone rooted at `apex`, signed with `key`.
    fn sign_rrset(
        &self,
        key: &ZoneKey,
        owner: &Name,
        apex: &Name,
        rrset: &Rrset,
    ) -> Result<RdataBuf, SignError>;
}

/// Errors surfaced by [`Signer`] implementations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignError {
    /// The requested algorithm is not supported by the signer.
    UnsupportedAlgorithm(u8),

    /// Key generation failed.
    KeyGeneration(String),

    /// Producing a signature failed.
    Signing(String),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm {}", alg),
            Self::KeyGeneration(message) => write!(f, "key generation failed: {}", message),
            Self::Signing(message) => write!(f, "signing failed: {}", message),
        }
    }
}

impl std::error::Error for SignError {}

////////////////////////////////////////////////////////////////////////
// RECORD FORMAT HELPERS                                              //
////////////////////////////////////////////////////////////////////////

/// Reads the Type Covered field of RRSIG RDATA ([RFC 4034 § 3.1.1]).
///
/// [RFC 4034 § 3.1.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.1.1
pub fn rrsig_type_covered(rdata: &Rdata) -> Option<Type> {
    rdata
        .octets()
        .get(0..2)
        .map(|octets| Type::from(u16::from_be_bytes(octets.try_into().unwrap())))
}

/// Encodes a type list as an NSEC/NSEC3 type bitmap
/// ([RFC 4034 § 4.1.2]).
///
/// [RFC 4034 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1.2
pub fn encode_type_bitmap(types: &[Type]) -> Vec<u8> {
    let mut values: Vec<u16> = types.iter().map(|&t| u16::from(t)).collect();
    values.sort_unstable();
    values.dedup();

    let mut out = Vec::new();
    let mut window = 0u8;
    let mut bits = [0u8; 32];
    let mut max_octet = 0usize;
    let mut window_used = false;

    let mut flush = |window: u8, bits: &[u8; 32], max_octet: usize, out: &mut Vec<u8>| {
        out.push(window);
        out.push((max_octet + 1) as u8);
        out.extend_from_slice(&bits[..=max_octet]);
    };

    for value in values {
        let value_window = (value >> 8) as u8;
        if value_window != window {
            if window_used {
                flush(window, &bits, max_octet, &mut out);
            }
            window = value_window;
            bits = [0u8; 32];
            max_octet = 0;
            window_used = false;
        }
        let low = value & 0xff;
        let octet = (low / 8) as usize;
        bits[octet] |= 0x80 >> (low % 8);
        max_octet = max_octet.max(octet);
        window_used = true;
    }
    if window_used {
        flush(window, &bits, max_octet, &mut out);
    }
    out
}

/// Decodes an NSEC/NSEC3 type bitmap back into a type list.
pub fn decode_type_bitmap(mut octets: &[u8]) -> Option<Vec<Type>> {
    let mut types = Vec::new();
    while !octets.is_empty() {
        let window = *octets.first()? as u16;
        let len = *octets.get(1)? as usize;
        if len == 0 || len > 32 {
            return None;
        }
        let bits = octets.get(2..2 + len)?;
        for (octet_index, octet) in bits.iter().enumerate() {
            for bit in 0u16..8 {
                if octet & (0x80 >> bit) != 0 {
                    types.push(Type::from((window << 8) | (octet_index as u16 * 8 + bit)));
                }
            }
        }
        octets = &octets[2 + len..];
    }
    Some(types)
}

/// Builds NSEC RDATA: the next owner name in canonical order followed
/// by the type bitmap ([RFC 4034 § 4.1]).
///
/// [RFC 4034 § 4.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1
pub fn nsec_rdata(next: &Name, types: &[Type]) -> RdataBuf {
    let mut buf = Vec::new();
    let mut lowered = next.to_owned();
    lowered.make_ascii_lowercase();
    buf.extend_from_slice(lowered.wire_repr());
    buf.extend_from_slice(&encode_type_bitmap(types));
    RdataBuf::try_from(buf).unwrap()
}

/// Reads the Next Domain Name field of NSEC RDATA.
pub fn nsec_next_name(rdata: &Rdata) -> Option<Box<Name>> {
    Name::try_from_uncompressed(rdata.octets())
        .ok()
        .map(|(name, _)| name)
}

/// Computes DS RDATA for a key: key tag, algorithm, and a SHA-256
/// digest over the canonical owner name and the DNSKEY RDATA
/// ([RFC 4034 § 5.1], [RFC 4509]).
///
/// [RFC 4034 § 5.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-5.1
/// [RFC 4509]: https://datatracker.ietf.org/doc/html/rfc4509
pub fn ds_rdata(owner: &Name, key: &ZoneKey) -> RdataBuf {
    const DIGEST_TYPE_SHA256: u8 = 2;

    let mut lowered = owner.to_owned();
    lowered.make_ascii_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(lowered.wire_repr());
    hasher.update(key.public_rdata.octets());
    let digest = hasher.finalize();

    let mut buf = Vec::with_capacity(4 + digest.len());
    buf.extend_from_slice(&key.tag.to_be_bytes());
    buf.push(key.algorithm);
    buf.push(DIGEST_TYPE_SHA256);
    buf.extend_from_slice(&digest);
    RdataBuf::try_from(buf).unwrap()
}

/// Computes the key tag of DNSKEY RDATA per the algorithm of
/// [RFC 4034 Appendix B].
///
/// [RFC 4034 Appendix B]: https://datatracker.ietf.org/doc/html/rfc4034#appendix-B
pub fn key_tag(dnskey_rdata: &Rdata) -> u16 {
    let mut accumulator: u32 = 0;
    for (i, octet) in dnskey_rdata.octets().iter().enumerate() {
        if i & 1 == 0 {
            accumulator += (*octet as u32) << 8;
        } else {
            accumulator += *octet as u32;
        }
    }
    accumulator += (accumulator >> 16) & 0xffff;
    (accumulator & 0xffff) as u16
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bitmap_round_trips() {
        let types = [Type::A, Type::NS, Type::SOA, Type::RRSIG, Type::NSEC];
        let bitmap = encode_type_bitmap(&types);
        let decoded = decode_type_bitmap(&bitmap).unwrap();
        assert_eq!(decoded, types.to_vec());
    }

    #[test]
    fn type_bitmap_handles_multiple_windows() {
        let types = [Type::A, Type::FWD];
        let bitmap = encode_type_bitmap(&types);
        let decoded = decode_type_bitmap(&bitmap).unwrap();
        assert_eq!(decoded, types.to_vec());
    }

    #[test]
    fn rfc_4034_bitmap_example() {
        // RFC 4034 § 4.3's example NSEC record covers A, MX, RRSIG,
        // NSEC, and TYPE1234.
        let types = [Type::A, Type::MX, Type::RRSIG, Type::NSEC, Type::from(1234)];
        let bitmap = encode_type_bitmap(&types);
        let mut expected = vec![0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03];
        expected.extend_from_slice(&[0x04, 0x1b]);
        expected.extend_from_slice(&[0x00; 26]);
        expected.push(0x20);
        assert_eq!(bitmap, expected);
    }

    #[test]
    fn nsec_rdata_round_trips_the_next_name() {
        let next: Box<Name> = "Alpha.Example.Test.".parse().unwrap();
        let rdata = nsec_rdata(&next, &[Type::A]);
        // The next name is stored in canonical (lowercase) form.
        assert_eq!(
            nsec_next_name(&rdata).unwrap().wire_repr(),
            b"\x05alpha\x07example\x04test\x00"
        );
    }

    #[test]
    fn ds_rdata_has_the_expected_layout() {
        let key = ZoneKey {
            tag: 0x1234,
            algorithm: 13,
            flags: 257,
            public_rdata: (&b"\x01\x01\x03\x0dkeydata"[..]).try_into().unwrap(),
            secret: Vec::new(),
            retired: false,
        };
        let owner: Box<Name> = "example.test.".parse().unwrap();
        let rdata = ds_rdata(&owner, &key);
        assert_eq!(&rdata.octets()[0..2], &[0x12, 0x34]);
        assert_eq!(rdata.octets()[2], 13);
        assert_eq!(rdata.octets()[3], 2);
        assert_eq!(rdata.octets().len(), 4 + 32);
    }

    #[test]
    fn key_tag_matches_the_reference_algorithm() {
        // A trivial check: the accumulator of [0x01, 0x02, 0x03] is
        // 0x0102 + 0x0300 = 0x0402, with no carry to fold.
        let rdata: &Rdata = (&[0x01u8, 0x02, 0x03]).try_into().unwrap();
        assert_eq!(key_tag(rdata), 0x0402);
    }
}
