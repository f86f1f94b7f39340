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

//! Implementation of equality for [`Rdata`].
//!
//! [RFC 3597 § 6] specifies that RRs of unknown type are equal when
//! their RDATA is bitwise equal, and that new RR types should not have
//! type-specific comparison rules. This means that embedded domain
//! names are henceforth compared in a case-sensitive manner! Therefore,
//! only types that (1) predate the RFC and (2) embed domain names need
//! to have special comparison logic.
//!
//! The [`Rdata::equals`] method, implemented in this module, compares
//! RDATA, performing case-insensitive comparison of domain names only
//! in RR types that are old enough to require this. Of the types this
//! core stores, those are NS, CNAME, PTR, DNAME, SOA, MX, and SRV.
//!
//! [RFC 3597 § 6]: https://datatracker.ietf.org/doc/html/rfc3597#section-6

use super::{Rdata, Type};
use crate::name::Name;

impl Rdata {
    /// Compares this [`Rdata`] to another, assuming that they are both
    /// of type `rr_type`. This implements special logic for types
    /// introduced before RFC 3597 that contain domain names, in which
    /// the domain names must be compared case-insensitively.
    /// [RFC 3597 § 6] stipulated that all RDATA should henceforth be
    /// compared bitwise, and thus a bitwise comparison is used for all
    /// later types.
    ///
    /// If, in the process of comparing domain names case-insensitively,
    /// one of the [`Rdata`]s is found to be invalid, this falls back to
    /// a bitwise comparison of the entire [`Rdata`]s.
    ///
    /// [RFC 3597 § 6]: https://datatracker.ietf.org/doc/html/rfc3597#section-6
    pub fn equals(&self, other: &Self, rr_type: Type) -> bool {
        if self.octets().len() != other.octets().len() {
            // Since equal embedded domain names are always the same
            // length (even if they contain octets of differing ASCII
            // case), the RDATAs can't be equal if they have differing
            // lengths.
            false
        } else {
            match rr_type {
                Type::NS | Type::CNAME | Type::PTR | Type::DNAME => names_equal(self, other),
                Type::SOA => soas_equal(self, other),
                Type::MX => name_after_prefix_equal(self, other, 2),
                Type::SRV => name_after_prefix_equal(self, other, 6),
                _ => self.octets() == other.octets(),
            }
        }
    }
}

/// Tests two uncompressed on-the-wire names for equality, falling back
/// to bitwise comparison if either is invalid.
fn names_equal(first: &[u8], second: &[u8]) -> bool {
    match test_name_field(first, second) {
        Some(Some(len)) if len == first.len() => true,
        Some(Some(_)) => first == second, // Invalid since there's extra data
        Some(None) => false,
        None => first == second,
    }
}

/// Tests two on-the-wire SOA records *with the same length* for
/// equality, falling back to bitwise comparison if either is invalid.
fn soas_equal(first: &[u8], second: &[u8]) -> bool {
    assert!(first.len() == second.len());
    let mname = match test_name_field(first, second) {
        Some(Some(len)) => len,
        Some(None) => return false,
        None => return first == second,
    };
    match test_name_field(&first[mname..], &second[mname..]) {
        Some(Some(rname)) => {
            if first.len() - mname - rname != 20 {
                // The remaining fields are not the right length.
                // Fall back to bitwise comparison.
                first == second
            } else {
                // Compare the remaining fields bitwise.
                first[mname + rname..] == second[mname + rname..]
            }
        }
        Some(None) => false,
        None => first == second,
    }
}

/// Tests two on-the-wire records *with the same length* that consist of
/// `prefix` octets of fixed fields followed by a domain name (the MX
/// and SRV layouts). If either contains an invalid domain name, this
/// falls back to bitwise comparison.
fn name_after_prefix_equal(first: &[u8], second: &[u8], prefix: usize) -> bool {
    assert!(first.len() == second.len());
    if first.len() > prefix {
        // Note that if names_equal falls back to bitwise comparison,
        // then we did a bitwise comparison of the whole thing, so we
        // still did what we said we would!
        first[0..prefix] == second[0..prefix]
            && names_equal(&first[prefix..], &second[prefix..])
    } else {
        // Invalid records; do a bitwise comparison.
        first == second
    }
}

/// Tests one name field for equality, starting at the beginning of each
/// buffer. Since the comparison logic in this module promises to fall
/// back to bitwise comparison if invalid data is encountered, the
/// return value is three-way:
///
/// * `Some(Some(len))` if both fields were valid and equal when
///   compared case-insensitively; `len` is the length of the field.
/// * `Some(None)` if we can definitively say that the answer should be
///   `false` with no further (re-)comparison.
/// * `None` if, due to an invalid domain name, the caller must
///   re-compare everything bitwise.
fn test_name_field(first: &[u8], second: &[u8]) -> Option<Option<usize>> {
    match (
        Name::try_from_uncompressed(first),
        Name::try_from_uncompressed(second),
    ) {
        (Err(_), Err(_)) => {
            // Both are invalid. The caller should fall back to bitwise
            // comparison.
            None
        }
        (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
            // One was valid and the other wasn't, so there's no way
            // that these can be bitwise equal either.
            Some(None)
        }
        (Ok((first_name, len)), Ok((second_name, _))) => {
            if first_name == second_name {
                Some(Some(len))
            } else {
                // If they are not equal case-insensitively, then
                // _a fortiori_ they are not bitwise equal.
                Some(None)
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn rdata(octets: &[u8]) -> &Rdata {
        octets.try_into().unwrap()
    }

    #[test]
    fn valid_names_compare_case_insensitively() {
        let name_a = rdata(b"\x09bailiwick\x04test\x00");
        let name_b = rdata(b"\x09Bailiwick\x04TEST\x00");
        assert!(name_a.equals(name_b, Type::NS));
        assert!(name_a.equals(name_b, Type::DNAME));
        // ... but a post-RFC 3597 type compares bitwise.
        assert!(!name_a.equals(name_b, Type::from(65400)));
    }

    #[test]
    fn invalid_names_compare_bitwise() {
        let name_and_junk = rdata(b"\x09bailiwick\x04test\x00junk");
        let other_junk = rdata(b"\x09Bailiwick\x04TEST\x00junk");
        assert!(!name_and_junk.equals(other_junk, Type::CNAME));

        let invalid_a = rdata(b"\x08bailiwick\x04test\x00");
        let invalid_b = rdata(b"\x08Bailiwick\x04TEST\x00");
        assert!(!invalid_a.equals(invalid_b, Type::CNAME));
    }

    #[test]
    fn mx_exchanges_compare_case_insensitively() {
        let mx_a = rdata(b"\x00\x0a\x04mail\x04test\x00");
        let mx_b = rdata(b"\x00\x0a\x04MAIL\x04test\x00");
        let mx_c = rdata(b"\x00\x14\x04mail\x04test\x00");
        assert!(mx_a.equals(mx_b, Type::MX));
        assert!(!mx_a.equals(mx_c, Type::MX));
    }

    #[test]
    fn srv_targets_compare_case_insensitively() {
        let srv_a = rdata(b"\x00\x01\x00\x02\x00\x35\x02ns\x04test\x00");
        let srv_b = rdata(b"\x00\x01\x00\x02\x00\x35\x02NS\x04test\x00");
        assert!(srv_a.equals(srv_b, Type::SRV));
    }

    #[test]
    fn soas_compare_case_insensitively_in_names_only() {
        let fields = |serial: u32| {
            let mut soa = Vec::new();
            soa.extend_from_slice(b"\x02ns\x04test\x00");
            soa.extend_from_slice(b"\x05admin\x04test\x00");
            soa.extend_from_slice(&serial.to_be_bytes());
            soa.extend_from_slice(&[0; 16]);
            soa
        };
        let mut upper = fields(1);
        upper[1..3].make_ascii_uppercase();
        assert!(rdata(&fields(1)).equals(rdata(&upper), Type::SOA));
        assert!(!rdata(&fields(1)).equals(rdata(&fields(2)), Type::SOA));
    }
}
