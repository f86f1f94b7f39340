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

//! Implementation of parsing and validation of uncompressed on-the-wire
//! names, as they appear embedded in RDATA and in zone snapshots.
//! Compressed names never reach this core; decompression is the wire
//! codec's concern.

use arrayvec::ArrayVec;

use super::{new_boxed_name, Error, Name, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

/// Parses an uncompressed name present at the beginning of `octets`.
/// The parameter `use_all` controls whether to expect the name to
/// occupy the entire buffer. This is the implementation of
/// [`Name::try_from_uncompressed`] and
/// [`Name::try_from_uncompressed_all`].
pub fn parse_uncompressed_name(octets: &[u8], use_all: bool) -> Result<(Box<Name>, usize), Error> {
    let mut offset = 0;
    let mut finished = false;
    let mut label_offsets = ArrayVec::<u8, MAX_N_LABELS>::new();
    while !finished && offset < octets.len() {
        let label_len = octets[offset];
        if label_len > (MAX_LABEL_LEN as u8) {
            return Err(Error::LabelTooLong);
        } else if label_len == 0 {
            finished = true;
        }
        label_offsets.push(offset as u8);
        offset += label_len as usize + 1;
        if offset > MAX_WIRE_LEN {
            // We check the offset against the maximum wire length in
            // each iteration (as opposed to once at the end) to ensure
            // that we never overflow label_offsets.
            return Err(Error::NameTooLong);
        }
    }

    if !finished {
        Err(Error::UnexpectedEom)
    } else if use_all && offset < octets.len() {
        Err(Error::ExtraData)
    } else {
        let wire_len = offset;
        let name = unsafe {
            // SAFETY: we have checked that the on-the-wire
            // representation is a valid domain name, and we promise
            // that we've computed label_offsets correctly.
            new_boxed_name(wire_len, &label_offsets, &[&octets[..wire_len]])
        };
        Ok((name, wire_len))
    }
}

/// Validates an uncompressed name present at the beginning of `octets`.
/// The parameter `use_all` controls whether to expect the name to
/// occupy the entire buffer. This is the implementation of
/// [`Name::validate_uncompressed`].
pub fn validate_uncompressed_name(octets: &[u8], use_all: bool) -> Result<usize, Error> {
    let mut offset = 0;
    let mut finished = false;
    while !finished && offset < octets.len() {
        let label_len = octets[offset];
        if label_len > (MAX_LABEL_LEN as u8) {
            return Err(Error::LabelTooLong);
        } else if label_len == 0 {
            finished = true;
        }
        offset += label_len as usize + 1;
        if offset > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
    }

    if !finished {
        Err(Error::UnexpectedEom)
    } else if use_all && offset < octets.len() {
        Err(Error::ExtraData)
    } else {
        Ok(offset)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uncompressed_works() {
        let (name, len) = Name::try_from_uncompressed(b"\x07example\x04test\x00junk").unwrap();
        assert_eq!(name, "example.test.".parse().unwrap());
        assert_eq!(len, 14);
    }

    #[test]
    fn parse_uncompressed_all_rejects_extra_data() {
        assert_eq!(
            Name::try_from_uncompressed_all(b"\x07example\x04test\x00junk"),
            Err(Error::ExtraData),
        );
    }

    #[test]
    fn parse_uncompressed_rejects_truncated_names() {
        assert_eq!(
            Name::try_from_uncompressed(b"\x07example\x04test"),
            Err(Error::UnexpectedEom),
        );
    }

    #[test]
    fn validate_uncompressed_works() {
        assert_eq!(
            Name::validate_uncompressed(b"\x07example\x04test\x00junk"),
            Ok(14),
        );
    }
}
