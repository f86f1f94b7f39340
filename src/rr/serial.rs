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

//! Provides the [`Serial`] structure for SOA serial numbers.

use std::fmt;

/// An SOA serial number.
///
/// Serial numbers obey the sequence-space arithmetic of [RFC 1982]:
/// they wrap around, and `a` is considered greater than `b` when the
/// wrapping distance from `b` up to `a` is less than 2³¹. Journals and
/// incremental transfers compare serials exclusively through
/// [`Serial::succeeds`], never through integer comparison.
///
/// [RFC 1982]: https://datatracker.ietf.org/doc/html/rfc1982
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Serial(u32);

impl Serial {
    /// Returns whether this serial comes after `other` in RFC 1982
    /// sequence space.
    ///
    /// Note that sequence-space comparison is a partial order: two
    /// distinct serials exactly 2³¹ apart are neither before nor after
    /// one another, and this returns `false` for such pairs.
    pub fn succeeds(self, other: Serial) -> bool {
        let distance = self.0.wrapping_sub(other.0);
        distance != 0 && distance < 0x8000_0000
    }

    /// Returns the serial that immediately follows this one. Per
    /// [RFC 1982 § 3.1], addition wraps around; zero is a valid serial.
    ///
    /// [RFC 1982 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1982#section-3.1
    pub fn next(self) -> Serial {
        Serial(self.0.wrapping_add(1))
    }
}

impl From<u32> for Serial {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> Self {
        serial.0
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
