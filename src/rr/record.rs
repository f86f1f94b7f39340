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

//! The [`Record`] structure and its per-record metadata tag,
//! [`RecordInfo`].

use std::fmt;
use std::time::SystemTime;

use crate::class::Class;
use crate::name::Name;

use super::{RdataBuf, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A DNS resource record, as handled by the zone management core.
///
/// In addition to the five wire fields, every record carries a
/// [`RecordInfo`] metadata tag. The tag is administrative state: it is
/// persisted in zone snapshots and preserved across zone transfers, but
/// it never appears on the wire and it does not participate in record
/// equality.
#[derive(Clone)]
pub struct Record {
    pub owner: Box<Name>,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: RdataBuf,
    pub info: RecordInfo,
}

impl Record {
    /// Creates a new record with a default metadata tag appropriate for
    /// its type.
    pub fn new(owner: Box<Name>, rr_type: Type, class: Class, ttl: Ttl, rdata: RdataBuf) -> Self {
        Self {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
            info: RecordInfo::for_type(rr_type),
        }
    }

    /// Creates a new record with the given metadata tag.
    pub fn with_info(
        owner: Box<Name>,
        rr_type: Type,
        class: Class,
        ttl: Ttl,
        rdata: RdataBuf,
        info: RecordInfo,
    ) -> Self {
        Self {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
            info,
        }
    }

    /// Returns whether this record is administratively disabled.
    pub fn is_disabled(&self) -> bool {
        self.info.disabled()
    }

    /// Returns whether `other` denotes the same resource record: same
    /// owner, same type, and equal RDATA under the type's comparison
    /// rules. TTL and metadata are ignored; this is the identity used
    /// when journal sequences are condensed and when a specific record
    /// is deleted or updated.
    pub fn same_rr(&self, other: &Record) -> bool {
        self.rr_type == other.rr_type
            && self.owner.as_ref() == other.owner.as_ref()
            && self.rdata.equals(&other.rdata, self.rr_type)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.same_rr(other) && self.class == other.class && self.ttl == other.ttl
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {:?}",
            self.owner, self.ttl, self.class, self.rr_type, self.rdata,
        )
    }
}

////////////////////////////////////////////////////////////////////////
// RECORD METADATA                                                    //
////////////////////////////////////////////////////////////////////////

/// The metadata tag attached to each [`Record`].
///
/// This is a small tagged union keyed by the record's type: NS records
/// carry attached glue, SOA records carry the serial numbering scheme,
/// SVCB/HTTPS records carry the automatic address-hint flags, and
/// everything else carries only the common fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordInfo {
    Generic(GenericInfo),
    Ns(NsInfo),
    Soa(SoaInfo),
    Svcb(SvcbInfo),
}

/// The metadata fields common to all record types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenericInfo {
    /// A disabled record is kept in the zone and in snapshots but is
    /// invisible to queries and transfers.
    pub disabled: bool,

    /// Free-form administrative comments.
    pub comments: Option<String>,

    /// When the record last appeared in an answer, if tracking is
    /// enabled.
    pub last_used: Option<SystemTime>,
}

/// Metadata for NS records: the common fields plus attached glue.
///
/// Glue address records for in-bailiwick name servers are not
/// independently queryable; they exist only as attachments of their NS
/// record, and are emitted inline in zone transfers and referral
/// additional sections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NsInfo {
    pub common: GenericInfo,
    pub glue: Vec<Record>,
}

/// Metadata for SOA records: the common fields plus the serial
/// numbering scheme.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SoaInfo {
    pub common: GenericInfo,
    pub serial_scheme: SerialScheme,
}

/// Metadata for SVCB/HTTPS records: the common fields plus the
/// automatic address-hint flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SvcbInfo {
    pub common: GenericInfo,
    pub auto_ipv4_hint: bool,
    pub auto_ipv6_hint: bool,
}

/// How a primary zone numbers its SOA serial on each change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerialScheme {
    /// Plain RFC 1982 increment.
    #[default]
    Increment,

    /// The `YYYYMMDDnn` date-encoded scheme: the serial encodes the
    /// current date with a two-digit revision counter. When the counter
    /// would overflow (or the stored serial is ahead of today's date),
    /// the serial falls back to a plain increment.
    Date,
}

impl RecordInfo {
    /// Returns the default metadata tag for a record of the given type.
    pub fn for_type(rr_type: Type) -> Self {
        match rr_type {
            Type::NS => Self::Ns(NsInfo::default()),
            Type::SOA => Self::Soa(SoaInfo::default()),
            Type::SVCB | Type::HTTPS => Self::Svcb(SvcbInfo::default()),
            _ => Self::Generic(GenericInfo::default()),
        }
    }

    /// Returns the common metadata fields.
    pub fn common(&self) -> &GenericInfo {
        match self {
            Self::Generic(info) => info,
            Self::Ns(info) => &info.common,
            Self::Soa(info) => &info.common,
            Self::Svcb(info) => &info.common,
        }
    }

    /// Returns the common metadata fields mutably.
    pub fn common_mut(&mut self) -> &mut GenericInfo {
        match self {
            Self::Generic(info) => info,
            Self::Ns(info) => &mut info.common,
            Self::Soa(info) => &mut info.common,
            Self::Svcb(info) => &mut info.common,
        }
    }

    /// Returns whether the disabled flag is set.
    pub fn disabled(&self) -> bool {
        self.common().disabled
    }

    /// Sets or clears the disabled flag.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.common_mut().disabled = disabled;
    }

    /// Returns the attached glue records (empty for non-NS records).
    pub fn glue(&self) -> &[Record] {
        match self {
            Self::Ns(info) => &info.glue,
            _ => &[],
        }
    }

    /// Returns the serial numbering scheme carried by an SOA tag, or
    /// the default scheme for other types.
    pub fn serial_scheme(&self) -> SerialScheme {
        match self {
            Self::Soa(info) => info.serial_scheme,
            _ => SerialScheme::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn a_record(owner: &str, octets: &[u8]) -> Record {
        Record::new(
            owner.parse().unwrap(),
            Type::A,
            Class::IN,
            Ttl::from(3600),
            octets.try_into().unwrap(),
        )
    }

    #[test]
    fn default_info_matches_type() {
        assert!(matches!(
            RecordInfo::for_type(Type::NS),
            RecordInfo::Ns(_)
        ));
        assert!(matches!(
            RecordInfo::for_type(Type::SOA),
            RecordInfo::Soa(_)
        ));
        assert!(matches!(
            RecordInfo::for_type(Type::HTTPS),
            RecordInfo::Svcb(_)
        ));
        assert!(matches!(
            RecordInfo::for_type(Type::TXT),
            RecordInfo::Generic(_)
        ));
    }

    #[test]
    fn equality_ignores_metadata() {
        let mut first = a_record("www.example.test.", &[192, 0, 2, 1]);
        let second = a_record("www.example.test.", &[192, 0, 2, 1]);
        first.info.set_disabled(true);
        assert_eq!(first, second);
    }

    #[test]
    fn same_rr_ignores_ttl() {
        let first = a_record("www.example.test.", &[192, 0, 2, 1]);
        let mut second = a_record("www.example.test.", &[192, 0, 2, 1]);
        second.ttl = Ttl::from(60);
        assert!(first.same_rr(&second));
        assert_ne!(first, second);

        let third = a_record("www.example.test.", &[192, 0, 2, 2]);
        assert!(!first.same_rr(&third));
    }
}
