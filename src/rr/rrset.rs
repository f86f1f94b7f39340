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

//! Implementation of the [`Rrset`] structure.

use std::fmt;

use crate::class::Class;
use crate::name::Name;

use super::{Rdata, RdataBuf, Record, RecordInfo, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// RRSETS                                                             //
////////////////////////////////////////////////////////////////////////

/// A resource record set: every record sharing one owner name and RR
/// type.
///
/// [RFC 2181 § 5] defined an RRset as a group of records with the same
/// label, class, and type, and also stipulated that all records in an
/// RRset have the same TTL. Records are therefore stored with a single
/// TTL on the set, and one entry per RDATA. Each entry additionally
/// carries its [`RecordInfo`] metadata tag, since the disabled flag,
/// comments, and glue attachments are per-record state.
///
/// The owner name and class of the `Rrset` are not stored in the
/// structure itself; they are known from the tree node that owns it
/// (and the class is always IN in this core).
///
/// [RFC 2181 § 5]: https://datatracker.ietf.org/doc/html/rfc2181#section-5
#[derive(Clone)]
pub struct Rrset {
    pub rr_type: Type,
    ttl: Ttl,
    entries: Vec<Entry>,
}

#[derive(Clone)]
struct Entry {
    rdata: RdataBuf,
    info: RecordInfo,
}

impl Rrset {
    /// Creates a new `Rrset` with the given RR type and TTL. It will
    /// initially contain no record data.
    pub fn new(rr_type: Type, ttl: Ttl) -> Self {
        Self {
            rr_type,
            ttl,
            entries: Vec::new(),
        }
    }

    /// Returns the TTL shared by the records of this set.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Adds a record's data and metadata to this set.
    ///
    /// Following the behavior of other nameservers, RDATA that is
    /// already present (under the type's comparison rules) is silently
    /// discarded. A TTL differing from the set's TTL is rejected.
    pub fn insert(
        &mut self,
        ttl: Ttl,
        rdata: RdataBuf,
        info: RecordInfo,
    ) -> Result<(), RrsetAddError> {
        if self.entries.is_empty() {
            self.ttl = ttl;
        } else if self.ttl != ttl {
            return Err(RrsetAddError::TtlMismatch);
        }
        if self
            .entries
            .iter()
            .any(|entry| entry.rdata.equals(&rdata, self.rr_type))
        {
            return Ok(());
        }
        self.entries.push(Entry { rdata, info });
        Ok(())
    }

    /// Removes the record with the given RDATA. Returns whether a
    /// record was removed.
    pub fn remove(&mut self, rdata: &Rdata) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !entry.rdata.equals(rdata, self.rr_type));
        self.entries.len() < before
    }

    /// Returns the metadata tag of the record with the given RDATA, if
    /// present, for modification.
    pub fn info_mut(&mut self, rdata: &Rdata) -> Option<&mut RecordInfo> {
        let rr_type = self.rr_type;
        self.entries
            .iter_mut()
            .find(|entry| entry.rdata.equals(rdata, rr_type))
            .map(|entry| &mut entry.info)
    }

    /// Returns an iterator over the RDATA and metadata of every record
    /// in the set, including disabled records.
    pub fn iter(&self) -> impl Iterator<Item = (&Rdata, &RecordInfo)> {
        self.entries
            .iter()
            .map(|entry| (entry.rdata.as_ref(), &entry.info))
    }

    /// Returns an iterator skipping administratively disabled records.
    pub fn iter_active(&self) -> impl Iterator<Item = (&Rdata, &RecordInfo)> {
        self.iter().filter(|(_, info)| !info.disabled())
    }

    /// Returns the first entry in the set, if any.
    pub fn first(&self) -> Option<(&Rdata, &RecordInfo)> {
        self.iter().next()
    }

    /// Returns the number of records in the set, including disabled
    /// records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether the set contains at least one enabled record.
    pub fn has_active(&self) -> bool {
        self.iter_active().next().is_some()
    }

    /// Materializes every record of the set, including disabled
    /// records.
    pub fn to_records(&self, owner: &Name, class: Class) -> Vec<Record> {
        self.iter()
            .map(|(rdata, info)| {
                Record::with_info(
                    owner.to_owned(),
                    self.rr_type,
                    class,
                    self.ttl,
                    rdata.to_owned(),
                    info.clone(),
                )
            })
            .collect()
    }

    /// Materializes the enabled records of the set.
    pub fn to_active_records(&self, owner: &Name, class: Class) -> Vec<Record> {
        self.iter_active()
            .map(|(rdata, info)| {
                Record::with_info(
                    owner.to_owned(),
                    self.rr_type,
                    class,
                    self.ttl,
                    rdata.to_owned(),
                    info.clone(),
                )
            })
            .collect()
    }
}

impl fmt::Debug for Rrset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut list = f.debug_list();
        for (rdata, _) in self.iter() {
            list.entry(&format_args!("{} {} {:?}", self.ttl, self.rr_type, rdata));
        }
        list.finish()
    }
}

/// An error signaling that a record cannot be added to an [`Rrset`].
#[derive(Debug, Eq, PartialEq)]
pub enum RrsetAddError {
    /// The record's TTL differs from the rest of the records in the
    /// set.
    TtlMismatch,
}

impl fmt::Display for RrsetAddError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::TtlMismatch => f.write_str("TTL mismatch"),
        }
    }
}

impl std::error::Error for RrsetAddError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn rdata_buf(octets: &[u8]) -> RdataBuf {
        octets.try_into().unwrap()
    }

    fn insert(rrset: &mut Rrset, octets: &[u8]) -> Result<(), RrsetAddError> {
        rrset.insert(
            Ttl::from(3600),
            rdata_buf(octets),
            RecordInfo::for_type(rrset.rr_type),
        )
    }

    #[test]
    fn rrset_works() {
        let mut rrset = Rrset::new(Type::A, Ttl::from(3600));
        insert(&mut rrset, &[127, 0, 0, 1]).unwrap();
        insert(&mut rrset, &[127, 0, 0, 2]).unwrap();
        assert_eq!(rrset.len(), 2);
        assert_eq!(u32::from(rrset.ttl()), 3600);
        let rdatas: Vec<_> = rrset.iter().map(|(rdata, _)| rdata.octets()).collect();
        assert_eq!(rdatas, [&[127, 0, 0, 1][..], &[127, 0, 0, 2][..]]);
    }

    #[test]
    fn rrset_ignores_duplicates() {
        // For RR types embedding domain names that predate RFC 3597,
        // case-insensitive name comparison must be used (see the cmp
        // module).
        let mut rrset = Rrset::new(Type::CNAME, Ttl::from(3600));
        insert(&mut rrset, b"\x01a\x00").unwrap();
        insert(&mut rrset, b"\x01A\x00").unwrap();
        assert_eq!(rrset.len(), 1);
    }

    #[test]
    fn rrset_rejects_ttl_mismatch() {
        let mut rrset = Rrset::new(Type::A, Ttl::from(3600));
        insert(&mut rrset, &[127, 0, 0, 1]).unwrap();
        assert_eq!(
            rrset.insert(
                Ttl::from(7200),
                rdata_buf(&[127, 0, 0, 2]),
                RecordInfo::for_type(Type::A),
            ),
            Err(RrsetAddError::TtlMismatch)
        );
    }

    #[test]
    fn disabled_records_are_invisible_to_active_iteration() {
        let mut rrset = Rrset::new(Type::A, Ttl::from(3600));
        insert(&mut rrset, &[127, 0, 0, 1]).unwrap();
        insert(&mut rrset, &[127, 0, 0, 2]).unwrap();
        rrset
            .info_mut(rdata_buf(&[127, 0, 0, 1]).as_ref())
            .unwrap()
            .set_disabled(true);
        assert_eq!(rrset.iter_active().count(), 1);
        assert!(rrset.has_active());
        assert_eq!(rrset.len(), 2);
    }

    #[test]
    fn remove_works() {
        let mut rrset = Rrset::new(Type::A, Ttl::from(3600));
        insert(&mut rrset, &[127, 0, 0, 1]).unwrap();
        assert!(rrset.remove(rdata_buf(&[127, 0, 0, 1]).as_ref()));
        assert!(!rrset.remove(rdata_buf(&[127, 0, 0, 1]).as_ref()));
        assert!(rrset.is_empty());
    }
}
