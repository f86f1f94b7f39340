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

//! The per-zone change [`Journal`] backing incremental zone transfers.

use std::fmt;

use crate::rr::{helpers::SoaFields, Record, Serial, Type};

////////////////////////////////////////////////////////////////////////
// SEQUENCES                                                          //
////////////////////////////////////////////////////////////////////////

/// One difference sequence in a zone's history: the records removed and
/// the records added by a single change, each list headed by the SOA
/// record of the version it applies to ([RFC 1995 § 4]).
///
/// [RFC 1995 § 4]: https://datatracker.ietf.org/doc/html/rfc1995#section-4
#[derive(Clone, Debug)]
pub struct Sequence {
    removed: Vec<Record>,
    added: Vec<Record>,
}

impl Sequence {
    /// Builds a sequence from its removed and added record lists. Each
    /// list must be headed by an SOA record; the removed SOA identifies
    /// the version the sequence applies to, the added SOA the version
    /// it produces.
    pub fn new(removed: Vec<Record>, added: Vec<Record>) -> Result<Self, Error> {
        let sequence = Self { removed, added };
        // Both serial accessors double as SOA-presence checks.
        let old = sequence.try_old_serial().ok_or(Error::MissingSoa)?;
        let new = sequence.try_new_serial().ok_or(Error::MissingSoa)?;
        if !new.succeeds(old) {
            return Err(Error::NotMonotone);
        }
        Ok(sequence)
    }

    /// The records this sequence removes, headed by the old SOA.
    pub fn removed(&self) -> &[Record] {
        &self.removed
    }

    /// The records this sequence adds, headed by the new SOA.
    pub fn added(&self) -> &[Record] {
        &self.added
    }

    /// The serial of the version this sequence applies to.
    pub fn old_serial(&self) -> Serial {
        self.try_old_serial().unwrap()
    }

    /// The serial of the version this sequence produces.
    pub fn new_serial(&self) -> Serial {
        self.try_new_serial().unwrap()
    }

    fn try_old_serial(&self) -> Option<Serial> {
        leading_soa_serial(&self.removed)
    }

    fn try_new_serial(&self) -> Option<Serial> {
        leading_soa_serial(&self.added)
    }
}

fn leading_soa_serial(records: &[Record]) -> Option<Serial> {
    let first = records.first()?;
    if first.rr_type != Type::SOA {
        return None;
    }
    SoaFields::read(&first.rdata).map(|soa| soa.serial)
}

////////////////////////////////////////////////////////////////////////
// JOURNALS                                                           //
////////////////////////////////////////////////////////////////////////

/// The ordered history of difference sequences for a zone.
///
/// The journal is monotone by SOA serial: each appended sequence must
/// apply to the version the previous sequence produced. Applying the
/// sequences in order transforms a client's version of the zone into
/// the current version; the incremental-transfer code walks the journal
/// from the client's serial.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    sequences: Vec<Sequence>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sequence. The sequence's old serial must equal the new
    /// serial of the last sequence already present.
    pub fn append(&mut self, sequence: Sequence) -> Result<(), Error> {
        if let Some(last) = self.sequences.last() {
            if sequence.old_serial() != last.new_serial() {
                return Err(Error::NotMonotone);
            }
        }
        self.sequences.push(sequence);
        Ok(())
    }

    /// Returns the suffix of the journal starting at the sequence whose
    /// old serial equals `serial`, or `None` if the journal does not
    /// reach back that far (in which case the caller falls back to a
    /// full transfer).
    pub fn since(&self, serial: Serial) -> Option<&[Sequence]> {
        self.sequences
            .iter()
            .position(|sequence| sequence.old_serial() == serial)
            .map(|index| &self.sequences[index..])
    }

    /// Returns all sequences in order.
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Discards the journal's history. Used when a zone's content is
    /// replaced wholesale (full zone transfer, snapshot load).
    pub fn clear(&mut self) {
        self.sequences.clear();
    }

    /// Returns whether the journal holds no sequences.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// Errors constructing or appending journal sequences.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// A sequence's removed or added list was not headed by a valid SOA
    /// record.
    MissingSoa,

    /// A sequence did not continue the journal's serial chain, or its
    /// new serial did not succeed its old serial.
    NotMonotone,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::MissingSoa => f.write_str("sequence is not headed by an SOA record"),
            Self::NotMonotone => f.write_str("sequence breaks the journal's serial chain"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::rr::Ttl;

    fn soa(serial: u32) -> Record {
        let fields = SoaFields {
            mname: "ns1.example.test.".parse().unwrap(),
            rname: "hostmaster.example.test.".parse().unwrap(),
            serial: Serial::from(serial),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        Record::new(
            "example.test.".parse().unwrap(),
            Type::SOA,
            Class::IN,
            Ttl::from(3600),
            fields.to_rdata(),
        )
    }

    fn sequence(old: u32, new: u32) -> Sequence {
        Sequence::new(vec![soa(old)], vec![soa(new)]).unwrap()
    }

    #[test]
    fn sequence_requires_leading_soas() {
        assert!(matches!(
            Sequence::new(vec![], vec![soa(2)]),
            Err(Error::MissingSoa)
        ));
        assert!(matches!(
            Sequence::new(vec![soa(1)], vec![]),
            Err(Error::MissingSoa)
        ));
    }

    #[test]
    fn sequence_requires_increasing_serials() {
        assert!(matches!(
            Sequence::new(vec![soa(2)], vec![soa(1)]),
            Err(Error::NotMonotone)
        ));
    }

    #[test]
    fn journal_enforces_the_serial_chain() {
        let mut journal = Journal::new();
        journal.append(sequence(1, 2)).unwrap();
        journal.append(sequence(2, 3)).unwrap();
        assert_eq!(journal.append(sequence(5, 6)), Err(Error::NotMonotone));
        assert_eq!(journal.sequences().len(), 2);
    }

    #[test]
    fn since_finds_the_right_suffix() {
        let mut journal = Journal::new();
        journal.append(sequence(1, 2)).unwrap();
        journal.append(sequence(2, 3)).unwrap();
        journal.append(sequence(3, 4)).unwrap();

        let suffix = journal.since(Serial::from(2)).unwrap();
        assert_eq!(suffix.len(), 2);
        assert_eq!(suffix[0].old_serial(), Serial::from(2));
        assert!(journal.since(Serial::from(7)).is_none());
    }
}
