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

//! Zone transfer production and application.
//!
//! Full transfers ([RFC 5936]) serialize a zone as `[SOA, records…,
//! SOA]`. Incremental transfers ([RFC 1995]) walk the zone's journal
//! from the client's serial, emitting difference sequences that are
//! condensed before transmission; a client already at the current
//! serial receives a single SOA, and a client older than the journal
//! reaches back receives a full transfer instead.
//!
//! The application side (used by secondary zones) validates the SOA
//! framing and serial chain, rebuilds the affected nodes, and
//! re-attaches glue onto NS records by name. Transfer I/O itself lives
//! behind the [`XfrClient`] trait.
//!
//! [RFC 1995]: https://datatracker.ietf.org/doc/html/rfc1995
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::name::Name;
use crate::rr::{helpers, NsInfo, Record, RecordInfo, Rrset, Serial, Type};
use crate::tree::{ApexMatch, ZoneTree};
use crate::zone::Sequence;

/// The default per-attempt timeout for outbound transfer connections.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors validating or applying a zone transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The transfer was not framed by matching SOA records.
    BadFraming,

    /// The SOA records do not belong to the zone being transferred.
    WrongOwner,

    /// An incremental sequence does not apply to the zone's current
    /// serial.
    SerialMismatch { expected: Serial, actual: Serial },

    /// The target zone does not accept transfer data (it is not a
    /// secondary or stub zone).
    NotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadFraming => f.write_str("transfer is not framed by matching SOA records"),
            Self::WrongOwner => f.write_str("transfer SOA does not match the zone apex"),
            Self::SerialMismatch { expected, actual } => write!(
                f,
                "incremental sequence applies to serial {} but the zone is at {}",
                actual, expected,
            ),
            Self::NotSupported => f.write_str("zone does not accept transfer data"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// AXFR PRODUCTION                                                    //
////////////////////////////////////////////////////////////////////////

/// Produces the record stream of a full zone transfer: the apex SOA,
/// every other active record of the zone in canonical name order (with
/// NS glue emitted inline after each NS record), and the apex SOA
/// again. Disabled records are omitted.
pub fn axfr_records(tree: &ZoneTree, apex: &ApexMatch) -> Vec<Record> {
    let class = apex.zone.class();
    let mut soa_records = apex.node.active_records(Type::SOA, class);
    let Some(soa) = soa_records.pop() else {
        return Vec::new();
    };

    let mut out = vec![soa.clone()];
    for node in tree.walk_zone(&apex.node) {
        let at_apex = Arc::ptr_eq(&node, &apex.node);
        for rrset in node.walk_rrsets(at_apex) {
            if at_apex && rrset.rr_type == Type::SOA {
                continue;
            }
            for (rdata, info) in rrset.iter_active() {
                out.push(Record::with_info(
                    node.name().to_owned(),
                    rrset.rr_type,
                    class,
                    rrset.ttl(),
                    rdata.to_owned(),
                    info.clone(),
                ));
                if rrset.rr_type == Type::NS {
                    out.extend(
                        info.glue()
                            .iter()
                            .filter(|glue| !glue.is_disabled())
                            .cloned(),
                    );
                }
            }
        }
    }
    out.push(soa);
    out
}

////////////////////////////////////////////////////////////////////////
// IXFR PRODUCTION                                                    //
////////////////////////////////////////////////////////////////////////

/// Produces the record stream of an incremental zone transfer for a
/// client at `client_serial`.
///
/// Returns a single SOA when the client is current, the condensed
/// journal suffix when the journal reaches back to the client's
/// serial, and a full transfer otherwise.
pub fn ixfr_records(tree: &ZoneTree, apex: &ApexMatch, client_serial: Serial) -> Vec<Record> {
    let class = apex.zone.class();
    let Some(journal) = apex.zone.journal() else {
        return axfr_records(tree, apex);
    };
    // The journal and the live SOA are read under the same lock;
    // mutations bump the serial and append their sequence under it, so
    // the suffix we serve is consistent with the serial framing it.
    let journal = journal.lock().unwrap();
    let current = apex.node.active_records(Type::SOA, class);
    let Some(current_soa) = current.into_iter().next() else {
        return Vec::new();
    };
    let Some(current_serial) = apex.node.soa_serial() else {
        return Vec::new();
    };

    if client_serial == current_serial {
        return vec![current_soa];
    }

    let Some(suffix) = journal.since(client_serial) else {
        drop(journal);
        return axfr_records(tree, apex);
    };

    let mut out = vec![current_soa.clone()];
    for sequence in suffix {
        out.extend(sequence.removed().iter().cloned());
        out.extend(sequence.added().iter().cloned());
    }
    out.push(current_soa);
    condense(out, apex.zone.name())
}

/// Condenses a framed incremental transfer into a single difference
/// sequence.
///
/// Overlapping sequences cancel: a record deleted by one sequence and
/// added back by a later one (or vice versa) disappears from the
/// output. The result is laid out as `[newest SOA, first deleted SOA,
/// deletions…, deleted glue…, last added SOA, additions…, added
/// glue…, newest SOA]`, where glue means address records not under the
/// zone apex (for the root zone, all address records).
pub fn condense(records: Vec<Record>, apex_name: &Name) -> Vec<Record> {
    let Some(sequences) = parse_sequences(&records, apex_name) else {
        return records;
    };
    if sequences.len() < 2 {
        return records;
    }

    let newest = records[0].clone();
    let first_deleted_soa = sequences[0].0.clone();
    let last_added_soa = sequences.last().unwrap().2.clone();

    let mut deleted: Vec<Record> = Vec::new();
    let mut added: Vec<Record> = Vec::new();
    for (_, dels, _, adds) in &sequences {
        for record in dels {
            if let Some(index) = added.iter().position(|added| added.same_rr(record)) {
                added.remove(index);
            } else {
                deleted.push(record.clone());
            }
        }
        for record in adds {
            if let Some(index) = deleted.iter().position(|deleted| deleted.same_rr(record)) {
                deleted.remove(index);
            } else {
                added.push(record.clone());
            }
        }
    }

    let is_glue = |record: &Record| {
        record.rr_type.is_address()
            && (apex_name.is_root() || !record.owner.eq_or_subdomain_of(apex_name))
    };
    let (deleted_glue, deleted): (Vec<Record>, Vec<Record>) =
        deleted.into_iter().partition(is_glue);
    let (added_glue, added): (Vec<Record>, Vec<Record>) = added.into_iter().partition(is_glue);

    let mut out = vec![newest.clone(), first_deleted_soa];
    out.extend(deleted);
    out.extend(deleted_glue);
    out.push(last_added_soa);
    out.extend(added);
    out.extend(added_glue);
    out.push(newest);
    out
}

/// Parses framed IXFR records into `(old SOA, deletions, new SOA,
/// additions)` tuples. Returns `None` when the framing is not a valid
/// sequence stream.
#[allow(clippy::type_complexity)]
fn parse_sequences(
    records: &[Record],
    apex_name: &Name,
) -> Option<Vec<(Record, Vec<Record>, Record, Vec<Record>)>> {
    if records.len() < 2 {
        return None;
    }
    let first = records.first()?;
    let last = records.last()?;
    if first.rr_type != Type::SOA
        || !first.same_rr(last)
        || first.owner.as_ref() != apex_name
    {
        return None;
    }

    let mut sequences = Vec::new();
    let mut index = 1;
    let body_end = records.len() - 1;
    while index < body_end {
        let old_soa = &records[index];
        if old_soa.rr_type != Type::SOA {
            return None;
        }
        index += 1;
        let mut deletions = Vec::new();
        while index < body_end && records[index].rr_type != Type::SOA {
            deletions.push(records[index].clone());
            index += 1;
        }
        let new_soa = records.get(index).filter(|r| r.rr_type == Type::SOA)?;
        if index >= body_end {
            return None;
        }
        index += 1;
        let mut additions = Vec::new();
        while index < body_end && records[index].rr_type != Type::SOA {
            additions.push(records[index].clone());
            index += 1;
        }
        sequences.push((old_soa.clone(), deletions, new_soa.clone(), additions));
    }
    Some(sequences)
}

////////////////////////////////////////////////////////////////////////
// TRANSFER APPLICATION                                               //
////////////////////////////////////////////////////////////////////////

/// Replaces a zone's content with the records of a full transfer.
///
/// The stream must be framed by matching apex SOA records. Metadata
/// tags of records that survive the sync (same owner, type, and RDATA)
/// are preserved, as is the SOA record's tag. Glue address records in
/// the stream (addresses under a delegation) are re-attached to
/// their NS records by name rather than stored as queryable records.
/// The zone's journal is cleared: its history no longer connects to
/// the new content.
pub fn apply_axfr(tree: &ZoneTree, apex: &ApexMatch, records: &[Record]) -> Result<(), Error> {
    let soa = validate_framing(records, apex.zone.name())?;

    // Remember the tags of the outgoing records so that administrative
    // state survives the sync.
    let mut old_tags: Vec<Record> = Vec::new();
    for node in tree.walk_zone(&apex.node) {
        let at_apex = Arc::ptr_eq(&node, &apex.node);
        for rrset in node.walk_rrsets(at_apex) {
            old_tags.extend(rrset.to_records(node.name(), apex.zone.class()));
        }
    }

    clear_zone(tree, apex);
    insert_transfer_records(tree, apex, &records[..records.len() - 1], &old_tags);

    // Reinstate the SOA tag from the previous content, if any.
    if let Some(old_soa) = old_tags
        .iter()
        .find(|record| record.rr_type == Type::SOA)
    {
        let info = old_soa.info.clone();
        apex.node.update_rrset(Type::SOA, |rrset| {
            let rdata = soa.rdata.clone();
            if let Some(entry) = rrset.info_mut(&rdata) {
                *entry = info.clone();
            }
        });
    }

    if let Some(journal) = apex.zone.journal() {
        journal.lock().unwrap().clear();
    }
    apex.zone.touch();
    Ok(())
}

/// Applies an incremental transfer to a zone.
///
/// A single-SOA stream means the zone is already current. Otherwise
/// each difference sequence must apply to the zone's serial at the
/// time it is processed; any mismatch fails with
/// [`Error::SerialMismatch`] before the zone is modified further.
/// Applied sequences are appended to the zone's journal.
pub fn apply_ixfr(tree: &ZoneTree, apex: &ApexMatch, records: &[Record]) -> Result<(), Error> {
    if records.len() == 1 {
        return match records[0].rr_type {
            Type::SOA => Ok(()),
            _ => Err(Error::BadFraming),
        };
    }
    validate_framing(records, apex.zone.name())?;
    let sequences =
        parse_sequences(records, apex.zone.name()).ok_or(Error::BadFraming)?;

    for (old_soa, deletions, new_soa, additions) in sequences {
        let current = apex.node.soa_serial().ok_or(Error::BadFraming)?;
        let old_serial = soa_serial_of(&old_soa)?;
        if old_serial != current {
            return Err(Error::SerialMismatch {
                expected: current,
                actual: old_serial,
            });
        }

        for record in &deletions {
            remove_record(tree, record);
        }
        insert_transfer_records(tree, apex, &additions, &[]);

        // Replace the SOA while keeping its tag.
        let old_info = apex
            .node
            .rrset(Type::SOA)
            .and_then(|rrset| rrset.first().map(|(_, info)| info.clone()));
        let mut soa_rrset = Rrset::new(Type::SOA, new_soa.ttl);
        soa_rrset
            .insert(
                new_soa.ttl,
                new_soa.rdata.clone(),
                old_info.unwrap_or_else(|| RecordInfo::for_type(Type::SOA)),
            )
            .ok();
        apex.node.put_rrset(soa_rrset);

        if let Some(journal) = apex.zone.journal() {
            let mut removed = vec![old_soa.clone()];
            removed.extend(deletions);
            let mut added = vec![new_soa.clone()];
            added.extend(additions);
            if let Ok(sequence) = Sequence::new(removed, added) {
                // The upstream's history becomes ours.
                let _ = journal.lock().unwrap().append(sequence);
            }
        }
    }
    apex.zone.touch();
    Ok(())
}

/// Checks the `[SOA, …, SOA]` framing of a transfer stream and returns
/// the framing SOA.
fn validate_framing<'r>(records: &'r [Record], apex_name: &Name) -> Result<&'r Record, Error> {
    if records.len() < 2 {
        return Err(Error::BadFraming);
    }
    let first = &records[0];
    let last = &records[records.len() - 1];
    if first.rr_type != Type::SOA || last.rr_type != Type::SOA || !first.same_rr(last) {
        return Err(Error::BadFraming);
    }
    if first.owner.as_ref() != apex_name {
        return Err(Error::WrongOwner);
    }
    Ok(first)
}

fn soa_serial_of(record: &Record) -> Result<Serial, Error> {
    helpers::SoaFields::read(&record.rdata)
        .map(|soa| soa.serial)
        .ok_or(Error::BadFraming)
}

/// Removes every record of the zone, garbage-collecting emptied nodes.
fn clear_zone(tree: &ZoneTree, apex: &ApexMatch) {
    let nodes = tree.walk_zone(&apex.node);
    for node in &nodes {
        let at_apex = Arc::ptr_eq(node, &apex.node);
        if !at_apex && node.apex().is_some() {
            for rrset in node.parent_rrsets() {
                node.remove_parent_rrset(rrset.rr_type);
            }
        } else {
            node.clear_rrsets();
        }
    }
    for node in nodes.iter().rev() {
        if !Arc::ptr_eq(node, &apex.node) {
            tree.try_remove(&node.name().to_owned());
        }
    }
}

/// Inserts transfer records into the tree, re-attaching glue onto NS
/// records and restoring surviving metadata tags from `old_tags`.
fn insert_transfer_records(
    tree: &ZoneTree,
    apex: &ApexMatch,
    records: &[Record],
    old_tags: &[Record],
) {
    let apex_name = apex.zone.name();

    // Delegation cuts in the incoming data determine which address
    // records are glue.
    let cuts: Vec<Box<Name>> = records
        .iter()
        .filter(|record| {
            record.rr_type == Type::NS && record.owner.as_ref() != apex_name
        })
        .map(|record| record.owner.clone())
        .collect();

    let mut plain: Vec<Record> = Vec::new();
    let mut glue: Vec<Record> = Vec::new();
    for record in records {
        let is_glue = record.rr_type.is_address()
            && cuts
                .iter()
                .any(|cut| record.owner.eq_or_subdomain_of(cut));
        if is_glue {
            glue.push(record.clone());
        } else {
            plain.push(record.clone());
        }
    }

    for record in &mut plain {
        // A record that survived the sync keeps its old tag.
        if let Some(old) = old_tags.iter().find(|old| old.same_rr(record)) {
            record.info = old.info.clone();
        }
        // Attach this name's glue to NS records.
        if record.rr_type == Type::NS {
            if let Some(target) = helpers::read_name(&record.rdata, 0) {
                let attached: Vec<Record> = glue
                    .iter()
                    .filter(|address| address.owner.as_ref() == target.as_ref())
                    .cloned()
                    .collect();
                if !attached.is_empty() {
                    record.info = RecordInfo::Ns(NsInfo {
                        glue: attached,
                        ..NsInfo::default()
                    });
                }
            }
        }

        let node = tree.get_or_add(&record.owner);
        let parent_slot =
            node.apex().is_some() && !Arc::ptr_eq(&node, &apex.node);
        let existing = if parent_slot {
            node.parent_rrset(record.rr_type)
        } else {
            node.rrset(record.rr_type)
        };
        let mut rrset = match existing {
            Some(rrset) => (*rrset).clone(),
            None => Rrset::new(record.rr_type, record.ttl),
        };
        // Transfer streams re-align TTLs: the first record of each set
        // wins.
        let ttl = if rrset.is_empty() { record.ttl } else { rrset.ttl() };
        let _ = rrset.insert(ttl, record.rdata.clone(), record.info.clone());
        if parent_slot {
            node.put_parent_rrset(rrset);
        } else {
            node.put_rrset(rrset);
        }
    }
}

/// Removes one record from the tree, garbage-collecting its node if it
/// becomes unused.
fn remove_record(tree: &ZoneTree, record: &Record) {
    let Some(node) = tree.get(&record.owner) else {
        return;
    };
    node.update_rrset(record.rr_type, |rrset| {
        rrset.remove(&record.rdata);
    });
    tree.try_remove(&record.owner);
}

////////////////////////////////////////////////////////////////////////
// THE TRANSFER CLIENT                                                //
////////////////////////////////////////////////////////////////////////

/// A cancellation signal shared between a refresh driver and an
/// in-flight transfer.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Errors surfaced by [`XfrClient`] implementations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientError {
    /// The operation observed its cancellation token.
    Cancelled,

    /// The per-attempt timeout elapsed.
    Timeout,

    /// The remote server refused the request.
    Refused,

    /// A transport-level failure.
    Io(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("transfer cancelled"),
            Self::Timeout => f.write_str("transfer timed out"),
            Self::Refused => f.write_str("transfer refused by the remote server"),
            Self::Io(message) => write!(f, "transfer I/O failure: {}", message),
        }
    }
}

impl std::error::Error for ClientError {}

/// The outbound transfer operations the refresh machinery needs.
///
/// Implementations own the sockets, retries within one attempt, and
/// the wire codec; they should honor [`TRANSFER_TIMEOUT`] per attempt
/// and poll the cancellation token around blocking operations.
pub trait XfrClient: Send + Sync {
    /// Queries the primaries for the zone's current SOA serial.
    fn query_soa_serial(
        &self,
        zone: &Name,
        primaries: &[SocketAddr],
        cancel: &CancelToken,
    ) -> Result<Serial, ClientError>;

    /// Requests a full zone transfer.
    fn request_axfr(
        &self,
        zone: &Name,
        primaries: &[SocketAddr],
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ClientError>;

    /// Requests an incremental transfer from `serial`. Servers may
    /// answer with a full transfer; callers must inspect the stream.
    fn request_ixfr(
        &self,
        zone: &Name,
        serial: Serial,
        primaries: &[SocketAddr],
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ClientError>;

    /// Fetches the NS records (and their addresses) of a zone, for
    /// stub zone refresh.
    fn fetch_stub(
        &self,
        zone: &Name,
        primaries: &[SocketAddr],
        cancel: &CancelToken,
    ) -> Result<Vec<Record>, ClientError>;
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::class::Class;
    use crate::rr::helpers::SoaFields;
    use crate::rr::{RdataBuf, Ttl};
    use crate::zone::ApexZone;

    const APEX: &str = "example.com.";

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn soa_record(serial: u32) -> Record {
        let fields = SoaFields {
            mname: "ns1.example.com.".parse().unwrap(),
            rname: "hostmaster.example.com.".parse().unwrap(),
            serial: Serial::from(serial),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        Record::new(
            boxed_name(APEX),
            Type::SOA,
            Class::IN,
            Ttl::from(3600),
            fields.to_rdata(),
        )
    }

    fn a_record(owner: &str, octets: [u8; 4]) -> Record {
        Record::new(
            boxed_name(owner),
            Type::A,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(&octets[..]).unwrap(),
        )
    }

    fn ns_record(owner: &str, target: &str) -> Record {
        Record::new(
            boxed_name(owner),
            Type::NS,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(boxed_name(target).wire_repr()).unwrap(),
        )
    }

    fn put_record(tree: &ZoneTree, record: &Record) {
        let node = tree.get_or_add(&record.owner);
        let mut rrset = match node.rrset(record.rr_type) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(record.rr_type, record.ttl),
        };
        rrset
            .insert(record.ttl, record.rdata.clone(), record.info.clone())
            .unwrap();
        node.put_rrset(rrset);
    }

    fn new_primary(tree: &ZoneTree, serial: u32) -> ApexMatch {
        let apex_name = boxed_name(APEX);
        let node = tree.get_or_add(&apex_name);
        let zone = Arc::new(ApexZone::new_primary(apex_name));
        node.set_apex(zone.clone());
        put_record(tree, &soa_record(serial));
        ApexMatch { zone, node }
    }

    fn new_secondary(tree: &ZoneTree, serial: u32) -> ApexMatch {
        let apex_name = boxed_name(APEX);
        let node = tree.get_or_add(&apex_name);
        let zone = Arc::new(ApexZone::new_secondary(apex_name, Vec::new()));
        node.set_apex(zone.clone());
        put_record(tree, &soa_record(serial));
        ApexMatch { zone, node }
    }

    /// Collects a zone's records as an order-insensitive set of
    /// `(owner, type, ttl, rdata)` strings.
    fn record_set(tree: &ZoneTree, apex: &ApexMatch) -> BTreeSet<String> {
        axfr_records(tree, apex)
            .iter()
            .map(|record| {
                format!(
                    "{} {} {} {:?}",
                    record.owner, record.ttl, record.rr_type, record.rdata,
                )
            })
            .collect()
    }

    #[test]
    fn ixfr_up_to_date_returns_a_single_soa() {
        let tree = ZoneTree::new();
        let apex = new_primary(&tree, 42);
        put_record(&tree, &a_record("www.example.com.", [192, 0, 2, 1]));

        let records = ixfr_records(&tree, &apex, Serial::from(42));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rr_type, Type::SOA);
    }

    #[test]
    fn ixfr_falls_back_to_axfr_when_the_journal_is_short() {
        let tree = ZoneTree::new();
        let apex = new_primary(&tree, 100);
        put_record(&tree, &a_record("www.example.com.", [192, 0, 2, 1]));

        let records = ixfr_records(&tree, &apex, Serial::from(50));
        assert!(records.len() >= 3);
        assert_eq!(records[0].rr_type, Type::SOA);
        assert!(records[0].same_rr(records.last().unwrap()));
        assert!(records.iter().any(|record| record.rr_type == Type::A));
    }

    #[test]
    fn axfr_emits_glue_inline_and_omits_disabled_records() {
        let tree = ZoneTree::new();
        let apex = new_primary(&tree, 1);

        let glue = a_record("ns1.sub.example.com.", [198, 51, 100, 1]);
        let mut ns = ns_record("sub.example.com.", "ns1.sub.example.com.");
        ns.info = RecordInfo::Ns(NsInfo {
            glue: vec![glue],
            ..NsInfo::default()
        });
        put_record(&tree, &ns);

        let mut disabled = a_record("off.example.com.", [192, 0, 2, 66]);
        disabled.info.set_disabled(true);
        put_record(&tree, &disabled);

        let records = axfr_records(&tree, &apex);
        let ns_index = records
            .iter()
            .position(|record| record.rr_type == Type::NS)
            .unwrap();
        // The glue address follows its NS record directly.
        assert_eq!(records[ns_index + 1].rr_type, Type::A);
        assert_eq!(
            records[ns_index + 1].owner,
            boxed_name("ns1.sub.example.com.")
        );
        // The disabled record is nowhere in the stream.
        assert!(!records
            .iter()
            .any(|record| record.owner == boxed_name("off.example.com.")));
    }

    #[test]
    fn incremental_diffs_reproduce_the_zone() {
        // Build the primary at serial 3 with a journal reaching back
        // to serial 1.
        let primary_tree = ZoneTree::new();
        let primary = new_primary(&primary_tree, 3);
        put_record(&primary_tree, &a_record("www.example.com.", [192, 0, 2, 2]));
        put_record(&primary_tree, &a_record("mail.example.com.", [192, 0, 2, 3]));
        {
            let mut journal = primary.zone.journal().unwrap().lock().unwrap();
            journal
                .append(
                    crate::zone::Sequence::new(
                        vec![soa_record(1), a_record("www.example.com.", [192, 0, 2, 1])],
                        vec![soa_record(2), a_record("www.example.com.", [192, 0, 2, 2])],
                    )
                    .unwrap(),
                )
                .unwrap();
            journal
                .append(
                    crate::zone::Sequence::new(
                        vec![soa_record(2)],
                        vec![soa_record(3), a_record("mail.example.com.", [192, 0, 2, 3])],
                    )
                    .unwrap(),
                )
                .unwrap();
        }

        // Build a secondary still at serial 1.
        let secondary_tree = ZoneTree::new();
        let secondary = new_secondary(&secondary_tree, 1);
        put_record(
            &secondary_tree,
            &a_record("www.example.com.", [192, 0, 2, 1]),
        );

        let diff = ixfr_records(&primary_tree, &primary, Serial::from(1));
        apply_ixfr(&secondary_tree, &secondary, &diff).unwrap();

        assert_eq!(
            record_set(&secondary_tree, &secondary),
            record_set(&primary_tree, &primary),
        );
        assert_eq!(secondary.node.soa_serial(), Some(Serial::from(3)));
        // The upstream's sequences were journaled.
        assert!(!secondary.zone.journal().unwrap().lock().unwrap().is_empty());
    }

    #[test]
    fn condense_cancels_deleted_and_readded_records() {
        let newest = soa_record(3);
        let transient = a_record("tmp.example.com.", [203, 0, 113, 1]);
        let kept = a_record("kept.example.com.", [203, 0, 113, 2]);
        let framed = vec![
            newest.clone(),
            // Sequence 1 -> 2: add the transient and the kept record.
            soa_record(1),
            soa_record(2),
            transient.clone(),
            kept.clone(),
            // Sequence 2 -> 3: delete the transient again.
            soa_record(2),
            transient.clone(),
            soa_record(3),
            newest.clone(),
        ];

        let condensed = condense(framed, &boxed_name(APEX));
        // Layout: newest, first deleted SOA, deletions..., last added
        // SOA, additions..., newest.
        assert!(condensed[0].same_rr(&newest));
        assert_eq!(soa_serial_of(&condensed[1]).unwrap(), Serial::from(1));
        // The transient record cancelled out entirely.
        assert!(!condensed
            .iter()
            .any(|record| record.same_rr(&transient)));
        assert!(condensed.iter().any(|record| record.same_rr(&kept)));
        assert!(condensed.last().unwrap().same_rr(&newest));
    }

    #[test]
    fn apply_axfr_validates_framing() {
        let tree = ZoneTree::new();
        let apex = new_secondary(&tree, 1);

        assert_eq!(
            apply_axfr(&tree, &apex, &[soa_record(2)]),
            Err(Error::BadFraming),
        );
        assert_eq!(
            apply_axfr(
                &tree,
                &apex,
                &[soa_record(2), a_record("www.example.com.", [1, 2, 3, 4])],
            ),
            Err(Error::BadFraming),
        );

        let mut wrong_owner = soa_record(2);
        wrong_owner.owner = boxed_name("other.com.");
        assert_eq!(
            apply_axfr(&tree, &apex, &[wrong_owner.clone(), wrong_owner]),
            Err(Error::WrongOwner),
        );
    }

    #[test]
    fn apply_ixfr_rejects_serial_mismatches() {
        let tree = ZoneTree::new();
        let apex = new_secondary(&tree, 5);

        let diff = vec![
            soa_record(3),
            soa_record(2),
            soa_record(3),
            a_record("www.example.com.", [192, 0, 2, 1]),
            soa_record(3),
        ];
        assert_eq!(
            apply_ixfr(&tree, &apex, &diff),
            Err(Error::SerialMismatch {
                expected: Serial::from(5),
                actual: Serial::from(2),
            }),
        );
    }

    #[test]
    fn apply_axfr_reattaches_glue_and_preserves_tags() {
        let tree = ZoneTree::new();
        let apex = new_secondary(&tree, 1);

        // The existing record carries a disabled flag that must
        // survive the sync.
        let mut existing = a_record("www.example.com.", [192, 0, 2, 1]);
        existing.info.set_disabled(true);
        put_record(&tree, &existing);

        let stream = vec![
            soa_record(2),
            a_record("www.example.com.", [192, 0, 2, 1]),
            ns_record("sub.example.com.", "ns1.sub.example.com."),
            a_record("ns1.sub.example.com.", [198, 51, 100, 1]),
            soa_record(2),
        ];
        apply_axfr(&tree, &apex, &stream).unwrap();

        // The glue became an attachment of the NS record rather than a
        // queryable node.
        let cut = tree.get(&boxed_name("sub.example.com.")).unwrap();
        let ns_rrset = cut.rrset(Type::NS).unwrap();
        let (_, info) = ns_rrset.first().unwrap();
        assert_eq!(info.glue().len(), 1);
        assert!(tree.get(&boxed_name("ns1.sub.example.com.")).is_none());

        // The surviving record kept its tag.
        let www = tree.get(&boxed_name("www.example.com.")).unwrap();
        let rrset = www.rrset(Type::A).unwrap();
        let (_, info) = rrset.first().unwrap();
        assert!(info.disabled());

        // The journal history no longer applies.
        assert!(apex.zone.journal().unwrap().lock().unwrap().is_empty());
        assert_eq!(apex.node.soa_serial(), Some(Serial::from(2)));
    }
}
