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

//! NSEC/NSEC3 chain maintenance and denial-of-existence proof lookup.
//!
//! Chains are rebuilt wholesale whenever a signed zone mutates:
//! rebuilding is idempotent, and it keeps the closed-sorted-chain
//! invariant trivially true. NSEC records are stored at the names they
//! describe; NSEC3 records are stored at their hashed owner names
//! (`<base32hex>.<apex>`), as [RFC 5155] prescribes.
//!
//! [RFC 5155]: https://datatracker.ietf.org/doc/html/rfc5155

use std::convert::TryFrom;
use std::sync::Arc;

use data_encoding::BASE32HEX_NOPAD;
use log::warn;
use sha1::{Digest as _, Sha1};

use crate::class::Class;
use crate::name::{Name, NameBuilder};
use crate::rr::{Rdata, RdataBuf, Record, RecordInfo, Rrset, Ttl, Type};
use crate::tree::{ZoneNode, ZoneTree};
use crate::zone::ApexZone;

use super::{encode_type_bitmap, nsec_rdata, Signer, SignError};

////////////////////////////////////////////////////////////////////////
// NSEC3 PARAMETERS AND HASHING                                       //
////////////////////////////////////////////////////////////////////////

/// The NSEC3 hashing parameters of a zone ([RFC 5155 § 4]).
///
/// [RFC 5155 § 4]: https://datatracker.ietf.org/doc/html/rfc5155#section-4
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec3Params {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

impl Nsec3Params {
    /// SHA-1, the only hash algorithm defined for NSEC3.
    pub const ALGORITHM_SHA1: u8 = 1;

    /// Creates parameters with the given iteration count and salt.
    pub fn new(iterations: u16, salt: Vec<u8>) -> Self {
        Self {
            algorithm: Self::ALGORITHM_SHA1,
            flags: 0,
            iterations,
            salt,
        }
    }

    /// Decodes NSEC3PARAM RDATA.
    pub fn read(rdata: &Rdata) -> Option<Self> {
        let octets = rdata.octets();
        let salt_len = *octets.get(4)? as usize;
        let salt = octets.get(5..5 + salt_len)?.to_vec();
        Some(Self {
            algorithm: octets[0],
            flags: octets[1],
            iterations: u16::from_be_bytes(octets[2..4].try_into().unwrap()),
            salt,
        })
    }

    /// Encodes these parameters as NSEC3PARAM RDATA.
    pub fn to_rdata(&self) -> RdataBuf {
        let mut buf = Vec::with_capacity(5 + self.salt.len());
        buf.push(self.algorithm);
        buf.push(self.flags);
        buf.extend_from_slice(&self.iterations.to_be_bytes());
        buf.push(self.salt.len() as u8);
        buf.extend_from_slice(&self.salt);
        RdataBuf::try_from(buf).unwrap()
    }
}

/// Computes the NSEC3 hash of a name: iterated SHA-1 over the canonical
/// (lowercase) wire form and the salt ([RFC 5155 § 5]).
///
/// [RFC 5155 § 5]: https://datatracker.ietf.org/doc/html/rfc5155#section-5
pub fn nsec3_hash_name(name: &Name, params: &Nsec3Params) -> Vec<u8> {
    let mut lowered = name.to_owned();
    lowered.make_ascii_lowercase();

    let mut hasher = Sha1::new();
    hasher.update(lowered.wire_repr());
    hasher.update(&params.salt);
    let mut digest = hasher.finalize();
    for _ in 0..params.iterations {
        let mut hasher = Sha1::new();
        hasher.update(&digest);
        hasher.update(&params.salt);
        digest = hasher.finalize();
    }
    digest.to_vec()
}

/// Builds the hashed owner name `<base32hex(hash)>.<apex>`, or `None`
/// when prepending the 32-character hash label would push the name
/// past the wire-length limit (possible for a sufficiently long apex).
fn nsec3_owner(apex: &Name, hash: &[u8]) -> Option<Box<Name>> {
    let label = BASE32HEX_NOPAD.encode(hash).to_ascii_lowercase();
    let mut builder = NameBuilder::new();
    builder.try_push_slice(label.as_bytes()).ok()?;
    builder.finish_with_suffix(apex).ok()
}

////////////////////////////////////////////////////////////////////////
// CHAIN CONSTRUCTION                                                 //
////////////////////////////////////////////////////////////////////////

/// One name participating in a denial chain: the node, and whether the
/// zone's records at that node live in the parent-side slot (which is
/// the case at a cut hosting a child zone).
struct ChainEntry {
    node: Arc<ZoneNode>,
    parent_slot: bool,
}

impl ChainEntry {
    fn rrset(&self, rr_type: Type) -> Option<Arc<Rrset>> {
        if self.parent_slot {
            self.node.parent_rrset(rr_type)
        } else {
            self.node.rrset(rr_type)
        }
    }

    fn put_rrset(&self, rrset: Rrset) {
        if self.parent_slot {
            self.node.put_parent_rrset(rrset);
        } else {
            self.node.put_rrset(rrset);
        }
    }

    fn remove_rrset(&self, rr_type: Type) {
        if self.parent_slot {
            self.node.remove_parent_rrset(rr_type);
        } else {
            self.node.remove_rrset(rr_type);
        }
    }

    /// The types present at this name, for the NSEC/NSEC3 bitmap.
    fn bitmap_types(&self, extra: &[Type]) -> Vec<Type> {
        let rrsets = if self.parent_slot {
            self.node.parent_rrsets()
        } else {
            self.node.rrsets()
        };
        let mut types: Vec<Type> = rrsets
            .iter()
            .filter(|rrset| rrset.has_active())
            .map(|rrset| rrset.rr_type)
            .collect();
        types.extend_from_slice(extra);
        types
    }

    fn has_data(&self) -> bool {
        let rrsets = if self.parent_slot {
            self.node.parent_rrsets()
        } else {
            self.node.rrsets()
        };
        rrsets.iter().any(|rrset| rrset.has_active())
    }
}

/// Collects the chain entries of the zone rooted at `apex_node`, in
/// canonical name order.
fn chain_entries(tree: &ZoneTree, apex_node: &Arc<ZoneNode>) -> Vec<ChainEntry> {
    tree.walk_zone(apex_node)
        .into_iter()
        .map(|node| {
            let parent_slot =
                !Arc::ptr_eq(&node, apex_node) && node.apex().is_some();
            ChainEntry { node, parent_slot }
        })
        .collect()
}

/// Removes every NSEC, NSEC3, and NSEC3PARAM record of the zone rooted
/// at `apex_node`, garbage-collecting the hashed-owner nodes NSEC3
/// chains leave behind.
pub fn strip_chain(tree: &ZoneTree, apex_node: &Arc<ZoneNode>) {
    apex_node.remove_rrset(Type::NSEC3PARAM);
    let mut hash_owners = Vec::new();
    for entry in chain_entries(tree, apex_node) {
        entry.remove_rrset(Type::NSEC);
        if entry.rrset(Type::NSEC3).is_some() {
            entry.remove_rrset(Type::NSEC3);
            hash_owners.push(entry.node.name().to_owned());
        }
    }
    for owner in hash_owners {
        tree.try_remove(&owner);
    }
}

/// Rebuilds the NSEC chain of the zone rooted at `apex_node`.
///
/// Every name owning authoritative data receives an NSEC record
/// pointing at the next such name in canonical order, with the last
/// name wrapping around to the apex. `ttl` should be the SOA MINIMUM
/// per [RFC 2308 § 4].
///
/// [RFC 2308 § 4]: https://datatracker.ietf.org/doc/html/rfc2308#section-4
pub fn rebuild_nsec_chain(tree: &ZoneTree, apex_node: &Arc<ZoneNode>, ttl: Ttl) {
    strip_chain(tree, apex_node);
    let entries: Vec<ChainEntry> = chain_entries(tree, apex_node)
        .into_iter()
        .filter(ChainEntry::has_data)
        .collect();
    if entries.is_empty() {
        return;
    }

    for (index, entry) in entries.iter().enumerate() {
        let next = entries[(index + 1) % entries.len()].node.name();
        let types = entry.bitmap_types(&[Type::NSEC, Type::RRSIG]);
        let mut rrset = Rrset::new(Type::NSEC, ttl);
        rrset
            .insert(ttl, nsec_rdata(next, &types), RecordInfo::for_type(Type::NSEC))
            .unwrap();
        entry.put_rrset(rrset);
    }
}

/// Rebuilds the NSEC3 chain of the zone rooted at `apex_node` with the
/// given parameters, and publishes the NSEC3PARAM record at the apex.
///
/// Unlike NSEC, empty non-terminals participate in NSEC3 chains
/// ([RFC 5155 § 7.1]); their records carry an empty type bitmap.
///
/// [RFC 5155 § 7.1]: https://datatracker.ietf.org/doc/html/rfc5155#section-7.1
pub fn rebuild_nsec3_chain(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    ttl: Ttl,
    params: &Nsec3Params,
) {
    strip_chain(tree, apex_node);

    // Hash every participating name. Empty non-terminals are included:
    // they exist as nodes with children but no data.
    let mut hashed: Vec<(Vec<u8>, Vec<Type>)> = chain_entries(tree, apex_node)
        .into_iter()
        .filter(|entry| entry.has_data() || entry.node.has_children())
        .map(|entry| {
            let types = if entry.has_data() {
                entry.bitmap_types(&[Type::RRSIG])
            } else {
                Vec::new()
            };
            (nsec3_hash_name(entry.node.name(), params), types)
        })
        .collect();
    hashed.sort_by(|a, b| a.0.cmp(&b.0));
    hashed.dedup_by(|a, b| a.0 == b.0);
    if hashed.is_empty() {
        return;
    }

    let apex_name = apex_node.name();
    for (index, (hash, types)) in hashed.iter().enumerate() {
        let next_hash = &hashed[(index + 1) % hashed.len()].0;

        let mut rdata = Vec::new();
        rdata.push(params.algorithm);
        rdata.push(params.flags);
        rdata.extend_from_slice(&params.iterations.to_be_bytes());
        rdata.push(params.salt.len() as u8);
        rdata.extend_from_slice(&params.salt);
        rdata.push(next_hash.len() as u8);
        rdata.extend_from_slice(next_hash);
        rdata.extend_from_slice(&encode_type_bitmap(types));

        let Some(owner) = nsec3_owner(apex_name, hash) else {
            // The apex leaves no room for hashed owner labels, so no
            // chain can be published for this zone at all.
            warn!(
                "{} is too long to carry NSEC3 owner names; no chain built",
                apex_name,
            );
            return;
        };
        let node = tree.get_or_add(&owner);
        let mut rrset = Rrset::new(Type::NSEC3, ttl);
        rrset
            .insert(
                ttl,
                RdataBuf::try_from(rdata).unwrap(),
                RecordInfo::for_type(Type::NSEC3),
            )
            .unwrap();
        node.put_rrset(rrset);
    }

    let mut param_rrset = Rrset::new(Type::NSEC3PARAM, ttl);
    param_rrset
        .insert(
            ttl,
            params.to_rdata(),
            RecordInfo::for_type(Type::NSEC3PARAM),
        )
        .unwrap();
    apex_node.put_rrset(param_rrset);
}

////////////////////////////////////////////////////////////////////////
// SIGNING                                                            //
////////////////////////////////////////////////////////////////////////

/// Re-signs every RRset of the zone rooted at `apex_node`, using the
/// zone's unretired keys through the given signer.
///
/// The DNSKEY RRset is signed by key-signing keys; everything else by
/// zone-signing keys. Existing RRSIG RRsets are replaced wholesale.
pub fn resign_zone(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    zone: &ApexZone,
    signer: &dyn Signer,
) -> Result<(), SignError> {
    let keys = match zone.keys() {
        Some(keys) => keys.lock().unwrap().clone(),
        None => Vec::new(),
    };
    let apex_name = zone.name();

    for entry in chain_entries(tree, apex_node) {
        entry.remove_rrset(Type::RRSIG);
        let rrsets = if entry.parent_slot {
            entry.node.parent_rrsets()
        } else {
            entry.node.rrsets()
        };

        let mut rrsig = Rrset::new(Type::RRSIG, Ttl::from(0));
        let mut rrsig_ttl = None;
        for rrset in rrsets {
            if rrset.rr_type == Type::RRSIG || !rrset.has_active() {
                continue;
            }
            // The DNSKEY RRset is signed by the key-signing keys;
            // every other RRset by the zone-signing keys.
            let want_ksk = rrset.rr_type == Type::DNSKEY;
            for key in keys
                .iter()
                .filter(|key| !key.retired && key.is_ksk() == want_ksk)
            {
                let rdata = signer.sign_rrset(key, entry.node.name(), apex_name, &rrset)?;
                let ttl = *rrsig_ttl.get_or_insert(rrset.ttl());
                rrsig
                    .insert(ttl, rdata, RecordInfo::for_type(Type::RRSIG))
                    .ok();
            }
        }
        if !rrsig.is_empty() {
            entry.put_rrset(rrsig);
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// PROOF LOOKUP                                                       //
////////////////////////////////////////////////////////////////////////

/// Materializes the NSEC (or NSEC3) RRset at a chain entry together
/// with its covering RRSIGs.
fn denial_records(entry: &ChainEntry, rr_type: Type, class: Class) -> Vec<Record> {
    let mut records = Vec::new();
    if let Some(rrset) = entry.rrset(rr_type) {
        records.extend(rrset.to_active_records(entry.node.name(), class));
        if let Some(rrsigs) = entry.rrset(Type::RRSIG) {
            records.extend(
                rrsigs
                    .iter_active()
                    .filter(|(rdata, _)| super::rrsig_type_covered(rdata) == Some(rr_type))
                    .map(|(rdata, info)| {
                        Record::with_info(
                            entry.node.name().to_owned(),
                            Type::RRSIG,
                            class,
                            rrsigs.ttl(),
                            rdata.to_owned(),
                            info.clone(),
                        )
                    }),
            );
        }
    }
    records
}

/// Finds the chain entry whose NSEC record covers `name`: the entry
/// with the greatest owner canonically no greater than `name`, wrapping
/// to the last entry when `name` precedes the whole chain.
fn covering_nsec_entry<'e>(entries: &'e [ChainEntry], name: &Name) -> Option<&'e ChainEntry> {
    let with_nsec: Vec<&ChainEntry> = entries
        .iter()
        .filter(|entry| entry.rrset(Type::NSEC).is_some())
        .collect();
    if with_nsec.is_empty() {
        return None;
    }
    with_nsec
        .iter()
        .rev()
        .find(|entry| entry.node.name() <= name)
        .copied()
        .or_else(|| with_nsec.last().copied())
}

/// Returns the NSEC records (plus RRSIGs) proving that `qname` does not
/// exist: the NSEC covering `qname` and the NSEC covering the wildcard
/// at the closest encloser ([RFC 4035 § 3.1.3.2]).
///
/// [RFC 4035 § 3.1.3.2]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.3.2
pub fn nsec_proof_of_nxdomain(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
    class: Class,
) -> Vec<Record> {
    let entries = chain_entries(tree, apex_node);
    let mut records = Vec::new();

    let covering = covering_nsec_entry(&entries, qname);
    if let Some(entry) = covering {
        records.extend(denial_records(entry, Type::NSEC, class));
    }

    if let Some(wildcard) = closest_encloser(tree, apex_node, qname)
        .as_deref()
        .and_then(wildcard_of)
    {
        if let Some(entry) = covering_nsec_entry(&entries, &wildcard) {
            let duplicate = covering
                .map(|c| Arc::ptr_eq(&c.node, &entry.node))
                .unwrap_or(false);
            if !duplicate {
                records.extend(denial_records(entry, Type::NSEC, class));
            }
        }
    }
    records
}

/// Returns the NSEC record (plus RRSIGs) at `node` proving that the
/// queried type does not exist there.
pub fn nsec_proof_of_nodata(node: &Arc<ZoneNode>, class: Class) -> Vec<Record> {
    // A cut hosting a child zone keeps the parent's denial records in
    // the parent-side slot.
    let parent_slot = node.rrset(Type::NSEC).is_none() && node.parent_rrset(Type::NSEC).is_some();
    let entry = ChainEntry {
        node: node.clone(),
        parent_slot,
    };
    denial_records(&entry, Type::NSEC, class)
}

/// Returns the NSEC record (plus RRSIGs) proving that a wildcard
/// expansion for `qname` was legitimate, i.e. that no closer name
/// exists ([RFC 4035 § 3.1.3.3]).
///
/// [RFC 4035 § 3.1.3.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.3.3
pub fn nsec_proof_of_wildcard(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
    class: Class,
) -> Vec<Record> {
    let entries = chain_entries(tree, apex_node);
    covering_nsec_entry(&entries, qname)
        .map(|entry| denial_records(entry, Type::NSEC, class))
        .unwrap_or_default()
}

/// The deepest existing ancestor of `qname` within the zone.
fn closest_encloser(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
) -> Option<Box<Name>> {
    let apex_name = apex_node.name();
    let mut skip = 1;
    while skip < qname.len() {
        let candidate = qname.superdomain(skip)?;
        if !candidate.eq_or_subdomain_of(apex_name) {
            return Some(apex_name.to_owned());
        }
        if tree.get(&candidate).is_some() {
            return Some(candidate);
        }
        skip += 1;
    }
    Some(apex_name.to_owned())
}

/// Builds `*.<name>`, or `None` when the name is already at the
/// wire-length limit. In that case no wildcard can exist there either,
/// so proofs may simply omit the wildcard denial.
fn wildcard_of(name: &Name) -> Option<Box<Name>> {
    let mut builder = NameBuilder::new();
    builder.try_push(b'*').ok()?;
    builder.finish_with_suffix(name).ok()
}

////////////////////////////////////////////////////////////////////////
// NSEC3 PROOF LOOKUP                                                 //
////////////////////////////////////////////////////////////////////////

/// A zone's NSEC3 entries, keyed by the hash decoded from the owner's
/// first label, sorted by hash.
fn nsec3_entries(tree: &ZoneTree, apex_node: &Arc<ZoneNode>) -> Vec<(Vec<u8>, ChainEntry)> {
    let mut entries: Vec<(Vec<u8>, ChainEntry)> = chain_entries(tree, apex_node)
        .into_iter()
        .filter(|entry| entry.rrset(Type::NSEC3).is_some())
        .filter_map(|entry| {
            let label = entry.node.name()[0].octets().to_ascii_uppercase();
            BASE32HEX_NOPAD
                .decode(&label)
                .ok()
                .map(|hash| (hash, entry))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Finds the NSEC3 entry matching `hash` exactly.
fn matching_nsec3<'e>(
    entries: &'e [(Vec<u8>, ChainEntry)],
    hash: &[u8],
) -> Option<&'e ChainEntry> {
    entries
        .iter()
        .find(|(entry_hash, _)| entry_hash.as_slice() == hash)
        .map(|(_, entry)| entry)
}

/// Finds the NSEC3 entry covering `hash`: the entry with the greatest
/// hash no greater than `hash`, wrapping around.
fn covering_nsec3<'e>(
    entries: &'e [(Vec<u8>, ChainEntry)],
    hash: &[u8],
) -> Option<&'e ChainEntry> {
    entries
        .iter()
        .rev()
        .find(|(entry_hash, _)| entry_hash.as_slice() <= hash)
        .or_else(|| entries.last())
        .map(|(_, entry)| entry)
}

/// Returns the NSEC3 records (plus RRSIGs) proving that `qname` does
/// not exist: the closest-encloser proof of [RFC 5155 § 7.2.1]: an
/// NSEC3 matching the closest encloser, one covering the next-closer
/// name, and one covering the wildcard at the closest encloser.
///
/// [RFC 5155 § 7.2.1]: https://datatracker.ietf.org/doc/html/rfc5155#section-7.2.1
pub fn nsec3_proof_of_nxdomain(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
    class: Class,
    params: &Nsec3Params,
) -> Vec<Record> {
    let entries = nsec3_entries(tree, apex_node);
    let Some(closest) = closest_encloser(tree, apex_node, qname) else {
        return Vec::new();
    };

    let mut picked: Vec<&ChainEntry> = Vec::new();
    if let Some(entry) = matching_nsec3(&entries, &nsec3_hash_name(&closest, params)) {
        picked.push(entry);
    }
    if let Some(next_closer) = next_closer(qname, &closest) {
        if let Some(entry) = covering_nsec3(&entries, &nsec3_hash_name(&next_closer, params)) {
            picked.push(entry);
        }
    }
    if let Some(wildcard) = wildcard_of(&closest) {
        if let Some(entry) = covering_nsec3(&entries, &nsec3_hash_name(&wildcard, params)) {
            picked.push(entry);
        }
    }

    collect_unique(picked, Type::NSEC3, class)
}

/// Returns the NSEC3 record (plus RRSIGs) matching `qname`, proving
/// that the queried type does not exist there.
pub fn nsec3_proof_of_nodata(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
    class: Class,
    params: &Nsec3Params,
) -> Vec<Record> {
    let entries = nsec3_entries(tree, apex_node);
    matching_nsec3(&entries, &nsec3_hash_name(qname, params))
        .map(|entry| denial_records(entry, Type::NSEC3, class))
        .unwrap_or_default()
}

/// Returns the NSEC3 records (plus RRSIGs) proving that a wildcard
/// expansion for `qname` was legitimate: the closest-encloser proof
/// without the wildcard denial ([RFC 5155 § 7.2.6]).
///
/// [RFC 5155 § 7.2.6]: https://datatracker.ietf.org/doc/html/rfc5155#section-7.2.6
pub fn nsec3_proof_of_wildcard(
    tree: &ZoneTree,
    apex_node: &Arc<ZoneNode>,
    qname: &Name,
    class: Class,
    params: &Nsec3Params,
) -> Vec<Record> {
    let entries = nsec3_entries(tree, apex_node);
    let Some(closest) = closest_encloser(tree, apex_node, qname) else {
        return Vec::new();
    };

    let mut picked: Vec<&ChainEntry> = Vec::new();
    if let Some(entry) = matching_nsec3(&entries, &nsec3_hash_name(&closest, params)) {
        picked.push(entry);
    }
    if let Some(next_closer) = next_closer(qname, &closest) {
        if let Some(entry) = covering_nsec3(&entries, &nsec3_hash_name(&next_closer, params)) {
            picked.push(entry);
        }
    }
    collect_unique(picked, Type::NSEC3, class)
}

/// The next-closer name: the name one label longer than the closest
/// encloser on the path to `qname` ([RFC 5155 § 1.3]).
///
/// [RFC 5155 § 1.3]: https://datatracker.ietf.org/doc/html/rfc5155#section-1.3
fn next_closer(qname: &Name, closest: &Name) -> Option<Box<Name>> {
    if qname.len() <= closest.len() {
        return None;
    }
    qname.superdomain(qname.len() - closest.len() - 1)
}

fn collect_unique(picked: Vec<&ChainEntry>, rr_type: Type, class: Class) -> Vec<Record> {
    let mut seen: Vec<*const ZoneNode> = Vec::new();
    let mut records = Vec::new();
    for entry in picked {
        let ptr = Arc::as_ptr(&entry.node);
        if seen.contains(&ptr) {
            continue;
        }
        seen.push(ptr);
        records.extend(denial_records(entry, rr_type, class));
    }
    records
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::Ttl;

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn add_rrset(tree: &ZoneTree, owner: &str, rr_type: Type, rdata: &[u8]) {
        let node = tree.get_or_add(&boxed_name(owner));
        let mut rrset = Rrset::new(rr_type, Ttl::from(3600));
        rrset
            .insert(
                Ttl::from(3600),
                RdataBuf::try_from(rdata).unwrap(),
                RecordInfo::for_type(rr_type),
            )
            .unwrap();
        node.put_rrset(rrset);
    }

    fn signed_tree() -> (ZoneTree, Arc<ZoneNode>) {
        let tree = ZoneTree::new();
        let apex_name = boxed_name("example.test.");
        add_rrset(&tree, "example.test.", Type::TXT, b"\x04apex");
        add_rrset(&tree, "alpha.example.test.", Type::A, &[192, 0, 2, 1]);
        add_rrset(&tree, "omega.example.test.", Type::A, &[192, 0, 2, 2]);
        let apex_node = tree.get(&apex_name).unwrap();
        apex_node.set_apex(Arc::new(ApexZone::new_primary(apex_name)));
        (tree, apex_node)
    }

    #[test]
    fn nsec_chain_is_closed_and_sorted() {
        let (tree, apex_node) = signed_tree();
        rebuild_nsec_chain(&tree, &apex_node, Ttl::from(3600));

        let expect_link = |owner: &str, next: &str| {
            let node = tree.get(&boxed_name(owner)).unwrap();
            let rrset = node.rrset(Type::NSEC).unwrap();
            let (rdata, _) = rrset.first().unwrap();
            assert_eq!(
                super::super::nsec_next_name(rdata).unwrap(),
                boxed_name(next),
            );
        };
        expect_link("example.test.", "alpha.example.test.");
        expect_link("alpha.example.test.", "omega.example.test.");
        expect_link("omega.example.test.", "example.test.");
    }

    #[test]
    fn nxdomain_proof_covers_the_hole() {
        let (tree, apex_node) = signed_tree();
        rebuild_nsec_chain(&tree, &apex_node, Ttl::from(3600));

        // "beta" sorts between "alpha" and "omega", so the covering
        // NSEC is the one at alpha. The wildcard *.example.test. sorts
        // before alpha, so the apex NSEC covers it.
        let proof = nsec_proof_of_nxdomain(
            &tree,
            &apex_node,
            &boxed_name("beta.example.test."),
            Class::IN,
        );
        let owners: Vec<String> = proof.iter().map(|r| r.owner.to_string()).collect();
        assert!(owners.contains(&"alpha.example.test.".to_string()));
        assert!(owners.contains(&"example.test.".to_string()));
    }

    #[test]
    fn rebuilding_twice_is_idempotent() {
        let (tree, apex_node) = signed_tree();
        rebuild_nsec_chain(&tree, &apex_node, Ttl::from(3600));
        rebuild_nsec_chain(&tree, &apex_node, Ttl::from(3600));

        let node = tree.get(&boxed_name("alpha.example.test.")).unwrap();
        let rrset = node.rrset(Type::NSEC).unwrap();
        assert_eq!(rrset.len(), 1);
        // The second rebuild must not have linked the chain through
        // NSEC records of the first.
        let (rdata, _) = rrset.first().unwrap();
        let types = super::super::decode_type_bitmap(
            &rdata.octets()[Name::validate_uncompressed(rdata.octets()).unwrap()..],
        )
        .unwrap();
        assert_eq!(types, [Type::A, Type::NSEC, Type::RRSIG]);
    }

    #[test]
    fn nsec3_chain_hashes_every_name() {
        let (tree, apex_node) = signed_tree();
        let params = Nsec3Params::new(1, vec![0xab, 0xcd]);
        rebuild_nsec3_chain(&tree, &apex_node, Ttl::from(3600), &params);

        // The apex now carries NSEC3PARAM, and three hashed owners
        // exist under the apex.
        assert!(apex_node.rrset(Type::NSEC3PARAM).is_some());
        let hashed = nsec3_entries(&tree, &apex_node);
        assert_eq!(hashed.len(), 3);
        // Hashes are sorted and the chain wraps.
        assert!(hashed.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn nsec3_nodata_proof_matches_the_qname_hash() {
        let (tree, apex_node) = signed_tree();
        let params = Nsec3Params::new(0, Vec::new());
        rebuild_nsec3_chain(&tree, &apex_node, Ttl::from(3600), &params);

        let proof = nsec3_proof_of_nodata(
            &tree,
            &apex_node,
            &boxed_name("alpha.example.test."),
            Class::IN,
            &params,
        );
        assert_eq!(proof.len(), 1);
        let expected_hash = nsec3_hash_name(&boxed_name("alpha.example.test."), &params);
        let expected_owner = nsec3_owner(apex_node.name(), &expected_hash).unwrap();
        assert_eq!(proof[0].owner, expected_owner);
    }

    #[test]
    fn wildcard_of_respects_the_length_limit() {
        assert_eq!(
            wildcard_of(&boxed_name("example.test.")).unwrap(),
            boxed_name("*.example.test."),
        );

        // A name at 254 wire octets has no room left for the asterisk
        // label.
        let label = "x".repeat(63);
        let at_limit: Box<Name> = format!("{0}.{0}.{0}.{1}.", label, "y".repeat(60))
            .parse()
            .unwrap();
        assert!(wildcard_of(&at_limit).is_none());
    }

    #[test]
    fn nsec3_chain_is_skipped_when_hashed_owners_cannot_fit() {
        let label = "x".repeat(63);
        let apex_name: Box<Name> = format!("{0}.{0}.{0}.{1}.", label, "y".repeat(60))
            .parse()
            .unwrap();
        let tree = ZoneTree::new();
        add_rrset(&tree, &apex_name.to_string(), Type::TXT, b"\x04apex");
        let apex_node = tree.get(&apex_name).unwrap();
        apex_node.set_apex(Arc::new(ApexZone::new_primary(apex_name)));

        // The 32-character hash label cannot be prepended to this
        // apex, so the rebuild backs out instead of panicking.
        let params = Nsec3Params::new(0, Vec::new());
        rebuild_nsec3_chain(&tree, &apex_node, Ttl::from(3600), &params);
        assert!(nsec3_entries(&tree, &apex_node).is_empty());
        assert!(apex_node.rrset(Type::NSEC3PARAM).is_none());
    }

    #[test]
    fn strip_chain_removes_everything() {
        let (tree, apex_node) = signed_tree();
        let params = Nsec3Params::new(0, Vec::new());
        rebuild_nsec3_chain(&tree, &apex_node, Ttl::from(3600), &params);
        strip_chain(&tree, &apex_node);

        assert!(apex_node.rrset(Type::NSEC3PARAM).is_none());
        assert!(nsec3_entries(&tree, &apex_node).is_empty());
        // The hashed-owner nodes were garbage-collected.
        assert_eq!(tree.walk_zone(&apex_node).len(), 3);
    }
}
