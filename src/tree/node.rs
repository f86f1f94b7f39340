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

//! Implementation of the [`ZoneNode`] structure.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::class::Class;
use crate::dnssec;
use crate::name::{Label, LabelBuf, Name};
use crate::rr::{helpers::SoaFields, Record, Rrset, Serial, Type};
use crate::zone::ApexZone;

/// A node in the namespace tree.
///
/// A node carries two record slots. The child-side slot (`records`)
/// holds the node's records as part of the deepest zone the node
/// belongs to; for a node hosting a zone apex, these are the apex
/// records of that zone. The parent-side slot holds the enclosing
/// zone's delegation records (NS, DS) at nodes where a hosted child
/// zone begins; it is empty everywhere else. Queries use the child
/// side, except DS queries at a zone cut, which by definition must be
/// answered from the parent ([RFC 4035 § 3.1.4.1]).
///
/// Locking is per-node and per-slot: RRsets are `Arc`-shared and
/// replaced wholesale on write, so readers never observe a partially
/// modified RRset and never block one another.
///
/// [RFC 4035 § 3.1.4.1]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.4.1
#[derive(Debug)]
pub struct ZoneNode {
    name: Box<Name>,
    children: RwLock<HashMap<LabelBuf, Arc<ZoneNode>>>,
    records: RwLock<BTreeMap<Type, Arc<Rrset>>>,
    parent_side: RwLock<BTreeMap<Type, Arc<Rrset>>>,
    apex: RwLock<Option<Arc<ApexZone>>>,
}

impl ZoneNode {
    /// Creates a new node with the given name and no records,
    /// children, or hosted apex.
    pub(super) fn new(name: Box<Name>) -> Self {
        Self {
            name,
            children: RwLock::new(HashMap::new()),
            records: RwLock::new(BTreeMap::new()),
            parent_side: RwLock::new(BTreeMap::new()),
            apex: RwLock::new(None),
        }
    }

    /// Returns the node's domain name.
    pub fn name(&self) -> &Name {
        &self.name
    }
}

/// Child management.
impl ZoneNode {
    /// Returns the child with the given label, if present.
    pub fn child(&self, label: &Label) -> Option<Arc<ZoneNode>> {
        self.children.read().unwrap().get(label).cloned()
    }

    /// Returns whether the node has any children.
    pub fn has_children(&self) -> bool {
        !self.children.read().unwrap().is_empty()
    }

    /// Returns the node's children sorted by label in DNSSEC canonical
    /// order. Pre-order traversal with this ordering yields the zone's
    /// names in canonical order.
    pub fn sorted_children(&self) -> Vec<Arc<ZoneNode>> {
        let mut children: Vec<Arc<ZoneNode>> =
            self.children.read().unwrap().values().cloned().collect();
        children.sort_by(|a, b| a.name[0].cmp(&b.name[0]));
        children
    }

    /// Gets or creates the child with the given label. `child_name`
    /// must be this node's name with `label` prepended.
    pub(super) fn get_or_create_child(&self, label: &Label, child_name: &Name) -> Arc<ZoneNode> {
        if let Some(child) = self.child(label) {
            return child;
        }
        let mut children = self.children.write().unwrap();
        children
            .entry(label.to_owned())
            .or_insert_with(|| Arc::new(ZoneNode::new(child_name.to_owned())))
            .clone()
    }

    /// Removes the child with the given label.
    pub(super) fn remove_child(&self, label: &Label) {
        self.children.write().unwrap().remove(label);
    }

    /// Returns whether the node holds nothing: no records in either
    /// slot, no children, and no hosted apex. Unused nodes are
    /// garbage-collected by [`ZoneTree::try_remove`](super::ZoneTree).
    pub fn is_unused(&self) -> bool {
        self.records.read().unwrap().is_empty()
            && self.parent_side.read().unwrap().is_empty()
            && !self.has_children()
            && self.apex.read().unwrap().is_none()
    }
}

/// Hosted apex management.
impl ZoneNode {
    /// Returns the apex zone hosted at this node, if any.
    pub fn apex(&self) -> Option<Arc<ApexZone>> {
        self.apex.read().unwrap().clone()
    }

    /// Installs a hosted apex zone at this node.
    pub fn set_apex(&self, zone: Arc<ApexZone>) {
        *self.apex.write().unwrap() = Some(zone);
    }

    /// Removes the hosted apex zone from this node.
    pub fn clear_apex(&self) {
        *self.apex.write().unwrap() = None;
    }
}

/// Child-side record access.
impl ZoneNode {
    /// Returns the RRset of the given type, if present.
    pub fn rrset(&self, rr_type: Type) -> Option<Arc<Rrset>> {
        self.records.read().unwrap().get(&rr_type).cloned()
    }

    /// Installs or replaces an RRset. An empty RRset removes the entry
    /// instead.
    pub fn put_rrset(&self, rrset: Rrset) {
        let mut records = self.records.write().unwrap();
        if rrset.is_empty() {
            records.remove(&rrset.rr_type);
        } else {
            records.insert(rrset.rr_type, Arc::new(rrset));
        }
    }

    /// Removes the RRset of the given type.
    pub fn remove_rrset(&self, rr_type: Type) -> Option<Arc<Rrset>> {
        self.records.write().unwrap().remove(&rr_type)
    }

    /// Atomically modifies the RRset of the given type through `f`,
    /// replacing the published RRset with the modified copy (or
    /// removing it if the copy ends up empty). Returns `false` if no
    /// RRset of that type exists.
    pub fn update_rrset(&self, rr_type: Type, f: impl FnOnce(&mut Rrset)) -> bool {
        let mut records = self.records.write().unwrap();
        let Some(existing) = records.get(&rr_type).cloned() else {
            return false;
        };
        let mut modified = (*existing).clone();
        f(&mut modified);
        if modified.is_empty() {
            records.remove(&rr_type);
        } else {
            records.insert(rr_type, Arc::new(modified));
        }
        true
    }

    /// Returns every RRset at the node, ordered by type.
    pub fn rrsets(&self) -> Vec<Arc<Rrset>> {
        self.records.read().unwrap().values().cloned().collect()
    }

    /// Removes every child-side RRset.
    pub fn clear_rrsets(&self) {
        self.records.write().unwrap().clear();
    }

    /// Returns whether the node owns an RRset of the given type with at
    /// least one enabled record.
    pub fn has_active_rrset(&self, rr_type: Type) -> bool {
        self.rrset(rr_type).map_or(false, |rrset| rrset.has_active())
    }
}

/// Parent-side record access (populated only at hosted zone cuts).
impl ZoneNode {
    /// Returns the parent-side RRset of the given type, if present.
    pub fn parent_rrset(&self, rr_type: Type) -> Option<Arc<Rrset>> {
        self.parent_side.read().unwrap().get(&rr_type).cloned()
    }

    /// Installs or replaces a parent-side RRset.
    pub fn put_parent_rrset(&self, rrset: Rrset) {
        let mut records = self.parent_side.write().unwrap();
        if rrset.is_empty() {
            records.remove(&rrset.rr_type);
        } else {
            records.insert(rrset.rr_type, Arc::new(rrset));
        }
    }

    /// Removes the parent-side RRset of the given type.
    pub fn remove_parent_rrset(&self, rr_type: Type) -> Option<Arc<Rrset>> {
        self.parent_side.write().unwrap().remove(&rr_type)
    }

    /// Returns every parent-side RRset at the node, ordered by type.
    pub fn parent_rrsets(&self) -> Vec<Arc<Rrset>> {
        self.parent_side.read().unwrap().values().cloned().collect()
    }

    /// Returns the record slot a zone walk should read at this node:
    /// the parent side when the walk crosses into a hosted child zone,
    /// the child side otherwise.
    pub fn walk_rrsets(&self, at_walked_apex: bool) -> Vec<Arc<Rrset>> {
        if !at_walked_apex && self.apex().is_some() {
            self.parent_rrsets()
        } else {
            self.rrsets()
        }
    }
}

/// Record materialization.
impl ZoneNode {
    /// Materializes the records of the given type, including disabled
    /// records.
    pub fn records(&self, rr_type: Type, class: Class) -> Vec<Record> {
        self.rrset(rr_type)
            .map(|rrset| rrset.to_records(&self.name, class))
            .unwrap_or_default()
    }

    /// Materializes the enabled records of the given type.
    pub fn active_records(&self, rr_type: Type, class: Class) -> Vec<Record> {
        self.rrset(rr_type)
            .map(|rrset| rrset.to_active_records(&self.name, class))
            .unwrap_or_default()
    }

    /// Materializes the enabled RRSIG records covering the given type.
    pub fn rrsig_records_covering(&self, covered: Type, class: Class) -> Vec<Record> {
        let Some(rrset) = self.rrset(Type::RRSIG) else {
            return Vec::new();
        };
        rrset
            .iter_active()
            .filter(|(rdata, _)| dnssec::rrsig_type_covered(rdata) == Some(covered))
            .map(|(rdata, info)| {
                Record::with_info(
                    self.name.clone(),
                    Type::RRSIG,
                    class,
                    rrset.ttl(),
                    rdata.to_owned(),
                    info.clone(),
                )
            })
            .collect()
    }

    /// Reads the node's SOA record fields, if an SOA record is present.
    pub fn soa_fields(&self) -> Option<SoaFields> {
        let rrset = self.rrset(Type::SOA)?;
        let (rdata, _) = rrset.first()?;
        SoaFields::read(rdata)
    }

    /// Reads the node's SOA serial, if an SOA record is present.
    pub fn soa_serial(&self) -> Option<Serial> {
        self.soa_fields().map(|soa| soa.serial)
    }
}
