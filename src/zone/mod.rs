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

//! Apex zone variants and their administrative state.
//!
//! An [`ApexZone`] is the control block of one hosted zone: its
//! metadata (disabled flag, DNSSEC status, transfer/notify/update
//! policies, last-modified time) plus per-variant state. The actual
//! records live in the zone tree; the apex object is what the catalog
//! indexes and what policy decisions consult.
//!
//! The four variants share one capability surface (querying records
//! with DNSSEC augmentation, NS detection, DNSSEC status updates) and
//! expose their variant-specific machinery (the journal for primaries
//! and secondaries, the refresh tracker for secondaries and stubs, key
//! material for primaries) through accessors returning `Option`, in
//! the spirit of a tagged variant rather than an inheritance tree.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, RwLock};
use std::time::SystemTime;

use chrono::Utc;

use crate::class::Class;
use crate::dnssec::{DnssecStatus, ZoneKey};
use crate::name::Name;
use crate::rr::{helpers::SoaFields, Record, Serial, SerialScheme, Type};
use crate::tree::ZoneNode;

pub mod journal;
pub mod refresh;

pub use journal::{Journal, Sequence};
pub use refresh::{RefreshState, RefreshTracker};

////////////////////////////////////////////////////////////////////////
// ZONE KINDS AND POLICIES                                            //
////////////////////////////////////////////////////////////////////////

/// The kind of an apex zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ZoneKind {
    /// Locally authoritative and mutable; the source of truth.
    Primary,

    /// A remote-refreshed mirror of a primary, read-only except through
    /// zone transfer.
    Secondary,

    /// Holds only NS records and glue, refreshed from the primaries;
    /// answers are always referrals.
    Stub,

    /// Holds FWD records directing queries to an upstream.
    Forwarder,
}

impl ZoneKind {
    /// Returns whether zones of this kind answer authoritatively.
    pub fn is_authoritative(self) -> bool {
        matches!(self, Self::Primary | Self::Secondary)
    }

    /// Returns whether zones of this kind accept direct record
    /// mutation.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Primary | Self::Forwarder)
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
            Self::Stub => f.write_str("stub"),
            Self::Forwarder => f.write_str("forwarder"),
        }
    }
}

/// Who may transfer this zone. Enforcement happens at the transport
/// layer; the policy is carried here so that it survives snapshots.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TransferPolicy {
    #[default]
    Deny,
    Allow,
    AllowSpecified(Vec<SocketAddr>),
}

/// Who is notified of changes to this zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum NotifyPolicy {
    Disabled,
    #[default]
    ZoneNameServers,
    Specified(Vec<SocketAddr>),
}

/// Who may send dynamic updates for this zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum UpdatePolicy {
    #[default]
    Deny,
    Allow,
    AllowSpecified(Vec<SocketAddr>),
}

////////////////////////////////////////////////////////////////////////
// ZONE METADATA                                                      //
////////////////////////////////////////////////////////////////////////

/// The administrative metadata of a zone, as shown in the catalog's
/// sorted listing and stored at the head of v4 zone snapshots.
#[derive(Clone, Debug)]
pub struct ZoneInfo {
    pub name: Box<Name>,
    pub kind: ZoneKind,
    pub disabled: bool,
    pub internal: bool,
    pub dnssec: DnssecStatus,
    pub transfer_policy: TransferPolicy,
    pub notify_policy: NotifyPolicy,
    pub update_policy: UpdatePolicy,
    pub last_modified: SystemTime,
}

impl ZoneInfo {
    /// Returns fresh metadata for a newly created zone.
    pub fn new(name: Box<Name>, kind: ZoneKind) -> Self {
        Self {
            name,
            kind,
            disabled: false,
            internal: false,
            dnssec: DnssecStatus::Unsigned,
            transfer_policy: TransferPolicy::default(),
            notify_policy: NotifyPolicy::default(),
            update_policy: UpdatePolicy::default(),
            last_modified: SystemTime::now(),
        }
    }
}

#[derive(Debug)]
struct Meta {
    disabled: bool,
    internal: bool,
    dnssec: DnssecStatus,
    transfer_policy: TransferPolicy,
    notify_policy: NotifyPolicy,
    update_policy: UpdatePolicy,
    last_modified: SystemTime,
}

////////////////////////////////////////////////////////////////////////
// APEX ZONES                                                         //
////////////////////////////////////////////////////////////////////////

/// The control block of one hosted zone.
#[derive(Debug)]
pub struct ApexZone {
    name: Box<Name>,
    class: Class,
    meta: RwLock<Meta>,
    state: State,
}

#[derive(Debug)]
enum State {
    Primary(PrimaryState),
    Secondary(SecondaryState),
    Stub(StubState),
    Forwarder,
}

#[derive(Debug)]
struct PrimaryState {
    journal: Mutex<Journal>,
    keys: Mutex<Vec<ZoneKey>>,
}

#[derive(Debug)]
struct SecondaryState {
    journal: Mutex<Journal>,
    refresh: RefreshTracker,
    primaries: Mutex<Vec<SocketAddr>>,
}

#[derive(Debug)]
struct StubState {
    refresh: RefreshTracker,
    primaries: Mutex<Vec<SocketAddr>>,
}

impl ApexZone {
    /// Creates the control block of a new primary zone.
    pub fn new_primary(name: Box<Name>) -> Self {
        Self::with_state(
            name,
            State::Primary(PrimaryState {
                journal: Mutex::new(Journal::new()),
                keys: Mutex::new(Vec::new()),
            }),
        )
    }

    /// Creates the control block of a new secondary zone refreshed from
    /// the given primary servers.
    pub fn new_secondary(name: Box<Name>, primaries: Vec<SocketAddr>) -> Self {
        Self::with_state(
            name,
            State::Secondary(SecondaryState {
                journal: Mutex::new(Journal::new()),
                refresh: RefreshTracker::new(),
                primaries: Mutex::new(primaries),
            }),
        )
    }

    /// Creates the control block of a new stub zone refreshed from the
    /// given primary servers.
    pub fn new_stub(name: Box<Name>, primaries: Vec<SocketAddr>) -> Self {
        Self::with_state(
            name,
            State::Stub(StubState {
                refresh: RefreshTracker::new(),
                primaries: Mutex::new(primaries),
            }),
        )
    }

    /// Creates the control block of a new forwarder zone.
    pub fn new_forwarder(name: Box<Name>) -> Self {
        Self::with_state(name, State::Forwarder)
    }

    /// Recreates a control block from snapshot metadata.
    pub fn from_info(info: ZoneInfo, primaries: Vec<SocketAddr>) -> Self {
        let zone = match info.kind {
            ZoneKind::Primary => Self::new_primary(info.name),
            ZoneKind::Secondary => Self::new_secondary(info.name, primaries),
            ZoneKind::Stub => Self::new_stub(info.name, primaries),
            ZoneKind::Forwarder => Self::new_forwarder(info.name),
        };
        {
            let mut meta = zone.meta.write().unwrap();
            meta.disabled = info.disabled;
            meta.internal = info.internal;
            meta.dnssec = info.dnssec;
            meta.transfer_policy = info.transfer_policy;
            meta.notify_policy = info.notify_policy;
            meta.update_policy = info.update_policy;
            meta.last_modified = info.last_modified;
        }
        zone
    }

    fn with_state(name: Box<Name>, state: State) -> Self {
        Self {
            name,
            class: Class::IN,
            meta: RwLock::new(Meta {
                disabled: false,
                internal: false,
                dnssec: DnssecStatus::Unsigned,
                transfer_policy: TransferPolicy::default(),
                notify_policy: NotifyPolicy::default(),
                update_policy: UpdatePolicy::default(),
                last_modified: SystemTime::now(),
            }),
            state,
        }
    }
}

/// Identity and metadata accessors.
impl ApexZone {
    /// Returns the zone's apex name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the zone's class (always IN in this core).
    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the zone's kind.
    pub fn kind(&self) -> ZoneKind {
        match self.state {
            State::Primary(_) => ZoneKind::Primary,
            State::Secondary(_) => ZoneKind::Secondary,
            State::Stub(_) => ZoneKind::Stub,
            State::Forwarder => ZoneKind::Forwarder,
        }
    }

    /// Returns a point-in-time copy of the zone's metadata for the
    /// admin listing and for snapshot headers.
    pub fn info(&self) -> ZoneInfo {
        let meta = self.meta.read().unwrap();
        ZoneInfo {
            name: self.name.clone(),
            kind: self.kind(),
            disabled: meta.disabled,
            internal: meta.internal,
            dnssec: meta.dnssec,
            transfer_policy: meta.transfer_policy.clone(),
            notify_policy: meta.notify_policy.clone(),
            update_policy: meta.update_policy.clone(),
            last_modified: meta.last_modified,
        }
    }

    /// Returns whether the zone is administratively disabled.
    pub fn is_disabled(&self) -> bool {
        self.meta.read().unwrap().disabled
    }

    /// Enables or disables the zone.
    pub fn set_disabled(&self, disabled: bool) {
        self.meta.write().unwrap().disabled = disabled;
    }

    /// Returns whether the zone is an internal zone (localhost and the
    /// RFC 6761 reverse zones). Internal zones are never written to
    /// disk.
    pub fn is_internal(&self) -> bool {
        self.meta.read().unwrap().internal
    }

    /// Marks the zone as internal.
    pub fn mark_internal(&self) {
        self.meta.write().unwrap().internal = true;
    }

    /// Returns the zone's DNSSEC status.
    pub fn dnssec_status(&self) -> DnssecStatus {
        self.meta.read().unwrap().dnssec
    }

    /// Updates the zone's DNSSEC status.
    pub fn update_dnssec_status(&self, status: DnssecStatus) {
        self.meta.write().unwrap().dnssec = status;
    }

    /// Returns whether the zone is signed.
    pub fn is_signed(&self) -> bool {
        self.dnssec_status() != DnssecStatus::Unsigned
    }

    /// Returns the transfer policy.
    pub fn transfer_policy(&self) -> TransferPolicy {
        self.meta.read().unwrap().transfer_policy.clone()
    }

    /// Sets the transfer policy.
    pub fn set_transfer_policy(&self, policy: TransferPolicy) {
        self.meta.write().unwrap().transfer_policy = policy;
    }

    /// Returns the notify policy.
    pub fn notify_policy(&self) -> NotifyPolicy {
        self.meta.read().unwrap().notify_policy.clone()
    }

    /// Sets the notify policy.
    pub fn set_notify_policy(&self, policy: NotifyPolicy) {
        self.meta.write().unwrap().notify_policy = policy;
    }

    /// Returns the update policy.
    pub fn update_policy(&self) -> UpdatePolicy {
        self.meta.read().unwrap().update_policy.clone()
    }

    /// Sets the update policy.
    pub fn set_update_policy(&self, policy: UpdatePolicy) {
        self.meta.write().unwrap().update_policy = policy;
    }

    /// Returns when the zone last changed.
    pub fn last_modified(&self) -> SystemTime {
        self.meta.read().unwrap().last_modified
    }

    /// Records that the zone changed now.
    pub fn touch(&self) {
        self.meta.write().unwrap().last_modified = SystemTime::now();
    }
}

/// Variant-specific machinery.
impl ApexZone {
    /// Returns the change journal (primary and secondary zones only).
    pub fn journal(&self) -> Option<&Mutex<Journal>> {
        match &self.state {
            State::Primary(state) => Some(&state.journal),
            State::Secondary(state) => Some(&state.journal),
            _ => None,
        }
    }

    /// Returns the refresh tracker (secondary and stub zones only).
    pub fn refresh(&self) -> Option<&RefreshTracker> {
        match &self.state {
            State::Secondary(state) => Some(&state.refresh),
            State::Stub(state) => Some(&state.refresh),
            _ => None,
        }
    }

    /// Returns whether the zone's refresh state machine has expired it.
    pub fn is_expired(&self) -> bool {
        self.refresh().map_or(false, RefreshTracker::is_expired)
    }

    /// Returns the primary servers this zone refreshes from (secondary
    /// and stub zones only; empty otherwise).
    pub fn primaries(&self) -> Vec<SocketAddr> {
        match &self.state {
            State::Secondary(state) => state.primaries.lock().unwrap().clone(),
            State::Stub(state) => state.primaries.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }

    /// Replaces the primary-server list (secondary and stub zones
    /// only; a no-op otherwise).
    pub fn set_primaries(&self, primaries: Vec<SocketAddr>) {
        match &self.state {
            State::Secondary(state) => *state.primaries.lock().unwrap() = primaries,
            State::Stub(state) => *state.primaries.lock().unwrap() = primaries,
            _ => (),
        }
    }

    /// Returns the zone's signing keys (primary zones only).
    pub fn keys(&self) -> Option<&Mutex<Vec<ZoneKey>>> {
        match &self.state {
            State::Primary(state) => Some(&state.keys),
            _ => None,
        }
    }
}

/// The shared query surface.
impl ApexZone {
    /// Looks up the enabled records of the given type at a node of this
    /// zone. When `dnssec_ok` is set and the zone is signed, covering
    /// RRSIG records are returned alongside the requested type.
    pub fn query_records(&self, node: &ZoneNode, rr_type: Type, dnssec_ok: bool) -> Vec<Record> {
        let mut records = node.active_records(rr_type, self.class);
        if dnssec_ok && self.is_signed() && !records.is_empty() {
            records.extend(node.rrsig_records_covering(rr_type, self.class));
        }
        records
    }

    /// Returns whether the given node of this zone owns an enabled NS
    /// RRset.
    pub fn contains_ns_records(&self, node: &ZoneNode) -> bool {
        node.rrset(Type::NS)
            .map_or(false, |rrset| rrset.has_active())
    }

    /// Bumps the apex SOA serial at `node` according to the SOA
    /// record's serial scheme, and returns the new serial. Returns
    /// `None` if the node owns no valid SOA record.
    pub fn bump_serial(&self, node: &ZoneNode) -> Option<Serial> {
        let rrset = node.rrset(Type::SOA)?;
        let (rdata, info) = rrset.first()?;
        let mut soa = SoaFields::read(rdata)?;
        soa.serial = next_serial(soa.serial, info.serial_scheme());
        let new_serial = soa.serial;

        let mut updated = crate::rr::Rrset::new(Type::SOA, rrset.ttl());
        updated
            .insert(rrset.ttl(), soa.to_rdata(), info.clone())
            .unwrap();
        node.put_rrset(updated);
        self.touch();
        Some(new_serial)
    }
}

/// Computes the serial following `current` under the given scheme.
fn next_serial(current: Serial, scheme: SerialScheme) -> Serial {
    match scheme {
        SerialScheme::Increment => current.next(),
        SerialScheme::Date => {
            let date_serial = Utc::now()
                .format("%Y%m%d")
                .to_string()
                .parse::<u32>()
                .unwrap_or(0)
                .saturating_mul(100);
            if u32::from(current) < date_serial {
                Serial::from(date_serial.wrapping_add(1))
            } else {
                current.next()
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
