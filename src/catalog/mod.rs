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

//! The zone manager: the administrative surface over the namespace
//! tree.
//!
//! A [`Catalog`] owns the tree holding every hosted zone, a
//! lexicographically sorted index of zone metadata (the admin-facing
//! listing), the debounced save loop persisting zones to their binary
//! snapshots, and the refresh threads of secondary and stub zones. All
//! zone lifecycle operations (creation, deletion, conversion,
//! cloning, record mutation, and signing) go through it, and it is also
//! the query entry point the server's datagram path calls into.

use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread;

use log::{error, info, warn};

use crate::class::Class;
use crate::dnssec::{self, DnssecStatus, Nsec3Params, SignError, Signer};
use crate::message::{Request, Response};
use crate::name::Name;
use crate::query;
use crate::rr::{
    helpers, Rdata, RdataBuf, Record, RecordInfo, Rrset, Serial, SoaInfo, Ttl, Type,
};
use crate::tree::{ApexMatch, ZoneTree};
use crate::xfr::{self, XfrClient};
use crate::zone::{ApexZone, Sequence, ZoneInfo, ZoneKind};
use crate::zone_file::{self, ZoneFile};

mod refresh;
mod save;

/// The default TTL for records the catalog creates itself (apex SOA
/// and NS records, DNSKEY RRsets).
const DEFAULT_TTL: Ttl = Ttl::from_secs(3600);

/// The DNSSEC algorithm new keys are generated with
/// (ECDSAP256SHA256).
const DEFAULT_ALGORITHM: u8 = 13;

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors surfaced by the administrative operations.
#[derive(Debug)]
pub enum Error {
    /// No zone with the given name is hosted.
    ZoneNotFound(Box<Name>),

    /// A zone with the given name already exists.
    ZoneAlreadyExists(Box<Name>),

    /// The given zone name could not be parsed.
    InvalidZoneName,

    /// The record's owner does not belong to the target zone.
    NameOutsideZone,

    /// The record violates a structural rule (SOA placement, CNAME
    /// exclusivity, class).
    InvalidRecord(&'static str),

    /// A zone transfer stream failed validation.
    InvalidZoneTransfer(xfr::Error),

    /// A zone snapshot failed to parse.
    InvalidZoneFile(zone_file::Error),

    /// A filesystem operation failed.
    Io(io::Error),

    /// The requested zone-kind conversion is not in the supported
    /// matrix.
    ConversionRejected(ZoneKind, ZoneKind),

    /// The operation does not apply to the zone's kind or state.
    OperationNotSupported(&'static str),

    /// The signer reported a failure.
    Sign(SignError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ZoneNotFound(name) => write!(f, "zone not found: {}", name),
            Self::ZoneAlreadyExists(name) => write!(f, "zone already exists: {}", name),
            Self::InvalidZoneName => f.write_str("invalid zone name"),
            Self::NameOutsideZone => f.write_str("name is outside the target zone"),
            Self::InvalidRecord(what) => write!(f, "invalid record: {}", what),
            Self::InvalidZoneTransfer(err) => write!(f, "invalid zone transfer: {}", err),
            Self::InvalidZoneFile(err) => write!(f, "invalid zone file: {}", err),
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::ConversionRejected(from, to) => {
                write!(f, "conversion from {} to {} is not supported", from, to)
            }
            Self::OperationNotSupported(what) => write!(f, "operation not supported: {}", what),
            Self::Sign(err) => write!(f, "signing failed: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<xfr::Error> for Error {
    fn from(err: xfr::Error) -> Self {
        Self::InvalidZoneTransfer(err)
    }
}

impl From<zone_file::Error> for Error {
    fn from(err: zone_file::Error) -> Self {
        Self::InvalidZoneFile(err)
    }
}

impl From<SignError> for Error {
    fn from(err: SignError) -> Self {
        Self::Sign(err)
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION AND COLLABORATORS                                    //
////////////////////////////////////////////////////////////////////////

/// Receives change notifications for primary zones, so that the
/// embedding server can send NOTIFY messages to the configured
/// secondaries. Implementations must not block; the catalog calls this
/// on its mutation paths.
pub trait NotifySink: Send + Sync {
    fn zone_changed(&self, zone: &Name, serial: Serial);
}

/// Configuration for a [`Catalog`].
pub struct CatalogConfig {
    /// Where zone snapshots live (`<configRoot>/zones`). `None`
    /// disables persistence entirely.
    pub zones_dir: Option<PathBuf>,

    /// The server's own domain name, used as the MNAME and NS target
    /// of newly created primary zones.
    pub server_domain: Box<Name>,

    /// The signing backend for DNSSEC operations.
    pub signer: Option<Arc<dyn Signer>>,

    /// The outbound transfer client for secondary and stub refresh.
    pub xfr_client: Option<Arc<dyn XfrClient>>,

    /// The NOTIFY hook invoked after primary-zone changes.
    pub notify: Option<Arc<dyn NotifySink>>,
}

impl CatalogConfig {
    /// A minimal configuration: in-memory only, no signer, no
    /// transfer client.
    pub fn new(server_domain: Box<Name>) -> Self {
        Self {
            zones_dir: None,
            server_domain,
            signer: None,
            xfr_client: None,
            notify: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// THE CATALOG                                                        //
////////////////////////////////////////////////////////////////////////

pub(crate) struct Inner {
    pub(crate) tree: ZoneTree,
    index: RwLock<BTreeMap<String, Arc<ApexZone>>>,
    zones_dir: Option<PathBuf>,
    server_domain: RwLock<Box<Name>>,
    signer: Option<Arc<dyn Signer>>,
    pub(crate) xfr_client: Option<Arc<dyn XfrClient>>,
    notify: Option<Arc<dyn NotifySink>>,
    saver: OnceLock<save::SaveScheduler>,
}

/// The collection of all hosted zones and their administration.
pub struct Catalog {
    inner: Arc<Inner>,
    refresh: Mutex<HashMap<String, refresh::RefreshHandle>>,
}

impl Catalog {
    /// Creates a catalog from the given configuration. Zones
    /// previously saved to the configured directory are not loaded
    /// automatically; call [`Catalog::load_all`].
    pub fn new(config: CatalogConfig) -> Self {
        let inner = Arc::new(Inner {
            tree: ZoneTree::new(),
            index: RwLock::new(BTreeMap::new()),
            zones_dir: config.zones_dir,
            server_domain: RwLock::new(config.server_domain),
            signer: config.signer,
            xfr_client: config.xfr_client,
            notify: config.notify,
            saver: OnceLock::new(),
        });
        let weak = Arc::downgrade(&inner);
        let scheduler = save::SaveScheduler::new(Box::new(move |zone| {
            match weak.upgrade() {
                Some(inner) => inner.write_zone_file(zone),
                // The catalog is gone; drop the request.
                None => true,
            }
        }));
        let _ = inner.saver.set(scheduler);
        Self {
            inner,
            refresh: Mutex::new(HashMap::new()),
        }
    }

    /// Answers a DNS question. See [`query::answer`].
    pub fn query(&self, request: &Request, recursion_allowed: bool) -> Option<Response> {
        query::answer(&self.inner.tree, request, recursion_allowed)
    }

    /// Returns a referral for the closest enclosing delegation, if
    /// any. See [`query::closest_delegation`].
    pub fn query_closest_delegation(
        &self,
        request: &Request,
        recursion_allowed: bool,
    ) -> Option<Response> {
        query::closest_delegation(&self.inner.tree, request, recursion_allowed)
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        // Stop the refresh threads and write out pending saves while
        // the catalog is still whole.
        self.refresh.lock().unwrap().clear();
        self.flush_saves();
    }
}

////////////////////////////////////////////////////////////////////////
// ZONE LIFECYCLE                                                     //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Creates a primary zone with a fresh SOA and NS record derived
    /// from the server domain.
    pub fn create_primary_zone(&self, name: &str) -> Result<ZoneInfo> {
        let apex_name = parse_zone_name(name)?;
        let zone = Arc::new(ApexZone::new_primary(apex_name.clone()));
        let apex = self.install_zone(zone)?;

        let server_domain = self.inner.server_domain.read().unwrap().clone();
        let soa = helpers::SoaFields {
            mname: server_domain.clone(),
            rname: hostmaster_of(&server_domain),
            serial: Serial::from(1),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        let mut soa_rrset = Rrset::new(Type::SOA, DEFAULT_TTL);
        let _ = soa_rrset.insert(DEFAULT_TTL, soa.to_rdata(), RecordInfo::for_type(Type::SOA));
        apex.node.put_rrset(soa_rrset);
        let mut ns_rrset = Rrset::new(Type::NS, DEFAULT_TTL);
        let _ = ns_rrset.insert(
            DEFAULT_TTL,
            helpers::name_rdata(&server_domain),
            RecordInfo::for_type(Type::NS),
        );
        apex.node.put_rrset(ns_rrset);

        self.inner.schedule_save(&apex_name);
        Ok(apex.zone.info())
    }

    /// Creates a secondary zone refreshed from the given primary
    /// servers. Its content arrives with the first successful
    /// transfer.
    pub fn create_secondary_zone(
        &self,
        name: &str,
        primaries: Vec<SocketAddr>,
    ) -> Result<ZoneInfo> {
        let apex_name = parse_zone_name(name)?;
        let zone = Arc::new(ApexZone::new_secondary(apex_name.clone(), primaries));
        let apex = self.install_zone(zone)?;
        self.start_refresh(&apex_name);
        self.inner.schedule_save(&apex_name);
        Ok(apex.zone.info())
    }

    /// Creates a stub zone refreshed from the given primary servers.
    pub fn create_stub_zone(&self, name: &str, primaries: Vec<SocketAddr>) -> Result<ZoneInfo> {
        let apex_name = parse_zone_name(name)?;
        let zone = Arc::new(ApexZone::new_stub(apex_name.clone(), primaries));
        let apex = self.install_zone(zone)?;
        self.start_refresh(&apex_name);
        self.inner.schedule_save(&apex_name);
        Ok(apex.zone.info())
    }

    /// Creates a forwarder zone with FWD records for the given
    /// upstream addresses.
    pub fn create_forwarder_zone(&self, name: &str, forwarders: &[&str]) -> Result<ZoneInfo> {
        let apex_name = parse_zone_name(name)?;
        let zone = Arc::new(ApexZone::new_forwarder(apex_name.clone()));
        let apex = self.install_zone(zone)?;

        let mut rrset = Rrset::new(Type::FWD, DEFAULT_TTL);
        for forwarder in forwarders {
            let rdata = helpers::fwd_rdata(forwarder)
                .ok_or(Error::InvalidRecord("malformed forwarder address"))?;
            let _ = rrset.insert(DEFAULT_TTL, rdata, RecordInfo::for_type(Type::FWD));
        }
        apex.node.put_rrset(rrset);
        self.inner.schedule_save(&apex_name);
        Ok(apex.zone.info())
    }

    /// Creates the internal zones: `localhost` and the RFC 6761
    /// loopback reverse zones. Internal zones answer queries but are
    /// never written to disk.
    pub fn create_internal_zones(&self) {
        const IP6_LOOPBACK: &str = "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa.";
        let localhost: Box<Name> = "localhost.".parse().unwrap();

        // (record owner, type, RDATA)
        let contents: [(&str, Type, RdataBuf); 4] = [
            (
                "localhost.",
                Type::A,
                RdataBuf::try_from(&[127u8, 0, 0, 1][..]).unwrap(),
            ),
            (
                "localhost.",
                Type::AAAA,
                RdataBuf::try_from(&[0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1][..])
                    .unwrap(),
            ),
            (
                "1.0.0.127.in-addr.arpa.",
                Type::PTR,
                helpers::name_rdata(&localhost),
            ),
            (
                IP6_LOOPBACK,
                Type::PTR,
                helpers::name_rdata(&localhost),
            ),
        ];

        for apex_name in ["localhost.", "127.in-addr.arpa.", IP6_LOOPBACK] {
            let apex_name: Box<Name> = apex_name.parse().unwrap();
            let zone = Arc::new(ApexZone::new_primary(apex_name.clone()));
            zone.mark_internal();
            let Ok(apex) = self.install_zone(zone) else {
                continue;
            };
            let soa = helpers::SoaFields {
                mname: apex_name.clone(),
                rname: hostmaster_of(&apex_name),
                serial: Serial::from(1),
                refresh: 900,
                retry: 300,
                expire: 604800,
                minimum: 3600,
            };
            let mut soa_rrset = Rrset::new(Type::SOA, DEFAULT_TTL);
            let _ = soa_rrset.insert(DEFAULT_TTL, soa.to_rdata(), RecordInfo::for_type(Type::SOA));
            apex.node.put_rrset(soa_rrset);
        }

        for (owner, rr_type, rdata) in contents {
            let owner: Box<Name> = owner.parse().unwrap();
            let node = self.inner.tree.get_or_add(&owner);
            let mut rrset = match node.rrset(rr_type) {
                Some(existing) => (*existing).clone(),
                None => Rrset::new(rr_type, DEFAULT_TTL),
            };
            let _ = rrset.insert(DEFAULT_TTL, rdata, RecordInfo::for_type(rr_type));
            node.put_rrset(rrset);
        }
    }

    /// Deletes a zone: stops its timers, releases its signing
    /// material, removes its records from the tree, and deletes its
    /// snapshot from disk.
    pub fn delete_zone(&self, name: &Name) -> Result<()> {
        let key = index_key(name);
        let zone = self
            .inner
            .index
            .write()
            .unwrap()
            .remove(&key)
            .ok_or_else(|| Error::ZoneNotFound(name.to_owned()))?;
        if let Some(mut handle) = self.refresh.lock().unwrap().remove(&key) {
            handle.stop();
        }

        if let Some(apex_node) = self.inner.tree.get(name) {
            let nodes = self.inner.tree.walk_zone(&apex_node);
            for node in &nodes {
                if Arc::ptr_eq(node, &apex_node) {
                    node.clear_rrsets();
                } else if node.apex().is_some() {
                    for rrset in node.parent_rrsets() {
                        node.remove_parent_rrset(rrset.rr_type);
                    }
                } else {
                    node.clear_rrsets();
                }
            }
            apex_node.clear_apex();
            for node in nodes.iter().rev() {
                self.inner.tree.try_remove(&node.name().to_owned());
            }
        }

        if let Some(dir) = &self.inner.zones_dir {
            let path = dir.join(zone_file::file_name(name));
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("failed to remove {}: {}", path.display(), err);
                }
            }
        }
        info!("deleted zone {}", zone.name());
        Ok(())
    }

    /// Clones a zone's records under a new apex name, as a new primary
    /// zone. Owner names are rewritten from the source suffix to the
    /// target suffix; DNSSEC records are not carried over.
    pub fn clone_zone(&self, source: &Name, target: &str) -> Result<ZoneInfo> {
        let source_apex = self
            .inner
            .apex_match(source)
            .ok_or_else(|| Error::ZoneNotFound(source.to_owned()))?;
        let target_name = parse_zone_name(target)?;

        let zone = Arc::new(ApexZone::new_primary(target_name.clone()));
        let target_apex = self.install_zone(zone)?;

        for node in self.inner.tree.walk_zone(&source_apex.node) {
            let at_apex = Arc::ptr_eq(&node, &source_apex.node);
            let keep = node.name().len() - source.len();
            let Ok(owner) = node.name().with_suffix(keep, &target_name) else {
                continue;
            };
            for rrset in node.walk_rrsets(at_apex) {
                if rrset.rr_type.is_dnssec() {
                    continue;
                }
                let mut cloned = Rrset::new(rrset.rr_type, rrset.ttl());
                for (rdata, record_info) in rrset.iter() {
                    let _ = cloned.insert(rrset.ttl(), rdata.to_owned(), record_info.clone());
                }
                if !cloned.is_empty() {
                    self.inner.tree.get_or_add(&owner).put_rrset(cloned);
                }
            }
        }

        self.inner.schedule_save(&target_name);
        Ok(target_apex.zone.info())
    }

    /// Converts a zone to another kind, per the supported matrix:
    /// unsigned primary → forwarder, secondary → primary, secondary →
    /// forwarder, and forwarder → primary. Any failure rolls the zone
    /// back to its pre-conversion state.
    pub fn convert_zone(&self, name: &Name, to: ZoneKind) -> Result<ZoneInfo> {
        let apex = self
            .inner
            .apex_match(name)
            .ok_or_else(|| Error::ZoneNotFound(name.to_owned()))?;
        let from = apex.zone.kind();
        let allowed = matches!(
            (from, to),
            (ZoneKind::Primary, ZoneKind::Forwarder)
                | (ZoneKind::Secondary, ZoneKind::Primary)
                | (ZoneKind::Secondary, ZoneKind::Forwarder)
                | (ZoneKind::Forwarder, ZoneKind::Primary)
        );
        if !allowed {
            return Err(Error::ConversionRejected(from, to));
        }
        if from == ZoneKind::Primary && apex.zone.is_signed() {
            return Err(Error::ConversionRejected(from, to));
        }

        // Snapshot the zone so that a failure can roll it back by
        // reloading the prior state.
        let mut snapshot = Vec::new();
        zone_file::write(&mut snapshot, &self.inner.collect_zone_file(&apex))?;

        match self.do_convert(&apex, from, to) {
            Ok(info) => {
                self.inner.schedule_save(name);
                Ok(info)
            }
            Err(err) => {
                error!("conversion of {} failed, rolling back: {}", name, err);
                let _ = self.delete_zone(name);
                if let Ok(file) = zone_file::read(&snapshot[..]) {
                    let _ = self.install_zone_file(file);
                }
                Err(err)
            }
        }
    }

    fn do_convert(&self, apex: &ApexMatch, from: ZoneKind, to: ZoneKind) -> Result<ZoneInfo> {
        let name = apex.zone.name().to_owned();
        let key = index_key(&name);

        // Strip what the target kind must not carry.
        if to == ZoneKind::Forwarder {
            apex.node.remove_rrset(Type::SOA);
            apex.node.remove_rrset(Type::NS);
        }
        if from == ZoneKind::Secondary {
            for node in self.inner.tree.walk_zone(&apex.node) {
                for rrset in node.rrsets() {
                    if rrset.rr_type.is_dnssec() {
                        node.remove_rrset(rrset.rr_type);
                    }
                }
            }
        }
        if from == ZoneKind::Forwarder {
            for node in self.inner.tree.walk_zone(&apex.node) {
                node.remove_rrset(Type::FWD);
            }
        }

        // Swap in the new control block.
        let mut info = apex.zone.info();
        info.kind = to;
        info.dnssec = DnssecStatus::Unsigned;
        let primaries = apex.zone.primaries();
        let new_zone = Arc::new(ApexZone::from_info(info, primaries));
        apex.node.set_apex(new_zone.clone());
        self.inner
            .index
            .write()
            .unwrap()
            .insert(key.clone(), new_zone.clone());
        if let Some(mut handle) = self.refresh.lock().unwrap().remove(&key) {
            handle.stop();
        }

        match (from, to) {
            (ZoneKind::Secondary, ZoneKind::Primary) => {
                // Reset the SOA metadata; the data itself carries over.
                apex.node.update_rrset(Type::SOA, |rrset| {
                    let rdatas: Vec<RdataBuf> =
                        rrset.iter().map(|(rdata, _)| rdata.to_owned()).collect();
                    for rdata in rdatas {
                        if let Some(entry) = rrset.info_mut(&rdata) {
                            *entry = RecordInfo::Soa(SoaInfo::default());
                        }
                    }
                });
            }
            (ZoneKind::Forwarder, ZoneKind::Primary) => {
                let server_domain = self.inner.server_domain.read().unwrap().clone();
                let soa = helpers::SoaFields {
                    mname: server_domain.clone(),
                    rname: hostmaster_of(&server_domain),
                    serial: Serial::from(1),
                    refresh: 900,
                    retry: 300,
                    expire: 604800,
                    minimum: 3600,
                };
                let mut soa_rrset = Rrset::new(Type::SOA, DEFAULT_TTL);
                let _ =
                    soa_rrset.insert(DEFAULT_TTL, soa.to_rdata(), RecordInfo::for_type(Type::SOA));
                apex.node.put_rrset(soa_rrset);
                let mut ns_rrset = Rrset::new(Type::NS, DEFAULT_TTL);
                let _ = ns_rrset.insert(
                    DEFAULT_TTL,
                    helpers::name_rdata(&server_domain),
                    RecordInfo::for_type(Type::NS),
                );
                apex.node.put_rrset(ns_rrset);
            }
            _ => (),
        }

        info!("converted zone {} from {} to {}", name, from, to);
        Ok(new_zone.info())
    }
}

////////////////////////////////////////////////////////////////////////
// LISTING                                                            //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Returns every zone's metadata, in lexicographic name order.
    pub fn get_all_zones(&self) -> Vec<ZoneInfo> {
        self.inner
            .index
            .read()
            .unwrap()
            .values()
            .map(|zone| zone.info())
            .collect()
    }

    /// Returns one page of the sorted zone listing.
    pub fn get_zones_page(&self, offset: usize, count: usize) -> Vec<ZoneInfo> {
        self.inner
            .index
            .read()
            .unwrap()
            .values()
            .skip(offset)
            .take(count)
            .map(|zone| zone.info())
            .collect()
    }

    /// Returns the number of hosted zones.
    pub fn zone_count(&self) -> usize {
        self.inner.index.read().unwrap().len()
    }

    /// Returns one zone's metadata.
    pub fn get_zone_info(&self, name: &Name) -> Result<ZoneInfo> {
        self.inner
            .apex_match(name)
            .map(|apex| apex.zone.info())
            .ok_or_else(|| Error::ZoneNotFound(name.to_owned()))
    }

    /// Enables or disables a zone.
    pub fn set_zone_disabled(&self, name: &Name, disabled: bool) -> Result<()> {
        let apex = self
            .inner
            .apex_match(name)
            .ok_or_else(|| Error::ZoneNotFound(name.to_owned()))?;
        apex.zone.set_disabled(disabled);
        self.inner.schedule_save(name);
        Ok(())
    }

    /// Lists the immediate subdomain names under `owner` in a zone.
    pub fn list_subdomains(&self, zone: &Name, owner: &Name) -> Result<Vec<Box<Name>>> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if !owner.eq_or_subdomain_of(apex.zone.name()) {
            return Err(Error::NameOutsideZone);
        }
        Ok(self.inner.tree.list_children(owner))
    }

    /// Returns every record at `owner` in a zone, including disabled
    /// records, for the admin surface.
    pub fn get_records(&self, zone: &Name, owner: &Name) -> Result<Vec<Record>> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if !owner.eq_or_subdomain_of(apex.zone.name()) {
            return Err(Error::NameOutsideZone);
        }
        let Some(node) = self.inner.tree.get(owner) else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for rrset in node.rrsets() {
            records.extend(rrset.to_records(owner, apex.zone.class()));
        }
        Ok(records)
    }
}

////////////////////////////////////////////////////////////////////////
// RECORD MUTATION                                                    //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Replaces the RRset of the given type at `owner`.
    pub fn set_records(
        &self,
        zone: &Name,
        owner: &Name,
        rr_type: Type,
        ttl: Ttl,
        rdatas: Vec<RdataBuf>,
    ) -> Result<()> {
        let apex = self.mutable_zone(zone, owner)?;
        self.validate_record_shape(&apex, owner, rr_type)?;
        if rr_type == Type::SOA && rdatas.len() != 1 {
            return Err(Error::InvalidRecord("a zone has exactly one SOA record"));
        }

        let node = self.inner.tree.get_or_add(owner);
        let old = node
            .rrset(rr_type)
            .map(|rrset| rrset.to_records(owner, apex.zone.class()))
            .unwrap_or_default();

        let mut rrset = Rrset::new(rr_type, ttl);
        for rdata in rdatas {
            // A surviving RDATA keeps its metadata tag.
            let info = old
                .iter()
                .find(|record| record.rdata.equals(&rdata, rr_type))
                .map(|record| record.info.clone())
                .unwrap_or_else(|| RecordInfo::for_type(rr_type));
            let _ = rrset.insert(ttl, rdata, info);
        }
        let new = rrset.to_records(owner, apex.zone.class());
        node.put_rrset(rrset);

        let removed = old
            .iter()
            .filter(|record| !new.iter().any(|n| n.same_rr(record)))
            .cloned()
            .collect();
        let added = new
            .iter()
            .filter(|record| !old.iter().any(|o| o.same_rr(record)))
            .cloned()
            .collect();
        self.commit_change(&apex, removed, added);
        Ok(())
    }

    /// Adds one record, creating its RRset if needed.
    pub fn add_record(&self, zone: &Name, record: Record) -> Result<()> {
        let apex = self.mutable_zone(zone, &record.owner)?;
        self.validate_record_shape(&apex, &record.owner, record.rr_type)?;
        if record.class != apex.zone.class() {
            return Err(Error::InvalidRecord("class must be IN"));
        }

        let node = self.inner.tree.get_or_add(&record.owner);
        let mut rrset = match node.rrset(record.rr_type) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(record.rr_type, record.ttl),
        };
        rrset
            .insert(record.ttl, record.rdata.clone(), record.info.clone())
            .map_err(|_| Error::InvalidRecord("TTL differs from the existing RRset"))?;
        node.put_rrset(rrset);

        self.commit_change(&apex, Vec::new(), vec![record]);
        Ok(())
    }

    /// Replaces one record with another.
    pub fn update_record(&self, zone: &Name, old: &Record, new: Record) -> Result<()> {
        let apex = self.mutable_zone(zone, &old.owner)?;
        self.validate_record_shape(&apex, &new.owner, new.rr_type)?;
        if !new.owner.eq_or_subdomain_of(apex.zone.name()) {
            return Err(Error::NameOutsideZone);
        }

        if let Some(node) = self.inner.tree.get(&old.owner) {
            node.update_rrset(old.rr_type, |rrset| {
                rrset.remove(&old.rdata);
            });
            self.inner.tree.try_remove(&old.owner);
        }
        let node = self.inner.tree.get_or_add(&new.owner);
        let mut rrset = match node.rrset(new.rr_type) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(new.rr_type, new.ttl),
        };
        let _ = rrset.insert(new.ttl, new.rdata.clone(), new.info.clone());
        node.put_rrset(rrset);

        self.commit_change(&apex, vec![old.clone()], vec![new]);
        Ok(())
    }

    /// Deletes one record by owner, type, and RDATA.
    pub fn delete_record(
        &self,
        zone: &Name,
        owner: &Name,
        rr_type: Type,
        rdata: &Rdata,
    ) -> Result<()> {
        let apex = self.mutable_zone(zone, owner)?;
        if rr_type == Type::SOA {
            return Err(Error::InvalidRecord("the apex SOA cannot be deleted"));
        }
        let node = self
            .inner
            .tree
            .get(owner)
            .ok_or(Error::InvalidRecord("no such record"))?;
        let removed = node
            .rrset(rr_type)
            .map(|rrset| rrset.to_records(owner, apex.zone.class()))
            .unwrap_or_default()
            .into_iter()
            .filter(|record| record.rdata.equals(rdata, rr_type))
            .collect::<Vec<_>>();
        if removed.is_empty() {
            return Err(Error::InvalidRecord("no such record"));
        }
        node.update_rrset(rr_type, |rrset| {
            rrset.remove(rdata);
        });
        self.inner.tree.try_remove(owner);

        self.commit_change(&apex, removed, Vec::new());
        Ok(())
    }

    /// Deletes the whole RRset of the given type at `owner`.
    pub fn delete_records(&self, zone: &Name, owner: &Name, rr_type: Type) -> Result<()> {
        let apex = self.mutable_zone(zone, owner)?;
        if rr_type == Type::SOA {
            return Err(Error::InvalidRecord("the apex SOA cannot be deleted"));
        }
        let Some(node) = self.inner.tree.get(owner) else {
            return Ok(());
        };
        let removed = node
            .remove_rrset(rr_type)
            .map(|rrset| rrset.to_records(owner, apex.zone.class()))
            .unwrap_or_default();
        self.inner.tree.try_remove(owner);
        if !removed.is_empty() {
            self.commit_change(&apex, removed, Vec::new());
        }
        Ok(())
    }

    /// Imports a batch of records into a zone.
    pub fn import_records(&self, zone: &Name, records: Vec<Record>) -> Result<()> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if !apex.zone.kind().is_mutable() {
            return Err(Error::OperationNotSupported("zone is read-only"));
        }

        let mut added = Vec::new();
        for record in records {
            if !record.owner.eq_or_subdomain_of(apex.zone.name()) {
                return Err(Error::NameOutsideZone);
            }
            if record.rr_type == Type::SOA {
                // Imported SOAs replace the apex SOA data but never
                // create a second one.
                if record.owner.as_ref() != apex.zone.name() {
                    return Err(Error::InvalidRecord("SOA outside the apex"));
                }
                let mut rrset = Rrset::new(Type::SOA, record.ttl);
                let _ = rrset.insert(record.ttl, record.rdata.clone(), record.info.clone());
                apex.node.put_rrset(rrset);
                continue;
            }
            let node = self.inner.tree.get_or_add(&record.owner);
            let mut rrset = match node.rrset(record.rr_type) {
                Some(existing) => (*existing).clone(),
                None => Rrset::new(record.rr_type, record.ttl),
            };
            let _ = rrset.insert(record.ttl, record.rdata.clone(), record.info.clone());
            node.put_rrset(rrset);
            added.push(record);
        }
        self.commit_change(&apex, Vec::new(), added);
        Ok(())
    }

    /// Checks the structural rules a new record must satisfy: SOA only
    /// at the apex, CNAME exclusivity ([RFC 1034 § 3.6.2]), and FWD
    /// records only in forwarder zones.
    ///
    /// [RFC 1034 § 3.6.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-3.6.2
    fn validate_record_shape(&self, apex: &ApexMatch, owner: &Name, rr_type: Type) -> Result<()> {
        if rr_type == Type::ANY {
            return Err(Error::InvalidRecord("ANY is not a record type"));
        }
        if rr_type == Type::SOA && owner != apex.zone.name() {
            return Err(Error::InvalidRecord("SOA outside the apex"));
        }
        if rr_type == Type::FWD && apex.zone.kind() != ZoneKind::Forwarder {
            return Err(Error::InvalidRecord("FWD records belong to forwarder zones"));
        }
        if let Some(node) = self.inner.tree.get(owner) {
            if rr_type == Type::CNAME {
                let conflicting = node
                    .rrsets()
                    .iter()
                    .any(|rrset| rrset.rr_type != Type::CNAME && !rrset.rr_type.is_dnssec());
                if conflicting {
                    return Err(Error::InvalidRecord("CNAME cannot coexist with other data"));
                }
            } else if !rr_type.is_dnssec() && node.rrset(Type::CNAME).is_some() {
                return Err(Error::InvalidRecord("the name already owns a CNAME"));
            }
        }
        Ok(())
    }

    /// Resolves and checks a zone for mutation: it must exist, and it
    /// must be of a mutable kind. `owner` must fall inside the zone
    /// and must not belong to a deeper hosted zone.
    fn mutable_zone(&self, zone: &Name, owner: &Name) -> Result<ApexMatch> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if !apex.zone.kind().is_mutable() {
            return Err(Error::OperationNotSupported("zone is read-only"));
        }
        if !owner.eq_or_subdomain_of(apex.zone.name()) {
            return Err(Error::NameOutsideZone);
        }
        // The owner must not have been delegated to a deeper hosted
        // zone.
        let enclosing = self.inner.tree.find(owner);
        if let Some(enclosing) = enclosing.apex {
            if enclosing.zone.name() != apex.zone.name()
                && enclosing.zone.name().proper_subdomain_of(apex.zone.name())
            {
                return Err(Error::NameOutsideZone);
            }
        }
        Ok(apex)
    }

    /// Finishes a mutation: journal, serial bump, DNSSEC maintenance,
    /// notification, and a scheduled save.
    fn commit_change(&self, apex: &ApexMatch, removed: Vec<Record>, added: Vec<Record>) {
        if apex.zone.kind() == ZoneKind::Primary {
            // The serial bump and the journal append happen under the
            // journal lock, so an IXFR producer that observes the new
            // serial also observes this sequence.
            let mut journal = apex
                .zone
                .journal()
                .map(|journal| journal.lock().unwrap());
            let old_soa = apex
                .node
                .active_records(Type::SOA, apex.zone.class())
                .into_iter()
                .next();
            let serial = apex.zone.bump_serial(&apex.node);
            let new_soa = apex
                .node
                .active_records(Type::SOA, apex.zone.class())
                .into_iter()
                .next();

            if let (Some(old_soa), Some(new_soa)) = (old_soa, new_soa) {
                let mut removed_seq = vec![old_soa];
                removed_seq.extend(removed);
                let mut added_seq = vec![new_soa];
                added_seq.extend(added);
                match Sequence::new(removed_seq, added_seq) {
                    Ok(sequence) => {
                        if let Some(journal) = journal.as_mut() {
                            if let Err(err) = journal.append(sequence) {
                                warn!(
                                    "journal append failed for {}: {}",
                                    apex.zone.name(),
                                    err
                                );
                            }
                        }
                    }
                    Err(err) => warn!("journal sequence invalid for {}: {}", apex.zone.name(), err),
                }
            }
            drop(journal);

            if apex.zone.is_signed() {
                if let Err(err) = self.inner.rebuild_dnssec(apex) {
                    error!("DNSSEC maintenance failed for {}: {}", apex.zone.name(), err);
                }
            }
            if let (Some(sink), Some(serial)) = (&self.inner.notify, serial) {
                sink.zone_changed(apex.zone.name(), serial);
            }
        } else {
            apex.zone.touch();
        }
        self.inner.schedule_save(apex.zone.name());
    }
}

////////////////////////////////////////////////////////////////////////
// ZONE TRANSFER SURFACE                                              //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Produces a full zone transfer stream.
    pub fn query_zone_transfer(&self, zone: &Name) -> Result<Vec<Record>> {
        let apex = self.transferable_zone(zone)?;
        Ok(xfr::axfr_records(&self.inner.tree, &apex))
    }

    /// Produces an incremental zone transfer stream for a client at
    /// `client_serial`.
    pub fn query_incremental_zone_transfer(
        &self,
        zone: &Name,
        client_serial: Serial,
    ) -> Result<Vec<Record>> {
        let apex = self.transferable_zone(zone)?;
        Ok(xfr::ixfr_records(&self.inner.tree, &apex, client_serial))
    }

    /// Replaces a secondary zone's content from a full transfer
    /// stream.
    pub fn sync_zone_transfer(&self, zone: &Name, records: &[Record]) -> Result<()> {
        let apex = self.synchronizable_zone(zone)?;
        xfr::apply_axfr(&self.inner.tree, &apex, records)?;
        self.inner.schedule_save(zone);
        Ok(())
    }

    /// Applies an incremental transfer stream to a secondary zone.
    pub fn sync_incremental_zone_transfer(&self, zone: &Name, records: &[Record]) -> Result<()> {
        let apex = self.synchronizable_zone(zone)?;
        xfr::apply_ixfr(&self.inner.tree, &apex, records)?;
        self.inner.schedule_save(zone);
        Ok(())
    }

    fn transferable_zone(&self, zone: &Name) -> Result<ApexMatch> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if !apex.zone.kind().is_authoritative() {
            return Err(Error::OperationNotSupported("zone cannot be transferred"));
        }
        Ok(apex)
    }

    fn synchronizable_zone(&self, zone: &Name) -> Result<ApexMatch> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if apex.zone.kind() != ZoneKind::Secondary {
            return Err(Error::OperationNotSupported(
                "only secondary zones accept transfer data",
            ));
        }
        Ok(apex)
    }
}

////////////////////////////////////////////////////////////////////////
// DNSSEC OPERATIONS                                                  //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Signs a primary zone with an NSEC chain.
    pub fn sign_zone_with_nsec(&self, zone: &Name) -> Result<()> {
        self.sign_zone(zone, DnssecStatus::SignedWithNsec, None)
    }

    /// Signs a primary zone with an NSEC3 chain using the given
    /// parameters.
    pub fn sign_zone_with_nsec3(&self, zone: &Name, iterations: u16, salt: Vec<u8>) -> Result<()> {
        self.sign_zone(
            zone,
            DnssecStatus::SignedWithNsec3,
            Some(Nsec3Params::new(iterations, salt)),
        )
    }

    fn sign_zone(
        &self,
        zone: &Name,
        status: DnssecStatus,
        params: Option<Nsec3Params>,
    ) -> Result<()> {
        let apex = self.signable_zone(zone)?;
        if apex.zone.is_signed() {
            return Err(Error::OperationNotSupported("zone is already signed"));
        }
        let signer = self.require_signer()?;

        let ksk = signer.generate_key(zone, DEFAULT_ALGORITHM, true)?;
        let zsk = signer.generate_key(zone, DEFAULT_ALGORITHM, false)?;
        let mut dnskey_rrset = Rrset::new(Type::DNSKEY, DEFAULT_TTL);
        for key in [&ksk, &zsk] {
            let _ = dnskey_rrset.insert(
                DEFAULT_TTL,
                key.public_rdata.clone(),
                RecordInfo::for_type(Type::DNSKEY),
            );
        }
        apex.node.put_rrset(dnskey_rrset);
        {
            let mut keys = apex.zone.keys().unwrap().lock().unwrap();
            keys.push(ksk);
            keys.push(zsk);
        }

        apex.zone.update_dnssec_status(status);
        if let Some(params) = params {
            let ttl = chain_ttl(&apex);
            dnssec::rebuild_nsec3_chain(&self.inner.tree, &apex.node, ttl, &params);
            dnssec::resign_zone(&self.inner.tree, &apex.node, &apex.zone, signer.as_ref())?;
        } else {
            self.inner.rebuild_dnssec(&apex)?;
        }
        self.finish_dnssec_change(&apex);
        info!("signed zone {} ({})", zone, status);
        Ok(())
    }

    /// Removes DNSSEC from a primary zone: chain, signatures, keys.
    pub fn unsign_zone(&self, zone: &Name) -> Result<()> {
        let apex = self.signable_zone(zone)?;
        if !apex.zone.is_signed() {
            return Err(Error::OperationNotSupported("zone is not signed"));
        }

        dnssec::strip_chain(&self.inner.tree, &apex.node);
        for node in self.inner.tree.walk_zone(&apex.node) {
            node.remove_rrset(Type::RRSIG);
            node.remove_parent_rrset(Type::RRSIG);
        }
        apex.node.remove_rrset(Type::DNSKEY);
        if let Some(keys) = apex.zone.keys() {
            keys.lock().unwrap().clear();
        }
        apex.zone.update_dnssec_status(DnssecStatus::Unsigned);
        self.finish_dnssec_change(&apex);
        info!("unsigned zone {}", zone);
        Ok(())
    }

    /// Converts a signed zone's denial chain to NSEC.
    pub fn convert_to_nsec(&self, zone: &Name) -> Result<()> {
        let apex = self.signable_zone(zone)?;
        if apex.zone.dnssec_status() != DnssecStatus::SignedWithNsec3 {
            return Err(Error::OperationNotSupported("zone is not signed with NSEC3"));
        }
        apex.zone.update_dnssec_status(DnssecStatus::SignedWithNsec);
        self.inner.rebuild_dnssec(&apex)?;
        self.finish_dnssec_change(&apex);
        Ok(())
    }

    /// Converts a signed zone's denial chain to NSEC3.
    pub fn convert_to_nsec3(&self, zone: &Name, iterations: u16, salt: Vec<u8>) -> Result<()> {
        let apex = self.signable_zone(zone)?;
        if apex.zone.dnssec_status() != DnssecStatus::SignedWithNsec {
            return Err(Error::OperationNotSupported("zone is not signed with NSEC"));
        }
        apex.zone
            .update_dnssec_status(DnssecStatus::SignedWithNsec3);
        let ttl = chain_ttl(&apex);
        dnssec::rebuild_nsec3_chain(
            &self.inner.tree,
            &apex.node,
            ttl,
            &Nsec3Params::new(iterations, salt),
        );
        let signer = self.require_signer()?;
        dnssec::resign_zone(&self.inner.tree, &apex.node, &apex.zone, signer.as_ref())?;
        self.finish_dnssec_change(&apex);
        Ok(())
    }

    /// Generates an additional signing key for a signed zone.
    pub fn generate_dns_key(&self, zone: &Name, ksk: bool) -> Result<u16> {
        let apex = self.signed_zone(zone)?;
        let signer = self.require_signer()?;
        let key = signer.generate_key(zone, DEFAULT_ALGORITHM, ksk)?;
        let tag = key.tag;

        let mut dnskey_rrset = match apex.node.rrset(Type::DNSKEY) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(Type::DNSKEY, DEFAULT_TTL),
        };
        let _ = dnskey_rrset.insert(
            dnskey_rrset.ttl(),
            key.public_rdata.clone(),
            RecordInfo::for_type(Type::DNSKEY),
        );
        apex.node.put_rrset(dnskey_rrset);
        apex.zone.keys().unwrap().lock().unwrap().push(key);

        self.inner.rebuild_dnssec(&apex)?;
        self.finish_dnssec_change(&apex);
        Ok(tag)
    }

    /// Marks a key as retired: it stops signing but its DNSKEY record
    /// remains published until the key is deleted.
    pub fn retire_dns_key(&self, zone: &Name, tag: u16) -> Result<()> {
        let apex = self.signed_zone(zone)?;
        {
            let mut keys = apex.zone.keys().unwrap().lock().unwrap();
            let key = keys
                .iter_mut()
                .find(|key| key.tag == tag)
                .ok_or(Error::OperationNotSupported("no such key"))?;
            key.retired = true;
        }
        self.inner.rebuild_dnssec(&apex)?;
        self.finish_dnssec_change(&apex);
        Ok(())
    }

    /// Deletes a retired key and unpublishes its DNSKEY record.
    pub fn delete_dns_key(&self, zone: &Name, tag: u16) -> Result<()> {
        let apex = self.signed_zone(zone)?;
        let public = {
            let mut keys = apex.zone.keys().unwrap().lock().unwrap();
            let index = keys
                .iter()
                .position(|key| key.tag == tag)
                .ok_or(Error::OperationNotSupported("no such key"))?;
            if !keys[index].retired {
                return Err(Error::OperationNotSupported(
                    "the key must be retired before deletion",
                ));
            }
            keys.remove(index).public_rdata
        };
        apex.node.update_rrset(Type::DNSKEY, |rrset| {
            rrset.remove(&public);
        });
        self.inner.rebuild_dnssec(&apex)?;
        self.finish_dnssec_change(&apex);
        Ok(())
    }

    /// Rolls a key over: generates a successor of the same kind and
    /// retires the old key.
    pub fn rollover_dns_key(&self, zone: &Name, tag: u16) -> Result<u16> {
        let apex = self.signed_zone(zone)?;
        let ksk = {
            let keys = apex.zone.keys().unwrap().lock().unwrap();
            keys.iter()
                .find(|key| key.tag == tag)
                .map(|key| key.is_ksk())
                .ok_or(Error::OperationNotSupported("no such key"))?
        };
        let new_tag = self.generate_dns_key(zone, ksk)?;
        self.retire_dns_key(zone, tag)?;
        Ok(new_tag)
    }

    /// Exports DS records for the zone's key-signing keys, for
    /// submission to the parent (or use as a trust anchor).
    pub fn ds_records(&self, zone: &Name) -> Result<Vec<Record>> {
        let apex = self.signed_zone(zone)?;
        let keys = apex.zone.keys().unwrap().lock().unwrap();
        Ok(keys
            .iter()
            .filter(|key| key.is_ksk() && !key.retired)
            .map(|key| {
                Record::new(
                    apex.zone.name().to_owned(),
                    Type::DS,
                    apex.zone.class(),
                    DEFAULT_TTL,
                    dnssec::ds_rdata(apex.zone.name(), key),
                )
            })
            .collect())
    }

    fn signable_zone(&self, zone: &Name) -> Result<ApexMatch> {
        let apex = self
            .inner
            .apex_match(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.to_owned()))?;
        if apex.zone.kind() != ZoneKind::Primary {
            return Err(Error::OperationNotSupported(
                "only primary zones can be signed",
            ));
        }
        Ok(apex)
    }

    fn signed_zone(&self, zone: &Name) -> Result<ApexMatch> {
        let apex = self.signable_zone(zone)?;
        if !apex.zone.is_signed() {
            return Err(Error::OperationNotSupported("zone is not signed"));
        }
        Ok(apex)
    }

    fn require_signer(&self) -> Result<Arc<dyn Signer>> {
        self.inner
            .signer
            .clone()
            .ok_or(Error::OperationNotSupported("no signer configured"))
    }

    /// After signing-related changes the zone's history no longer
    /// describes its content; clients fall back to a full transfer.
    fn finish_dnssec_change(&self, apex: &ApexMatch) {
        if let Some(journal) = apex.zone.journal() {
            journal.lock().unwrap().clear();
        }
        apex.zone.bump_serial(&apex.node);
        self.inner.schedule_save(apex.zone.name());
    }
}

////////////////////////////////////////////////////////////////////////
// PERSISTENCE                                                        //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Loads every zone snapshot from the configured directory. A file
    /// that fails to parse is skipped (and logged); the remaining
    /// zones still load.
    pub fn load_all(&self) -> Result<()> {
        let Some(dir) = self.inner.zones_dir.clone() else {
            return Ok(());
        };
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "zone") {
                continue;
            }
            let file = match File::open(&path).map_err(Error::from).and_then(|file| {
                zone_file::read(io::BufReader::new(file)).map_err(Error::from)
            }) {
                Ok(file) => file,
                Err(err) => {
                    warn!("skipping {}: {}", path.display(), err);
                    continue;
                }
            };
            let name = file.info.name.clone();
            match self.install_zone_file(file) {
                Ok(info) => info!("loaded zone {} ({})", info.name, info.kind),
                Err(err) => warn!("failed to install zone {}: {}", name, err),
            }
        }
        Ok(())
    }

    /// Schedules a zone save through the debounced loop.
    pub fn save_zone(&self, name: &Name) {
        self.inner.schedule_save(name);
    }

    /// Writes out everything pending without waiting for the timer.
    pub fn flush_saves(&self) {
        if let Some(saver) = self.inner.saver.get() {
            saver.flush_now();
        }
    }

    /// Installs a deserialized zone snapshot.
    fn install_zone_file(&self, file: ZoneFile) -> Result<ZoneInfo> {
        let zone = Arc::new(ApexZone::from_info(file.info, file.primaries));
        if let Some(keys) = zone.keys() {
            *keys.lock().unwrap() = file.keys;
        }
        let name = zone.name().to_owned();
        let apex = self.install_zone(zone)?;

        for record in file.records {
            let node = self.inner.tree.get_or_add(&record.owner);
            let parent_slot = node.apex().is_some() && !Arc::ptr_eq(&node, &apex.node);
            let existing = if parent_slot {
                node.parent_rrset(record.rr_type)
            } else {
                node.rrset(record.rr_type)
            };
            let mut rrset = match existing {
                Some(rrset) => (*rrset).clone(),
                None => Rrset::new(record.rr_type, record.ttl),
            };
            let ttl = if rrset.is_empty() { record.ttl } else { rrset.ttl() };
            let _ = rrset.insert(ttl, record.rdata, record.info);
            if parent_slot {
                node.put_parent_rrset(rrset);
            } else {
                node.put_rrset(rrset);
            }
        }

        if matches!(apex.zone.kind(), ZoneKind::Secondary | ZoneKind::Stub) {
            self.start_refresh(&name);
        }

        // Loaded zones get the same structural checks as mutations,
        // reported as warnings rather than refusals.
        if apex.zone.kind() == ZoneKind::Primary && apex.node.rrset(Type::SOA).is_none() {
            warn!("zone {} has no SOA record at its apex", name);
        }
        for node in self.inner.tree.walk_zone(&apex.node) {
            if node.rrset(Type::CNAME).is_some()
                && node
                    .rrsets()
                    .iter()
                    .any(|rrset| rrset.rr_type != Type::CNAME && !rrset.rr_type.is_dnssec())
            {
                warn!("{} owns a CNAME alongside other data", node.name());
            }
        }
        Ok(apex.zone.info())
    }

    /// Installs a fresh apex zone into the tree and index.
    fn install_zone(&self, zone: Arc<ApexZone>) -> Result<ApexMatch> {
        let name = zone.name().to_owned();
        let key = index_key(&name);
        {
            let mut index = self.inner.index.write().unwrap();
            if index.contains_key(&key) {
                return Err(Error::ZoneAlreadyExists(name));
            }
            index.insert(key, zone.clone());
        }
        let node = self.inner.tree.get_or_add(&name);
        node.set_apex(zone.clone());
        Ok(ApexMatch { zone, node })
    }

    fn start_refresh(&self, zone: &Name) {
        if self.inner.xfr_client.is_none() {
            return;
        }
        let key = index_key(zone);
        let handle = refresh::spawn(Arc::downgrade(&self.inner), zone.to_owned());
        if let Some(mut old) = self.refresh.lock().unwrap().insert(key, handle) {
            old.stop();
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SERVER DOMAIN                                                      //
////////////////////////////////////////////////////////////////////////

impl Catalog {
    /// Returns the server's domain name.
    pub fn server_domain(&self) -> Box<Name> {
        self.inner.server_domain.read().unwrap().clone()
    }

    /// Changes the server's domain name, propagating it into every
    /// primary zone's SOA MNAME and matching NS record. The
    /// propagation runs on a worker thread so that the admin call
    /// returns immediately.
    pub fn update_server_domain(&self, new_domain: Box<Name>) {
        let old_domain = {
            let mut current = self.inner.server_domain.write().unwrap();
            std::mem::replace(&mut *current, new_domain.clone())
        };
        if old_domain == new_domain {
            return;
        }
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("server-domain".to_owned())
            .spawn(move || inner.apply_server_domain(&old_domain, &new_domain));
        if spawned.is_err() {
            error!("failed to start the server-domain worker");
        }
    }
}

impl Inner {
    pub(crate) fn apex_match(&self, name: &Name) -> Option<ApexMatch> {
        let zone = self.index.read().unwrap().get(&index_key(name)).cloned()?;
        let node = self.tree.get(name)?;
        Some(ApexMatch { zone, node })
    }

    pub(crate) fn schedule_save(&self, name: &Name) {
        if self.zones_dir.is_none() {
            return;
        }
        if let Some(apex) = self.apex_match(name) {
            if apex.zone.is_internal() {
                return;
            }
        }
        if let Some(saver) = self.saver.get() {
            saver.schedule(index_key(name));
        }
    }

    /// Serializes one zone to its snapshot file. Returns whether the
    /// save succeeded; failures stay pending.
    fn write_zone_file(&self, key: &str) -> bool {
        let Ok(name) = key.parse::<Box<Name>>() else {
            return true;
        };
        let Some(apex) = self.apex_match(&name) else {
            // The zone was deleted while pending; nothing to do.
            return true;
        };
        if apex.zone.is_internal() {
            return true;
        }
        let Some(dir) = &self.zones_dir else {
            return true;
        };

        let file = self.collect_zone_file(&apex);
        let path = dir.join(zone_file::file_name(&name));
        let result = File::create(&path)
            .map_err(zone_file::Error::Io)
            .and_then(|out| zone_file::write(io::BufWriter::new(out), &file));
        match result {
            Ok(()) => true,
            Err(err) => {
                error!("failed to save {}: {}", path.display(), err);
                false
            }
        }
    }

    /// Collects a zone's full state for serialization.
    fn collect_zone_file(&self, apex: &ApexMatch) -> ZoneFile {
        let class = apex.zone.class();
        let mut records = Vec::new();
        for node in self.tree.walk_zone(&apex.node) {
            let at_apex = Arc::ptr_eq(&node, &apex.node);
            for rrset in node.walk_rrsets(at_apex) {
                records.extend(rrset.to_records(node.name(), class));
            }
        }
        let keys = apex
            .zone
            .keys()
            .map(|keys| keys.lock().unwrap().clone())
            .unwrap_or_default();
        ZoneFile {
            info: apex.zone.info(),
            primaries: apex.zone.primaries(),
            keys,
            records,
        }
    }

    /// Rebuilds a signed zone's denial chain and signatures.
    fn rebuild_dnssec(&self, apex: &ApexMatch) -> Result<()> {
        let ttl = chain_ttl(apex);
        match apex.zone.dnssec_status() {
            DnssecStatus::Unsigned => return Ok(()),
            DnssecStatus::SignedWithNsec => {
                dnssec::rebuild_nsec_chain(&self.tree, &apex.node, ttl);
            }
            DnssecStatus::SignedWithNsec3 => {
                let params = apex
                    .node
                    .rrset(Type::NSEC3PARAM)
                    .and_then(|rrset| rrset.first().and_then(|(rdata, _)| Nsec3Params::read(rdata)))
                    .unwrap_or_else(|| Nsec3Params::new(0, Vec::new()));
                dnssec::rebuild_nsec3_chain(&self.tree, &apex.node, ttl, &params);
            }
        }
        if let Some(signer) = &self.signer {
            dnssec::resign_zone(&self.tree, &apex.node, &apex.zone, signer.as_ref())?;
        } else {
            warn!(
                "zone {} is signed but no signer is configured; RRSIGs are stale",
                apex.zone.name(),
            );
        }
        Ok(())
    }

    /// Rewrites every primary zone's SOA MNAME (and matching NS
    /// record) after a server-domain change.
    fn apply_server_domain(&self, old_domain: &Name, new_domain: &Name) {
        let zones: Vec<Arc<ApexZone>> = self.index.read().unwrap().values().cloned().collect();
        for zone in zones {
            if zone.kind() != ZoneKind::Primary {
                continue;
            }
            let Some(apex) = self.apex_match(zone.name()) else {
                continue;
            };

            let mut changed = false;
            if let Some(mut soa) = apex.node.soa_fields() {
                if soa.mname.as_ref() == old_domain {
                    soa.mname = new_domain.to_owned();
                    let info = apex
                        .node
                        .rrset(Type::SOA)
                        .and_then(|rrset| rrset.first().map(|(_, info)| info.clone()))
                        .unwrap_or_else(|| RecordInfo::for_type(Type::SOA));
                    let ttl = apex
                        .node
                        .rrset(Type::SOA)
                        .map(|rrset| rrset.ttl())
                        .unwrap_or(DEFAULT_TTL);
                    let mut rrset = Rrset::new(Type::SOA, ttl);
                    let _ = rrset.insert(ttl, soa.to_rdata(), info);
                    apex.node.put_rrset(rrset);
                    changed = true;
                }
            }
            let old_rdata = helpers::name_rdata(old_domain);
            let has_old_ns = apex.node.rrset(Type::NS).map_or(false, |rrset| {
                rrset
                    .iter()
                    .any(|(rdata, _)| rdata.equals(&old_rdata, Type::NS))
            });
            if has_old_ns {
                apex.node.update_rrset(Type::NS, |rrset| {
                    if rrset.remove(&old_rdata) {
                        let _ = rrset.insert(
                            rrset.ttl(),
                            helpers::name_rdata(new_domain),
                            RecordInfo::for_type(Type::NS),
                        );
                    }
                });
                changed = true;
            }

            if changed {
                zone.bump_serial(&apex.node);
                self.schedule_save(zone.name());
            }
        }
        info!(
            "server domain updated from {} to {}",
            old_domain, new_domain
        );
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// The index key of a zone: its lowercase textual name.
fn index_key(name: &Name) -> String {
    name.to_string().to_ascii_lowercase()
}

fn parse_zone_name(name: &str) -> Result<Box<Name>> {
    name.parse().map_err(|_| Error::InvalidZoneName)
}

/// Builds `hostmaster.<domain>` for new SOA RNAMEs.
fn hostmaster_of(domain: &Name) -> Box<Name> {
    let mut builder = crate::name::NameBuilder::new();
    let _ = builder.try_push_slice(b"hostmaster");
    builder
        .finish_with_suffix(domain)
        .unwrap_or_else(|_| domain.to_owned())
}

/// The TTL for a zone's denial chain records: the SOA MINIMUM.
fn chain_ttl(apex: &ApexMatch) -> Ttl {
    apex.node
        .soa_fields()
        .map(|soa| Ttl::from(soa.minimum))
        .unwrap_or(DEFAULT_TTL)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dnssec::ZoneKey;

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn new_catalog() -> Catalog {
        Catalog::new(CatalogConfig::new(boxed_name("ns1.server.test.")))
    }

    fn a_rdata(octets: [u8; 4]) -> RdataBuf {
        RdataBuf::try_from(&octets[..]).unwrap()
    }

    fn a_record(owner: &str, octets: [u8; 4]) -> Record {
        Record::new(
            boxed_name(owner),
            Type::A,
            Class::IN,
            DEFAULT_TTL,
            a_rdata(octets),
        )
    }

    /// A throwaway directory for persistence tests.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            let path = std::env::temp_dir().join(format!(
                "bailiwick-catalog-{}-{}",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::SeqCst),
            ));
            fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn create_list_and_delete_zones() {
        let catalog = new_catalog();
        catalog.create_primary_zone("beta.test.").unwrap();
        catalog.create_primary_zone("alpha.test.").unwrap();
        catalog
            .create_forwarder_zone("corp.", &["192.0.2.53"])
            .unwrap();

        // The listing is lexicographically sorted.
        let names: Vec<String> = catalog
            .get_all_zones()
            .iter()
            .map(|info| info.name.to_string())
            .collect();
        assert_eq!(names, ["alpha.test.", "beta.test.", "corp."]);
        assert_eq!(catalog.zone_count(), 3);

        let page = catalog.get_zones_page(1, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, boxed_name("beta.test."));

        assert!(matches!(
            catalog.create_primary_zone("alpha.test."),
            Err(Error::ZoneAlreadyExists(_)),
        ));

        catalog.delete_zone(&boxed_name("beta.test.")).unwrap();
        assert_eq!(catalog.zone_count(), 2);
        assert!(matches!(
            catalog.delete_zone(&boxed_name("beta.test.")),
            Err(Error::ZoneNotFound(_)),
        ));
    }

    #[test]
    fn new_primaries_answer_for_their_apex() {
        let catalog = new_catalog();
        catalog.create_primary_zone("example.test.").unwrap();

        let request = Request::new(boxed_name("example.test."), Type::SOA);
        let response = catalog.query(&request, false).unwrap();
        assert!(response.authoritative);
        assert_eq!(response.answer.len(), 1);
        assert_eq!(response.answer[0].rr_type, Type::SOA);
    }

    #[test]
    fn mutations_bump_the_serial_and_grow_the_journal() {
        let catalog = new_catalog();
        catalog.create_primary_zone("example.test.").unwrap();
        let zone = boxed_name("example.test.");

        let apex = catalog.inner.apex_match(&zone).unwrap();
        let before = apex.node.soa_serial().unwrap();

        catalog
            .add_record(&zone, a_record("www.example.test.", [192, 0, 2, 1]))
            .unwrap();
        let after = apex.node.soa_serial().unwrap();
        assert!(after.succeeds(before));

        let journal = apex.zone.journal().unwrap().lock().unwrap();
        assert_eq!(journal.sequences().len(), 1);
        assert_eq!(journal.sequences()[0].old_serial(), before);
        assert_eq!(journal.sequences()[0].new_serial(), after);
        assert_eq!(journal.sequences()[0].added().len(), 2);
    }

    #[test]
    fn structural_rules_are_enforced() {
        let catalog = new_catalog();
        catalog.create_primary_zone("example.test.").unwrap();
        let zone = boxed_name("example.test.");

        // A record outside the zone.
        assert!(matches!(
            catalog.add_record(&zone, a_record("www.other.test.", [1, 2, 3, 4])),
            Err(Error::NameOutsideZone),
        ));

        // An SOA below the apex.
        let stray_soa = Record::new(
            boxed_name("sub.example.test."),
            Type::SOA,
            Class::IN,
            DEFAULT_TTL,
            apex_soa_rdata(&catalog, &zone),
        );
        assert!(matches!(
            catalog.add_record(&zone, stray_soa),
            Err(Error::InvalidRecord(_)),
        ));

        // CNAME exclusivity, both directions.
        catalog
            .add_record(&zone, a_record("both.example.test.", [1, 2, 3, 4]))
            .unwrap();
        let cname = Record::new(
            boxed_name("both.example.test."),
            Type::CNAME,
            Class::IN,
            DEFAULT_TTL,
            helpers::name_rdata(&boxed_name("target.example.test.")),
        );
        assert!(matches!(
            catalog.add_record(&zone, cname.clone()),
            Err(Error::InvalidRecord(_)),
        ));
        let mut lone_cname = cname;
        lone_cname.owner = boxed_name("alias.example.test.");
        catalog.add_record(&zone, lone_cname).unwrap();
        assert!(matches!(
            catalog.add_record(&zone, a_record("alias.example.test.", [1, 2, 3, 4])),
            Err(Error::InvalidRecord(_)),
        ));

        // Deleting the SOA is refused.
        assert!(matches!(
            catalog.delete_records(&zone, &zone, Type::SOA),
            Err(Error::InvalidRecord(_)),
        ));
    }

    fn apex_soa_rdata(catalog: &Catalog, zone: &Name) -> RdataBuf {
        let apex = catalog.inner.apex_match(zone).unwrap();
        let rrset = apex.node.rrset(Type::SOA).unwrap();
        let (rdata, _) = rrset.first().unwrap();
        rdata.to_owned()
    }

    #[test]
    fn secondaries_are_read_only() {
        let catalog = new_catalog();
        catalog
            .create_secondary_zone("mirror.test.", vec!["192.0.2.1:53".parse().unwrap()])
            .unwrap();
        assert!(matches!(
            catalog.add_record(
                &boxed_name("mirror.test."),
                a_record("www.mirror.test.", [1, 2, 3, 4]),
            ),
            Err(Error::OperationNotSupported(_)),
        ));
    }

    #[test]
    fn conversion_matrix_is_enforced() {
        let catalog = new_catalog();
        catalog.create_primary_zone("p.test.").unwrap();
        catalog
            .create_secondary_zone("s.test.", vec!["192.0.2.1:53".parse().unwrap()])
            .unwrap();
        catalog.create_stub_zone("stub.test.", Vec::new()).unwrap();
        catalog.create_forwarder_zone("f.test.", &["192.0.2.53"]).unwrap();

        // Primary -> Forwarder strips the SOA and NS.
        let info = catalog
            .convert_zone(&boxed_name("p.test."), ZoneKind::Forwarder)
            .unwrap();
        assert_eq!(info.kind, ZoneKind::Forwarder);
        let apex = catalog.inner.apex_match(&boxed_name("p.test.")).unwrap();
        assert!(apex.node.rrset(Type::SOA).is_none());
        assert!(apex.node.rrset(Type::NS).is_none());

        // Forwarder -> Primary grows a fresh SOA and NS.
        let info = catalog
            .convert_zone(&boxed_name("f.test."), ZoneKind::Primary)
            .unwrap();
        assert_eq!(info.kind, ZoneKind::Primary);
        let apex = catalog.inner.apex_match(&boxed_name("f.test.")).unwrap();
        assert!(apex.node.rrset(Type::SOA).is_some());
        assert!(apex.node.rrset(Type::FWD).is_none());

        // Secondary -> Primary keeps the data.
        let info = catalog
            .convert_zone(&boxed_name("s.test."), ZoneKind::Primary)
            .unwrap();
        assert_eq!(info.kind, ZoneKind::Primary);

        // A stub cannot become anything.
        assert!(matches!(
            catalog.convert_zone(&boxed_name("stub.test."), ZoneKind::Primary),
            Err(Error::ConversionRejected(ZoneKind::Stub, ZoneKind::Primary)),
        ));
    }

    #[test]
    fn clone_zone_rewrites_owner_names() {
        let catalog = new_catalog();
        catalog.create_primary_zone("source.test.").unwrap();
        catalog
            .add_record(
                &boxed_name("source.test."),
                a_record("www.source.test.", [192, 0, 2, 1]),
            )
            .unwrap();

        catalog
            .clone_zone(&boxed_name("source.test."), "copy.test.")
            .unwrap();
        let records = catalog
            .get_records(&boxed_name("copy.test."), &boxed_name("www.copy.test."))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rdata.octets(), &[192, 0, 2, 1]);
    }

    #[test]
    fn snapshots_round_trip_through_disk() {
        let dir = TempDir::new();
        let zone = boxed_name("example.test.");

        {
            let mut config = CatalogConfig::new(boxed_name("ns1.server.test."));
            config.zones_dir = Some(dir.0.clone());
            let catalog = Catalog::new(config);
            catalog.create_primary_zone("example.test.").unwrap();
            catalog
                .add_record(&zone, a_record("www.example.test.", [192, 0, 2, 1]))
                .unwrap();
            let mut disabled = a_record("off.example.test.", [192, 0, 2, 66]);
            disabled.info.set_disabled(true);
            catalog.add_record(&zone, disabled).unwrap();
            catalog.flush_saves();
        }

        let mut config = CatalogConfig::new(boxed_name("ns1.server.test."));
        config.zones_dir = Some(dir.0.clone());
        let catalog = Catalog::new(config);
        catalog.load_all().unwrap();

        let info = catalog.get_zone_info(&zone).unwrap();
        assert_eq!(info.kind, ZoneKind::Primary);
        let records = catalog
            .get_records(&zone, &boxed_name("off.example.test."))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_disabled());
        let records = catalog
            .get_records(&zone, &boxed_name("www.example.test."))
            .unwrap();
        assert_eq!(records[0].rdata.octets(), &[192, 0, 2, 1]);
    }

    #[test]
    fn internal_zones_are_never_written_to_disk() {
        let dir = TempDir::new();
        let mut config = CatalogConfig::new(boxed_name("ns1.server.test."));
        config.zones_dir = Some(dir.0.clone());
        let catalog = Catalog::new(config);
        catalog.create_internal_zones();
        catalog.flush_saves();

        assert_eq!(fs::read_dir(&dir.0).unwrap().count(), 0);

        // They do answer queries, though.
        let request = Request::new(boxed_name("localhost."), Type::A);
        let response = catalog.query(&request, false).unwrap();
        assert_eq!(response.answer.len(), 1);
    }

    ////////////////////////////////////////////////////////////////////
    // DNSSEC                                                         //
    ////////////////////////////////////////////////////////////////////

    /// A stand-in for a real signing backend. The RRSIG RDATA it
    /// produces has the correct field layout (so that type-covered
    /// filtering works) with a fixed dummy signature; generated keys
    /// get unique material so their tags don't collide.
    #[derive(Default)]
    struct TestSigner {
        counter: AtomicUsize,
    }

    impl Signer for TestSigner {
        fn generate_key(
            &self,
            zone: &Name,
            algorithm: u8,
            ksk: bool,
        ) -> std::result::Result<ZoneKey, SignError> {
            let flags: u16 = if ksk { 257 } else { 256 };
            let mut public = Vec::new();
            public.extend_from_slice(&flags.to_be_bytes());
            public.push(3);
            public.push(algorithm);
            public.extend_from_slice(zone.wire_repr());
            public.push(self.counter.fetch_add(1, Ordering::SeqCst) as u8);
            let public = RdataBuf::try_from(public).unwrap();
            let tag = dnssec::key_tag(&public);
            Ok(ZoneKey {
                tag,
                algorithm,
                flags,
                public_rdata: public,
                secret: vec![0x55; 8],
                retired: false,
            })
        }

        fn sign_rrset(
            &self,
            key: &ZoneKey,
            owner: &Name,
            apex: &Name,
            rrset: &Rrset,
        ) -> std::result::Result<RdataBuf, SignError> {
            let mut rdata = Vec::new();
            rdata.extend_from_slice(&u16::from(rrset.rr_type).to_be_bytes());
            rdata.push(key.algorithm);
            rdata.push((owner.len() - 1) as u8);
            rdata.extend_from_slice(&u32::from(rrset.ttl()).to_be_bytes());
            rdata.extend_from_slice(&[0; 8]);
            rdata.extend_from_slice(&key.tag.to_be_bytes());
            rdata.extend_from_slice(apex.wire_repr());
            rdata.extend_from_slice(&[0xab; 16]);
            Ok(RdataBuf::try_from(rdata).unwrap())
        }
    }

    fn signed_catalog() -> (Catalog, Box<Name>) {
        let mut config = CatalogConfig::new(boxed_name("ns1.server.test."));
        config.signer = Some(Arc::new(TestSigner::default()));
        let catalog = Catalog::new(config);
        let zone = boxed_name("example.test.");
        catalog.create_primary_zone("example.test.").unwrap();
        catalog
            .add_record(&zone, a_record("www.example.test.", [192, 0, 2, 1]))
            .unwrap();
        catalog.sign_zone_with_nsec(&zone).unwrap();
        (catalog, zone)
    }

    #[test]
    fn signing_produces_complete_coverage() {
        let (catalog, zone) = signed_catalog();
        let apex = catalog.inner.apex_match(&zone).unwrap();
        assert_eq!(apex.zone.dnssec_status(), DnssecStatus::SignedWithNsec);

        // Every authoritative RRset has a covering RRSIG, and every
        // name with data has an NSEC record.
        for node in catalog.inner.tree.walk_zone(&apex.node) {
            let rrsig = node.rrset(Type::RRSIG);
            for rrset in node.rrsets() {
                if rrset.rr_type == Type::RRSIG || !rrset.has_active() {
                    continue;
                }
                let covered = rrsig
                    .as_ref()
                    .map(|sigs| {
                        sigs.iter().any(|(rdata, _)| {
                            dnssec::rrsig_type_covered(rdata) == Some(rrset.rr_type)
                        })
                    })
                    .unwrap_or(false);
                assert!(
                    covered,
                    "no RRSIG covering {} at {}",
                    rrset.rr_type,
                    node.name(),
                );
                if rrset.rr_type != Type::NSEC {
                    assert!(node.rrset(Type::NSEC).is_some());
                }
            }
        }
    }

    #[test]
    fn signed_answers_carry_rrsigs_and_proofs() {
        let (catalog, _zone) = signed_catalog();

        let request =
            Request::new(boxed_name("www.example.test."), Type::A).with_dnssec_ok();
        let response = catalog.query(&request, false).unwrap();
        assert!(response
            .answer
            .iter()
            .any(|record| record.rr_type == Type::RRSIG));

        let request =
            Request::new(boxed_name("missing.example.test."), Type::A).with_dnssec_ok();
        let response = catalog.query(&request, false).unwrap();
        assert!(response
            .authority
            .iter()
            .any(|record| record.rr_type == Type::NSEC));
    }

    #[test]
    fn ds_export_and_unsigning() {
        let (catalog, zone) = signed_catalog();

        let ds = catalog.ds_records(&zone).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].rr_type, Type::DS);

        catalog.unsign_zone(&zone).unwrap();
        let apex = catalog.inner.apex_match(&zone).unwrap();
        assert_eq!(apex.zone.dnssec_status(), DnssecStatus::Unsigned);
        for node in catalog.inner.tree.walk_zone(&apex.node) {
            assert!(node.rrset(Type::RRSIG).is_none());
            assert!(node.rrset(Type::NSEC).is_none());
            assert!(node.rrset(Type::DNSKEY).is_none());
        }
    }

    #[test]
    fn key_lifecycle() {
        let (catalog, zone) = signed_catalog();
        let apex = catalog.inner.apex_match(&zone).unwrap();

        let new_tag = {
            let keys = apex.zone.keys().unwrap().lock().unwrap();
            let zsk_tag = keys.iter().find(|key| !key.is_ksk()).unwrap().tag;
            drop(keys);
            catalog.rollover_dns_key(&zone, zsk_tag).unwrap()
        };
        {
            let keys = apex.zone.keys().unwrap().lock().unwrap();
            assert!(keys.iter().any(|key| key.tag == new_tag && !key.retired));
            assert!(keys.iter().any(|key| key.retired));
        }

        // Retired keys can be deleted; active ones cannot.
        let retired_tag = {
            let keys = apex.zone.keys().unwrap().lock().unwrap();
            keys.iter().find(|key| key.retired).unwrap().tag
        };
        catalog.delete_dns_key(&zone, retired_tag).unwrap();
        assert!(matches!(
            catalog.delete_dns_key(&zone, new_tag),
            Err(Error::OperationNotSupported(_)),
        ));
    }
}
